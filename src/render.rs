//! Colorized console summary, redrawn in full every tick.

use std::io::{self, Write};

use colored::Colorize;

use crate::detect::{Anomaly, AnomalyKind};
use crate::session::SessionSample;
use crate::watch::FileChangeEvent;

const CLEAR_SCREEN: &str = "\x1B[2J\x1B[1;1H";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything one redraw shows.
pub struct Frame<'a> {
    pub sessions: &'a [SessionSample],
    pub anomalies: &'a [Anomaly],
    pub file_events: &'a [FileChangeEvent],
}

#[derive(Debug, Clone)]
pub struct Console {
    clear_screen: bool,
}

impl Console {
    pub fn new(clear_screen: bool) -> Self {
        Self { clear_screen }
    }

    /// Draw to stdout. Console failures are not worth stopping the monitor
    /// for, so they are only logged.
    pub fn draw_stdout(&self, frame: &Frame<'_>) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = self.draw(&mut out, frame) {
            tracing::debug!(error = %e, "console redraw failed");
        }
    }

    pub fn draw<W: Write>(&self, out: &mut W, frame: &Frame<'_>) -> io::Result<()> {
        let rule = "=".repeat(50);

        if self.clear_screen {
            write!(out, "{}", CLEAR_SCREEN)?;
        }
        writeln!(out, "{}", "User Behavior Monitor".green().bold())?;
        writeln!(out, "{}", rule)?;
        writeln!(out, "{}", "Real-time user session monitoring".yellow())?;
        writeln!(out, "{}", rule)?;
        writeln!(out, "{}", "Press Ctrl+C to stop".red())?;
        writeln!(out, "{}", rule)?;

        for s in frame.sessions {
            let line = format!(
                "User: {} | Terminal: {} | Host: {} | Started: {}",
                s.identity,
                s.terminal,
                s.host,
                s.started_at.with_timezone(&chrono::Local).format(TIME_FORMAT)
            );
            writeln!(out, "{}", line.cyan())?;
        }
        writeln!(out, "{}", rule)?;

        if !frame.anomalies.is_empty() {
            writeln!(out, "{}", "Anomalies detected:".red().bold())?;
            for a in frame.anomalies {
                writeln!(out, "{}", describe(a).red())?;
                writeln!(out, "{}", format!("Reason: {}", a.reason).red())?;
            }
            writeln!(out, "{}", rule)?;
        }

        write_file_events(out, frame.file_events, &rule)?;

        out.flush()
    }

    /// Print changes that arrived after the last redraw. Appended below the
    /// final frame instead of clearing it.
    pub fn draw_final_stdout(&self, file_events: &[FileChangeEvent]) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Err(e) = self.draw_final(&mut out, file_events) {
            tracing::debug!(error = %e, "console final draw failed");
        }
    }

    pub fn draw_final<W: Write>(
        &self,
        out: &mut W,
        file_events: &[FileChangeEvent],
    ) -> io::Result<()> {
        write_file_events(out, file_events, &"=".repeat(50))?;
        out.flush()
    }
}

fn write_file_events<W: Write>(
    out: &mut W,
    events: &[FileChangeEvent],
    rule: &str,
) -> io::Result<()> {
    if events.is_empty() {
        return Ok(());
    }
    writeln!(out, "{}", "File changes:".yellow().bold())?;
    for e in events {
        let line = format!(
            "[{}] {} {}",
            e.timestamp.with_timezone(&chrono::Local).format(TIME_FORMAT),
            e.kind,
            e.path.display()
        );
        writeln!(out, "{}", line.yellow())?;
    }
    writeln!(out, "{}", rule)
}

fn describe(a: &Anomaly) -> String {
    match &a.kind {
        AnomalyKind::LoginBurst {
            terminal,
            host,
            started,
        } => format!(
            "User: {} | Terminal: {} | Host: {} | Started: {}",
            a.name,
            terminal,
            host,
            started.with_timezone(&chrono::Local).format(TIME_FORMAT)
        ),
        AnomalyKind::ResourceHigh {
            resource,
            cpu_percent,
            memory_percent,
        } => format!(
            "User: {} | {} | CPU: {:.1}% | Memory: {:.1}%",
            a.name, resource, cpu_percent, memory_percent
        ),
    }
}
