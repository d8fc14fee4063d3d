use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use userwatch::config::{LogFormat, MonitorConfig};
use userwatch::session::{SessionSource, SystemSessionSource};

#[derive(Parser)]
#[command(
    name = "userwatch",
    about = "Single-host user session behavior monitor",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sampling loop (Ctrl+C to stop)
    Run {
        /// Anomaly log file (JSON lines)
        #[arg(long)]
        log_path: Option<PathBuf>,

        /// Remote collector URL to POST anomalies to
        #[arg(long)]
        collector_url: Option<String>,

        /// Directory to watch for changes (repeatable)
        #[arg(long = "watch")]
        watch: Vec<PathBuf>,

        /// Seconds between ticks
        #[arg(long)]
        interval: Option<u64>,

        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
    },

    /// Print the current logged-in sessions
    Snapshot {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(config: &MonitorConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = MonitorConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            log_path,
            collector_url,
            watch,
            interval,
            once,
        } => {
            if let Some(path) = log_path {
                config.log.path = path;
            }
            if collector_url.is_some() {
                config.collector.url = collector_url;
            }
            if !watch.is_empty() {
                config.watch.paths = watch;
            }
            if let Some(secs) = interval {
                config.monitor.tick_interval_secs = secs;
            }

            init_tracing(&config);
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting userwatch");

            let source = SystemSessionSource::new();
            if once {
                let report = userwatch::run_once(&config, source).await?;
                tracing::info!(
                    sessions = report.sessions.len(),
                    anomalies = report.anomalies.len(),
                    "single tick complete"
                );
            } else {
                let late = userwatch::run(&config, source, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "failed to listen for interrupt");
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
                tracing::debug!(late_file_events = late.len(), "final drain complete");
                println!("\nMonitoring stopped by user.");
            }
        }
        Commands::Snapshot { json } => {
            init_tracing(&config);
            let mut source = SystemSessionSource::new();
            let sessions = source.snapshot()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("No logged-in sessions.");
            } else {
                println!(
                    "{:<16} | {:<10} | {:<20} | Started",
                    "User", "Terminal", "Host"
                );
                println!("{:-<16}-|-{:-<10}-|-{:-<20}-|-{:-<19}", "", "", "", "");
                for s in &sessions {
                    println!(
                        "{:<16} | {:<10} | {:<20} | {}",
                        s.identity,
                        s.terminal,
                        s.host,
                        s.started_at
                            .with_timezone(&chrono::Local)
                            .format("%Y-%m-%d %H:%M:%S")
                    );
                }
                if let Some(first) = sessions.first() {
                    println!(
                        "\nCPU: {:.1}%  Memory: {:.1}%",
                        first.cpu_percent, first.memory_percent
                    );
                }
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
