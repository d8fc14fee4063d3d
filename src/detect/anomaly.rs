//! The anomaly record written to the log and sent to the collector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionSample;

/// Human-readable `reason` strings, one per rule.
pub const REASON_LOGIN_BURST: &str = "Multiple logins in short period";
pub const REASON_HIGH_CPU: &str = "High CPU usage detected";
pub const REASON_HIGH_MEMORY: &str = "High memory usage detected";

/// Which machine resource crossed its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Cpu,
    Memory,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Cpu => write!(f, "cpu"),
            Resource::Memory => write!(f, "memory"),
        }
    }
}

/// Shape-specific fields of an anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Five logins for one identity within the burst window. Carries the
    /// session that completed the window.
    LoginBurst {
        terminal: String,
        host: String,
        started: DateTime<Utc>,
    },
    /// Machine-wide utilization above threshold while the identity was
    /// logged in. Both percentages are recorded whichever one fired.
    ResourceHigh {
        resource: Resource,
        cpu_percent: f64,
        memory_percent: f64,
    },
}

/// A detected deviation. Immutable once created; one JSON line in the
/// anomaly log per instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Random v4 id, unique per record.
    pub id: Uuid,
    pub detected_at: DateTime<Utc>,
    /// The identity the anomaly is about.
    pub name: String,
    #[serde(flatten)]
    pub kind: AnomalyKind,
    pub reason: String,
}

impl Anomaly {
    pub fn login_burst(sample: &SessionSample) -> Self {
        Self {
            id: Uuid::new_v4(),
            detected_at: Utc::now(),
            name: sample.identity.clone(),
            kind: AnomalyKind::LoginBurst {
                terminal: sample.terminal.clone(),
                host: sample.host.clone(),
                started: sample.started_at,
            },
            reason: REASON_LOGIN_BURST.to_string(),
        }
    }

    pub fn resource_high(sample: &SessionSample, resource: Resource) -> Self {
        let reason = match resource {
            Resource::Cpu => REASON_HIGH_CPU,
            Resource::Memory => REASON_HIGH_MEMORY,
        };
        Self {
            id: Uuid::new_v4(),
            detected_at: Utc::now(),
            name: sample.identity.clone(),
            kind: AnomalyKind::ResourceHigh {
                resource,
                cpu_percent: sample.cpu_percent,
                memory_percent: sample.memory_percent,
            },
            reason: reason.to_string(),
        }
    }

    pub fn is_login_burst(&self) -> bool {
        matches!(self.kind, AnomalyKind::LoginBurst { .. })
    }

    /// The resource for a `resource_high` anomaly, `None` otherwise.
    pub fn resource(&self) -> Option<Resource> {
        match self.kind {
            AnomalyKind::ResourceHigh { resource, .. } => Some(resource),
            AnomalyKind::LoginBurst { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionSample {
        SessionSample {
            identity: "alice".to_string(),
            terminal: "pts/0".to_string(),
            host: "10.0.0.5".to_string(),
            started_at: Utc::now(),
            cpu_percent: 91.5,
            memory_percent: 42.0,
        }
    }

    #[test]
    fn test_login_burst_json_shape() {
        let a = Anomaly::login_burst(&sample());
        let v: serde_json::Value = serde_json::to_value(&a).unwrap();
        assert_eq!(v["kind"], "login_burst");
        assert_eq!(v["name"], "alice");
        assert_eq!(v["terminal"], "pts/0");
        assert_eq!(v["host"], "10.0.0.5");
        assert_eq!(v["reason"], REASON_LOGIN_BURST);
        assert!(v["started"].is_string());
        assert!(v.get("cpu_percent").is_none());
    }

    #[test]
    fn test_resource_high_json_shape() {
        let a = Anomaly::resource_high(&sample(), Resource::Cpu);
        let v: serde_json::Value = serde_json::to_value(&a).unwrap();
        assert_eq!(v["kind"], "resource_high");
        assert_eq!(v["resource"], "cpu");
        assert_eq!(v["cpu_percent"], 91.5);
        assert_eq!(v["reason"], REASON_HIGH_CPU);
        assert!(v.get("terminal").is_none());

        let parsed: Anomaly = serde_json::from_value(v).unwrap();
        assert_eq!(parsed, a);
    }

    #[test]
    fn test_memory_reason() {
        let a = Anomaly::resource_high(&sample(), Resource::Memory);
        assert_eq!(a.reason, REASON_HIGH_MEMORY);
        assert_eq!(a.resource(), Some(Resource::Memory));
        assert!(!a.is_login_burst());
    }
}
