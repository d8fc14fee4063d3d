//! Session anomaly detection: login-burst and resource-usage rules.

pub mod anomaly;
pub mod engine;
pub mod history;

pub use anomaly::{Anomaly, AnomalyKind, Resource};
pub use engine::SessionAnomalyDetector;
pub use history::{LoginHistories, LoginHistory};
