//! Health monitoring services.

mod monitor;

pub use monitor::{HealthMonitor, HealthMonitorError, HealthMonitorResult, TransitionSink};
