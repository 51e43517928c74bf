//! Observability for the connection subsystem
//!
//! Structured logging setup and connection metrics.

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{metrics, ConnectionMetrics, MetricsSnapshot};
