//! # huddle-observability
//!
//! Observability-Crate fuer Huddle:
//! - Prometheus-kompatible Metriken der Peer-Verbindungen und der Signalisierung
//! - Structured Logging (Text oder JSON) via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::HuddleMetrics;
