//! Logging and metrics.
//!
//! - **Logging**: `tracing` based structured logging with Pretty, JSON and
//!   compact output
//! - **Metrics**: cumulative client counters plus a pluggable
//!   [`MetricsCollector`] for labelled export
//!
//! ```rust,no_run
//! use integrations_propellerads::observability::{
//!     InMemoryMetricsCollector, LogFormat, LogLevel, LoggingConfig, MetricsCollector,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! LoggingConfig::new()
//!     .with_level(LogLevel::Info)
//!     .with_format(LogFormat::Json)
//!     .init()?;
//!
//! let metrics = InMemoryMetricsCollector::new();
//! metrics.increment_counter("requests", 1, &[("status", "200")]);
//! # Ok(())
//! # }
//! ```

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;
