//! Observability for the Hermes loopback analysis server.
//!
//! This crate provides:
//!
//! - **Logging**: Structured logging (JSON or human-readable) via `tracing-subscriber`
//! - **Metrics**: Standard metric names and recording helpers via the `metrics` facade
//!
//! Hermes never exports metrics itself. The host that embeds the server
//! installs whatever `metrics` recorder it already uses; without one, the
//! recording helpers are no-ops.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `hermes_requests_total` | Counter | `route`, `status` | Requests answered |
//! | `hermes_rejections_total` | Counter | `reason` | Requests refused before dispatch |
//! | `hermes_analysis_duration_seconds` | Histogram | `outcome` | Time spent in a dispatched job |
//! | `hermes_in_flight_analyses` | Gauge | - | Jobs currently registered |
//!
//! # Example
//!
//! ```rust,ignore
//! use hermes_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production())?;
//! tracing::info!(port = 51234, "analysis server listening");
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{build_subscriber, init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
