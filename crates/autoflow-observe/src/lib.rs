//! Observability setup for Autoflow: the global tracing subscriber and the
//! optional OpenTelemetry bridge.

pub mod tracing_setup;

pub use tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};
