//! Tracing and in-process metrics for the invoice builder.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;
