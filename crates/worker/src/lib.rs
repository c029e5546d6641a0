//! Workers for the invoice builder.
//!
//! - Pipeline (session feed → aggregate, with a producer task and a bounded
//!   enrichment pool)
//! - Enrichment (financing status lookup on student profile pages)

pub mod enrichment;
pub mod pipeline;

pub use enrichment::{EnrichmentConfig, EnrichmentWorker};
pub use pipeline::*;
