//! Core types for the mentoring invoice builder.
//!
//! - Students and the registry owning their identity
//! - Sessions, the per-run aggregate and its filters
//! - Pricing and the invoice projection
//! - Feed record decoding and collaborator traits

pub mod error;
pub mod ids;
pub mod invoice;
pub mod pricing;
pub mod record;
pub mod session;
pub mod source;
pub mod student;

pub use error::{Error, Result};
pub use ids::*;
pub use invoice::*;
pub use pricing::session_price;
pub use record::*;
pub use session::*;
pub use source::*;
pub use student::*;
