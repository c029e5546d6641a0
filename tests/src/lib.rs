//! Shared helpers for the integration suites.

pub mod fixtures;
pub mod setup;
