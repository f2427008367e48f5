//! Domain layer for the paywall decision engine
//!
//! Core models, errors and the port traits adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
