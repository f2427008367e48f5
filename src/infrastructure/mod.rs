//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Project setup and engine wiring

pub mod config;
pub mod logging;
pub mod setup;
