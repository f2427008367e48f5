//! Adapters implementing the domain ports.
//!
//! - `memory`: process-local state and sink, used by tests and dry runs
//! - `sqlite`: durable user state and event log
//! - `http`: delivery to a remote analytics collector

pub mod http;
pub mod memory;
pub mod sqlite;
