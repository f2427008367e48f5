//! CLI command implementations.

pub mod evaluate;
pub mod init;
pub mod offer;
pub mod outcome;
pub mod trial;
pub mod variant;
