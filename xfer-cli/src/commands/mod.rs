//! CLI command implementations.

pub mod open;
pub mod seal;
pub mod upload;
