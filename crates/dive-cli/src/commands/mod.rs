//! CLI command implementations.

pub mod coi;
pub mod config;
pub mod kas;
pub mod replay;
pub mod search;
