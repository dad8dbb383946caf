//! basement: back up and restore Docker container volumes
//!
//! The archival tool runs inside a short-lived sibling container that
//! carries the target's volumes, so neither the host nor the target needs
//! it installed.

pub mod cli;
pub mod core;
pub mod utils;
