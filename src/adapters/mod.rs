//! Adapters implementing the domain ports.

pub mod fs;
pub mod runners;
