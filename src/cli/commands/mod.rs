//! CLI command implementations.

pub mod batch;
pub mod close_loop;
pub mod common;
pub mod controller;
pub mod governance;
pub mod init;
pub mod kpi;
pub mod maintain;
pub mod program;
pub mod sessions;
pub mod specs;
pub mod stats;
