//! CLI commands

pub mod config;
pub mod queue;
pub mod record;
pub mod recover;
pub mod upload;
