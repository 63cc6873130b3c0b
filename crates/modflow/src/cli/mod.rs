//! CLI module for Modflow
//!
//! Thin commands over the orchestrator. Every command builds its own
//! [`context::CommandContext`] from the resolved configuration.

pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
