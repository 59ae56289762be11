//! Shared utilities for agent-rs
//!
//! This crate provides common functionality used across the agent-rs workspace,
//! including logging setup and environment-driven configuration helpers.

pub mod config;
pub mod logging;

pub use config::{ConfigValueError, EnvSnapshot};
pub use logging::{init_tracing, init_tracing_with};
