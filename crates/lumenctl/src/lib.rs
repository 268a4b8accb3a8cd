//! Lumen Control - operator CLI for the reward engine

pub mod commands;

/// Environment variable holding the log filter
pub const LOG_ENV_VAR: &str = "LUMEN_LOG";
