//! CLI commands module.

mod chat;
mod config;
mod util;

pub use chat::ChatCommand;
pub use config::ConfigCommand;

// Re-export utils for use in commands
pub(crate) use util::*;
