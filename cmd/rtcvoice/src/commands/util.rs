//! Utility functions for CLI commands.

use rtcvoice_cli::{load_config, Config, Context};

use crate::Cli;

const APP_NAME: &str = "rtcvoice";

/// Gets the global configuration.
pub fn get_config(cli: &Cli) -> anyhow::Result<Config> {
    load_config(APP_NAME, cli.config.as_deref())
}

/// Gets the context to use, if any.
///
/// An explicitly named context must exist; otherwise the current context is
/// used when one is set.
pub fn find_context(cli: &Cli) -> anyhow::Result<Option<Context>> {
    let cfg = get_config(cli)?;
    match cli.context.as_deref() {
        Some(name) => match cfg.get_context(name) {
            Some(ctx) => Ok(Some(ctx.clone())),
            None => anyhow::bail!("context '{}' not found", name),
        },
        None => Ok(cfg.get_current_context().cloned()),
    }
}

/// Prints verbose output if enabled.
pub fn print_verbose(cli: &Cli, msg: &str) {
    if cli.verbose {
        eprintln!("[verbose] {}", msg);
    }
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m✗\x1b[0m {}", msg);
}

/// Prints info message.
pub fn print_info(msg: &str) {
    eprintln!("\x1b[34mℹ\x1b[0m {}", msg);
}
