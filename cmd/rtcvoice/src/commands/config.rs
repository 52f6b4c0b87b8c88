//! Configuration management commands.

use clap::{Args, Subcommand};

use rtcvoice_cli::Context as CliContext;

use super::{get_config, print_success};
use crate::Cli;

/// Manage CLI configuration.
///
/// Contexts allow you to manage multiple backends,
/// similar to kubectl's context management.
///
/// Configuration is stored in ~/.rtcvoice/rtcvoice/config.yaml
#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Add a new context
    #[command(name = "add-context")]
    AddContext {
        /// Context name
        name: String,
        /// Base address of the credential backend (required)
        #[arg(long)]
        api_base: String,
        /// Realtime model
        #[arg(long)]
        model: Option<String>,
        /// Negotiation endpoint URL
        #[arg(long)]
        realtime_url: Option<String>,
        /// Greeting instructions (empty disables the greeting)
        #[arg(long)]
        greeting: Option<String>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Delete a context
    #[command(name = "delete-context")]
    DeleteContext {
        /// Context name
        name: String,
    },
    /// Set the current context
    #[command(name = "use-context")]
    UseContext {
        /// Context name
        name: String,
    },
    /// Display the current context
    #[command(name = "get-context")]
    GetContext,
    /// List all contexts
    #[command(name = "list-contexts", alias = "get-contexts")]
    ListContexts,
    /// View the current configuration
    View,
}

impl ConfigCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::AddContext {
                name,
                api_base,
                model,
                realtime_url,
                greeting,
                timeout,
            } => {
                let mut cfg = get_config(cli)?;

                let ctx = CliContext {
                    api_base: api_base.clone(),
                    model: model.clone().unwrap_or_default(),
                    realtime_url: realtime_url.clone().unwrap_or_default(),
                    greeting: greeting.clone(),
                    timeout: timeout.unwrap_or(0),
                    ..Default::default()
                };

                cfg.add_context(name, ctx)?;
                print_success(&format!("Context \"{}\" added successfully", name));
                Ok(())
            }

            ConfigSubcommand::DeleteContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.delete_context(name)?;
                print_success(&format!("Context \"{}\" deleted", name));
                Ok(())
            }

            ConfigSubcommand::UseContext { name } => {
                let mut cfg = get_config(cli)?;
                cfg.use_context(name)?;
                print_success(&format!("Switched to context \"{}\"", name));
                Ok(())
            }

            ConfigSubcommand::GetContext => {
                let cfg = get_config(cli)?;
                if cfg.current_context.is_empty() {
                    println!("No current context set");
                } else {
                    println!("{}", cfg.current_context);
                }
                Ok(())
            }

            ConfigSubcommand::ListContexts => {
                let cfg = get_config(cli)?;

                if cfg.contexts.is_empty() {
                    println!("No contexts configured");
                    return Ok(());
                }

                println!("{:<8} {:<20} {:<30} {}", "CURRENT", "NAME", "API_BASE", "MODEL");
                for name in cfg.list_contexts() {
                    let Some(ctx) = cfg.get_context(name) else {
                        continue;
                    };
                    let current = if name == cfg.current_context { "*" } else { "" };
                    let model = if ctx.model.is_empty() { "(default)" } else { ctx.model.as_str() };
                    println!("{:<8} {:<20} {:<30} {}", current, name, ctx.api_base, model);
                }

                Ok(())
            }

            ConfigSubcommand::View => {
                let cfg = get_config(cli)?;

                println!("Config file: {}", cfg.path().display());
                println!("Current context: {}", cfg.current_context);
                println!("Contexts: {}", cfg.contexts.len());

                if !cfg.contexts.is_empty() {
                    println!("\nContext details:");

                    for name in cfg.list_contexts() {
                        let Some(ctx) = cfg.get_context(name) else {
                            continue;
                        };
                        println!("\n  {}:", name);
                        println!("    API Base: {}", ctx.api_base);
                        if !ctx.model.is_empty() {
                            println!("    Model: {}", ctx.model);
                        }
                        if !ctx.realtime_url.is_empty() {
                            println!("    Realtime URL: {}", ctx.realtime_url);
                        }
                        match ctx.greeting.as_deref() {
                            Some("") => println!("    Greeting: (disabled)"),
                            Some(greeting) => println!("    Greeting: {}", greeting),
                            None => {}
                        }
                        if ctx.timeout > 0 {
                            println!("    Timeout: {}s", ctx.timeout);
                        }
                    }
                }

                Ok(())
            }
        }
    }
}
