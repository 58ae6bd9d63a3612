//! CLI command definitions for live-config
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::format::OutputFormat;
use clap::{Parser, Subcommand, ValueEnum};

/// Output format flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FormatArg {
    /// Pretty-printed JSON (default)
    #[default]
    Json,
    /// YAML
    Yaml,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Yaml => OutputFormat::Yaml,
        }
    }
}

/// Load, inspect and watch layered configuration files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the root configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "LIVE_CONFIG_PATH",
        default_value = "config.yaml"
    )]
    pub config: String,

    /// Defaults file merged under the root configuration
    #[arg(long, global = true)]
    pub defaults: Option<String>,

    /// Disable watching contributing files for changes
    #[arg(long, global = true)]
    pub no_hot_reload: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Json, global = true)]
    pub format: FormatArg,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the resolved configuration (default if no subcommand given)
    Show,

    /// Print the value at a dotted path, e.g. `server.listeners[0].port`
    Get {
        /// Dotted path into the resolved configuration
        path: String,
    },

    /// List the files that contributed to the configuration
    Files,

    /// Print the configuration, then again on every change until interrupted
    Watch,
}
