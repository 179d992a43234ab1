//! CLI argument parsing and command dispatch

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use metabuild::output::OutputConfig;

/// Metabuild - Import, schedule and build interdependent packages
#[derive(Parser, Debug)]
#[command(name = "metabuild")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import, prepare, build and install every package of the manifest
    Build(commands::build::BuildArgs),

    /// Only checkout or update the package sources
    Import(commands::build::BuildArgs),

    /// Print the order in which packages are built
    Order(commands::order::OrderArgs),

    /// Print the executable used for a tool
    Tool(commands::tool::ToolArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<ExitCode> {
        init_logging(&self.log_level);
        let output = OutputConfig::from_env_and_flag(&self.color);
        output.apply_globally();

        match self.command {
            Commands::Build(args) => commands::build::execute(args, output),
            Commands::Import(args) => commands::import::execute(args, output),
            Commands::Order(args) => commands::order::execute(args).map(|_| ExitCode::SUCCESS),
            Commands::Tool(args) => commands::tool::execute(args).map(|_| ExitCode::SUCCESS),
        }
    }
}

/// `RUST_LOG` wins over `--log-level` when set.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // Fails only when a logger is already installed
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}
