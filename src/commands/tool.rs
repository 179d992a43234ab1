//! # Tool Command Implementation
//!
//! This module implements the `tool` subcommand, which prints the executable
//! that would be run for a logical tool name such as `git` or `tar`, taking
//! the `programs` overrides of the manifest into account when it exists.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use metabuild::config::Manifest;
use metabuild::defaults;
use metabuild::tools::ToolResolver;

/// Print the executable used for a tool
#[derive(Args, Debug)]
pub struct ToolArgs {
    /// Logical tool name
    pub name: String,

    /// Path to the manifest whose program overrides apply, if it exists.
    #[arg(short, long, value_name = "FILE", default_value = defaults::MANIFEST_FILE)]
    pub manifest: PathBuf,
}

/// Execute the `tool` command.
pub fn execute(args: ToolArgs) -> Result<()> {
    let path = resolve(&args)?;
    println!("{}", path.display());
    Ok(())
}

fn resolve(args: &ToolArgs) -> Result<PathBuf> {
    let tools = ToolResolver::new();
    if args.manifest.exists() {
        let manifest = Manifest::from_file(&args.manifest)
            .with_context(|| format!("Failed to load manifest from {}", args.manifest.display()))?;
        for (tool, program) in &manifest.settings.programs {
            tools.set_program(tool, program.clone())?;
        }
    }
    Ok(tools.resolve(&args.name)?)
}
