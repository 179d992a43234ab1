//! # Import Command Implementation
//!
//! This module implements the `import` subcommand: it checks out missing
//! package sources and updates existing ones, without building anything.
//! With `--only-local`, nothing is fetched from the network.

use std::process::ExitCode;

use anyhow::Result;

use super::build::{self, BuildArgs};
use metabuild::output::OutputConfig;
use metabuild::package::Phase;

/// Execute the `import` command.
pub fn execute(args: BuildArgs, output: OutputConfig) -> Result<ExitCode> {
    build::run(args, vec![Phase::Import], output)
}
