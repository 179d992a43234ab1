//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the `metabuild`
//! command-line tool. Each subcommand is defined in its own file to keep the
//! logic separated and maintainable.
//!
//! ## Structure
//!
//! Each command module typically contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic.
//!
//! `build` and `import` share their arguments and most of their logic, they
//! only differ by the phases they run.

pub mod build;
pub mod import;
pub mod order;
pub mod tool;
