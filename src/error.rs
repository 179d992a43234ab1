//! # Error Handling
//!
//! This module defines the centralized error type for `metabuild`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! the scheduler, the importers and the subcommand runner can produce.
//!
//! ## Taxonomy
//!
//! - **Configuration errors** (`Config`, `DuplicateName`, `UnknownDependency`,
//!   `CycleDetected`): the package set or a working copy does not match what
//!   was declared. These are never retried.
//! - **`SubcommandFailed`**: a spawned process exited with a non-zero status.
//!   This is the only retryable kind.
//! - **`ToolNotFound`**: a logical tool name could not be resolved to an
//!   executable.
//! - **`Interrupted`**: the run was cancelled from the outside.
//! - **`Fatal`**: wraps any other error to mark it as halting the whole run.
//!
//! The `Result` alias is used throughout the crate.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::package::Phase;

/// Main error type for metabuild operations
#[derive(Error, Debug)]
pub enum Error {
    /// The declared configuration does not match reality: wrong origin for a
    /// working copy, a directory that is not a working copy, an invalid
    /// importer option.
    #[error("Configuration error{}: {message}", package.as_ref().map(|p| format!(" in {}", p)).unwrap_or_default())]
    Config {
        package: Option<String>,
        message: String,
    },

    /// A package with the same name is already registered.
    #[error("Configuration error: package {name} is already registered")]
    DuplicateName { name: String },

    /// A package declares a dependency on a name that is not registered.
    #[error("Configuration error: package {package} depends on unknown package {dependency}")]
    UnknownDependency { package: String, dependency: String },

    /// The dependency graph contains a cycle.
    #[error("Cycle detected in package dependencies: {cycle}")]
    CycleDetected { cycle: String },

    /// A spawned process exited with a non-zero status.
    #[error("{package}: {phase}: {}", describe_exit(command, *status, log))]
    SubcommandFailed {
        package: String,
        phase: Phase,
        command: String,
        /// Exit code, absent when the process was killed by a signal
        status: Option<i32>,
        /// The log file that captured the output of the command
        log: PathBuf,
    },

    /// A process could not be started at all.
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A logical tool name could not be resolved to an executable.
    #[error("Tool {tool}, set to {program}, cannot be found in PATH={search_path}")]
    ToolNotFound {
        tool: String,
        program: String,
        search_path: String,
    },

    /// A phase hook failed for a reason other than a subcommand failure.
    #[error("{package}: {phase}: {message}")]
    Phase {
        package: String,
        phase: Phase,
        message: String,
    },

    /// The run was cancelled by an external interrupt.
    #[error("Interrupted")]
    Interrupted,

    /// An error that must halt the whole run.
    #[error("{0}")]
    Fatal(Box<Error>),

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The worker pool could not be started.
    #[error("Failed to start build workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Builds a configuration error, optionally attributed to a package.
    pub fn config(package: Option<&str>, message: impl Into<String>) -> Self {
        Error::Config {
            package: package.map(str::to_string),
            message: message.into(),
        }
    }

    /// Marks this error as fatal to the whole run.
    pub fn fatal(self) -> Self {
        match self {
            Error::Fatal(_) => self,
            other => Error::Fatal(Box::new(other)),
        }
    }

    /// The error with any `Fatal` wrapper removed.
    pub fn root(&self) -> &Error {
        match self {
            Error::Fatal(inner) => inner.root(),
            other => other,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }

    /// Whether the error comes from a configuration mismatch.
    pub fn is_config(&self) -> bool {
        matches!(
            self.root(),
            Error::Config { .. }
                | Error::DuplicateName { .. }
                | Error::UnknownDependency { .. }
                | Error::CycleDetected { .. }
        )
    }

    /// Only process exit failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::SubcommandFailed { .. })
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self.root(), Error::Interrupted)
    }

    /// The message without the package and phase prefix, for errors that
    /// carry one.
    pub fn detail(&self) -> String {
        match self.root() {
            Error::SubcommandFailed {
                command, status, log, ..
            } => describe_exit(command, *status, log),
            Error::Phase { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

fn describe_exit(command: &str, status: Option<i32>, log: &Path) -> String {
    let status = match status {
        Some(code) => format!("exit status {}", code),
        None => "a signal".to_string(),
    };
    format!("'{}' failed with {}, see {}", command, status, log.display())
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
