//! # Metabuild Library
//!
//! This library provides the core of a meta-build orchestrator: it imports the
//! sources of many interdependent packages from their version control systems
//! or archives, then prepares, builds and installs them in dependency order,
//! several at a time. It is used by the `metabuild` command-line tool but the
//! scheduler and importers can be driven directly.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use metabuild::package::Package;
//! use metabuild::registry::Registry;
//! use metabuild::scheduler::{Scheduler, SchedulerConfig};
//! use metabuild::subcommand::Runner;
//! use metabuild::tools::ToolResolver;
//!
//! let mut registry = Registry::new();
//! registry.register(Package::new("base")).unwrap();
//! registry.register(Package::new("app").depends_on("base")).unwrap();
//!
//! let log_dir = std::env::temp_dir().join("metabuild-doc-log");
//! let runner = Arc::new(Runner::new(Arc::new(ToolResolver::new()), log_dir));
//! let scheduler = Scheduler::new(SchedulerConfig::default().with_jobs(2), runner);
//!
//! let summary = scheduler.run(&mut registry).unwrap();
//! assert_eq!(summary.succeeded, vec!["base", "app"]);
//! ```
//!
//! ## Core Concepts
//!
//! - **Packages (`package`, `registry`)**: a named unit with a source
//!   directory, an optional importer, build steps and dependencies.
//! - **Importers (`importer`)**: fetch or update sources from Git, Subversion,
//!   Mercurial, Darcs, CVS or an archive, refusing to touch a working copy
//!   that comes from another repository.
//! - **Subcommands (`tools`, `subcommand`, `retry`)**: every external program
//!   is resolved by logical name, logged to a per-package file and optionally
//!   retried.
//! - **Scheduling (`graph`, `scheduler`)**: a dependency graph is checked for
//!   cycles up front, then packages run on a worker pool as soon as their
//!   dependencies have succeeded. Failures propagate to dependents only.
//! - **Reporting (`failure`, `reporting`)**: failures are collected and handed
//!   to the console and mail reporters under a configurable policy.
//! - **Manifest (`config`, `defaults`)**: the YAML file describing a build.

pub mod config;
pub mod defaults;
pub mod error;
pub mod failure;
pub mod graph;
pub mod importer;
pub mod output;
pub mod package;
pub mod registry;
pub mod reporting;
pub mod retry;
pub mod scheduler;
pub mod subcommand;
pub mod tools;

pub use error::{Error, Result};
pub use failure::{CompositeError, Failure, FailureKind};
pub use package::{Package, PackageStatus, Phase};
pub use registry::Registry;
pub use scheduler::{RunSummary, Scheduler, SchedulerConfig};

#[cfg(test)]
mod scheduler_proptest;
