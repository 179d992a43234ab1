//! # Reporting
//!
//! Turns the failures recorded during a run into user-visible output and a
//! result for the caller.
//!
//! [`Reporting::report`] runs a block (typically "schedule every package"),
//! collects the failures recorded on the registry and then applies one of the
//! [`OnPackageFailures`] policies:
//!
//! - `Raise`: nothing is dispatched to the reporters. Non-fatal failures are
//!   returned. Once one of them is fatal, a single failure is returned as the
//!   error and several are wrapped in a [`CompositeError`].
//! - `Exit`: every failure goes to every reporter. If one of them is fatal,
//!   [`ReportError::Exit`] tells the caller to terminate with that status.
//!   Otherwise the failures are returned.
//! - `Report`: every failure goes to every reporter and the list is returned.
//!
//! Whatever the policy, an interrupt raised by the block is returned as
//! [`ReportError::Interrupted`] once the policy's side effects are done.

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;
use crate::failure::{CompositeError, Failure};
use crate::registry::Registry;

pub mod console;
pub mod mail;

pub use console::ConsoleReporter;
pub use mail::{MailConfig, MailReporter};

/// Receives the outcome of a run.
pub trait Reporter: Send + Sync {
    fn error(&self, failure: &Failure);

    fn success(&self) {}
}

/// What [`Reporting::report`] does with recorded failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnPackageFailures {
    Raise,
    #[default]
    Exit,
    Report,
}

impl fmt::Display for OnPackageFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OnPackageFailures::Raise => "raise",
            OnPackageFailures::Exit => "exit",
            OnPackageFailures::Report => "report",
        })
    }
}

impl FromStr for OnPackageFailures {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raise" => Ok(OnPackageFailures::Raise),
            "exit" => Ok(OnPackageFailures::Exit),
            "report" => Ok(OnPackageFailures::Report),
            other => Err(Error::config(
                None,
                format!("unknown failure policy '{}', expected raise, exit or report", other),
            )),
        }
    }
}

/// How a reported run ends when it does not simply return its failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// The only failure of the run
    #[error("{0}")]
    Package(Failure),

    /// Several failures
    #[error("{0}")]
    Composite(CompositeError),

    #[error("Interrupted")]
    Interrupted,

    /// A fatal failure was reported; the process should exit with `code`
    #[error("build failed with {} error(s)", failures.len())]
    Exit { code: i32, failures: Vec<Failure> },
}

impl ReportError {
    /// Process exit status matching this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReportError::Package(_) | ReportError::Composite(_) => 1,
            ReportError::Interrupted => 130,
            ReportError::Exit { code, .. } => *code,
        }
    }

    /// The failures carried by this outcome.
    pub fn failures(&self) -> Vec<Failure> {
        match self {
            ReportError::Package(failure) => vec![failure.clone()],
            ReportError::Composite(composite) => composite.original_errors().to_vec(),
            ReportError::Interrupted => Vec::new(),
            ReportError::Exit { failures, .. } => failures.clone(),
        }
    }
}

/// The set of reporters of a run.
#[derive(Default)]
pub struct Reporting {
    reporters: Vec<Box<dyn Reporter>>,
}

impl Reporting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reporter(&mut self, reporter: impl Reporter + 'static) {
        self.reporters.push(Box::new(reporter));
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    /// Sends `failure` to every reporter.
    pub fn error(&self, failure: &Failure) {
        for reporter in &self.reporters {
            reporter.error(failure);
        }
    }

    /// Tells every reporter that the run succeeded.
    pub fn success(&self) {
        for reporter in &self.reporters {
            reporter.success();
        }
    }

    /// Runs `block` and handles the failures it leaves on `registry`
    /// according to `policy`.
    pub fn report<F>(
        &self,
        registry: &mut Registry,
        policy: OnPackageFailures,
        block: F,
    ) -> Result<Vec<Failure>, ReportError>
    where
        F: FnOnce(&mut Registry) -> crate::error::Result<()>,
    {
        let outcome = block(registry);
        let mut failures = registry.failures();
        let interrupted = match outcome {
            Ok(()) => false,
            Err(error) if error.is_interrupt() => true,
            Err(error) => {
                debug!("run failed before completion: {}", error);
                failures.push(Failure::from_error(None, None, &error.fatal()));
                false
            }
        };

        match policy {
            OnPackageFailures::Raise => {
                if interrupted {
                    return Err(ReportError::Interrupted);
                }
                if !failures.iter().any(Failure::is_fatal) {
                    return Ok(failures);
                }
                match failures.len() {
                    1 => Err(ReportError::Package(failures.remove(0))),
                    _ => Err(ReportError::Composite(CompositeError::new(failures))),
                }
            }
            OnPackageFailures::Exit => {
                self.dispatch(&failures);
                if interrupted {
                    return Err(ReportError::Interrupted);
                }
                if failures.iter().any(Failure::is_fatal) {
                    return Err(ReportError::Exit { code: 1, failures });
                }
                Ok(failures)
            }
            OnPackageFailures::Report => {
                self.dispatch(&failures);
                if interrupted {
                    return Err(ReportError::Interrupted);
                }
                Ok(failures)
            }
        }
    }

    fn dispatch(&self, failures: &[Failure]) {
        for failure in failures {
            self.error(failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{Package, Phase};
    use std::sync::{Arc, Mutex};

    /// Remembers everything it is told
    #[derive(Clone, Default)]
    struct RecordingReporter {
        errors: Arc<Mutex<Vec<Failure>>>,
        successes: Arc<Mutex<usize>>,
    }

    impl Reporter for RecordingReporter {
        fn error(&self, failure: &Failure) {
            self.errors.lock().unwrap().push(failure.clone());
        }

        fn success(&self) {
            *self.successes.lock().unwrap() += 1;
        }
    }

    fn setup() -> (Reporting, RecordingReporter, Registry) {
        let recorder = RecordingReporter::default();
        let mut reporting = Reporting::new();
        reporting.add_reporter(recorder.clone());
        let mut registry = Registry::new();
        registry.register(Package::new("test")).unwrap();
        (reporting, recorder, registry)
    }

    fn package_error() -> Failure {
        Failure::new("test", Phase::Build, "test exception").with_fatal(true)
    }

    fn other_error() -> Failure {
        Failure::new("test", Phase::Install, "test").with_fatal(true)
    }

    fn record(registry: &mut Registry, failures: &[Failure]) {
        let package = registry.get_mut("test").unwrap();
        for failure in failures {
            package.record_failure(failure.clone());
        }
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("raise".parse::<OnPackageFailures>().unwrap(), OnPackageFailures::Raise);
        assert_eq!("EXIT".parse::<OnPackageFailures>().unwrap(), OnPackageFailures::Exit);
        assert_eq!("report".parse::<OnPackageFailures>().unwrap(), OnPackageFailures::Report);
        assert!("ignore".parse::<OnPackageFailures>().is_err());
        assert_eq!(OnPackageFailures::default(), OnPackageFailures::Exit);
        assert_eq!(OnPackageFailures::Report.to_string(), "report");
    }

    #[test]
    fn test_no_errors_returns_empty_list() {
        for policy in [OnPackageFailures::Raise, OnPackageFailures::Exit, OnPackageFailures::Report] {
            let (reporting, recorder, mut registry) = setup();
            let result = reporting.report(&mut registry, policy, |_| Ok(()));
            assert_eq!(result, Ok(Vec::new()));
            assert!(recorder.errors.lock().unwrap().is_empty());
        }
    }

    #[test]
    fn test_interrupt_passes_through_every_policy() {
        for policy in [OnPackageFailures::Raise, OnPackageFailures::Exit, OnPackageFailures::Report] {
            let (reporting, _, mut registry) = setup();
            let result = reporting.report(&mut registry, policy, |_| Err(Error::Interrupted));
            assert_eq!(result, Err(ReportError::Interrupted));
        }
    }

    #[test]
    fn test_raise_returns_single_failure_as_is_without_dispatch() {
        let (reporting, recorder, mut registry) = setup();
        let failure = package_error();

        let result = reporting.report(&mut registry, OnPackageFailures::Raise, |registry| {
            record(registry, &[failure.clone()]);
            Ok(())
        });

        assert_eq!(result, Err(ReportError::Package(failure)));
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_raise_returns_non_fatal_failures() {
        let (reporting, recorder, mut registry) = setup();
        let failure = package_error().with_fatal(false);

        let result = reporting.report(&mut registry, OnPackageFailures::Raise, |registry| {
            record(registry, &[failure.clone()]);
            Ok(())
        });

        assert_eq!(result, Ok(vec![failure]));
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[test]
    fn test_raise_includes_non_fatal_failures_once_one_is_fatal() {
        let (reporting, _, mut registry) = setup();
        let failures = vec![package_error().with_fatal(false), other_error()];

        let result = reporting.report(&mut registry, OnPackageFailures::Raise, |registry| {
            record(registry, &failures);
            Ok(())
        });

        match result {
            Err(ReportError::Composite(composite)) => {
                assert_eq!(composite.original_errors(), failures.as_slice());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_raise_prefers_interrupt_over_non_fatal_failures() {
        let (reporting, _, mut registry) = setup();
        let result = reporting.report(&mut registry, OnPackageFailures::Raise, |registry| {
            record(registry, &[package_error().with_fatal(false)]);
            Err(Error::Interrupted)
        });
        assert_eq!(result, Err(ReportError::Interrupted));
    }

    #[test]
    fn test_raise_combines_multiple_failures() {
        let (reporting, _, mut registry) = setup();
        let failures = vec![package_error(), other_error()];

        let result = reporting.report(&mut registry, OnPackageFailures::Raise, |registry| {
            record(registry, &failures);
            Ok(())
        });

        match result {
            Err(ReportError::Composite(composite)) => {
                assert_eq!(composite.original_errors(), failures.as_slice());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_raise_prefers_interrupt_over_failures() {
        let (reporting, _, mut registry) = setup();
        let result = reporting.report(&mut registry, OnPackageFailures::Raise, |registry| {
            record(registry, &[package_error()]);
            Err(Error::Interrupted)
        });
        assert_eq!(result, Err(ReportError::Interrupted));
    }

    #[test]
    fn test_exit_reports_fatal_failures_and_exits() {
        let (reporting, recorder, mut registry) = setup();
        let failure = package_error();

        let result = reporting.report(&mut registry, OnPackageFailures::Exit, |registry| {
            record(registry, &[failure.clone()]);
            Ok(())
        });

        let err = result.unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.failures(), vec![failure.clone()]);
        assert_eq!(*recorder.errors.lock().unwrap(), vec![failure]);
    }

    #[test]
    fn test_exit_returns_non_fatal_failures() {
        let (reporting, recorder, mut registry) = setup();
        let failure = package_error().with_fatal(false);

        let result = reporting.report(&mut registry, OnPackageFailures::Exit, |registry| {
            record(registry, &[failure.clone()]);
            Ok(())
        });

        assert_eq!(result, Ok(vec![failure.clone()]));
        assert_eq!(*recorder.errors.lock().unwrap(), vec![failure]);
    }

    #[test]
    fn test_exit_reports_before_reraising_interrupt() {
        let (reporting, recorder, mut registry) = setup();
        let failure = package_error().with_fatal(false);

        let result = reporting.report(&mut registry, OnPackageFailures::Exit, |registry| {
            record(registry, &[failure.clone()]);
            Err(Error::Interrupted)
        });

        assert_eq!(result, Err(ReportError::Interrupted));
        assert_eq!(result.unwrap_err().exit_code(), 130);
        assert_eq!(*recorder.errors.lock().unwrap(), vec![failure]);
    }

    #[test]
    fn test_report_dispatches_and_returns_failures() {
        let (reporting, recorder, mut registry) = setup();
        let failures = vec![package_error(), other_error()];

        let result = reporting.report(&mut registry, OnPackageFailures::Report, |registry| {
            record(registry, &failures);
            Ok(())
        });

        assert_eq!(result, Ok(failures.clone()));
        assert_eq!(*recorder.errors.lock().unwrap(), failures);
    }

    #[test]
    fn test_report_dispatches_before_reraising_interrupt() {
        let (reporting, recorder, mut registry) = setup();
        let failures = vec![package_error(), other_error()];

        let result = reporting.report(&mut registry, OnPackageFailures::Report, |registry| {
            record(registry, &failures);
            Err(Error::Interrupted)
        });

        assert_eq!(result, Err(ReportError::Interrupted));
        assert_eq!(recorder.errors.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_block_error_becomes_fatal_run_failure() {
        let (reporting, recorder, mut registry) = setup();

        let result = reporting.report(&mut registry, OnPackageFailures::Exit, |_| {
            Err(Error::CycleDetected {
                cycle: "a -> b -> a".to_string(),
            })
        });

        let err = result.unwrap_err();
        assert_eq!(err.exit_code(), 1);
        let reported = recorder.errors.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].is_fatal());
        assert_eq!(reported[0].package(), None);
        assert!(reported[0].message().contains("a -> b -> a"));
    }

    #[test]
    fn test_success_reaches_every_reporter() {
        let (mut reporting, recorder, _) = setup();
        let second = RecordingReporter::default();
        reporting.add_reporter(second.clone());

        reporting.success();
        assert_eq!(*recorder.successes.lock().unwrap(), 1);
        assert_eq!(*second.successes.lock().unwrap(), 1);
        assert_eq!(reporting.len(), 2);
    }
}
