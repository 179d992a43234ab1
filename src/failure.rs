//! Failure records collected during a scheduling run.
//!
//! A [`Failure`] is the value form of an [`Error`]: it names the package and
//! phase it originated from, keeps a human-readable message and knows whether
//! it must halt the whole run. Failures are cloneable so they can be stored on
//! packages, handed to reporters and returned to the caller at the same time.

use std::fmt;

use crate::error::Error;
use crate::package::Phase;

/// Coarse classification of a failure, mirroring the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Config,
    Subcommand,
    ToolNotFound,
    Phase,
    Other,
}

impl FailureKind {
    fn of(error: &Error) -> Self {
        match error.root() {
            Error::Config { .. }
            | Error::DuplicateName { .. }
            | Error::UnknownDependency { .. }
            | Error::CycleDetected { .. } => FailureKind::Config,
            Error::SubcommandFailed { .. } | Error::Spawn { .. } => FailureKind::Subcommand,
            Error::ToolNotFound { .. } => FailureKind::ToolNotFound,
            Error::Phase { .. } => FailureKind::Phase,
            _ => FailureKind::Other,
        }
    }
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    package: Option<String>,
    phase: Option<Phase>,
    message: String,
    kind: FailureKind,
    fatal: bool,
}

impl Failure {
    /// A non-fatal phase failure of `package`.
    pub fn new(package: impl Into<String>, phase: Phase, message: impl Into<String>) -> Self {
        Self {
            package: Some(package.into()),
            phase: Some(phase),
            message: message.into(),
            kind: FailureKind::Phase,
            fatal: false,
        }
    }

    /// Captures `error` as a failure. The failure is fatal when the error was
    /// marked with [`Error::fatal`].
    pub fn from_error(package: Option<&str>, phase: Option<Phase>, error: &Error) -> Self {
        Self {
            package: package.map(str::to_string),
            phase,
            message: error.detail(),
            kind: FailureKind::of(error),
            fatal: error.is_fatal(),
        }
    }

    pub fn with_fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// Whether mail reporters should send a notification for this failure.
    pub fn mail(&self) -> bool {
        true
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(package) = &self.package {
            write!(f, "{}: ", package)?;
        }
        if let Some(phase) = self.phase {
            write!(f, "{}: ", phase)?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Failure {}

/// Several independent failures raised as one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeError {
    original_errors: Vec<Failure>,
}

impl CompositeError {
    pub fn new(original_errors: Vec<Failure>) -> Self {
        Self { original_errors }
    }

    /// The wrapped failures, in the order they were recorded.
    pub fn original_errors(&self) -> &[Failure] {
        &self.original_errors
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred", self.original_errors.len())?;
        for (i, failure) in self.original_errors.iter().enumerate() {
            write!(f, "\n({}) {}", i, failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_failure_display() {
        let failure = Failure::new("base", Phase::Build, "compilation failed");
        assert_eq!(failure.to_string(), "base: build: compilation failed");
        assert!(!failure.is_fatal());
        assert!(failure.mail());
    }

    #[test]
    fn test_failure_from_subcommand_error() {
        let error = Error::SubcommandFailed {
            package: "base".to_string(),
            phase: Phase::Import,
            command: "git fetch origin".to_string(),
            status: Some(128),
            log: PathBuf::from("log/base-import.log"),
        };
        let failure = Failure::from_error(Some("base"), Some(Phase::Import), &error);
        assert_eq!(failure.kind(), FailureKind::Subcommand);
        assert_eq!(failure.package(), Some("base"));
        assert_eq!(failure.phase(), Some(Phase::Import));
        assert!(failure.message().contains("git fetch origin"));
        assert!(!failure.is_fatal());
    }

    #[test]
    fn test_failure_from_fatal_error_keeps_inner_message() {
        let error = Error::config(Some("base"), "wrong origin").fatal();
        let failure = Failure::from_error(Some("base"), Some(Phase::Import), &error);
        assert!(failure.is_fatal());
        assert_eq!(failure.kind(), FailureKind::Config);
        assert_eq!(failure.message(), "Configuration error in base: wrong origin");
    }

    #[test]
    fn test_run_level_failure_display() {
        let error = Error::CycleDetected {
            cycle: "a -> a".to_string(),
        };
        let failure = Failure::from_error(None, None, &error);
        assert_eq!(
            failure.to_string(),
            "Cycle detected in package dependencies: a -> a"
        );
    }

    #[test]
    fn test_composite_error_display() {
        let composite = CompositeError::new(vec![
            Failure::new("a", Phase::Build, "first"),
            Failure::new("b", Phase::Install, "second"),
        ]);
        let display = composite.to_string();
        assert!(display.starts_with("2 errors occurred"));
        assert!(display.contains("(0) a: build: first"));
        assert!(display.contains("(1) b: install: second"));
        assert_eq!(composite.original_errors().len(), 2);
    }
}
