//! Packages and their phases
//!
//! A [`Package`] is a named unit of work with a source directory, an install
//! prefix, a list of dependency names, an optional [`Importer`] and a set of
//! [`BuildSteps`]. The scheduler drives every package through the four
//! [`Phase`]s in order: the import phase is backed by the importer, the other
//! three by the build steps supplied for the package's build system.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::failure::Failure;
use crate::importer::{ImportContext, ImportOptions, Importer};
use crate::subcommand::{RunOptions, Runner};

/// One named step of a package's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Import,
    Prepare,
    Build,
    Install,
}

impl Phase {
    /// All phases, in execution order.
    pub const ALL: [Phase; 4] = [Phase::Import, Phase::Prepare, Phase::Build, Phase::Install];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Import => "import",
            Phase::Prepare => "prepare",
            Phase::Build => "build",
            Phase::Install => "install",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "import" => Ok(Phase::Import),
            "prepare" => Ok(Phase::Prepare),
            "build" => Ok(Phase::Build),
            "install" => Ok(Phase::Install),
            other => Err(Error::config(None, format!("unknown phase '{}'", other))),
        }
    }
}

/// Where a package stands in the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Pending,
    /// Every dependency succeeded; waiting for a worker
    Ready,
    Running(Phase),
    Succeeded,
    /// Either one of its phases failed or one of its dependencies did
    Failed,
    /// The run stopped before this package could finish
    Aborted,
}

impl PackageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PackageStatus::Succeeded | PackageStatus::Failed)
    }
}

/// What a phase hook gets to work with.
pub struct PhaseContext<'a> {
    pub package: &'a str,
    pub phase: Phase,
    pub srcdir: &'a Path,
    pub prefix: &'a Path,
    pub runner: &'a Runner,
}

impl PhaseContext<'_> {
    /// Runs a tool for this package and phase. Commands run in the source
    /// directory unless `options` says otherwise.
    pub fn run<I, S>(&self, tool: &str, args: I, options: &RunOptions) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        if options.working_dir.is_none() && self.srcdir.is_dir() {
            let mut options = options.clone();
            options.working_dir = Some(self.srcdir.to_path_buf());
            return self.runner.run(self.package, self.phase, tool, args, &options);
        }
        self.runner.run(self.package, self.phase, tool, args, options)
    }

    /// A phase error attributed to this package and phase.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Phase {
            package: self.package.to_string(),
            phase: self.phase,
            message: message.into(),
        }
    }
}

/// Build-system specific phase bodies.
///
/// Every hook defaults to doing nothing, so a package type only implements
/// the phases it needs.
pub trait BuildSteps: Send + Sync {
    fn prepare(&self, _ctx: &PhaseContext<'_>) -> Result<()> {
        Ok(())
    }

    fn build(&self, _ctx: &PhaseContext<'_>) -> Result<()> {
        Ok(())
    }

    fn install(&self, _ctx: &PhaseContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Steps for packages that only need importing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSteps;

impl BuildSteps for NoSteps {}

/// Steps given as literal command lines, one list per phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSteps {
    #[serde(default)]
    pub prepare: Vec<Vec<String>>,
    #[serde(default)]
    pub build: Vec<Vec<String>>,
    #[serde(default)]
    pub install: Vec<Vec<String>>,
}

impl CommandSteps {
    fn run_all(&self, commands: &[Vec<String>], ctx: &PhaseContext<'_>) -> Result<()> {
        for command in commands {
            let (tool, args) = command
                .split_first()
                .ok_or_else(|| ctx.error("empty command line"))?;
            ctx.run(tool, args, &RunOptions::new())?;
        }
        Ok(())
    }
}

impl BuildSteps for CommandSteps {
    fn prepare(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        self.run_all(&self.prepare, ctx)
    }

    fn build(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        self.run_all(&self.build, ctx)
    }

    fn install(&self, ctx: &PhaseContext<'_>) -> Result<()> {
        self.run_all(&self.install, ctx)
    }
}

/// A declared package.
pub struct Package {
    name: String,
    srcdir: PathBuf,
    prefix: PathBuf,
    dependencies: Vec<String>,
    importer: Option<Box<dyn Importer>>,
    steps: Box<dyn BuildSteps>,
    status: PackageStatus,
    failures: Vec<Failure>,
}

impl Package {
    /// A package whose sources live in a directory named after it.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            srcdir: PathBuf::from(&name),
            prefix: PathBuf::from("install"),
            name,
            dependencies: Vec::new(),
            importer: None,
            steps: Box::new(NoSteps),
            status: PackageStatus::Pending,
            failures: Vec::new(),
        }
    }

    pub fn with_srcdir(mut self, srcdir: impl Into<PathBuf>) -> Self {
        self.srcdir = srcdir.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Declares a dependency. Declaring the same name twice has no effect.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    pub fn with_dependencies<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names.into_iter().fold(self, |package, name| package.depends_on(name))
    }

    pub fn with_importer(self, importer: impl Importer + 'static) -> Self {
        self.with_boxed_importer(Box::new(importer))
    }

    pub fn with_boxed_importer(mut self, importer: Box<dyn Importer>) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn with_steps(self, steps: impl BuildSteps + 'static) -> Self {
        self.with_boxed_steps(Box::new(steps))
    }

    pub fn with_boxed_steps(mut self, steps: Box<dyn BuildSteps>) -> Self {
        self.steps = steps;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn srcdir(&self) -> &Path {
        &self.srcdir
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn importer(&self) -> Option<&dyn Importer> {
        self.importer.as_deref()
    }

    pub fn status(&self) -> PackageStatus {
        self.status
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Appends a failure. The list only ever grows during a run.
    pub fn record_failure(&mut self, failure: Failure) {
        self.failures.push(failure);
    }

    pub fn has_failed(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Replaces `%s` in `format` with the package name.
    pub fn format_message(&self, format: &str) -> String {
        format.replace("%s", &self.name)
    }

    pub(crate) fn set_status(&mut self, status: PackageStatus) {
        self.status = status;
    }

    pub(crate) fn reset_outcome(&mut self) {
        self.status = PackageStatus::Pending;
        self.failures.clear();
    }

    /// Runs one phase of this package.
    pub fn run_phase(&self, phase: Phase, runner: &Runner, options: &ImportOptions) -> Result<()> {
        let ctx = PhaseContext {
            package: &self.name,
            phase,
            srcdir: &self.srcdir,
            prefix: &self.prefix,
            runner,
        };
        match phase {
            Phase::Import => {
                if let Some(importer) = &self.importer {
                    let import = ImportContext::new(&self.name, &self.srcdir, runner);
                    let changed = importer.import(&import, options)?;
                    if changed {
                        info!("{}", self.format_message("%s: source updated"));
                    }
                }
                Ok(())
            }
            Phase::Prepare => self.steps.prepare(&ctx),
            Phase::Build => self.steps.build(&ctx),
            Phase::Install => self.steps.install(&ctx),
        }
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("srcdir", &self.srcdir)
            .field("prefix", &self.prefix)
            .field("dependencies", &self.dependencies)
            .field("importer", &self.importer)
            .field("status", &self.status)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}
