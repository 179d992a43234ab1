//! # Subcommand Runner
//!
//! The [`Runner`] is the only place where metabuild spawns processes. Every
//! command runs on behalf of a package and a phase: its combined standard
//! output and error are appended to the log file of that package and phase,
//! and a non-zero exit status becomes [`Error::SubcommandFailed`].
//!
//! Commands marked as retryable go through the runner's [`RetryPolicy`].
//! Errors that retrying cannot fix, such as a missing tool or a program that
//! cannot be started at all, are surfaced immediately.

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::{Error, Result};
use crate::package::Phase;
use crate::retry::RetryPolicy;
use crate::tools::ToolResolver;

/// Per-call options of [`Runner::run`]
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory the command runs in; the current directory when unset
    pub working_dir: Option<PathBuf>,
    /// Apply the runner's retry policy when the command exits non-zero
    pub retry: bool,
    /// Extra environment variables for the child process
    pub env: Vec<(String, String)>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Spawns external commands with logging and retry.
pub struct Runner {
    tools: Arc<ToolResolver>,
    log_dir: PathBuf,
    retry: RetryPolicy,
    cancel: Option<Arc<AtomicBool>>,
    logs: Mutex<BTreeSet<PathBuf>>,
}

impl Runner {
    pub fn new(tools: Arc<ToolResolver>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools,
            log_dir: log_dir.into(),
            retry: RetryPolicy::default(),
            cancel: None,
            logs: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stops retrying, and refuses to start new commands, once `flag` is set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn tools(&self) -> &Arc<ToolResolver> {
        &self.tools
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The log file of `package` for `phase`.
    pub fn log_path(&self, package: &str, phase: Phase) -> PathBuf {
        self.log_dir.join(format!("{}-{}.log", package, phase))
    }

    /// Log files written by this runner so far.
    pub fn log_files(&self) -> Vec<PathBuf> {
        match self.logs.lock() {
            Ok(logs) => logs.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Runs `tool` with `args` for `package` during `phase`.
    ///
    /// `tool` is a logical name resolved through the [`ToolResolver`]. The
    /// returned string is the output this invocation appended to the log.
    pub fn run<I, S>(
        &self,
        package: &str,
        phase: Phase,
        tool: &str,
        args: I,
        options: &RunOptions,
    ) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let executable = self.tools.resolve(tool)?;
        let command_line = render_command(tool, &args);

        let policy = if options.retry {
            self.retry.clone()
        } else {
            RetryPolicy::none()
        };
        policy.execute(&command_line, self.cancel.as_deref(), |attempt| {
            self.spawn(package, phase, &executable, &args, &command_line, options, attempt)
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn(
        &self,
        package: &str,
        phase: Phase,
        executable: &Path,
        args: &[OsString],
        command_line: &str,
        options: &RunOptions,
        attempt: u32,
    ) -> Result<String> {
        let log_path = self.log_path(package, phase);
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        if attempt > 1 {
            writeln!(log, "# attempt {}", attempt)?;
        }
        writeln!(log, "$ {}", command_line)?;
        let start = log.metadata()?.len();
        self.remember_log(&log_path);

        let mut command = Command::new(executable);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?));
        if let Some(dir) = &options.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }

        debug!("{}: {}: running '{}'", package, phase, command_line);
        let status = command.status().map_err(|source| Error::Spawn {
            command: command_line.to_string(),
            source,
        })?;

        let output = read_from(&log_path, start)?;
        if !status.success() {
            return Err(Error::SubcommandFailed {
                package: package.to_string(),
                phase,
                command: command_line.to_string(),
                status: status.code(),
                log: log_path,
            });
        }
        Ok(output)
    }

    fn remember_log(&self, path: &Path) {
        let mut logs = match self.logs.lock() {
            Ok(logs) => logs,
            Err(poisoned) => poisoned.into_inner(),
        };
        logs.insert(path.to_path_buf());
    }
}

fn render_command(tool: &str, args: &[OsString]) -> String {
    let mut line = tool.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

fn read_from(path: &Path, offset: u64) -> Result<String> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
