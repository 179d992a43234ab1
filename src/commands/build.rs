//! # Build Command Implementation
//!
//! This module implements the `build` subcommand, which runs every phase of
//! every package declared in the manifest.
//!
//! ## Functionality
//!
//! - **Manifest Loading**: Reads `metabuild.yaml` (or the file given with
//!   `--manifest`) and registers its packages.
//! - **Scheduling**: Runs the packages on a worker pool, in dependency order.
//! - **Reporting**: Failures go to the console and, when configured, by mail,
//!   following the `on_package_failures` policy.
//! - **Interruption**: Ctrl-C stops admitting packages and kills nothing; the
//!   commands already running finish and the process exits with status 130.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use log::{error, info, warn};

use metabuild::config::Manifest;
use metabuild::defaults;
use metabuild::failure::Failure;
use metabuild::output::OutputConfig;
use metabuild::package::Phase;
use metabuild::reporting::{ConsoleReporter, MailReporter, OnPackageFailures, ReportError, Reporting};
use metabuild::scheduler::Scheduler;
use metabuild::subcommand::Runner;
use metabuild::tools::ToolResolver;

/// Arguments shared by `build` and `import`
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Path to the manifest describing the packages.
    #[arg(short, long, value_name = "FILE", default_value = defaults::MANIFEST_FILE)]
    pub manifest: PathBuf,

    /// Number of packages processed in parallel.
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Stop starting new packages after the first failure.
    #[arg(long)]
    pub fail_fast: bool,

    /// What to do with package failures (raise, exit, report).
    #[arg(long, value_name = "POLICY")]
    pub on_package_failures: Option<OnPackageFailures>,

    /// Do not access the network; only use what is already on disk.
    #[arg(long)]
    pub only_local: bool,

    /// Only checkout missing sources, leave existing ones alone.
    #[arg(long)]
    pub no_update: bool,

    /// Directory receiving the command logs.
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Directory where archives are downloaded.
    ///
    /// Can also be set with the `METABUILD_CACHE` environment variable.
    #[arg(long, value_name = "DIR", env = "METABUILD_CACHE")]
    pub cache_dir: Option<PathBuf>,

    /// Do not send notification mails.
    #[arg(long)]
    pub no_mail: bool,
}

/// Execute the `build` command.
pub fn execute(args: BuildArgs, output: OutputConfig) -> Result<ExitCode> {
    run(args, Phase::ALL.to_vec(), output)
}

/// Runs `phases` of every package of the manifest and turns the reported
/// outcome into an exit status.
pub(crate) fn run(args: BuildArgs, phases: Vec<Phase>, output: OutputConfig) -> Result<ExitCode> {
    let manifest = Manifest::from_file(&args.manifest)
        .with_context(|| format!("Failed to load manifest from {}", args.manifest.display()))?;

    let log_dir = args.log_dir.clone().unwrap_or_else(|| manifest.log_dir());
    let cache_dir = args.cache_dir.clone().unwrap_or_else(|| manifest.cache_dir());
    let policy = args
        .on_package_failures
        .unwrap_or(manifest.settings.on_package_failures);

    let mut config = manifest.scheduler_config().with_phases(phases);
    if let Some(jobs) = args.jobs {
        config = config.with_jobs(jobs);
    }
    if args.fail_fast {
        config = config.with_keep_going(false);
    }
    config.import.only_local |= args.only_local;
    if args.no_update {
        config.import.update = false;
    }

    let tools = Arc::new(ToolResolver::new());
    for (tool, program) in &manifest.settings.programs {
        tools.set_program(tool, program.clone())?;
    }

    let cancel = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(Arc::clone(&cancel));

    let runner = Runner::new(tools, &log_dir)
        .with_retry_policy(manifest.retry_policy())
        .with_cancellation(Arc::clone(&cancel));
    let scheduler = Scheduler::new(config, Arc::new(runner)).with_cancellation(cancel);

    let reporting = reporters(&args, &manifest, &log_dir, output);
    let mut registry = manifest.into_registry(&cache_dir)?;

    info!(
        "running {} on {} packages, logs in {}",
        scheduler
            .config()
            .phases
            .iter()
            .map(|phase| phase.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        registry.len(),
        log_dir.display()
    );

    let outcome = reporting.report(&mut registry, policy, |registry| {
        scheduler.run(registry).map(|summary| {
            info!(
                "{} packages succeeded, {} failed, {} not run",
                summary.succeeded.len(),
                summary.failed.len(),
                summary.not_run.len()
            );
        })
    });
    Ok(ExitCode::from(exit_status(&reporting, policy, outcome)))
}

fn reporters(args: &BuildArgs, manifest: &Manifest, log_dir: &std::path::Path, output: OutputConfig) -> Reporting {
    let post_success_message = manifest.settings.post_success_message.clone();
    let mut reporting = Reporting::new();

    let mut console = ConsoleReporter::new(output);
    if let Some(message) = &post_success_message {
        console = console.with_post_success_message(message);
    }
    reporting.add_reporter(console);

    if args.no_mail {
        return reporting;
    }
    if let Some(mut mail) = manifest.mail_config() {
        if args.log_dir.is_some() {
            mail.log_dir = Some(log_dir.to_path_buf());
        }
        let mut reporter = MailReporter::new(mail);
        if let Some(message) = post_success_message {
            reporter = reporter.with_post_success_message(message);
        }
        reporting.add_reporter(reporter);
    }
    reporting
}

/// Sets `cancel` on Ctrl-C.
fn install_interrupt_handler(cancel: Arc<AtomicBool>) {
    let result = ctrlc::set_handler(move || {
        if !cancel.swap(true, Ordering::AcqRel) {
            eprintln!("Interrupted, waiting for running commands to finish");
        }
    });
    if let Err(e) = result {
        warn!("cannot install the interrupt handler: {}", e);
    }
}

/// Exit status of a reported run.
///
/// Failures left over by the `report` policy do not fail the process, they
/// have been reported already.
fn exit_status(
    reporting: &Reporting,
    policy: OnPackageFailures,
    outcome: std::result::Result<Vec<Failure>, ReportError>,
) -> u8 {
    match outcome {
        Ok(failures) if failures.is_empty() => {
            reporting.success();
            0
        }
        Ok(failures) => {
            if policy == OnPackageFailures::Raise {
                // Not dispatched to the reporters
                for failure in &failures {
                    error!("{}", failure);
                }
            }
            warn!("{} package failure(s)", failures.len());
            match policy {
                OnPackageFailures::Report => 0,
                _ => 1,
            }
        }
        Err(ReportError::Interrupted) => {
            warn!("build interrupted");
            code_of(&ReportError::Interrupted)
        }
        Err(e @ ReportError::Exit { .. }) => code_of(&e),
        // Not dispatched to the reporters
        Err(e) => {
            error!("{}", e);
            code_of(&e)
        }
    }
}

fn code_of(error: &ReportError) -> u8 {
    u8::try_from(error.exit_code()).unwrap_or(1)
}
