//! # Scheduler
//!
//! Runs the phases of every package of a [`Registry`] in dependency order,
//! with up to `jobs` packages in flight at once.
//!
//! ## Execution model
//!
//! - The dependency graph is validated before anything runs: an unknown
//!   dependency or a cycle fails the run without executing a single phase.
//! - A package becomes ready once every dependency has succeeded. Ready
//!   packages wait in a shared queue that `jobs` workers of a `rayon` pool
//!   drain. All bookkeeping lives behind one mutex; a condition variable
//!   wakes idle workers when new packages become ready.
//! - When a phase fails, the failure is recorded on the package and every
//!   package depending on it, directly or not, is marked failed without
//!   running anything. Independent packages keep building.
//! - A fatal failure, a failure with `keep_going` disabled, or cancellation
//!   halts the run: no new package starts, in-flight packages stop after
//!   their current phase and are marked aborted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};

use crate::defaults;
use crate::error::{Error, Result};
use crate::failure::Failure;
use crate::graph::DependencyGraph;
use crate::importer::ImportOptions;
use crate::package::{PackageStatus, Phase};
use crate::registry::Registry;
use crate::subcommand::Runner;

/// How often idle workers look at the cancellation flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings of a scheduling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of packages processed at the same time
    pub jobs: usize,
    /// Keep building independent packages after a failure
    pub keep_going: bool,
    pub import: ImportOptions,
    /// Phases to run, executed in their natural order
    pub phases: Vec<Phase>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            jobs: defaults::default_jobs(),
            keep_going: true,
            import: ImportOptions::default(),
            phases: Phase::ALL.to_vec(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    pub fn with_import_options(mut self, import: ImportOptions) -> Self {
        self.import = import;
        self
    }

    pub fn with_phases<I: IntoIterator<Item = Phase>>(mut self, phases: I) -> Self {
        self.phases = phases.into_iter().collect();
        self
    }
}

/// Outcome of a run, package names in registration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Packages that never reached a terminal state
    pub not_run: Vec<String>,
    /// Whether the run stopped admitting packages early
    pub halted: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.not_run.is_empty() && !self.halted
    }
}

enum Outcome {
    Succeeded,
    Failed(Failure),
    /// Stopped between two phases because the run halted
    Aborted,
    Interrupted,
}

struct RunState {
    status: Vec<PackageStatus>,
    failures: Vec<Vec<Failure>>,
    /// Number of dependencies that have not succeeded yet
    remaining: Vec<usize>,
    ready: VecDeque<usize>,
    running: usize,
    halted: bool,
}

pub struct Scheduler {
    config: SchedulerConfig,
    runner: Arc<Runner>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, runner: Arc<Runner>) -> Self {
        Self {
            config,
            runner,
            cancel: None,
        }
    }

    /// Stops admitting packages once `flag` is set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn runner(&self) -> &Arc<Runner> {
        &self.runner
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Runs every package of `registry`.
    ///
    /// The outcome of the previous run is discarded first. Statuses and
    /// failures are written back to the registry before returning, including
    /// when the run was cancelled, in which case `Error::Interrupted` is
    /// returned.
    pub fn run(&self, registry: &mut Registry) -> Result<RunSummary> {
        registry.reset_outcomes();
        let graph = DependencyGraph::build(registry)?;
        let count = registry.len();
        if count == 0 {
            return Ok(RunSummary::default());
        }

        let mut phases = self.config.phases.clone();
        phases.sort();
        phases.dedup();

        let remaining: Vec<usize> = (0..count).map(|i| graph.dependencies(i).len()).collect();
        let ready: VecDeque<usize> = (0..count).filter(|&i| remaining[i] == 0).collect();
        let mut status = vec![PackageStatus::Pending; count];
        for &i in &ready {
            status[i] = PackageStatus::Ready;
        }
        let shared = (
            Mutex::new(RunState {
                status,
                failures: vec![Vec::new(); count],
                remaining,
                ready,
                running: 0,
                halted: false,
            }),
            Condvar::new(),
        );

        let workers = self.config.jobs.max(1).min(count);
        info!("building {} packages with {} workers", count, workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("metabuild-worker-{}", i))
            .build()?;

        let view: &Registry = registry;
        pool.scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|_| self.worker(view, &graph, &phases, &shared));
            }
        });

        let state = shared.0.into_inner().unwrap_or_else(PoisonError::into_inner);
        let summary = write_back(registry, state);
        if self.cancelled() {
            warn!("build interrupted");
            return Err(Error::Interrupted);
        }
        Ok(summary)
    }

    fn worker(
        &self,
        registry: &Registry,
        graph: &DependencyGraph,
        phases: &[Phase],
        shared: &(Mutex<RunState>, Condvar),
    ) {
        let (mutex, condvar) = shared;
        loop {
            let index = {
                let mut state = lock(mutex);
                loop {
                    if state.halted || self.cancelled() {
                        state.halted = true;
                        condvar.notify_all();
                        return;
                    }
                    if let Some(index) = state.ready.pop_front() {
                        state.running += 1;
                        break index;
                    }
                    if state.running == 0 {
                        // Nothing ready and nothing that could make a package ready
                        condvar.notify_all();
                        return;
                    }
                    state = condvar
                        .wait_timeout(state, POLL_INTERVAL)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0);
                }
            };

            let outcome = self.build_package(registry, index, phases, mutex);

            let mut state = lock(mutex);
            state.running -= 1;
            let name = registry.by_index(index).name();
            match outcome {
                Outcome::Succeeded => {
                    debug!("{}: succeeded", name);
                    state.status[index] = PackageStatus::Succeeded;
                    for dependent in graph.dependents(index) {
                        state.remaining[dependent] -= 1;
                        if state.remaining[dependent] == 0 && state.status[dependent] == PackageStatus::Pending {
                            state.status[dependent] = PackageStatus::Ready;
                            state.ready.push_back(dependent);
                        }
                    }
                }
                Outcome::Failed(failure) => {
                    let fatal = failure.is_fatal();
                    state.status[index] = PackageStatus::Failed;
                    state.failures[index].push(failure);
                    for dependent in graph.transitive_dependents(index) {
                        if !state.status[dependent].is_terminal() {
                            debug!(
                                "{}: not building, depends on failed package {}",
                                registry.by_index(dependent).name(),
                                name
                            );
                            state.status[dependent] = PackageStatus::Failed;
                        }
                    }
                    if fatal || !self.config.keep_going {
                        warn!("{}: failed, not starting any other package", name);
                        state.halted = true;
                    }
                }
                Outcome::Aborted => {
                    state.status[index] = PackageStatus::Aborted;
                }
                Outcome::Interrupted => {
                    state.status[index] = PackageStatus::Aborted;
                    state.halted = true;
                }
            }
            condvar.notify_all();
        }
    }

    fn build_package(&self, registry: &Registry, index: usize, phases: &[Phase], mutex: &Mutex<RunState>) -> Outcome {
        let package = registry.by_index(index);
        for &phase in phases {
            if lock(mutex).halted || self.cancelled() {
                return Outcome::Aborted;
            }
            if phase == Phase::Import && package.importer().is_none() {
                continue;
            }
            lock(mutex).status[index] = PackageStatus::Running(phase);
            info!("{}: {}", package.name(), phase);

            if let Err(error) = package.run_phase(phase, &self.runner, &self.config.import) {
                if error.is_interrupt() {
                    return Outcome::Interrupted;
                }
                warn!("{}", error);
                return Outcome::Failed(Failure::from_error(Some(package.name()), Some(phase), &error));
            }
        }
        Outcome::Succeeded
    }
}

fn lock(mutex: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn write_back(registry: &mut Registry, state: RunState) -> RunSummary {
    let mut summary = RunSummary {
        halted: state.halted,
        ..RunSummary::default()
    };
    for (index, (status, failures)) in state.status.into_iter().zip(state.failures).enumerate() {
        let status = match status {
            // Admitted but never started
            PackageStatus::Ready => PackageStatus::Pending,
            PackageStatus::Running(_) => PackageStatus::Aborted,
            other => other,
        };
        let package = registry.by_index_mut(index);
        package.set_status(status);
        for failure in failures {
            package.record_failure(failure);
        }
        let name = package.name().to_string();
        match status {
            PackageStatus::Succeeded => summary.succeeded.push(name),
            PackageStatus::Failed => summary.failed.push(name),
            _ => summary.not_run.push(name),
        }
    }
    summary
}
