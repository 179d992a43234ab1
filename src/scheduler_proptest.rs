//! Property-based tests for the dependency graph and the scheduler.
//!
//! Dependency sets are generated so that package `i` only depends on
//! packages registered before it, which always yields an acyclic graph.

#[cfg(test)]
mod proptest_tests {
    use std::sync::{Arc, Mutex};

    use proptest::prelude::*;

    use crate::error::Result;
    use crate::graph::DependencyGraph;
    use crate::package::{BuildSteps, Package, PackageStatus, PhaseContext};
    use crate::registry::Registry;
    use crate::scheduler::{Scheduler, SchedulerConfig};
    use crate::subcommand::Runner;
    use crate::tools::ToolResolver;

    const MAX_PACKAGES: usize = 10;

    /// Records the order in which builds finish, failing on request
    struct Journal {
        finished: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl BuildSteps for Journal {
        fn build(&self, ctx: &PhaseContext<'_>) -> Result<()> {
            if self.fail {
                return Err(ctx.error("requested failure"));
            }
            self.finished.lock().unwrap().push(ctx.package.to_string());
            Ok(())
        }
    }

    fn name(index: usize) -> String {
        format!("pkg{}", index)
    }

    /// Direct dependencies of each package, as indices.
    fn dependency_sets() -> impl Strategy<Value = Vec<Vec<usize>>> {
        prop::collection::vec(prop::collection::vec(any::<bool>(), MAX_PACKAGES), 1..=MAX_PACKAGES).prop_map(
            |rows| {
                rows.iter()
                    .enumerate()
                    .map(|(i, row)| (0..i).filter(|&j| row[j]).collect())
                    .collect()
            },
        )
    }

    fn registry(deps: &[Vec<usize>], failing: &[bool], finished: &Arc<Mutex<Vec<String>>>) -> Registry {
        let mut registry = Registry::new();
        for (i, package_deps) in deps.iter().enumerate() {
            let package = Package::new(name(i))
                .with_dependencies(package_deps.iter().map(|&j| name(j)))
                .with_steps(Journal {
                    finished: Arc::clone(finished),
                    fail: failing.get(i).copied().unwrap_or(false),
                });
            registry.register(package).unwrap();
        }
        registry
    }

    fn scheduler(jobs: usize) -> Scheduler {
        let log_dir = std::env::temp_dir().join("metabuild-proptest-logs");
        let runner = Runner::new(Arc::new(ToolResolver::new()), log_dir);
        Scheduler::new(SchedulerConfig::default().with_jobs(jobs), Arc::new(runner))
    }

    /// Whether `index` or one of its transitive dependencies fails.
    fn blocked(index: usize, deps: &[Vec<usize>], failing: &[bool]) -> bool {
        failing[index] || deps[index].iter().any(|&j| blocked(j, deps, failing))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: the build order lists every package once, after all of
        /// its dependencies
        #[test]
        fn topological_order_respects_dependencies(deps in dependency_sets()) {
            let finished = Arc::new(Mutex::new(Vec::new()));
            let registry = registry(&deps, &[], &finished);
            let graph = DependencyGraph::build(&registry).unwrap();

            let order = graph.topological_order();
            prop_assert_eq!(order.len(), deps.len());
            let mut position = vec![usize::MAX; deps.len()];
            for (pos, &index) in order.iter().enumerate() {
                prop_assert_eq!(position[index], usize::MAX, "package {} listed twice", index);
                position[index] = pos;
            }
            for (i, package_deps) in deps.iter().enumerate() {
                for &j in package_deps {
                    prop_assert!(position[j] < position[i]);
                }
            }
        }

        /// Property: an acyclic package set always terminates with every
        /// package built after its dependencies
        #[test]
        fn acyclic_runs_build_everything(deps in dependency_sets(), jobs in 1usize..4) {
            let finished = Arc::new(Mutex::new(Vec::new()));
            let mut registry = registry(&deps, &[], &finished);

            let summary = scheduler(jobs).run(&mut registry).unwrap();
            prop_assert!(summary.is_success());
            prop_assert_eq!(summary.succeeded.len(), deps.len());

            let finished = finished.lock().unwrap();
            let position = |i: usize| finished.iter().position(|n| *n == name(i)).unwrap();
            for (i, package_deps) in deps.iter().enumerate() {
                for &j in package_deps {
                    prop_assert!(position(j) < position(i));
                }
            }
        }

        /// Property: with keep_going, a package succeeds exactly when neither
        /// it nor any of its dependencies fails, and only packages that
        /// actually ran carry a failure record
        #[test]
        fn failures_only_reach_dependents(
            deps in dependency_sets(),
            failing in prop::collection::vec(any::<bool>(), MAX_PACKAGES),
            jobs in 1usize..4,
        ) {
            let failing = &failing[..deps.len()];
            let finished = Arc::new(Mutex::new(Vec::new()));
            let mut registry = registry(&deps, failing, &finished);

            scheduler(jobs).run(&mut registry).unwrap();

            for i in 0..deps.len() {
                let package = registry.get(&name(i)).unwrap();
                if blocked(i, &deps, failing) {
                    prop_assert_eq!(package.status(), PackageStatus::Failed);
                } else {
                    prop_assert_eq!(package.status(), PackageStatus::Succeeded);
                }
                let ran = failing[i] && !deps[i].iter().any(|&j| blocked(j, &deps, failing));
                prop_assert_eq!(package.failures().len(), usize::from(ran));
            }
        }
    }
}
