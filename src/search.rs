//! The search engine: walks the prioritized space, executes tests via a
//! test oracle, and exploits value-based test equivalence to partition many
//! candidate patches into pass/fail cohorts from a single test execution.
//!
//! `find_next` below implements that step-by-step algorithm verbatim.

use crate::config::{PatchPrioritization, TestPrioritization};
use crate::model::{Coverage, CoverageSet, Location, Patch, PatchID};
use crate::runtime::Runtime;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// The three oracle verdicts: timeouts are explicit, not inferred from exit
/// codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Pass,
    Fail,
    Timeout,
}

/// The test-driver collaborator contract: exposes `execute` and
/// `driver_is_ok`. The oracle is expected to honor the environment the
/// engine sets (the six `F1X_*` variables) and be deterministic modulo
/// timing.
pub trait TestOracle {
    fn execute(&mut self, test: &str) -> TestStatus;
    fn driver_is_ok(&self) -> bool;

    /// The on-disk path of the driver executable, if this oracle has one,
    /// for error reporting when [`Self::driver_is_ok`] fails.
    fn driver_path(&self) -> Option<&Path> {
        None
    }
}

/// A concrete [`TestOracle`] that drives an external test-driver executable
/// by spawning it with the currently-set `F1X_*` environment variables and a
/// wall-clock timeout, following the same subprocess idiom used elsewhere in
/// this crate for invoking external tools (`Command::new(..).output()`),
/// generalized with a timeout since [`std::process::Child`] has none built
/// in: a waiter thread blocks on `child.wait()` and reports back over a
/// channel, and the caller
/// selects between that result and a deadline.
pub struct ProcessOracle {
    driver: std::path::PathBuf,
    timeout: Duration,
}

impl ProcessOracle {
    pub fn new(driver: impl Into<std::path::PathBuf>, timeout: Duration) -> Self {
        ProcessOracle { driver: driver.into(), timeout }
    }
}

impl TestOracle for ProcessOracle {
    fn execute(&mut self, test: &str) -> TestStatus {
        let mut child = match Command::new(&self.driver)
            .arg(test)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(_) => return TestStatus::Fail,
        };

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let status = child.wait();
            let _ = tx.send(status);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(status)) => {
                if status.success() {
                    TestStatus::Pass
                } else {
                    TestStatus::Fail
                }
            }
            Ok(Err(_)) => TestStatus::Fail,
            Err(_) => TestStatus::Timeout,
        }
    }

    fn driver_is_ok(&self) -> bool {
        is_executable(&self.driver)
    }

    fn driver_path(&self) -> Option<&Path> {
        Some(&self.driver)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Exploration/execution/timeout counters and accumulated non-timeout
/// execution time, queried at the end of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchStats {
    pub exploration_counter: u64,
    pub execution_counter: u64,
    pub timeout_counter: u64,
    pub non_timeout_counter: u64,
    pub non_timeout_test_time_ms: u64,
}

const SHOW_PROGRESS_STEP: u32 = 10;

/// The search engine's mutable state: `failing`, `passing`, `stat`,
/// `progress`, and (only when semantic-diff prioritization is on)
/// `coverage_set`. All mutated only by [`SearchEngine::find_next`] on the
/// single engine-owning thread.
pub struct SearchEngine<'a, O: TestOracle> {
    tests: &'a [String],
    oracle: O,
    runtime: &'a Runtime,
    value_teq: bool,
    test_prioritization: TestPrioritization,
    patch_prioritization: PatchPrioritization,
    /// `{appId -> every PatchID generated for that application}`: the
    /// partition the engine offers the runtime before each test execution
    /// (named `partitionable`/`groupable` in the original).
    partitionable: HashMap<u32, Vec<PatchID>>,
    related_test_indexes: HashMap<Location, Vec<usize>>,

    failing: HashSet<PatchID>,
    passing: HashMap<String, HashSet<PatchID>>,
    stat: SearchStats,
    progress: u32,
    coverage_set: CoverageSet,
}

impl<'a, O: TestOracle> SearchEngine<'a, O> {
    pub fn new(
        tests: &'a [String],
        oracle: O,
        runtime: &'a Runtime,
        value_teq: bool,
        test_prioritization: TestPrioritization,
        patch_prioritization: PatchPrioritization,
        partitionable: HashMap<u32, Vec<PatchID>>,
        related_test_indexes: HashMap<Location, Vec<usize>>,
    ) -> Self {
        let passing = tests.iter().map(|t| (t.clone(), HashSet::new())).collect();
        SearchEngine {
            tests,
            oracle,
            runtime,
            value_teq,
            test_prioritization,
            patch_prioritization,
            partitionable,
            related_test_indexes,
            failing: HashSet::new(),
            passing,
            stat: SearchStats::default(),
            progress: 0,
        }
    }

    pub fn statistics(&self) -> SearchStats {
        self.stat
    }

    /// Hand the oracle back to the caller once the search loop is done with
    /// it, so the validator can drive the remaining tests with the same
    /// test driver.
    pub fn into_oracle(self) -> O {
        self.oracle
    }

    pub fn coverage_set(&self) -> &CoverageSet {
        &self.coverage_set
    }

    /// Scan `search_space` starting at `from_idx`. Returns the index of the
    /// first candidate that passes every test in its
    /// (possibly test-order-adjusted) related-test list, or
    /// `search_space.len()` if the scan is exhausted without a pass.
    pub fn find_next(&mut self, search_space: &[Patch], from_idx: usize) -> usize {
        let mut cand_idx = from_idx;
        while cand_idx < search_space.len() {
            let candidate = &search_space[cand_idx];

            self.stat.exploration_counter += 1;
            let scan_progress = ((100 * cand_idx) / search_space.len()) as u32;
            if scan_progress >= self.progress {
                log::info!("exploration progress: {}%", self.progress);
                self.progress += SHOW_PROGRESS_STEP;
            }

            // Step 2: skip candidates already known to fail, under valueTEQ.
            if self.value_teq && self.failing.contains(&candidate.id) {
                cand_idx += 1;
                continue;
            }

            // Step 3: test order is the profiler's related-test list,
            // extended with any test not already in it, appended.
            let mut test_order = self
                .related_test_indexes
                .get(&candidate.app.location)
                .cloned()
                .unwrap_or_default();
            for idx in 0..self.tests.len() {
                if !test_order.contains(&idx) {
                    test_order.push(idx);
                }
            }

            let mut pass_all = true;

            let mut order_pos = 0;
            while order_pos < test_order.len() {
                let test_idx = test_order[order_pos];
                let test = &self.tests[test_idx];

                // Step 4a: already known to pass by prior partitioning.
                if self.value_teq && self.passing[test].contains(&candidate.id) {
                    order_pos += 1;
                    continue;
                }

                // Step 4b: write the partition set for this application.
                if self.value_teq {
                    let ids = self.partitionable.get(&candidate.app.app_id).cloned().unwrap_or_default();
                    let _ = self.runtime.set_partition(&ids);
                }

                // Step 4c: set the six F1X_* variables and execute.
                let env = Runtime::env_for(candidate.app.app_id, candidate.id);
                let _guard = crate::safety::ScopedEnv::set(&env);

                log::debug!("executing candidate {} with test {}", candidate.id, test);

                let started = Instant::now();
                let status = self.oracle.execute(test);
                let elapsed = started.elapsed();

                // Step 4d.
                self.stat.execution_counter += 1;
                match status {
                    TestStatus::Timeout => self.stat.timeout_counter += 1,
                    _ => {
                        self.stat.non_timeout_counter += 1;
                        self.stat.non_timeout_test_time_ms += elapsed.as_millis() as u64;
                    }
                }

                pass_all = status == TestStatus::Pass;

                // Step 4e: fold the runtime's consistent-subset verdict into
                // passing/failing, under valueTEQ.
                if self.value_teq {
                    let partition = self.runtime.get_partition().unwrap_or_default();
                    if partition.is_empty() {
                        log::warn!("partitioning failed for {} with test {}", candidate.id, test);
                    }

                    if self.patch_prioritization == PatchPrioritization::SemanticDiff {
                        let coverage = self.runtime.read_coverage(test).unwrap_or_default();
                        let mut per_patch: HashMap<PatchID, Coverage> = HashMap::new();
                        per_patch.insert(candidate.id, coverage.clone());
                        for &id in &partition {
                            per_patch.insert(id, coverage.clone());
                        }
                        self.coverage_set.insert(test.clone(), per_patch);
                    }

                    if pass_all {
                        let entry = self.passing.entry(test.clone()).or_default();
                        entry.insert(candidate.id);
                        entry.extend(partition.iter().copied());
                    } else {
                        self.failing.insert(candidate.id);
                        self.failing.extend(partition.iter().copied());
                    }
                }

                // Step 4f: on failure, optionally bump this test to the
                // front of the location's related-test list for subsequent
                // candidates, and stop trying tests for this candidate.
                if !pass_all {
                    if self.test_prioritization == TestPrioritization::MaxFailing {
                        let order = self.related_test_indexes.entry(candidate.app.location).or_default();
                        if let Some(pos) = order.iter().position(|&i| i == test_idx) {
                            let value = order.remove(pos);
                            order.insert(0, value);
                        }
                    }
                    break;
                }

                order_pos += 1;
            }

            if pass_all {
                return cand_idx;
            }
            cand_idx += 1;
        }

        cand_idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{get_integer_expression, LocationContext, ModificationKind, NodeKind, Operator, PatchMetadata, SchemaApplication, TransformationSchema, Type};
    use crate::model::Expression;
    use std::rc::Rc;

    struct ScriptedOracle {
        verdicts: HashMap<(String, PatchID), TestStatus>,
    }

    impl TestOracle for ScriptedOracle {
        fn execute(&mut self, test: &str) -> TestStatus {
            // Keyed only by test name for these unit tests; PatchID is read
            // from the environment the engine sets just before calling us.
            let base: u32 = std::env::var("F1X_ID_BASE").unwrap_or_default().parse().unwrap_or(0);
            let id = PatchID::new(base, 0, 0, 0, 0);
            self.verdicts.get(&(test.to_string(), id)).copied().unwrap_or(TestStatus::Fail)
        }

        fn driver_is_ok(&self) -> bool {
            true
        }
    }

    fn patch(app_id: u32, base: u32, location: Location) -> Patch {
        let original = Expression::op(
            Operator::Gt,
            Type::Boolean,
            vec![Expression::leaf(NodeKind::Variable, Type::Integer, "int", "x"), get_integer_expression(0)],
        );
        let app = Rc::new(SchemaApplication {
            app_id,
            schema: TransformationSchema::Expression,
            location,
            context: LocationContext::Condition,
            original,
            components: Vec::new(),
        });
        Patch {
            id: PatchID::new(base, 0, 0, 0, 0),
            app,
            modified: get_integer_expression(1),
            meta: PatchMetadata { kind: ModificationKind::Operator, distance: 1 },
        }
    }

    #[test]
    fn find_next_returns_first_candidate_that_passes_every_related_test() {
        let loc = Location { file_id: 0, begin_line: 1, begin_column: 1, end_line: 1, end_column: 1 };
        let tests = vec!["t0".to_string()];
        let space = vec![patch(1, 1, loc), patch(1, 2, loc)];

        let mut verdicts = HashMap::new();
        verdicts.insert(("t0".to_string(), PatchID::new(2, 0, 0, 0, 0)), TestStatus::Pass);
        let oracle = ScriptedOracle { verdicts };

        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(dir.path(), vec!["true".to_string()]);
        let mut related = HashMap::new();
        related.insert(loc, vec![0usize]);

        let mut engine = SearchEngine::new(
            &tests,
            oracle,
            &runtime,
            false,
            TestPrioritization::Original,
            PatchPrioritization::SyntacticDiff,
            HashMap::new(),
            related,
        );

        let found = engine.find_next(&space, 0);
        assert_eq!(found, 1);
        assert_eq!(engine.statistics().execution_counter, 2);
    }

    /// Successive `find_next` calls with increasing `from_idx` never return
    /// a smaller index than any previously returned one.
    #[test]
    fn find_next_progress_is_monotonic_across_calls() {
        let loc = Location { file_id: 0, begin_line: 1, begin_column: 1, end_line: 1, end_column: 1 };
        let tests = vec!["t0".to_string()];
        let space = vec![patch(1, 1, loc), patch(1, 2, loc), patch(1, 3, loc)];
        let oracle = ScriptedOracle { verdicts: HashMap::new() };

        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(dir.path(), vec!["true".to_string()]);

        let mut engine = SearchEngine::new(
            &tests,
            oracle,
            &runtime,
            false,
            TestPrioritization::Original,
            PatchPrioritization::SyntacticDiff,
            HashMap::new(),
            HashMap::new(),
        );

        let first = engine.find_next(&space, 0);
        assert_eq!(first, space.len());
        let second = engine.find_next(&space, first);
        assert!(second >= first);
    }

    /// Empty search space: `find_next` returns 0 immediately (S6's
    /// `repair` FAILURE case is grounded on this).
    #[test]
    fn find_next_on_empty_search_space_returns_zero() {
        let tests = vec!["t0".to_string()];
        let oracle = ScriptedOracle { verdicts: HashMap::new() };
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(dir.path(), vec!["true".to_string()]);
        let mut engine = SearchEngine::new(
            &tests,
            oracle,
            &runtime,
            false,
            TestPrioritization::Original,
            PatchPrioritization::SyntacticDiff,
            HashMap::new(),
            HashMap::new(),
        );
        assert_eq!(engine.find_next(&[], 0), 0);
        assert_eq!(engine.statistics().execution_counter, 0);
    }
}
