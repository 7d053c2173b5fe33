//! The validator: a thin loop outside the core search engine that
//! re-applies a surviving patch source-level and re-runs the *entire* test
//! suite (not just the related subset the profiler singled out), restoring
//! the project unconditionally afterwards.
//!
//! This function's return value actually gates inclusion in the final
//! plausible-patch set; see DESIGN.md for the reasoning behind that choice.

use crate::model::Patch;
use crate::project::ProjectController;
use crate::search::TestOracle;

/// Apply `patch` to the project, rebuild, run every test in `tests`, then
/// unconditionally restore the project's original files - even if the
/// rebuild or a test execution failed early - and report whether every
/// test passed.
pub fn validate_patch<P: ProjectController, O: TestOracle>(
    project: &mut P,
    oracle: &mut O,
    tests: &[String],
    patch: &Patch,
) -> bool {
    if let Err(e) = project.apply_patch(patch) {
        log::warn!("patch application returned an error: {e}");
    }

    if !project.build_with_runtime(std::path::Path::new("")) {
        log::warn!("compilation with patch returned non-zero exit code");
    }

    log::info!("validating patch {}", patch.id);

    let mut failing_tests = Vec::new();
    for test in tests {
        if oracle.execute(test) != crate::search::TestStatus::Pass {
            failing_tests.push(test.clone());
        }
    }

    project.restore_files();

    if !failing_tests.is_empty() {
        log::warn!("generated patch failed validation");
        for test in &failing_tests {
            log::info!("failed test: {test}");
        }
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{get_integer_expression, Location, LocationContext, ModificationKind, NodeKind, Operator, PatchID, PatchMetadata, SchemaApplication, TransformationSchema, Type};
    use crate::model::Expression;
    use crate::project::ProjectFile;
    use crate::search::TestStatus;
    use std::collections::HashMap;
    use std::path::Path;
    use std::rc::Rc;

    struct FakeProject {
        applied: bool,
        restored: bool,
    }

    impl ProjectController for FakeProject {
        fn initial_build(&mut self) -> bool {
            true
        }
        fn build_with_runtime(&mut self, _header: &Path) -> bool {
            true
        }
        fn backup_files(&mut self) {}
        fn restore_files(&mut self) {
            self.restored = true;
        }
        fn apply_patch(&mut self, _patch: &Patch) -> Result<(), crate::project::ApplyError> {
            self.applied = true;
            Ok(())
        }
        fn compute_diff(&self, _file: &Path, _out: &Path) -> std::io::Result<()> {
            Ok(())
        }
        fn diff_inputs(&self, _file: &Path) -> std::io::Result<(String, String)> {
            Ok((String::new(), String::new()))
        }
        fn files(&self) -> &[ProjectFile] {
            &[]
        }
    }

    struct FixedOracle(HashMap<String, TestStatus>);

    impl TestOracle for FixedOracle {
        fn execute(&mut self, test: &str) -> TestStatus {
            self.0.get(test).copied().unwrap_or(TestStatus::Fail)
        }
        fn driver_is_ok(&self) -> bool {
            true
        }
    }

    fn sample_patch() -> Patch {
        let original = Expression::op(
            Operator::Gt,
            Type::Boolean,
            vec![Expression::leaf(NodeKind::Variable, Type::Integer, "int", "x"), get_integer_expression(0)],
        );
        let app = Rc::new(SchemaApplication {
            app_id: 1,
            schema: TransformationSchema::Expression,
            location: Location { file_id: 0, begin_line: 1, begin_column: 1, end_line: 1, end_column: 1 },
            context: LocationContext::Condition,
            original,
            components: Vec::new(),
        });
        Patch {
            id: PatchID::new(1, 0, 0, 0, 0),
            app,
            modified: get_integer_expression(1),
            meta: PatchMetadata { kind: ModificationKind::Operator, distance: 1 },
        }
    }

    #[test]
    fn validate_patch_restores_files_unconditionally_even_on_failure() {
        let mut project = FakeProject { applied: false, restored: false };
        let mut oracle = FixedOracle(HashMap::from([("t0".to_string(), TestStatus::Fail)]));
        let tests = vec!["t0".to_string()];

        let ok = validate_patch(&mut project, &mut oracle, &tests, &sample_patch());

        assert!(!ok);
        assert!(project.applied);
        assert!(project.restored);
    }

    #[test]
    fn validate_patch_succeeds_when_every_test_passes() {
        let mut project = FakeProject { applied: false, restored: false };
        let mut oracle = FixedOracle(HashMap::from([("t0".to_string(), TestStatus::Pass), ("t1".to_string(), TestStatus::Pass)]));
        let tests = vec!["t0".to_string(), "t1".to_string()];

        let ok = validate_patch(&mut project, &mut oracle, &tests, &sample_patch());

        assert!(ok);
        assert!(project.restored);
    }
}
