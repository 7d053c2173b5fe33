//! End-to-end pipeline tests: drive `repair` from schema applications
//! through to an emitted unified diff, against an on-disk fixture project
//! and a scripted test oracle (no real compiler or test suite involved -
//! the `build_command`s are no-ops and the oracle's verdicts are canned).

use f1x_repair::model::{
    get_integer_expression, Expression, Location, LocationContext, NodeKind, Operator, PatchID,
    SchemaApplication, TransformationSchema, Type,
};
use f1x_repair::project::{ProjectFile, SourceProjectController};
use f1x_repair::runtime::Runtime;
use f1x_repair::search::{TestOracle, TestStatus};
use f1x_repair::{repair, RepairConfig, RepairInputs, RepairStatus};
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;

/// An oracle that consults a fixed `(test, PatchID) -> TestStatus` table,
/// reading the candidate's coordinates back out of the environment the
/// engine sets before each execution - exactly what the compiled dispatch
/// binary's `F1X_ID_*` variables would carry.
struct ScriptedOracle {
    verdicts: HashMap<(String, PatchID), TestStatus>,
}

impl TestOracle for ScriptedOracle {
    fn execute(&mut self, test: &str) -> TestStatus {
        let id = PatchID::new(
            std::env::var("F1X_ID_BASE").unwrap_or_default().parse().unwrap_or(0),
            std::env::var("F1X_ID_INT2").unwrap_or_default().parse().unwrap_or(0),
            std::env::var("F1X_ID_BOOL2").unwrap_or_default().parse().unwrap_or(0),
            std::env::var("F1X_ID_COND3").unwrap_or_default().parse().unwrap_or(0),
            std::env::var("F1X_ID_PARAM").unwrap_or_default().parse().unwrap_or(0),
        );
        self.verdicts.get(&(test.to_string(), id)).copied().unwrap_or(TestStatus::Fail)
    }

    fn driver_is_ok(&self) -> bool {
        true
    }
}

fn off_by_one_application() -> Rc<SchemaApplication> {
    let original = Expression::op(
        Operator::Gt,
        Type::Boolean,
        vec![
            Expression::leaf(NodeKind::Variable, Type::Integer, "int", "x"),
            get_integer_expression(0),
        ],
    );
    Rc::new(SchemaApplication {
        app_id: 1,
        schema: TransformationSchema::Expression,
        location: Location { file_id: 0, begin_line: 2, begin_column: 7, end_line: 2, end_column: 12 },
        context: LocationContext::Condition,
        original,
        components: Vec::new(),
    })
}

/// The `swapping`, `operator`, `concretization`, and `negation` families
/// are the only ones this bare (no in-scope components) application
/// generates; by construction only the `x >= 0` operator-replacement
/// candidate is wired to pass, so `repair` must walk past the cheaper
/// `swapping`/earlier-`operator` candidates before finding it.
#[test]
fn repair_finds_the_off_by_one_fix_and_emits_a_diff() {
    let project_dir = tempfile::tempdir().unwrap();
    let source = project_dir.path().join("main.c");
    fs::write(&source, "int main() {\n  if (x > 0) { return 1; }\n}\n").unwrap();

    let data_dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::new(data_dir.path(), vec!["true".to_string()]);

    let mut project = SourceProjectController::new(
        project_dir.path(),
        vec![ProjectFile { relpath: "main.c".into(), file_id: 0 }],
        vec!["true".to_string()],
    );

    // The winning candidate is the `x >= 0` operator replacement: family
    // base 1 (operator replacements are generated first), auxiliary `int2`
    // 5 (last surviving member of `{Eq,Neq,Lt,Le,Ge}` after `Gt` itself is
    // filtered out).
    let winning_id = PatchID::new(1, 5, 0, 0, 0);
    let mut verdicts = HashMap::new();
    verdicts.insert(("t0".to_string(), winning_id), TestStatus::Pass);
    let oracle = ScriptedOracle { verdicts };

    let inputs = RepairInputs {
        schema_applications: vec![off_by_one_application()],
        tests: vec!["t0".to_string()],
        related_test_indexes: HashMap::new(),
    };

    let config = RepairConfig { value_teq: false, ..RepairConfig::default() };
    let output = project_dir.path().join("fix.patch");

    let status = repair(&mut project, oracle, &runtime, inputs, &config, &output);

    assert_eq!(status, RepairStatus::Success);
    let diff = fs::read_to_string(&output).unwrap();
    assert!(diff.contains("x >= 0"), "expected the operator-replacement fix in the diff:\n{diff}");
}

#[test]
fn repair_reports_failure_when_no_candidate_satisfies_the_tests() {
    let project_dir = tempfile::tempdir().unwrap();
    let source = project_dir.path().join("main.c");
    fs::write(&source, "int main() {\n  if (x > 0) { return 1; }\n}\n").unwrap();

    let data_dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::new(data_dir.path(), vec!["true".to_string()]);

    let mut project = SourceProjectController::new(
        project_dir.path(),
        vec![ProjectFile { relpath: "main.c".into(), file_id: 0 }],
        vec!["true".to_string()],
    );

    let oracle = ScriptedOracle { verdicts: HashMap::new() };

    let inputs = RepairInputs {
        schema_applications: vec![off_by_one_application()],
        tests: vec!["t0".to_string()],
        related_test_indexes: HashMap::new(),
    };

    let config = RepairConfig { value_teq: false, ..RepairConfig::default() };
    let output = project_dir.path().join("fix.patch");

    let status = repair(&mut project, oracle, &runtime, inputs, &config, &output);
    assert_eq!(status, RepairStatus::Failure);
    assert!(!output.exists());
}

#[test]
fn repair_reports_no_negative_tests_when_the_test_list_is_empty() {
    let project_dir = tempfile::tempdir().unwrap();
    fs::write(project_dir.path().join("main.c"), "int main() { return 0; }\n").unwrap();

    let data_dir = tempfile::tempdir().unwrap();
    let runtime = Runtime::new(data_dir.path(), vec!["true".to_string()]);

    let mut project = SourceProjectController::new(
        project_dir.path(),
        vec![ProjectFile { relpath: "main.c".into(), file_id: 0 }],
        vec!["true".to_string()],
    );

    let oracle = ScriptedOracle { verdicts: HashMap::new() };
    let inputs = RepairInputs {
        schema_applications: vec![off_by_one_application()],
        tests: Vec::new(),
        related_test_indexes: HashMap::new(),
    };

    let config = RepairConfig::default();
    let output = project_dir.path().join("fix.patch");
    let status = repair(&mut project, oracle, &runtime, inputs, &config, &output);
    assert_eq!(status, RepairStatus::NoNegativeTests);
}
