//! Runtime artifact management: generate the C dispatch source/header
//! pair from a search space, compile the instrumented project against it,
//! and drive the partition channel the compiled binary reads its active
//! `PatchID` from.
//!
//! The compiled binary selects a patch two ways, matching the original
//! `f1x` runtime contract: the six `F1X_*` environment variables (read once
//! per process, used by the oracle for single-shot execution), and the
//! partition channel file (read once per process, used when the compiled
//! binary partitions many tests across many candidate patches without a
//! respawn per patch).

use crate::error::BuildError;
use crate::model::{expression_to_string, Expression, NodeKind, Patch, PatchID, SchemaApplication};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::rc::Rc;

const RUNTIME_SOURCE_NAME: &str = "f1x_runtime.c";
const RUNTIME_HEADER_NAME: &str = "f1x_runtime.h";
const PARTITION_FILE_NAME: &str = "f1x_partition";

/// Generate the runtime dispatch source and header text for a full search
/// space. One `__f1x_<appId>` function is emitted per schema application;
/// its parameter list is the free variables referenced by the application's
/// original expression and its in-scope components, and its body selects
/// among the application's patches by comparing the process's current
/// `PatchID` coordinates against each patch's.
pub fn codegen(
    applications: &[Rc<SchemaApplication>],
    patches: &[Patch],
    by_app: &BTreeMap<u32, Vec<usize>>,
) -> (String, String) {
    let mut header = String::new();
    header.push_str("#ifndef F1X_RUNTIME_H\n#define F1X_RUNTIME_H\n\n");
    header.push_str("struct f1x_coordinates {\n");
    header.push_str("    unsigned base;\n    unsigned int2;\n    unsigned bool2;\n    unsigned cond3;\n    unsigned param;\n");
    header.push_str("};\n\n");
    header.push_str("struct f1x_coordinates f1x_read_coordinates(void);\n\n");

    let mut source = String::new();
    source.push_str("#include <stdio.h>\n#include <stdlib.h>\n#include <string.h>\n");
    source.push_str(&format!("#include \"{RUNTIME_HEADER_NAME}\"\n\n"));
    source.push_str("static unsigned f1x_env_uint(const char *name) {\n");
    source.push_str("    const char *value = getenv(name);\n");
    source.push_str("    return value ? (unsigned) strtoul(value, NULL, 10) : 0;\n");
    source.push_str("}\n\n");
    source.push_str("struct f1x_coordinates f1x_read_coordinates(void) {\n");
    source.push_str("    struct f1x_coordinates c;\n");
    source.push_str("    c.base = f1x_env_uint(\"F1X_ID_BASE\");\n");
    source.push_str("    c.int2 = f1x_env_uint(\"F1X_ID_INT2\");\n");
    source.push_str("    c.bool2 = f1x_env_uint(\"F1X_ID_BOOL2\");\n");
    source.push_str("    c.cond3 = f1x_env_uint(\"F1X_ID_COND3\");\n");
    source.push_str("    c.param = f1x_env_uint(\"F1X_ID_PARAM\");\n");
    source.push_str("    return c;\n}\n\n");

    for app in applications {
        let Some(indices) = by_app.get(&app.app_id) else { continue };
        let params = collect_parameters(app);
        let param_list = if params.is_empty() {
            "void".to_string()
        } else {
            params.iter().map(|(repr, raw_type)| declare(raw_type, repr)).collect::<Vec<_>>().join(", ")
        };

        header.push_str(&format!(
            "{} __f1x_{}({});\n",
            declare(&app.original.raw_type, ""),
            app.app_id,
            param_list
        ));

        source.push_str(&format!("/* schema application {} at file {} line {} */\n", app.app_id, app.location.file_id, app.location.begin_line));
        source.push_str(&format!(
            "{} __f1x_{}({}) {{\n",
            declare(&app.original.raw_type, ""),
            app.app_id,
            param_list
        ));
        source.push_str("    struct f1x_coordinates c = f1x_read_coordinates();\n");

        for &idx in indices {
            let patch = &patches[idx];
            source.push_str(&format!(
                "    if (c.base == {} && c.int2 == {} && c.bool2 == {} && c.cond3 == {} && c.param == {}) return {};\n",
                patch.id.base,
                patch.id.int2,
                patch.id.bool2,
                patch.id.cond3,
                patch.id.param,
                expression_to_string(&patch.modified),
            ));
        }

        source.push_str(&format!("    return {};\n}}\n\n", expression_to_string(&app.original)));
    }

    header.push_str("\n#endif\n");
    (source, header)
}

fn declare(raw_type: &str, name: &str) -> String {
    let raw_type = if raw_type.is_empty() { "int" } else { raw_type };
    if name.is_empty() {
        raw_type.to_string()
    } else if raw_type.ends_with('*') {
        format!("{raw_type}{name}")
    } else {
        format!("{raw_type} {name}")
    }
}

/// Collect the distinct `(repr, raw_type)` pairs of every `Variable`-kind
/// leaf reachable from an application's original expression and its
/// components, in first-discovery order.
fn collect_parameters(app: &SchemaApplication) -> Vec<(String, String)> {
    let mut seen = Vec::new();
    collect_variables(&app.original, &mut seen);
    for component in &app.components {
        collect_variables(component, &mut seen);
    }
    seen
}

fn collect_variables(expr: &Expression, out: &mut Vec<(String, String)>) {
    if expr.kind == NodeKind::Variable && !out.iter().any(|(repr, _)| repr == &expr.repr) {
        out.push((expr.repr.clone(), expr.raw_type.clone()));
    }
    for arg in &expr.args {
        collect_variables(arg, out);
    }
}

/// Paths and build invocation for one repair run's runtime artifacts,
/// rooted at the instrumented project's build directory.
pub struct Runtime {
    build_dir: PathBuf,
    build_command: Vec<String>,
}

impl Runtime {
    pub fn new(build_dir: impl Into<PathBuf>, build_command: Vec<String>) -> Self {
        Runtime { build_dir: build_dir.into(), build_command }
    }

    pub fn source_path(&self) -> PathBuf {
        self.build_dir.join(RUNTIME_SOURCE_NAME)
    }

    pub fn header_path(&self) -> PathBuf {
        self.build_dir.join(RUNTIME_HEADER_NAME)
    }

    pub fn partition_path(&self) -> PathBuf {
        self.build_dir.join(PARTITION_FILE_NAME)
    }

    /// Write the generated dispatch source/header, atomically.
    pub fn write_artifacts(&self, source: &str, header: &str) -> Result<(), BuildError> {
        write_atomic(&self.source_path(), source.as_bytes())
            .map_err(|source| BuildError::Spawn { artifact: RUNTIME_SOURCE_NAME.to_string(), source })?;
        write_atomic(&self.header_path(), header.as_bytes())
            .map_err(|source| BuildError::Spawn { artifact: RUNTIME_HEADER_NAME.to_string(), source })?;
        Ok(())
    }

    /// Build the instrumented project against the freshly written runtime
    /// artifacts, using the project's own build command.
    pub fn compile(&self) -> Result<(), BuildError> {
        let Some((program, args)) = self.build_command.split_first() else {
            return Err(BuildError::MissingArtifact { path: self.build_dir.clone() });
        };

        let mut cmd = Command::new(program);
        cmd.current_dir(&self.build_dir).args(args).stdout(Stdio::null()).stderr(Stdio::piped());

        let output = cmd.output().map_err(|source| BuildError::Spawn { artifact: program.clone(), source })?;

        if !output.status.success() {
            return Err(BuildError::NonZeroExit { artifact: program.clone(), status: output.status.code() });
        }
        Ok(())
    }

    /// Write the partition channel: one line per candidate `PatchID`, in the
    /// order the compiled binary should try them for the remainder of the
    /// current process's execution.
    pub fn set_partition(&self, ids: &[PatchID]) -> std::io::Result<()> {
        let body: String = ids.iter().map(|id| format!("{}\n", id.to_line())).collect();
        write_atomic(&self.partition_path(), body.as_bytes())
    }

    /// Read back the partition channel after the compiled binary has run.
    /// The runtime overwrites the file in place, narrowing it down to the
    /// subset of `PatchID`s it determined were value-equivalent to the
    /// executed candidate for this test - an empty vector if partitioning
    /// failed or nothing was consistent.
    pub fn get_partition(&self) -> std::io::Result<Vec<PatchID>> {
        let content = match std::fs::read_to_string(self.partition_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(content.lines().filter_map(PatchID::parse_line).collect())
    }

    /// Path to the per-test coverage trace the compiled binary appends a
    /// line to on every profiled branch it executes, used to derive the
    /// semantic-diff coverage set for one (test, candidate) execution.
    pub fn coverage_path(&self, test: &str) -> PathBuf {
        self.build_dir.join("f1x_coverage").join(test)
    }

    /// Read back the coverage trace left by the compiled binary for `test`:
    /// one `path:line` pair per covered line, missing file reading as empty
    /// coverage rather than an error (e.g. profiling instrumentation off).
    pub fn read_coverage(&self, test: &str) -> std::io::Result<crate::model::Coverage> {
        let content = match std::fs::read_to_string(self.coverage_path(test)) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Default::default()),
            Err(e) => return Err(e),
        };
        let mut coverage: crate::model::Coverage = Default::default();
        for line in content.lines() {
            let Some((path, line_no)) = line.rsplit_once(':') else { continue };
            let Ok(line_no) = line_no.trim().parse() else { continue };
            coverage.entry(PathBuf::from(path)).or_default().insert(line_no);
        }
        Ok(coverage)
    }

    /// The six `F1X_*` environment variables that select a patch for one
    /// process invocation of the compiled instrumented binary.
    pub fn env_for(app_id: u32, id: PatchID) -> Vec<(String, String)> {
        vec![
            ("F1X_APP".to_string(), app_id.to_string()),
            ("F1X_ID_BASE".to_string(), id.base.to_string()),
            ("F1X_ID_INT2".to_string(), id.int2.to_string()),
            ("F1X_ID_BOOL2".to_string(), id.bool2.to_string()),
            ("F1X_ID_COND3".to_string(), id.cond3.to_string()),
            ("F1X_ID_PARAM".to_string(), id.param.to_string()),
        ]
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(parent)?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{get_integer_expression, Location, LocationContext, ModificationKind, Operator, PatchMetadata, TransformationSchema, Type};

    fn sample() -> (Vec<Rc<SchemaApplication>>, Vec<Patch>, BTreeMap<u32, Vec<usize>>) {
        let original = Expression::op(
            Operator::Gt,
            Type::Boolean,
            vec![Expression::leaf(NodeKind::Variable, Type::Integer, "int", "x"), get_integer_expression(0)],
        );
        let app = Rc::new(SchemaApplication {
            app_id: 7,
            schema: TransformationSchema::Expression,
            location: Location { file_id: 0, begin_line: 10, begin_column: 1, end_line: 10, end_column: 5 },
            context: LocationContext::Condition,
            original,
            components: Vec::new(),
        });
        let modified = Expression::op(
            Operator::Ge,
            Type::Boolean,
            vec![Expression::leaf(NodeKind::Variable, Type::Integer, "int", "x"), get_integer_expression(0)],
        );
        let patch = Patch {
            id: PatchID::new(1, 0, 0, 0, 0),
            app: Rc::clone(&app),
            modified,
            meta: PatchMetadata { kind: ModificationKind::Operator, distance: 1 },
        };
        let mut by_app = BTreeMap::new();
        by_app.insert(7, vec![0]);
        (vec![app], vec![patch], by_app)
    }

    #[test]
    fn codegen_emits_a_dispatch_function_per_application() {
        let (apps, patches, by_app) = sample();
        let (source, header) = codegen(&apps, &patches, &by_app);
        assert!(source.contains("__f1x_7"));
        assert!(source.contains("(x >= 0)"));
        assert!(source.contains("int x"));
        assert!(header.contains("__f1x_7"));
    }

    #[test]
    fn env_for_sets_all_six_dispatch_variables() {
        let env = Runtime::env_for(7, PatchID::new(1, 2, 0, 0, 0));
        assert_eq!(env.len(), 6);
        assert!(env.contains(&("F1X_APP".to_string(), "7".to_string())));
        assert!(env.contains(&("F1X_ID_INT2".to_string(), "2".to_string())));
    }

    #[test]
    fn partition_channel_roundtrips_through_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(dir.path(), vec!["true".to_string()]);
        let ids = vec![PatchID::new(1, 0, 0, 0, 0), PatchID::new(2, 0, 0, 0, 0)];
        runtime.set_partition(&ids).unwrap();
        let back = runtime.get_partition().unwrap();
        assert_eq!(back, ids);
    }
}
