//! Repair orchestration: sequences the in-scope pipeline stages - type
//! correction, search-space generation, prioritization, the search loop,
//! optional validation, and diff emission - into the top-level `repair`
//! entry point.
//!
//! Fault localization, profiling instrumentation, and build-command
//! inference are treated as out-of-scope collaborators, assumed already
//! performed by the caller: `RepairInputs` carries their *outputs* (schema
//! applications, the tests list, and the profiler's related-test-index map)
//! rather than re-deriving them.

use crate::config::{PatchPrioritization, RepairConfig};
use crate::error::{OracleError, RepairError};
use crate::model::{CoverageSet, Location, Patch, PatchID, SchemaApplication};
use crate::project::ProjectController;
use crate::runtime::Runtime;
use crate::search::{SearchEngine, TestOracle};
use crate::typing::correct_types;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::rc::Rc;

/// Exit-status mapping: `Success` when at least one plausible
/// patch was found, `Failure` when the search space was exhausted without
/// one, `NoNegativeTests` when the (externally supplied) test suite has no
/// failing test to repair against, `Error` for unrecoverable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStatus {
    Success,
    Failure,
    NoNegativeTests,
    Error,
}

/// The externally-produced inputs a `repair` run consumes, already
/// deserialized by [`crate::input`].
pub struct RepairInputs {
    pub schema_applications: Vec<Rc<SchemaApplication>>,
    pub tests: Vec<String>,
    pub related_test_indexes: HashMap<Location, Vec<usize>>,
}

/// `{appId -> every PatchID generated for that application}`, the
/// partition the engine offers the runtime before each test execution.
/// Named `getPartitionable` in the original.
fn partitionable(search_space: &[Patch]) -> HashMap<u32, Vec<PatchID>> {
    let mut result: HashMap<u32, Vec<PatchID>> = HashMap::new();
    for patch in search_space {
        result.entry(patch.app.app_id).or_default().push(patch.id);
    }
    result
}

/// Run the core engine: type-correct every schema application, generate
/// and prioritize the search space, walk it with a [`SearchEngine`],
/// validate survivors if configured, and emit unified diffs for every
/// plausible patch found.
pub fn repair<P: ProjectController, O: TestOracle>(
    project: &mut P,
    oracle: O,
    runtime: &Runtime,
    inputs: RepairInputs,
    config: &RepairConfig,
    patch_output: &Path,
) -> RepairStatus {
    if !oracle.driver_is_ok() {
        let path = oracle.driver_path().map(|p| p.to_path_buf()).unwrap_or_default();
        let err: RepairError = OracleError::DriverNotOk { path }.into();
        log::error!("{err}");
        return RepairStatus::Error;
    }

    if inputs.tests.is_empty() {
        log::error!("no negative tests");
        return RepairStatus::NoNegativeTests;
    }

    log::debug!("inferring types");
    let mut corrected_applications = Vec::with_capacity(inputs.schema_applications.len());
    for app in &inputs.schema_applications {
        let expected = match app.context {
            crate::model::LocationContext::Condition => Some(crate::model::Type::Boolean),
            crate::model::LocationContext::Unknown => None,
        };
        let corrected_original = match correct_types(&app.original, expected) {
            Ok(expr) => expr,
            Err(e) => {
                log::warn!("type correction failed for application {}: {e}", app.app_id);
                continue;
            }
        };
        let mut corrected = (**app).clone();
        corrected.original = corrected_original;
        corrected_applications.push(Rc::new(corrected));
    }

    log::info!("generating search space");
    let generated = crate::synthesis::generate_search_space(&corrected_applications);
    let mut search_space = generated.patches;

    log::info!("search space size: {}", search_space.len());

    if let Err(e) = runtime.write_artifacts(&generated.runtime_source, &generated.runtime_header) {
        log::error!("failed to write runtime artifacts: {e}");
        return RepairStatus::Error;
    }
    if let Err(e) = runtime.compile() {
        log::error!("runtime compilation failed: {e}");
        return RepairStatus::Error;
    }

    project.backup_files();
    if !project.build_with_runtime(&runtime.header_path()) {
        log::warn!("compilation with runtime returned non-zero exit code");
    }
    project.restore_files();

    log::info!("prioritizing search space");
    crate::prioritize::prioritize(&mut search_space);

    if config.dump {
        return dump_patches(project, &search_space, patch_output);
    }

    let partitionable_ids = partitionable(&search_space);

    let mut engine = SearchEngine::new(
        &inputs.tests,
        oracle,
        runtime,
        config.value_teq,
        config.test_prioritization,
        config.patch_prioritization,
        partitionable_ids,
        inputs.related_test_indexes,
    );

    let mut last = 0usize;
    let mut fix_locations: HashSet<u32> = HashSet::new();
    let mut more_than_one_found: HashSet<u32> = HashSet::new();
    let mut plausible_patches: Vec<Patch> = Vec::new();
    let mut coverage_set: CoverageSet = HashMap::new();

    while last < search_space.len() {
        last = engine.find_next(&search_space, last);
        if last == search_space.len() {
            break;
        }

        if let Some(top) = config.output_top {
            if plausible_patches.len() >= top {
                log::info!("found enough patches");
                break;
            }
        }

        let patch = search_space[last].clone();

        if !more_than_one_found.contains(&patch.app.app_id) || config.verbose {
            if !fix_locations.contains(&patch.app.app_id) || config.verbose {
                log::info!("plausible patch at location line {}", patch.app.location.begin_line);
            } else {
                log::info!("more patches found at line {}", patch.app.location.begin_line);
            }
        }

        if !config.generate_all {
            merge_coverage(&mut coverage_set, engine.coverage_set());
            let mut oracle = engine.into_oracle();
            let valid = if config.validate_patches {
                crate::validate::validate_patch(project, &mut oracle, &inputs.tests, &patch)
            } else {
                true
            };
            engine = SearchEngine::new(
                &inputs.tests,
                oracle,
                runtime,
                config.value_teq,
                config.test_prioritization,
                config.patch_prioritization,
                partitionable(&search_space),
                HashMap::new(),
            );
            if valid {
                fix_locations.insert(patch.app.app_id);
                plausible_patches.push(patch);
                break;
            }
        } else {
            if fix_locations.contains(&patch.app.app_id) {
                more_than_one_found.insert(patch.app.app_id);
            }
            fix_locations.insert(patch.app.app_id);
            plausible_patches.push(patch);
        }

        last += 1;
    }

    merge_coverage(&mut coverage_set, engine.coverage_set());

    if config.validate_patches && config.generate_all && !plausible_patches.is_empty() {
        let mut oracle = engine.into_oracle();
        let mut valid_patches = Vec::new();
        for patch in plausible_patches {
            if crate::validate::validate_patch(project, &mut oracle, &inputs.tests, &patch) {
                valid_patches.push(patch);
            }
        }
        plausible_patches = valid_patches;
    }

    if config.patch_prioritization == PatchPrioritization::SemanticDiff {
        for (test, per_patch) in &coverage_set {
            log::info!("test: {test}");
            for patch in &plausible_patches {
                if let Some(coverage) = per_patch.get(&patch.id) {
                    log::info!("patch: {}", patch.id);
                    for (file, lines) in coverage {
                        log::info!("file: {}", file.display());
                        for line in lines {
                            log::info!("line: {line}");
                        }
                    }
                }
            }
        }
    }

    if !plausible_patches.is_empty() {
        log::info!("computing source diffs");
        emit_diffs(project, &plausible_patches, patch_output, config.generate_all, config.output_one_per_location);
    }

    log::info!("plausible patches: {}", plausible_patches.len());
    log::info!("fix locations: {}", fix_locations.len());

    if !plausible_patches.is_empty() {
        RepairStatus::Success
    } else {
        RepairStatus::Failure
    }
}

/// Fold one engine generation's coverage set into the run-wide accumulator;
/// needed because `!generate_all` mode rebuilds the `SearchEngine` (and
/// hence resets its coverage set) after every plausible patch found.
fn merge_coverage(accumulated: &mut CoverageSet, fresh: &CoverageSet) {
    for (test, per_patch) in fresh {
        accumulated.entry(test.clone()).or_default().extend(per_patch.clone());
    }
}

fn dump_patches<P: ProjectController>(project: &mut P, search_space: &[Patch], patch_output: &Path) -> RepairStatus {
    log::info!("dumping patches: {}", patch_output.display());
    let _ = std::fs::create_dir_all(patch_output);

    project.backup_files();
    for (i, patch) in search_space.iter().enumerate() {
        if project.apply_patch(patch).is_ok() {
            let file_id = patch.app.location.file_id;
            if let Some(file) = project.files().iter().find(|f| f.file_id == file_id) {
                let out = patch_output.join(format!("{i}_f1x.patch"));
                let _ = project.compute_diff(&file.relpath.clone(), &out);
            }
        }
        project.restore_files();
    }

    if search_space.is_empty() {
        RepairStatus::Failure
    } else {
        RepairStatus::Success
    }
}

fn emit_diffs<P: ProjectController>(
    project: &mut P,
    plausible_patches: &[Patch],
    patch_output: &Path,
    generate_all: bool,
    output_one_per_location: bool,
) {
    if !generate_all {
        let patch = &plausible_patches[0];
        let file_id = patch.app.location.file_id;
        if project.apply_patch(patch).is_ok() {
            if let Some(file) = project.files().iter().find(|f| f.file_id == file_id).cloned() {
                let _ = project.compute_diff(&file.relpath, patch_output);
            }
        }
        project.restore_files();
        return;
    }

    let _ = std::fs::create_dir_all(patch_output);
    let mut seen_locations: HashSet<u32> = HashSet::new();
    let mut threads = Vec::new();

    for (i, patch) in plausible_patches.iter().enumerate() {
        if output_one_per_location && seen_locations.contains(&patch.app.app_id) {
            continue;
        }
        seen_locations.insert(patch.app.app_id);

        if project.apply_patch(patch).is_ok() {
            let file_id = patch.app.location.file_id;
            if let Some(file) = project.files().iter().find(|f| f.file_id == file_id).cloned() {
                let out = patch_output.join(format!("{i}.patch"));
                // Embarrassingly parallel diff emission: one thread per
                // patch, joined before `repair` returns. Reading the
                // backed-up/current file contents must happen here, before
                // `restore_files` below overwrites the current state for the
                // next patch; building the unified diff text and writing it
                // to disk is the actual work, and runs entirely on the
                // spawned thread so it overlaps with the next patch's
                // apply/restore in this loop.
                match project.diff_inputs(&file.relpath) {
                    Ok((original, current)) => {
                        let relpath = file.relpath.to_string_lossy().into_owned();
                        threads.push(std::thread::spawn(move || {
                            if let Err(e) = crate::project::write_unified_diff(&relpath, &original, &current, &out) {
                                log::warn!("failed to write diff: {e}");
                            }
                        }));
                    }
                    Err(e) => log::warn!("failed to read diff inputs: {e}"),
                }
            }
        }
        project.restore_files();
    }

    for t in threads {
        let _ = t.join();
    }
}
