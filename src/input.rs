//! External-input loading: deserializes the candidate-locations JSON,
//! the fault-localization profile, and the ordered tests list, all produced
//! by collaborators out of scope for deep implementation (the
//! instrumentation pass and the profiler) - only their wire formats are
//! specified here.

use crate::error::ParseError;
use crate::model::{Location, SchemaApplication};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Load one candidate-locations JSON file: an array of [`SchemaApplication`]
/// in the wire format the instrumentation pass emits.
pub fn load_schema_applications_file(path: &Path) -> Result<Vec<SchemaApplication>, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&content).map_err(|source| ParseError::Json { path: path.to_path_buf(), source })
}

/// Load and concatenate every candidate-locations file (the original
/// instrumentation pass emits one per source file; `repair.rs`'s
/// orchestration loads them all before generating the search space),
/// wrapping each in `Rc` so one application can be shared by every patch
/// generated from it.
pub fn load_schema_applications(paths: &[PathBuf]) -> Result<Vec<Rc<SchemaApplication>>, ParseError> {
    let mut all = Vec::new();
    for path in paths {
        all.extend(load_schema_applications_file(path)?.into_iter().map(Rc::new));
    }
    Ok(all)
}

/// One `(Location, related test indexes)` entry of a serialized profile.
/// JSON object keys must be strings, so the profiler's `Location -> Vec<usize>`
/// map is carried as an array of entries rather than a JSON object keyed by
/// a composite struct.
#[derive(Debug, Deserialize)]
pub struct ProfileEntry {
    pub location: Location,
    /// Test indexes into the run's `tests` vector, ordered by observed
    /// discriminative power (most-discriminative first).
    pub tests: Vec<usize>,
}

/// Load the fault-localization profile: `{Location -> related test
/// indexes}`.
pub fn load_profile(path: &Path) -> Result<HashMap<Location, Vec<usize>>, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io { path: path.to_path_buf(), source })?;
    let entries: Vec<ProfileEntry> =
        serde_json::from_str(&content).map_err(|source| ParseError::Json { path: path.to_path_buf(), source })?;
    Ok(entries.into_iter().map(|e| (e.location, e.tests)).collect())
}

/// Load the ordered tests list: opaque string identifiers passed to the
/// oracle.
pub fn load_tests(path: &Path) -> Result<Vec<String>, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_str(&content).map_err(|source| ParseError::Json { path: path.to_path_buf(), source })
}
