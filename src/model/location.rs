use serde::{Deserialize, Serialize};

/// A byte-free source span: file id plus 1-based line/column bounds.
///
/// Equal-by-value and used as a hash map key (both for prioritization
/// bookkeeping and as the key of the fault-localization map), so every field
/// is plain data and `Hash`/`Eq` are derived rather than hand-combined - Rust's
/// derive already gives a stable, collision-resistant hash for a struct of
/// integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file_id: u32,
    pub begin_line: u32,
    pub begin_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// Whether a location is the test of a control-flow condition, which
/// determines the default expected type during type correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LocationContext {
    /// The location is the test of an `if`/`for`/`while`.
    Condition,
    Unknown,
}
