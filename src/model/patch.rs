use crate::model::expression::Expression;
use crate::model::location::{Location, LocationContext};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::rc::Rc;

/// *Where* a candidate edit happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformationSchema {
    /// Change an existing expression in place.
    Expression,
    /// Wrap a statement with a guard.
    IfGuard,
    /// Prepend a zero-initialization for an array-typed declarator.
    ArrayInit,
}

/// *What* the edit is: the closed catalogue of modification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModificationKind {
    /// Operator replacement, e.g. `>` to `>=`.
    Operator,
    /// Swapping the arguments of a binary operator.
    Swapping,
    /// Simplifying the expression (e.g. dropping a redundant negation).
    Simplification,
    /// Concrete-to-abstract, e.g. `1` to `x`.
    Generalization,
    /// Abstract-to-concrete, e.g. `x` to `1`.
    Concretization,
    /// Appending `|| e`.
    Loosening,
    /// Appending `&& e`.
    Tightening,
    /// Logically negating, or removing a negation.
    Negation,
    /// Adding a null check.
    NullCheck,
    /// Generic substitution of a subnode.
    Substitution,
}

/// A specific candidate site: one schema applied to one source location,
/// with the original expression and the components in scope for filling
/// auxiliary holes.
///
/// `app_id` is the stable identity of the site: dispatch in the generated
/// runtime is keyed on `(app_id, PatchID)`, and `app_id` groups every
/// `Patch` synthesized from one `SchemaApplication` (see [`Patch::app`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaApplication {
    #[serde(rename = "appId")]
    pub app_id: u32,
    pub schema: TransformationSchema,
    pub location: Location,
    pub context: LocationContext,
    pub original: Expression,
    #[serde(default)]
    pub components: Vec<Expression>,
}

/// A 5-coordinate tuple selecting one concrete patch within the
/// combinatorial dispatch space of a schema application.
///
/// Coordinates with value `0` mean "no auxiliary choice at that point".
/// Componentwise equality and a derived `Hash` (see [`crate::model::location::Location`]
/// for why derive suffices over the original's hand-combined hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PatchID {
    pub base: u32,
    pub int2: u32,
    pub bool2: u32,
    pub cond3: u32,
    pub param: u32,
}

impl PatchID {
    pub fn new(base: u32, int2: u32, bool2: u32, cond3: u32, param: u32) -> Self {
        PatchID { base, int2, bool2, cond3, param }
    }

    /// Parse a line of the partition channel file format: five
    /// space-separated decimals.
    pub fn parse_line(line: &str) -> Option<PatchID> {
        let mut parts = line.split_whitespace();
        let base = parts.next()?.parse().ok()?;
        let int2 = parts.next()?.parse().ok()?;
        let bool2 = parts.next()?.parse().ok()?;
        let cond3 = parts.next()?.parse().ok()?;
        let param = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(PatchID { base, int2, bool2, cond3, param })
    }

    /// Render this id as a partition channel line: five space-separated
    /// decimals.
    pub fn to_line(self) -> String {
        format!("{} {} {} {} {}", self.base, self.int2, self.bool2, self.cond3, self.param)
    }
}

impl std::fmt::Display for PatchID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            self.base, self.int2, self.bool2, self.cond3, self.param
        )
    }
}

/// Metadata describing how a patch's expression was derived from the
/// original: which catalogue member produced it, and its syntactic
/// edit-distance from the original (used by [`crate::prioritize`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchMetadata {
    pub kind: ModificationKind,
    pub distance: u32,
}

/// A concrete patch: one `PatchID` within one schema application's dispatch
/// space, the modified expression it denotes, and provenance metadata.
///
/// `app` is shared by every `Patch` generated from the same
/// `SchemaApplication` - modeled as `Rc`, never a raw back-pointer, since
/// the engine is single-threaded and ownership is purely "outlives all
/// patches derived from it".
#[derive(Debug, Clone)]
pub struct Patch {
    pub id: PatchID,
    pub app: Rc<SchemaApplication>,
    pub modified: Expression,
    pub meta: PatchMetadata,
}

/// Per-file line coverage recorded for one (test, patch) execution when
/// semantic-diff prioritization is enabled.
pub type Coverage = HashMap<PathBuf, BTreeSet<u32>>;

/// `{test -> {PatchID -> Coverage}}`, populated only when
/// `patch_prioritization == SemanticDiff`.
pub type CoverageSet = HashMap<String, HashMap<PatchID, Coverage>>;
