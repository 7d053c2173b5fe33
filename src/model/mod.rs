//! The expression/patch data model: tagged-tree C-like expressions with
//! explicit typing, the fixed transformation-schema/modification-kind
//! catalogue, and the `PatchID`-indexed patch representation.

pub mod expression;
pub mod location;
pub mod patch;

pub use expression::{expression_to_string, get_integer_expression, get_null_pointer, Expression, NodeKind, Operator, Type};
pub use location::{Location, LocationContext};
pub use patch::{Coverage, CoverageSet, ModificationKind, Patch, PatchID, PatchMetadata, SchemaApplication, TransformationSchema};
