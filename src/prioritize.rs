//! Cost-based prioritization: a stable sort of the search space by
//! `syntactic_diff(patch) = distance + kind_bias`, lower cost explored
//! first.

use crate::model::{ModificationKind, Patch};

/// Bias applied on top of edit-distance, by modification kind. Lower biases
/// are explored earlier within an otherwise-equal distance band.
fn kind_bias(kind: ModificationKind) -> f64 {
    match kind {
        ModificationKind::Swapping | ModificationKind::Simplification | ModificationKind::Generalization => -0.3,
        ModificationKind::Operator => -0.2,
        ModificationKind::Substitution | ModificationKind::Loosening | ModificationKind::Tightening => -0.1,
        ModificationKind::Concretization | ModificationKind::Negation | ModificationKind::NullCheck => 0.0,
    }
}

/// The syntactic-diff cost function: edit distance plus a per-kind bias.
pub fn syntactic_diff(patch: &Patch) -> f64 {
    patch.meta.distance as f64 + kind_bias(patch.meta.kind)
}

/// Stable sort of `search_space` by ascending [`syntactic_diff`]. Stability
/// preserves the generator's discovery order within equal-cost groups, so
/// behavior is deterministic for equal scores.
pub fn prioritize(search_space: &mut [Patch]) {
    search_space.sort_by(|a, b| {
        syntactic_diff(a)
            .partial_cmp(&syntactic_diff(b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, LocationContext, PatchID, PatchMetadata, SchemaApplication, TransformationSchema};
    use std::rc::Rc;

    fn dummy_patch(distance: u32, kind: ModificationKind, discovery_order: u32) -> Patch {
        let app = Rc::new(SchemaApplication {
            app_id: 0,
            schema: TransformationSchema::Expression,
            location: Location { file_id: 0, begin_line: 0, begin_column: 0, end_line: 0, end_column: 0 },
            context: LocationContext::Unknown,
            original: crate::model::get_integer_expression(0),
            components: Vec::new(),
        });
        Patch {
            id: PatchID::new(discovery_order, 0, 0, 0, 0),
            app,
            modified: crate::model::get_integer_expression(0),
            meta: PatchMetadata { kind, distance },
        }
    }

    /// S1: search space `[p0(cost=0.0), p1(cost=-0.3), p2(cost=-0.2)]`;
    /// stable sort yields `[p1, p2, p0]`.
    #[test]
    fn s1_stable_sort_by_cost() {
        let p0 = dummy_patch(0, ModificationKind::NullCheck, 0);
        let p1 = dummy_patch(0, ModificationKind::Swapping, 1);
        let p2 = dummy_patch(0, ModificationKind::Operator, 2);

        let mut space = vec![p0.clone(), p1.clone(), p2.clone()];
        prioritize(&mut space);

        let order: Vec<u32> = space.iter().map(|p| p.id.base).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    /// Invariant 4: equal-cost patches retain generator order.
    #[test]
    fn equal_cost_patches_retain_relative_order() {
        let mut space: Vec<Patch> = (0..5)
            .map(|i| dummy_patch(1, ModificationKind::Negation, i))
            .collect();
        prioritize(&mut space);
        let order: Vec<u32> = space.iter().map(|p| p.id.base).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }
}
