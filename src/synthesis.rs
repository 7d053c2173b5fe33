//! Search-space generator: given the schema applications extracted
//! externally, enumerate the closed catalogue of modification kinds into a
//! flat `Vec<Patch>` with unique `PatchID`s per application, and emit the
//! runtime source/header text streams the compiled dispatch binary needs.

use crate::model::{
    expression_to_string, get_integer_expression, get_null_pointer, Expression, LocationContext,
    ModificationKind, NodeKind, Operator, Patch, PatchID, PatchMetadata, SchemaApplication,
    TransformationSchema, Type,
};
use std::collections::BTreeMap;
use std::rc::Rc;

/// The output of [`generate_search_space`]: the flat patch vector plus the
/// two generated C text streams describing the runtime dispatch tables.
pub struct GeneratedSearchSpace {
    pub patches: Vec<Patch>,
    pub runtime_source: String,
    pub runtime_header: String,
}

/// One family of structurally-identical candidates sharing a `base`
/// coordinate, distinguished from one another (if more than one) by a
/// single auxiliary coordinate.
struct Candidate {
    modified: Expression,
    kind: ModificationKind,
    distance: u32,
    /// Which auxiliary coordinate, if any, distinguishes this candidate from
    /// its siblings in the same family (by a 1-based index).
    aux: Option<AuxSlot>,
}

#[derive(Clone, Copy)]
enum AuxSlot {
    Int2(u32),
    Bool2(u32),
    Param(u32),
}

pub fn generate_search_space(schema_applications: &[Rc<SchemaApplication>]) -> GeneratedSearchSpace {
    let mut patches = Vec::new();
    let mut per_app_patches: BTreeMap<u32, Vec<usize>> = BTreeMap::new();

    for app in schema_applications {
        let families = candidate_families(app);
        let mut base_counter: u32 = 1;

        for family in families {
            if family.is_empty() {
                continue;
            }
            let family_base = base_counter;
            base_counter += 1;

            for candidate in family {
                let id = match candidate.aux {
                    None => PatchID::new(family_base, 0, 0, 0, 0),
                    Some(AuxSlot::Int2(i)) => PatchID::new(family_base, i, 0, 0, 0),
                    Some(AuxSlot::Bool2(i)) => PatchID::new(family_base, 0, i, 0, 0),
                    Some(AuxSlot::Param(i)) => PatchID::new(family_base, 0, 0, 0, i),
                };
                per_app_patches.entry(app.app_id).or_default().push(patches.len());
                patches.push(Patch {
                    id,
                    app: Rc::clone(app),
                    modified: candidate.modified,
                    meta: PatchMetadata { kind: candidate.kind, distance: candidate.distance },
                });
            }
        }
    }

    let (runtime_source, runtime_header) = crate::runtime::codegen(schema_applications, &patches, &per_app_patches);

    GeneratedSearchSpace { patches, runtime_source, runtime_header }
}

/// Build the candidate families for one schema application, per the
/// closed modification-kind catalogue.
fn candidate_families(app: &SchemaApplication) -> Vec<Vec<Candidate>> {
    match app.schema {
        TransformationSchema::Expression => {
            let boolean_context = app.context == LocationContext::Condition;
            let mut families = vec![
                operator_replacements(&app.original),
                swapping(&app.original),
                simplification(&app.original),
                generalization(&app.original, &app.components),
                concretization(&app.original),
                negation(&app.original),
                substitution(&app.original, &app.components),
            ];
            if boolean_context {
                families.push(loosening(&app.original, &app.components));
                families.push(tightening(&app.original, &app.components));
                families.push(null_check(&app.original, &app.components));
            }
            families
        }
        TransformationSchema::IfGuard => vec![if_guard(&app.components)],
        TransformationSchema::ArrayInit => vec![array_init(&app.original)],
    }
}

fn operator_replacements(original: &Expression) -> Vec<Candidate> {
    let Some(op) = original.operator else { return Vec::new() };
    let group: &[Operator] = match op {
        Operator::Eq | Operator::Neq | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            &[Operator::Eq, Operator::Neq, Operator::Lt, Operator::Le, Operator::Gt, Operator::Ge]
        }
        Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Mod => {
            &[Operator::Add, Operator::Sub, Operator::Mul, Operator::Div, Operator::Mod]
        }
        Operator::And | Operator::Or => &[Operator::And, Operator::Or],
        Operator::BvAnd | Operator::BvXor | Operator::BvOr => {
            &[Operator::BvAnd, Operator::BvXor, Operator::BvOr]
        }
        Operator::BvShl | Operator::BvShr => &[Operator::BvShl, Operator::BvShr],
        _ => return Vec::new(),
    };

    group
        .iter()
        .filter(|&&candidate_op| candidate_op != op)
        .enumerate()
        .map(|(i, &candidate_op)| {
            let mut modified = original.clone();
            modified.operator = Some(candidate_op);
            modified.repr = candidate_op.operator_to_string().to_string();
            modified.ty = candidate_op.operator_type();
            // Every sibling shares this family's `base` coordinate, so each
            // needs its own auxiliary coordinate to stay distinct - `int2` is
            // otherwise unused by this modification kind.
            Candidate { modified, kind: ModificationKind::Operator, distance: 1, aux: Some(AuxSlot::Int2(i as u32 + 1)) }
        })
        .collect()
}

fn swapping(original: &Expression) -> Vec<Candidate> {
    if original.kind != NodeKind::Operator || original.args.len() != 2 {
        return Vec::new();
    }
    let mut modified = original.clone();
    modified.args.swap(0, 1);
    vec![Candidate { modified, kind: ModificationKind::Swapping, distance: 1, aux: None }]
}

fn simplification(original: &Expression) -> Vec<Candidate> {
    if original.kind != NodeKind::Operator {
        return Vec::new();
    }
    if !matches!(original.operator, Some(Operator::And) | Some(Operator::Or)) {
        return Vec::new();
    }
    original
        .args
        .iter()
        .find(|a| a.kind == NodeKind::Constant)
        .and_then(|_| {
            let other = original.args.iter().find(|a| a.kind != NodeKind::Constant)?;
            Some(vec![Candidate {
                modified: other.clone(),
                kind: ModificationKind::Simplification,
                distance: 1,
                aux: None,
            }])
        })
        .unwrap_or_default()
}

fn generalization(original: &Expression, components: &[Expression]) -> Vec<Candidate> {
    let targets: Vec<&Expression> = if original.kind == NodeKind::Constant {
        vec![original]
    } else {
        original.args.iter().filter(|a| a.kind == NodeKind::Constant).collect()
    };
    if targets.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut aux_index = 0u32;
    for component in components.iter().filter(|c| c.kind == NodeKind::Variable) {
        for target in &targets {
            if component.ty != target.ty {
                continue;
            }
            aux_index += 1;
            let modified = replace_subexpr(original, target, component);
            out.push(Candidate {
                modified,
                kind: ModificationKind::Generalization,
                distance: 1,
                aux: Some(AuxSlot::Int2(aux_index)),
            });
        }
    }
    out
}

fn concretization(original: &Expression) -> Vec<Candidate> {
    let targets: Vec<&Expression> = if original.kind == NodeKind::Variable {
        vec![original]
    } else {
        original.args.iter().filter(|a| a.kind == NodeKind::Variable).collect()
    };
    if targets.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut aux_index = 0u32;
    for target in &targets {
        let literals: Vec<Expression> = match target.ty {
            Type::Integer | Type::Bitvector => {
                vec![get_integer_expression(0), get_integer_expression(1), get_integer_expression(-1)]
            }
            Type::Pointer => vec![get_null_pointer()],
            Type::Boolean => Vec::new(),
        };
        for literal in literals {
            aux_index += 1;
            let modified = replace_subexpr(original, target, &literal);
            out.push(Candidate {
                modified,
                kind: ModificationKind::Concretization,
                distance: 1,
                aux: Some(AuxSlot::Param(aux_index)),
            });
        }
    }
    out
}

fn negation(original: &Expression) -> Vec<Candidate> {
    if original.ty != Type::Boolean {
        return Vec::new();
    }
    let modified = if original.operator == Some(Operator::Not) {
        original.args[0].clone()
    } else {
        Expression::op(Operator::Not, Type::Boolean, vec![original.clone()])
    };
    vec![Candidate { modified, kind: ModificationKind::Negation, distance: 1, aux: None }]
}

fn substitution(original: &Expression, components: &[Expression]) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut aux_index = 0u32;
    for component in components.iter().filter(|c| c.ty == original.ty && *c != original) {
        aux_index += 1;
        let slot = match component.ty {
            Type::Boolean => AuxSlot::Bool2(aux_index),
            _ => AuxSlot::Int2(aux_index),
        };
        out.push(Candidate {
            modified: component.clone(),
            kind: ModificationKind::Substitution,
            distance: 1,
            aux: Some(slot),
        });
    }
    out
}

fn loosening(original: &Expression, components: &[Expression]) -> Vec<Candidate> {
    extend_with_components(original, components, Operator::Or, ModificationKind::Loosening)
}

fn tightening(original: &Expression, components: &[Expression]) -> Vec<Candidate> {
    extend_with_components(original, components, Operator::And, ModificationKind::Tightening)
}

fn extend_with_components(
    original: &Expression,
    components: &[Expression],
    connective: Operator,
    kind: ModificationKind,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut aux_index = 0u32;
    for component in components {
        let Ok(boolean_component) = crate::typing::correct_types(component, Some(Type::Boolean)) else {
            continue;
        };
        aux_index += 1;
        let modified = Expression::op(connective, Type::Boolean, vec![original.clone(), boolean_component]);
        out.push(Candidate { modified, kind, distance: 2, aux: Some(AuxSlot::Bool2(aux_index)) });
    }
    out
}

fn null_check(original: &Expression, components: &[Expression]) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut aux_index = 0u32;
    for component in components.iter().filter(|c| c.ty == Type::Pointer) {
        aux_index += 1;
        let check = Expression::op(Operator::Neq, Type::Boolean, vec![component.clone(), get_null_pointer()]);
        let modified = Expression::op(Operator::And, Type::Boolean, vec![original.clone(), check]);
        out.push(Candidate {
            modified,
            kind: ModificationKind::NullCheck,
            distance: 2,
            aux: Some(AuxSlot::Bool2(aux_index)),
        });
    }
    out
}

/// A fresh Boolean-typed guard subtree, built from the in-scope components:
/// direct use of any Boolean component, and pairwise comparisons between
/// same-typed Integer/Bitvector components.
fn if_guard(components: &[Expression]) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut aux_index = 0u32;

    for component in components.iter().filter(|c| c.ty == Type::Boolean) {
        aux_index += 1;
        out.push(Candidate {
            modified: component.clone(),
            kind: ModificationKind::Substitution,
            distance: 1,
            aux: Some(AuxSlot::Bool2(aux_index)),
        });
    }

    for component in components.iter().filter(|c| c.ty == Type::Pointer) {
        aux_index += 1;
        let modified = Expression::op(Operator::Neq, Type::Boolean, vec![component.clone(), get_null_pointer()]);
        out.push(Candidate { modified, kind: ModificationKind::Substitution, distance: 1, aux: Some(AuxSlot::Bool2(aux_index)) });
    }

    for (i, left) in components.iter().enumerate() {
        if !matches!(left.ty, Type::Integer | Type::Bitvector) {
            continue;
        }
        for right in components.iter().skip(i + 1).filter(|c| c.ty == left.ty) {
            for &op in &[Operator::Eq, Operator::Neq, Operator::Lt, Operator::Ge] {
                aux_index += 1;
                let modified = Expression::op(op, Type::Boolean, vec![left.clone(), right.clone()]);
                out.push(Candidate {
                    modified,
                    kind: ModificationKind::Substitution,
                    distance: 2,
                    aux: Some(AuxSlot::Bool2(aux_index)),
                });
            }
        }
    }

    out
}

/// A single zero-initialization patch for an array-typed declarator. The
/// "modified" value is a placeholder expression carrying the emitted
/// `memset` call text; `ArrayInit` edits a statement, not an expression
/// value, so there is exactly one candidate.
fn array_init(original: &Expression) -> Vec<Candidate> {
    let modified = Expression::leaf(
        NodeKind::Constant,
        Type::Integer,
        "void",
        format!("memset({}, 0, sizeof({}))", original.repr, original.repr),
    );
    vec![Candidate { modified, kind: ModificationKind::Substitution, distance: 1, aux: None }]
}

/// Replace the (single) occurrence of `target` within `tree` with
/// `replacement`, by identity of the subtree's rendered text - sufficient
/// here because `target` is always drawn directly from `tree`'s own nodes.
fn replace_subexpr(tree: &Expression, target: &Expression, replacement: &Expression) -> Expression {
    if std::ptr::eq(tree, target) || tree == target {
        return replacement.clone();
    }
    let mut copy = tree.clone();
    for arg in &mut copy.args {
        *arg = replace_subexpr(arg, target, replacement);
    }
    copy
}
