//! Expression typing: `correct_types` returns a semantically
//! equivalent expression whose subtree types are explicit and consistent
//! with the expected type at the root, inserting explicit coercion nodes
//! (`BvToInt`, `IntToBv`, `IntCast`, or a `!= 0`/`!= NULL` comparison for
//! Boolean coercion) wherever an operand disagrees with its operator's
//! contract.

use crate::error::TypeError;
use crate::model::{get_integer_expression, get_null_pointer, Expression, Operator, Type};

/// `expected = None` means "accept the natural type" (the unconstrained
/// `Any` case).
pub fn correct_types(expr: &Expression, expected: Option<Type>) -> Result<Expression, TypeError> {
    use crate::model::NodeKind::*;

    match expr.kind {
        Operator => correct_operator(expr, expected),
        Variable | Constant | Parameter | Bv2 | Int2 | Bool2 | Bool3 => match expected {
            Some(target) => coerce(expr.clone(), target),
            None => Ok(expr.clone()),
        },
    }
}

fn correct_operator(expr: &Expression, expected: Option<Type>) -> Result<Expression, TypeError> {
    let operator = expr.operator.ok_or_else(|| TypeError::NoCoercion {
        from: expr.ty,
        to: expected.unwrap_or(expr.ty),
        repr: expr.repr.clone(),
    })?;

    if expr.args.len() != operator.arity() {
        return Err(TypeError::ArityMismatch {
            operator,
            expected: operator.arity(),
            found: expr.args.len(),
        });
    }

    let fixed_operand_type = match operator {
        Operator::And | Operator::Or | Operator::Not => Some(Type::Boolean),
        Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Mod | Operator::Neg => {
            Some(Type::Integer)
        }
        Operator::BvAnd
        | Operator::BvXor
        | Operator::BvOr
        | Operator::BvShl
        | Operator::BvShr
        | Operator::BvNot => Some(Type::Bitvector),
        Operator::BvToInt => Some(Type::Bitvector),
        Operator::IntToBv => Some(Type::Integer),
        Operator::IntCast => None,
        // Eq/Neq/Lt/Le/Gt/Ge are polymorphic: the operand type is whatever
        // the (corrected) first operand turns out to be, and the remaining
        // operands are unified to it.
        Operator::Eq | Operator::Neq | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => None,
    };

    let corrected_args = match fixed_operand_type {
        Some(target) => expr
            .args
            .iter()
            .map(|a| correct_types(a, Some(target)))
            .collect::<Result<Vec<_>, _>>()?,
        None => {
            let first = correct_types(&expr.args[0], None)?;
            let target = first.ty;
            let mut args = Vec::with_capacity(expr.args.len());
            args.push(first);
            for a in &expr.args[1..] {
                args.push(correct_types(a, Some(target))?);
            }
            args
        }
    };

    let node = Expression::op(operator, operator.operator_type(), corrected_args);

    match expected {
        Some(target) => coerce(node, target),
        None => Ok(node),
    }
}

/// Insert an explicit coercion node so that `expr` (already internally
/// type-consistent) evaluates at type `target`. A no-op when `expr.ty ==
/// target` already, which is what makes `correct_types` idempotent: a
/// fully-corrected expression passed through again finds nothing to coerce
/// at any node.
fn coerce(expr: Expression, target: Type) -> Result<Expression, TypeError> {
    if expr.ty == target {
        return Ok(expr);
    }
    match (expr.ty, target) {
        (Type::Integer, Type::Boolean) => {
            Ok(Expression::op(Operator::Neq, Type::Boolean, vec![expr, get_integer_expression(0)]))
        }
        (Type::Pointer, Type::Boolean) => {
            Ok(Expression::op(Operator::Neq, Type::Boolean, vec![expr, get_null_pointer()]))
        }
        (Type::Bitvector, Type::Integer) => Ok(Expression::op(Operator::BvToInt, Type::Integer, vec![expr])),
        (Type::Integer, Type::Bitvector) => Ok(Expression::op(Operator::IntToBv, Type::Bitvector, vec![expr])),
        (Type::Boolean, Type::Integer) => Ok(Expression::op(Operator::IntCast, Type::Integer, vec![expr])),
        (from, to) => Err(TypeError::NoCoercion { from, to, repr: expr.repr }),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::model::NodeKind;
    use proptest::prelude::*;

    fn arb_natural_type() -> impl Strategy<Value = Type> {
        prop_oneof![Just(Type::Integer), Just(Type::Pointer), Just(Type::Bitvector), Just(Type::Boolean)]
    }

    proptest! {
        // correct_types is idempotent for any leaf coerced to any
        // expressible target type.
        #[test]
        fn idempotent_for_arbitrary_leaf_coercions(natural in arb_natural_type(), target in arb_natural_type()) {
            let leaf = Expression::leaf(NodeKind::Variable, natural, "t", "v");
            if let Ok(once) = correct_types(&leaf, Some(target)) {
                let twice = correct_types(&once, Some(target)).unwrap();
                prop_assert_eq!(once, twice);
            }
        }
    }
}
