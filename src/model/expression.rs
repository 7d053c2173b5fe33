//! The expression tree: a tagged sum type over `{Operator, Variable,
//! Constant, Parameter}` plus the auxiliary holes `{Bv2, Int2, Bool2,
//! Bool3}`.
//!
//! A tagged enum/struct pair with pattern matching is used throughout
//! instead of a class hierarchy, the same shape used elsewhere in this
//! crate for other closed alternatives (e.g. `TransformationSchema`,
//! `ModificationKind`).

use serde::{Deserialize, Serialize};

/// Discriminates what an [`Expression`] node *is*.
///
/// The last four variants are auxiliary holes: placeholders whose concrete
/// fill is selected later by a coordinate of a `PatchID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Operator,
    Variable,
    Constant,
    Parameter,
    /// Auxiliary bitvector-typed hole.
    Bv2,
    /// Auxiliary integer-typed hole.
    Int2,
    /// Auxiliary two-way boolean-typed hole.
    Bool2,
    /// Auxiliary three-way boolean-typed hole (condition of a nested `?:`).
    Bool3,
}

/// The four value domains an [`Expression`] can evaluate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Boolean,
    Integer,
    Pointer,
    Bitvector,
}

/// The closed operator catalogue: arithmetic, comparison, logical, and
/// bitwise operators, plus two explicit crossover operators used by the
/// typing pass to separate the arithmetic and bitwise worlds, and one cast
/// operator used only inside INT2 substitutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Or,
    And,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,
    BvAnd,
    BvXor,
    BvOr,
    BvShl,
    BvShr,
    BvNot,
    /// Auxiliary: reinterpret a bitvector result as an integer.
    BvToInt,
    /// Auxiliary: reinterpret an integer result as a bitvector.
    IntToBv,
    /// Auxiliary: explicit cast, used only inside INT2 substitutions (no
    /// other types are supported inside the runtime dispatch tables).
    IntCast,
}

impl Operator {
    /// Arity of this operator: the number of `args` an `Operator`-kind
    /// [`Expression`] using it must carry.
    pub fn arity(self) -> usize {
        use Operator::*;
        match self {
            Neg | Not | BvNot | BvToInt | IntToBv | IntCast => 1,
            _ => 2,
        }
    }

    /// The result type of applying this operator, independent of operand
    /// types (operand type contracts are enforced separately by
    /// [`crate::typing::correct_types`]).
    pub fn operator_type(self) -> Type {
        use Operator::*;
        match self {
            Eq | Neq | Lt | Le | Gt | Ge | Or | And | Not => Type::Boolean,
            Add | Sub | Mul | Div | Mod | Neg | BvToInt | IntCast => Type::Integer,
            BvAnd | BvXor | BvOr | BvShl | BvShr | BvNot | IntToBv => Type::Bitvector,
        }
    }

    /// Parse a binary operator from its C source representation (e.g. `"=="`,
    /// `"&&"`, `"|"`). Returns `None` for unrecognized or non-binary
    /// spellings.
    pub fn binary_operator_by_string(repr: &str) -> Option<Operator> {
        use Operator::*;
        Some(match repr {
            "==" => Eq,
            "!=" => Neq,
            "<" => Lt,
            "<=" => Le,
            ">" => Gt,
            ">=" => Ge,
            "||" => Or,
            "&&" => And,
            "+" => Add,
            "-" => Sub,
            "*" => Mul,
            "/" => Div,
            "%" => Mod,
            "&" => BvAnd,
            "^" => BvXor,
            "|" => BvOr,
            "<<" => BvShl,
            ">>" => BvShr,
            _ => return None,
        })
    }

    /// Parse a unary operator from its C source representation (e.g. `"-"`,
    /// `"!"`, `"~"`).
    pub fn unary_operator_by_string(repr: &str) -> Option<Operator> {
        use Operator::*;
        Some(match repr {
            "-" => Neg,
            "!" => Not,
            "~" => BvNot,
            _ => return None,
        })
    }

    /// Render this operator back to its C source spelling, the inverse of
    /// [`Operator::binary_operator_by_string`] / [`Operator::unary_operator_by_string`]
    /// for every operator that has a literal C spelling. The three auxiliary
    /// operators have no C spelling of their own: `BvToInt`/`IntToBv` are
    /// erased at codegen time (they exist only to route the typing pass),
    /// and `IntCast` renders as an explicit `(int)` cast.
    pub fn operator_to_string(self) -> &'static str {
        use Operator::*;
        match self {
            Eq => "==",
            Neq => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            Or => "||",
            And => "&&",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            Neg => "-",
            Not => "!",
            BvAnd => "&",
            BvXor => "^",
            BvOr => "|",
            BvShl => "<<",
            BvShr => ">>",
            BvNot => "~",
            BvToInt | IntToBv => "",
            IntCast => "(int)",
        }
    }
}

/// A node in the expression tree.
///
/// Invariant: for `kind == Operator`, `args.len() == operator.arity()`; for
/// every other kind, `args` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: NodeKind,
    #[serde(rename = "type")]
    pub ty: Type,
    /// Meaningful only for `kind == Operator`; otherwise absent/ignored.
    #[serde(default, rename = "op", skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    /// The underlying C integer or pointer-base type, e.g. `"int"`,
    /// `"unsigned char"`, `"struct foo *"`.
    #[serde(default, rename = "rawType")]
    pub raw_type: String,
    /// Literal text for leaves (`"1"`, `"x"`), or the operator symbol.
    #[serde(default)]
    pub repr: String,
    #[serde(default)]
    pub args: Vec<Expression>,
}

impl Expression {
    /// Construct a leaf expression (`Variable`, `Constant`, or `Parameter`).
    pub fn leaf(kind: NodeKind, ty: Type, raw_type: impl Into<String>, repr: impl Into<String>) -> Self {
        assert!(
            !matches!(kind, NodeKind::Operator),
            "Expression::leaf cannot construct an Operator node"
        );
        Expression {
            kind,
            ty,
            operator: None,
            raw_type: raw_type.into(),
            repr: repr.into(),
            args: Vec::new(),
        }
    }

    /// Construct an operator node, asserting the operator/arity invariant.
    pub fn op(operator: Operator, ty: Type, args: Vec<Expression>) -> Self {
        assert_eq!(
            args.len(),
            operator.arity(),
            "operator {:?} expects {} args, got {}",
            operator,
            operator.arity(),
            args.len()
        );
        Expression {
            kind: NodeKind::Operator,
            ty,
            operator: Some(operator),
            raw_type: String::new(),
            repr: operator.operator_to_string().to_string(),
            args,
        }
    }

    /// Check the structural invariant: `Operator` nodes carry exactly
    /// `operator.arity()` children; every other kind carries none.
    pub fn is_well_formed(&self) -> bool {
        match self.kind {
            NodeKind::Operator => match self.operator {
                Some(op) => self.args.len() == op.arity() && self.args.iter().all(Self::is_well_formed),
                None => false,
            },
            _ => self.args.is_empty(),
        }
    }

    /// Whether this node is one of the four auxiliary holes.
    pub fn is_auxiliary_hole(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Bv2 | NodeKind::Int2 | NodeKind::Bool2 | NodeKind::Bool3
        )
    }
}

/// Render an expression back to C source syntax. Used by the validator to
/// emit source-level patches and, transitively, by runtime codegen.
pub fn expression_to_string(expr: &Expression) -> String {
    match expr.kind {
        NodeKind::Variable | NodeKind::Constant | NodeKind::Parameter => expr.repr.clone(),
        NodeKind::Bv2 | NodeKind::Int2 | NodeKind::Bool2 | NodeKind::Bool3 => {
            format!("/*{:?}*/", expr.kind)
        }
        NodeKind::Operator => {
            let operator = expr.operator.expect("well-formed Operator node has an operator");
            match operator {
                Operator::Neg | Operator::Not | Operator::BvNot => {
                    format!("({}{})", operator.operator_to_string(), expression_to_string(&expr.args[0]))
                }
                Operator::BvToInt | Operator::IntToBv => expression_to_string(&expr.args[0]),
                Operator::IntCast => format!("((int){})", expression_to_string(&expr.args[0])),
                _ => format!(
                    "({} {} {})",
                    expression_to_string(&expr.args[0]),
                    operator.operator_to_string(),
                    expression_to_string(&expr.args[1])
                ),
            }
        }
    }
}

/// Build an integer-constant leaf expression with value `n`.
pub fn get_integer_expression(n: i64) -> Expression {
    Expression::leaf(NodeKind::Constant, Type::Integer, "int", n.to_string())
}

/// Build the null-pointer constant leaf expression.
pub fn get_null_pointer() -> Expression {
    Expression::leaf(NodeKind::Constant, Type::Pointer, "void *", "((void *)0)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_arity_matches_catalogue() {
        assert_eq!(Operator::Add.arity(), 2);
        assert_eq!(Operator::Neg.arity(), 1);
        assert_eq!(Operator::BvToInt.arity(), 1);
    }

    #[test]
    fn binary_and_unary_parsing_roundtrips_through_to_string() {
        assert_eq!(Operator::binary_operator_by_string(">="), Some(Operator::Ge));
        assert_eq!(Operator::unary_operator_by_string("!"), Some(Operator::Not));
        assert_eq!(Operator::Ge.operator_to_string(), ">=");
        assert_eq!(Operator::binary_operator_by_string("nonsense"), None);
    }

    #[test]
    fn well_formed_checks_arity_recursively() {
        let x = Expression::leaf(NodeKind::Variable, Type::Integer, "int", "x");
        let zero = get_integer_expression(0);
        let cmp = Expression::op(Operator::Gt, Type::Boolean, vec![x, zero]);
        assert!(cmp.is_well_formed());

        let mut malformed = cmp.clone();
        malformed.args.pop();
        assert!(!malformed.is_well_formed());
    }

    #[test]
    fn expression_to_string_renders_infix_and_prefix_forms() {
        let x = Expression::leaf(NodeKind::Variable, Type::Integer, "int", "x");
        let neg = Expression::op(Operator::Neg, Type::Integer, vec![x.clone()]);
        assert_eq!(expression_to_string(&neg), "(-x)");

        let cmp = Expression::op(Operator::Ge, Type::Boolean, vec![x, get_integer_expression(0)]);
        assert_eq!(expression_to_string(&cmp), "(x >= 0)");
    }

    #[test]
    fn expression_json_roundtrip() {
        let x = Expression::leaf(NodeKind::Variable, Type::Integer, "int", "x");
        let cmp = Expression::op(Operator::Ge, Type::Boolean, vec![x, get_integer_expression(0)]);
        let json = serde_json::to_string(&cmp).unwrap();
        let back: Expression = serde_json::from_str(&json).unwrap();
        assert_eq!(cmp, back);
    }
}
