//! Bound expression tree with compile-time column resolution.
//!
//! [`BoundExpr`] is the executor's internal representation of scalar
//! expressions. Unlike the AST [`Expr`](crate::sql::Expr), column
//! references are resolved to positional indices at bind time, enabling
//! O(1) access during evaluation. Correlated references into an enclosing
//! query resolve to an indexed lookup in the outer-row scope instead of a
//! parent pointer.
//!
//! Comparisons, logical connectives, and subqueries do not appear here:
//! condition trees compile into [`FilterStmt`](super::filter::FilterStmt)s
//! whose operands hold `BoundExpr`s.

use std::fmt;
use std::sync::Arc;

use crate::datum::{Type, Value};

use super::aggregate::AggregateFunction;
use super::error::ExecutorError;
use super::func::ScalarFunc;
use super::tuple::Tuple;

/// Arithmetic operators over scalar expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// /
    Div,
}

impl ArithOp {
    /// Returns the display string for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

/// An expression tree with column references resolved to positions.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    /// Literal value (also produced by bind-time constant folding).
    Value(Value),
    /// Column reference resolved to a slot in the input tuple.
    Field {
        /// Positional index into the input tuple.
        index: usize,
        /// Qualified display name (for headers and EXPLAIN).
        name: String,
        /// Column type.
        ty: Type,
    },
    /// Column reference into an enclosing query's current row.
    ///
    /// `level` counts enclosing scopes outward: 0 is the nearest one.
    OuterField {
        level: usize,
        index: usize,
        name: String,
        ty: Type,
    },
    /// Binary arithmetic.
    Arith {
        op: ArithOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    /// Unary negation.
    Neg(Box<BoundExpr>),
    /// Scalar function call over non-constant arguments.
    Func {
        func: ScalarFunc,
        args: Vec<BoundExpr>,
    },
    /// Aggregate call (transient: the planner extracts these into the
    /// Aggregate plan node and replaces them with `Field` references into
    /// its output; none survive to evaluation).
    Aggregate {
        func: AggregateFunction,
        /// Argument expression; `None` is COUNT(*).
        arg: Option<Box<BoundExpr>>,
    },
}

impl BoundExpr {
    /// Returns the output type of this expression, or `None` for NULL
    /// literals and type-less arithmetic over them.
    pub fn ty(&self) -> Option<Type> {
        match self {
            BoundExpr::Value(v) => v.ty(),
            BoundExpr::Field { ty, .. } | BoundExpr::OuterField { ty, .. } => Some(*ty),
            BoundExpr::Arith { left, right, .. } => match (left.ty(), right.ty()) {
                (Some(Type::Float), _) | (_, Some(Type::Float)) => Some(Type::Float),
                (Some(Type::Int), Some(Type::Int)) => Some(Type::Int),
                (Some(t), None) | (None, Some(t)) => Some(t),
                _ => None,
            },
            BoundExpr::Neg(e) => e.ty(),
            BoundExpr::Func { func, args } => Some(func.output_type(args.len())),
            BoundExpr::Aggregate { func, arg } => {
                Some(func.output_type(arg.as_deref().and_then(|e| e.ty())))
            }
        }
    }

    /// Returns true if this tree contains an aggregate call.
    pub fn has_aggregate(&self) -> bool {
        match self {
            BoundExpr::Aggregate { .. } => true,
            BoundExpr::Arith { left, right, .. } => left.has_aggregate() || right.has_aggregate(),
            BoundExpr::Neg(e) => e.has_aggregate(),
            BoundExpr::Func { args, .. } => args.iter().any(|a| a.has_aggregate()),
            _ => false,
        }
    }

    /// Returns true if this tree references an enclosing query's row.
    pub fn has_outer(&self) -> bool {
        match self {
            BoundExpr::OuterField { .. } => true,
            BoundExpr::Arith { left, right, .. } => left.has_outer() || right.has_outer(),
            BoundExpr::Neg(e) => e.has_outer(),
            BoundExpr::Func { args, .. } => args.iter().any(|a| a.has_outer()),
            BoundExpr::Aggregate { arg, .. } => {
                arg.as_deref().map(BoundExpr::has_outer).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Returns true if this tree reads any column of the input tuple.
    pub fn has_field(&self) -> bool {
        match self {
            BoundExpr::Field { .. } => true,
            BoundExpr::Arith { left, right, .. } => left.has_field() || right.has_field(),
            BoundExpr::Neg(e) => e.has_field(),
            BoundExpr::Func { args, .. } => args.iter().any(|a| a.has_field()),
            BoundExpr::Aggregate { arg, .. } => {
                arg.as_deref().map(BoundExpr::has_field).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Evaluates this expression against a tuple.
    ///
    /// `outer` is the stack of enclosing queries' current rows (innermost
    /// last) for correlated references.
    pub fn evaluate(&self, tuple: &Tuple, outer: &[Arc<Tuple>]) -> Result<Value, ExecutorError> {
        match self {
            BoundExpr::Value(v) => Ok(v.clone()),
            BoundExpr::Field { index, .. } => Ok(tuple.cell_at(*index).clone()),
            BoundExpr::OuterField { level, index, name, .. } => {
                let pos = outer
                    .len()
                    .checked_sub(1 + level)
                    .and_then(|i| outer.get(i));
                match pos {
                    Some(row) => Ok(row.cell_at(*index).clone()),
                    None => Err(ExecutorError::FieldNotFound { name: name.clone() }),
                }
            }
            BoundExpr::Arith { op, left, right } => {
                let left = left.evaluate(tuple, outer)?;
                let right = right.evaluate(tuple, outer)?;
                Ok(eval_arith(*op, &left, &right))
            }
            BoundExpr::Neg(e) => match e.evaluate(tuple, outer)? {
                Value::Null => Ok(Value::Null),
                Value::Int(n) => Ok(Value::Int(-n)),
                Value::Float(n) => Ok(Value::Float(-n)),
                other => Err(ExecutorError::TypeMismatch {
                    expected: "a numeric value".to_string(),
                    found: other
                        .ty()
                        .map(|t| t.display_name().to_string())
                        .unwrap_or_else(|| "NULL".to_string()),
                }),
            },
            BoundExpr::Func { func, args } => {
                let args = args
                    .iter()
                    .map(|a| a.evaluate(tuple, outer))
                    .collect::<Result<Vec<_>, _>>()?;
                func.eval(&args)
            }
            BoundExpr::Aggregate { func, .. } => Err(ExecutorError::AggregateNotAllowed {
                context: format!("{} evaluated outside an aggregation", func),
            }),
        }
    }

    /// Evaluates a constant expression (no tuple, no outer scope).
    pub fn evaluate_const(&self) -> Result<Value, ExecutorError> {
        self.evaluate(&Tuple::Values(vec![]), &[])
    }
}

/// Evaluates arithmetic with NULL propagation.
///
/// Any NULL operand or a non-numeric operand yields NULL, and so does
/// division by zero. INT op INT stays INT unless the operator is division
/// against zero; mixing in a FLOAT widens the result.
fn eval_arith(op: ArithOp, left: &Value, right: &Value) -> Value {
    let (l, r) = match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            return match op {
                ArithOp::Add => Value::Int(a.wrapping_add(*b)),
                ArithOp::Sub => Value::Int(a.wrapping_sub(*b)),
                ArithOp::Mul => Value::Int(a.wrapping_mul(*b)),
                ArithOp::Div => {
                    if *b == 0 {
                        Value::Null
                    } else {
                        Value::Int(a.wrapping_div(*b))
                    }
                }
            };
        }
        (l, r) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => (l, r),
            _ => return Value::Null,
        },
    };

    let result = match op {
        ArithOp::Add => l + r,
        ArithOp::Sub => l - r,
        ArithOp::Mul => l * r,
        ArithOp::Div => {
            if r == 0.0 {
                return Value::Null;
            }
            l / r
        }
    };
    Value::Float(result as f32)
}

impl fmt::Display for BoundExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundExpr::Value(v) => match v {
                Value::Chars(s) | Value::Text(s) => write!(f, "'{}'", s),
                other => write!(f, "{}", other),
            },
            BoundExpr::Field { name, .. } => write!(f, "{}", name),
            BoundExpr::OuterField { name, .. } => write!(f, "{}", name),
            BoundExpr::Arith { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            BoundExpr::Neg(e) => write!(f, "(-{})", e),
            BoundExpr::Func { func, args } => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            BoundExpr::Aggregate { func, arg } => match arg {
                Some(arg) => write!(f, "{}({})", func, arg),
                None => write!(f, "{}(*)", func),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(index: usize, ty: Type) -> BoundExpr {
        BoundExpr::Field {
            index,
            name: format!("c{}", index),
            ty,
        }
    }

    fn int(n: i32) -> BoundExpr {
        BoundExpr::Value(Value::Int(n))
    }

    fn tuple(values: Vec<Value>) -> Tuple {
        Tuple::Values(values)
    }

    #[test]
    fn test_field_lookup() {
        let t = tuple(vec![Value::Int(10), Value::Chars("x".into())]);
        assert_eq!(
            field(1, Type::Chars).evaluate(&t, &[]).unwrap(),
            Value::Chars("x".into())
        );
    }

    #[test]
    fn test_arith_int_stays_int() {
        let expr = BoundExpr::Arith {
            op: ArithOp::Add,
            left: Box::new(int(2)),
            right: Box::new(int(3)),
        };
        assert_eq!(expr.evaluate_const().unwrap(), Value::Int(5));
    }

    #[test]
    fn test_arith_int_div_truncates() {
        let expr = BoundExpr::Arith {
            op: ArithOp::Div,
            left: Box::new(int(7)),
            right: Box::new(int(2)),
        };
        assert_eq!(expr.evaluate_const().unwrap(), Value::Int(3));
    }

    #[test]
    fn test_arith_mixed_widens_to_float() {
        let expr = BoundExpr::Arith {
            op: ArithOp::Mul,
            left: Box::new(int(2)),
            right: Box::new(BoundExpr::Value(Value::Float(1.5))),
        };
        assert_eq!(expr.evaluate_const().unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_arith_null_propagates() {
        let expr = BoundExpr::Arith {
            op: ArithOp::Add,
            left: Box::new(BoundExpr::Value(Value::Null)),
            right: Box::new(int(1)),
        };
        assert_eq!(expr.evaluate_const().unwrap(), Value::Null);
    }

    #[test]
    fn test_div_by_zero_is_null() {
        for (l, r) in [
            (int(1), int(0)),
            (
                BoundExpr::Value(Value::Float(1.0)),
                BoundExpr::Value(Value::Float(0.0)),
            ),
        ] {
            let expr = BoundExpr::Arith {
                op: ArithOp::Div,
                left: Box::new(l),
                right: Box::new(r),
            };
            assert_eq!(expr.evaluate_const().unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_neg() {
        assert_eq!(
            BoundExpr::Neg(Box::new(int(5))).evaluate_const().unwrap(),
            Value::Int(-5)
        );
        assert_eq!(
            BoundExpr::Neg(Box::new(BoundExpr::Value(Value::Null)))
                .evaluate_const()
                .unwrap(),
            Value::Null
        );
        assert!(
            BoundExpr::Neg(Box::new(BoundExpr::Value(Value::Chars("x".into()))))
                .evaluate_const()
                .is_err()
        );
    }

    #[test]
    fn test_outer_field_lookup() {
        let outer = vec![
            Arc::new(tuple(vec![Value::Int(1)])),
            Arc::new(tuple(vec![Value::Int(2)])),
        ];
        let expr = BoundExpr::OuterField {
            level: 0,
            index: 0,
            name: "u.id".into(),
            ty: Type::Int,
        };
        // Level 0 is the innermost enclosing row (last pushed).
        assert_eq!(
            expr.evaluate(&tuple(vec![]), &outer).unwrap(),
            Value::Int(2)
        );

        let expr = BoundExpr::OuterField {
            level: 1,
            index: 0,
            name: "u.id".into(),
            ty: Type::Int,
        };
        assert_eq!(
            expr.evaluate(&tuple(vec![]), &outer).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_func_eval() {
        let expr = BoundExpr::Func {
            func: ScalarFunc::Length,
            args: vec![field(0, Type::Chars)],
        };
        let t = tuple(vec![Value::Chars("abcd".into())]);
        assert_eq!(expr.evaluate(&t, &[]).unwrap(), Value::Int(4));
    }

    #[test]
    fn test_aggregate_outside_aggregation_is_error() {
        let expr = BoundExpr::Aggregate {
            func: AggregateFunction::Count,
            arg: None,
        };
        assert!(matches!(
            expr.evaluate_const().unwrap_err(),
            ExecutorError::AggregateNotAllowed { .. }
        ));
    }

    #[test]
    fn test_ty_inference() {
        assert_eq!(int(1).ty(), Some(Type::Int));
        let expr = BoundExpr::Arith {
            op: ArithOp::Add,
            left: Box::new(int(1)),
            right: Box::new(BoundExpr::Value(Value::Float(1.0))),
        };
        assert_eq!(expr.ty(), Some(Type::Float));
        assert_eq!(BoundExpr::Value(Value::Null).ty(), None);
    }

    #[test]
    fn test_display() {
        let expr = BoundExpr::Arith {
            op: ArithOp::Add,
            left: Box::new(field(0, Type::Int)),
            right: Box::new(int(1)),
        };
        assert_eq!(expr.to_string(), "(c0 + 1)");
    }
}
