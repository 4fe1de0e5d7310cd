//! Compiled predicates.
//!
//! A WHERE/ON/HAVING tree compiles into a [`FilterStmt`]: a flat sequence
//! of [`FilterUnit`]s evaluated left to right, where AND binds tighter
//! than OR (each unit's `or_conj` flag starts a new OR group). Operands
//! are bound expressions, materialized value lists, or embedded subquery
//! plans; subqueries execute through the [`ExecContext`] and uncorrelated
//! ones materialize into a value list on first use.
//!
//! Comparison semantics: a NULL on either side of an ordering comparison
//! leaves the row unmatched (no error), as does a type pairing outside
//! the coercion lattice. Only IS [NOT] NULL observes NULL directly.

use std::cmp::Ordering;
use std::fmt;

use crate::datum::Value;

use super::context::ExecContext;
use super::error::ExecutorError;
use super::expr::BoundExpr;
use super::plan::SubqueryPlan;
use super::runner;
use super::tuple::Tuple;

/// Comparison operators, including the predicate forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    /// =
    Eq,
    /// <>
    Neq,
    /// <
    Lt,
    /// <=
    LtEq,
    /// >
    Gt,
    /// >=
    GtEq,
    /// LIKE
    Like,
    /// NOT LIKE
    NotLike,
    /// IS NULL
    IsNull,
    /// IS NOT NULL
    IsNotNull,
    /// IN
    In,
    /// NOT IN
    NotIn,
    /// EXISTS
    Exists,
    /// NOT EXISTS
    NotExists,
}

impl CompOp {
    /// Returns the display string for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompOp::Eq => "=",
            CompOp::Neq => "<>",
            CompOp::Lt => "<",
            CompOp::LtEq => "<=",
            CompOp::Gt => ">",
            CompOp::GtEq => ">=",
            CompOp::Like => "LIKE",
            CompOp::NotLike => "NOT LIKE",
            CompOp::IsNull => "IS NULL",
            CompOp::IsNotNull => "IS NOT NULL",
            CompOp::In => "IN",
            CompOp::NotIn => "NOT IN",
            CompOp::Exists => "EXISTS",
            CompOp::NotExists => "NOT EXISTS",
        }
    }

    /// Returns the complement of this operator (for compiling NOT).
    pub fn negated(&self) -> CompOp {
        match self {
            CompOp::Eq => CompOp::Neq,
            CompOp::Neq => CompOp::Eq,
            CompOp::Lt => CompOp::GtEq,
            CompOp::LtEq => CompOp::Gt,
            CompOp::Gt => CompOp::LtEq,
            CompOp::GtEq => CompOp::Lt,
            CompOp::Like => CompOp::NotLike,
            CompOp::NotLike => CompOp::Like,
            CompOp::IsNull => CompOp::IsNotNull,
            CompOp::IsNotNull => CompOp::IsNull,
            CompOp::In => CompOp::NotIn,
            CompOp::NotIn => CompOp::In,
            CompOp::Exists => CompOp::NotExists,
            CompOp::NotExists => CompOp::Exists,
        }
    }

    /// Returns true for the six ordering comparisons.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            CompOp::Eq | CompOp::Neq | CompOp::Lt | CompOp::LtEq | CompOp::Gt | CompOp::GtEq
        )
    }
}

/// One side of a filter unit.
#[derive(Debug, Clone)]
pub enum FilterOperand {
    /// Scalar expression over the input tuple.
    Expr(BoundExpr),
    /// Materialized list of values (IN lists).
    ValueList(Vec<Value>),
    /// Embedded subquery plan.
    SubSelect(Box<SubqueryPlan>),
}

impl FilterOperand {
    /// Resolves this operand to a scalar value for the given tuple.
    ///
    /// A scalar subquery with no rows resolves to NULL (which leaves a
    /// comparison unmatched); more than one row is a statement error.
    fn scalar(
        &mut self,
        tuple: &Tuple,
        ctx: &ExecContext,
    ) -> Result<Value, ExecutorError> {
        match self {
            FilterOperand::Expr(e) => e.evaluate(tuple, &ctx.outer),
            FilterOperand::SubSelect(plan) => {
                match runner::subquery_scalar(plan, tuple, ctx)? {
                    Some(value) => Ok(value),
                    None => Ok(Value::Null),
                }
            }
            FilterOperand::ValueList(_) => Err(ExecutorError::InvalidArgument(
                "value list used as a scalar operand".to_string(),
            )),
        }
    }

    /// Resolves this operand to a list of values (IN membership).
    fn list(
        &mut self,
        tuple: &Tuple,
        ctx: &ExecContext,
    ) -> Result<Vec<Value>, ExecutorError> {
        match self {
            FilterOperand::ValueList(values) => Ok(values.clone()),
            FilterOperand::SubSelect(plan) => runner::subquery_list(plan, tuple, ctx),
            FilterOperand::Expr(_) => Err(ExecutorError::InvalidArgument(
                "scalar expression used where a list is required".to_string(),
            )),
        }
    }
}

impl fmt::Display for FilterOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOperand::Expr(e) => write!(f, "{}", e),
            FilterOperand::ValueList(values) => {
                write!(f, "(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            FilterOperand::SubSelect(_) => write!(f, "(SELECT ...)"),
        }
    }
}

/// A single compiled predicate atom.
#[derive(Debug, Clone)]
pub struct FilterUnit {
    /// Left operand.
    pub left: FilterOperand,
    /// Comparison operator.
    pub op: CompOp,
    /// Right operand.
    pub right: FilterOperand,
    /// True if this unit joins the preceding units with OR (starting a
    /// new AND group). The first unit's flag is ignored.
    pub or_conj: bool,
}

impl FilterUnit {
    /// Evaluates this unit against a tuple.
    pub fn evaluate(
        &mut self,
        tuple: &Tuple,
        ctx: &ExecContext,
    ) -> Result<bool, ExecutorError> {
        match self.op {
            CompOp::IsNull => Ok(self.left.scalar(tuple, ctx)?.is_null()),
            CompOp::IsNotNull => Ok(!self.left.scalar(tuple, ctx)?.is_null()),

            CompOp::Exists | CompOp::NotExists => {
                let FilterOperand::SubSelect(plan) = &mut self.right else {
                    return Err(ExecutorError::InvalidArgument(
                        "EXISTS requires a subquery operand".to_string(),
                    ));
                };
                let found = runner::subquery_exists(plan, tuple, ctx)?;
                Ok(if self.op == CompOp::Exists { found } else { !found })
            }

            CompOp::In | CompOp::NotIn => {
                let probe = self.left.scalar(tuple, ctx)?;
                // NULL membership is unknown: never matched, either way.
                if probe.is_null() {
                    return Ok(false);
                }
                let list = self.right.list(tuple, ctx)?;
                let found = list
                    .iter()
                    .any(|v| probe.compare(v) == Some(Ordering::Equal));
                Ok(if self.op == CompOp::In { found } else { !found })
            }

            CompOp::Like | CompOp::NotLike => {
                let value = self.left.scalar(tuple, ctx)?;
                let pattern = self.right.scalar(tuple, ctx)?;
                if value.is_null() || pattern.is_null() {
                    return Ok(false);
                }
                let (Some(value), Some(pattern)) = (value.as_str(), pattern.as_str()) else {
                    return Err(ExecutorError::TypeMismatch {
                        expected: "string operands for LIKE".to_string(),
                        found: "non-string operand".to_string(),
                    });
                };
                let matched = like_match(value, pattern);
                Ok(if self.op == CompOp::Like {
                    matched
                } else {
                    !matched
                })
            }

            // Ordering comparisons: incomparable pairs (NULL involved, or
            // types outside the lattice) leave the row unmatched.
            _ => {
                let left = self.left.scalar(tuple, ctx)?;
                let right = self.right.scalar(tuple, ctx)?;
                let Some(ord) = left.compare(&right) else {
                    return Ok(false);
                };
                Ok(match self.op {
                    CompOp::Eq => ord == Ordering::Equal,
                    CompOp::Neq => ord != Ordering::Equal,
                    CompOp::Lt => ord == Ordering::Less,
                    CompOp::LtEq => ord != Ordering::Greater,
                    CompOp::Gt => ord == Ordering::Greater,
                    CompOp::GtEq => ord != Ordering::Less,
                    _ => unreachable!("predicate forms handled above"),
                })
            }
        }
    }
}

impl fmt::Display for FilterUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            CompOp::IsNull | CompOp::IsNotNull => {
                write!(f, "{} {}", self.left, self.op.as_str())
            }
            CompOp::Exists | CompOp::NotExists => {
                write!(f, "{} {}", self.op.as_str(), self.right)
            }
            _ => write!(f, "{} {} {}", self.left, self.op.as_str(), self.right),
        }
    }
}

/// A compiled predicate: filter units with AND-over-OR structure.
#[derive(Debug, Clone, Default)]
pub struct FilterStmt {
    /// Units in source order; `or_conj` flags partition them into OR-joined
    /// AND groups.
    pub units: Vec<FilterUnit>,
}

impl FilterStmt {
    /// Creates a predicate from compiled units.
    pub fn new(units: Vec<FilterUnit>) -> Self {
        FilterStmt { units }
    }

    /// Returns true if there are no units (always passes).
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Evaluates the predicate left to right with short-circuiting.
    ///
    /// Units accumulate into an AND group until a unit with `or_conj`
    /// starts the next group; the result is the OR of all groups. A group
    /// that is already false skips the evaluation of its remaining units,
    /// and a finished group that came out true short-circuits the rest.
    pub fn evaluate(&mut self, tuple: &Tuple, ctx: &ExecContext) -> Result<bool, ExecutorError> {
        let mut group_result = true;
        for unit in &mut self.units {
            if unit.or_conj {
                if group_result {
                    return Ok(true);
                }
                group_result = true;
            }
            if group_result {
                group_result = unit.evaluate(tuple, ctx)?;
            }
        }
        Ok(group_result)
    }
}

impl fmt::Display for FilterStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, unit) in self.units.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", if unit.or_conj { "OR" } else { "AND" })?;
            }
            write!(f, "{}", unit)?;
        }
        Ok(())
    }
}

/// SQL LIKE matching: `%` matches any run of characters (including an
/// empty one), `_` matches exactly one character, anything else matches
/// itself. Case-sensitive.
pub fn like_match(text: &str, pattern: &str) -> bool {
    fn walk(text: &[char], pattern: &[char]) -> bool {
        let Some(p) = pattern.first() else {
            return text.is_empty();
        };
        match p {
            '%' => (0..=text.len()).any(|skip| walk(&text[skip..], &pattern[1..])),
            '_' => !text.is_empty() && walk(&text[1..], &pattern[1..]),
            ch => text.first() == Some(ch) && walk(&text[1..], &pattern[1..]),
        }
    }
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    walk(&text, &pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::heap::TableStore;
    use crate::tx::TxManager;
    use std::sync::Arc;

    fn ctx() -> ExecContext {
        let manager = TxManager::new();
        ExecContext::new(
            Arc::new(Catalog::new()),
            Arc::new(TableStore::new()),
            manager.begin(),
        )
    }

    fn value(v: Value) -> FilterOperand {
        FilterOperand::Expr(BoundExpr::Value(v))
    }

    fn unit(left: Value, op: CompOp, right: Value) -> FilterUnit {
        FilterUnit {
            left: value(left),
            op,
            right: value(right),
            or_conj: false,
        }
    }

    fn eval(mut u: FilterUnit) -> bool {
        u.evaluate(&Tuple::Values(vec![]), &ctx()).unwrap()
    }

    // ========================================================================
    // like_match
    // ========================================================================

    #[test]
    fn test_like_percent() {
        assert!(like_match("hello", "h%"));
        assert!(like_match("hello", "%o"));
        assert!(like_match("hello", "%ell%"));
        assert!(like_match("hello", "%"));
        assert!(!like_match("hello", "h%x"));
    }

    #[test]
    fn test_like_underscore() {
        assert!(like_match("cat", "c_t"));
        assert!(!like_match("caat", "c_t"));
        assert!(like_match("cat", "___"));
        assert!(!like_match("cat", "____"));
    }

    #[test]
    fn test_like_exact_and_empty() {
        assert!(like_match("abc", "abc"));
        assert!(!like_match("abc", "abd"));
        assert!(like_match("", "%"));
        assert!(!like_match("", "_"));
    }

    #[test]
    fn test_like_case_sensitive() {
        assert!(!like_match("ABC", "abc"));
    }

    // ========================================================================
    // FilterUnit comparisons
    // ========================================================================

    #[test]
    fn test_comparisons() {
        assert!(eval(unit(Value::Int(1), CompOp::Eq, Value::Int(1))));
        assert!(eval(unit(Value::Int(1), CompOp::Lt, Value::Int(2))));
        assert!(eval(unit(Value::Int(2), CompOp::GtEq, Value::Int(2))));
        assert!(!eval(unit(Value::Int(1), CompOp::Gt, Value::Int(2))));
        assert!(eval(unit(Value::Int(1), CompOp::Eq, Value::Float(1.0))));
    }

    #[test]
    fn test_null_comparison_unmatched() {
        assert!(!eval(unit(Value::Null, CompOp::Eq, Value::Null)));
        assert!(!eval(unit(Value::Null, CompOp::Neq, Value::Int(1))));
        assert!(!eval(unit(Value::Int(1), CompOp::Lt, Value::Null)));
    }

    #[test]
    fn test_cross_type_unmatched() {
        assert!(!eval(unit(
            Value::Int(1),
            CompOp::Eq,
            Value::Chars("1".into())
        )));
    }

    #[test]
    fn test_is_null() {
        assert!(eval(unit(Value::Null, CompOp::IsNull, Value::Null)));
        assert!(!eval(unit(Value::Int(1), CompOp::IsNull, Value::Null)));
        assert!(eval(unit(Value::Int(1), CompOp::IsNotNull, Value::Null)));
    }

    #[test]
    fn test_like_unit() {
        assert!(eval(FilterUnit {
            left: value(Value::Chars("sailing".into())),
            op: CompOp::Like,
            right: value(Value::Chars("sail%".into())),
            or_conj: false,
        }));
        assert!(eval(FilterUnit {
            left: value(Value::Chars("sailing".into())),
            op: CompOp::NotLike,
            right: value(Value::Chars("x%".into())),
            or_conj: false,
        }));
    }

    #[test]
    fn test_in_list() {
        let mut u = FilterUnit {
            left: value(Value::Int(2)),
            op: CompOp::In,
            right: FilterOperand::ValueList(vec![Value::Int(1), Value::Int(2)]),
            or_conj: false,
        };
        assert!(u.evaluate(&Tuple::Values(vec![]), &ctx()).unwrap());

        let mut u = FilterUnit {
            left: value(Value::Int(3)),
            op: CompOp::NotIn,
            right: FilterOperand::ValueList(vec![Value::Int(1), Value::Int(2)]),
            or_conj: false,
        };
        assert!(u.evaluate(&Tuple::Values(vec![]), &ctx()).unwrap());
    }

    #[test]
    fn test_null_probe_in_list_unmatched() {
        for op in [CompOp::In, CompOp::NotIn] {
            let mut u = FilterUnit {
                left: value(Value::Null),
                op,
                right: FilterOperand::ValueList(vec![Value::Int(1)]),
                or_conj: false,
            };
            assert!(!u.evaluate(&Tuple::Values(vec![]), &ctx()).unwrap());
        }
    }

    // ========================================================================
    // FilterStmt conjunction structure
    // ========================================================================

    fn const_unit(pass: bool, or_conj: bool) -> FilterUnit {
        FilterUnit {
            left: value(Value::Int(1)),
            op: CompOp::Eq,
            right: value(Value::Int(if pass { 1 } else { 0 })),
            or_conj,
        }
    }

    fn eval_stmt(units: Vec<FilterUnit>) -> bool {
        FilterStmt::new(units)
            .evaluate(&Tuple::Values(vec![]), &ctx())
            .unwrap()
    }

    #[test]
    fn test_empty_filter_passes() {
        assert!(eval_stmt(vec![]));
    }

    #[test]
    fn test_and_group() {
        assert!(eval_stmt(vec![const_unit(true, false), const_unit(true, false)]));
        assert!(!eval_stmt(vec![const_unit(true, false), const_unit(false, false)]));
    }

    #[test]
    fn test_or_groups_and_binds_tighter() {
        // (T AND F) OR T  => true
        assert!(eval_stmt(vec![
            const_unit(true, false),
            const_unit(false, false),
            const_unit(true, true),
        ]));
        // (F) OR (T AND F) => false
        assert!(!eval_stmt(vec![
            const_unit(false, false),
            const_unit(true, true),
            const_unit(false, false),
        ]));
        // (T) OR (anything) short-circuits to true
        assert!(eval_stmt(vec![
            const_unit(true, false),
            const_unit(false, true),
        ]));
    }

    #[test]
    fn test_negated_ops() {
        assert_eq!(CompOp::Eq.negated(), CompOp::Neq);
        assert_eq!(CompOp::In.negated(), CompOp::NotIn);
        assert_eq!(CompOp::Exists.negated(), CompOp::NotExists);
        assert_eq!(CompOp::IsNull.negated(), CompOp::IsNotNull);
        assert_eq!(CompOp::Lt.negated(), CompOp::GtEq);
    }

    #[test]
    fn test_display() {
        let stmt = FilterStmt::new(vec![
            const_unit(true, false),
            const_unit(false, true),
        ]);
        assert_eq!(stmt.to_string(), "1 = 1 OR 1 = 0");
    }
}
