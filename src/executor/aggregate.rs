//! Aggregate function definitions and accumulators.
//!
//! This module provides the building blocks for GROUP BY and aggregate
//! query processing:
//!
//! - [`AggregateFunction`] - enum of supported aggregate functions
//! - [`AggregateOp`] - a single aggregate operation (function + argument)
//! - [`Accumulator`] - trait for stateful aggregate computation
//! - [`GroupKey`] - map key with SQL GROUP BY equality (NULL=NULL, NaN=NaN)
//! - [`GroupTable`] - hash-backed group storage that remembers insertion
//!   order, which is the emission order of the aggregation operator

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::datum::{Type, Value};

use super::error::ExecutorError;
use super::expr::BoundExpr;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// COUNT - counts rows or non-NULL values.
    Count,
    /// SUM - sum of numeric values.
    Sum,
    /// AVG - average of numeric values (always FLOAT).
    Avg,
    /// MIN - minimum value.
    Min,
    /// MAX - maximum value.
    Max,
}

impl AggregateFunction {
    /// Resolves a function name (case-insensitive) to an aggregate
    /// function. Returns `None` for non-aggregate names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "avg" => Some(AggregateFunction::Avg),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    /// Computes the output type given the argument type.
    pub fn output_type(&self, input_ty: Option<Type>) -> Type {
        match self {
            AggregateFunction::Count => Type::Int,
            AggregateFunction::Avg => Type::Float,
            AggregateFunction::Sum => match input_ty {
                Some(Type::Float) => Type::Float,
                _ => Type::Int,
            },
            AggregateFunction::Min | AggregateFunction::Max => input_ty.unwrap_or(Type::Chars),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        };
        f.write_str(name)
    }
}

/// A single aggregate operation within an Aggregate plan node.
///
/// COUNT(*) is represented with `arg: None`; every other function carries
/// its argument expression, bound against the aggregation input schema.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOp {
    /// Aggregate function to apply.
    pub func: AggregateFunction,
    /// Argument expression (`None` only for COUNT(*)).
    pub arg: Option<BoundExpr>,
}

impl AggregateOp {
    /// Returns the output type of this aggregate operation.
    pub fn output_type(&self) -> Type {
        self.func.output_type(self.arg.as_ref().and_then(|e| e.ty()))
    }

    /// Creates an accumulator for this aggregate operation.
    pub fn create_accumulator(&self) -> Box<dyn Accumulator> {
        match self.func {
            AggregateFunction::Count => Box::new(CountAccumulator { count: 0 }),
            AggregateFunction::Sum => Box::new(SumAccumulator { sum: Value::Null }),
            AggregateFunction::Avg => Box::new(AvgAccumulator { sum: 0.0, count: 0 }),
            AggregateFunction::Min => Box::new(ExtremeAccumulator::new(true)),
            AggregateFunction::Max => Box::new(ExtremeAccumulator::new(false)),
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}({})", self.func, arg),
            None => write!(f, "{}(*)", self.func),
        }
    }
}

/// Stateful aggregate computation: feed values, then finish.
///
/// NULL skipping is handled by the caller: COUNT(*) feeds once per row
/// regardless of values, everything else feeds only non-NULL arguments.
pub trait Accumulator: Send {
    /// Feeds a single value into the accumulator.
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError>;

    /// Produces the final aggregate result.
    fn finish(&self) -> Value;
}

/// COUNT(*) and COUNT(expr): counts `feed()` calls.
struct CountAccumulator {
    count: i32,
}

impl Accumulator for CountAccumulator {
    fn feed(&mut self, _value: &Value) -> Result<(), ExecutorError> {
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        Value::Int(self.count)
    }
}

/// SUM(expr): keeps an INT running sum until a FLOAT appears.
struct SumAccumulator {
    sum: Value,
}

impl Accumulator for SumAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        self.sum = match (&self.sum, value) {
            (Value::Null, Value::Int(_) | Value::Float(_)) => value.clone(),
            (Value::Int(a), Value::Int(b)) => {
                Value::Int(a.checked_add(*b).ok_or(ExecutorError::IntegerOverflow)?)
            }
            (Value::Int(a), Value::Float(b)) => Value::Float(*a as f32 + b),
            (Value::Float(a), Value::Int(b)) => Value::Float(a + *b as f32),
            (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
            (_, other) => {
                return Err(ExecutorError::TypeMismatch {
                    expected: "a numeric value".to_string(),
                    found: other
                        .ty()
                        .map(|t| t.display_name().to_string())
                        .unwrap_or_else(|| "NULL".to_string()),
                })
            }
        };
        Ok(())
    }

    fn finish(&self) -> Value {
        self.sum.clone()
    }
}

/// AVG(expr): running sum and count; FLOAT result, NULL for no input.
struct AvgAccumulator {
    sum: f64,
    count: i64,
}

impl Accumulator for AvgAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        let Some(n) = value.as_f64() else {
            return Err(ExecutorError::TypeMismatch {
                expected: "a numeric value".to_string(),
                found: value
                    .ty()
                    .map(|t| t.display_name().to_string())
                    .unwrap_or_else(|| "NULL".to_string()),
            });
        };
        self.sum += n;
        self.count += 1;
        Ok(())
    }

    fn finish(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Float((self.sum / self.count as f64) as f32)
        }
    }
}

/// MIN/MAX(expr): keeps the extreme value seen so far.
struct ExtremeAccumulator {
    keep_least: bool,
    bound: Value,
}

impl ExtremeAccumulator {
    fn new(keep_least: bool) -> Self {
        ExtremeAccumulator {
            keep_least,
            bound: Value::Null,
        }
    }
}

impl Accumulator for ExtremeAccumulator {
    fn feed(&mut self, value: &Value) -> Result<(), ExecutorError> {
        if self.bound.is_null() {
            self.bound = value.clone();
            return Ok(());
        }
        let replace = match value.compare(&self.bound) {
            Some(std::cmp::Ordering::Less) => self.keep_least,
            Some(std::cmp::Ordering::Greater) => !self.keep_least,
            _ => false,
        };
        if replace {
            self.bound = value.clone();
        }
        Ok(())
    }

    fn finish(&self) -> Value {
        self.bound.clone()
    }
}

/// Map key for GROUP BY grouping.
///
/// Wraps the group-key values with SQL GROUP BY equality semantics:
/// NULL equals NULL (unlike comparison semantics) and NaN equals NaN,
/// so both land in a single group.
#[derive(Debug, Clone)]
pub struct GroupKey(pub Vec<Value>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().zip(other.0.iter()).all(|(a, b)| match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Float(x), Value::Float(y)) if x.is_nan() && y.is_nan() => true,
            _ => a.compare(b) == Some(std::cmp::Ordering::Equal),
        })
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for value in &self.0 {
            match value {
                Value::Null => 0u8.hash(state),
                Value::Int(n) => {
                    1u8.hash(state);
                    n.hash(state);
                }
                Value::Float(n) => {
                    2u8.hash(state);
                    n.to_bits().hash(state);
                }
                Value::Chars(s) => {
                    3u8.hash(state);
                    s.hash(state);
                }
                Value::Date(d) => {
                    4u8.hash(state);
                    d.hash(state);
                }
                Value::Text(s) => {
                    5u8.hash(state);
                    s.hash(state);
                }
            }
        }
    }
}

/// Group storage preserving first-seen order.
///
/// Lookup is hash-based; iteration (the emission order of the aggregation
/// operator) follows the order groups were first inserted.
pub struct GroupTable<T> {
    index: HashMap<GroupKey, usize>,
    entries: Vec<(GroupKey, T)>,
}

impl<T> GroupTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        GroupTable {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Returns the entry for `key`, inserting `make()` on first sight.
    pub fn entry_or_insert_with(&mut self, key: GroupKey, make: impl FnOnce() -> T) -> &mut T {
        if let Some(&pos) = self.index.get(&key) {
            return &mut self.entries[pos].1;
        }
        let pos = self.entries.len();
        self.index.insert(key.clone(), pos);
        self.entries.push((key, make()));
        &mut self.entries[pos].1
    }

    /// Returns the number of groups.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no group was inserted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the table, yielding groups in insertion order.
    pub fn into_entries(self) -> Vec<(GroupKey, T)> {
        self.entries
    }
}

impl<T> Default for GroupTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
