//! Database data types and values.
//!
//! This module defines the canonical type system and value representation
//! for the engine. [`Type`] identifies a column's data type and [`Value`]
//! represents a single typed cell value, with NULL as its own variant.
//!
//! Comparisons are defined pairwise within a type; across types only the
//! numeric pairing (INT with FLOAT) and the string/date pairing (CHARS with
//! DATE, when the string parses as a date) are comparable. Everything else
//! is incomparable, which predicate evaluation treats as "unmatched" rather
//! than as an error.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, NaiveDate};

/// Database column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    /// 32-bit signed integer.
    Int,
    /// 32-bit floating point.
    Float,
    /// Bounded string, stored inline with a fixed capacity.
    Chars,
    /// Calendar date (validated `YYYY-MM-DD`).
    Date,
    /// Unbounded string, stored out of line in the table's text arena.
    Text,
}

impl Type {
    /// Returns the SQL display name for this type.
    pub const fn display_name(self) -> &'static str {
        match self {
            Type::Int => "INT",
            Type::Float => "FLOAT",
            Type::Chars => "CHAR",
            Type::Date => "DATE",
            Type::Text => "TEXT",
        }
    }

    /// Returns true if this type stores string payloads.
    pub const fn is_string(self) -> bool {
        matches!(self, Type::Chars | Type::Text)
    }

    /// Returns true if this type is numeric.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A typed cell value.
///
/// NULL is a variant of its own rather than a flag: a NULL cell has no
/// payload and no inherent type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 32-bit signed integer (INT).
    Int(i32),
    /// 32-bit floating point (FLOAT).
    Float(f32),
    /// Bounded string (CHAR).
    Chars(String),
    /// Calendar date (DATE).
    Date(NaiveDate),
    /// Unbounded string (TEXT).
    Text(String),
}

impl Value {
    /// Returns the data type of this value, or `None` for NULL.
    pub fn ty(&self) -> Option<Type> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(Type::Int),
            Value::Float(_) => Some(Type::Float),
            Value::Chars(_) => Some(Type::Chars),
            Value::Date(_) => Some(Type::Date),
            Value::Text(_) => Some(Type::Text),
        }
    }

    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the string payload for CHARS/TEXT values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Chars(s) | Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric payload widened to f64, for INT/FLOAT values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Compares two values under the engine's coercion lattice.
    ///
    /// Returns `None` when the pair is incomparable: NULL on either side,
    /// or a type pairing outside the lattice (e.g. INT vs CHARS, or CHARS
    /// vs DATE where the string is not a valid date literal). Predicate
    /// evaluation maps `None` to "unmatched".
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,

            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Some(total_cmp_f32(*a, *b)),
            (Value::Int(a), Value::Float(b)) => Some(total_cmp_f32(*a as f32, *b)),
            (Value::Float(a), Value::Int(b)) => Some(total_cmp_f32(*a, *b as f32)),

            (Value::Chars(a), Value::Chars(b))
            | (Value::Text(a), Value::Text(b))
            | (Value::Chars(a), Value::Text(b))
            | (Value::Text(a), Value::Chars(b)) => Some(a.cmp(b)),

            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),

            // CHARS compares with DATE only when the string parses as a date.
            (Value::Chars(s), Value::Date(d)) | (Value::Text(s), Value::Date(d)) => {
                parse_date(s).map(|parsed| parsed.cmp(d))
            }
            (Value::Date(d), Value::Chars(s)) | (Value::Date(d), Value::Text(s)) => {
                parse_date(s).map(|parsed| d.cmp(&parsed))
            }

            _ => None,
        }
    }

    /// Coerces this value to the given column type, if the lattice allows.
    ///
    /// - INT widens to FLOAT; FLOAT does not narrow to INT.
    /// - CHARS narrows to DATE when the literal parses as `YYYY-MM-DD`.
    /// - CHARS and TEXT convert freely between each other.
    /// - NULL coerces to anything (nullability is checked elsewhere).
    pub fn coerce_to(&self, ty: Type) -> Option<Value> {
        if self.ty() == Some(ty) {
            return Some(self.clone());
        }
        match (self, ty) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Int(n), Type::Float) => Some(Value::Float(*n as f32)),
            (Value::Chars(s), Type::Date) | (Value::Text(s), Type::Date) => {
                parse_date(s).map(Value::Date)
            }
            (Value::Chars(s), Type::Text) => Some(Value::Text(s.clone())),
            (Value::Text(s), Type::Chars) => Some(Value::Chars(s.clone())),
            _ => None,
        }
    }

    /// Converts this value to its result-set text representation.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => format_float(*n),
            Value::Chars(s) | Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

/// Compares two f32 values, ordering NaN equal to itself and above infinity.
fn total_cmp_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => Ordering::Equal,
    })
}

/// Parses a strict `YYYY-MM-DD` date literal.
///
/// Returns `None` for anything chrono rejects (bad syntax, month 13,
/// February 30th, and so on).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Packs a date into the 4-byte on-record representation (y*10000+m*100+d).
pub fn date_to_i32(d: NaiveDate) -> i32 {
    d.year() * 10000 + d.month() as i32 * 100 + d.day() as i32
}

/// Unpacks the 4-byte on-record date representation.
pub fn date_from_i32(n: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(n / 10000, (n / 100 % 100) as u32, (n % 100) as u32)
}

/// Formats a float trimming a trailing `.0`, matching the engine's
/// result-set conventions (`3.25` prints as `3.25`, `3.0` prints as `3`).
fn format_float(n: f32) -> String {
    if n.is_infinite() || n.is_nan() {
        return n.to_string();
    }
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_type_display() {
        assert_eq!(Type::Int.to_string(), "INT");
        assert_eq!(Type::Chars.to_string(), "CHAR");
        assert_eq!(Type::Date.to_string(), "DATE");
    }

    #[test]
    fn test_value_ty() {
        assert_eq!(Value::Null.ty(), None);
        assert_eq!(Value::Int(1).ty(), Some(Type::Int));
        assert_eq!(Value::Float(1.0).ty(), Some(Type::Float));
        assert_eq!(Value::Chars("x".into()).ty(), Some(Type::Chars));
        assert_eq!(Value::Date(date("2024-01-01")).ty(), Some(Type::Date));
        assert_eq!(Value::Text("x".into()).ty(), Some(Type::Text));
    }

    #[test]
    fn test_compare_numeric_coercion() {
        assert_eq!(
            Value::Int(1).compare(&Value::Float(1.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Float(1.5).compare(&Value::Int(2)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Int(3).compare(&Value::Int(2)), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_null_incomparable() {
        assert_eq!(Value::Null.compare(&Value::Null), None);
        assert_eq!(Value::Null.compare(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).compare(&Value::Null), None);
    }

    #[test]
    fn test_compare_chars_date() {
        let d = Value::Date(date("2024-03-05"));
        assert_eq!(
            Value::Chars("2024-03-05".into()).compare(&d),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Chars("2024-03-06".into()).compare(&d),
            Some(Ordering::Greater)
        );
        // Not a date literal: incomparable, not an error.
        assert_eq!(Value::Chars("hello".into()).compare(&d), None);
    }

    #[test]
    fn test_compare_outside_lattice() {
        assert_eq!(Value::Int(1).compare(&Value::Chars("1".into())), None);
        assert_eq!(Value::Chars("1".into()).compare(&Value::Float(1.0)), None);
    }

    #[test]
    fn test_compare_strings_mixed_width() {
        assert_eq!(
            Value::Chars("abc".into()).compare(&Value::Text("abc".into())),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_coerce_int_to_float() {
        assert_eq!(Value::Int(2).coerce_to(Type::Float), Some(Value::Float(2.0)));
        assert_eq!(Value::Float(2.5).coerce_to(Type::Int), None);
    }

    #[test]
    fn test_coerce_chars_to_date() {
        assert_eq!(
            Value::Chars("2024-02-29".into()).coerce_to(Type::Date),
            Some(Value::Date(date("2024-02-29")))
        );
        // 2023 is not a leap year.
        assert_eq!(Value::Chars("2023-02-29".into()).coerce_to(Type::Date), None);
    }

    #[test]
    fn test_coerce_null_anywhere() {
        assert_eq!(Value::Null.coerce_to(Type::Date), Some(Value::Null));
    }

    #[test]
    fn test_parse_date_validation() {
        assert!(parse_date("2024-01-31").is_some());
        assert!(parse_date("2024-13-01").is_none());
        assert!(parse_date("2024-02-30").is_none());
        assert!(parse_date("not-a-date").is_none());
    }

    #[test]
    fn test_date_i32_roundtrip() {
        let d = date("2024-12-31");
        assert_eq!(date_from_i32(date_to_i32(d)), Some(d));
        assert_eq!(date_to_i32(d), 20241231);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Null.to_text(), "NULL");
        assert_eq!(Value::Int(42).to_text(), "42");
        assert_eq!(Value::Float(3.0).to_text(), "3");
        assert_eq!(Value::Float(3.25).to_text(), "3.25");
        assert_eq!(Value::Date(date("2024-01-02")).to_text(), "2024-01-02");
        assert_eq!(Value::Chars("hi".into()).to_text(), "hi");
    }

    #[test]
    fn test_equality_reflexive_for_non_null() {
        for v in [
            Value::Int(7),
            Value::Float(1.25),
            Value::Chars("x".into()),
            Value::Date(date("2020-05-05")),
            Value::Text("long".into()),
        ] {
            assert_eq!(v.compare(&v), Some(Ordering::Equal));
        }
    }
}
