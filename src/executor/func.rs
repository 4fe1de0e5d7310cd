//! Scalar functions: LENGTH, ROUND, DATE_FORMAT.
//!
//! Argument types are strict: LENGTH takes a string, ROUND a float (with
//! an optional integer digit count), DATE_FORMAT a date and a format
//! string. A wrong argument type is a statement error, not a NULL.

use chrono::{Datelike, NaiveDate};

use crate::datum::{Type, Value};

use super::error::ExecutorError;

/// Supported scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarFunc {
    /// LENGTH(str) - byte length of a string.
    Length,
    /// ROUND(x) / ROUND(x, n) - half-away-from-zero rounding.
    Round,
    /// DATE_FORMAT(date, fmt) - render a date through format tokens.
    DateFormat,
}

impl ScalarFunc {
    /// Resolves a function name (case-insensitive) to a scalar function.
    ///
    /// Returns `None` for unknown names (the planner then checks the
    /// aggregate namespace before rejecting).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "length" => Some(ScalarFunc::Length),
            "round" => Some(ScalarFunc::Round),
            "date_format" => Some(ScalarFunc::DateFormat),
            _ => None,
        }
    }

    /// Returns the SQL display name.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunc::Length => "LENGTH",
            ScalarFunc::Round => "ROUND",
            ScalarFunc::DateFormat => "DATE_FORMAT",
        }
    }

    /// Checks the argument count at bind time.
    pub fn check_arity(&self, n: usize) -> Result<(), ExecutorError> {
        let ok = match self {
            ScalarFunc::Length => n == 1,
            ScalarFunc::Round => n == 1 || n == 2,
            ScalarFunc::DateFormat => n == 2,
        };
        if ok {
            Ok(())
        } else {
            Err(ExecutorError::FunctionArgument {
                func: self.name().to_string(),
                detail: format!("wrong number of arguments ({})", n),
            })
        }
    }

    /// Returns the output type, given the evaluated argument count.
    pub fn output_type(&self, args: usize) -> Type {
        match self {
            ScalarFunc::Length => Type::Int,
            // One-arg ROUND returns INT, two-arg keeps FLOAT.
            ScalarFunc::Round => {
                if args == 1 {
                    Type::Int
                } else {
                    Type::Float
                }
            }
            ScalarFunc::DateFormat => Type::Chars,
        }
    }

    /// Evaluates the function over already-computed argument values.
    ///
    /// A NULL argument yields NULL; a wrongly-typed argument is an error.
    pub fn eval(&self, args: &[Value]) -> Result<Value, ExecutorError> {
        self.check_arity(args.len())?;
        if args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }

        match self {
            ScalarFunc::Length => match &args[0] {
                Value::Chars(s) | Value::Text(s) => Ok(Value::Int(s.len() as i32)),
                other => Err(self.bad_argument(other)),
            },
            ScalarFunc::Round => {
                let x = match &args[0] {
                    Value::Float(x) => *x,
                    other => return Err(self.bad_argument(other)),
                };
                if args.len() == 1 {
                    return Ok(Value::Int(round_half_away(x) as i32));
                }
                let digits = match &args[1] {
                    Value::Int(n) => *n,
                    other => return Err(self.bad_argument(other)),
                };
                let scale = 10f32.powi(digits);
                Ok(Value::Float(round_half_away(x * scale) / scale))
            }
            ScalarFunc::DateFormat => {
                let date = match &args[0] {
                    Value::Date(d) => *d,
                    other => return Err(self.bad_argument(other)),
                };
                let format = match &args[1] {
                    Value::Chars(s) | Value::Text(s) => s,
                    other => return Err(self.bad_argument(other)),
                };
                Ok(Value::Chars(format_date(date, format)))
            }
        }
    }

    fn bad_argument(&self, value: &Value) -> ExecutorError {
        ExecutorError::FunctionArgument {
            func: self.name().to_string(),
            detail: format!(
                "argument of type {} is not accepted",
                value
                    .ty()
                    .map(|t| t.display_name())
                    .unwrap_or("NULL")
            ),
        }
    }
}

/// Rounds half away from zero (2.5 -> 3, -2.5 -> -3).
fn round_half_away(x: f32) -> f32 {
    if x >= 0.0 {
        (x + 0.5).floor()
    } else {
        (x - 0.5).ceil()
    }
}

/// Renders a date through `%`-tokens: `%Y` year, `%m` zero-padded month,
/// `%d` zero-padded day, `%M` long month name, `%D` ordinal day. Unknown
/// tokens keep the literal character after `%`; everything else copies
/// through.
fn format_date(date: NaiveDate, format: &str) -> String {
    const MONTHS: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];

    let mut out = String::new();
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(&date.year().to_string()),
            Some('m') => out.push_str(&format!("{:02}", date.month())),
            Some('d') => out.push_str(&format!("{:02}", date.day())),
            Some('M') => out.push_str(MONTHS[date.month0() as usize]),
            Some('D') => out.push_str(&ordinal_day(date.day())),
            Some(other) => out.push(other),
            None => out.push('%'),
        }
    }
    out
}

fn ordinal_day(day: u32) -> String {
    let suffix = match day {
        11..=13 => "th",
        _ => match day % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    };
    format!("{}{}", day, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::parse_date;

    #[test]
    fn test_from_name() {
        assert_eq!(ScalarFunc::from_name("LENGTH"), Some(ScalarFunc::Length));
        assert_eq!(ScalarFunc::from_name("round"), Some(ScalarFunc::Round));
        assert_eq!(
            ScalarFunc::from_name("Date_Format"),
            Some(ScalarFunc::DateFormat)
        );
        assert_eq!(ScalarFunc::from_name("count"), None);
    }

    #[test]
    fn test_length() {
        assert_eq!(
            ScalarFunc::Length.eval(&[Value::Chars("abc".into())]).unwrap(),
            Value::Int(3)
        );
        assert!(ScalarFunc::Length.eval(&[Value::Int(1)]).is_err());
        assert_eq!(
            ScalarFunc::Length.eval(&[Value::Null]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_round_one_arg() {
        assert_eq!(
            ScalarFunc::Round.eval(&[Value::Float(3.5)]).unwrap(),
            Value::Int(4)
        );
        assert_eq!(
            ScalarFunc::Round.eval(&[Value::Float(-3.5)]).unwrap(),
            Value::Int(-4)
        );
        assert_eq!(
            ScalarFunc::Round.eval(&[Value::Float(3.4)]).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn test_round_two_args() {
        assert_eq!(
            ScalarFunc::Round
                .eval(&[Value::Float(3.14159), Value::Int(2)])
                .unwrap(),
            Value::Float(3.14)
        );
        // Second argument must be INT
        assert!(ScalarFunc::Round
            .eval(&[Value::Float(1.0), Value::Float(2.0)])
            .is_err());
        // First argument must be FLOAT
        assert!(ScalarFunc::Round.eval(&[Value::Int(3)]).is_err());
    }

    #[test]
    fn test_date_format_tokens() {
        let d = Value::Date(parse_date("2024-03-01").unwrap());
        let fmt = |f: &str| {
            ScalarFunc::DateFormat
                .eval(&[d.clone(), Value::Chars(f.into())])
                .unwrap()
        };
        assert_eq!(fmt("%Y-%m-%d"), Value::Chars("2024-03-01".into()));
        assert_eq!(fmt("%M %D, %Y"), Value::Chars("March 1st, 2024".into()));
        assert_eq!(fmt("100%% sure"), Value::Chars("100% sure".into()));
    }

    #[test]
    fn test_date_format_type_errors() {
        assert!(ScalarFunc::DateFormat
            .eval(&[Value::Chars("2024-01-01".into()), Value::Chars("%Y".into())])
            .is_err());
    }

    #[test]
    fn test_ordinal_days() {
        assert_eq!(ordinal_day(1), "1st");
        assert_eq!(ordinal_day(2), "2nd");
        assert_eq!(ordinal_day(3), "3rd");
        assert_eq!(ordinal_day(4), "4th");
        assert_eq!(ordinal_day(11), "11th");
        assert_eq!(ordinal_day(12), "12th");
        assert_eq!(ordinal_day(13), "13th");
        assert_eq!(ordinal_day(21), "21st");
        assert_eq!(ordinal_day(22), "22nd");
    }

    #[test]
    fn test_arity_checks() {
        assert!(ScalarFunc::Length.check_arity(1).is_ok());
        assert!(ScalarFunc::Length.check_arity(2).is_err());
        assert!(ScalarFunc::Round.check_arity(2).is_ok());
        assert!(ScalarFunc::Round.check_arity(3).is_err());
        assert!(ScalarFunc::DateFormat.check_arity(1).is_err());
    }
}
