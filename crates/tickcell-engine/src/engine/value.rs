//! Host-facing cell values.
//!
//! Everything the host displays or spills goes through [`Value`]; the untyped
//! Rhai [`Dynamic`] never leaks past the marshalling boundary.

use rhai::{Array, Dynamic};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Spreadsheet error values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    Null,
    Div0,
    Value,
    Ref,
    Name,
    Num,
    NA,
    Spill,
    Calc,
}

impl ErrorCode {
    pub fn as_code(self) -> &'static str {
        match self {
            ErrorCode::Null => "#NULL!",
            ErrorCode::Div0 => "#DIV/0!",
            ErrorCode::Value => "#VALUE!",
            ErrorCode::Ref => "#REF!",
            ErrorCode::Name => "#NAME?",
            ErrorCode::Num => "#NUM!",
            ErrorCode::NA => "#N/A",
            ErrorCode::Spill => "#SPILL!",
            ErrorCode::Calc => "#CALC!",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// A value the host can display, or spill when it is an [`Value::Array`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Empty,
    Text(String),
    Number(f64),
    Boolean(bool),
    Error(ErrorCode),
    /// Row-major, rectangular.
    Array(Vec<Vec<Value>>),
}

impl Value {
    /// What the host shows for "nothing": it cannot spill zero rows.
    pub fn empty_sentinel() -> Value {
        Value::Text(String::new())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Interpret literal cell text the way a user typing it would expect.
    /// - Empty or whitespace -> Empty
    /// - TRUE/FALSE (any case) -> Boolean
    /// - Valid number (no leading zeros like "007") -> Number
    /// - Otherwise -> Text
    pub fn from_literal(text: &str) -> Value {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Value::Empty;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Value::Boolean(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Value::Boolean(false);
        }
        if trimmed.starts_with('0')
            && trimmed.len() > 1
            && trimmed.chars().nth(1).is_some_and(|c| c.is_ascii_digit())
        {
            return Value::Text(text.to_string());
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(text.to_string()),
        }
    }

    /// Convert to a Rhai value for use inside a script.
    pub fn to_dynamic(&self) -> Dynamic {
        match self {
            Value::Empty => Dynamic::UNIT,
            Value::Text(s) => Dynamic::from(s.clone()),
            Value::Number(n) => Dynamic::from_float(*n),
            Value::Boolean(b) => Dynamic::from_bool(*b),
            Value::Error(code) => Dynamic::from(code.as_code().to_string()),
            Value::Array(rows) => {
                let rows: Array = rows
                    .iter()
                    .map(|row| Dynamic::from_array(row.iter().map(Value::to_dynamic).collect()))
                    .collect();
                Dynamic::from_array(rows)
            }
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            Value::Error(code) => write!(f, "{code}"),
            Value::Array(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    for (j, cell) in row.iter().enumerate() {
                        if j > 0 {
                            f.write_str("\t")?;
                        }
                        write!(f, "{cell}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Format a number for display.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "#NAN!".to_string()
    } else if n.is_infinite() {
        "#INF!".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e10 {
        format!("{:.0}", n)
    } else {
        let s = format!("{:.6}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
