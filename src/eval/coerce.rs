//! Operand resolution and type coercion.
//!
//! Relational ordering between different types:
//!
//! ```text
//! TRUE > FALSE, and any boolean > any string > any number
//! strings compare in dictionary order, ignoring case
//! blank == 0 == FALSE == "" when compared against those types
//! ```
//!
//! Strings are never converted to numbers or booleans for comparison.
//! Arithmetic, on the other hand, accepts text that reads as a number.

use super::EvalContext;
use super::value::Value;
use crate::common::error::XlsResult;
use crate::common::number::{number_to_text, parse_number};
use crate::formula::ErrorCode;
use std::cmp::Ordering;

/// Reduce an operand to a scalar. References are read (a multi-cell area
/// is intersected with the row or column of the formula cell), arrays give
/// their first element and a missing argument becomes blank.
pub(crate) fn single_value(value: Value, ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    match value {
        Value::Ref { sheet, row, col } => ctx.cell_value(sheet, row, col),
        Value::Area(area) => {
            let (row, col) = ctx.position();
            if area.first_row == area.last_row && area.first_col == area.last_col {
                return ctx.cell_value(area.sheet, area.first_row, area.first_col);
            }
            if area.first_col == area.last_col && (area.first_row..=area.last_row).contains(&row) {
                return ctx.cell_value(area.sheet, row, area.first_col);
            }
            if area.first_row == area.last_row && (area.first_col..=area.last_col).contains(&col) {
                return ctx.cell_value(area.sheet, area.first_row, col);
            }
            Ok(Value::Error(ErrorCode::Value))
        },
        Value::Array(array) => Ok(array.first()),
        Value::Missing => Ok(Value::Blank),
        scalar => Ok(scalar),
    }
}

/// Number for arithmetic. Blank is 0, booleans are 1/0, numeric text is
/// parsed and any other text is `#VALUE!`.
pub(crate) fn to_number(value: &Value) -> Result<f64, ErrorCode> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Blank | Value::Missing => Ok(0.0),
        Value::Text(s) => parse_number(s).ok_or(ErrorCode::Value),
        Value::Error(e) => Err(*e),
        Value::Ref { .. } | Value::Area(_) | Value::Array(_) => Err(ErrorCode::Value),
    }
}

pub(crate) fn to_text(value: &Value) -> Result<String, ErrorCode> {
    match value {
        Value::Number(n) => Ok(number_to_text(*n)),
        Value::Text(s) => Ok(s.clone()),
        Value::Bool(true) => Ok("TRUE".to_string()),
        Value::Bool(false) => Ok("FALSE".to_string()),
        Value::Blank | Value::Missing => Ok(String::new()),
        Value::Error(e) => Err(*e),
        Value::Ref { .. } | Value::Area(_) | Value::Array(_) => Err(ErrorCode::Value),
    }
}

/// Condition of IF/AND/OR/NOT. Text is accepted only when it spells a
/// boolean.
pub(crate) fn to_bool(value: &Value) -> Result<bool, ErrorCode> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(*n != 0.0),
        Value::Blank | Value::Missing => Ok(false),
        Value::Text(s) => parse_bool(s).ok_or(ErrorCode::Value),
        Value::Error(e) => Err(*e),
        Value::Ref { .. } | Value::Area(_) | Value::Array(_) => Err(ErrorCode::Value),
    }
}

pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("TRUE") {
        Some(true)
    } else if text.eq_ignore_ascii_case("FALSE") {
        Some(false)
    } else {
        None
    }
}

/// Ordering used by the relational operators. Both values must be
/// non-error scalars.
pub(crate) fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Blank, _) => compare_blank(b),
        (_, Value::Blank) => compare_blank(a).reverse(),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Bool(_), _) => Ordering::Greater,
        (_, Value::Bool(_)) => Ordering::Less,
        (Value::Text(x), Value::Text(y)) => compare_text(x, y),
        (Value::Text(_), _) => Ordering::Greater,
        (_, Value::Text(_)) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// How blank orders against `other`.
fn compare_blank(other: &Value) -> Ordering {
    match other {
        Value::Bool(true) => Ordering::Less,
        Value::Number(n) => 0.0f64.partial_cmp(n).unwrap_or(Ordering::Equal),
        Value::Text(s) if !s.is_empty() => Ordering::Less,
        _ => Ordering::Equal,
    }
}

pub(crate) fn compare_text(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_uppercase)
        .cmp(b.chars().flat_map(char::to_uppercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_cross_type_ordering() {
        assert_eq!(compare(&Value::Bool(true), &Value::Number(5.0)), Ordering::Greater);
        assert_eq!(compare(&Value::Bool(false), &text("zzz")), Ordering::Greater);
        assert_eq!(compare(&text("abc"), &Value::Number(999.0)), Ordering::Greater);
        assert_eq!(compare(&Value::Number(1e300), &text("")), Ordering::Less);
        assert_eq!(compare(&Value::Bool(true), &Value::Bool(false)), Ordering::Greater);
    }

    #[test]
    fn test_blank_ordering() {
        assert_eq!(compare(&Value::Blank, &Value::Number(0.0)), Ordering::Equal);
        assert_eq!(compare(&Value::Blank, &Value::Number(-0.0)), Ordering::Equal);
        assert_eq!(compare(&Value::Blank, &Value::Number(3.0)), Ordering::Less);
        assert_eq!(compare(&Value::Blank, &Value::Number(-3.0)), Ordering::Greater);
        assert_eq!(compare(&Value::Blank, &text("")), Ordering::Equal);
        assert_eq!(compare(&text("a"), &Value::Blank), Ordering::Greater);
        assert_eq!(compare(&Value::Bool(false), &Value::Blank), Ordering::Equal);
        assert_eq!(compare(&Value::Bool(true), &Value::Blank), Ordering::Greater);
    }

    #[test]
    fn test_text_is_case_insensitive() {
        assert_eq!(compare(&text("abc"), &text("ABC")), Ordering::Equal);
        assert_eq!(compare(&text("apple"), &text("Banana")), Ordering::Less);
    }

    #[test]
    fn test_arithmetic_coercion() {
        assert_eq!(to_number(&text(" 2.5 ")), Ok(2.5));
        assert_eq!(to_number(&text("two")), Err(ErrorCode::Value));
        assert_eq!(to_number(&Value::Bool(true)), Ok(1.0));
        assert_eq!(to_number(&Value::Blank), Ok(0.0));
        assert_eq!(to_number(&Value::Error(ErrorCode::Na)), Err(ErrorCode::Na));
        assert_eq!(to_text(&Value::Number(3.0)), Ok("3".to_string()));
        assert_eq!(to_bool(&text("true")), Ok(true));
        assert_eq!(to_bool(&text("yes")), Err(ErrorCode::Value));
    }
}
