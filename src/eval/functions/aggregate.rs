//! SUM, COUNT and friends.
//!
//! Numbers passed directly are coerced (`SUM("2", TRUE)` is 3) while
//! values read from references or arrays only count when they already are
//! numbers. Errors propagate from either source.

use super::{ArgValue, flatten_args, try_value};
use crate::common::error::XlsResult;
use crate::common::number::parse_number;
use crate::eval::EvalContext;
use crate::eval::operators::number_result;
use crate::eval::value::Value;
use crate::formula::ErrorCode;

fn collect_numbers(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Result<Vec<f64>, ErrorCode>> {
    let mut numbers = Vec::new();
    for ArgValue {
        value,
        from_reference,
    } in flatten_args(args, ctx)?
    {
        match value {
            Value::Number(n) => numbers.push(n),
            Value::Error(e) => return Ok(Err(e)),
            _ if from_reference => {},
            Value::Bool(b) => numbers.push(if b { 1.0 } else { 0.0 }),
            Value::Text(s) => match parse_number(&s) {
                Some(n) => numbers.push(n),
                None => return Ok(Err(ErrorCode::Value)),
            },
            _ => {},
        }
    }
    Ok(Ok(numbers))
}

pub(crate) fn sum(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let numbers = try_value!(collect_numbers(args, ctx)?);
    Ok(number_result(numbers.iter().sum()))
}

pub(crate) fn product(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let numbers = try_value!(collect_numbers(args, ctx)?);
    if numbers.is_empty() {
        return Ok(Value::Number(0.0));
    }
    Ok(number_result(numbers.iter().product()))
}

pub(crate) fn average(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let numbers = try_value!(collect_numbers(args, ctx)?);
    if numbers.is_empty() {
        return Ok(Value::Error(ErrorCode::Div0));
    }
    let total: f64 = numbers.iter().sum();
    Ok(number_result(total / numbers.len() as f64))
}

pub(crate) fn min(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let numbers = try_value!(collect_numbers(args, ctx)?);
    Ok(Value::Number(numbers.into_iter().reduce(f64::min).unwrap_or(0.0)))
}

pub(crate) fn max(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let numbers = try_value!(collect_numbers(args, ctx)?);
    Ok(Value::Number(numbers.into_iter().reduce(f64::max).unwrap_or(0.0)))
}

/// Counts numbers. Directly passed booleans and numeric text count too;
/// errors are skipped rather than propagated.
pub(crate) fn count(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let mut n = 0u32;
    for arg in flatten_args(args, ctx)? {
        let counted = match &arg.value {
            Value::Number(_) => true,
            _ if arg.from_reference => false,
            Value::Bool(_) => true,
            Value::Text(s) => parse_number(s).is_some(),
            _ => false,
        };
        if counted {
            n += 1;
        }
    }
    Ok(Value::Number(f64::from(n)))
}

/// Counts non-blank values, errors and empty strings included.
pub(crate) fn counta(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let n = flatten_args(args, ctx)?
        .iter()
        .filter(|arg| !matches!(arg.value, Value::Blank | Value::Missing))
        .count();
    Ok(Value::Number(n as f64))
}

/// Cells in the range that are blank or hold an empty string.
pub(crate) fn countblank(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let Some(area) = args[0].as_area() else {
        return Ok(Value::Error(ErrorCode::Value));
    };
    let mut filled = 0u64;
    for (row, col) in ctx.existing_cells(&area) {
        match ctx.cell_value(area.sheet, row, col)? {
            Value::Blank => {},
            Value::Text(s) if s.is_empty() => {},
            _ => filled += 1,
        }
    }
    Ok(Value::Number((area.cell_count() - filled) as f64))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn sample() -> Grid {
        // A1:A5 = 3, 5, TRUE, "7", #N/A ; B1:B2 = 2, ""
        Grid::with(&[
            ((0, 0), num(3.0)),
            ((1, 0), num(5.0)),
            ((2, 0), Value::Bool(true)),
            ((3, 0), text("7")),
            ((0, 1), num(2.0)),
            ((1, 1), text("")),
            ((9, 0), Value::Error(ErrorCode::Na)),
        ])
    }

    #[test]
    fn test_sum_ignores_non_numbers_in_references() {
        let mut grid = sample();
        assert_eq!(sum(&[area(0, 0, 3, 0)], &mut grid).unwrap(), num(8.0));
        assert_eq!(
            sum(&[area(0, 0, 3, 0), text("2"), Value::Bool(true)], &mut grid).unwrap(),
            num(11.0)
        );
        assert_eq!(sum(&[text("x")], &mut grid).unwrap(), Value::Error(ErrorCode::Value));
        assert_eq!(sum(&[area(0, 0, 9, 0)], &mut grid).unwrap(), Value::Error(ErrorCode::Na));
    }

    #[test]
    fn test_average_min_max() {
        let mut grid = sample();
        assert_eq!(average(&[area(0, 0, 1, 1)], &mut grid).unwrap(), num(10.0 / 3.0));
        assert_eq!(average(&[area(20, 0, 21, 0)], &mut grid).unwrap(), Value::Error(ErrorCode::Div0));
        assert_eq!(min(&[area(0, 0, 1, 1)], &mut grid).unwrap(), num(2.0));
        assert_eq!(max(&[area(0, 0, 1, 1), num(-1.0)], &mut grid).unwrap(), num(5.0));
        assert_eq!(max(&[area(20, 0, 21, 0)], &mut grid).unwrap(), num(0.0));
        assert_eq!(product(&[area(0, 0, 1, 0), num(2.0)], &mut grid).unwrap(), num(30.0));
    }

    #[test]
    fn test_counts() {
        let mut grid = sample();
        assert_eq!(count(&[area(0, 0, 9, 0)], &mut grid).unwrap(), num(2.0));
        assert_eq!(count(&[text("4"), Value::Bool(false), text("x")], &mut grid).unwrap(), num(2.0));
        assert_eq!(counta(&[area(0, 0, 9, 1)], &mut grid).unwrap(), num(7.0));
        // 20 cells, 5 filled (the empty string counts as blank)
        assert_eq!(countblank(&[area(0, 0, 9, 1)], &mut grid).unwrap(), num(14.0));
        assert_eq!(countblank(&[num(1.0)], &mut grid).unwrap(), Value::Error(ErrorCode::Value));
    }
}
