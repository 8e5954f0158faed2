use super::{flatten_args, scalar_arg, try_value};
use crate::common::error::XlsResult;
use crate::eval::EvalContext;
use crate::eval::coerce::{parse_bool, to_bool, to_number};
use crate::eval::value::Value;
use crate::formula::ErrorCode;

/// IF with all arguments already evaluated. The chosen branch is returned
/// as is so that `IF(c, A1:A3, B1:B3)` can still yield a reference.
/// Formulas that carry tAttrIf never reach this: the interpreter skips the
/// branch not taken instead.
pub(crate) fn if_fn(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let condition = try_value!(to_bool(&scalar_arg(args, 0, ctx)?));
    let branch = if condition { args.get(1) } else { args.get(2) };
    Ok(match branch {
        Some(Value::Missing) => Value::Number(0.0),
        Some(value) => value.clone(),
        None => Value::Bool(false),
    })
}

/// Booleans seen by AND/OR. Text inside references is ignored; text passed
/// directly must spell a boolean.
fn collect_bools(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Result<Vec<bool>, ErrorCode>> {
    let mut out = Vec::new();
    for arg in flatten_args(args, ctx)? {
        match arg.value {
            Value::Bool(b) => out.push(b),
            Value::Number(n) => out.push(n != 0.0),
            Value::Error(e) => return Ok(Err(e)),
            Value::Text(s) if !arg.from_reference => match parse_bool(&s) {
                Some(b) => out.push(b),
                None => return Ok(Err(ErrorCode::Value)),
            },
            _ => {},
        }
    }
    Ok(Ok(out))
}

pub(crate) fn and(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let values = try_value!(collect_bools(args, ctx)?);
    if values.is_empty() {
        return Ok(Value::Error(ErrorCode::Value));
    }
    Ok(Value::Bool(values.iter().all(|b| *b)))
}

pub(crate) fn or(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let values = try_value!(collect_bools(args, ctx)?);
    if values.is_empty() {
        return Ok(Value::Error(ErrorCode::Value));
    }
    Ok(Value::Bool(values.iter().any(|b| *b)))
}

pub(crate) fn not(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let value = try_value!(to_bool(&scalar_arg(args, 0, ctx)?));
    Ok(Value::Bool(!value))
}

pub(crate) fn true_fn(_args: &[Value], _ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    Ok(Value::Bool(true))
}

pub(crate) fn false_fn(_args: &[Value], _ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    Ok(Value::Bool(false))
}

/// `CHOOSE(index, v1, v2, ...)`; the index is truncated and must name one
/// of the values.
pub(crate) fn choose(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let index = try_value!(to_number(&scalar_arg(args, 0, ctx)?)).trunc();
    if index < 1.0 || index >= args.len() as f64 {
        return Ok(Value::Error(ErrorCode::Value));
    }
    Ok(match &args[index as usize] {
        Value::Missing => Value::Blank,
        value => value.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_if_branches() {
        let mut grid = Grid::default();
        assert_eq!(if_fn(&[Value::Bool(true), num(1.0), num(2.0)], &mut grid).unwrap(), num(1.0));
        assert_eq!(if_fn(&[num(0.0), num(1.0), num(2.0)], &mut grid).unwrap(), num(2.0));
        assert_eq!(if_fn(&[num(0.0), num(1.0)], &mut grid).unwrap(), Value::Bool(false));
        assert_eq!(
            if_fn(&[text("maybe"), num(1.0)], &mut grid).unwrap(),
            Value::Error(ErrorCode::Value)
        );
        let reference = area(0, 0, 2, 0);
        assert_eq!(if_fn(&[Value::Bool(true), reference.clone()], &mut grid).unwrap(), reference);
    }

    #[test]
    fn test_and_or() {
        let mut grid = Grid::with(&[((0, 0), Value::Bool(true)), ((1, 0), text("x")), ((2, 0), num(0.0))]);
        assert_eq!(and(&[area(0, 0, 1, 0)], &mut grid).unwrap(), Value::Bool(true));
        assert_eq!(and(&[area(0, 0, 2, 0)], &mut grid).unwrap(), Value::Bool(false));
        assert_eq!(or(&[area(0, 0, 2, 0)], &mut grid).unwrap(), Value::Bool(true));
        assert_eq!(or(&[text("x")], &mut grid).unwrap(), Value::Error(ErrorCode::Value));
        assert_eq!(and(&[area(5, 0, 6, 0)], &mut grid).unwrap(), Value::Error(ErrorCode::Value));
        assert_eq!(
            or(&[Value::Bool(true), Value::Error(ErrorCode::Na)], &mut grid).unwrap(),
            Value::Error(ErrorCode::Na)
        );
        assert_eq!(not(&[num(2.0)], &mut grid).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_choose() {
        let mut grid = Grid::default();
        let args = [num(2.9), text("a"), text("b"), text("c")];
        assert_eq!(choose(&args, &mut grid).unwrap(), text("b"));
        assert_eq!(choose(&[num(4.0), text("a")], &mut grid).unwrap(), Value::Error(ErrorCode::Value));
        assert_eq!(choose(&[num(0.0), text("a")], &mut grid).unwrap(), Value::Error(ErrorCode::Value));
    }
}
