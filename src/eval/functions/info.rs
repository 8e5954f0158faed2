use super::scalar_arg;
use crate::common::error::XlsResult;
use crate::eval::EvalContext;
use crate::eval::value::Value;
use crate::formula::ErrorCode;

fn test_value(args: &[Value], ctx: &mut dyn EvalContext, test: fn(&Value) -> bool) -> XlsResult<Value> {
    let value = scalar_arg(args, 0, ctx)?;
    Ok(Value::Bool(test(&value)))
}

pub(crate) fn isblank(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    test_value(args, ctx, |v| matches!(v, Value::Blank))
}

pub(crate) fn isnumber(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    test_value(args, ctx, |v| matches!(v, Value::Number(_)))
}

pub(crate) fn istext(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    test_value(args, ctx, |v| matches!(v, Value::Text(_)))
}

pub(crate) fn isnontext(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    test_value(args, ctx, |v| !matches!(v, Value::Text(_)))
}

pub(crate) fn iserror(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    test_value(args, ctx, |v| matches!(v, Value::Error(_)))
}

/// Any error except `#N/A`.
pub(crate) fn iserr(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    test_value(args, ctx, |v| matches!(v, Value::Error(e) if *e != ErrorCode::Na))
}

pub(crate) fn isna(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    test_value(args, ctx, |v| matches!(v, Value::Error(ErrorCode::Na)))
}

pub(crate) fn islogical(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    test_value(args, ctx, |v| matches!(v, Value::Bool(_)))
}

pub(crate) fn na(_args: &[Value], _ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    Ok(Value::Error(ErrorCode::Na))
}

/// 1-based row of the reference, or of the formula cell when omitted.
pub(crate) fn row(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let row = match args.first() {
        None | Some(Value::Missing) => ctx.position().0,
        Some(arg) => match arg.as_area() {
            Some(area) => area.first_row,
            None => return Ok(Value::Error(ErrorCode::Value)),
        },
    };
    Ok(Value::Number(f64::from(row) + 1.0))
}

pub(crate) fn column(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let col = match args.first() {
        None | Some(Value::Missing) => ctx.position().1,
        Some(arg) => match arg.as_area() {
            Some(area) => area.first_col,
            None => return Ok(Value::Error(ErrorCode::Value)),
        },
    };
    Ok(Value::Number(f64::from(col) + 1.0))
}

pub(crate) fn rows(args: &[Value], _ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    Ok(match &args[0] {
        Value::Array(array) => Value::Number(array.rows as f64),
        arg => match arg.as_area() {
            Some(area) => Value::Number(f64::from(area.rows())),
            None => Value::Number(1.0),
        },
    })
}

pub(crate) fn columns(args: &[Value], _ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    Ok(match &args[0] {
        Value::Array(array) => Value::Number(array.cols as f64),
        arg => match arg.as_area() {
            Some(area) => Value::Number(f64::from(area.cols())),
            None => Value::Number(1.0),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_type_predicates_read_references() {
        let mut grid = Grid::with(&[
            ((0, 0), num(1.0)),
            ((1, 0), text("")),
            ((2, 0), Value::Error(ErrorCode::Na)),
            ((3, 0), Value::Error(ErrorCode::Div0)),
        ]);
        let a = |row| Value::Ref { sheet: 0, row, col: 0 };
        assert_eq!(isnumber(&[a(0)], &mut grid).unwrap(), Value::Bool(true));
        assert_eq!(isblank(&[a(1)], &mut grid).unwrap(), Value::Bool(false));
        assert_eq!(isblank(&[a(7)], &mut grid).unwrap(), Value::Bool(true));
        assert_eq!(istext(&[a(1)], &mut grid).unwrap(), Value::Bool(true));
        assert_eq!(isna(&[a(2)], &mut grid).unwrap(), Value::Bool(true));
        assert_eq!(iserr(&[a(2)], &mut grid).unwrap(), Value::Bool(false));
        assert_eq!(iserr(&[a(3)], &mut grid).unwrap(), Value::Bool(true));
        assert_eq!(iserror(&[a(3)], &mut grid).unwrap(), Value::Bool(true));
        assert_eq!(islogical(&[Value::Bool(false)], &mut grid).unwrap(), Value::Bool(true));
        assert_eq!(isnontext(&[a(7)], &mut grid).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_position_functions() {
        let mut grid = Grid::default();
        grid.position = (4, 2);
        assert_eq!(row(&[], &mut grid).unwrap(), num(5.0));
        assert_eq!(column(&[], &mut grid).unwrap(), num(3.0));
        assert_eq!(row(&[area(9, 1, 12, 3)], &mut grid).unwrap(), num(10.0));
        assert_eq!(rows(&[area(9, 1, 12, 3)], &mut grid).unwrap(), num(4.0));
        assert_eq!(columns(&[area(9, 1, 12, 3)], &mut grid).unwrap(), num(3.0));
        assert_eq!(row(&[num(1.0)], &mut grid).unwrap(), Value::Error(ErrorCode::Value));
    }
}
