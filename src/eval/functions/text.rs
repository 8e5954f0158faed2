//! Text functions. Lengths and positions count characters.

use super::{number_arg, scalar_arg, text_arg, try_value};
use crate::common::error::XlsResult;
use crate::common::number::parse_number;
use crate::eval::EvalContext;
use crate::eval::value::Value;
use crate::formula::ErrorCode;

/// Optional character count argument, defaulting to 1. Negative counts
/// are `#VALUE!`.
fn count_arg(args: &[Value], i: usize, ctx: &mut dyn EvalContext) -> XlsResult<Result<usize, ErrorCode>> {
    if matches!(args.get(i), None | Some(Value::Missing)) {
        return Ok(Ok(1));
    }
    Ok(number_arg(args, i, ctx)?.and_then(|n| {
        if n < 0.0 {
            Err(ErrorCode::Value)
        } else {
            Ok(n.trunc().min(u32::MAX as f64) as usize)
        }
    }))
}

pub(crate) fn len(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let text = try_value!(text_arg(args, 0, ctx)?);
    Ok(Value::Number(text.chars().count() as f64))
}

pub(crate) fn left(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let text = try_value!(text_arg(args, 0, ctx)?);
    let n = try_value!(count_arg(args, 1, ctx)?);
    Ok(Value::Text(text.chars().take(n).collect()))
}

pub(crate) fn right(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let text = try_value!(text_arg(args, 0, ctx)?);
    let n = try_value!(count_arg(args, 1, ctx)?);
    let skip = text.chars().count().saturating_sub(n);
    Ok(Value::Text(text.chars().skip(skip).collect()))
}

/// `MID(text, start, count)` with a 1-based start.
pub(crate) fn mid(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let text = try_value!(text_arg(args, 0, ctx)?);
    let start = try_value!(number_arg(args, 1, ctx)?).trunc();
    let count = try_value!(number_arg(args, 2, ctx)?).trunc();
    if start < 1.0 || count < 0.0 {
        return Ok(Value::Error(ErrorCode::Value));
    }
    let skip = (start - 1.0).min(u32::MAX as f64) as usize;
    let take = count.min(u32::MAX as f64) as usize;
    Ok(Value::Text(text.chars().skip(skip).take(take).collect()))
}

pub(crate) fn upper(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let text = try_value!(text_arg(args, 0, ctx)?);
    Ok(Value::Text(text.to_uppercase()))
}

pub(crate) fn lower(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let text = try_value!(text_arg(args, 0, ctx)?);
    Ok(Value::Text(text.to_lowercase()))
}

/// Drops leading and trailing spaces and collapses inner runs to one
/// space. Only the space character is affected.
pub(crate) fn trim(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let text = try_value!(text_arg(args, 0, ctx)?);
    let words: Vec<&str> = text.split(' ').filter(|w| !w.is_empty()).collect();
    Ok(Value::Text(words.join(" ")))
}

pub(crate) fn concatenate(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let mut out = String::new();
    for i in 0..args.len() {
        out.push_str(&try_value!(text_arg(args, i, ctx)?));
    }
    Ok(Value::Text(out))
}

/// Case-sensitive comparison.
pub(crate) fn exact(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let a = try_value!(text_arg(args, 0, ctx)?);
    let b = try_value!(text_arg(args, 1, ctx)?);
    Ok(Value::Bool(a == b))
}

pub(crate) fn value(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    Ok(match scalar_arg(args, 0, ctx)? {
        Value::Number(n) => Value::Number(n),
        Value::Blank | Value::Missing => Value::Number(0.0),
        Value::Text(s) => match parse_number(&s) {
            Some(n) => Value::Number(n),
            None => Value::Error(ErrorCode::Value),
        },
        Value::Error(e) => Value::Error(e),
        _ => Value::Error(ErrorCode::Value),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn call(f: super::super::FunctionImpl, args: &[Value]) -> Value {
        f(args, &mut Grid::default()).unwrap()
    }

    #[test]
    fn test_substrings() {
        assert_eq!(call(left, &[text("héllo")]), text("h"));
        assert_eq!(call(left, &[text("héllo"), num(2.0)]), text("hé"));
        assert_eq!(call(right, &[text("héllo"), num(3.0)]), text("llo"));
        assert_eq!(call(right, &[text("ab"), num(10.0)]), text("ab"));
        assert_eq!(call(mid, &[text("spreadsheet"), num(7.0), num(5.0)]), text("sheet"));
        assert_eq!(call(mid, &[text("abc"), num(0.0), num(1.0)]), Value::Error(ErrorCode::Value));
        assert_eq!(call(left, &[text("abc"), num(-1.0)]), Value::Error(ErrorCode::Value));
        assert_eq!(call(len, &[num(12.5)]), num(4.0));
    }

    #[test]
    fn test_case_and_spacing() {
        assert_eq!(call(upper, &[text("abc")]), text("ABC"));
        assert_eq!(call(lower, &[Value::Bool(true)]), text("true"));
        assert_eq!(call(trim, &[text("  a   b  ")]), text("a b"));
        assert_eq!(call(exact, &[text("a"), text("A")]), Value::Bool(false));
        assert_eq!(call(concatenate, &[text("a"), num(1.0), Value::Bool(false)]), text("a1FALSE"));
        assert_eq!(
            call(concatenate, &[text("a"), Value::Error(ErrorCode::Ref)]),
            Value::Error(ErrorCode::Ref)
        );
    }

    #[test]
    fn test_value() {
        assert_eq!(call(value, &[text(" 1.5e2 ")]), num(150.0));
        assert_eq!(call(value, &[text("x")]), Value::Error(ErrorCode::Value));
        assert_eq!(call(value, &[Value::Bool(true)]), Value::Error(ErrorCode::Value));
    }
}
