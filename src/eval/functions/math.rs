use super::{number_arg, try_value};
use crate::common::error::XlsResult;
use crate::common::number::parse_number;
use crate::eval::EvalContext;
use crate::eval::operators::{BinaryOp, eval_binary, number_result};
use crate::eval::value::Value;
use crate::formula::ErrorCode;
use std::f64::consts::PI;

fn unary(args: &[Value], ctx: &mut dyn EvalContext, f: fn(f64) -> f64) -> XlsResult<Value> {
    let n = try_value!(number_arg(args, 0, ctx)?);
    Ok(number_result(f(n)))
}

pub(crate) fn abs(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    unary(args, ctx, f64::abs)
}

/// Rounds down, towards negative infinity.
pub(crate) fn int(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    unary(args, ctx, f64::floor)
}

pub(crate) fn sign(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    unary(args, ctx, |n| if n == 0.0 { 0.0 } else { n.signum() })
}

pub(crate) fn sqrt(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    unary(args, ctx, f64::sqrt)
}

pub(crate) fn pi(_args: &[Value], _ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    Ok(Value::Number(PI))
}

pub(crate) fn power(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let base = try_value!(number_arg(args, 0, ctx)?);
    let exponent = try_value!(number_arg(args, 1, ctx)?);
    Ok(eval_binary(BinaryOp::Power, &Value::Number(base), &Value::Number(exponent)))
}

/// Remainder with the sign of the divisor.
pub(crate) fn modulo(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let n = try_value!(number_arg(args, 0, ctx)?);
    let d = try_value!(number_arg(args, 1, ctx)?);
    if d == 0.0 {
        return Ok(Value::Error(ErrorCode::Div0));
    }
    Ok(number_result(n - d * (n / d).floor()))
}

#[derive(Clone, Copy)]
enum Rounding {
    HalfAwayFromZero,
    AwayFromZero,
    TowardZero,
}

fn round_to(n: f64, digits: f64, mode: Rounding) -> f64 {
    let digits = digits.trunc().clamp(-308.0, 308.0) as i32;
    let scale = 10f64.powi(digits.abs());
    let scaled = if digits >= 0 { n * scale } else { n / scale };
    // 2.675 * 100 is 267.49999999999997; cut to 15 significant digits first.
    let scaled = parse_number(&format!("{:.14e}", scaled)).unwrap_or(scaled);
    let rounded = match mode {
        Rounding::HalfAwayFromZero => scaled.round(),
        Rounding::AwayFromZero => scaled.signum() * scaled.abs().ceil(),
        Rounding::TowardZero => scaled.trunc(),
    };
    if digits >= 0 { rounded / scale } else { rounded * scale }
}

fn round_with(args: &[Value], ctx: &mut dyn EvalContext, mode: Rounding) -> XlsResult<Value> {
    let n = try_value!(number_arg(args, 0, ctx)?);
    let digits = try_value!(number_arg(args, 1, ctx)?);
    if n == 0.0 {
        return Ok(Value::Number(0.0));
    }
    Ok(number_result(round_to(n, digits, mode)))
}

pub(crate) fn round(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    round_with(args, ctx, Rounding::HalfAwayFromZero)
}

pub(crate) fn roundup(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    round_with(args, ctx, Rounding::AwayFromZero)
}

pub(crate) fn rounddown(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    round_with(args, ctx, Rounding::TowardZero)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    fn call(f: super::super::FunctionImpl, args: &[Value]) -> Value {
        f(args, &mut Grid::default()).unwrap()
    }

    #[test]
    fn test_rounding() {
        assert_eq!(call(round, &[num(2.675), num(2.0)]), num(2.68));
        assert_eq!(call(round, &[num(-2.5), num(0.0)]), num(-3.0));
        assert_eq!(call(round, &[num(1234.5), num(-2.0)]), num(1200.0));
        assert_eq!(call(roundup, &[num(3.14159), num(3.0)]), num(3.142));
        assert_eq!(call(roundup, &[num(-3.2), num(0.0)]), num(-4.0));
        assert_eq!(call(rounddown, &[num(-3.9), num(0.0)]), num(-3.0));
        assert_eq!(call(rounddown, &[num(0.0), num(2.0)]), num(0.0));
    }

    #[test]
    fn test_mod_takes_sign_of_divisor() {
        assert_eq!(call(modulo, &[num(3.0), num(2.0)]), num(1.0));
        assert_eq!(call(modulo, &[num(-3.0), num(2.0)]), num(1.0));
        assert_eq!(call(modulo, &[num(3.0), num(-2.0)]), num(-1.0));
        assert_eq!(call(modulo, &[num(3.0), num(0.0)]), Value::Error(ErrorCode::Div0));
    }

    #[test]
    fn test_simple_math() {
        assert_eq!(call(abs, &[text("-4")]), num(4.0));
        assert_eq!(call(int, &[num(-1.5)]), num(-2.0));
        assert_eq!(call(sign, &[num(-0.1)]), num(-1.0));
        assert_eq!(call(sqrt, &[num(-1.0)]), Value::Error(ErrorCode::Num));
        assert_eq!(call(power, &[num(3.0), num(2.0)]), num(9.0));
        assert_eq!(call(abs, &[text("abc")]), Value::Error(ErrorCode::Value));
    }
}
