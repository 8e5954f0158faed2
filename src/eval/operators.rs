//! Arithmetic, comparison and concatenation on scalar operands.

use super::coerce::{compare, to_number, to_text};
use super::value::Value;
use crate::formula::ErrorCode;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Power,
    Concat,
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Plus,
    Minus,
    Percent,
}

/// Apply `op` to two scalars. The first error operand wins.
pub(crate) fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if let Value::Error(e) = left {
        return Value::Error(*e);
    }
    if let Value::Error(e) = right {
        return Value::Error(*e);
    }
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Power => {
            arithmetic(op, left, right)
        },
        BinaryOp::Concat => match (to_text(left), to_text(right)) {
            (Ok(mut a), Ok(b)) => {
                a.push_str(&b);
                Value::Text(a)
            },
            (Err(e), _) | (_, Err(e)) => Value::Error(e),
        },
        _ => {
            let ordering = compare(left, right);
            Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Ge => ordering != Ordering::Less,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Equal,
            })
        },
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let a = match to_number(left) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    let b = match to_number(right) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Value::Error(ErrorCode::Div0);
            }
            a / b
        },
        _ => {
            if a == 0.0 && b <= 0.0 {
                return Value::Error(if b == 0.0 { ErrorCode::Num } else { ErrorCode::Div0 });
            }
            a.powf(b)
        },
    };
    number_result(result)
}

/// Non-finite results (overflow, negative base with fractional power)
/// become `#NUM!`.
pub(crate) fn number_result(n: f64) -> Value {
    if n.is_finite() {
        Value::Number(n)
    } else {
        Value::Error(ErrorCode::Num)
    }
}

pub(crate) fn eval_unary(op: UnaryOp, operand: &Value) -> Value {
    match (op, operand) {
        (_, Value::Error(e)) => Value::Error(*e),
        (UnaryOp::Plus, Value::Blank) => Value::Number(0.0),
        (UnaryOp::Plus, other) => other.clone(),
        (UnaryOp::Minus, v) => match to_number(v) {
            Ok(n) => Value::Number(-n),
            Err(e) => Value::Error(e),
        },
        (UnaryOp::Percent, v) => match to_number(v) {
            Ok(n) => Value::Number(n / 100.0),
            Err(e) => Value::Error(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_relational_cases() {
        assert_eq!(eval_binary(BinaryOp::Gt, &Value::Bool(true), &num(5.0)), Value::Bool(true));
        assert_eq!(eval_binary(BinaryOp::Eq, &text(""), &Value::Blank), Value::Bool(true));
        assert_eq!(eval_binary(BinaryOp::Eq, &Value::Blank, &num(0.0)), Value::Bool(true));
        assert_eq!(eval_binary(BinaryOp::Gt, &text("abc"), &num(999.0)), Value::Bool(true));
        assert_eq!(eval_binary(BinaryOp::Ne, &num(1.0), &num(2.0)), Value::Bool(true));
        assert_eq!(eval_binary(BinaryOp::Ge, &num(2.0), &num(2.0)), Value::Bool(true));
        assert_eq!(eval_binary(BinaryOp::Lt, &Value::Blank, &num(-1.0)), Value::Bool(false));
    }

    #[test]
    fn test_first_error_propagates() {
        let result = eval_binary(
            BinaryOp::Add,
            &Value::Error(ErrorCode::Ref),
            &Value::Error(ErrorCode::Na),
        );
        assert_eq!(result, Value::Error(ErrorCode::Ref));
        assert_eq!(
            eval_binary(BinaryOp::Eq, &num(1.0), &Value::Error(ErrorCode::Na)),
            Value::Error(ErrorCode::Na)
        );
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval_binary(BinaryOp::Add, &text("2"), &Value::Bool(true)), num(3.0));
        assert_eq!(eval_binary(BinaryOp::Mul, &text("x"), &num(1.0)), Value::Error(ErrorCode::Value));
        assert_eq!(eval_binary(BinaryOp::Div, &num(1.0), &Value::Blank), Value::Error(ErrorCode::Div0));
        assert_eq!(eval_binary(BinaryOp::Power, &num(2.0), &num(10.0)), num(1024.0));
        assert_eq!(eval_binary(BinaryOp::Power, &num(-8.0), &num(0.5)), Value::Error(ErrorCode::Num));
        assert_eq!(eval_binary(BinaryOp::Mul, &num(1e308), &num(10.0)), Value::Error(ErrorCode::Num));
    }

    #[test]
    fn test_concat() {
        assert_eq!(eval_binary(BinaryOp::Concat, &text("a"), &Value::Blank), text("a"));
        assert_eq!(eval_binary(BinaryOp::Concat, &num(1.5), &Value::Bool(false)), text("1.5FALSE"));
        assert_eq!(
            eval_binary(BinaryOp::Concat, &text("a"), &Value::Error(ErrorCode::Div0)),
            Value::Error(ErrorCode::Div0)
        );
    }

    #[test]
    fn test_unary() {
        assert_eq!(eval_unary(UnaryOp::Minus, &text("4")), num(-4.0));
        assert_eq!(eval_unary(UnaryOp::Percent, &num(50.0)), num(0.5));
        assert_eq!(eval_unary(UnaryOp::Plus, &text("x")), text("x"));
        assert_eq!(eval_unary(UnaryOp::Plus, &Value::Blank), num(0.0));
    }
}
