//! Criteria of COUNTIF and SUMIF.
//!
//! A criterion is either a plain value (`5`, `TRUE`, a cell reference) or
//! text with an optional comparison prefix (`">=5"`, `"<>abc"`, `"a*"`).
//! Text criteria are read as a boolean, then as a number, then as an error
//! literal, and only then as a string which may contain `?` and `*`
//! wildcards (`~` escapes them).

use crate::common::number::parse_number;
use crate::eval::coerce::{compare_text, parse_bool};
use crate::eval::value::Value;
use crate::formula::ErrorCode;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    /// No prefix at all.
    None,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn split(text: &str) -> (CmpOp, &str) {
        const PREFIXES: [(&str, CmpOp); 6] = [
            ("<>", CmpOp::Ne),
            ("<=", CmpOp::Le),
            (">=", CmpOp::Ge),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
            ("=", CmpOp::Eq),
        ];
        PREFIXES
            .iter()
            .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (*op, rest)))
            .unwrap_or((CmpOp::None, text))
    }

    fn test(self, ordering: Ordering) -> bool {
        match self {
            CmpOp::None | CmpOp::Eq => ordering == Ordering::Equal,
            CmpOp::Ne => ordering != Ordering::Equal,
            CmpOp::Lt => ordering == Ordering::Less,
            CmpOp::Le => ordering != Ordering::Greater,
            CmpOp::Gt => ordering == Ordering::Greater,
            CmpOp::Ge => ordering != Ordering::Less,
        }
    }

    /// Result for a value of a type the criterion cannot compare with:
    /// only "not equal" holds.
    fn mismatched_type(self) -> bool {
        self == CmpOp::Ne
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PatternToken {
    Char(char),
    AnyOne,
    AnyMany,
}

/// Compile `text` into a case-folded wildcard pattern. Returns `None` when
/// the text has no wildcard or escape, so plain comparison applies.
fn compile_pattern(text: &str) -> Option<Vec<PatternToken>> {
    let mut tokens = Vec::new();
    let mut wild = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '?' => {
                wild = true;
                tokens.push(PatternToken::AnyOne);
            },
            '*' => {
                wild = true;
                tokens.push(PatternToken::AnyMany);
            },
            '~' => match chars.peek() {
                Some(&escaped @ ('?' | '*' | '~')) => {
                    wild = true;
                    chars.next();
                    tokens.push(PatternToken::Char(escaped));
                },
                _ => tokens.push(PatternToken::Char('~')),
            },
            c => tokens.extend(c.to_uppercase().map(PatternToken::Char)),
        }
    }
    wild.then_some(tokens)
}

fn wildcard_match(tokens: &[PatternToken], text: &str) -> bool {
    let text: Vec<char> = text.chars().flat_map(char::to_uppercase).collect();
    let (mut p, mut t) = (0, 0);
    // Resume point after the last `*`: (pattern index, text index).
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match tokens.get(p) {
            Some(PatternToken::AnyMany) => {
                backtrack = Some((p + 1, t));
                p += 1;
            },
            Some(PatternToken::AnyOne) => {
                p += 1;
                t += 1;
            },
            Some(PatternToken::Char(c)) if *c == text[t] => {
                p += 1;
                t += 1;
            },
            _ => match backtrack {
                Some((resume, consumed)) => {
                    p = resume;
                    t = consumed + 1;
                    backtrack = Some((resume, consumed + 1));
                },
                None => return false,
            },
        }
    }
    tokens[p..].iter().all(|token| *token == PatternToken::AnyMany)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Criterion {
    Number { op: CmpOp, value: f64 },
    Bool { op: CmpOp, value: bool },
    Error { op: CmpOp, code: ErrorCode },
    Text {
        op: CmpOp,
        value: String,
        pattern: Option<Vec<PatternToken>>,
    },
}

impl Criterion {
    /// Build a criterion from an already dereferenced scalar. Blank
    /// criteria match nothing.
    pub fn parse(value: &Value) -> Option<Criterion> {
        match value {
            Value::Number(n) => Some(Criterion::Number {
                op: CmpOp::None,
                value: *n,
            }),
            Value::Bool(b) => Some(Criterion::Bool {
                op: CmpOp::None,
                value: *b,
            }),
            Value::Error(code) => Some(Criterion::Error {
                op: CmpOp::None,
                code: *code,
            }),
            Value::Text(text) => Some(Self::parse_text(text)),
            _ => None,
        }
    }

    fn parse_text(text: &str) -> Criterion {
        let (op, rest) = CmpOp::split(text);
        if let Some(value) = parse_bool(rest) {
            return Criterion::Bool { op, value };
        }
        if let Some(value) = parse_number(rest) {
            return Criterion::Number { op, value };
        }
        if let Some(code) = ErrorCode::from_text(rest) {
            return Criterion::Error { op, code };
        }
        let pattern = match op {
            CmpOp::None | CmpOp::Eq | CmpOp::Ne => compile_pattern(rest),
            _ => None,
        };
        Criterion::Text {
            op,
            value: rest.to_string(),
            pattern,
        }
    }

    pub fn matches(&self, candidate: &Value) -> bool {
        match self {
            Criterion::Number { op, value } => match candidate {
                Value::Number(n) => op.test(n.partial_cmp(value).unwrap_or(Ordering::Equal)),
                // Text that parses as a number compares as that number.
                Value::Text(s) => match parse_number(s) {
                    Some(n) => op.test(n.partial_cmp(value).unwrap_or(Ordering::Equal)),
                    None => op.mismatched_type(),
                },
                _ => op.mismatched_type(),
            },
            Criterion::Bool { op, value } => match candidate {
                Value::Bool(b) => op.test(b.cmp(value)),
                _ => op.mismatched_type(),
            },
            Criterion::Error { op, code } => match (op, candidate) {
                (CmpOp::None | CmpOp::Eq, Value::Error(e)) => e == code,
                (CmpOp::Ne, Value::Error(e)) => e != code,
                _ => op.mismatched_type(),
            },
            Criterion::Text { op, value, pattern } => match candidate {
                Value::Blank | Value::Missing => match op {
                    CmpOp::None | CmpOp::Eq => value.is_empty(),
                    CmpOp::Ne => !value.is_empty(),
                    _ => false,
                },
                Value::Text(s) if s.is_empty() && value.is_empty() => {
                    // "=" on its own matches blank cells only.
                    matches!(op, CmpOp::None | CmpOp::Ne)
                },
                Value::Text(s) => match pattern {
                    Some(tokens) => (*op == CmpOp::Ne) != wildcard_match(tokens, s),
                    None => op.test(compare_text(s, value)),
                },
                _ => op.mismatched_type(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(text: &str) -> Criterion {
        Criterion::parse(&Value::Text(text.to_string())).unwrap()
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(criterion(">=5"), Criterion::Number { op: CmpOp::Ge, value: 5.0 });
        assert_eq!(criterion("<>TRUE"), Criterion::Bool { op: CmpOp::Ne, value: true });
        assert_eq!(criterion("#N/A"), Criterion::Error { op: CmpOp::None, code: ErrorCode::Na });
        assert!(matches!(criterion("<abc"), Criterion::Text { op: CmpOp::Lt, pattern: None, .. }));
        assert!(matches!(criterion("a*"), Criterion::Text { pattern: Some(_), .. }));
        assert!(Criterion::parse(&Value::Blank).is_none());
    }

    #[test]
    fn test_number_criteria() {
        let gt = criterion(">5");
        assert!(gt.matches(&num(7.0)));
        assert!(!gt.matches(&num(5.0)));
        assert!(!gt.matches(&text("x")));
        assert!(gt.matches(&text("9")));
        assert!(!gt.matches(&text("3")));
        assert!(criterion(">=5").matches(&num(5.0)));
        assert!(criterion("<10").matches(&text("9.5")));
        assert!(criterion("5").matches(&text("5")));
        let ne = criterion("<>5");
        assert!(ne.matches(&num(4.0)));
        assert!(!ne.matches(&num(5.0)));
        assert!(ne.matches(&text("x")));
        assert!(ne.matches(&Value::Blank));
    }

    #[test]
    fn test_text_criteria() {
        let eq = criterion("apple");
        assert!(eq.matches(&text("APPLE")));
        assert!(!eq.matches(&num(1.0)));
        assert!(criterion("<b").matches(&text("apple")));
        assert!(!criterion("<b").matches(&text("cherry")));
        assert!(criterion("<>apple").matches(&Value::Blank));
    }

    #[test]
    fn test_blank_and_empty_string_criteria() {
        let none = criterion("");
        assert!(none.matches(&Value::Blank));
        assert!(none.matches(&text("")));
        let eq = criterion("=");
        assert!(eq.matches(&Value::Blank));
        assert!(!eq.matches(&text("")));
        let ne = criterion("<>");
        assert!(!ne.matches(&Value::Blank));
        assert!(ne.matches(&text("a")));
        assert!(ne.matches(&num(1.0)));
    }

    #[test]
    fn test_wildcards() {
        assert!(criterion("a*").matches(&text("Apple")));
        assert!(criterion("?pple").matches(&text("apple")));
        assert!(!criterion("?pple").matches(&text("pple")));
        assert!(criterion("*le*").matches(&text("table top")));
        assert!(criterion("a~*").matches(&text("a*")));
        assert!(!criterion("a~*").matches(&text("ab")));
        assert!(!criterion("<>a*").matches(&text("abc")));
        assert!(criterion("<>a*").matches(&text("bcd")));
    }

    #[test]
    fn test_bool_and_error_criteria() {
        let t = Criterion::parse(&Value::Bool(true)).unwrap();
        assert!(t.matches(&Value::Bool(true)));
        assert!(!t.matches(&num(1.0)));
        let na = criterion("#N/A");
        assert!(na.matches(&Value::Error(ErrorCode::Na)));
        assert!(!na.matches(&Value::Error(ErrorCode::Div0)));
    }
}
