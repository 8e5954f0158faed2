//! Built-in worksheet functions.
//!
//! Function tokens carry a BIFF function index; the index is mapped to a
//! name through the formula function table and the name to an
//! implementation here. Arguments arrive unevaluated as far as references
//! go: a function decides whether it wants the referenced cells one by one
//! or a single value.

mod aggregate;
mod criteria;
mod criteria_aggs;
mod info;
mod logical;
mod math;
mod text;

use super::EvalContext;
use super::coerce::{single_value, to_number, to_text};
use super::value::Value;
use crate::common::error::XlsResult;
use crate::formula::{ErrorCode, function_by_index};
use log::debug;
use phf::phf_map;

pub(crate) use criteria::Criterion;

pub(crate) type FunctionImpl = fn(&[Value], &mut dyn EvalContext) -> XlsResult<Value>;

/// Return the error code of a failed coercion as the function result.
macro_rules! try_value {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(code) => return Ok(Value::Error(code)),
        }
    };
}
pub(crate) use try_value;

static FUNCTIONS: phf::Map<&'static str, FunctionImpl> = phf_map! {
    "SUM" => aggregate::sum,
    "COUNT" => aggregate::count,
    "COUNTA" => aggregate::counta,
    "COUNTBLANK" => aggregate::countblank,
    "AVERAGE" => aggregate::average,
    "MIN" => aggregate::min,
    "MAX" => aggregate::max,
    "PRODUCT" => aggregate::product,
    "IF" => logical::if_fn,
    "AND" => logical::and,
    "OR" => logical::or,
    "NOT" => logical::not,
    "TRUE" => logical::true_fn,
    "FALSE" => logical::false_fn,
    "CHOOSE" => logical::choose,
    "ISBLANK" => info::isblank,
    "ISNUMBER" => info::isnumber,
    "ISTEXT" => info::istext,
    "ISNONTEXT" => info::isnontext,
    "ISERROR" => info::iserror,
    "ISERR" => info::iserr,
    "ISNA" => info::isna,
    "ISLOGICAL" => info::islogical,
    "NA" => info::na,
    "ROW" => info::row,
    "COLUMN" => info::column,
    "ROWS" => info::rows,
    "COLUMNS" => info::columns,
    "ABS" => math::abs,
    "INT" => math::int,
    "ROUND" => math::round,
    "ROUNDUP" => math::roundup,
    "ROUNDDOWN" => math::rounddown,
    "MOD" => math::modulo,
    "POWER" => math::power,
    "SQRT" => math::sqrt,
    "SIGN" => math::sign,
    "PI" => math::pi,
    "LEN" => text::len,
    "LEFT" => text::left,
    "RIGHT" => text::right,
    "MID" => text::mid,
    "UPPER" => text::upper,
    "LOWER" => text::lower,
    "TRIM" => text::trim,
    "CONCATENATE" => text::concatenate,
    "EXACT" => text::exact,
    "VALUE" => text::value,
    "COUNTIF" => criteria_aggs::countif,
    "SUMIF" => criteria_aggs::sumif,
};

/// Whether a function with this name is implemented.
pub fn is_supported(name: &str) -> bool {
    FUNCTIONS.contains_key(name.to_ascii_uppercase().as_str())
}

/// Call the function with BIFF index `index`. Unknown and unimplemented
/// functions give `#NAME?`; a wrong argument count gives `#VALUE!`.
pub(crate) fn invoke(index: u16, args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    let Some(meta) = function_by_index(index) else {
        debug!("unknown function index {}", index);
        return Ok(Value::Error(ErrorCode::Name));
    };
    if args.len() < usize::from(meta.min_args) || args.len() > usize::from(meta.max_args) {
        return Ok(Value::Error(ErrorCode::Value));
    }
    match FUNCTIONS.get(meta.name) {
        Some(f) => f(args, ctx),
        None => {
            debug!("function {} is not implemented", meta.name);
            Ok(Value::Error(ErrorCode::Name))
        },
    }
}

/// Argument `i` reduced to a scalar; an absent optional argument is
/// `Missing`.
pub(crate) fn scalar_arg(args: &[Value], i: usize, ctx: &mut dyn EvalContext) -> XlsResult<Value> {
    match args.get(i) {
        Some(Value::Missing) | None => Ok(Value::Missing),
        Some(arg) => single_value(arg.clone(), ctx),
    }
}

pub(crate) fn number_arg(
    args: &[Value],
    i: usize,
    ctx: &mut dyn EvalContext,
) -> XlsResult<Result<f64, ErrorCode>> {
    Ok(to_number(&scalar_arg(args, i, ctx)?))
}

pub(crate) fn text_arg(
    args: &[Value],
    i: usize,
    ctx: &mut dyn EvalContext,
) -> XlsResult<Result<String, ErrorCode>> {
    Ok(to_text(&scalar_arg(args, i, ctx)?))
}

/// A value seen by an aggregate, with whether it came out of a reference
/// (or array) rather than being passed directly.
pub(crate) struct ArgValue {
    pub value: Value,
    pub from_reference: bool,
}

/// Flatten the arguments. Referenced areas contribute their existing
/// cells only; cells that do not exist are blank and aggregates skip them.
pub(crate) fn flatten_args(args: &[Value], ctx: &mut dyn EvalContext) -> XlsResult<Vec<ArgValue>> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Value::Ref { sheet, row, col } => out.push(ArgValue {
                value: ctx.cell_value(*sheet, *row, *col)?,
                from_reference: true,
            }),
            Value::Area(area) => {
                for (row, col) in ctx.existing_cells(area) {
                    out.push(ArgValue {
                        value: ctx.cell_value(area.sheet, row, col)?,
                        from_reference: true,
                    });
                }
            },
            Value::Array(array) => out.extend(array.values.iter().map(|v| ArgValue {
                value: v.clone(),
                from_reference: true,
            })),
            direct => out.push(ArgValue {
                value: direct.clone(),
                from_reference: false,
            }),
        }
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::super::EvalContext;
    use super::super::value::{SheetArea, Value};
    use crate::common::error::XlsResult;
    use std::collections::BTreeMap;

    /// A single sheet of plain values for function tests.
    #[derive(Default)]
    pub struct Grid {
        pub cells: BTreeMap<(u32, u16), Value>,
        pub position: (u32, u16),
    }

    impl Grid {
        pub fn with(cells: &[((u32, u16), Value)]) -> Self {
            Self {
                cells: cells.iter().cloned().collect(),
                position: (100, 100),
            }
        }
    }

    impl EvalContext for Grid {
        fn cell_value(&mut self, _sheet: usize, row: u32, col: u16) -> XlsResult<Value> {
            Ok(self.cells.get(&(row, col)).cloned().unwrap_or(Value::Blank))
        }

        fn existing_cells(&mut self, area: &SheetArea) -> Vec<(u32, u16)> {
            self.cells
                .keys()
                .filter(|(r, c)| area.contains(area.sheet, *r, *c))
                .copied()
                .collect()
        }

        fn position(&self) -> (u32, u16) {
            self.position
        }
    }

    pub fn area(r1: u32, c1: u16, r2: u32, c2: u16) -> Value {
        Value::Area(SheetArea::new(0, r1, c1, r2, c2))
    }

    pub fn num(n: f64) -> Value {
        Value::Number(n)
    }

    pub fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::formula::function_by_name;

    #[test]
    fn test_every_supported_function_has_metadata() {
        for name in FUNCTIONS.keys() {
            assert!(function_by_name(name).is_some(), "{} has no index", name);
        }
        assert!(is_supported("countif"));
        assert!(!is_supported("VLOOKUP"));
    }

    #[test]
    fn test_invoke_checks_arity_and_support() {
        let mut grid = Grid::default();
        let sum = function_by_name("SUM").unwrap().index;
        assert_eq!(invoke(sum, &[num(1.0), num(2.0)], &mut grid).unwrap(), num(3.0));
        let round = function_by_name("ROUND").unwrap().index;
        assert_eq!(
            invoke(round, &[num(1.0)], &mut grid).unwrap(),
            Value::Error(ErrorCode::Value)
        );
        let vlookup = function_by_name("VLOOKUP").unwrap().index;
        assert_eq!(
            invoke(vlookup, &[num(1.0), area(0, 0, 1, 1), num(1.0)], &mut grid).unwrap(),
            Value::Error(ErrorCode::Name)
        );
        assert_eq!(invoke(9999, &[], &mut grid).unwrap(), Value::Error(ErrorCode::Name));
    }

    #[test]
    fn test_flatten_skips_missing_cells() {
        let mut grid = Grid::with(&[((0, 0), num(1.0)), ((2, 0), text("a"))]);
        let values = flatten_args(&[area(0, 0, 9, 0), num(4.0)], &mut grid).unwrap();
        assert_eq!(values.len(), 3);
        assert!(values[0].from_reference);
        assert!(!values[2].from_reference);
    }
}
