//! Token to formula text conversion.

use super::FormulaContext;
use super::error_code::ErrorCode;
use super::functions;
use super::ptg::{AreaReference, ArrayConstant, CellReference, ConstantValue, Ptg};
use crate::common::error::{XlsError, XlsResult};
use crate::common::number::number_to_text;

/// Render tokens back to formula text (without the leading `=`).
///
/// Relative references are rendered as stored: this function does not
/// know which cell holds the formula, so RefN/AreaN tokens render their
/// offsets as plain coordinates.
pub fn to_formula_string(tokens: &[Ptg], ctx: &dyn FormulaContext) -> XlsResult<String> {
    let mut stack: Vec<String> = Vec::with_capacity(tokens.len());
    for ptg in tokens {
        match ptg {
            Ptg::Attr(attr) => {
                if attr.is_sum() {
                    let arg = pop(&mut stack)?;
                    stack.push(format!("SUM({})", arg));
                }
            },
            Ptg::Exp { .. } | Ptg::Tbl { .. } => {
                return Err(XlsError::InvalidFormula(
                    "shared formula pointers have no text form".into(),
                ));
            },
            Ptg::MemArea { .. }
            | Ptg::MemErr { .. }
            | Ptg::MemNoMem { .. }
            | Ptg::MemFunc { .. } => {
                // Memory tokens only annotate the sub-expression that follows.
            },
            Ptg::Paren => {
                let inner = pop(&mut stack)?;
                stack.push(format!("({})", inner));
            },
            Ptg::UnaryPlus | Ptg::UnaryMinus => {
                let operand = pop(&mut stack)?;
                let sign = if matches!(ptg, Ptg::UnaryMinus) { "-" } else { "+" };
                stack.push(format!("{}{}", sign, operand));
            },
            Ptg::Percent => {
                let operand = pop(&mut stack)?;
                stack.push(format!("{}%", operand));
            },
            Ptg::Func { index, .. } => {
                let meta = functions::function_by_index(*index).ok_or_else(|| {
                    XlsError::InvalidFormula(format!("unknown function index {}", index))
                })?;
                let args = pop_n(&mut stack, meta.min_args as usize)?;
                stack.push(format!("{}({})", meta.name, args.join(",")));
            },
            Ptg::FuncVar {
                arg_count, index, ..
            } => {
                let count = (arg_count & 0x7F) as usize;
                let mut args = pop_n(&mut stack, count)?;
                let name = if index & 0x7FFF == functions::FUNCTION_INDEX_EXTERNAL {
                    // Add-in call: the first operand is the function name.
                    if args.is_empty() {
                        return Err(XlsError::InvalidFormula(
                            "external function call without a name operand".into(),
                        ));
                    }
                    args.remove(0)
                } else {
                    functions::function_by_index(index & 0x7FFF)
                        .map(|m| m.name.to_string())
                        .ok_or_else(|| {
                            XlsError::InvalidFormula(format!("unknown function index {}", index))
                        })?
                };
                stack.push(format!("{}({})", name, args.join(",")));
            },
            op if binary_operator(op).is_some() => {
                let right = pop(&mut stack)?;
                let left = pop(&mut stack)?;
                let symbol = binary_operator(op).unwrap_or_default();
                stack.push(format!("{}{}{}", left, symbol, right));
            },
            operand => stack.push(operand_text(operand, ctx)?),
        }
    }
    match (stack.pop(), stack.is_empty()) {
        (Some(text), true) => Ok(text),
        (None, _) => Ok(String::new()),
        (Some(_), false) => Err(XlsError::InvalidFormula(format!(
            "{} operands left on the stack",
            stack.len() + 1
        ))),
    }
}

fn pop(stack: &mut Vec<String>) -> XlsResult<String> {
    stack
        .pop()
        .ok_or_else(|| XlsError::InvalidFormula("operator without enough operands".into()))
}

fn pop_n(stack: &mut Vec<String>, count: usize) -> XlsResult<Vec<String>> {
    if stack.len() < count {
        return Err(XlsError::InvalidFormula(format!(
            "function needs {} operands, {} available",
            count,
            stack.len()
        )));
    }
    Ok(stack.split_off(stack.len() - count))
}

fn binary_operator(ptg: &Ptg) -> Option<&'static str> {
    Some(match ptg {
        Ptg::Add => "+",
        Ptg::Sub => "-",
        Ptg::Mul => "*",
        Ptg::Div => "/",
        Ptg::Power => "^",
        Ptg::Concat => "&",
        Ptg::Lt => "<",
        Ptg::Le => "<=",
        Ptg::Eq => "=",
        Ptg::Ge => ">=",
        Ptg::Gt => ">",
        Ptg::Ne => "<>",
        Ptg::Intersect => " ",
        Ptg::Union => ",",
        Ptg::Range => ":",
        _ => return None,
    })
}

fn operand_text(ptg: &Ptg, ctx: &dyn FormulaContext) -> XlsResult<String> {
    Ok(match ptg {
        Ptg::MissingArg => String::new(),
        Ptg::Str(s) => format!("\"{}\"", s.text().replace('"', "\"\"")),
        Ptg::Err(code) => ErrorCode::text_for_code(*code),
        Ptg::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Ptg::Int(n) => n.to_string(),
        Ptg::Num(n) => number_to_text(*n),
        Ptg::Array { value, .. } => array_text(value),
        Ptg::Name { index, .. } => ctx
            .name_text(*index)
            .ok_or_else(|| XlsError::InvalidFormula(format!("unknown defined name {}", index)))?,
        Ptg::NameX {
            extern_sheet,
            name_index,
            ..
        } => ctx.name_x_text(*extern_sheet, *name_index).ok_or_else(|| {
            XlsError::InvalidFormula(format!(
                "unknown external name {} in extern sheet {}",
                name_index, extern_sheet
            ))
        })?,
        Ptg::Ref { cell, .. } | Ptg::RefN { cell, .. } => cell_text(cell),
        Ptg::Area { area, .. } | Ptg::AreaN { area, .. } => area_text(area),
        Ptg::Ref3d {
            extern_sheet, cell, ..
        } => format!("{}!{}", sheet_prefix(*extern_sheet, ctx)?, cell_text(cell)),
        Ptg::Area3d {
            extern_sheet, area, ..
        } => format!("{}!{}", sheet_prefix(*extern_sheet, ctx)?, area_text(area)),
        Ptg::RefErr { .. } | Ptg::AreaErr { .. } => ErrorCode::Ref.text().to_string(),
        Ptg::RefErr3d { extern_sheet, .. } | Ptg::AreaErr3d { extern_sheet, .. } => format!(
            "{}!{}",
            sheet_prefix(*extern_sheet, ctx)?,
            ErrorCode::Ref.text()
        ),
        other => {
            return Err(XlsError::InvalidFormula(format!(
                "token 0x{:02X} is not an operand",
                other.id()
            )));
        },
    })
}

/// Column letters for a zero-based column index.
pub fn column_letters(col: u16) -> String {
    let mut n = col as u32 + 1;
    let mut letters = Vec::with_capacity(3);
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn cell_text(cell: &CellReference) -> String {
    format!(
        "{}{}{}{}",
        if cell.is_col_relative() { "" } else { "$" },
        column_letters(cell.col()),
        if cell.is_row_relative() { "" } else { "$" },
        cell.row() as u32 + 1
    )
}

fn area_text(area: &AreaReference) -> String {
    if area.is_whole_column() {
        let part = |c: &CellReference| {
            format!(
                "{}{}",
                if c.is_col_relative() { "" } else { "$" },
                column_letters(c.col())
            )
        };
        return format!("{}:{}", part(&area.first), part(&area.last));
    }
    format!("{}:{}", cell_text(&area.first), cell_text(&area.last))
}

fn sheet_prefix(extern_sheet: u16, ctx: &dyn FormulaContext) -> XlsResult<String> {
    let name = ctx.extern_sheet_name(extern_sheet).ok_or_else(|| {
        XlsError::InvalidFormula(format!("unknown extern sheet index {}", extern_sheet))
    })?;
    Ok(quote_sheet_name(&name))
}

/// Quote a sheet name when it is not a plain identifier.
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

fn array_text(value: &ArrayConstant) -> String {
    let mut out = String::from("{");
    for row in 0..value.rows {
        if row > 0 {
            out.push(';');
        }
        for col in 0..value.cols {
            if col > 0 {
                out.push(',');
            }
            match value.value(row, col) {
                Some(ConstantValue::Number(n)) => out.push_str(&number_to_text(*n)),
                Some(ConstantValue::String(s)) => {
                    out.push('"');
                    out.push_str(&s.text().replace('"', "\"\""));
                    out.push('"');
                },
                Some(ConstantValue::Bool(b)) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
                Some(ConstantValue::Error(e)) => out.push_str(&ErrorCode::text_for_code(*e)),
                Some(ConstantValue::Empty) | None => {},
            }
        }
    }
    out.push('}');
    out
}
