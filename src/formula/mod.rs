//! Formula token representation.
//!
//! A [`Formula`] is the token array of a FORMULA, SHRFMLA, ARRAY or NAME
//! record. Its on-disk form is the token stream (`cce` bytes) followed by
//! any trailing array constant data, so the token size and the encoded size
//! differ whenever array literals are present.
//!
//! Token streams that cannot be decoded are kept as opaque bytes. Such a
//! formula re-encodes to exactly the bytes it was read from and evaluates
//! to `#VALUE!`.
//!
//! # Example
//!
//! ```
//! use litchi_xls::formula::{Formula, NoExternalReferences, parse_formula, to_formula_string};
//!
//! let mut ctx = NoExternalReferences;
//! let tokens = parse_formula("SUM(A1:B2)*2", &mut ctx).unwrap();
//! let formula = Formula::new(tokens);
//! assert_eq!(to_formula_string(formula.tokens().unwrap(), &ctx).unwrap(), "SUM(A1:B2)*2");
//! ```

pub mod error_code;
pub mod functions;
pub mod parser;
pub mod ptg;
pub mod renderer;

pub use error_code::ErrorCode;
pub use functions::{FunctionMetadata, function_by_index, function_by_name};
pub use parser::parse_formula;
pub use ptg::{
    AreaReference, ArrayConstant, AttrFlags, AttrPtg, CellReference, ConstantValue,
    OperandClass, Ptg,
};
pub use renderer::to_formula_string;

use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use bytes::Bytes;
use log::warn;
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
enum FormulaBody {
    Parsed(Vec<Ptg>),
    Opaque { tokens: Bytes, trailing: Bytes },
}

/// A formula token array.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    body: FormulaBody,
}

impl Default for Formula {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Formula {
    pub fn new(tokens: Vec<Ptg>) -> Self {
        Self {
            body: FormulaBody::Parsed(tokens),
        }
    }

    /// Read `cce` token bytes and the trailing data the tokens ask for.
    ///
    /// Undecodable tokens make the formula opaque; only the `cce` bytes are
    /// consumed in that case.
    pub fn read(r: &mut LittleEndianReader<'_>, cce: usize) -> XlsResult<Self> {
        let token_bytes = r.read_slice(cce)?;
        let mut trial = r.clone();
        match decode_with_trailing(token_bytes, &mut trial) {
            Ok(tokens) => {
                *r = trial;
                Ok(Self::new(tokens))
            },
            Err(e) => {
                warn!("keeping undecodable formula of {} bytes opaque: {}", cce, e);
                Ok(Self::opaque(token_bytes, &[]))
            },
        }
    }

    /// Read `cce` token bytes when the formula owns the rest of the payload.
    ///
    /// Used by records whose payload ends with the formula. Anything left
    /// after the trailing data keeps the formula opaque so no byte is lost.
    pub fn read_to_end(r: &mut LittleEndianReader<'_>, cce: usize) -> XlsResult<Self> {
        let token_bytes = r.read_slice(cce)?;
        let rest = r.read_remaining();
        let mut trial = LittleEndianReader::new(crate::records::sid::FORMULA, rest);
        match decode_with_trailing(token_bytes, &mut trial) {
            Ok(tokens) if trial.is_empty() => Ok(Self::new(tokens)),
            Ok(_) => {
                warn!(
                    "formula has {} unexpected trailing bytes; keeping it opaque",
                    trial.remaining()
                );
                Ok(Self::opaque(token_bytes, rest))
            },
            Err(e) => {
                warn!("keeping undecodable formula of {} bytes opaque: {}", cce, e);
                Ok(Self::opaque(token_bytes, rest))
            },
        }
    }

    fn opaque(tokens: &[u8], trailing: &[u8]) -> Self {
        Self {
            body: FormulaBody::Opaque {
                tokens: Bytes::copy_from_slice(tokens),
                trailing: Bytes::copy_from_slice(trailing),
            },
        }
    }

    /// Decoded tokens, or `None` for an opaque formula.
    pub fn tokens(&self) -> Option<&[Ptg]> {
        match &self.body {
            FormulaBody::Parsed(tokens) => Some(tokens),
            FormulaBody::Opaque { .. } => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self.body, FormulaBody::Parsed(_))
    }

    pub fn is_empty(&self) -> bool {
        self.token_size() == 0
    }

    /// Size of the token stream alone (the `cce` field).
    pub fn token_size(&self) -> usize {
        match &self.body {
            FormulaBody::Parsed(tokens) => ptg::tokens_size(tokens),
            FormulaBody::Opaque { tokens, .. } => tokens.len(),
        }
    }

    /// Size of the token stream plus trailing data.
    pub fn encoded_size(&self) -> usize {
        match &self.body {
            FormulaBody::Parsed(tokens) => ptg::tokens_size(tokens) + ptg::trailing_size(tokens),
            FormulaBody::Opaque { tokens, trailing } => tokens.len() + trailing.len(),
        }
    }

    /// Write tokens and trailing data without the `cce` prefix.
    pub fn write_tokens<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        match &self.body {
            FormulaBody::Parsed(tokens) => ptg::write_tokens(tokens, writer),
            FormulaBody::Opaque { tokens, trailing } => {
                writer.write_all(tokens)?;
                writer.write_all(trailing)?;
                Ok(())
            },
        }
    }

    /// Write the 16-bit `cce` followed by tokens and trailing data.
    pub fn write_with_cce<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        let cce = u16::try_from(self.token_size())
            .map_err(|_| XlsError::InvalidFormula("token stream exceeds 65535 bytes".into()))?;
        writer.write_all(&cce.to_le_bytes())?;
        self.write_tokens(writer)
    }

    /// Whether the formula is a shared/array formula pointer (`tExp`).
    pub fn exp_target(&self) -> Option<(u16, u16)> {
        match self.tokens() {
            Some([Ptg::Exp { row, col }]) => Some((*row, *col)),
            _ => None,
        }
    }

    /// Whether the formula is a data table pointer (`tTbl`).
    pub fn is_table_pointer(&self) -> bool {
        matches!(self.tokens(), Some([Ptg::Tbl { .. }]))
    }
}

fn decode_with_trailing(
    token_bytes: &[u8],
    trailing: &mut LittleEndianReader<'_>,
) -> XlsResult<Vec<Ptg>> {
    let mut tokens = ptg::parse_tokens(token_bytes)?;
    ptg::read_trailing_data(&mut tokens, trailing)?;
    Ok(tokens)
}

/// Convert the relative tokens of a shared formula into the tokens of the
/// cell at `(row, col)`: RefN/AreaN become Ref/Area with the offsets applied.
/// Operand classes are preserved.
pub fn shared_to_cell_tokens(tokens: &[Ptg], row: u16, col: u16) -> Vec<Ptg> {
    tokens
        .iter()
        .map(|ptg| match ptg {
            Ptg::RefN { class, cell } => Ptg::Ref {
                class: *class,
                cell: cell.resolve_relative_to(row, col),
            },
            Ptg::AreaN { class, area } => Ptg::Area {
                class: *class,
                area: area.resolve_relative_to(row, col),
            },
            other => other.clone(),
        })
        .collect()
}

/// Workbook services the formula parser and renderer need.
///
/// Cross-sheet references always go through extern sheet indexes, never
/// through sheet positions.
pub trait FormulaContext {
    /// Extern sheet index for a sheet of this workbook, creating the
    /// EXTERNSHEET entry when it does not exist yet.
    fn extern_sheet_index(&mut self, sheet_name: &str) -> Option<u16>;

    /// Name of the sheet an extern sheet index points at.
    ///
    /// External workbooks are rendered as `[book]sheet`.
    fn extern_sheet_name(&self, extern_sheet: u16) -> Option<String>;

    /// One-based index of a defined name, looked up case-insensitively.
    fn name_index(&self, name: &str) -> Option<u16>;

    /// Text of the defined name with the given one-based index.
    fn name_text(&self, index: u16) -> Option<String>;

    /// Text of an external name (`tNameX`).
    fn name_x_text(&self, extern_sheet: u16, name_index: u16) -> Option<String>;
}

/// Context for formulas that only reference their own sheet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalReferences;

impl FormulaContext for NoExternalReferences {
    fn extern_sheet_index(&mut self, _sheet_name: &str) -> Option<u16> {
        None
    }

    fn extern_sheet_name(&self, _extern_sheet: u16) -> Option<String> {
        None
    }

    fn name_index(&self, _name: &str) -> Option<u16> {
        None
    }

    fn name_text(&self, _index: u16) -> Option<String> {
        None
    }

    fn name_x_text(&self, _extern_sheet: u16, _name_index: u16) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_formula_round_trips() {
        // 0x18 is an extended token this crate does not decode.
        let payload = [0x18, 0x19, 0xAA, 0xBB];
        let mut r = LittleEndianReader::new(0x0006, &payload);
        let f = Formula::read_to_end(&mut r, 2).unwrap();
        assert!(!f.is_parsed());
        assert_eq!(f.token_size(), 2);
        assert_eq!(f.encoded_size(), 4);
        let mut out = Vec::new();
        f.write_tokens(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_read_consumes_only_what_tokens_need() {
        // tInt 5, followed by bytes belonging to someone else.
        let payload = [0x1E, 0x05, 0x00, 0x99];
        let mut r = LittleEndianReader::new(0x0018, &payload);
        let f = Formula::read(&mut r, 3).unwrap();
        assert_eq!(f.tokens().unwrap(), &[Ptg::Int(5)]);
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn test_shared_conversion() {
        let tokens = vec![
            Ptg::RefN {
                class: OperandClass::Value,
                cell: CellReference::from_raw(0xFFFF, 0xC000),
            },
            Ptg::Int(1),
            Ptg::Add,
        ];
        let converted = shared_to_cell_tokens(&tokens, 3, 2);
        match &converted[0] {
            Ptg::Ref { class, cell } => {
                assert_eq!(*class, OperandClass::Value);
                assert_eq!(cell.row(), 2);
                assert_eq!(cell.col(), 2);
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(converted[1..], tokens[1..]);
    }

    #[test]
    fn test_exp_target() {
        let f = Formula::new(vec![Ptg::Exp { row: 4, col: 1 }]);
        assert_eq!(f.exp_target(), Some((4, 1)));
        assert_eq!(Formula::new(vec![Ptg::Int(1)]).exp_target(), None);
    }
}
