//! Formula cells and the records that travel with them.
//!
//! A FORMULA record may be followed by a STRING record (cached text
//! result) and, when it is the master cell of a shared or array formula, by
//! a SHRFMLA, ARRAY or TABLE record holding the real token array.

use super::cell::CellHeader;
use super::strings::XlString;
use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use crate::formula::Formula;
use bitflags::bitflags;
use std::io::Write;

bitflags! {
    /// FORMULA option bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormulaFlags: u16 {
        const ALWAYS_CALC = 0x0001;
        const CALC_ON_LOAD = 0x0002;
        const SHARED_FORMULA = 0x0008;
        const _ = !0;
    }
}

const SPECIAL_MARKER: u16 = 0xFFFF;

const CACHED_STRING: u8 = 0;
const CACHED_BOOL: u8 = 1;
const CACHED_ERROR: u8 = 2;
const CACHED_EMPTY: u8 = 3;

/// The last calculated result stored in a FORMULA record.
///
/// Non-numeric results are packed into the 8-byte value field as a NaN
/// pattern whose top two bytes are `0xFFFF`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CachedValue {
    Number(f64),
    /// The text itself is in the following STRING record.
    String,
    Bool(bool),
    Error(u8),
    /// Empty string result, with no STRING record.
    Empty,
}

impl Default for CachedValue {
    fn default() -> Self {
        CachedValue::Number(0.0)
    }
}

impl CachedValue {
    fn from_bytes(bytes: [u8; 8]) -> XlsResult<Self> {
        if u16::from_le_bytes([bytes[6], bytes[7]]) != SPECIAL_MARKER {
            return Ok(CachedValue::Number(f64::from_le_bytes(bytes)));
        }
        Ok(match bytes[0] {
            CACHED_STRING => CachedValue::String,
            CACHED_BOOL => CachedValue::Bool(bytes[2] != 0),
            CACHED_ERROR => CachedValue::Error(bytes[2]),
            CACHED_EMPTY => CachedValue::Empty,
            other => {
                return Err(XlsError::invalid_record(
                    sid::FORMULA,
                    format!("bad special cached value type {}", other),
                ));
            },
        })
    }

    /// Encoded value field. Filler bytes of special values are always zero.
    fn to_bytes(self) -> [u8; 8] {
        let special = |kind: u8, data: u8| [kind, 0, data, 0, 0, 0, 0xFF, 0xFF];
        match self {
            CachedValue::Number(n) => n.to_le_bytes(),
            CachedValue::String => special(CACHED_STRING, 0),
            CachedValue::Bool(b) => special(CACHED_BOOL, b as u8),
            CachedValue::Error(code) => special(CACHED_ERROR, code),
            CachedValue::Empty => special(CACHED_EMPTY, 0),
        }
    }

    /// Whether a STRING record must follow the FORMULA record.
    pub fn needs_string_record(&self) -> bool {
        matches!(self, CachedValue::String)
    }
}

/// Formula cell.
///
/// Record type: 0x0006
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaRecord {
    pub cell: CellHeader,
    pub cached: CachedValue,
    pub flags: FormulaFlags,
    pub formula: Formula,
}

impl FormulaRecord {
    pub fn new(cell: CellHeader, formula: Formula) -> Self {
        Self {
            cell,
            cached: CachedValue::default(),
            flags: FormulaFlags::empty(),
            formula,
        }
    }

    pub fn is_shared(&self) -> bool {
        self.flags.contains(FormulaFlags::SHARED_FORMULA)
    }
}

impl BiffRecord for FormulaRecord {
    const SID: u16 = sid::FORMULA;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let cell = CellHeader::read(&mut r)?;
        let mut value = [0u8; 8];
        value.copy_from_slice(r.read_slice(8)?);
        let cached = CachedValue::from_bytes(value)?;
        let flags = FormulaFlags::from_bits_retain(r.read_u16()?);
        // chn: recalculation chain cache, rebuilt by the application.
        let _chn = r.read_u32()?;
        let cce = r.read_u16()? as usize;
        let formula = Formula::read_to_end(&mut r, cce)?;
        Ok(Self {
            cell,
            cached,
            flags,
            formula,
        })
    }

    fn data_size(&self) -> usize {
        6 + 8 + 2 + 4 + 2 + self.formula.encoded_size()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.cell.write(writer)?;
        writer.write_all(&self.cached.to_bytes())?;
        writer.write_all(&self.flags.bits().to_le_bytes())?;
        writer.write_all(&0u32.to_le_bytes())?;
        self.formula.write_with_cce(writer)
    }
}

/// Cached text result of the preceding formula.
///
/// Record type: 0x0207
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringRecord {
    pub value: XlString,
}

impl StringRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            value: XlString::new(text),
        }
    }
}

impl BiffRecord for StringRecord {
    const SID: u16 = sid::STRING;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let value = XlString::read(&mut r)?;
        r.expect_end()?;
        Ok(Self { value })
    }

    fn data_size(&self) -> usize {
        self.value.encoded_size()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.value.write(writer)
    }
}

/// Cell block covered by a shared formula, array formula or data table.
/// Columns are stored in a single byte each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FormulaRange {
    pub first_row: u16,
    pub last_row: u16,
    pub first_col: u8,
    pub last_col: u8,
}

impl FormulaRange {
    pub fn contains(&self, row: u16, col: u16) -> bool {
        (self.first_row..=self.last_row).contains(&row)
            && (self.first_col as u16..=self.last_col as u16).contains(&col)
    }

    /// Whether `(row, col)` is the top-left cell of the block.
    pub fn is_first_cell(&self, row: u16, col: u16) -> bool {
        self.first_row == row && self.first_col as u16 == col
    }

    fn read(r: &mut LittleEndianReader<'_>) -> XlsResult<Self> {
        Ok(Self {
            first_row: r.read_u16()?,
            last_row: r.read_u16()?,
            first_col: r.read_u8()?,
            last_col: r.read_u8()?,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.first_row.to_le_bytes())?;
        writer.write_all(&self.last_row.to_le_bytes())?;
        writer.write_all(&[self.first_col, self.last_col])?;
        Ok(())
    }
}

/// Token array shared by a block of formula cells.
///
/// Record type: 0x04BC
#[derive(Debug, Clone, PartialEq)]
pub struct SharedFormulaRecord {
    pub range: FormulaRange,
    pub reserved: u8,
    /// Number of cells that use this formula.
    pub use_count: u8,
    /// Tokens with RefN/AreaN offsets relative to each using cell.
    pub formula: Formula,
}

impl BiffRecord for SharedFormulaRecord {
    const SID: u16 = sid::SHRFMLA;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let range = FormulaRange::read(&mut r)?;
        let reserved = r.read_u8()?;
        let use_count = r.read_u8()?;
        let cce = r.read_u16()? as usize;
        let formula = Formula::read_to_end(&mut r, cce)?;
        Ok(Self {
            range,
            reserved,
            use_count,
            formula,
        })
    }

    fn data_size(&self) -> usize {
        6 + 2 + 2 + self.formula.encoded_size()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.range.write(writer)?;
        writer.write_all(&[self.reserved, self.use_count])?;
        self.formula.write_with_cce(writer)
    }
}

/// Array formula entered over a block of cells.
///
/// Record type: 0x0221
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayRecord {
    pub range: FormulaRange,
    pub options: u16,
    pub reserved: u32,
    pub formula: Formula,
}

impl BiffRecord for ArrayRecord {
    const SID: u16 = sid::ARRAY;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let range = FormulaRange::read(&mut r)?;
        let options = r.read_u16()?;
        let reserved = r.read_u32()?;
        let cce = r.read_u16()? as usize;
        let formula = Formula::read_to_end(&mut r, cce)?;
        Ok(Self {
            range,
            options,
            reserved,
            formula,
        })
    }

    fn data_size(&self) -> usize {
        6 + 2 + 4 + 2 + self.formula.encoded_size()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.range.write(writer)?;
        writer.write_all(&self.options.to_le_bytes())?;
        writer.write_all(&self.reserved.to_le_bytes())?;
        self.formula.write_with_cce(writer)
    }
}

/// What-if data table.
///
/// Record type: 0x0236
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableRecord {
    pub range: FormulaRange,
    pub flags: u8,
    pub reserved: u8,
    pub row_input_row: u16,
    pub col_input_row: u16,
    pub row_input_col: u16,
    pub col_input_col: u16,
}

impl BiffRecord for TableRecord {
    const SID: u16 = sid::TABLE;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let record = Self {
            range: FormulaRange::read(&mut r)?,
            flags: r.read_u8()?,
            reserved: r.read_u8()?,
            row_input_row: r.read_u16()?,
            col_input_row: r.read_u16()?,
            row_input_col: r.read_u16()?,
            col_input_col: r.read_u16()?,
        };
        r.expect_end()?;
        Ok(record)
    }

    fn data_size(&self) -> usize {
        16
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.range.write(writer)?;
        writer.write_all(&[self.flags, self.reserved])?;
        for v in [
            self.row_input_row,
            self.col_input_row,
            self.row_input_col,
            self.col_input_col,
        ] {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }
}
