//! Data validation records: one DVAL followed by its DV records.

use super::merge::CellRangeAddress;
use super::strings::XlString;
use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use crate::formula::Formula;
use std::io::Write;

/// Record type: 0x01B2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvalRecord {
    pub options: u16,
    pub horizontal_pos: u32,
    pub vertical_pos: u32,
    /// Drop-down object id, `0xFFFF_FFFF` when there is none.
    pub object_id: u32,
    /// Number of DV records that follow; kept in sync by the table.
    pub dv_count: u32,
}

impl Default for DvalRecord {
    fn default() -> Self {
        Self {
            options: 0,
            horizontal_pos: 0,
            vertical_pos: 0,
            object_id: 0xFFFF_FFFF,
            dv_count: 0,
        }
    }
}

impl BiffRecord for DvalRecord {
    const SID: u16 = sid::DVAL;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let rec = Self {
            options: r.read_u16()?,
            horizontal_pos: r.read_u32()?,
            vertical_pos: r.read_u32()?,
            object_id: r.read_u32()?,
            dv_count: r.read_u32()?,
        };
        r.expect_end()?;
        Ok(rec)
    }

    fn data_size(&self) -> usize {
        18
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.options.to_le_bytes())?;
        for v in [
            self.horizontal_pos,
            self.vertical_pos,
            self.object_id,
            self.dv_count,
        ] {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Validation data types (low nibble of the DV options).
pub mod data_type {
    pub const ANY: u32 = 0;
    pub const INTEGER: u32 = 1;
    pub const DECIMAL: u32 = 2;
    pub const LIST: u32 = 3;
    pub const DATE: u32 = 4;
    pub const TIME: u32 = 5;
    pub const TEXT_LENGTH: u32 = 6;
    pub const FORMULA: u32 = 7;
}

const TYPE_MASK: u32 = 0x0000_000F;
const EMPTY_ALLOWED: u32 = 0x0000_0100;
const SHOW_PROMPT: u32 = 0x0004_0000;
const SHOW_ERROR: u32 = 0x0008_0000;
const OPERATOR_MASK: u32 = 0x00F0_0000;
const OPERATOR_SHIFT: u32 = 20;

/// One validation rule and the ranges it covers.
///
/// Record type: 0x01BE
#[derive(Debug, Clone, PartialEq)]
pub struct DvRecord {
    pub options: u32,
    pub prompt_title: XlString,
    pub error_title: XlString,
    pub prompt_text: XlString,
    pub error_text: XlString,
    pub formula1: Formula,
    pub formula1_reserved: u16,
    pub formula2: Formula,
    pub formula2_reserved: u16,
    pub ranges: Vec<CellRangeAddress>,
}

/// Excel stores absent DV strings as a single NUL character.
fn absent_string() -> XlString {
    XlString::new("\0")
}

impl DvRecord {
    pub fn new(
        data_type: u32,
        operator: u32,
        formula1: Formula,
        formula2: Formula,
        ranges: Vec<CellRangeAddress>,
    ) -> Self {
        let options = (data_type & TYPE_MASK)
            | ((operator << OPERATOR_SHIFT) & OPERATOR_MASK)
            | EMPTY_ALLOWED
            | SHOW_PROMPT
            | SHOW_ERROR;
        Self {
            options,
            prompt_title: absent_string(),
            error_title: absent_string(),
            prompt_text: absent_string(),
            error_text: absent_string(),
            formula1,
            formula1_reserved: 0,
            formula2,
            formula2_reserved: 0,
            ranges,
        }
    }

    pub fn data_type(&self) -> u32 {
        self.options & TYPE_MASK
    }

    pub fn operator(&self) -> u32 {
        (self.options & OPERATOR_MASK) >> OPERATOR_SHIFT
    }

    pub fn allows_empty(&self) -> bool {
        self.options & EMPTY_ALLOWED != 0
    }

    pub fn shows_error(&self) -> bool {
        self.options & SHOW_ERROR != 0
    }

    pub fn applies_to(&self, row: u32, col: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(row, col))
    }
}

fn read_dv_formula(r: &mut LittleEndianReader<'_>) -> XlsResult<(Formula, u16)> {
    let size = r.read_u16()? as usize;
    let reserved = r.read_u16()?;
    let bytes = r.read_slice(size)?;
    let mut fr = LittleEndianReader::new(sid::DV, bytes);
    Ok((Formula::read(&mut fr, size)?, reserved))
}

fn write_dv_formula<W: Write>(writer: &mut W, formula: &Formula, reserved: u16) -> XlsResult<()> {
    let size = u16::try_from(formula.encoded_size())
        .map_err(|_| XlsError::InvalidFormula("validation formula exceeds 65535 bytes".into()))?;
    writer.write_all(&size.to_le_bytes())?;
    writer.write_all(&reserved.to_le_bytes())?;
    formula.write_tokens(writer)
}

impl BiffRecord for DvRecord {
    const SID: u16 = sid::DV;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let options = r.read_u32()?;
        let prompt_title = XlString::read(&mut r)?;
        let error_title = XlString::read(&mut r)?;
        let prompt_text = XlString::read(&mut r)?;
        let error_text = XlString::read(&mut r)?;
        let (formula1, formula1_reserved) = read_dv_formula(&mut r)?;
        let (formula2, formula2_reserved) = read_dv_formula(&mut r)?;
        let count = r.read_u16()? as usize;
        let mut ranges = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            ranges.push(CellRangeAddress::read(&mut r)?);
        }
        r.expect_end()?;
        Ok(Self {
            options,
            prompt_title,
            error_title,
            prompt_text,
            error_text,
            formula1,
            formula1_reserved,
            formula2,
            formula2_reserved,
            ranges,
        })
    }

    fn data_size(&self) -> usize {
        4 + self.prompt_title.encoded_size()
            + self.error_title.encoded_size()
            + self.prompt_text.encoded_size()
            + self.error_text.encoded_size()
            + 4
            + self.formula1.encoded_size()
            + 4
            + self.formula2.encoded_size()
            + 2
            + self.ranges.len() * CellRangeAddress::ENCODED_SIZE
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.options.to_le_bytes())?;
        self.prompt_title.write(writer)?;
        self.error_title.write(writer)?;
        self.prompt_text.write(writer)?;
        self.error_text.write(writer)?;
        write_dv_formula(writer, &self.formula1, self.formula1_reserved)?;
        write_dv_formula(writer, &self.formula2, self.formula2_reserved)?;
        writer.write_all(&(self.ranges.len() as u16).to_le_bytes())?;
        for range in &self.ranges {
            range.write(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Ptg;

    #[test]
    fn test_dv_round_trip() {
        let dv = DvRecord::new(
            data_type::INTEGER,
            0,
            Formula::new(vec![Ptg::Int(1)]),
            Formula::new(vec![Ptg::Int(100)]),
            vec![CellRangeAddress::new(0, 9, 0, 0).unwrap()],
        );
        assert_eq!(dv.data_type(), data_type::INTEGER);
        assert!(dv.applies_to(5, 0));
        assert!(!dv.applies_to(5, 1));
        let mut out = Vec::new();
        dv.write_data(&mut out).unwrap();
        assert_eq!(out.len(), dv.data_size());
        assert_eq!(DvRecord::parse(&out).unwrap(), dv);
    }

    #[test]
    fn test_dval_defaults() {
        let dval = DvalRecord::default();
        let mut out = Vec::new();
        dval.write_data(&mut out).unwrap();
        assert_eq!(out.len(), 18);
        assert_eq!(DvalRecord::parse(&out).unwrap().object_id, 0xFFFF_FFFF);
    }
}
