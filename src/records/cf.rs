//! Conditional formatting records.
//!
//! A CFHEADER lists the ranges a block of rules applies to; up to three
//! CFRULE records follow it.

use super::merge::CellRangeAddress;
use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use crate::formula::Formula;
use bytes::Bytes;
use std::io::Write;

/// Record type: 0x01B0
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CfHeaderRecord {
    pub rule_count: u16,
    pub need_recalc: u16,
    /// Bounding box of `ranges`.
    pub enclosing: CellRangeAddress,
    pub ranges: Vec<CellRangeAddress>,
}

impl CfHeaderRecord {
    pub fn new(ranges: Vec<CellRangeAddress>, rule_count: u16) -> Self {
        let mut header = Self {
            rule_count,
            need_recalc: 0,
            enclosing: CellRangeAddress::default(),
            ranges: Vec::new(),
        };
        header.set_ranges(ranges);
        header
    }

    /// Replace the ranges and recompute the enclosing rectangle.
    pub fn set_ranges(&mut self, ranges: Vec<CellRangeAddress>) {
        self.enclosing = ranges
            .iter()
            .copied()
            .reduce(|a, b| CellRangeAddress {
                first_row: a.first_row.min(b.first_row),
                last_row: a.last_row.max(b.last_row),
                first_col: a.first_col.min(b.first_col),
                last_col: a.last_col.max(b.last_col),
            })
            .unwrap_or_default();
        self.ranges = ranges;
    }
}

impl BiffRecord for CfHeaderRecord {
    const SID: u16 = sid::CFHEADER;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let rule_count = r.read_u16()?;
        let need_recalc = r.read_u16()?;
        let enclosing = CellRangeAddress::read(&mut r)?;
        let count = r.read_u16()? as usize;
        let mut ranges = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            ranges.push(CellRangeAddress::read(&mut r)?);
        }
        r.expect_end()?;
        Ok(Self {
            rule_count,
            need_recalc,
            enclosing,
            ranges,
        })
    }

    fn data_size(&self) -> usize {
        4 + CellRangeAddress::ENCODED_SIZE + 2 + self.ranges.len() * CellRangeAddress::ENCODED_SIZE
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.rule_count.to_le_bytes())?;
        writer.write_all(&self.need_recalc.to_le_bytes())?;
        self.enclosing.write(writer)?;
        writer.write_all(&(self.ranges.len() as u16).to_le_bytes())?;
        for range in &self.ranges {
            range.write(writer)?;
        }
        Ok(())
    }
}

/// Rule condition kinds.
pub const CONDITION_CELL_VALUE: u8 = 1;
pub const CONDITION_FORMULA: u8 = 2;

/// Comparison operators of cell-value rules.
pub mod comparison {
    pub const NO_COMPARISON: u8 = 0;
    pub const BETWEEN: u8 = 1;
    pub const NOT_BETWEEN: u8 = 2;
    pub const EQUAL: u8 = 3;
    pub const NOT_EQUAL: u8 = 4;
    pub const GREATER_THAN: u8 = 5;
    pub const LESS_THAN: u8 = 6;
    pub const GREATER_OR_EQUAL: u8 = 7;
    pub const LESS_OR_EQUAL: u8 = 8;
}

const DEFAULT_OPTIONS: u32 = 0x003F_FFFF;
const DEFAULT_RESERVED: u16 = 0x8002;

/// One formatting rule.
///
/// Record type: 0x01B1
#[derive(Debug, Clone, PartialEq)]
pub struct CfRuleRecord {
    pub condition_type: u8,
    pub comparison: u8,
    pub options: u32,
    pub reserved: u16,
    /// Font, border and pattern blocks as selected by `options`.
    pub formatting: Bytes,
    pub formula1: Formula,
    pub formula2: Formula,
}

impl CfRuleRecord {
    /// Rule comparing the cell value against one or two formulas.
    pub fn cell_value(comparison: u8, formula1: Formula, formula2: Option<Formula>) -> Self {
        Self {
            condition_type: CONDITION_CELL_VALUE,
            comparison,
            options: DEFAULT_OPTIONS,
            reserved: DEFAULT_RESERVED,
            formatting: Bytes::new(),
            formula1,
            formula2: formula2.unwrap_or_default(),
        }
    }

    /// Rule applying when a formula evaluates to TRUE.
    pub fn expression(formula: Formula) -> Self {
        Self {
            condition_type: CONDITION_FORMULA,
            comparison: comparison::NO_COMPARISON,
            ..Self::cell_value(0, formula, None)
        }
    }
}

fn read_rule_formula(sid: u16, bytes: &[u8]) -> XlsResult<Formula> {
    let mut r = LittleEndianReader::new(sid, bytes);
    Formula::read(&mut r, bytes.len())
}

impl BiffRecord for CfRuleRecord {
    const SID: u16 = sid::CFRULE;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let condition_type = r.read_u8()?;
        let comparison = r.read_u8()?;
        let size1 = r.read_u16()? as usize;
        let size2 = r.read_u16()? as usize;
        let options = r.read_u32()?;
        let reserved = r.read_u16()?;
        let rest = r.read_remaining();
        let formatting_len = rest
            .len()
            .checked_sub(size1 + size2)
            .ok_or_else(|| XlsError::invalid_record(Self::SID, "formula sizes exceed the record"))?;
        let (formatting, formulas) = rest.split_at(formatting_len);
        let (f1, f2) = formulas.split_at(size1);
        Ok(Self {
            condition_type,
            comparison,
            options,
            reserved,
            formatting: Bytes::copy_from_slice(formatting),
            formula1: read_rule_formula(Self::SID, f1)?,
            formula2: read_rule_formula(Self::SID, f2)?,
        })
    }

    fn data_size(&self) -> usize {
        12 + self.formatting.len() + self.formula1.encoded_size() + self.formula2.encoded_size()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        let size = |f: &Formula| {
            u16::try_from(f.encoded_size())
                .map_err(|_| XlsError::InvalidFormula("rule formula exceeds 65535 bytes".into()))
        };
        writer.write_all(&[self.condition_type, self.comparison])?;
        writer.write_all(&size(&self.formula1)?.to_le_bytes())?;
        writer.write_all(&size(&self.formula2)?.to_le_bytes())?;
        writer.write_all(&self.options.to_le_bytes())?;
        writer.write_all(&self.reserved.to_le_bytes())?;
        writer.write_all(&self.formatting)?;
        self.formula1.write_tokens(writer)?;
        self.formula2.write_tokens(writer)?;
        Ok(())
    }
}
