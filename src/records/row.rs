//! Row descriptors and the row-block index.

use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use std::io::Write;

/// Row properties.
///
/// Record type: 0x0208
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRecord {
    pub row: u16,
    pub first_col: u16,
    /// One past the last column holding a cell.
    pub last_col: u16,
    pub height: u16,
    pub optimize: u16,
    pub reserved: u16,
    pub options: u16,
    pub xf_index: u16,
}

impl RowRecord {
    pub const MAX_ROW: u32 = 0xFFFF;
    /// Encoded size including the record header.
    pub const ENCODED_SIZE: usize = 20;

    const OUTLINE_LEVEL_MASK: u16 = 0x0007;
    const COLLAPSED: u16 = 0x0010;
    const ZERO_HEIGHT: u16 = 0x0020;
    const BAD_FONT_HEIGHT: u16 = 0x0040;
    const FORMATTED: u16 = 0x0080;
    const ALWAYS_SET: u16 = 0x0100;
    const XF_MASK: u16 = 0x0FFF;

    /// A default row: standard height, general style, no cells.
    pub fn new(row: u32) -> XlsResult<Self> {
        let row = u16::try_from(row)
            .map_err(|_| XlsError::invalid_argument(format!("row {} exceeds 65535", row)))?;
        Ok(Self {
            row,
            first_col: 0,
            last_col: 0,
            height: 0x00FF,
            optimize: 0,
            reserved: 0,
            options: Self::ALWAYS_SET,
            xf_index: 0x000F,
        })
    }

    pub fn row_number(&self) -> u32 {
        self.row as u32
    }

    /// Whether no cell has been recorded in this row.
    pub fn is_empty(&self) -> bool {
        (self.first_col | self.last_col) == 0
    }

    pub fn outline_level(&self) -> u8 {
        (self.options & Self::OUTLINE_LEVEL_MASK) as u8
    }

    pub fn set_outline_level(&mut self, level: u8) {
        self.options =
            (self.options & !Self::OUTLINE_LEVEL_MASK) | (u16::from(level) & Self::OUTLINE_LEVEL_MASK);
    }

    pub fn is_collapsed(&self) -> bool {
        self.options & Self::COLLAPSED != 0
    }

    pub fn set_collapsed(&mut self, collapsed: bool) {
        self.set_option(Self::COLLAPSED, collapsed);
    }

    pub fn is_zero_height(&self) -> bool {
        self.options & Self::ZERO_HEIGHT != 0
    }

    pub fn set_zero_height(&mut self, hidden: bool) {
        self.set_option(Self::ZERO_HEIGHT, hidden);
    }

    pub fn is_bad_font_height(&self) -> bool {
        self.options & Self::BAD_FONT_HEIGHT != 0
    }

    pub fn is_formatted(&self) -> bool {
        self.options & Self::FORMATTED != 0
    }

    pub fn set_formatted(&mut self, formatted: bool) {
        self.set_option(Self::FORMATTED, formatted);
    }

    /// Cell style index for the row (meaningful when formatted).
    pub fn style_index(&self) -> u16 {
        self.xf_index & Self::XF_MASK
    }

    pub fn set_style_index(&mut self, xf: u16) {
        self.xf_index = (self.xf_index & !Self::XF_MASK) | (xf & Self::XF_MASK);
    }

    fn set_option(&mut self, bit: u16, on: bool) {
        if on {
            self.options |= bit;
        } else {
            self.options &= !bit;
        }
    }
}

impl BiffRecord for RowRecord {
    const SID: u16 = sid::ROW;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let out = Self {
            row: r.read_u16()?,
            first_col: r.read_u16()?,
            last_col: r.read_u16()?,
            height: r.read_u16()?,
            optimize: r.read_u16()?,
            reserved: r.read_u16()?,
            options: r.read_u16()?,
            xf_index: r.read_u16()?,
        };
        r.expect_end()?;
        Ok(out)
    }

    fn data_size(&self) -> usize {
        16
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        for v in [
            self.row,
            self.first_col,
            self.last_col,
            self.height,
            self.optimize,
            self.reserved,
            self.options,
            self.xf_index,
        ] {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Row-block index written right after a worksheet's BOF.
///
/// Record type: 0x020B
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexRecord {
    pub reserved: u32,
    pub first_row: u32,
    /// One past the last row with a ROW record.
    pub last_row_add1: u32,
    /// Stream offset of DEFCOLWIDTH; written as zero.
    pub def_col_width_offset: u32,
    /// Absolute stream offsets of the DBCELL records.
    pub dbcells: Vec<u32>,
}

impl IndexRecord {
    /// Encoded size for a sheet with `blocks` row blocks.
    pub fn size_for_blocks(blocks: usize) -> usize {
        4 + 16 + 4 * blocks
    }
}

impl BiffRecord for IndexRecord {
    const SID: u16 = sid::INDEX;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let reserved = r.read_u32()?;
        let first_row = r.read_u32()?;
        let last_row_add1 = r.read_u32()?;
        let def_col_width_offset = r.read_u32()?;
        if r.remaining() % 4 != 0 {
            return Err(XlsError::invalid_record(
                Self::SID,
                "DBCELL offset list is not a multiple of 4 bytes",
            ));
        }
        let mut dbcells = Vec::with_capacity(r.remaining() / 4);
        while !r.is_empty() {
            dbcells.push(r.read_u32()?);
        }
        Ok(Self {
            reserved,
            first_row,
            last_row_add1,
            def_col_width_offset,
            dbcells,
        })
    }

    fn data_size(&self) -> usize {
        16 + 4 * self.dbcells.len()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.reserved.to_le_bytes())?;
        writer.write_all(&self.first_row.to_le_bytes())?;
        writer.write_all(&self.last_row_add1.to_le_bytes())?;
        writer.write_all(&self.def_col_width_offset.to_le_bytes())?;
        for offset in &self.dbcells {
            writer.write_all(&offset.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Offsets from a row block's end back to its first ROW record and
/// between the first cells of each row.
///
/// Record type: 0x00D7
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DbCellRecord {
    pub row_offset: u32,
    pub cell_offsets: Vec<u16>,
}

impl BiffRecord for DbCellRecord {
    const SID: u16 = sid::DBCELL;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let row_offset = r.read_u32()?;
        if r.remaining() % 2 != 0 {
            return Err(XlsError::invalid_record(
                Self::SID,
                "cell offset list has an odd length",
            ));
        }
        let mut cell_offsets = Vec::with_capacity(r.remaining() / 2);
        while !r.is_empty() {
            cell_offsets.push(r.read_u16()?);
        }
        Ok(Self {
            row_offset,
            cell_offsets,
        })
    }

    fn data_size(&self) -> usize {
        4 + 2 * self.cell_offsets.len()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.row_offset.to_le_bytes())?;
        for offset in &self.cell_offsets {
            writer.write_all(&offset.to_le_bytes())?;
        }
        Ok(())
    }
}
