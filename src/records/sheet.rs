//! Substream framing and sheet view records.

use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use bitflags::bitflags;
use std::io::Write;

/// Kind of substream opened by a BOF record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BofType {
    Workbook,
    VbModule,
    Worksheet,
    Chart,
    Excel4Macro,
    Workspace,
    Other(u16),
}

impl BofType {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x0005 => BofType::Workbook,
            0x0006 => BofType::VbModule,
            0x0010 => BofType::Worksheet,
            0x0020 => BofType::Chart,
            0x0040 => BofType::Excel4Macro,
            0x0100 => BofType::Workspace,
            other => BofType::Other(other),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            BofType::Workbook => 0x0005,
            BofType::VbModule => 0x0006,
            BofType::Worksheet => 0x0010,
            BofType::Chart => 0x0020,
            BofType::Excel4Macro => 0x0040,
            BofType::Workspace => 0x0100,
            BofType::Other(raw) => raw,
        }
    }
}

/// Beginning of a substream.
///
/// Record type: 0x0809
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BofRecord {
    pub version: u16,
    pub bof_type: BofType,
    pub build: u16,
    pub year: u16,
    /// File history flags and lowest BIFF version; absent in short BOFs.
    pub history: Option<(u32, u32)>,
}

impl BofRecord {
    pub const VERSION_BIFF8: u16 = 0x0600;

    /// BOF with the build identifiers Excel 97 writes.
    pub fn new(bof_type: BofType) -> Self {
        Self {
            version: Self::VERSION_BIFF8,
            bof_type,
            build: 0x0DBB,
            year: 0x07CC,
            history: Some((0x0000_0000, 0x0000_0006)),
        }
    }

    pub fn is_worksheet(&self) -> bool {
        self.bof_type == BofType::Worksheet
    }
}

impl BiffRecord for BofRecord {
    const SID: u16 = sid::BOF;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let version = r.read_u16()?;
        let bof_type = BofType::from_raw(r.read_u16()?);
        let build = r.read_u16()?;
        let year = r.read_u16()?;
        let history = if r.is_empty() {
            None
        } else {
            Some((r.read_u32()?, r.read_u32()?))
        };
        r.expect_end()?;
        Ok(Self {
            version,
            bof_type,
            build,
            year,
            history,
        })
    }

    fn data_size(&self) -> usize {
        if self.history.is_some() { 16 } else { 8 }
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.bof_type.raw().to_le_bytes())?;
        writer.write_all(&self.build.to_le_bytes())?;
        writer.write_all(&self.year.to_le_bytes())?;
        if let Some((history, lowest)) = self.history {
            writer.write_all(&history.to_le_bytes())?;
            writer.write_all(&lowest.to_le_bytes())?;
        }
        Ok(())
    }
}

/// End of a substream.
///
/// Record type: 0x000A
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EofRecord;

impl BiffRecord for EofRecord {
    const SID: u16 = sid::EOF;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        LittleEndianReader::new(Self::SID, data).expect_end()?;
        Ok(EofRecord)
    }

    fn data_size(&self) -> usize {
        0
    }

    fn write_data<W: Write>(&self, _writer: &mut W) -> XlsResult<()> {
        Ok(())
    }
}

/// Used range of a sheet. Last row and last column are exclusive.
///
/// Record type: 0x0200
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DimensionsRecord {
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u16,
    pub last_col: u16,
    pub reserved: u16,
}

impl DimensionsRecord {
    pub fn new(first_row: u32, last_row: u32, first_col: u16, last_col: u16) -> Self {
        Self {
            first_row,
            last_row,
            first_col,
            last_col,
            reserved: 0,
        }
    }
}

impl BiffRecord for DimensionsRecord {
    const SID: u16 = sid::DIMENSIONS;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let out = Self {
            first_row: r.read_u32()?,
            last_row: r.read_u32()?,
            first_col: r.read_u16()?,
            last_col: r.read_u16()?,
            reserved: r.read_u16()?,
        };
        r.expect_end()?;
        Ok(out)
    }

    fn data_size(&self) -> usize {
        14
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.first_row.to_le_bytes())?;
        writer.write_all(&self.last_row.to_le_bytes())?;
        writer.write_all(&self.first_col.to_le_bytes())?;
        writer.write_all(&self.last_col.to_le_bytes())?;
        writer.write_all(&self.reserved.to_le_bytes())?;
        Ok(())
    }
}

bitflags! {
    /// WINDOW2 option bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Window2Flags: u16 {
        const DISPLAY_FORMULAS = 0x0001;
        const DISPLAY_GRIDLINES = 0x0002;
        const DISPLAY_ROW_COL_HEADINGS = 0x0004;
        const FREEZE_PANES = 0x0008;
        const DISPLAY_ZEROS = 0x0010;
        const DEFAULT_HEADER_COLOR = 0x0020;
        const ARABIC = 0x0040;
        const DISPLAY_GUTS = 0x0080;
        const FREEZE_PANES_NO_SPLIT = 0x0100;
        const SELECTED = 0x0200;
        const ACTIVE = 0x0400;
        const PAGE_BREAK_PREVIEW = 0x0800;
    }
}

/// Sheet window settings.
///
/// Record type: 0x023E
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTwoRecord {
    pub options: Window2Flags,
    pub top_row: u16,
    pub left_col: u16,
    pub header_color: u32,
    /// Zoom factors and reserved word; chart sheets omit them.
    pub zoom: Option<(u16, u16, u32)>,
}

impl Default for WindowTwoRecord {
    fn default() -> Self {
        Self {
            options: Window2Flags::from_bits_retain(0x06B6),
            top_row: 0,
            left_col: 0,
            header_color: 0x40,
            zoom: Some((0, 0, 0)),
        }
    }
}

impl WindowTwoRecord {
    pub fn flag(&self, flag: Window2Flags) -> bool {
        self.options.contains(flag)
    }

    pub fn set_flag(&mut self, flag: Window2Flags, value: bool) {
        self.options.set(flag, value);
    }
}

impl BiffRecord for WindowTwoRecord {
    const SID: u16 = sid::WINDOW2;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let options = Window2Flags::from_bits_retain(r.read_u16()?);
        let top_row = r.read_u16()?;
        let left_col = r.read_u16()?;
        let header_color = r.read_u32()?;
        let zoom = if r.is_empty() {
            None
        } else {
            Some((r.read_u16()?, r.read_u16()?, r.read_u32()?))
        };
        r.expect_end()?;
        Ok(Self {
            options,
            top_row,
            left_col,
            header_color,
            zoom,
        })
    }

    fn data_size(&self) -> usize {
        if self.zoom.is_some() { 18 } else { 10 }
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.options.bits().to_le_bytes())?;
        writer.write_all(&self.top_row.to_le_bytes())?;
        writer.write_all(&self.left_col.to_le_bytes())?;
        writer.write_all(&self.header_color.to_le_bytes())?;
        if let Some((page_break_zoom, normal_zoom, reserved)) = self.zoom {
            writer.write_all(&page_break_zoom.to_le_bytes())?;
            writer.write_all(&normal_zoom.to_le_bytes())?;
            writer.write_all(&reserved.to_le_bytes())?;
        }
        Ok(())
    }
}

/// A selected cell range inside a SELECTION record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionRef {
    pub first_row: u16,
    pub last_row: u16,
    pub first_col: u8,
    pub last_col: u8,
}

/// Selected cells in one pane.
///
/// Record type: 0x001D
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRecord {
    pub pane: u8,
    pub active_row: u16,
    pub active_col: u16,
    pub active_ref_index: u16,
    pub refs: Vec<SelectionRef>,
}

impl Default for SelectionRecord {
    /// Upper-left pane with A1 active.
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl SelectionRecord {
    pub const PANE_LOWER_RIGHT: u8 = 0;
    pub const PANE_UPPER_RIGHT: u8 = 1;
    pub const PANE_LOWER_LEFT: u8 = 2;
    pub const PANE_UPPER_LEFT: u8 = 3;

    pub fn new(active_row: u16, active_col: u16) -> Self {
        Self {
            pane: Self::PANE_UPPER_LEFT,
            active_row,
            active_col,
            active_ref_index: 0,
            refs: vec![SelectionRef {
                first_row: active_row,
                last_row: active_row,
                first_col: active_col as u8,
                last_col: active_col as u8,
            }],
        }
    }
}

impl BiffRecord for SelectionRecord {
    const SID: u16 = sid::SELECTION;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let pane = r.read_u8()?;
        let active_row = r.read_u16()?;
        let active_col = r.read_u16()?;
        let active_ref_index = r.read_u16()?;
        let count = r.read_u16()? as usize;
        let mut refs = Vec::with_capacity(count);
        for _ in 0..count {
            refs.push(SelectionRef {
                first_row: r.read_u16()?,
                last_row: r.read_u16()?,
                first_col: r.read_u8()?,
                last_col: r.read_u8()?,
            });
        }
        r.expect_end()?;
        Ok(Self {
            pane,
            active_row,
            active_col,
            active_ref_index,
            refs,
        })
    }

    fn data_size(&self) -> usize {
        9 + self.refs.len() * 6
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&[self.pane])?;
        writer.write_all(&self.active_row.to_le_bytes())?;
        writer.write_all(&self.active_col.to_le_bytes())?;
        writer.write_all(&self.active_ref_index.to_le_bytes())?;
        writer.write_all(&(self.refs.len() as u16).to_le_bytes())?;
        for r in &self.refs {
            writer.write_all(&r.first_row.to_le_bytes())?;
            writer.write_all(&r.last_row.to_le_bytes())?;
            writer.write_all(&[r.first_col, r.last_col])?;
        }
        Ok(())
    }
}

/// Frozen or split pane position.
///
/// Record type: 0x0041
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaneRecord {
    /// Horizontal split position (column count when frozen).
    pub x: u16,
    /// Vertical split position (row count when frozen).
    pub y: u16,
    pub top_row: u16,
    pub left_col: u16,
    pub active_pane: u16,
}

impl PaneRecord {
    pub const ACTIVE_PANE_LOWER_RIGHT: u16 = 0;
    pub const ACTIVE_PANE_UPPER_RIGHT: u16 = 1;
    pub const ACTIVE_PANE_LOWER_LEFT: u16 = 2;
    pub const ACTIVE_PANE_UPPER_LEFT: u16 = 3;
}

impl BiffRecord for PaneRecord {
    const SID: u16 = sid::PANE;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let out = Self {
            x: r.read_u16()?,
            y: r.read_u16()?,
            top_row: r.read_u16()?,
            left_col: r.read_u16()?,
            active_pane: r.read_u16()?,
        };
        r.expect_end()?;
        Ok(out)
    }

    fn data_size(&self) -> usize {
        10
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        for v in [self.x, self.y, self.top_row, self.left_col, self.active_pane] {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Default height for rows without a ROW record.
///
/// Record type: 0x0225
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRowHeightRecord {
    pub options: u16,
    /// Height in twips.
    pub height: u16,
}

impl Default for DefaultRowHeightRecord {
    fn default() -> Self {
        Self {
            options: 0,
            height: 0x00FF,
        }
    }
}

impl BiffRecord for DefaultRowHeightRecord {
    const SID: u16 = sid::DEFAULTROWHEIGHT;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let out = Self {
            options: r.read_u16()?,
            height: r.read_u16()?,
        };
        r.expect_end()?;
        Ok(out)
    }

    fn data_size(&self) -> usize {
        4
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.options.to_le_bytes())?;
        writer.write_all(&self.height.to_le_bytes())?;
        Ok(())
    }
}

/// Space taken by outline symbols.
///
/// Record type: 0x0080
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GutsRecord {
    pub left_row_gutter: u16,
    pub top_col_gutter: u16,
    pub row_level_max: u16,
    pub col_level_max: u16,
}

impl BiffRecord for GutsRecord {
    const SID: u16 = sid::GUTS;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let out = Self {
            left_row_gutter: r.read_u16()?,
            top_col_gutter: r.read_u16()?,
            row_level_max: r.read_u16()?,
            col_level_max: r.read_u16()?,
        };
        r.expect_end()?;
        Ok(out)
    }

    fn data_size(&self) -> usize {
        8
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        for v in [
            self.left_row_gutter,
            self.top_col_gutter,
            self.row_level_max,
            self.col_level_max,
        ] {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }
}

/// Marks a sheet whose formulas were not recalculated before saving.
///
/// Record type: 0x005E
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UncalcedRecord {
    pub reserved: u16,
}

impl BiffRecord for UncalcedRecord {
    const SID: u16 = sid::UNCALCED;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        // Some writers emit the record without its reserved word.
        let reserved = if r.is_empty() { 0 } else { r.read_u16()? };
        r.expect_end()?;
        Ok(Self { reserved })
    }

    fn data_size(&self) -> usize {
        2
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.reserved.to_le_bytes())?;
        Ok(())
    }
}

/// Require `record` to be a BOF, returning it.
pub(crate) fn expect_bof(record: &super::Record) -> XlsResult<&BofRecord> {
    match record {
        super::Record::Bof(bof) => Ok(bof),
        other => Err(XlsError::UnexpectedRecordType {
            expected: sid::BOF,
            found: other.sid(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode<T: BiffRecord>(record: &T) -> Vec<u8> {
        let mut out = Vec::new();
        record.write_data(&mut out).unwrap();
        out
    }

    #[test]
    fn test_bof_long_and_short_forms() {
        let bof = BofRecord::new(BofType::Worksheet);
        let bytes = encode(&bof);
        assert_eq!(bytes.len(), 16);
        assert_eq!(BofRecord::parse(&bytes).unwrap(), bof);

        let short = BofRecord::parse(&bytes[..8]).unwrap();
        assert!(short.history.is_none());
        assert_eq!(encode(&short), &bytes[..8]);
    }

    #[test]
    fn test_window2_default_flags() {
        let w = WindowTwoRecord::default();
        assert!(w.flag(Window2Flags::DISPLAY_GRIDLINES));
        assert!(w.flag(Window2Flags::SELECTED));
        assert!(!w.flag(Window2Flags::FREEZE_PANES));
        assert_eq!(encode(&w).len(), 18);
    }

    #[test]
    fn test_window2_chart_form_round_trips() {
        let bytes = [0xB6, 0x06, 0, 0, 0, 0, 0x40, 0, 0, 0];
        let w = WindowTwoRecord::parse(&bytes).unwrap();
        assert!(w.zoom.is_none());
        assert_eq!(encode(&w), bytes);
    }

    #[test]
    fn test_selection_round_trip() {
        let sel = SelectionRecord::new(4, 2);
        let bytes = encode(&sel);
        assert_eq!(bytes.len(), 15);
        assert_eq!(SelectionRecord::parse(&bytes).unwrap(), sel);
    }

    #[test]
    fn test_dimensions_layout() {
        let dims = DimensionsRecord::new(1, 10, 2, 5);
        let bytes = encode(&dims);
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &10u32.to_le_bytes());
        assert_eq!(DimensionsRecord::parse(&bytes).unwrap(), dims);
    }
}
