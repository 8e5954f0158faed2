//! COLINFO: width, style and outline state of a run of columns.

use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use std::io::Write;

const HIDDEN: u16 = 0x0001;
const OUTLINE_MASK: u16 = 0x0700;
const OUTLINE_SHIFT: u16 = 8;
const COLLAPSED: u16 = 0x1000;

/// Record type: 0x007D
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfoRecord {
    pub first_col: u16,
    pub last_col: u16,
    /// Width in 1/256 of a character.
    pub width: u16,
    pub xf_index: u16,
    pub options: u16,
    /// Trailing field; absent in some writers, in which case it stays `None`.
    pub reserved: Option<u16>,
}

impl Default for ColumnInfoRecord {
    fn default() -> Self {
        Self {
            first_col: 0,
            last_col: 0,
            width: 2275,
            xf_index: 0x0F,
            options: 2,
            reserved: Some(0),
        }
    }
}

impl ColumnInfoRecord {
    pub fn new(first_col: u16, last_col: u16) -> Self {
        Self {
            first_col,
            last_col,
            ..Self::default()
        }
    }

    pub fn contains(&self, col: u16) -> bool {
        (self.first_col..=self.last_col).contains(&col)
    }

    pub fn is_hidden(&self) -> bool {
        self.options & HIDDEN != 0
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.set_option(HIDDEN, hidden);
    }

    pub fn outline_level(&self) -> u8 {
        ((self.options & OUTLINE_MASK) >> OUTLINE_SHIFT) as u8
    }

    pub fn set_outline_level(&mut self, level: u8) {
        self.options =
            (self.options & !OUTLINE_MASK) | ((u16::from(level.min(7)) << OUTLINE_SHIFT) & OUTLINE_MASK);
    }

    pub fn is_collapsed(&self) -> bool {
        self.options & COLLAPSED != 0
    }

    pub fn set_collapsed(&mut self, collapsed: bool) {
        self.set_option(COLLAPSED, collapsed);
    }

    fn set_option(&mut self, bit: u16, on: bool) {
        if on {
            self.options |= bit;
        } else {
            self.options &= !bit;
        }
    }

    /// Whether both records describe columns the same way.
    pub fn format_matches(&self, other: &ColumnInfoRecord) -> bool {
        self.width == other.width && self.xf_index == other.xf_index && self.options == other.options
    }

    /// Whether `other` starts right after this record ends.
    pub fn is_adjacent_before(&self, other: &ColumnInfoRecord) -> bool {
        self.last_col as u32 + 1 == other.first_col as u32
    }
}

impl BiffRecord for ColumnInfoRecord {
    const SID: u16 = sid::COLINFO;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let first_col = r.read_u16()?;
        let last_col = r.read_u16()?;
        let width = r.read_u16()?;
        let xf_index = r.read_u16()?;
        let options = r.read_u16()?;
        let reserved = match r.remaining() {
            0 => None,
            // Some writers emit a single trailing byte.
            1 => Some(u16::from(r.read_u8()?)),
            2 => Some(r.read_u16()?),
            n => {
                return Err(XlsError::InvalidLength {
                    sid: Self::SID,
                    expected: 12,
                    found: 10 + n,
                });
            },
        };
        Ok(Self {
            first_col,
            last_col,
            width,
            xf_index,
            options,
            reserved,
        })
    }

    fn data_size(&self) -> usize {
        12
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        for v in [
            self.first_col,
            self.last_col,
            self.width,
            self.xf_index,
            self.options,
            self.reserved.unwrap_or(0),
        ] {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_bits() {
        let mut c = ColumnInfoRecord::new(2, 4);
        c.set_hidden(true);
        c.set_outline_level(3);
        c.set_collapsed(true);
        assert!(c.is_hidden());
        assert_eq!(c.outline_level(), 3);
        assert!(c.is_collapsed());
        c.set_outline_level(9);
        assert_eq!(c.outline_level(), 7);
        c.set_hidden(false);
        assert!(!c.is_hidden());
        assert!(c.contains(4));
        assert!(!c.contains(5));
    }

    #[test]
    fn test_short_record_is_padded_on_write() {
        let data = [0, 0, 1, 0, 0x00, 0x10, 0x0F, 0, 2, 0];
        let rec = ColumnInfoRecord::parse(&data).unwrap();
        assert_eq!(rec.reserved, None);
        let mut out = Vec::new();
        rec.write_data(&mut out).unwrap();
        assert_eq!(out.len(), 12);
        assert_eq!(&out[..10], &data);
    }
}
