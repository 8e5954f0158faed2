//! Merged cell regions.

use super::cell::{MAX_COLUMN, MAX_ROW};
use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use std::io::Write;

/// Inclusive rectangle of cells with 16-bit bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellRangeAddress {
    pub first_row: u16,
    pub last_row: u16,
    pub first_col: u16,
    pub last_col: u16,
}

impl CellRangeAddress {
    /// Encoded size of one range.
    pub const ENCODED_SIZE: usize = 8;

    /// Validated range; bounds must be ordered and inside the sheet grid.
    pub fn new(first_row: u32, last_row: u32, first_col: u16, last_col: u16) -> XlsResult<Self> {
        if first_row > last_row || first_col > last_col {
            return Err(XlsError::invalid_argument(format!(
                "range rows {}..{} cols {}..{} are not ordered",
                first_row, last_row, first_col, last_col
            )));
        }
        if last_row > MAX_ROW || last_col > MAX_COLUMN {
            return Err(XlsError::invalid_argument(format!(
                "range ending at row {} col {} is outside the sheet",
                last_row, last_col
            )));
        }
        Ok(Self {
            first_row: first_row as u16,
            last_row: last_row as u16,
            first_col,
            last_col,
        })
    }

    pub fn contains(&self, row: u32, col: u16) -> bool {
        (self.first_row as u32..=self.last_row as u32).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }

    pub fn intersects(&self, other: &CellRangeAddress) -> bool {
        self.first_row <= other.last_row
            && other.first_row <= self.last_row
            && self.first_col <= other.last_col
            && other.first_col <= self.last_col
    }

    pub fn cell_count(&self) -> u64 {
        (self.last_row as u64 - self.first_row as u64 + 1)
            * (self.last_col as u64 - self.first_col as u64 + 1)
    }

    pub fn read(r: &mut LittleEndianReader<'_>) -> XlsResult<Self> {
        Ok(Self {
            first_row: r.read_u16()?,
            last_row: r.read_u16()?,
            first_col: r.read_u16()?,
            last_col: r.read_u16()?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        for v in [self.first_row, self.last_row, self.first_col, self.last_col] {
            writer.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }
}

/// List of merged regions.
///
/// Record type: 0x00E5
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeCellsRecord {
    pub regions: Vec<CellRangeAddress>,
}

impl MergeCellsRecord {
    /// Most regions a single record can carry within the payload limit.
    pub const MAX_REGIONS: usize = 1027;

    pub fn new(regions: Vec<CellRangeAddress>) -> Self {
        Self { regions }
    }
}

impl BiffRecord for MergeCellsRecord {
    const SID: u16 = sid::MERGECELLS;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let count = r.read_u16()? as usize;
        if r.remaining() != count * CellRangeAddress::ENCODED_SIZE {
            return Err(XlsError::InvalidLength {
                sid: Self::SID,
                expected: 2 + count * CellRangeAddress::ENCODED_SIZE,
                found: data.len(),
            });
        }
        let mut regions = Vec::with_capacity(count);
        for _ in 0..count {
            regions.push(CellRangeAddress::read(&mut r)?);
        }
        Ok(Self { regions })
    }

    fn data_size(&self) -> usize {
        2 + self.regions.len() * CellRangeAddress::ENCODED_SIZE
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&(self.regions.len() as u16).to_le_bytes())?;
        for region in &self.regions {
            region.write(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_validation() {
        assert!(CellRangeAddress::new(2, 1, 0, 0).is_err());
        assert!(CellRangeAddress::new(0, 0, 3, 2).is_err());
        assert!(CellRangeAddress::new(0, 70000, 0, 0).is_err());
        assert!(CellRangeAddress::new(0, 0, 0, 256).is_err());
        let r = CellRangeAddress::new(1, 3, 1, 2).unwrap();
        assert_eq!(r.cell_count(), 6);
        assert!(r.contains(2, 2));
        assert!(!r.contains(4, 2));
    }

    #[test]
    fn test_intersects() {
        let a = CellRangeAddress::new(0, 2, 0, 2).unwrap();
        let b = CellRangeAddress::new(2, 4, 2, 4).unwrap();
        let c = CellRangeAddress::new(3, 4, 0, 1).unwrap();
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_max_regions_fit_one_record() {
        let rec = MergeCellsRecord::new(vec![CellRangeAddress::default(); MergeCellsRecord::MAX_REGIONS]);
        assert!(rec.data_size() <= super::super::MAX_RECORD_DATA_SIZE);
    }

    #[test]
    fn test_count_mismatch_rejected() {
        let data = [2, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(MergeCellsRecord::parse(&data).unwrap_err().is_format_error());
    }
}
