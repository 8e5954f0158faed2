//! Merged regions of a sheet.

use super::{RecordAggregate, RecordStream};
use crate::common::error::{XlsError, XlsResult};
use crate::records::{CellRangeAddress, MergeCellsRecord, Record};

/// All merged regions, written as as many MERGECELLS records as needed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergedCellsTable {
    regions: Vec<CellRangeAddress>,
}

impl MergedCellsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a contiguous run of MERGECELLS records.
    pub fn read(&mut self, rs: &mut RecordStream<'_>) {
        while let Some(Record::MergeCells(rec)) = rs.peek() {
            self.regions.extend_from_slice(&rec.regions);
            rs.next();
        }
    }

    pub fn add_region(&mut self, region: CellRangeAddress) -> usize {
        self.regions.push(region);
        self.regions.len() - 1
    }

    pub fn remove_region(&mut self, index: usize) -> XlsResult<CellRangeAddress> {
        if index >= self.regions.len() {
            return Err(XlsError::invalid_argument(format!(
                "merged region {} does not exist ({} regions)",
                index,
                self.regions.len()
            )));
        }
        Ok(self.regions.remove(index))
    }

    pub fn region(&self, index: usize) -> Option<&CellRangeAddress> {
        self.regions.get(index)
    }

    pub fn regions(&self) -> &[CellRangeAddress] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region containing the cell, if any.
    pub fn region_at(&self, row: u32, col: u16) -> Option<&CellRangeAddress> {
        self.regions.iter().find(|r| r.contains(row, col))
    }
}

impl RecordAggregate for MergedCellsTable {
    fn visit_contained_records(&self, visitor: &mut dyn FnMut(Record)) {
        for chunk in self.regions.chunks(MergeCellsRecord::MAX_REGIONS) {
            visitor(Record::MergeCells(MergeCellsRecord::new(chunk.to_vec())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(r: u32) -> CellRangeAddress {
        CellRangeAddress::new(r, r + 1, 0, 1).unwrap()
    }

    #[test]
    fn test_chunks_at_record_limit() {
        let mut table = MergedCellsTable::new();
        for r in 0..2100 {
            table.add_region(region(r * 2));
        }
        let records = table.records();
        assert_eq!(records.len(), 3);
        let Record::MergeCells(first) = &records[0] else {
            panic!("expected MERGECELLS");
        };
        assert_eq!(first.regions.len(), 1027);

        let mut reread = MergedCellsTable::new();
        reread.read(&mut RecordStream::new(&records));
        assert_eq!(reread, table);
    }

    #[test]
    fn test_empty_table_writes_nothing() {
        let table = MergedCellsTable::new();
        assert!(table.records().is_empty());
        assert_eq!(table.serialized_size(), 0);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut table = MergedCellsTable::new();
        table.add_region(region(0));
        assert!(table.remove_region(3).is_err());
        assert_eq!(table.remove_region(0).unwrap(), region(0));
        assert!(table.region_at(0, 0).is_none());
    }
}
