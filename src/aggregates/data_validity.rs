//! Data validation table: one DVAL followed by its DV records.

use super::{RecordAggregate, RecordStream};
use crate::common::error::{XlsError, XlsResult};
use crate::records::{DvRecord, DvalRecord, Record, sid};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValidityTable {
    header: DvalRecord,
    validations: Vec<DvRecord>,
}

impl DataValidityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read DVAL and the DV records that follow it.
    pub fn read(rs: &mut RecordStream<'_>) -> XlsResult<Self> {
        let Record::Dval(header) = rs.expect(sid::DVAL)? else {
            return Err(XlsError::MissingRecord("DVAL"));
        };
        let mut validations = Vec::new();
        while let Some(Record::Dv(dv)) = rs.peek() {
            validations.push(dv.clone());
            rs.next();
        }
        Ok(Self {
            header: *header,
            validations,
        })
    }

    pub fn header(&self) -> &DvalRecord {
        &self.header
    }

    pub fn add_validation(&mut self, dv: DvRecord) -> usize {
        self.validations.push(dv);
        self.validations.len() - 1
    }

    pub fn validations(&self) -> &[DvRecord] {
        &self.validations
    }

    pub fn remove_validation(&mut self, index: usize) -> Option<DvRecord> {
        (index < self.validations.len()).then(|| self.validations.remove(index))
    }

    /// Validation rule applying to the cell, if any.
    pub fn validation_at(&self, row: u32, col: u16) -> Option<&DvRecord> {
        self.validations.iter().find(|dv| dv.applies_to(row, col))
    }

    pub fn len(&self) -> usize {
        self.validations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validations.is_empty()
    }
}

impl RecordAggregate for DataValidityTable {
    fn visit_contained_records(&self, visitor: &mut dyn FnMut(Record)) {
        if self.validations.is_empty() {
            return;
        }
        let mut header = self.header;
        header.dv_count = self.validations.len() as u32;
        visitor(Record::Dval(header));
        for dv in &self.validations {
            visitor(Record::Dv(dv.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Formula, Ptg};
    use crate::records::CellRangeAddress;
    use crate::records::validation::data_type;

    fn dv(first_row: u32) -> DvRecord {
        DvRecord::new(
            data_type::DECIMAL,
            0,
            Formula::new(vec![Ptg::Int(0)]),
            Formula::new(vec![Ptg::Int(10)]),
            vec![CellRangeAddress::new(first_row, first_row + 4, 1, 1).unwrap()],
        )
    }

    #[test]
    fn test_count_recomputed() {
        let mut table = DataValidityTable::new();
        table.add_validation(dv(0));
        table.add_validation(dv(10));
        let records = table.records();
        match &records[0] {
            Record::Dval(h) => assert_eq!(h.dv_count, 2),
            other => panic!("unexpected {:?}", other),
        }
        let reread = DataValidityTable::read(&mut RecordStream::new(&records)).unwrap();
        assert_eq!(reread.len(), 2);
        assert!(reread.validation_at(12, 1).is_some());
        assert!(reread.validation_at(12, 2).is_none());
    }

    #[test]
    fn test_empty_table_writes_nothing() {
        assert!(DataValidityTable::new().records().is_empty());
    }
}
