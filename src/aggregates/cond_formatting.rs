//! Conditional formatting: CFHEADER blocks and their rules.

use super::{RecordAggregate, RecordStream};
use crate::common::error::{XlsError, XlsResult};
use crate::records::{CellRangeAddress, CfHeaderRecord, CfRuleRecord, Record, sid};
use log::debug;
use smallvec::SmallVec;

/// One CFHEADER with its rules. The header's rule count always matches.
#[derive(Debug, Clone, PartialEq)]
pub struct CfRecordsAggregate {
    header: CfHeaderRecord,
    rules: SmallVec<[CfRuleRecord; 3]>,
}

impl CfRecordsAggregate {
    /// Excel allows at most three rules per block.
    pub const MAX_RULES: usize = 3;

    pub fn new(ranges: Vec<CellRangeAddress>, rules: Vec<CfRuleRecord>) -> XlsResult<Self> {
        if ranges.is_empty() {
            return Err(XlsError::invalid_argument(
                "conditional format needs at least one range",
            ));
        }
        if rules.is_empty() || rules.len() > Self::MAX_RULES {
            return Err(XlsError::invalid_argument(format!(
                "conditional format takes 1..={} rules, got {}",
                Self::MAX_RULES,
                rules.len()
            )));
        }
        Ok(Self {
            header: CfHeaderRecord::new(ranges, rules.len() as u16),
            rules: SmallVec::from_vec(rules),
        })
    }

    /// Read a CFHEADER and the CFRULE records it announces.
    pub fn read(rs: &mut RecordStream<'_>) -> XlsResult<Self> {
        let Record::CfHeader(header) = rs.expect(sid::CFHEADER)? else {
            return Err(XlsError::MissingRecord("CFHEADER"));
        };
        let mut rules = SmallVec::with_capacity(header.rule_count as usize);
        for _ in 0..header.rule_count {
            match rs.next() {
                Some(Record::CfRule(rule)) => rules.push(rule.clone()),
                Some(other) => {
                    return Err(XlsError::UnexpectedRecordType {
                        expected: sid::CFRULE,
                        found: other.sid(),
                    });
                },
                None => return Err(XlsError::UnexpectedEndOfStream),
            }
        }
        Ok(Self {
            header: header.clone(),
            rules,
        })
    }

    pub fn header(&self) -> &CfHeaderRecord {
        &self.header
    }

    pub fn ranges(&self) -> &[CellRangeAddress] {
        &self.header.ranges
    }

    pub fn set_ranges(&mut self, ranges: Vec<CellRangeAddress>) {
        self.header.set_ranges(ranges);
    }

    pub fn rules(&self) -> &[CfRuleRecord] {
        &self.rules
    }

    pub fn rule(&self, index: usize) -> Option<&CfRuleRecord> {
        self.rules.get(index)
    }

    pub fn add_rule(&mut self, rule: CfRuleRecord) -> XlsResult<()> {
        if self.rules.len() >= Self::MAX_RULES {
            return Err(XlsError::invalid_argument(format!(
                "conditional format already has {} rules",
                Self::MAX_RULES
            )));
        }
        self.rules.push(rule);
        self.header.rule_count = self.rules.len() as u16;
        Ok(())
    }

    pub fn set_rule(&mut self, index: usize, rule: CfRuleRecord) -> XlsResult<()> {
        let slot = self.rules.get_mut(index).ok_or_else(|| {
            XlsError::invalid_argument(format!("rule {} does not exist", index))
        })?;
        *slot = rule;
        Ok(())
    }
}

impl RecordAggregate for CfRecordsAggregate {
    fn visit_contained_records(&self, visitor: &mut dyn FnMut(Record)) {
        let mut header = self.header.clone();
        header.rule_count = self.rules.len() as u16;
        visitor(Record::CfHeader(header));
        for rule in &self.rules {
            visitor(Record::CfRule(rule.clone()));
        }
    }
}

/// All conditional format blocks of a sheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConditionalFormattingTable {
    entries: Vec<CfRecordsAggregate>,
}

impl ConditionalFormattingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume consecutive CFHEADER blocks.
    pub fn read(&mut self, rs: &mut RecordStream<'_>) -> XlsResult<()> {
        while rs.peek_sid() == Some(sid::CFHEADER) {
            self.entries.push(CfRecordsAggregate::read(rs)?);
        }
        debug!("read {} conditional format blocks", self.entries.len());
        Ok(())
    }

    pub fn add(&mut self, cf: CfRecordsAggregate) -> usize {
        self.entries.push(cf);
        self.entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&CfRecordsAggregate> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CfRecordsAggregate> {
        self.entries.get_mut(index)
    }

    pub fn remove(&mut self, index: usize) -> XlsResult<CfRecordsAggregate> {
        if index >= self.entries.len() {
            return Err(XlsError::invalid_argument(format!(
                "conditional format {} does not exist",
                index
            )));
        }
        Ok(self.entries.remove(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RecordAggregate for ConditionalFormattingTable {
    fn visit_contained_records(&self, visitor: &mut dyn FnMut(Record)) {
        for entry in &self.entries {
            entry.visit_contained_records(visitor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Formula, Ptg};
    use crate::records::cf::comparison;

    fn rule(n: u16) -> CfRuleRecord {
        CfRuleRecord::cell_value(
            comparison::GREATER_THAN,
            Formula::new(vec![Ptg::Int(n)]),
            None,
        )
    }

    fn range() -> CellRangeAddress {
        CellRangeAddress::new(0, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_rule_count_kept_in_sync() {
        let mut cf = CfRecordsAggregate::new(vec![range()], vec![rule(1)]).unwrap();
        cf.add_rule(rule(2)).unwrap();
        cf.add_rule(rule(3)).unwrap();
        assert!(cf.add_rule(rule(4)).is_err());
        let records = cf.records();
        assert_eq!(records.len(), 4);
        match &records[0] {
            Record::CfHeader(h) => assert_eq!(h.rule_count, 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_table_round_trip() {
        let mut table = ConditionalFormattingTable::new();
        table.add(CfRecordsAggregate::new(vec![range()], vec![rule(1)]).unwrap());
        table.add(CfRecordsAggregate::new(vec![range()], vec![rule(2), rule(3)]).unwrap());
        let records = table.records();
        let mut reread = ConditionalFormattingTable::new();
        let mut rs = RecordStream::new(&records);
        reread.read(&mut rs).unwrap();
        assert_eq!(rs.count_read(), records.len());
        assert_eq!(reread, table);
    }

    #[test]
    fn test_missing_rule_is_format_error() {
        let header = CfHeaderRecord::new(vec![range()], 2);
        let records = vec![Record::CfHeader(header), Record::CfRule(rule(1))];
        let err = CfRecordsAggregate::read(&mut RecordStream::new(&records)).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_rejects_empty_ranges() {
        assert!(CfRecordsAggregate::new(Vec::new(), vec![rule(1)]).is_err());
    }
}
