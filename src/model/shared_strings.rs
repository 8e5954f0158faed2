//! Workbook-wide shared string table.

use crate::records::{SstRecord, UnicodeString};
use std::collections::HashMap;

/// SST with a lookup map so that equal strings share one entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SharedStrings {
    record: SstRecord,
    lookup: HashMap<String, u32>,
}

impl SharedStrings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a decoded SST. When the table holds duplicates the first entry
    /// wins for new lookups.
    pub fn from_record(record: SstRecord) -> Self {
        let mut lookup = HashMap::with_capacity(record.len());
        for (i, s) in record.strings.iter().enumerate() {
            lookup.entry(s.text().to_string()).or_insert(i as u32);
        }
        Self { record, lookup }
    }

    /// Index of `text`, adding it when new. Every call counts as one more
    /// reference from a LABELSST cell.
    pub fn add(&mut self, text: &str) -> u32 {
        self.record.total_refs = self.record.total_refs.saturating_add(1);
        if let Some(&index) = self.lookup.get(text) {
            return index;
        }
        let index = self.record.push(UnicodeString::new(text));
        self.lookup.insert(text.to_string(), index);
        index
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.record.get(index).map(UnicodeString::text)
    }

    pub fn index_of(&self, text: &str) -> Option<u32> {
        self.lookup.get(text).copied()
    }

    /// Number of unique strings.
    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn total_refs(&self) -> u32 {
        self.record.total_refs
    }

    pub fn record(&self) -> &SstRecord {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_deduplicates() {
        let mut sst = SharedStrings::new();
        assert_eq!(sst.add("alpha"), 0);
        assert_eq!(sst.add("beta"), 1);
        assert_eq!(sst.add("alpha"), 0);
        assert_eq!(sst.len(), 2);
        assert_eq!(sst.total_refs(), 3);
        assert_eq!(sst.get(1), Some("beta"));
    }

    #[test]
    fn test_from_record_keeps_first_duplicate() {
        let mut record = SstRecord::new();
        record.push(UnicodeString::new("x"));
        record.push(UnicodeString::new("x"));
        let sst = SharedStrings::from_record(record);
        assert_eq!(sst.index_of("x"), Some(0));
        assert_eq!(sst.len(), 2);
    }
}
