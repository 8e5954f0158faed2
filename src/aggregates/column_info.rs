//! Column descriptors.
//!
//! COLINFO records cover disjoint column runs and are kept sorted. Setting a
//! property on one column splits the run containing it; adjacent runs that
//! end up formatted alike are merged back together.

use super::{RecordAggregate, RecordStream};
use crate::records::{ColumnInfoRecord, Record};

/// Fields to change on a column; `None` leaves the field alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnChange {
    pub xf_index: Option<u16>,
    pub width: Option<u16>,
    pub level: Option<u8>,
    pub hidden: Option<bool>,
    pub collapsed: Option<bool>,
}

impl ColumnChange {
    fn apply(&self, ci: &mut ColumnInfoRecord) {
        if let Some(xf) = self.xf_index {
            ci.xf_index = xf;
        }
        if let Some(width) = self.width {
            ci.width = width;
        }
        if let Some(level) = self.level {
            ci.set_outline_level(level);
        }
        if let Some(hidden) = self.hidden {
            ci.set_hidden(hidden);
        }
        if let Some(collapsed) = self.collapsed {
            ci.set_collapsed(collapsed);
        }
    }

    fn changes(&self, ci: &ColumnInfoRecord) -> bool {
        self.xf_index.is_some_and(|v| v != ci.xf_index)
            || self.width.is_some_and(|v| v != ci.width)
            || self.level.is_some_and(|v| v != ci.outline_level())
            || self.hidden.is_some_and(|v| v != ci.is_hidden())
            || self.collapsed.is_some_and(|v| v != ci.is_collapsed())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnInfoRecordsAggregate {
    records: Vec<ColumnInfoRecord>,
}

impl ColumnInfoRecordsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a contiguous run of COLINFO records.
    pub fn read(&mut self, rs: &mut RecordStream<'_>) {
        while let Some(Record::ColumnInfo(ci)) = rs.peek() {
            self.insert_sorted(*ci);
            rs.next();
        }
    }

    fn insert_sorted(&mut self, ci: ColumnInfoRecord) {
        let pos = self
            .records
            .partition_point(|existing| existing.first_col < ci.first_col);
        self.records.insert(pos, ci);
    }

    pub fn records_slice(&self) -> &[ColumnInfoRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn find_index(&self, col: u16, start: usize) -> Option<usize> {
        (start..self.records.len()).find(|&i| self.records[i].contains(col))
    }

    /// Record describing `col`.
    pub fn find_column_info(&self, col: u16) -> Option<&ColumnInfoRecord> {
        self.find_index(col, 0).map(|i| &self.records[i])
    }

    pub fn max_outline_level(&self) -> u8 {
        self.records
            .iter()
            .map(ColumnInfoRecord::outline_level)
            .max()
            .unwrap_or(0)
    }

    /// Apply `change` to a single column.
    pub fn set_column(&mut self, col: u16, change: ColumnChange) {
        let mut k = 0;
        let mut found = None;
        while k < self.records.len() {
            let ci = &self.records[k];
            if ci.contains(col) {
                found = Some(k);
                break;
            }
            if ci.first_col > col {
                break;
            }
            k += 1;
        }

        let Some(k) = found else {
            let mut nci = ColumnInfoRecord::new(col, col);
            change.apply(&mut nci);
            self.records.insert(k, nci);
            self.attempt_merge(k);
            return;
        };

        let ci = self.records[k];
        if !change.changes(&ci) {
            return;
        }

        if ci.first_col == col && ci.last_col == col {
            change.apply(&mut self.records[k]);
            self.attempt_merge(k);
            return;
        }

        let mut nci = ci;
        nci.first_col = col;
        nci.last_col = col;
        change.apply(&mut nci);

        if ci.first_col == col {
            self.records[k].first_col = col + 1;
            self.records.insert(k, nci);
            self.attempt_merge(k);
        } else if ci.last_col == col {
            self.records[k].last_col = col - 1;
            self.records.insert(k + 1, nci);
            self.attempt_merge(k + 1);
        } else {
            let mut after = ci;
            after.first_col = col + 1;
            self.records[k].last_col = col - 1;
            self.records.insert(k + 1, nci);
            self.records.insert(k + 2, after);
        }
    }

    /// Apply `change` to every column of `first..=last`.
    pub fn set_columns(&mut self, first: u16, last: u16, change: ColumnChange) {
        for col in first..=last {
            self.set_column(col, change);
        }
    }

    /// Merge the record at `ix` with matching neighbours on both sides.
    fn attempt_merge(&mut self, ix: usize) {
        if ix + 1 < self.records.len() {
            self.merge_pair(ix);
        }
        if ix > 0 {
            self.merge_pair(ix - 1);
        }
    }

    fn merge_pair(&mut self, ix: usize) {
        let (a, b) = (self.records[ix], self.records[ix + 1]);
        if a.is_adjacent_before(&b) && a.format_matches(&b) {
            self.records[ix].last_col = b.last_col;
            self.records.remove(ix + 1);
        }
    }

    /// Raise (or lower) the outline level of a column range.
    pub fn group_column_range(&mut self, first: u16, last: u16, indent: bool) {
        let mut search_from = 0;
        for col in first..=last {
            let mut level = 1u8;
            if let Some(ix) = self.find_index(col, search_from) {
                let current = self.records[ix].outline_level();
                level = if indent {
                    (current + 1).min(7)
                } else {
                    current.saturating_sub(1)
                };
                search_from = ix.saturating_sub(1);
            }
            self.set_column(
                col,
                ColumnChange {
                    level: Some(level),
                    ..ColumnChange::default()
                },
            );
        }
    }

    fn find_start_of_group(&self, ix: usize) -> usize {
        let level = self.records[ix].outline_level();
        let mut start = ix;
        while start > 0 {
            let prev = &self.records[start - 1];
            if !prev.is_adjacent_before(&self.records[start]) || prev.outline_level() < level {
                break;
            }
            start -= 1;
        }
        start
    }

    fn find_end_of_group(&self, ix: usize) -> usize {
        let level = self.records[ix].outline_level();
        let mut end = ix;
        while end + 1 < self.records.len() {
            let next = &self.records[end + 1];
            if !self.records[end].is_adjacent_before(next) || next.outline_level() < level {
                break;
            }
            end += 1;
        }
        end
    }

    /// Hide or show the group starting at `ix`; returns its last column.
    fn set_group_hidden(&mut self, ix: usize, level: u8, hidden: bool) -> u16 {
        let mut idx = ix;
        loop {
            self.records[idx].set_hidden(hidden);
            if idx + 1 >= self.records.len() {
                break;
            }
            let next = self.records[idx + 1];
            if !self.records[idx].is_adjacent_before(&next) || next.outline_level() < level {
                break;
            }
            idx += 1;
        }
        self.records[idx].last_col
    }

    fn is_group_collapsed(&self, ix: usize) -> bool {
        let end = self.find_end_of_group(ix);
        match self.records.get(end + 1) {
            Some(next) => self.records[end].is_adjacent_before(next) && next.is_collapsed(),
            None => false,
        }
    }

    fn is_group_hidden_by_parent(&self, ix: usize) -> bool {
        let end = self.find_end_of_group(ix);
        let (end_level, end_hidden) = match self.records.get(end + 1) {
            Some(next) if self.records[end].is_adjacent_before(next) => {
                (next.outline_level(), next.is_hidden())
            },
            _ => (0, false),
        };
        let start = self.find_start_of_group(ix);
        let (start_level, start_hidden) = if start > 0 {
            let prev = &self.records[start - 1];
            if prev.is_adjacent_before(&self.records[start]) {
                (prev.outline_level(), prev.is_hidden())
            } else {
                (0, false)
            }
        } else {
            (0, false)
        };
        if start_level > end_level {
            start_hidden
        } else {
            end_hidden
        }
    }

    /// Hide the outline group containing `col` and mark it collapsed.
    pub fn collapse_column(&mut self, col: u16) {
        let Some(ix) = self.find_index(col, 0) else {
            return;
        };
        let start = self.find_start_of_group(ix);
        let level = self.records[start].outline_level();
        let last = self.set_group_hidden(start, level, true);
        if let Some(after) = last.checked_add(1) {
            self.set_column(
                after,
                ColumnChange {
                    collapsed: Some(true),
                    ..ColumnChange::default()
                },
            );
        }
    }

    /// Show a collapsed outline group containing `col`.
    pub fn expand_column(&mut self, col: u16) {
        let Some(ix) = self.find_index(col, 0) else {
            return;
        };
        if !self.is_group_collapsed(ix) {
            return;
        }
        let start = self.find_start_of_group(ix);
        let end = self.find_end_of_group(ix);
        let end_record = self.records[end];
        if !self.is_group_hidden_by_parent(ix) {
            let level = end_record.outline_level();
            for ci in &mut self.records[start..=end] {
                if ci.outline_level() == level {
                    ci.set_hidden(false);
                }
            }
        }
        if let Some(after) = end_record.last_col.checked_add(1) {
            self.set_column(
                after,
                ColumnChange {
                    collapsed: Some(false),
                    ..ColumnChange::default()
                },
            );
        }
    }
}

impl RecordAggregate for ColumnInfoRecordsAggregate {
    fn visit_contained_records(&self, visitor: &mut dyn FnMut(Record)) {
        for ci in &self.records {
            visitor(Record::ColumnInfo(*ci));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn width(w: u16) -> ColumnChange {
        ColumnChange {
            width: Some(w),
            ..ColumnChange::default()
        }
    }

    fn ranges(agg: &ColumnInfoRecordsAggregate) -> Vec<(u16, u16)> {
        agg.records_slice()
            .iter()
            .map(|ci| (ci.first_col, ci.last_col))
            .collect()
    }

    #[test]
    fn test_adjacent_columns_merge() {
        let mut agg = ColumnInfoRecordsAggregate::new();
        agg.set_column(2, width(3000));
        agg.set_column(3, width(3000));
        agg.set_column(1, width(3000));
        assert_eq!(ranges(&agg), vec![(1, 3)]);
        assert_eq!(agg.find_column_info(2).unwrap().width, 3000);
    }

    #[test]
    fn test_split_into_three() {
        let mut agg = ColumnInfoRecordsAggregate::new();
        agg.set_columns(0, 4, width(1000));
        assert_eq!(ranges(&agg), vec![(0, 4)]);
        agg.set_column(2, width(5000));
        assert_eq!(ranges(&agg), vec![(0, 1), (2, 2), (3, 4)]);
        agg.set_column(2, width(1000));
        assert_eq!(ranges(&agg), vec![(0, 4)]);
    }

    #[test]
    fn test_split_at_edges() {
        let mut agg = ColumnInfoRecordsAggregate::new();
        agg.set_columns(0, 3, width(1000));
        agg.set_column(0, width(2000));
        agg.set_column(3, width(2000));
        assert_eq!(ranges(&agg), vec![(0, 0), (1, 2), (3, 3)]);
    }

    #[test]
    fn test_group_collapse_expand() {
        let mut agg = ColumnInfoRecordsAggregate::new();
        agg.group_column_range(2, 4, true);
        assert_eq!(agg.max_outline_level(), 1);
        agg.collapse_column(3);
        for col in 2..=4 {
            assert!(agg.find_column_info(col).unwrap().is_hidden());
        }
        assert!(agg.find_column_info(5).unwrap().is_collapsed());

        agg.expand_column(3);
        for col in 2..=4 {
            assert!(!agg.find_column_info(col).unwrap().is_hidden());
        }
        assert!(!agg.find_column_info(5).unwrap().is_collapsed());
    }

    #[test]
    fn test_ungroup() {
        let mut agg = ColumnInfoRecordsAggregate::new();
        agg.group_column_range(0, 1, true);
        agg.group_column_range(0, 1, true);
        assert_eq!(agg.find_column_info(0).unwrap().outline_level(), 2);
        agg.group_column_range(0, 1, false);
        assert_eq!(agg.find_column_info(1).unwrap().outline_level(), 1);
    }
}
