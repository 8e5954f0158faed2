//! Record aggregates.
//!
//! An aggregate folds a contiguous run of records into one logical table
//! (row blocks, merged regions, conditional formats, ...) and flattens it
//! back into records on write. Constructors read from a [`RecordStream`]
//! and stop at the first record outside their grammar.

pub mod cond_formatting;
pub mod column_info;
pub mod data_validity;
pub mod link_table;
pub mod merged_cells;
pub mod page_settings;
pub mod record_orderer;
pub mod row_blocks;
pub mod stream;

pub use cond_formatting::{CfRecordsAggregate, ConditionalFormattingTable};
pub use column_info::ColumnInfoRecordsAggregate;
pub use data_validity::DataValidityTable;
pub use link_table::LinkTable;
pub use merged_cells::MergedCellsTable;
pub use page_settings::{Margin, PageSettingsBlock};
pub use record_orderer::{SheetComponent, SheetItem, find_insert_position};
pub use row_blocks::{CellRecord, FormulaCell, RowRecordsAggregate};
pub use stream::RecordStream;

use crate::records::Record;

/// A logical group of records that is written as a contiguous run.
pub trait RecordAggregate {
    /// Emit the member records in on-disk order.
    fn visit_contained_records(&self, visitor: &mut dyn FnMut(Record));

    /// Encoded size of all member records.
    fn serialized_size(&self) -> usize {
        let mut size = 0;
        self.visit_contained_records(&mut |r| size += r.serialized_size());
        size
    }

    /// Member records as a list.
    fn records(&self) -> Vec<Record> {
        let mut out = Vec::new();
        self.visit_contained_records(&mut |r| out.push(r));
        out
    }
}
