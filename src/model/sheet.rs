//! Worksheet model.
//!
//! A sheet keeps its records in file order as a list of [`SheetItem`]s.
//! Plain records stay in the list; aggregates own their records and are
//! represented in the list by placeholders. Optional aggregates that a
//! loaded sheet lacks are created on first mutation and placed by
//! [`find_insert_position`].

use crate::aggregates::column_info::ColumnChange;
use crate::aggregates::{
    CfRecordsAggregate, ColumnInfoRecordsAggregate, ConditionalFormattingTable,
    DataValidityTable, MergedCellsTable, PageSettingsBlock, RecordAggregate, RecordStream,
    RowRecordsAggregate, SheetComponent, SheetItem, find_insert_position,
};
use crate::aggregates::row_blocks::CellRecord;
use crate::common::error::{XlsError, XlsResult};
use crate::config::ReadOptions;
use crate::records::cell::{MAX_COLUMN, check_coordinates};
use crate::records::sheet::expect_bof;
use crate::records::{
    BiffRecord, BofRecord, BofType, CalcCountRecord, CalcModeRecord, CellRangeAddress,
    DefaultColWidthRecord, DefaultRowHeightRecord, DeltaRecord, DimensionsRecord, EofRecord, GridsetRecord, GutsRecord,
    IndexRecord, IterationRecord, ObjectProtectRecord, PaneRecord, PasswordRecord,
    PrintGridlinesRecord, PrintHeadersRecord, ProtectRecord, Record, RefModeRecord, RowRecord,
    SaveRecalcRecord, ScenarioProtectRecord, SelectionRecord, SelectionRef, UncalcedRecord,
    Window2Flags, WindowTwoRecord, WsBoolRecord, sid,
};
use log::{debug, warn};
use std::io::Write;

/// Cell style used when neither the cell nor its column names one.
pub const DEFAULT_XF_INDEX: u16 = 0x0F;

/// Widest column Excel accepts, in 1/256 of a character.
const MAX_COLUMN_WIDTH: u16 = 255 * 256;

const MAX_OUTLINE_LEVEL: u8 = 7;

/// Split or freeze state read from the PANE record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaneInformation {
    /// Horizontal split position (columns when frozen, twips when split).
    pub x: u16,
    /// Vertical split position (rows when frozen, twips when split).
    pub y: u16,
    pub top_row: u16,
    pub left_col: u16,
    pub active_pane: u16,
    pub frozen: bool,
}

/// Which parts of a sheet are protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SheetProtection {
    pub sheet: bool,
    pub objects: bool,
    pub scenarios: bool,
}

/// Typed access to a singleton record kept in the item list.
macro_rules! singleton_record {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        #[allow(dead_code)]
        fn $get(&self) -> Option<&$ty> {
            self.items.iter().find_map(|item| match item {
                SheetItem::Record(Record::$variant(r)) => Some(r),
                _ => None,
            })
        }

        #[allow(dead_code)]
        fn $get_mut(&mut self) -> Option<&mut $ty> {
            self.items.iter_mut().find_map(|item| match item {
                SheetItem::Record(Record::$variant(r)) => Some(r),
                _ => None,
            })
        }
    };
}

/// One worksheet substream.
///
/// `Clone` is a deep copy: the clone shares no state with the original.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    items: Vec<SheetItem>,
    rows: RowRecordsAggregate,
    merged: MergedCellsTable,
    column_infos: ColumnInfoRecordsAggregate,
    cond_formats: Option<ConditionalFormattingTable>,
    data_validity: Option<DataValidityTable>,
    page_settings: Option<PageSettingsBlock>,
    uncalced: bool,
}

impl Sheet {
    /// A new empty worksheet with the records Excel writes for one.
    pub fn create() -> Self {
        let rec = |r: Record| SheetItem::Record(r);
        let items = vec![
            rec(BofRecord::new(BofType::Worksheet).into()),
            rec(CalcModeRecord { mode: 1 }.into()),
            rec(CalcCountRecord { iterations: 100 }.into()),
            rec(RefModeRecord { mode: 1 }.into()),
            rec(IterationRecord { enabled: 0 }.into()),
            rec(DeltaRecord { max_change: 0.001 }.into()),
            rec(SaveRecalcRecord { recalc: 1 }.into()),
            rec(PrintHeadersRecord { print_headers: 0 }.into()),
            rec(PrintGridlinesRecord { print_gridlines: 0 }.into()),
            rec(GridsetRecord { gridset: 1 }.into()),
            rec(GutsRecord::default().into()),
            rec(DefaultRowHeightRecord::default().into()),
            rec(WsBoolRecord { options: 0x04C1 }.into()),
            SheetItem::PageSettings,
            rec(DefaultColWidthRecord { width: 8 }.into()),
            SheetItem::ColumnInfos,
            rec(DimensionsRecord::new(0, 1, 0, 1).into()),
            SheetItem::Rows,
            rec(WindowTwoRecord::default().into()),
            rec(SelectionRecord::new(0, 0).into()),
            SheetItem::MergedCells,
            rec(EofRecord.into()),
        ];
        Self {
            items,
            rows: RowRecordsAggregate::new(),
            merged: MergedCellsTable::new(),
            column_infos: ColumnInfoRecordsAggregate::new(),
            cond_formats: None,
            data_validity: None,
            page_settings: Some(PageSettingsBlock::create()),
            uncalced: false,
        }
    }

    /// Build a sheet from a record list that starts with its BOF.
    pub fn from_records(records: &[Record], options: &ReadOptions) -> XlsResult<Self> {
        let mut rs = RecordStream::new(records);
        Self::read(&mut rs, options)
    }

    /// Consume one worksheet substream, BOF through the matching EOF.
    pub fn read(rs: &mut RecordStream<'_>, options: &ReadOptions) -> XlsResult<Self> {
        let bof = rs.next().ok_or(XlsError::UnexpectedEndOfStream)?;
        expect_bof(bof)?;

        let mut sheet = Self {
            items: vec![SheetItem::Record(bof.clone())],
            rows: RowRecordsAggregate::new(),
            merged: MergedCellsTable::new(),
            column_infos: ColumnInfoRecordsAggregate::new(),
            cond_formats: None,
            data_validity: None,
            page_settings: None,
            uncalced: false,
        };
        let mut have_rows = false;
        let mut have_columns = false;
        let mut have_merged = false;
        let mut have_eof = false;

        while let Some(next_sid) = rs.peek_sid() {
            if next_sid == sid::CFHEADER {
                if sheet.cond_formats.is_none() {
                    sheet.items.push(SheetItem::ConditionalFormats);
                }
                sheet
                    .cond_formats
                    .get_or_insert_with(ConditionalFormattingTable::new)
                    .read(rs)?;
                continue;
            }
            if next_sid == sid::COLINFO {
                if !have_columns {
                    sheet.items.push(SheetItem::ColumnInfos);
                    have_columns = true;
                }
                sheet.column_infos.read(rs);
                continue;
            }
            if next_sid == sid::DVAL {
                if sheet.data_validity.is_some() {
                    return Err(XlsError::invalid_record(
                        next_sid,
                        "more than one data validity table",
                    ));
                }
                sheet.data_validity = Some(DataValidityTable::read(rs)?);
                sheet.items.push(SheetItem::DataValidity);
                continue;
            }
            if sid::is_row_block_record(next_sid) {
                if have_rows {
                    return Err(XlsError::invalid_record(
                        next_sid,
                        "row or cell records found in the wrong place",
                    ));
                }
                sheet.rows = RowRecordsAggregate::read(rs, options)?;
                sheet.items.push(SheetItem::Rows);
                have_rows = true;
                continue;
            }
            if PageSettingsBlock::is_component(next_sid) {
                match sheet.page_settings.as_mut() {
                    Some(block) => block.merge_from(rs)?,
                    None => {
                        sheet.page_settings = Some(PageSettingsBlock::read(rs)?);
                        sheet.items.push(SheetItem::PageSettings);
                    },
                }
                continue;
            }
            if next_sid == sid::MERGECELLS {
                if !have_merged {
                    sheet.items.push(SheetItem::MergedCells);
                    have_merged = true;
                }
                sheet.merged.read(rs);
                continue;
            }
            if next_sid == sid::BOF {
                sheet.read_embedded_substream(rs)?;
                continue;
            }

            let Some(record) = rs.next() else { break };
            match next_sid {
                sid::INDEX => continue,
                sid::UNCALCED => {
                    sheet.uncalced = true;
                    continue;
                },
                sid::DIMENSIONS if !have_columns => {
                    sheet.items.push(SheetItem::ColumnInfos);
                    have_columns = true;
                },
                _ => {},
            }
            sheet.items.push(SheetItem::Record(record.clone()));
            if next_sid == sid::EOF {
                have_eof = true;
                break;
            }
        }

        if !have_eof {
            return Err(XlsError::UnexpectedEndOfStream);
        }
        if sheet.window_two().is_none() {
            return Err(XlsError::MissingRecord("WINDOW2"));
        }
        let Some(dims_at) = sheet.items.iter().position(|i| i.is_sid(sid::DIMENSIONS)) else {
            return Err(XlsError::MissingRecord("DIMENSIONS"));
        };
        if !have_rows {
            sheet.items.insert(dims_at + 1, SheetItem::Rows);
        }
        if !have_merged {
            sheet.insert_placeholder(SheetItem::MergedCells, SheetComponent::MergedCells);
        }
        debug!(
            "read worksheet: {} items, {} rows, {} cells",
            sheet.items.len(),
            sheet.rows.row_count(),
            sheet.rows.cell_count()
        );
        Ok(sheet)
    }

    /// Keep a nested BOF..EOF substream (an embedded chart) as plain records.
    fn read_embedded_substream(&mut self, rs: &mut RecordStream<'_>) -> XlsResult<()> {
        let mut depth = 0usize;
        while let Some(record) = rs.next() {
            match record.sid() {
                sid::BOF => {
                    depth += 1;
                    debug!("entering embedded substream, nesting {}", depth + 1);
                },
                sid::EOF => depth = depth.saturating_sub(1),
                _ => {},
            }
            self.items.push(SheetItem::Record(record.clone()));
            if depth == 0 {
                debug!("embedded substream closed");
                return Ok(());
            }
        }
        Err(XlsError::UnexpectedEndOfStream)
    }

    fn insert_placeholder(&mut self, item: SheetItem, component: SheetComponent) {
        let at = find_insert_position(&self.items, component);
        debug!("inserting {:?} at position {}", component, at);
        self.items.insert(at, item);
    }

    /// Make sure a record with `sid` exists, inserting `make()` where
    /// `component` belongs when it does not.
    fn ensure_record(&mut self, record_sid: u16, component: SheetComponent, make: impl FnOnce() -> Record) {
        if self.items.iter().any(|i| i.is_sid(record_sid)) {
            return;
        }
        let at = find_insert_position(&self.items, component);
        debug!("inserting {} at position {}", sid::name(record_sid), at);
        self.items.insert(at, SheetItem::Record(make()));
    }

    fn remove_record(&mut self, record_sid: u16) -> bool {
        match self.items.iter().position(|i| i.is_sid(record_sid)) {
            Some(i) => {
                self.items.remove(i);
                true
            },
            None => false,
        }
    }

    singleton_record!(dimensions_record, dimensions_mut, Dimensions, DimensionsRecord);
    singleton_record!(window_two, window_two_mut, Window2, WindowTwoRecord);
    singleton_record!(selection, selection_mut, Selection, SelectionRecord);
    singleton_record!(pane, pane_mut, Pane, PaneRecord);
    singleton_record!(guts, guts_mut, Guts, GutsRecord);
    singleton_record!(gridset, gridset_mut, Gridset, GridsetRecord);
    singleton_record!(print_gridlines, print_gridlines_mut, PrintGridlines, PrintGridlinesRecord);
    singleton_record!(default_col_width, default_col_width_mut, DefaultColWidth, DefaultColWidthRecord);
    singleton_record!(
        default_row_height_record,
        default_row_height_mut,
        DefaultRowHeight,
        DefaultRowHeightRecord
    );
    singleton_record!(protect, protect_mut, Protect, ProtectRecord);
    singleton_record!(object_protect, object_protect_mut, ObjectProtect, ObjectProtectRecord);
    singleton_record!(scenario_protect, scenario_protect_mut, ScenarioProtect, ScenarioProtectRecord);
    singleton_record!(password, password_mut, Password, PasswordRecord);

    // ----- serialization -----

    /// The sheet's records in file order, for a sheet whose BOF sits at
    /// `offset` in the workbook stream.
    ///
    /// INDEX is regenerated with the stream offsets of the DBCELL records.
    pub fn records(&self, offset: usize) -> Vec<Record> {
        let mut out: Vec<Record> = Vec::with_capacity(self.items.len() + self.rows.cell_count());
        let mut index_written = false;
        let mut push = |r: Record| out.push(r);

        for item in &self.items {
            match item {
                SheetItem::Record(r) => {
                    push(r.clone());
                    if !index_written && r.sid() == sid::BOF {
                        if self.uncalced {
                            push(UncalcedRecord::default().into());
                        }
                        index_written = true;
                        push(self.index_placeholder().into());
                    }
                },
                SheetItem::Rows => self.rows.visit_contained_records(&mut push),
                SheetItem::MergedCells => self.merged.visit_contained_records(&mut push),
                SheetItem::ColumnInfos => self.column_infos.visit_contained_records(&mut push),
                SheetItem::ConditionalFormats => {
                    if let Some(cf) = &self.cond_formats {
                        cf.visit_contained_records(&mut push);
                    }
                },
                SheetItem::DataValidity => {
                    if let Some(dv) = &self.data_validity {
                        dv.visit_contained_records(&mut push);
                    }
                },
                SheetItem::PageSettings => {
                    if let Some(ps) = &self.page_settings {
                        ps.visit_contained_records(&mut push);
                    }
                },
            }
        }

        let mut pos = offset;
        let mut dbcells = Vec::with_capacity(self.rows.row_block_count());
        for record in &out {
            if record.sid() == sid::DBCELL {
                dbcells.push(pos as u32);
            }
            pos += record.serialized_size();
        }
        if let Some(Record::Index(index)) = out.iter_mut().find(|r| r.sid() == sid::INDEX) {
            index.dbcells = dbcells;
        }
        out
    }

    fn index_placeholder(&self) -> IndexRecord {
        let (first_row, last_row_add1) = self
            .rows
            .row_span()
            .map_or((0, 0), |(first, last)| (first, last + 1));
        IndexRecord {
            first_row,
            last_row_add1,
            dbcells: vec![0; self.rows.row_block_count()],
            ..IndexRecord::default()
        }
    }

    /// Encoded size of the whole substream.
    pub fn serialized_size(&self) -> usize {
        let mut size = 0;
        for item in &self.items {
            size += match item {
                SheetItem::Record(r) => r.serialized_size(),
                SheetItem::Rows => self.rows.serialized_size(),
                SheetItem::MergedCells => self.merged.serialized_size(),
                SheetItem::ColumnInfos => self.column_infos.serialized_size(),
                SheetItem::ConditionalFormats => {
                    self.cond_formats.as_ref().map_or(0, |t| t.serialized_size())
                },
                SheetItem::DataValidity => {
                    self.data_validity.as_ref().map_or(0, |t| t.serialized_size())
                },
                SheetItem::PageSettings => {
                    self.page_settings.as_ref().map_or(0, |t| t.serialized_size())
                },
            };
        }
        if self.uncalced {
            size += UncalcedRecord::default().record_size();
        }
        size + self.index_placeholder().record_size()
    }

    /// Write the substream; `offset` is the stream position of its BOF.
    pub fn serialize<W: Write>(&self, writer: &mut W, offset: usize) -> XlsResult<usize> {
        crate::records::write_records(writer, &self.records(offset))
    }

    // ----- cells and rows -----

    fn expand_dimensions(&mut self, row: u32, col: Option<u16>) {
        if let Some(d) = self.dimensions_mut() {
            if row >= d.last_row {
                d.last_row = row + 1;
            }
            if row < d.first_row {
                d.first_row = row;
            }
            if let Some(col) = col {
                if col >= d.last_col {
                    d.last_col = col + 1;
                }
                if col < d.first_col {
                    d.first_col = col;
                }
            }
        }
    }

    /// Add or replace a value cell, widening the used range.
    pub fn insert_cell(&mut self, cell: impl Into<CellRecord>) -> XlsResult<Option<CellRecord>> {
        let cell = cell.into();
        check_coordinates(cell.row(), cell.col())?;
        self.expand_dimensions(cell.row(), Some(cell.col()));
        self.rows.insert_cell(cell)
    }

    /// Remove a cell. The used range is left as it is.
    pub fn remove_cell(&mut self, row: u32, col: u16) -> XlsResult<Option<CellRecord>> {
        self.rows.remove_cell(row, col)
    }

    /// Remove whatever sits at the cell's position and insert `cell`.
    pub fn replace_cell(&mut self, cell: impl Into<CellRecord>) -> XlsResult<Option<CellRecord>> {
        let cell = cell.into();
        let old = self.remove_cell(cell.row(), cell.col())?;
        self.insert_cell(cell)?;
        Ok(old)
    }

    pub fn cell(&self, row: u32, col: u16) -> Option<&CellRecord> {
        self.rows.cell(row, col)
    }

    pub fn cell_mut(&mut self, row: u32, col: u16) -> Option<&mut CellRecord> {
        self.rows.cell_mut(row, col)
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &CellRecord> {
        self.rows.cells()
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut CellRecord> {
        self.rows.cells_mut()
    }

    /// Add a row descriptor. An existing row with the same number is
    /// removed first together with its cells.
    pub fn add_row(&mut self, row: RowRecord) -> XlsResult<()> {
        let number = row.row_number();
        check_coordinates(number, 0)?;
        if self.rows.row(number).is_some() {
            self.rows.remove_row(number)?;
        }
        self.expand_dimensions(number, None);
        self.rows.insert_row(row);
        Ok(())
    }

    /// Remove a row and its cells.
    pub fn remove_row(&mut self, row: u32) -> XlsResult<Option<RowRecord>> {
        self.rows.remove_row(row)
    }

    pub fn row(&self, row: u32) -> Option<&RowRecord> {
        self.rows.row(row)
    }

    pub fn row_mut(&mut self, row: u32) -> Option<&mut RowRecord> {
        self.rows.row_mut(row)
    }

    pub fn rows(&self) -> impl Iterator<Item = &RowRecord> {
        self.rows.rows()
    }

    /// Row and cell storage.
    pub fn row_records(&self) -> &RowRecordsAggregate {
        &self.rows
    }

    pub fn row_records_mut(&mut self) -> &mut RowRecordsAggregate {
        &mut self.rows
    }

    /// Used range. Last row and last column are exclusive.
    pub fn dimensions(&self) -> DimensionsRecord {
        self.dimensions_record().copied().unwrap_or_default()
    }

    pub fn set_dimensions(&mut self, first_row: u32, first_col: u16, last_row: u32, last_col: u16) {
        if let Some(d) = self.dimensions_mut() {
            *d = DimensionsRecord {
                reserved: d.reserved,
                ..DimensionsRecord::new(first_row, last_row, first_col, last_col)
            };
        }
    }

    // ----- merged regions -----

    /// Merge the cells of an inclusive range. Fails when the range is
    /// reversed.
    pub fn add_merged_region(
        &mut self,
        first_row: u32,
        first_col: u16,
        last_row: u32,
        last_col: u16,
    ) -> XlsResult<usize> {
        let region = CellRangeAddress::new(first_row, last_row, first_col, last_col)?;
        Ok(self.merged.add_region(region))
    }

    pub fn remove_merged_region(&mut self, index: usize) -> XlsResult<CellRangeAddress> {
        self.merged.remove_region(index)
    }

    pub fn merged_region(&self, index: usize) -> Option<&CellRangeAddress> {
        self.merged.region(index)
    }

    pub fn merged_regions(&self) -> &[CellRangeAddress] {
        self.merged.regions()
    }

    pub fn merged_region_count(&self) -> usize {
        self.merged.len()
    }

    // ----- conditional formats, validation, page settings -----

    /// Append a conditional format block, creating the table if needed.
    pub fn add_conditional_format(&mut self, cf: CfRecordsAggregate) -> usize {
        if self.cond_formats.is_none() {
            self.insert_placeholder(
                SheetItem::ConditionalFormats,
                SheetComponent::ConditionalFormatting,
            );
        }
        self.cond_formats
            .get_or_insert_with(ConditionalFormattingTable::new)
            .add(cf)
    }

    pub fn conditional_format(&self, index: usize) -> Option<&CfRecordsAggregate> {
        self.cond_formats.as_ref()?.get(index)
    }

    pub fn conditional_format_mut(&mut self, index: usize) -> Option<&mut CfRecordsAggregate> {
        self.cond_formats.as_mut()?.get_mut(index)
    }

    pub fn remove_conditional_format(&mut self, index: usize) -> XlsResult<CfRecordsAggregate> {
        match self.cond_formats.as_mut() {
            Some(table) => table.remove(index),
            None => Err(XlsError::invalid_argument(format!(
                "conditional format index {} is out of range",
                index
            ))),
        }
    }

    pub fn conditional_format_count(&self) -> usize {
        self.cond_formats.as_ref().map_or(0, ConditionalFormattingTable::len)
    }

    pub fn data_validity_table(&self) -> Option<&DataValidityTable> {
        self.data_validity.as_ref()
    }

    pub fn get_or_create_data_validity_table(&mut self) -> &mut DataValidityTable {
        if self.data_validity.is_none() {
            self.insert_placeholder(SheetItem::DataValidity, SheetComponent::DataValidity);
        }
        self.data_validity.get_or_insert_with(DataValidityTable::new)
    }

    pub fn page_settings(&self) -> Option<&PageSettingsBlock> {
        self.page_settings.as_ref()
    }

    /// Page settings, created with defaults when the sheet has none.
    pub fn page_settings_mut(&mut self) -> &mut PageSettingsBlock {
        if self.page_settings.is_none() {
            self.insert_placeholder(SheetItem::PageSettings, SheetComponent::PageSettings);
        }
        self.page_settings.get_or_insert_with(PageSettingsBlock::create)
    }

    // ----- columns -----

    fn check_column(col: u16) -> XlsResult<()> {
        if col > MAX_COLUMN {
            return Err(XlsError::invalid_argument(format!(
                "column {} is outside 0..={}",
                col, MAX_COLUMN
            )));
        }
        Ok(())
    }

    pub fn column_infos(&self) -> &ColumnInfoRecordsAggregate {
        &self.column_infos
    }

    /// Width in 1/256 of a character; the sheet default when the column
    /// has no descriptor.
    pub fn column_width(&self, col: u16) -> u16 {
        match self.column_infos.find_column_info(col) {
            Some(ci) => ci.width,
            None => self.default_column_width().saturating_mul(256),
        }
    }

    pub fn set_column_width(&mut self, col: u16, width: u16) -> XlsResult<()> {
        Self::check_column(col)?;
        if width > MAX_COLUMN_WIDTH {
            return Err(XlsError::invalid_argument(
                "the maximum column width for an individual cell is 255 characters",
            ));
        }
        self.column_infos.set_column(
            col,
            ColumnChange {
                width: Some(width),
                ..ColumnChange::default()
            },
        );
        Ok(())
    }

    pub fn is_column_hidden(&self, col: u16) -> bool {
        self.column_infos
            .find_column_info(col)
            .is_some_and(|ci| ci.is_hidden())
    }

    pub fn set_column_hidden(&mut self, col: u16, hidden: bool) -> XlsResult<()> {
        Self::check_column(col)?;
        self.column_infos.set_column(
            col,
            ColumnChange {
                hidden: Some(hidden),
                ..ColumnChange::default()
            },
        );
        Ok(())
    }

    /// Style of empty cells in the column.
    pub fn column_xf_index(&self, col: u16) -> u16 {
        self.column_infos
            .find_column_info(col)
            .map_or(DEFAULT_XF_INDEX, |ci| ci.xf_index)
    }

    pub fn set_default_column_style(&mut self, col: u16, xf_index: u16) -> XlsResult<()> {
        Self::check_column(col)?;
        self.column_infos.set_column(
            col,
            ColumnChange {
                xf_index: Some(xf_index),
                ..ColumnChange::default()
            },
        );
        Ok(())
    }

    /// Raise (or with `indent == false` lower) the outline level of a
    /// column range and resize the column gutter.
    pub fn group_column_range(&mut self, first: u16, last: u16, indent: bool) -> XlsResult<()> {
        Self::check_column(first)?;
        Self::check_column(last)?;
        if last < first {
            return Err(XlsError::invalid_argument(format!(
                "column range {}..={} is reversed",
                first, last
            )));
        }
        self.column_infos.group_column_range(first, last, indent);
        let max = u16::from(self.column_infos.max_outline_level());
        self.ensure_record(sid::GUTS, SheetComponent::Guts, || GutsRecord::default().into());
        if let Some(guts) = self.guts_mut() {
            guts.col_level_max = max + 1;
            guts.top_col_gutter = if max == 0 { 0 } else { 29 + 12 * (max - 1) };
        }
        Ok(())
    }

    pub fn set_column_group_collapsed(&mut self, col: u16, collapsed: bool) {
        if collapsed {
            self.column_infos.collapse_column(col);
        } else {
            self.column_infos.expand_column(col);
        }
    }

    /// Default column width in characters.
    pub fn default_column_width(&self) -> u16 {
        self.default_col_width().map_or(8, |r| r.width)
    }

    pub fn set_default_column_width(&mut self, width: u16) {
        self.ensure_record(sid::DEFCOLWIDTH, SheetComponent::Protect, || {
            DefaultColWidthRecord { width: 8 }.into()
        });
        if let Some(r) = self.default_col_width_mut() {
            r.width = width;
        }
    }

    /// Default row height in twips.
    pub fn default_row_height(&self) -> u16 {
        self.default_row_height_record().map_or(0xFF, |r| r.height)
    }

    pub fn set_default_row_height(&mut self, height: u16) {
        self.ensure_record(sid::DEFAULTROWHEIGHT, SheetComponent::Guts, || {
            DefaultRowHeightRecord::default().into()
        });
        if let Some(r) = self.default_row_height_mut() {
            r.height = height;
        }
    }

    // ----- row outlines -----

    /// Raise (or lower) the outline level of every row in the range,
    /// creating missing rows, then resize the row gutter.
    pub fn group_row_range(&mut self, first: u32, last: u32, indent: bool) -> XlsResult<()> {
        if last < first {
            return Err(XlsError::invalid_argument(format!(
                "row range {}..={} is reversed",
                first, last
            )));
        }
        for number in first..=last {
            if self.rows.row(number).is_none() {
                self.add_row(RowRecord::new(number)?)?;
            }
            if let Some(row) = self.rows.row_mut(number) {
                let level = row.outline_level();
                let level = if indent {
                    level.saturating_add(1)
                } else {
                    level.saturating_sub(1)
                };
                row.set_outline_level(level.min(MAX_OUTLINE_LEVEL));
            }
        }
        self.recalc_row_gutter();
        Ok(())
    }

    fn recalc_row_gutter(&mut self) {
        let max = self
            .rows
            .rows()
            .map(RowRecord::outline_level)
            .max()
            .map_or(0, u16::from);
        self.ensure_record(sid::GUTS, SheetComponent::Guts, || GutsRecord::default().into());
        if let Some(guts) = self.guts_mut() {
            guts.row_level_max = max + 1;
            guts.left_row_gutter = 29 + 12 * max;
        }
    }

    fn row_level(&self, row: u32) -> Option<u8> {
        self.rows.row(row).map(RowRecord::outline_level)
    }

    fn find_start_of_row_group(&self, row: u32) -> u32 {
        let Some(level) = self.row_level(row) else {
            return row;
        };
        let mut current = row;
        while let Some(prev) = current.checked_sub(1) {
            match self.row_level(prev) {
                Some(l) if l >= level => current = prev,
                _ => break,
            }
        }
        current
    }

    fn find_end_of_row_group(&self, row: u32) -> u32 {
        let Some(level) = self.row_level(row) else {
            return row;
        };
        let mut current = row;
        while let Some(l) = self.row_level(current + 1) {
            if l < level {
                break;
            }
            current += 1;
        }
        current
    }

    /// Hide (or show) rows from `start` while they stay at or above the
    /// level of `start`. Returns the first row past the run.
    fn write_row_hidden(&mut self, start: u32, hidden: bool) -> u32 {
        let Some(level) = self.row_level(start) else {
            return start;
        };
        let mut current = start;
        while let Some(row) = self.rows.row_mut(current) {
            if row.outline_level() < level {
                break;
            }
            row.set_zero_height(hidden);
            current += 1;
        }
        current
    }

    fn is_row_group_collapsed(&self, row: u32) -> bool {
        let after = self.find_end_of_row_group(row) + 1;
        self.rows.row(after).is_some_and(RowRecord::is_collapsed)
    }

    fn is_row_group_hidden_by_parent(&self, row: u32) -> bool {
        let end = self.find_end_of_row_group(row);
        let (end_level, end_hidden) = self
            .rows
            .row(end + 1)
            .map_or((0, false), |r| (r.outline_level(), r.is_zero_height()));
        let start = self.find_start_of_row_group(row);
        let (start_level, start_hidden) = start
            .checked_sub(1)
            .and_then(|prev| self.rows.row(prev))
            .map_or((0, false), |r| (r.outline_level(), r.is_zero_height()));
        if end_level > start_level {
            end_hidden
        } else {
            start_hidden
        }
    }

    /// Collapse or expand the outline group containing `row`.
    pub fn set_row_group_collapsed(&mut self, row: u32, collapsed: bool) -> XlsResult<()> {
        if self.rows.row(row).is_none() {
            return Ok(());
        }
        if collapsed {
            let start = self.find_start_of_row_group(row);
            let after = self.write_row_hidden(start, true);
            if self.rows.row(after).is_none() {
                self.add_row(RowRecord::new(after)?)?;
            }
            if let Some(r) = self.rows.row_mut(after) {
                r.set_collapsed(true);
            }
            return Ok(());
        }

        if !self.is_row_group_collapsed(row) {
            return Ok(());
        }
        let start = self.find_start_of_row_group(row);
        let end = self.find_end_of_row_group(row);
        if !self.is_row_group_hidden_by_parent(row) {
            let level = self.row_level(start).unwrap_or(0);
            for number in start..=end {
                let same_level = self.row_level(number) == Some(level);
                if same_level || !self.is_row_group_collapsed(number) {
                    if let Some(r) = self.rows.row_mut(number) {
                        r.set_zero_height(false);
                    }
                }
            }
        }
        if let Some(r) = self.rows.row_mut(end + 1) {
            r.set_collapsed(false);
        }
        Ok(())
    }

    // ----- view -----

    pub fn display_flag(&self, flag: Window2Flags) -> bool {
        self.window_two().is_some_and(|w| w.flag(flag))
    }

    pub fn set_display_flag(&mut self, flag: Window2Flags, value: bool) {
        if let Some(w) = self.window_two_mut() {
            w.set_flag(flag, value);
        }
    }

    pub fn is_display_gridlines(&self) -> bool {
        self.display_flag(Window2Flags::DISPLAY_GRIDLINES)
    }

    pub fn set_display_gridlines(&mut self, show: bool) {
        self.set_display_flag(Window2Flags::DISPLAY_GRIDLINES, show);
    }

    pub fn is_display_formulas(&self) -> bool {
        self.display_flag(Window2Flags::DISPLAY_FORMULAS)
    }

    pub fn set_display_formulas(&mut self, show: bool) {
        self.set_display_flag(Window2Flags::DISPLAY_FORMULAS, show);
    }

    pub fn is_display_row_col_headings(&self) -> bool {
        self.display_flag(Window2Flags::DISPLAY_ROW_COL_HEADINGS)
    }

    pub fn set_display_row_col_headings(&mut self, show: bool) {
        self.set_display_flag(Window2Flags::DISPLAY_ROW_COL_HEADINGS, show);
    }

    pub fn is_selected(&self) -> bool {
        self.display_flag(Window2Flags::SELECTED)
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.set_display_flag(Window2Flags::SELECTED, selected);
    }

    pub fn top_row(&self) -> u16 {
        self.window_two().map_or(0, |w| w.top_row)
    }

    pub fn set_top_row(&mut self, row: u16) {
        if let Some(w) = self.window_two_mut() {
            w.top_row = row;
        }
    }

    pub fn left_col(&self) -> u16 {
        self.window_two().map_or(0, |w| w.left_col)
    }

    pub fn set_left_col(&mut self, col: u16) {
        if let Some(w) = self.window_two_mut() {
            w.left_col = col;
        }
    }

    /// Active cell as (row, column).
    pub fn active_cell(&self) -> (u16, u16) {
        self.selection()
            .map_or((0, 0), |s| (s.active_row, s.active_col))
    }

    pub fn set_active_cell(&mut self, row: u16, col: u16) -> XlsResult<()> {
        check_coordinates(u32::from(row), col)?;
        if self.selection().is_none() {
            let mut at = find_insert_position(&self.items, SheetComponent::Pane);
            if self.items.get(at).is_some_and(|i| i.is_sid(sid::PANE)) {
                at += 1;
            }
            self.items
                .insert(at, SheetItem::Record(SelectionRecord::new(row, col).into()));
            return Ok(());
        }
        if let Some(sel) = self.selection_mut() {
            sel.active_row = row;
            sel.active_col = col;
            sel.active_ref_index = 0;
            sel.refs = vec![SelectionRef {
                first_row: row,
                last_row: row,
                first_col: col as u8,
                last_col: col as u8,
            }];
        }
        Ok(())
    }

    fn set_selection_pane(&mut self, pane: u8) {
        if let Some(sel) = self.selection_mut() {
            sel.pane = pane;
        }
    }

    fn insert_pane(&mut self, pane: PaneRecord) {
        self.remove_record(sid::PANE);
        let at = find_insert_position(&self.items, SheetComponent::Pane);
        debug!("inserting PANE at position {}", at);
        self.items.insert(at, SheetItem::Record(pane.into()));
    }

    /// Freeze the first `row_split` rows and `col_split` columns. Both
    /// zero removes an existing freeze.
    pub fn create_freeze_pane(&mut self, col_split: u16, row_split: u16, top_row: u16, left_col: u16) {
        if col_split == 0 && row_split == 0 {
            self.remove_record(sid::PANE);
            self.set_display_flag(Window2Flags::FREEZE_PANES, false);
            self.set_display_flag(Window2Flags::FREEZE_PANES_NO_SPLIT, false);
            self.set_selection_pane(SelectionRecord::PANE_UPPER_LEFT);
            return;
        }

        let mut pane = PaneRecord {
            x: col_split,
            y: row_split,
            top_row,
            left_col,
            active_pane: PaneRecord::ACTIVE_PANE_LOWER_RIGHT,
        };
        if row_split == 0 {
            pane.top_row = 0;
            pane.active_pane = PaneRecord::ACTIVE_PANE_UPPER_RIGHT;
        } else if col_split == 0 {
            pane.left_col = 0;
            pane.active_pane = PaneRecord::ACTIVE_PANE_LOWER_LEFT;
        }
        let active = pane.active_pane as u8;
        self.insert_pane(pane);
        self.set_display_flag(Window2Flags::FREEZE_PANES, true);
        self.set_display_flag(Window2Flags::FREEZE_PANES_NO_SPLIT, true);
        self.set_selection_pane(active);
    }

    /// Split the window at the given positions (in twips).
    pub fn create_split_pane(
        &mut self,
        x_split: u16,
        y_split: u16,
        top_row: u16,
        left_col: u16,
        active_pane: u16,
    ) {
        self.insert_pane(PaneRecord {
            x: x_split,
            y: y_split,
            top_row,
            left_col,
            active_pane,
        });
        self.set_display_flag(Window2Flags::FREEZE_PANES, false);
        self.set_display_flag(Window2Flags::FREEZE_PANES_NO_SPLIT, false);
        self.set_selection_pane(SelectionRecord::PANE_LOWER_RIGHT);
    }

    /// Current split or freeze, `None` when the window is not divided.
    pub fn pane_information(&self) -> Option<PaneInformation> {
        let pane = self.pane()?;
        Some(PaneInformation {
            x: pane.x,
            y: pane.y,
            top_row: pane.top_row,
            left_col: pane.left_col,
            active_pane: pane.active_pane,
            frozen: self.display_flag(Window2Flags::FREEZE_PANES),
        })
    }

    // ----- protection -----

    /// Protect the sheet with `password`. `None` drops every protection
    /// record.
    pub fn protect_sheet(&mut self, password: Option<&str>, objects: bool, scenarios: bool) {
        let Some(password) = password else {
            for record_sid in [sid::PROTECT, sid::OBJPROTECT, sid::SCENPROTECT, sid::PASSWORD] {
                self.remove_record(record_sid);
            }
            return;
        };

        self.ensure_record(sid::PROTECT, SheetComponent::Protect, || {
            ProtectRecord::new(false).into()
        });
        if let Some(p) = self.protect_mut() {
            p.protected = 1;
        }
        if scenarios {
            self.ensure_record(sid::SCENPROTECT, SheetComponent::ScenarioProtect, || {
                ScenarioProtectRecord::new(true).into()
            });
        }
        if objects {
            self.ensure_record(sid::OBJPROTECT, SheetComponent::ObjectProtect, || {
                ObjectProtectRecord::new(true).into()
            });
        }
        self.ensure_record(sid::PASSWORD, SheetComponent::Password, || {
            PasswordRecord { hash: 0 }.into()
        });
        if let Some(p) = self.password_mut() {
            p.hash = PasswordRecord::hash_password(password);
        }
    }

    /// Clear the selected kinds of protection. Clearing sheet protection
    /// also zeroes the password.
    pub fn unprotect_sheet(&mut self, sheet: bool, objects: bool, scenarios: bool) {
        if sheet {
            if let Some(p) = self.protect_mut() {
                p.protected = 0;
            }
            if let Some(p) = self.password_mut() {
                p.hash = 0;
            }
        }
        if objects {
            if let Some(p) = self.object_protect_mut() {
                p.protected = 0;
            }
        }
        if scenarios {
            if let Some(p) = self.scenario_protect_mut() {
                p.protected = 0;
            }
        }
    }

    pub fn protection(&self) -> SheetProtection {
        SheetProtection {
            sheet: self.protect().is_some_and(ProtectRecord::is_protected),
            objects: self.object_protect().is_some_and(|r| r.protected != 0),
            scenarios: self.scenario_protect().is_some_and(|r| r.protected != 0),
        }
    }

    /// Password verifier, 0 when none is set.
    pub fn password_hash(&self) -> u16 {
        self.password().map_or(0, |p| p.hash)
    }

    // ----- printing and calculation flags -----

    pub fn is_grids_printed(&self) -> bool {
        self.gridset().is_some_and(|g| g.gridset == 0)
    }

    pub fn set_grids_printed(&mut self, printed: bool) {
        self.ensure_record(sid::GRIDSET, SheetComponent::Gridset, || {
            GridsetRecord { gridset: 1 }.into()
        });
        if let Some(g) = self.gridset_mut() {
            g.gridset = u16::from(!printed);
        }
    }

    pub fn is_print_gridlines(&self) -> bool {
        self.print_gridlines().is_some_and(|p| p.print_gridlines != 0)
    }

    pub fn set_print_gridlines(&mut self, print: bool) {
        match self.print_gridlines_mut() {
            Some(p) => p.print_gridlines = u16::from(print),
            None => warn!("sheet has no PRINTGRIDLINES record, setting ignored"),
        }
    }

    /// Whether the sheet asks to be recalculated on load.
    pub fn is_uncalced(&self) -> bool {
        self.uncalced
    }

    pub fn set_uncalced(&mut self, uncalced: bool) {
        self.uncalced = uncalced;
    }

    /// The ordered item list, plain records and aggregate placeholders.
    pub fn items(&self) -> &[SheetItem] {
        &self.items
    }
}

impl Default for Sheet {
    fn default() -> Self {
        Self::create()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::cell::MAX_ROW;
    use crate::records::{CellHeader, LabelSstRecord, NumberRecord};

    fn number(row: u32, col: u16, value: f64) -> NumberRecord {
        NumberRecord {
            cell: CellHeader::new(row, col, DEFAULT_XF_INDEX).unwrap(),
            value,
        }
    }

    fn round_trip(sheet: &Sheet) -> Sheet {
        let records = sheet.records(0);
        Sheet::from_records(&records, &ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_create_layout() {
        let sheet = Sheet::create();
        let records = sheet.records(0);
        assert_eq!(records[0].sid(), sid::BOF);
        assert_eq!(records[1].sid(), sid::INDEX);
        assert_eq!(records[2].sid(), sid::CALCMODE);
        assert_eq!(records.last().map(Record::sid), Some(sid::EOF));
        let dims = sheet.dimensions();
        assert_eq!((dims.first_row, dims.last_row), (0, 1));
        let size: usize = records.iter().map(Record::serialized_size).sum();
        assert_eq!(sheet.serialized_size(), size);
    }

    #[test]
    fn test_insert_cell_expands_dimensions() {
        let mut sheet = Sheet::create();
        sheet.insert_cell(number(10, 4, 1.0)).unwrap();
        sheet.insert_cell(number(3, 7, 2.0)).unwrap();
        let dims = sheet.dimensions();
        assert_eq!((dims.first_row, dims.last_row), (0, 11));
        assert_eq!((dims.first_col, dims.last_col), (0, 8));

        sheet.remove_cell(10, 4).unwrap();
        assert_eq!(sheet.dimensions().last_row, 11);
    }

    #[test]
    fn test_add_row_replaces_cells() {
        let mut sheet = Sheet::create();
        sheet.insert_cell(number(2, 0, 1.0)).unwrap();
        sheet.add_row(RowRecord::new(2).unwrap()).unwrap();
        assert!(sheet.cell(2, 0).is_none());
        assert!(sheet.row(2).is_some());
    }

    #[test]
    fn test_add_row_keeps_dimensions_on_failure() {
        let mut sheet = Sheet::create();
        sheet.insert_cell(number(4, 1, 1.0)).unwrap();
        let before = sheet.dimensions();
        let mut wide = number(5, 1, 1.0);
        wide.cell.col = MAX_COLUMN + 1;
        assert!(sheet.insert_cell(wide).is_err());
        assert!(RowRecord::new(MAX_ROW + 1).is_err());
        assert_eq!(sheet.dimensions(), before);

        sheet.add_row(RowRecord::new(MAX_ROW).unwrap()).unwrap();
        assert_eq!(sheet.dimensions().last_row, MAX_ROW + 1);
        assert!(sheet.row(MAX_ROW).is_some());
    }

    #[test]
    fn test_substream_must_open_with_bof() {
        let records = vec![Record::from(EofRecord)];
        let err = Sheet::from_records(&records, &ReadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            XlsError::UnexpectedRecordType {
                expected: sid::BOF,
                found: sid::EOF
            }
        ));
    }

    #[test]
    fn test_replace_cell() {
        let mut sheet = Sheet::create();
        sheet.insert_cell(number(0, 0, 1.0)).unwrap();
        let label = LabelSstRecord {
            cell: CellHeader::new(0, 0, DEFAULT_XF_INDEX).unwrap(),
            sst_index: 0,
        };
        let old = sheet.replace_cell(label).unwrap();
        assert!(matches!(old, Some(CellRecord::Number(_))));
        assert!(matches!(sheet.cell(0, 0), Some(CellRecord::LabelSst(_))));
    }

    #[test]
    fn test_reversed_merge_is_rejected() {
        let mut sheet = Sheet::create();
        assert!(sheet.add_merged_region(5, 0, 2, 3).is_err());
        assert!(sheet.add_merged_region(0, 4, 2, 3).is_err());
        assert_eq!(sheet.merged_region_count(), 0);
        assert_eq!(sheet.add_merged_region(0, 0, 1, 1).unwrap(), 0);
    }

    #[test]
    fn test_round_trip_is_stable() {
        let mut sheet = Sheet::create();
        for row in 0..40 {
            sheet.insert_cell(number(row, 1, row as f64)).unwrap();
        }
        sheet.add_merged_region(0, 0, 0, 2).unwrap();
        sheet.set_uncalced(true);

        let first = sheet.records(100);
        let reread = round_trip(&sheet);
        assert!(reread.is_uncalced());
        assert_eq!(reread.merged_region_count(), 1);
        assert_eq!(reread.records(100), first);
    }

    #[test]
    fn test_index_points_at_dbcells() {
        let mut sheet = Sheet::create();
        for row in 0..40 {
            sheet.insert_cell(number(row, 0, 1.0)).unwrap();
        }
        let offset = 512;
        let records = sheet.records(offset);
        let Some(Record::Index(index)) = records.iter().find(|r| r.sid() == sid::INDEX) else {
            panic!("no INDEX");
        };
        assert_eq!((index.first_row, index.last_row_add1), (0, 40));
        assert_eq!(index.dbcells.len(), 2);

        let mut pos = offset;
        let mut expected = Vec::new();
        for r in &records {
            if r.sid() == sid::DBCELL {
                expected.push(pos as u32);
            }
            pos += r.serialized_size();
        }
        assert_eq!(index.dbcells, expected);
    }

    #[test]
    fn test_missing_mandatory_records() {
        let sheet = Sheet::create();
        let records: Vec<Record> = sheet
            .records(0)
            .into_iter()
            .filter(|r| r.sid() != sid::DIMENSIONS)
            .collect();
        let err = Sheet::from_records(&records, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, XlsError::MissingRecord("DIMENSIONS")));

        let records: Vec<Record> = sheet
            .records(0)
            .into_iter()
            .filter(|r| r.sid() != sid::WINDOW2)
            .collect();
        let err = Sheet::from_records(&records, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, XlsError::MissingRecord("WINDOW2")));
    }

    #[test]
    fn test_truncated_stream() {
        let mut records = Sheet::create().records(0);
        records.pop();
        let err = Sheet::from_records(&records, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, XlsError::UnexpectedEndOfStream));
    }

    #[test]
    fn test_embedded_substream_is_kept() {
        let mut records = Sheet::create().records(0);
        let eof_at = records.len() - 1;
        let chart = vec![
            Record::from(BofRecord::new(BofType::Chart)),
            Record::from(CalcCountRecord { iterations: 1 }),
            Record::from(EofRecord),
        ];
        records.splice(eof_at..eof_at, chart);
        let sheet = Sheet::from_records(&records, &ReadOptions::default()).unwrap();
        let written = sheet.records(0);
        assert_eq!(written.iter().filter(|r| r.sid() == sid::BOF).count(), 2);
        assert_eq!(written.iter().filter(|r| r.sid() == sid::EOF).count(), 2);
        assert_eq!(written.last().map(Record::sid), Some(sid::EOF));
    }

    #[test]
    fn test_freeze_pane() {
        let mut sheet = Sheet::create();
        sheet.create_freeze_pane(0, 2, 2, 0);
        let info = sheet.pane_information().unwrap();
        assert!(info.frozen);
        assert_eq!(info.active_pane, PaneRecord::ACTIVE_PANE_LOWER_LEFT);
        let items = sheet.items();
        let w2 = items.iter().position(|i| i.is_sid(sid::WINDOW2)).unwrap();
        assert!(items[w2 + 1].is_sid(sid::PANE));

        sheet.create_freeze_pane(3, 0, 0, 3);
        let info = sheet.pane_information().unwrap();
        assert_eq!((info.top_row, info.active_pane), (0, 1));
        assert_eq!(
            sheet.items().iter().filter(|i| i.is_sid(sid::PANE)).count(),
            1
        );

        sheet.create_freeze_pane(0, 0, 0, 0);
        assert!(sheet.pane_information().is_none());
        assert!(!sheet.display_flag(Window2Flags::FREEZE_PANES));
    }

    #[test]
    fn test_split_pane() {
        let mut sheet = Sheet::create();
        sheet.create_split_pane(1000, 2000, 3, 4, PaneRecord::ACTIVE_PANE_UPPER_LEFT);
        let info = sheet.pane_information().unwrap();
        assert!(!info.frozen);
        assert_eq!((info.x, info.y, info.top_row, info.left_col), (1000, 2000, 3, 4));
    }

    #[test]
    fn test_protection() {
        let mut sheet = Sheet::create();
        sheet.protect_sheet(Some("abc"), true, false);
        assert_eq!(
            sheet.protection(),
            SheetProtection {
                sheet: true,
                objects: true,
                scenarios: false
            }
        );
        assert_eq!(sheet.password_hash(), 0xCC1A);
        let items = sheet.items();
        let protect = items.iter().position(|i| i.is_sid(sid::PROTECT)).unwrap();
        assert!(items[protect + 1].is_sid(sid::OBJPROTECT));
        assert!(items[protect + 2].is_sid(sid::PASSWORD));

        sheet.unprotect_sheet(true, false, false);
        assert!(!sheet.protection().sheet);
        assert_eq!(sheet.password_hash(), 0);

        sheet.protect_sheet(None, false, false);
        assert!(!sheet.items().iter().any(|i| i.is_sid(sid::PROTECT)));
    }

    #[test]
    fn test_row_grouping_updates_guts() {
        let mut sheet = Sheet::create();
        sheet.group_row_range(2, 5, true).unwrap();
        sheet.group_row_range(3, 4, true).unwrap();
        assert_eq!(sheet.row(3).unwrap().outline_level(), 2);
        let guts = sheet.guts().unwrap();
        assert_eq!(guts.row_level_max, 3);
        assert_eq!(guts.left_row_gutter, 29 + 24);

        sheet.set_row_group_collapsed(2, true).unwrap();
        assert!(sheet.row(2).unwrap().is_zero_height());
        assert!(sheet.row(5).unwrap().is_zero_height());
        assert!(sheet.row(6).unwrap().is_collapsed());

        sheet.set_row_group_collapsed(2, false).unwrap();
        assert!(!sheet.row(2).unwrap().is_zero_height());
        assert!(!sheet.row(6).unwrap().is_collapsed());
    }

    #[test]
    fn test_columns() {
        let mut sheet = Sheet::create();
        assert_eq!(sheet.column_width(3), 8 * 256);
        assert_eq!(sheet.column_xf_index(3), DEFAULT_XF_INDEX);
        sheet.set_column_width(3, 4000).unwrap();
        sheet.set_column_hidden(4, true).unwrap();
        assert_eq!(sheet.column_width(3), 4000);
        assert!(sheet.is_column_hidden(4));
        assert!(sheet.set_column_width(3, (256 * 256 - 1) as u16).is_err());

        sheet.group_column_range(1, 2, true).unwrap();
        let guts = sheet.guts().unwrap();
        assert_eq!((guts.col_level_max, guts.top_col_gutter), (2, 29));
    }

    #[test]
    fn test_gridset_and_view() {
        let mut sheet = Sheet::create();
        assert!(!sheet.is_grids_printed());
        sheet.set_grids_printed(true);
        assert!(sheet.is_grids_printed());
        sheet.set_top_row(7);
        sheet.set_active_cell(4, 2).unwrap();
        assert_eq!(sheet.top_row(), 7);
        assert_eq!(sheet.active_cell(), (4, 2));
        let selected = sheet.selection().map(|s| s.refs.clone());
        assert_eq!(
            selected,
            Some(vec![SelectionRef {
                first_row: 4,
                last_row: 4,
                first_col: 2,
                last_col: 2
            }])
        );
        sheet.set_display_gridlines(false);
        assert!(!sheet.is_display_gridlines());
    }

    #[test]
    fn test_lazy_tables_are_placed() {
        let mut sheet = Sheet::create();
        sheet.get_or_create_data_validity_table();
        let items = sheet.items();
        let merged = items.iter().position(|i| *i == SheetItem::MergedCells).unwrap();
        assert_eq!(items[merged + 1], SheetItem::DataValidity);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut sheet = Sheet::create();
        sheet.insert_cell(number(0, 0, 1.0)).unwrap();
        let mut copy = sheet.clone();
        copy.insert_cell(number(1, 0, 2.0)).unwrap();
        assert!(sheet.cell(1, 0).is_none());
        assert_eq!(copy.dimensions().last_row, 2);
        assert_eq!(sheet.dimensions().last_row, 1);
    }
}
