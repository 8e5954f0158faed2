//! Row blocks: ROW records, the cell value records of each row and the
//! records that follow a formula cell.
//!
//! On disk rows are grouped in blocks of 32. Each block holds the block's
//! ROW records, then the cells of those rows, then a DBCELL record that
//! points back at the rows and at the first cell of every row. DBCELL
//! records are rebuilt on every write.

use super::{RecordAggregate, RecordStream};
use crate::common::error::{XlsError, XlsResult};
use crate::config::ReadOptions;
use crate::formula::{Formula, Ptg, shared_to_cell_tokens};
use crate::records::cell::check_coordinates;
use crate::records::{
    ArrayRecord, BiffRecord, BlankRecord, BoolErrRecord, CellHeader, DbCellRecord, FormulaFlags,
    FormulaRecord, LabelRecord, LabelSstRecord, NumberRecord, Record, RkRecord, RowRecord,
    SharedFormulaRecord, StringRecord, TableRecord, sid,
};
use log::{debug, warn};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

/// Rows per DBCELL block.
pub const ROWS_PER_BLOCK: usize = 32;

/// A formula cell together with the records that belong to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaCell {
    pub record: FormulaRecord,
    /// Cached text result.
    pub string: Option<StringRecord>,
    /// Present on the first cell of a shared formula range.
    pub shared: Option<SharedFormulaRecord>,
    /// Present on the first cell of an array formula range.
    pub array: Option<ArrayRecord>,
    /// Present on the first cell of a data table.
    pub table: Option<TableRecord>,
}

impl FormulaCell {
    pub fn new(record: FormulaRecord) -> Self {
        Self {
            record,
            string: None,
            shared: None,
            array: None,
            table: None,
        }
    }

    /// Cached text result, when the last result was a string.
    pub fn cached_string(&self) -> Option<&str> {
        if !self.record.cached.needs_string_record() {
            return None;
        }
        Some(self.string.as_ref().map_or("", |s| s.value.text()))
    }

    fn visit(&self, visitor: &mut dyn FnMut(Record)) {
        visitor(Record::Formula(self.record.clone()));
        if let Some(r) = &self.shared {
            visitor(Record::SharedFormula(r.clone()));
        }
        if let Some(r) = &self.array {
            visitor(Record::Array(r.clone()));
        }
        if let Some(r) = self.table {
            visitor(Record::Table(r));
        }
        if self.record.cached.needs_string_record() {
            visitor(Record::String(self.string.clone().unwrap_or_default()));
        }
    }

    fn serialized_size(&self) -> usize {
        let mut size = self.record.record_size();
        size += self.shared.as_ref().map_or(0, BiffRecord::record_size);
        size += self.array.as_ref().map_or(0, BiffRecord::record_size);
        size += self.table.as_ref().map_or(0, BiffRecord::record_size);
        if self.record.cached.needs_string_record() {
            size += self
                .string
                .as_ref()
                .map_or_else(|| StringRecord::default().record_size(), BiffRecord::record_size);
        }
        size
    }
}

/// Any cell value record kept by the row aggregate. MULRK and MULBLANK
/// are expanded into RK and BLANK cells on read.
#[derive(Debug, Clone, PartialEq)]
pub enum CellRecord {
    Number(NumberRecord),
    Rk(RkRecord),
    Label(LabelRecord),
    LabelSst(LabelSstRecord),
    BoolErr(BoolErrRecord),
    Blank(BlankRecord),
    Formula(FormulaCell),
}

impl CellRecord {
    pub fn header(&self) -> &CellHeader {
        match self {
            CellRecord::Number(r) => &r.cell,
            CellRecord::Rk(r) => &r.cell,
            CellRecord::Label(r) => &r.cell,
            CellRecord::LabelSst(r) => &r.cell,
            CellRecord::BoolErr(r) => &r.cell,
            CellRecord::Blank(r) => &r.cell,
            CellRecord::Formula(f) => &f.record.cell,
        }
    }

    pub fn header_mut(&mut self) -> &mut CellHeader {
        match self {
            CellRecord::Number(r) => &mut r.cell,
            CellRecord::Rk(r) => &mut r.cell,
            CellRecord::Label(r) => &mut r.cell,
            CellRecord::LabelSst(r) => &mut r.cell,
            CellRecord::BoolErr(r) => &mut r.cell,
            CellRecord::Blank(r) => &mut r.cell,
            CellRecord::Formula(f) => &mut f.record.cell,
        }
    }

    pub fn row(&self) -> u32 {
        self.header().row_number()
    }

    pub fn col(&self) -> u16 {
        self.header().col
    }

    pub fn xf_index(&self) -> u16 {
        self.header().xf_index
    }

    pub fn set_xf_index(&mut self, xf_index: u16) {
        self.header_mut().xf_index = xf_index;
    }

    pub fn as_formula(&self) -> Option<&FormulaCell> {
        match self {
            CellRecord::Formula(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_formula_mut(&mut self) -> Option<&mut FormulaCell> {
        match self {
            CellRecord::Formula(f) => Some(f),
            _ => None,
        }
    }

    fn visit(&self, visitor: &mut dyn FnMut(Record)) {
        match self {
            CellRecord::Number(r) => visitor(Record::Number(*r)),
            CellRecord::Rk(r) => visitor(Record::Rk(*r)),
            CellRecord::Label(r) => visitor(Record::Label(r.clone())),
            CellRecord::LabelSst(r) => visitor(Record::LabelSst(*r)),
            CellRecord::BoolErr(r) => visitor(Record::BoolErr(*r)),
            CellRecord::Blank(r) => visitor(Record::Blank(*r)),
            CellRecord::Formula(f) => f.visit(visitor),
        }
    }

    /// Encoded size including follower records of a formula.
    pub fn serialized_size(&self) -> usize {
        match self {
            CellRecord::Number(r) => r.record_size(),
            CellRecord::Rk(r) => r.record_size(),
            CellRecord::Label(r) => r.record_size(),
            CellRecord::LabelSst(r) => r.record_size(),
            CellRecord::BoolErr(r) => r.record_size(),
            CellRecord::Blank(r) => r.record_size(),
            CellRecord::Formula(f) => f.serialized_size(),
        }
    }
}

impl From<NumberRecord> for CellRecord {
    fn from(r: NumberRecord) -> Self {
        CellRecord::Number(r)
    }
}

impl From<RkRecord> for CellRecord {
    fn from(r: RkRecord) -> Self {
        CellRecord::Rk(r)
    }
}

impl From<LabelRecord> for CellRecord {
    fn from(r: LabelRecord) -> Self {
        CellRecord::Label(r)
    }
}

impl From<LabelSstRecord> for CellRecord {
    fn from(r: LabelSstRecord) -> Self {
        CellRecord::LabelSst(r)
    }
}

impl From<BoolErrRecord> for CellRecord {
    fn from(r: BoolErrRecord) -> Self {
        CellRecord::BoolErr(r)
    }
}

impl From<BlankRecord> for CellRecord {
    fn from(r: BlankRecord) -> Self {
        CellRecord::Blank(r)
    }
}

impl From<FormulaRecord> for CellRecord {
    fn from(r: FormulaRecord) -> Self {
        CellRecord::Formula(FormulaCell::new(r))
    }
}

impl From<FormulaCell> for CellRecord {
    fn from(f: FormulaCell) -> Self {
        CellRecord::Formula(f)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowRecordsAggregate {
    rows: BTreeMap<u32, RowRecord>,
    cells: BTreeMap<u32, BTreeMap<u16, CellRecord>>,
}

impl RowRecordsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the contiguous run of row block records.
    pub fn read(rs: &mut RecordStream<'_>, options: &ReadOptions) -> XlsResult<Self> {
        let mut agg = Self::new();
        let mut last_formula: Option<(u32, u16)> = None;

        while let Some(record) = rs.peek() {
            if !sid::is_row_block_record(record.sid()) {
                break;
            }
            rs.next();
            match record {
                Record::Row(r) => {
                    agg.rows.insert(r.row_number(), *r);
                    continue;
                },
                Record::DbCell(_) => continue,
                Record::String(r) => {
                    agg.attach(last_formula, sid::STRING, |f| f.string = Some(r.clone()))?;
                    continue;
                },
                Record::SharedFormula(r) => {
                    agg.attach(last_formula, sid::SHRFMLA, |f| f.shared = Some(r.clone()))?;
                    continue;
                },
                Record::Array(r) => {
                    agg.attach(last_formula, sid::ARRAY, |f| f.array = Some(r.clone()))?;
                    continue;
                },
                Record::Table(r) => {
                    agg.attach(last_formula, sid::TABLE, |f| f.table = Some(*r))?;
                    continue;
                },
                _ => {},
            }

            last_formula = None;
            match record {
                Record::Number(r) => agg.put(CellRecord::Number(*r)),
                Record::Rk(r) => agg.put(CellRecord::Rk(*r)),
                Record::MulRk(r) => r.expand().into_iter().for_each(|c| agg.put(c.into())),
                Record::Label(r) => agg.put(CellRecord::Label(r.clone())),
                Record::LabelSst(r) => agg.put(CellRecord::LabelSst(*r)),
                Record::BoolErr(r) => agg.put(CellRecord::BoolErr(*r)),
                Record::Blank(r) => agg.put(CellRecord::Blank(*r)),
                Record::MulBlank(r) => r.expand().into_iter().for_each(|c| agg.put(c.into())),
                Record::Formula(r) => {
                    if !r.formula.is_parsed() && !options.keep_unparsed_formulas {
                        return Err(XlsError::InvalidFormula(format!(
                            "undecodable formula at row {} column {}",
                            r.cell.row, r.cell.col
                        )));
                    }
                    last_formula = Some((r.cell.row_number(), r.cell.col));
                    agg.put(CellRecord::Formula(FormulaCell::new(r.clone())));
                },
                other => {
                    return Err(XlsError::invalid_record(
                        other.sid(),
                        "record is not allowed inside row blocks",
                    ));
                },
            }
        }

        if options.synthesize_missing_rows {
            agg.synthesize_missing_rows()?;
        }
        debug!(
            "read {} rows and {} cells",
            agg.rows.len(),
            agg.cells.values().map(BTreeMap::len).sum::<usize>()
        );
        Ok(agg)
    }

    fn put(&mut self, cell: CellRecord) {
        let (row, col) = (cell.row(), cell.col());
        if self.cells.entry(row).or_default().insert(col, cell).is_some() {
            warn!("duplicate cell at row {} column {}, keeping the last", row, col);
        }
    }

    fn attach(
        &mut self,
        target: Option<(u32, u16)>,
        sid: u16,
        apply: impl FnOnce(&mut FormulaCell),
    ) -> XlsResult<()> {
        let orphan = || XlsError::invalid_record(sid, "record does not follow a formula cell");
        let (row, col) = target.ok_or_else(orphan)?;
        match self.cell_mut(row, col).and_then(CellRecord::as_formula_mut) {
            Some(formula) => {
                apply(formula);
                Ok(())
            },
            None => Err(orphan()),
        }
    }

    fn synthesize_missing_rows(&mut self) -> XlsResult<()> {
        for (&row, cells) in &self.cells {
            if self.rows.contains_key(&row) || cells.is_empty() {
                continue;
            }
            warn!("row {} has cells but no ROW record; creating one", row);
            let mut rec = RowRecord::new(row)?;
            if let (Some(first), Some(last)) = (cells.keys().next(), cells.keys().next_back()) {
                rec.first_col = *first;
                rec.last_col = *last + 1;
            }
            self.rows.insert(row, rec);
        }
        Ok(())
    }

    /// Add or replace a ROW record.
    pub fn insert_row(&mut self, row: RowRecord) -> Option<RowRecord> {
        self.rows.insert(row.row_number(), row)
    }

    /// Remove a row and every cell in it.
    pub fn remove_row(&mut self, row: u32) -> XlsResult<Option<RowRecord>> {
        let cols: Vec<u16> = self
            .cells
            .get(&row)
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default();
        for col in cols {
            self.remove_cell(row, col)?;
        }
        Ok(self.rows.remove(&row))
    }

    pub fn row(&self, row: u32) -> Option<&RowRecord> {
        self.rows.get(&row)
    }

    pub fn row_mut(&mut self, row: u32) -> Option<&mut RowRecord> {
        self.rows.get_mut(&row)
    }

    /// ROW records in row order.
    pub fn rows(&self) -> impl Iterator<Item = &RowRecord> {
        self.rows.values()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First and last row holding a ROW record or a cell.
    pub fn row_span(&self) -> Option<(u32, u32)> {
        let rows = self.block_rows();
        Some((*rows.first()?, *rows.last()?))
    }

    /// Store a cell, replacing any cell at the same position. The row is
    /// created when missing and its column span widened.
    pub fn insert_cell(&mut self, cell: CellRecord) -> XlsResult<Option<CellRecord>> {
        let (row, col) = (cell.row(), cell.col());
        check_coordinates(row, col)?;
        if self.is_shared_master(row, col) {
            self.unlink_shared_group(row, col)?;
        }

        let rec = match self.rows.entry(row) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(RowRecord::new(row)?),
        };
        if rec.is_empty() {
            rec.first_col = col;
            rec.last_col = col + 1;
        } else {
            rec.first_col = rec.first_col.min(col);
            rec.last_col = rec.last_col.max(col + 1);
        }

        Ok(self.cells.entry(row).or_default().insert(col, cell))
    }

    /// Remove a cell. A removed shared formula master hands its formula
    /// to the other cells of the range first.
    pub fn remove_cell(&mut self, row: u32, col: u16) -> XlsResult<Option<CellRecord>> {
        if self.is_shared_master(row, col) {
            self.unlink_shared_group(row, col)?;
        }
        let Some(cells) = self.cells.get_mut(&row) else {
            return Ok(None);
        };
        let removed = cells.remove(&col);
        if cells.is_empty() {
            self.cells.remove(&row);
        }
        Ok(removed)
    }

    pub fn cell(&self, row: u32, col: u16) -> Option<&CellRecord> {
        self.cells.get(&row)?.get(&col)
    }

    pub fn cell_mut(&mut self, row: u32, col: u16) -> Option<&mut CellRecord> {
        self.cells.get_mut(&row)?.get_mut(&col)
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &CellRecord> {
        self.cells.values().flat_map(BTreeMap::values)
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut CellRecord> {
        self.cells.values_mut().flat_map(BTreeMap::values_mut)
    }

    pub fn cells_in_row(&self, row: u32) -> impl Iterator<Item = &CellRecord> {
        self.cells.get(&row).into_iter().flat_map(BTreeMap::values)
    }

    /// Cells inside a rectangle, row-major. Only the rows in `rows` are
    /// visited; a reversed range selects nothing.
    pub fn cells_in_range(
        &self,
        rows: RangeInclusive<u32>,
        cols: RangeInclusive<u16>,
    ) -> impl Iterator<Item = &CellRecord> {
        let valid = !rows.is_empty() && !cols.is_empty();
        valid
            .then(|| {
                self.cells
                    .range(rows)
                    .flat_map(move |(_, cells)| cells.range(cols.clone()).map(|(_, cell)| cell))
            })
            .into_iter()
            .flatten()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    /// Lowest and highest column holding a cell.
    pub fn column_span(&self) -> Option<(u16, u16)> {
        let mut cols = self
            .cells
            .values()
            .filter_map(|c| Some((*c.keys().next()?, *c.keys().next_back()?)));
        let first = cols.next()?;
        Some(cols.fold(first, |(lo, hi), (a, b)| (lo.min(a), hi.max(b))))
    }

    fn is_shared_master(&self, row: u32, col: u16) -> bool {
        self.cell(row, col)
            .and_then(CellRecord::as_formula)
            .is_some_and(|f| f.shared.is_some())
    }

    /// The SHRFMLA covering `(row, col)` whose master is at `(master_row,
    /// master_col)`, falling back to any shared range containing the cell.
    fn find_shared(
        &self,
        master_row: u16,
        master_col: u16,
        row: u16,
        col: u16,
    ) -> Option<&SharedFormulaRecord> {
        let direct = self
            .cell(u32::from(master_row), master_col)
            .and_then(CellRecord::as_formula)
            .and_then(|f| f.shared.as_ref())
            .filter(|s| s.range.contains(row, col));
        direct.or_else(|| {
            self.cells()
                .filter_map(|c| c.as_formula()?.shared.as_ref())
                .find(|s| s.range.contains(row, col))
        })
    }

    /// Tokens a formula cell evaluates. Shared formula members get the
    /// master's tokens moved to their position; array members get the
    /// array formula.
    pub fn formula_tokens(&self, row: u32, col: u16) -> Option<Vec<Ptg>> {
        let formula = self.cell(row, col)?.as_formula()?;
        let Some((master_row, master_col)) = formula.record.formula.exp_target() else {
            return formula.record.formula.tokens().map(<[Ptg]>::to_vec);
        };
        let (r16, c16) = (u16::try_from(row).ok()?, col);
        if let Some(shared) = self.find_shared(master_row, master_col, r16, c16) {
            return Some(shared_to_cell_tokens(shared.formula.tokens()?, r16, c16));
        }
        let master = self.cell(u32::from(master_row), master_col)?.as_formula()?;
        master
            .array
            .as_ref()
            .and_then(|a| a.formula.tokens())
            .map(<[Ptg]>::to_vec)
    }

    /// Give a single shared formula member its own tokens. Unlinking the
    /// master dissolves the whole group.
    pub fn unlink_shared_formula(&mut self, row: u32, col: u16) -> XlsResult<()> {
        if self.is_shared_master(row, col) {
            return self.unlink_shared_group(row, col);
        }
        self.unlink_member(row, col);
        Ok(())
    }

    fn unlink_member(&mut self, row: u32, col: u16) {
        let Some((master_row, master_col)) = self
            .cell(row, col)
            .and_then(CellRecord::as_formula)
            .and_then(|f| f.record.formula.exp_target())
        else {
            return;
        };
        let Ok(r16) = u16::try_from(row) else {
            return;
        };
        let Some(tokens) = self
            .find_shared(master_row, master_col, r16, col)
            .and_then(|s| s.formula.tokens())
            .map(|t| shared_to_cell_tokens(t, r16, col))
        else {
            return;
        };
        if let Some(f) = self.cell_mut(row, col).and_then(CellRecord::as_formula_mut) {
            f.record.formula = Formula::new(tokens);
            f.record.flags.remove(FormulaFlags::SHARED_FORMULA);
        }
    }

    fn unlink_shared_group(&mut self, row: u32, col: u16) -> XlsResult<()> {
        let Some(range) = self
            .cell(row, col)
            .and_then(CellRecord::as_formula)
            .and_then(|f| f.shared.as_ref())
            .map(|s| s.range)
        else {
            return Ok(());
        };
        let master_row = u16::try_from(row)
            .map_err(|_| XlsError::invalid_argument(format!("row {} exceeds 65535", row)))?;

        let members: Vec<(u32, u16)> = self
            .cells()
            .filter_map(|c| {
                let f = c.as_formula()?;
                let target = f.record.formula.exp_target()?;
                (target == (master_row, col)
                    && range.contains(c.row() as u16, c.col()))
                .then(|| (c.row(), c.col()))
            })
            .collect();
        debug!(
            "unlinking shared formula at row {} column {} from {} cells",
            row,
            col,
            members.len()
        );
        for (r, c) in members {
            self.unlink_member(r, c);
        }
        if let Some(f) = self.cell_mut(row, col).and_then(CellRecord::as_formula_mut) {
            f.shared = None;
        }
        Ok(())
    }

    /// Row numbers that take part in the block layout.
    fn block_rows(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = self
            .rows
            .keys()
            .copied()
            .chain(
                self.cells
                    .iter()
                    .filter(|(_, c)| !c.is_empty())
                    .map(|(r, _)| *r),
            )
            .collect();
        set.into_iter().collect()
    }

    /// Number of DBCELL blocks the rows are written in.
    pub fn row_block_count(&self) -> usize {
        self.block_rows().len().div_ceil(ROWS_PER_BLOCK)
    }

    fn row_cells_size(&self, row: u32) -> usize {
        self.cells_in_row(row).map(CellRecord::serialized_size).sum()
    }
}

impl RecordAggregate for RowRecordsAggregate {
    fn visit_contained_records(&self, visitor: &mut dyn FnMut(Record)) {
        let rows = self.block_rows();
        for block in rows.chunks(ROWS_PER_BLOCK) {
            let mut row_block_size = 0;
            for row in block {
                if let Some(rec) = self.rows.get(row) {
                    visitor(Record::Row(*rec));
                    row_block_size += rec.record_size();
                }
            }

            // Cell offsets count from the start of the second ROW record.
            let mut pos = row_block_size;
            let mut cell_ref_offset = row_block_size.saturating_sub(RowRecord::ENCODED_SIZE);
            let mut cell_offsets = Vec::new();
            for &row in block {
                let size = self.row_cells_size(row);
                if size == 0 {
                    continue;
                }
                for cell in self.cells_in_row(row) {
                    cell.visit(visitor);
                }
                pos += size;
                cell_offsets.push(cell_ref_offset as u16);
                cell_ref_offset = size;
            }
            visitor(Record::DbCell(DbCellRecord {
                row_offset: pos as u32,
                cell_offsets,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{CellReference, Formula, OperandClass};
    use crate::records::{FormulaRange, MulRkRecord};

    fn number(row: u32, col: u16, value: f64) -> CellRecord {
        CellRecord::Number(NumberRecord {
            cell: CellHeader::new(row, col, 15).unwrap(),
            value,
        })
    }

    fn formula(row: u32, col: u16, tokens: Vec<Ptg>) -> FormulaRecord {
        FormulaRecord::new(CellHeader::new(row, col, 15).unwrap(), Formula::new(tokens))
    }

    #[test]
    fn test_insert_updates_row_span() {
        let mut agg = RowRecordsAggregate::new();
        agg.insert_cell(number(3, 5, 1.0)).unwrap();
        agg.insert_cell(number(3, 2, 2.0)).unwrap();
        let row = agg.row(3).unwrap();
        assert_eq!((row.first_col, row.last_col), (2, 6));
        let replaced = agg.insert_cell(number(3, 5, 9.0)).unwrap();
        assert_eq!(replaced, Some(number(3, 5, 1.0)));
        assert_eq!(agg.cell_count(), 2);
    }

    #[test]
    fn test_cells_in_range() {
        let mut agg = RowRecordsAggregate::new();
        for (row, col) in [(0, 0), (2, 1), (2, 4), (3, 2), (9, 1)] {
            agg.insert_cell(number(row, col, 1.0)).unwrap();
        }
        let found: Vec<(u32, u16)> = agg.cells_in_range(1..=3, 1..=2).map(|c| (c.row(), c.col())).collect();
        assert_eq!(found, vec![(2, 1), (3, 2)]);
        assert_eq!(agg.cells_in_range(0..=65_535, 0..=255).count(), 5);
        assert_eq!(agg.cells_in_range(RangeInclusive::new(3, 1), 0..=255).count(), 0);
        assert_eq!(agg.cells_in_range(0..=9, RangeInclusive::new(4, 1)).count(), 0);
    }

    #[test]
    fn test_dbcell_offsets() {
        let mut agg = RowRecordsAggregate::new();
        agg.insert_cell(number(0, 0, 1.0)).unwrap();
        agg.insert_cell(number(1, 0, 2.0)).unwrap();
        let records = agg.records();
        let sids: Vec<u16> = records.iter().map(Record::sid).collect();
        assert_eq!(
            sids,
            vec![sid::ROW, sid::ROW, sid::NUMBER, sid::NUMBER, sid::DBCELL]
        );
        let Record::DbCell(db) = &records[4] else {
            panic!("expected DBCELL");
        };
        assert_eq!(db.row_offset, 40 + 18 + 18);
        assert_eq!(db.cell_offsets, vec![20, 18]);
    }

    #[test]
    fn test_blocks_of_32() {
        let mut agg = RowRecordsAggregate::new();
        for row in 0..40 {
            agg.insert_cell(number(row, 0, row as f64)).unwrap();
        }
        assert_eq!(agg.row_block_count(), 2);
        let records = agg.records();
        assert_eq!(records.iter().filter(|r| r.sid() == sid::DBCELL).count(), 2);
        assert_eq!(records[32].sid(), sid::NUMBER);
    }

    #[test]
    fn test_read_expands_and_attaches() {
        let mut f = formula(0, 1, vec![Ptg::Str("x".into())]);
        f.cached = crate::records::CachedValue::String;
        let records = vec![
            Record::Row(RowRecord::new(0).unwrap()),
            Record::MulRk(MulRkRecord {
                row: 0,
                first_col: 2,
                cells: vec![(15, 0x3FF0_0000), (15, 0x4000_0000)],
            }),
            Record::Formula(f),
            Record::String(StringRecord::new("x")),
            Record::DbCell(DbCellRecord::default()),
            Record::Window2(Default::default()),
        ];
        let mut rs = RecordStream::new(&records);
        let agg = RowRecordsAggregate::read(&mut rs, &ReadOptions::default()).unwrap();
        assert_eq!(rs.count_read(), 5);
        assert_eq!(agg.cell_count(), 3);
        assert!(matches!(agg.cell(0, 3), Some(CellRecord::Rk(_))));
        let fc = agg.cell(0, 1).and_then(CellRecord::as_formula).unwrap();
        assert_eq!(fc.cached_string(), Some("x"));
    }

    #[test]
    fn test_orphan_string_is_format_error() {
        let records = vec![
            Record::Row(RowRecord::new(0).unwrap()),
            Record::String(StringRecord::new("x")),
        ];
        let err = RowRecordsAggregate::read(&mut RecordStream::new(&records), &ReadOptions::default())
            .unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_missing_rows_synthesized() {
        let records = vec![Record::Number(NumberRecord {
            cell: CellHeader::new(4, 1, 15).unwrap(),
            value: 3.0,
        })];
        let agg =
            RowRecordsAggregate::read(&mut RecordStream::new(&records), &ReadOptions::default())
                .unwrap();
        let row = agg.row(4).unwrap();
        assert_eq!((row.first_col, row.last_col), (1, 2));

        let strict = ReadOptions::new().with_synthesize_missing_rows(false);
        let agg = RowRecordsAggregate::read(&mut RecordStream::new(&records), &strict).unwrap();
        assert!(agg.row(4).is_none());
    }

    fn shared_group() -> RowRecordsAggregate {
        // B1:B3 = A(row)+1, stored as a shared formula mastered at B1.
        let mut agg = RowRecordsAggregate::new();
        let relative = Ptg::RefN {
            class: OperandClass::Value,
            cell: CellReference::from_raw(0, 0xC0FF),
        };
        for row in 0..3u32 {
            let mut rec = formula(row, 1, vec![Ptg::Exp { row: 0, col: 1 }]);
            rec.flags.insert(FormulaFlags::SHARED_FORMULA);
            let mut cell = FormulaCell::new(rec);
            if row == 0 {
                cell.shared = Some(SharedFormulaRecord {
                    range: FormulaRange {
                        first_row: 0,
                        last_row: 2,
                        first_col: 1,
                        last_col: 1,
                    },
                    reserved: 0,
                    use_count: 3,
                    formula: Formula::new(vec![relative.clone(), Ptg::Int(1), Ptg::Add]),
                });
            }
            agg.insert_cell(cell.into()).unwrap();
        }
        agg
    }

    #[test]
    fn test_shared_formula_resolution() {
        let agg = shared_group();
        let tokens = agg.formula_tokens(2, 1).unwrap();
        let Ptg::Ref { cell, .. } = &tokens[0] else {
            panic!("expected tRef, got {:?}", tokens[0]);
        };
        assert_eq!((cell.row(), cell.col()), (2, 0));
    }

    #[test]
    fn test_removing_master_unlinks_group() {
        let mut agg = shared_group();
        agg.remove_cell(0, 1).unwrap();
        let member = agg.cell(1, 1).and_then(CellRecord::as_formula).unwrap();
        assert!(member.record.formula.exp_target().is_none());
        assert!(!member.record.is_shared());
        let Some([Ptg::Ref { cell, .. }, Ptg::Int(1), Ptg::Add]) = member.record.formula.tokens()
        else {
            panic!("unexpected tokens");
        };
        assert_eq!((cell.row(), cell.col()), (1, 0));
    }

    #[test]
    fn test_remove_row_drops_cells() {
        let mut agg = RowRecordsAggregate::new();
        agg.insert_cell(number(2, 0, 1.0)).unwrap();
        agg.insert_cell(number(2, 4, 1.0)).unwrap();
        assert!(agg.remove_row(2).unwrap().is_some());
        assert_eq!(agg.cell_count(), 0);
        assert!(agg.records().is_empty());
    }
}
