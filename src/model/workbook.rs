//! Workbook model: globals, sheet directory and substreams.

use super::defaults::workbook_prologue;
use super::shared_strings::SharedStrings;
use super::sheet::{DEFAULT_XF_INDEX, Sheet};
use crate::aggregates::row_blocks::{CellRecord, FormulaCell};
use crate::aggregates::{LinkTable, RecordAggregate, RecordStream};
use crate::common::error::{XlsError, XlsResult};
use crate::config::ReadOptions;
use crate::eval::{EvaluationCell, EvaluationWorkbook};
use crate::formula::{
    ErrorCode, Formula, FormulaContext, Ptg, parse_formula, to_formula_string,
};
use crate::records::{
    BoolErrRecord, BoolErrValue, BoundSheetRecord, CellHeader, ExtSstRecord, FileSharingRecord,
    FormulaRecord, LabelSstRecord, NameRecord, NumberRecord, PasswordRecord, Record,
    Window2Flags, decode_record, sid, validate_sheet_name,
};
use crate::records::{CountingWriter, MAX_SHEET_NAME_LEN};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::ops::RangeInclusive;

/// One slot of the workbook globals.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalItem {
    Record(Record),
    /// The run of BOUNDSHEET records, one per substream.
    BoundSheets,
    LinkTable,
    SharedStrings,
    /// EXTSST, rebuilt from the SST on every write.
    ExtSst,
}

/// A substream after the globals.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetStream {
    Worksheet(Sheet),
    /// Chart, macro and module sheets, kept as read.
    Opaque(Vec<Record>),
}

impl SheetStream {
    fn serialized_size(&self) -> usize {
        match self {
            SheetStream::Worksheet(sheet) => sheet.serialized_size(),
            SheetStream::Opaque(records) => records.iter().map(Record::serialized_size).sum(),
        }
    }
}

/// A BIFF8 workbook stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    items: Vec<GlobalItem>,
    boundsheets: Vec<BoundSheetRecord>,
    sheets: Vec<SheetStream>,
    link_table: Option<LinkTable>,
    sst: SharedStrings,
}

impl Workbook {
    /// A workbook with no sheets and the default formatting tables.
    pub fn create() -> Self {
        let mut items: Vec<GlobalItem> = workbook_prologue()
            .into_iter()
            .map(GlobalItem::Record)
            .collect();
        items.extend([
            GlobalItem::BoundSheets,
            GlobalItem::SharedStrings,
            GlobalItem::ExtSst,
            GlobalItem::Record(crate::records::EofRecord.into()),
        ]);
        Self {
            items,
            boundsheets: Vec::new(),
            sheets: Vec::new(),
            link_table: None,
            sst: SharedStrings::new(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> XlsResult<Self> {
        Self::from_bytes_with_options(bytes, &ReadOptions::default())
    }

    /// Read a whole workbook stream from `reader`.
    pub fn read<R: Read>(mut reader: R, options: &ReadOptions) -> XlsResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes_with_options(&bytes, options)
    }

    pub fn from_bytes_with_options(bytes: &[u8], options: &ReadOptions) -> XlsResult<Self> {
        let mut records = Vec::new();
        let mut offsets = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (record, consumed) = decode_record(bytes, offset)?;
            records.push(record);
            offsets.push(offset);
            offset += consumed;
        }
        debug!("decoded {} records from {} bytes", records.len(), bytes.len());

        let mut rs = RecordStream::new(&records);
        let mut book = Self::read_globals(&mut rs)?;
        let globals_end = rs.position();

        let starts = substream_starts(&records, globals_end);
        let by_offset: HashMap<usize, usize> = starts.iter().map(|&i| (offsets[i], i)).collect();
        let mut sheets = Vec::with_capacity(book.boundsheets.len());
        for (i, bs) in book.boundsheets.iter().enumerate() {
            let start = match by_offset.get(&(bs.bof_offset as usize)) {
                Some(&start) => start,
                None => {
                    warn!(
                        "BOUNDSHEET '{}' points at offset {} where no substream starts, using stream order",
                        bs.sheet_name(),
                        bs.bof_offset
                    );
                    *starts.get(i).ok_or(XlsError::MissingRecord("BOF"))?
                },
            };
            sheets.push(read_substream(&records, start, options)?);
        }
        if starts.len() > sheets.len() {
            warn!(
                "{} substreams without a BOUNDSHEET entry dropped",
                starts.len() - sheets.len()
            );
        }
        book.sheets = sheets;
        debug!("read workbook with {} sheets", book.sheets.len());
        Ok(book)
    }

    fn read_globals(rs: &mut RecordStream<'_>) -> XlsResult<Self> {
        let bof = rs.expect(sid::BOF)?;
        let mut book = Self {
            items: vec![GlobalItem::Record(bof.clone())],
            boundsheets: Vec::new(),
            sheets: Vec::new(),
            link_table: None,
            sst: SharedStrings::new(),
        };

        loop {
            let Some(next_sid) = rs.peek_sid() else {
                return Err(XlsError::UnexpectedEndOfStream);
            };
            if next_sid == sid::BOUNDSHEET {
                if !book.items.contains(&GlobalItem::BoundSheets) {
                    book.items.push(GlobalItem::BoundSheets);
                }
                while let Some(Record::BoundSheet(bs)) = rs.peek() {
                    book.boundsheets.push(bs.clone());
                    rs.next();
                }
                continue;
            }
            if LinkTable::is_start(next_sid) && book.link_table.is_none() {
                book.link_table = Some(LinkTable::read(rs)?);
                book.items.push(GlobalItem::LinkTable);
                debug!("read link table");
                continue;
            }
            if LinkTable::is_start(next_sid) {
                warn!("second link table run kept as plain records");
            }

            let Some(record) = rs.next() else {
                return Err(XlsError::UnexpectedEndOfStream);
            };
            match record {
                Record::Sst(sst) => {
                    book.sst = SharedStrings::from_record(sst.clone());
                    book.items.push(GlobalItem::SharedStrings);
                },
                Record::ExtSst(_) => book.items.push(GlobalItem::ExtSst),
                other => {
                    book.items.push(GlobalItem::Record(other.clone()));
                    if other.sid() == sid::EOF {
                        break;
                    }
                },
            }
        }
        Ok(book)
    }

    // ----- writing -----

    fn globals_size(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                GlobalItem::Record(r) => r.serialized_size(),
                GlobalItem::BoundSheets => self
                    .boundsheets
                    .iter()
                    .map(|b| Record::BoundSheet(b.clone()).serialized_size())
                    .sum(),
                GlobalItem::LinkTable => {
                    self.link_table.as_ref().map_or(0, |t| t.serialized_size())
                },
                GlobalItem::SharedStrings => self.sst.record().serialized_size(),
                GlobalItem::ExtSst => ExtSstRecord::record_size_for(self.sst.len()),
            })
            .sum()
    }

    /// Write the workbook stream, returning the number of bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> XlsResult<usize> {
        let mut bof_offsets = Vec::with_capacity(self.sheets.len());
        let mut pos = self.globals_size();
        for sheet in &self.sheets {
            bof_offsets.push(pos);
            pos += sheet.serialized_size();
        }

        let mut out = CountingWriter::new(writer);
        let mut sst_position = None;
        for item in &self.items {
            match item {
                GlobalItem::Record(r) => {
                    r.serialize(&mut out)?;
                },
                GlobalItem::BoundSheets => {
                    for (bs, &bof) in self.boundsheets.iter().zip(&bof_offsets) {
                        let mut bs = bs.clone();
                        bs.bof_offset = bof as u32;
                        Record::BoundSheet(bs).serialize(&mut out)?;
                    }
                },
                GlobalItem::LinkTable => {
                    if let Some(table) = &self.link_table {
                        for r in table.records() {
                            r.serialize(&mut out)?;
                        }
                    }
                },
                GlobalItem::SharedStrings => {
                    let start = out.count();
                    let (_, positions) = self.sst.record().serialize_with_positions(&mut out)?;
                    sst_position = Some((start, positions));
                },
                GlobalItem::ExtSst => {
                    let ext = match &sst_position {
                        Some((start, positions)) => ExtSstRecord::from_positions(*start, positions),
                        None => ExtSstRecord::from_positions(0, &[]),
                    };
                    Record::ExtSst(ext).serialize(&mut out)?;
                },
            }
        }
        for (sheet, &bof) in self.sheets.iter().zip(&bof_offsets) {
            if out.count() != bof {
                return Err(XlsError::invalid_record(
                    sid::BOF,
                    format!("sheet written at {} but directory says {}", out.count(), bof),
                ));
            }
            match sheet {
                SheetStream::Worksheet(s) => {
                    s.serialize(&mut out, bof)?;
                },
                SheetStream::Opaque(records) => {
                    crate::records::write_records(&mut out, records)?;
                },
            }
        }
        out.flush()?;
        Ok(out.count())
    }

    pub fn to_bytes(&self) -> XlsResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(bytes)
    }

    // ----- sheets -----

    pub fn sheet_count(&self) -> usize {
        self.boundsheets.len()
    }

    pub fn sheet_name(&self, index: usize) -> Option<&str> {
        self.boundsheets.get(index).map(BoundSheetRecord::sheet_name)
    }

    /// Index of a sheet by name, ignoring case.
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.boundsheets
            .iter()
            .position(|b| b.sheet_name().eq_ignore_ascii_case(name))
    }

    /// Worksheet at `index`; `None` for chart and macro sheets.
    pub fn sheet(&self, index: usize) -> Option<&Sheet> {
        match self.sheets.get(index)? {
            SheetStream::Worksheet(sheet) => Some(sheet),
            SheetStream::Opaque(_) => None,
        }
    }

    pub fn sheet_mut(&mut self, index: usize) -> Option<&mut Sheet> {
        match self.sheets.get_mut(index)? {
            SheetStream::Worksheet(sheet) => Some(sheet),
            SheetStream::Opaque(_) => None,
        }
    }

    pub fn sheet_streams(&self) -> &[SheetStream] {
        &self.sheets
    }

    pub fn boundsheet(&self, index: usize) -> Option<&BoundSheetRecord> {
        self.boundsheets.get(index)
    }

    fn worksheet_mut(&mut self, index: usize) -> XlsResult<&mut Sheet> {
        self.sheet_mut(index)
            .ok_or_else(|| XlsError::invalid_argument(format!("no worksheet at index {}", index)))
    }

    fn check_new_sheet_name(&self, name: &str, ignore: Option<usize>) -> XlsResult<()> {
        validate_sheet_name(name)?;
        match self.sheet_index(name) {
            Some(i) if Some(i) != ignore => Err(XlsError::invalid_argument(format!(
                "the workbook already contains a sheet named '{}'",
                name
            ))),
            _ => Ok(()),
        }
    }

    fn sync_sheet_count(&mut self) {
        let count = self.sheets.len() as u16;
        if let Some(table) = self.link_table.as_mut() {
            table.set_sheet_count(count);
        }
    }

    fn push_sheet(&mut self, bs: BoundSheetRecord, mut sheet: Sheet) -> usize {
        let only = self.sheets.is_empty();
        sheet.set_selected(only);
        sheet.set_display_flag(Window2Flags::ACTIVE, only);
        if !self.items.contains(&GlobalItem::BoundSheets) {
            let at = self.globals_eof_position();
            self.items.insert(at, GlobalItem::BoundSheets);
        }
        self.boundsheets.push(bs);
        self.sheets.push(SheetStream::Worksheet(sheet));
        self.sync_sheet_count();
        self.sheets.len() - 1
    }

    /// Append an empty worksheet. Names are unique ignoring case.
    pub fn create_sheet(&mut self, name: &str) -> XlsResult<usize> {
        self.check_new_sheet_name(name, None)?;
        let index = self.push_sheet(BoundSheetRecord::new(name)?, Sheet::create());
        debug!("created sheet '{}' at index {}", name, index);
        Ok(index)
    }

    /// Deep copy a worksheet under a generated name such as `Data (2)`.
    /// Built-in names of the source sheet are copied too.
    pub fn clone_sheet(&mut self, index: usize) -> XlsResult<usize> {
        let source = self
            .sheet(index)
            .ok_or_else(|| XlsError::invalid_argument(format!("no worksheet at index {}", index)))?
            .clone();
        let source_name = self.sheet_name(index).unwrap_or_default().to_string();
        let name = self.unique_sheet_name(&source_name);
        let mut bs = BoundSheetRecord::new(&name)?;
        if let Some(src) = self.boundsheets.get(index) {
            bs.options = src.options;
        }
        let new_index = self.push_sheet(bs, source);
        if let Some(sheet) = self.sheet_mut(new_index) {
            sheet.set_selected(false);
            sheet.set_display_flag(Window2Flags::ACTIVE, false);
        }

        let built_ins: Vec<NameRecord> = self
            .link_table
            .as_ref()
            .map(|t| {
                t.names()
                    .iter()
                    .filter(|n| n.is_built_in() && n.sheet_index == index as u16 + 1)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for mut name_record in built_ins {
            name_record.sheet_index = new_index as u16 + 1;
            self.link_table_mut().add_name(name_record)?;
        }
        debug!("cloned sheet {} as '{}'", index, name);
        Ok(new_index)
    }

    fn unique_sheet_name(&self, source: &str) -> String {
        let mut unique_index = 2u32;
        let mut base = source.to_string();
        if let Some(open) = source.rfind('(') {
            if open > 0 && source.ends_with(')') {
                if let Ok(n) = source[open + 1..source.len() - 1].trim().parse::<u32>() {
                    unique_index = n + 1;
                    base = source[..open].trim().to_string();
                }
            }
        }
        loop {
            let index = unique_index.to_string();
            unique_index += 1;
            let name = if base.chars().count() + index.len() + 2 < MAX_SHEET_NAME_LEN {
                format!("{} ({})", base, index)
            } else {
                let keep = MAX_SHEET_NAME_LEN - index.len() - 2;
                let truncated: String = base.chars().take(keep).collect();
                format!("{}({})", truncated, index)
            };
            if self.sheet_index(&name).is_none() {
                return name;
            }
        }
    }

    /// Remove a sheet. Extern sheet entries pointing at it become
    /// deleted references and names local to it are dropped.
    pub fn remove_sheet(&mut self, index: usize) -> XlsResult<()> {
        if index >= self.sheets.len() {
            return Err(XlsError::invalid_argument(format!(
                "sheet index {} is out of range",
                index
            )));
        }
        self.sheets.remove(index);
        self.boundsheets.remove(index);
        if let Some(table) = self.link_table.as_mut() {
            table.remove_sheet(index as u16);
        }
        self.sync_sheet_count();
        Ok(())
    }

    pub fn set_sheet_name(&mut self, index: usize, name: &str) -> XlsResult<()> {
        self.check_new_sheet_name(name, Some(index))?;
        let bs = self
            .boundsheets
            .get_mut(index)
            .ok_or_else(|| XlsError::invalid_argument(format!("no sheet at index {}", index)))?;
        *bs = BoundSheetRecord {
            bof_offset: bs.bof_offset,
            options: bs.options,
            ..BoundSheetRecord::new(name)?
        };
        Ok(())
    }

    fn globals_eof_position(&self) -> usize {
        self.items
            .iter()
            .rposition(|i| matches!(i, GlobalItem::Record(r) if r.sid() == sid::EOF))
            .unwrap_or(self.items.len())
    }

    // ----- shared strings -----

    /// SST index of `text`, adding it when new.
    pub fn add_sst_string(&mut self, text: &str) -> u32 {
        if !self.items.contains(&GlobalItem::SharedStrings) {
            let at = self.globals_eof_position();
            self.items
                .splice(at..at, [GlobalItem::SharedStrings, GlobalItem::ExtSst]);
        }
        self.sst.add(text)
    }

    pub fn sst_string(&self, index: u32) -> Option<&str> {
        self.sst.get(index)
    }

    pub fn shared_strings(&self) -> &SharedStrings {
        &self.sst
    }

    // ----- link table and names -----

    pub fn link_table(&self) -> Option<&LinkTable> {
        self.link_table.as_ref()
    }

    /// The link table, created (after COUNTRY or the sheet directory)
    /// when the workbook has none.
    pub fn link_table_mut(&mut self) -> &mut LinkTable {
        if self.link_table.is_none() {
            let at = self
                .items
                .iter()
                .position(|i| matches!(i, GlobalItem::Record(r) if r.sid() == sid::COUNTRY))
                .or_else(|| self.items.iter().position(|i| *i == GlobalItem::BoundSheets))
                .map(|i| i + 1)
                .or_else(|| self.items.iter().position(|i| *i == GlobalItem::SharedStrings))
                .unwrap_or_else(|| self.globals_eof_position());
            debug!("creating link table at global position {}", at);
            self.items.insert(at, GlobalItem::LinkTable);
        }
        let count = self.sheets.len() as u16;
        self.link_table.get_or_insert_with(|| LinkTable::new(count))
    }

    /// Extern sheet index of a sheet, adding an EXTERNSHEET entry when
    /// needed.
    pub fn extern_sheet_index(&mut self, sheet: usize) -> u16 {
        self.link_table_mut().extern_sheet_index(sheet as u16)
    }

    pub fn sheet_index_from_extern_sheet(&self, extern_sheet: u16) -> Option<usize> {
        self.link_table
            .as_ref()?
            .sheet_index_from_extern_sheet(extern_sheet)
            .map(usize::from)
    }

    pub fn resolve_name_x_text(&self, extern_sheet: u16, name_index: u16) -> Option<String> {
        self.link_table
            .as_ref()?
            .resolve_name_x_text(extern_sheet, name_index)
    }

    pub fn name_x_ptg(&self, name: &str) -> Option<Ptg> {
        self.link_table.as_ref()?.name_x_ptg(name)
    }

    /// Add a defined name with an empty formula. `sheet` scopes it to one
    /// sheet; `None` makes it global.
    pub fn create_name(&mut self, name: &str, sheet: Option<usize>) -> XlsResult<usize> {
        if let Some(s) = sheet {
            if s >= self.sheet_count() {
                return Err(XlsError::invalid_argument(format!(
                    "sheet index {} is out of range",
                    s
                )));
            }
        }
        let scope = sheet.map_or(0, |s| s as u16 + 1);
        self.add_name(NameRecord::new(name, scope))
    }

    /// Add a name record. Fails when a name with the same text exists in
    /// the same scope, ignoring case.
    pub fn add_name(&mut self, name: NameRecord) -> XlsResult<usize> {
        self.link_table_mut().add_name(name)
    }

    pub fn name(&self, index: usize) -> Option<&NameRecord> {
        self.link_table.as_ref()?.name(index)
    }

    pub fn name_mut(&mut self, index: usize) -> Option<&mut NameRecord> {
        self.link_table.as_mut()?.name_mut(index)
    }

    pub fn name_count(&self) -> usize {
        self.link_table.as_ref().map_or(0, LinkTable::name_count)
    }

    /// Index of a global name by text, ignoring case.
    pub fn name_index(&self, name: &str) -> Option<usize> {
        self.link_table.as_ref()?.find_name(name, None)
    }

    pub fn remove_name(&mut self, index: usize) -> XlsResult<NameRecord> {
        match self.link_table.as_mut() {
            Some(table) => table.remove_name(index),
            None => Err(XlsError::invalid_argument(format!(
                "name {} does not exist",
                index
            ))),
        }
    }

    /// Parse `text` and store it as the formula of name `index`.
    pub fn set_name_formula(&mut self, index: usize, text: &str) -> XlsResult<()> {
        let tokens = parse_formula(text, self)?;
        let name = self
            .name_mut(index)
            .ok_or_else(|| XlsError::invalid_argument(format!("name {} does not exist", index)))?;
        name.formula = Formula::new(tokens);
        Ok(())
    }

    /// Add a built-in name such as the print area of a sheet.
    pub fn create_built_in_name(&mut self, code: u8, sheet: usize) -> XlsResult<usize> {
        if self.built_in_name(code, sheet).is_some() {
            return Err(XlsError::invalid_argument(format!(
                "built-in name {} already exists for sheet {}",
                code, sheet
            )));
        }
        self.add_name(NameRecord::built_in(code, sheet as u16 + 1))
    }

    pub fn built_in_name(&self, code: u8, sheet: usize) -> Option<&NameRecord> {
        let table = self.link_table.as_ref()?;
        table
            .built_in_name(code, sheet as u16)
            .and_then(|i| table.name(i))
    }

    pub fn remove_built_in_name(&mut self, code: u8, sheet: usize) -> Option<NameRecord> {
        self.link_table
            .as_mut()?
            .remove_built_in_name(code, sheet as u16)
    }

    // ----- write protection -----

    fn file_sharing(&self) -> Option<&FileSharingRecord> {
        self.items.iter().find_map(|i| match i {
            GlobalItem::Record(Record::FileSharing(r)) => Some(r),
            _ => None,
        })
    }

    /// Mark the workbook read-only recommended with a reservation password.
    pub fn write_protect(&mut self, password: &str, username: &str) {
        let record = FileSharingRecord::new(PasswordRecord::hash_password(password), username);
        if let Some(slot) = self.items.iter_mut().find_map(|i| match i {
            GlobalItem::Record(Record::FileSharing(r)) => Some(r),
            _ => None,
        }) {
            *slot = record;
            return;
        }
        let at = self
            .items
            .iter()
            .rposition(|i| matches!(i, GlobalItem::Record(r) if r.sid() == sid::WRITEACCESS))
            .map_or(1, |i| i + 1)
            .min(self.items.len());
        self.items
            .insert(at, GlobalItem::Record(Record::FileSharing(record)));
    }

    pub fn unwrite_protect(&mut self) {
        self.items
            .retain(|i| !matches!(i, GlobalItem::Record(Record::FileSharing(_))));
    }

    pub fn is_write_protected(&self) -> bool {
        self.file_sharing().is_some_and(|r| r.read_only == 1)
    }

    pub fn items(&self) -> &[GlobalItem] {
        &self.items
    }

    // ----- cell helpers -----

    fn cell_xf(&mut self, sheet: usize, row: u32, col: u16) -> XlsResult<u16> {
        Ok(self
            .worksheet_mut(sheet)?
            .cell(row, col)
            .map_or(DEFAULT_XF_INDEX, CellRecord::xf_index))
    }

    fn put_cell(&mut self, sheet: usize, cell: CellRecord) -> XlsResult<()> {
        self.worksheet_mut(sheet)?.replace_cell(cell)?;
        Ok(())
    }

    pub fn set_cell_number(&mut self, sheet: usize, row: u32, col: u16, value: f64) -> XlsResult<()> {
        let xf = self.cell_xf(sheet, row, col)?;
        let cell = NumberRecord {
            cell: CellHeader::new(row, col, xf)?,
            value,
        };
        self.put_cell(sheet, cell.into())
    }

    /// Store a string through the shared string table.
    pub fn set_cell_string(&mut self, sheet: usize, row: u32, col: u16, text: &str) -> XlsResult<()> {
        let xf = self.cell_xf(sheet, row, col)?;
        let header = CellHeader::new(row, col, xf)?;
        let sst_index = self.add_sst_string(text);
        self.put_cell(
            sheet,
            LabelSstRecord {
                cell: header,
                sst_index,
            }
            .into(),
        )
    }

    pub fn set_cell_bool(&mut self, sheet: usize, row: u32, col: u16, value: bool) -> XlsResult<()> {
        let xf = self.cell_xf(sheet, row, col)?;
        let cell = BoolErrRecord {
            cell: CellHeader::new(row, col, xf)?,
            value: BoolErrValue::Bool(value),
        };
        self.put_cell(sheet, cell.into())
    }

    pub fn set_cell_error(&mut self, sheet: usize, row: u32, col: u16, error: ErrorCode) -> XlsResult<()> {
        let xf = self.cell_xf(sheet, row, col)?;
        let cell = BoolErrRecord {
            cell: CellHeader::new(row, col, xf)?,
            value: BoolErrValue::Error(error.code()),
        };
        self.put_cell(sheet, cell.into())
    }

    /// Parse `text` (without the leading `=`) into a formula cell. The
    /// cached result starts as 0 until the cell is evaluated.
    pub fn set_cell_formula(&mut self, sheet: usize, row: u32, col: u16, text: &str) -> XlsResult<()> {
        let xf = self.cell_xf(sheet, row, col)?;
        let header = CellHeader::new(row, col, xf)?;
        let tokens = parse_formula(text, self)?;
        let record = FormulaRecord::new(header, Formula::new(tokens));
        self.put_cell(sheet, FormulaCell::new(record).into())
    }

    /// Formula text of a formula cell.
    pub fn cell_formula(&self, sheet: usize, row: u32, col: u16) -> Option<String> {
        let tokens = self.sheet(sheet)?.row_records().formula_tokens(row, col)?;
        match to_formula_string(&tokens, self) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("cannot render formula at {}:{}:{}: {}", sheet, row, col, e);
                None
            },
        }
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::create()
    }
}

/// Indices of the BOF records that open the substreams after the globals.
fn substream_starts(records: &[Record], from: usize) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut depth = 0usize;
    for (i, record) in records.iter().enumerate().skip(from) {
        match record.sid() {
            sid::BOF => {
                if depth == 0 {
                    starts.push(i);
                }
                depth += 1;
            },
            sid::EOF => depth = depth.saturating_sub(1),
            _ => {},
        }
    }
    starts
}

fn read_substream(records: &[Record], start: usize, options: &ReadOptions) -> XlsResult<SheetStream> {
    let Some(Record::Bof(bof)) = records.get(start) else {
        return Err(XlsError::MissingRecord("BOF"));
    };
    if bof.is_worksheet() {
        let mut rs = RecordStream::starting_at(records, start);
        return Ok(SheetStream::Worksheet(Sheet::read(&mut rs, options)?));
    }

    debug!("keeping {:?} substream as opaque records", bof.bof_type);
    let mut depth = 0usize;
    let mut out = Vec::new();
    for record in &records[start..] {
        match record.sid() {
            sid::BOF => depth += 1,
            sid::EOF => depth -= 1,
            _ => {},
        }
        out.push(record.clone());
        if depth == 0 {
            return Ok(SheetStream::Opaque(out));
        }
    }
    Err(XlsError::UnexpectedEndOfStream)
}

impl FormulaContext for Workbook {
    fn extern_sheet_index(&mut self, sheet_name: &str) -> Option<u16> {
        let sheet = self.sheet_index(sheet_name)?;
        Some(Workbook::extern_sheet_index(self, sheet))
    }

    fn extern_sheet_name(&self, extern_sheet: u16) -> Option<String> {
        if let Some(sheet) = Workbook::sheet_index_from_extern_sheet(self, extern_sheet) {
            return self.sheet_name(sheet).map(str::to_string);
        }
        let (book, sheet) = self.link_table.as_ref()?.external_sheet(extern_sheet)?;
        Some(format!("[{}]{}", book, sheet.unwrap_or_default()))
    }

    fn name_index(&self, name: &str) -> Option<u16> {
        let table = self.link_table.as_ref()?;
        let index = table
            .find_name(name, None)
            .or_else(|| table.names().iter().position(|n| n.name_text().eq_ignore_ascii_case(name)))?;
        Some(index as u16 + 1)
    }

    fn name_text(&self, index: u16) -> Option<String> {
        let i = usize::from(index).checked_sub(1)?;
        self.name(i).map(NameRecord::name_text)
    }

    fn name_x_text(&self, extern_sheet: u16, name_index: u16) -> Option<String> {
        self.resolve_name_x_text(extern_sheet, name_index)
    }
}

impl EvaluationWorkbook for Workbook {
    fn sheet_count(&self) -> usize {
        Workbook::sheet_count(self)
    }

    fn sheet_name(&self, sheet: usize) -> Option<&str> {
        Workbook::sheet_name(self, sheet)
    }

    fn sheet_index(&self, name: &str) -> Option<usize> {
        Workbook::sheet_index(self, name)
    }

    fn cell(&self, sheet: usize, row: u32, col: u16) -> Option<EvaluationCell> {
        let rows = self.sheet(sheet)?.row_records();
        let cell = rows.cell(row, col)?;
        Some(match cell {
            CellRecord::Number(r) => EvaluationCell::Number(r.value),
            CellRecord::Rk(r) => EvaluationCell::Number(r.value()),
            CellRecord::Label(r) => EvaluationCell::Text(r.value.text().to_string()),
            CellRecord::LabelSst(r) => {
                EvaluationCell::Text(self.sst.get(r.sst_index).unwrap_or_default().to_string())
            },
            CellRecord::BoolErr(r) => match r.value {
                BoolErrValue::Bool(b) => EvaluationCell::Bool(b),
                BoolErrValue::Error(code) => EvaluationCell::Error(code),
            },
            CellRecord::Blank(_) => EvaluationCell::Blank,
            CellRecord::Formula(_) => EvaluationCell::Formula(rows.formula_tokens(row, col)),
        })
    }

    fn cells_in_area(
        &self,
        sheet: usize,
        rows: RangeInclusive<u32>,
        cols: RangeInclusive<u16>,
    ) -> Vec<(u32, u16)> {
        let Some(s) = self.sheet(sheet) else {
            return Vec::new();
        };
        s.row_records()
            .cells_in_range(rows, cols)
            .map(|c| (c.row(), c.col()))
            .collect()
    }

    fn sheet_index_from_extern_sheet(&self, extern_sheet: u16) -> Option<usize> {
        Workbook::sheet_index_from_extern_sheet(self, extern_sheet)
    }

    fn name_tokens(&self, name_index: u16) -> Option<Vec<Ptg>> {
        let i = usize::from(name_index).checked_sub(1)?;
        self.name(i)?.formula.tokens().map(<[Ptg]>::to_vec)
    }

    fn name_x_text(&self, extern_sheet: u16, name_index: u16) -> Option<String> {
        self.resolve_name_x_text(extern_sheet, name_index)
    }
}

/// Size of one BOUNDSHEET record; used by tests of the directory layout.
#[cfg(test)]
fn boundsheet_size(name: &str) -> usize {
    crate::records::RECORD_HEADER_SIZE + 8 + name.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_round_trip() {
        let mut book = Workbook::create();
        let data = book.create_sheet("Data").unwrap();
        book.create_sheet("Other").unwrap();
        book.set_cell_number(data, 0, 0, 5.0).unwrap();
        book.set_cell_string(data, 1, 0, "hello").unwrap();
        book.set_cell_bool(data, 2, 0, true).unwrap();
        book.set_cell_formula(data, 0, 1, "A1*2+1").unwrap();

        let bytes = book.to_bytes().unwrap();
        let reread = Workbook::from_bytes(&bytes).unwrap();
        assert_eq!(reread.sheet_count(), 2);
        assert_eq!(reread.sheet_name(1), Some("Other"));
        assert_eq!(reread.sst_string(0), Some("hello"));
        assert_eq!(reread.cell_formula(data, 0, 1).as_deref(), Some("A1*2+1"));
        assert_eq!(reread.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_boundsheet_offsets_point_at_bof() {
        let mut book = Workbook::create();
        book.create_sheet("A").unwrap();
        book.create_sheet("B").unwrap();
        let bytes = book.to_bytes().unwrap();
        let reread = Workbook::from_bytes(&bytes).unwrap();
        for i in 0..2 {
            let offset = reread.boundsheet(i).unwrap().bof_offset as usize;
            assert_eq!(u16::from_le_bytes([bytes[offset], bytes[offset + 1]]), sid::BOF);
        }
        assert_eq!(
            Record::BoundSheet(BoundSheetRecord::new("A").unwrap()).serialized_size(),
            boundsheet_size("A")
        );
    }

    #[test]
    fn test_sheet_names_are_unique_ignoring_case() {
        let mut book = Workbook::create();
        book.create_sheet("Sales").unwrap();
        assert!(book.create_sheet("SALES").is_err());
        assert!(book.create_sheet("bad/name").is_err());
        assert_eq!(book.sheet_index("sales"), Some(0));
    }

    #[test]
    fn test_clone_sheet_names() {
        let mut book = Workbook::create();
        book.create_sheet("Data").unwrap();
        let copy = book.clone_sheet(0).unwrap();
        assert_eq!(book.sheet_name(copy), Some("Data (2)"));
        let copy = book.clone_sheet(copy).unwrap();
        assert_eq!(book.sheet_name(copy), Some("Data (3)"));

        book.create_sheet("ABCDEFGHIJKLMNOPQRSTUVWXYZABCDE").unwrap();
        let copy = book.clone_sheet(3).unwrap();
        assert_eq!(book.sheet_name(copy), Some("ABCDEFGHIJKLMNOPQRSTUVWXYZAB(2)"));
    }

    #[test]
    fn test_clone_sheet_is_independent() {
        let mut book = Workbook::create();
        book.create_sheet("Data").unwrap();
        book.set_cell_number(0, 0, 0, 1.0).unwrap();
        let copy = book.clone_sheet(0).unwrap();
        book.set_cell_number(copy, 5, 5, 2.0).unwrap();
        assert!(book.sheet(0).unwrap().cell(5, 5).is_none());
        assert!(!book.sheet(copy).unwrap().is_selected());
    }

    #[test]
    fn test_names() {
        let mut book = Workbook::create();
        book.create_sheet("Data").unwrap();
        let i = book.create_name("Total", None).unwrap();
        assert!(book.create_name("TOTAL", None).is_err());
        book.create_name("Total", Some(0)).unwrap();
        book.set_name_formula(i, "Data!$A$1").unwrap();
        assert_eq!(book.name_index("total"), Some(i));
        assert_eq!(FormulaContext::name_index(&book, "Total"), Some(i as u16 + 1));
        assert_eq!(book.name_count(), 2);
        book.remove_name(i).unwrap();
        assert_eq!(book.name_count(), 1);
    }

    #[test]
    fn test_cross_sheet_formula_uses_extern_sheet() {
        let mut book = Workbook::create();
        book.create_sheet("One").unwrap();
        book.create_sheet("Two").unwrap();
        book.set_cell_formula(0, 0, 0, "Two!B2+1").unwrap();
        assert_eq!(book.sheet_index_from_extern_sheet(0), Some(1));
        assert_eq!(book.cell_formula(0, 0, 0).as_deref(), Some("Two!B2+1"));

        let reread = Workbook::from_bytes(&book.to_bytes().unwrap()).unwrap();
        assert_eq!(reread.cell_formula(0, 0, 0).as_deref(), Some("Two!B2+1"));
    }

    #[test]
    fn test_remove_sheet_updates_links() {
        let mut book = Workbook::create();
        book.create_sheet("One").unwrap();
        book.create_sheet("Two").unwrap();
        book.create_sheet("Three").unwrap();
        book.set_cell_formula(0, 0, 0, "Three!A1").unwrap();
        book.remove_sheet(1).unwrap();
        assert_eq!(book.sheet_count(), 2);
        assert_eq!(book.cell_formula(0, 0, 0).as_deref(), Some("Three!A1"));
    }

    #[test]
    fn test_write_protection() {
        let mut book = Workbook::create();
        assert!(!book.is_write_protected());
        book.write_protect("secret", "me");
        assert!(book.is_write_protected());
        let reread = Workbook::from_bytes(&book.to_bytes().unwrap()).unwrap();
        assert!(reread.is_write_protected());
        book.unwrite_protect();
        assert!(!book.is_write_protected());
    }

    #[test]
    fn test_missing_workbook_bof() {
        let bytes = Record::from(crate::records::EofRecord).to_bytes().unwrap();
        assert!(Workbook::from_bytes(&bytes).is_err());
    }
}
