//! Workbook link table: supporting books, the extern sheet list and
//! defined names.

use super::{RecordAggregate, RecordStream};
use crate::common::error::{XlsError, XlsResult};
use crate::formula::{OperandClass, Ptg};
use crate::records::{
    CrnRecord, ExternNameRecord, ExternSheetRecord, ExternSheetRef, NameRecord, Record,
    SupBookKind, SupBookRecord, XctRecord, sid,
};
use log::debug;

/// Sheet span used for references that do not point into a sheet.
const NO_SHEET: u16 = 0xFFFE;
/// Sheet index given to references whose sheet has been deleted.
const DELETED_SHEET: u16 = 0xFFFF;

/// Cached values of one external sheet.
#[derive(Debug, Clone, PartialEq)]
struct CrnBlock {
    count: XctRecord,
    crns: Vec<CrnRecord>,
}

impl CrnBlock {
    fn read(rs: &mut RecordStream<'_>) -> XlsResult<Self> {
        let Record::Xct(count) = rs.expect(sid::XCT)? else {
            return Err(XlsError::MissingRecord("XCT"));
        };
        let mut crns = Vec::with_capacity(count.crn_count as usize);
        for _ in 0..count.crn_count {
            match rs.next() {
                Some(Record::Crn(crn)) => crns.push(crn.clone()),
                Some(other) => {
                    return Err(XlsError::UnexpectedRecordType {
                        expected: sid::CRN,
                        found: other.sid(),
                    });
                },
                None => return Err(XlsError::UnexpectedEndOfStream),
            }
        }
        Ok(Self {
            count: *count,
            crns,
        })
    }
}

/// A SUPBOOK with its external names and cached cell blocks.
#[derive(Debug, Clone, PartialEq)]
struct ExternalBook {
    supbook: SupBookRecord,
    names: Vec<ExternNameRecord>,
    crn_blocks: Vec<CrnBlock>,
}

impl ExternalBook {
    fn new(supbook: SupBookRecord) -> Self {
        Self {
            supbook,
            names: Vec::new(),
            crn_blocks: Vec::new(),
        }
    }

    fn read(rs: &mut RecordStream<'_>) -> XlsResult<Self> {
        let Record::SupBook(supbook) = rs.expect(sid::SUPBOOK)? else {
            return Err(XlsError::MissingRecord("SUPBOOK"));
        };
        let mut book = Self::new(supbook.clone());
        while let Some(Record::ExternName(name)) = rs.peek() {
            book.names.push(name.clone());
            rs.next();
        }
        while rs.peek_sid() == Some(sid::XCT) {
            book.crn_blocks.push(CrnBlock::read(rs)?);
        }
        Ok(book)
    }

    fn index_of_name(&self, name: &str) -> Option<usize> {
        self.names
            .iter()
            .position(|n| n.text().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkTable {
    books: Vec<ExternalBook>,
    extern_sheet: ExternSheetRecord,
    names: Vec<NameRecord>,
}

impl LinkTable {
    /// Link table of a new workbook: one internal SUPBOOK and an empty
    /// extern sheet list.
    pub fn new(sheet_count: u16) -> Self {
        Self {
            books: vec![ExternalBook::new(SupBookRecord::internal(sheet_count))],
            extern_sheet: ExternSheetRecord::default(),
            names: Vec::new(),
        }
    }

    /// Whether `sid` can start a link table.
    pub fn is_start(sid: u16) -> bool {
        matches!(sid, sid::SUPBOOK | sid::EXTERNSHEET | sid::NAME)
    }

    /// Read SUPBOOK blocks, the EXTERNSHEET records and NAME records.
    pub fn read(rs: &mut RecordStream<'_>) -> XlsResult<Self> {
        let mut books = Vec::new();
        while rs.peek_sid() == Some(sid::SUPBOOK) {
            books.push(ExternalBook::read(rs)?);
        }

        let mut sheets = Vec::new();
        while let Some(Record::ExternSheet(rec)) = rs.peek() {
            sheets.push(rec.clone());
            rs.next();
        }
        if !books.is_empty() && sheets.is_empty() {
            return Err(XlsError::MissingRecord("EXTERNSHEET"));
        }
        if sheets.len() > 1 {
            debug!("combining {} EXTERNSHEET records", sheets.len());
        }

        let mut names = Vec::new();
        while let Some(Record::Name(name)) = rs.peek() {
            names.push(name.clone());
            rs.next();
        }

        Ok(Self {
            books,
            extern_sheet: ExternSheetRecord::combine(sheets),
            names,
        })
    }

    fn internal_book_index(&self) -> Option<usize> {
        self.books.iter().position(|b| b.supbook.is_internal())
    }

    /// Keep the internal SUPBOOK's sheet count current.
    pub fn set_sheet_count(&mut self, sheet_count: u16) {
        if let Some(i) = self.internal_book_index() {
            self.books[i].supbook.kind = SupBookKind::Internal { sheet_count };
        }
    }

    /// Extern sheet index for a sheet of this workbook, adding an entry
    /// when none exists yet.
    pub fn extern_sheet_index(&mut self, sheet: u16) -> u16 {
        let book = match self.internal_book_index() {
            Some(i) => i,
            None => {
                self.books
                    .push(ExternalBook::new(SupBookRecord::internal(sheet + 1)));
                self.books.len() - 1
            },
        } as u16;
        let index = match self.extern_sheet.find(book, sheet, sheet) {
            Some(i) => i,
            None => self.extern_sheet.add(book, sheet, sheet),
        };
        index as u16
    }

    /// First sheet an extern sheet entry points at, if it is a sheet of
    /// this workbook that still exists.
    pub fn sheet_index_from_extern_sheet(&self, extern_sheet: u16) -> Option<u16> {
        let r = self.extern_sheet.refs.get(extern_sheet as usize)?;
        let book = self.books.get(r.supbook_index as usize)?;
        if !book.supbook.is_internal() || r.first_sheet >= NO_SHEET {
            return None;
        }
        Some(r.first_sheet)
    }

    /// Book URL and sheet name of an entry pointing into another workbook.
    pub fn external_sheet(&self, extern_sheet: u16) -> Option<(&str, Option<&str>)> {
        let r = self.extern_sheet_ref(extern_sheet)?;
        match &self.books.get(r.supbook_index as usize)?.supbook.kind {
            SupBookKind::External { url, sheet_names } => Some((
                url.text(),
                sheet_names.get(r.first_sheet as usize).map(|s| s.text()),
            )),
            _ => None,
        }
    }

    pub fn extern_sheet_ref(&self, extern_sheet: u16) -> Option<&ExternSheetRef> {
        self.extern_sheet.refs.get(extern_sheet as usize)
    }

    /// Text of the external name `name_index` (one-based) of the book
    /// behind `extern_sheet`.
    pub fn resolve_name_x_text(&self, extern_sheet: u16, name_index: u16) -> Option<String> {
        let r = self.extern_sheet_ref(extern_sheet)?;
        let book = self.books.get(r.supbook_index as usize)?;
        let i = usize::from(name_index).checked_sub(1)?;
        book.names.get(i).map(|n| n.text().to_string())
    }

    /// `tNameX` token for an external name that is already referenced
    /// through the extern sheet list.
    pub fn name_x_ptg(&self, name: &str) -> Option<Ptg> {
        self.books.iter().enumerate().find_map(|(i, book)| {
            let name_index = book.index_of_name(name)?;
            let extern_sheet = self
                .extern_sheet
                .refs
                .iter()
                .position(|r| r.supbook_index as usize == i)?;
            Some(Ptg::NameX {
                class: OperandClass::Value,
                extern_sheet: extern_sheet as u16,
                name_index: name_index as u16 + 1,
                reserved: 0,
            })
        })
    }

    /// Register an add-in function name and return the `tNameX` token
    /// that calls it.
    pub fn add_add_in_function(&mut self, name: &str) -> Ptg {
        if let Some(ptg) = self.name_x_ptg(name) {
            return ptg;
        }
        let book = match self.books.iter().position(|b| b.supbook.is_add_in()) {
            Some(i) => i,
            None => {
                self.books.push(ExternalBook::new(SupBookRecord::add_in()));
                self.books.len() - 1
            },
        };
        self.books[book]
            .names
            .push(ExternNameRecord::add_in_function(name));
        let name_index = self.books[book].names.len() as u16;
        let book = book as u16;
        let extern_sheet = match self.extern_sheet.find(book, NO_SHEET, NO_SHEET) {
            Some(i) => i,
            None => self.extern_sheet.add(book, NO_SHEET, NO_SHEET),
        };
        Ptg::NameX {
            class: OperandClass::Value,
            extern_sheet: extern_sheet as u16,
            name_index,
            reserved: 0,
        }
    }

    /// Point references to a removed sheet at nothing and shift later
    /// sheets down. Names local to the sheet are dropped.
    pub fn remove_sheet(&mut self, sheet: u16) {
        if let Some(book) = self.internal_book_index() {
            let book = book as u16;
            for r in &mut self.extern_sheet.refs {
                if r.supbook_index != book {
                    continue;
                }
                for index in [&mut r.first_sheet, &mut r.last_sheet] {
                    if *index >= NO_SHEET {
                        continue;
                    }
                    if *index == sheet {
                        *index = DELETED_SHEET;
                    } else if *index > sheet {
                        *index -= 1;
                    }
                }
            }
        }
        // NAME sheet numbers are one-based.
        let local = sheet + 1;
        self.names.retain(|n| n.sheet_index != local);
        for name in &mut self.names {
            if name.sheet_index > local {
                name.sheet_index -= 1;
            }
        }
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    pub fn name(&self, index: usize) -> Option<&NameRecord> {
        self.names.get(index)
    }

    pub fn name_mut(&mut self, index: usize) -> Option<&mut NameRecord> {
        self.names.get_mut(index)
    }

    pub fn names(&self) -> &[NameRecord] {
        &self.names
    }

    /// Whether another name with the same text (ignoring case) and scope
    /// exists.
    pub fn name_already_exists(&self, name: &NameRecord) -> bool {
        let text = name.name_text();
        self.names.iter().any(|n| {
            !std::ptr::eq(n, name)
                && n.sheet_index == name.sheet_index
                && n.name_text().eq_ignore_ascii_case(&text)
        })
    }

    /// Append a name, returning its zero-based index.
    pub fn add_name(&mut self, name: NameRecord) -> XlsResult<usize> {
        if self.name_already_exists(&name) {
            return Err(XlsError::invalid_argument(format!(
                "name '{}' already exists in this scope",
                name.name_text()
            )));
        }
        self.names.push(name);
        Ok(self.names.len() - 1)
    }

    pub fn remove_name(&mut self, index: usize) -> XlsResult<NameRecord> {
        if index >= self.names.len() {
            return Err(XlsError::invalid_argument(format!(
                "name {} does not exist",
                index
            )));
        }
        Ok(self.names.remove(index))
    }

    /// Index of a name by text. A sheet-local name wins over a global one.
    pub fn find_name(&self, text: &str, sheet: Option<u16>) -> Option<usize> {
        let matches = |n: &NameRecord, scope: u16| {
            n.sheet_index == scope && n.name_text().eq_ignore_ascii_case(text)
        };
        sheet
            .and_then(|s| self.names.iter().position(|n| matches(n, s + 1)))
            .or_else(|| self.names.iter().position(|n| matches(n, 0)))
    }

    /// Built-in name (print area, titles, ...) of a sheet.
    pub fn built_in_name(&self, code: u8, sheet: u16) -> Option<usize> {
        self.names
            .iter()
            .position(|n| n.built_in_code() == Some(code) && n.sheet_index == sheet + 1)
    }

    pub fn remove_built_in_name(&mut self, code: u8, sheet: u16) -> Option<NameRecord> {
        let i = self.built_in_name(code, sheet)?;
        Some(self.names.remove(i))
    }
}

impl RecordAggregate for LinkTable {
    fn visit_contained_records(&self, visitor: &mut dyn FnMut(Record)) {
        for book in &self.books {
            visitor(Record::SupBook(book.supbook.clone()));
            for name in &book.names {
                visitor(Record::ExternName(name.clone()));
            }
            for block in &book.crn_blocks {
                let mut count = block.count;
                count.crn_count = block.crns.len() as u16;
                visitor(Record::Xct(count));
                for crn in &block.crns {
                    visitor(Record::Crn(crn.clone()));
                }
            }
        }
        if !self.books.is_empty() {
            if self.extern_sheet.refs.is_empty() {
                visitor(Record::ExternSheet(ExternSheetRecord::default()));
            }
            for chunk in self.extern_sheet.refs.chunks(ExternSheetRecord::MAX_REFS) {
                visitor(Record::ExternSheet(ExternSheetRecord {
                    refs: chunk.to_vec(),
                }));
            }
        }
        for name in &self.names {
            visitor(Record::Name(name.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extern_sheet_index_is_stable() {
        let mut table = LinkTable::new(3);
        assert_eq!(table.extern_sheet_index(2), 0);
        assert_eq!(table.extern_sheet_index(0), 1);
        assert_eq!(table.extern_sheet_index(2), 0);
        assert_eq!(table.sheet_index_from_extern_sheet(1), Some(0));
        assert_eq!(table.sheet_index_from_extern_sheet(7), None);
    }

    #[test]
    fn test_round_trip() {
        let mut table = LinkTable::new(2);
        table.extern_sheet_index(1);
        table.add_name(NameRecord::new("Total", 0)).unwrap();
        let records = table.records();
        let sids: Vec<u16> = records.iter().map(Record::sid).collect();
        assert_eq!(sids, vec![sid::SUPBOOK, sid::EXTERNSHEET, sid::NAME]);
        let mut rs = RecordStream::new(&records);
        assert_eq!(LinkTable::read(&mut rs).unwrap(), table);
        assert!(!rs.has_next());
    }

    #[test]
    fn test_duplicate_names_by_scope() {
        let mut table = LinkTable::new(2);
        table.add_name(NameRecord::new("Rate", 0)).unwrap();
        assert!(table.add_name(NameRecord::new("RATE", 0)).is_err());
        table.add_name(NameRecord::new("rate", 1)).unwrap();
        assert_eq!(table.find_name("Rate", Some(0)), Some(1));
        assert_eq!(table.find_name("Rate", Some(1)), Some(0));
        assert_eq!(table.find_name("Rate", None), Some(0));
    }

    #[test]
    fn test_add_in_function() {
        let mut table = LinkTable::new(1);
        let ptg = table.add_add_in_function("EDATE");
        let Ptg::NameX {
            extern_sheet,
            name_index,
            ..
        } = ptg
        else {
            panic!("expected tNameX");
        };
        assert_eq!(name_index, 1);
        assert_eq!(
            table.resolve_name_x_text(extern_sheet, name_index).as_deref(),
            Some("EDATE")
        );
        assert_eq!(table.name_x_ptg("edate"), Some(ptg.clone()));
        assert_eq!(table.add_add_in_function("EDATE"), ptg);
        assert_eq!(table.sheet_index_from_extern_sheet(extern_sheet), None);
    }

    #[test]
    fn test_remove_sheet_shifts_refs_and_names() {
        let mut table = LinkTable::new(3);
        table.extern_sheet_index(0);
        table.extern_sheet_index(1);
        table.extern_sheet_index(2);
        table.add_name(NameRecord::new("Local", 2)).unwrap();
        table.add_name(NameRecord::new("Later", 3)).unwrap();
        table.remove_sheet(1);
        assert_eq!(table.sheet_index_from_extern_sheet(0), Some(0));
        assert_eq!(table.sheet_index_from_extern_sheet(1), None);
        assert_eq!(table.sheet_index_from_extern_sheet(2), Some(1));
        assert_eq!(table.name_count(), 1);
        assert_eq!(table.name(0).unwrap().sheet_index, 2);
    }

    #[test]
    fn test_extern_sheet_split_and_combined() {
        let mut table = LinkTable::new(1);
        for i in 0..(ExternSheetRecord::MAX_REFS as u16 + 5) {
            table.extern_sheet.add(0, i, i);
        }
        let records = table.records();
        assert_eq!(
            records
                .iter()
                .filter(|r| r.sid() == sid::EXTERNSHEET)
                .count(),
            2
        );
        assert_eq!(LinkTable::read(&mut RecordStream::new(&records)).unwrap(), table);
    }
}
