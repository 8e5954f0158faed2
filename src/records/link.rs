//! Link table records: supporting workbooks, external names, cached
//! external cell values, the extern sheet list and defined names.

use super::strings::XlString;
use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use crate::formula::Formula;
use bytes::Bytes;
use std::io::Write;

const INTERNAL_REFERENCES: u16 = 0x0401;
const ADD_IN_FUNCTIONS: u16 = 0x3A01;

/// What a SUPBOOK record refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupBookKind {
    /// Sheets of this workbook.
    Internal { sheet_count: u16 },
    /// Add-in function names.
    AddIn,
    /// Another workbook, with its sheet names.
    External {
        url: XlString,
        sheet_names: Vec<XlString>,
    },
}

/// Record type: 0x01AE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupBookRecord {
    pub kind: SupBookKind,
}

impl SupBookRecord {
    pub fn internal(sheet_count: u16) -> Self {
        Self {
            kind: SupBookKind::Internal { sheet_count },
        }
    }

    pub fn add_in() -> Self {
        Self {
            kind: SupBookKind::AddIn,
        }
    }

    pub fn external(url: impl Into<String>, sheet_names: &[&str]) -> Self {
        Self {
            kind: SupBookKind::External {
                url: XlString::new(url),
                sheet_names: sheet_names.iter().map(|s| XlString::new(*s)).collect(),
            },
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.kind, SupBookKind::Internal { .. })
    }

    pub fn is_add_in(&self) -> bool {
        matches!(self.kind, SupBookKind::AddIn)
    }
}

impl BiffRecord for SupBookRecord {
    const SID: u16 = sid::SUPBOOK;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let count = r.read_u16()?;
        let cch = r.read_u16()?;
        let kind = match cch {
            INTERNAL_REFERENCES if r.is_empty() => SupBookKind::Internal { sheet_count: count },
            ADD_IN_FUNCTIONS if r.is_empty() => SupBookKind::AddIn,
            _ => {
                let url = XlString::read_no_cch(&mut r, cch as usize)?;
                let mut sheet_names = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    sheet_names.push(XlString::read(&mut r)?);
                }
                r.expect_end()?;
                SupBookKind::External { url, sheet_names }
            },
        };
        Ok(Self { kind })
    }

    fn data_size(&self) -> usize {
        match &self.kind {
            SupBookKind::Internal { .. } | SupBookKind::AddIn => 4,
            SupBookKind::External { url, sheet_names } => {
                4 + 1
                    + url.data_size()
                    + sheet_names.iter().map(XlString::encoded_size).sum::<usize>()
            },
        }
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        match &self.kind {
            SupBookKind::Internal { sheet_count } => {
                writer.write_all(&sheet_count.to_le_bytes())?;
                writer.write_all(&INTERNAL_REFERENCES.to_le_bytes())?;
            },
            SupBookKind::AddIn => {
                writer.write_all(&1u16.to_le_bytes())?;
                writer.write_all(&ADD_IN_FUNCTIONS.to_le_bytes())?;
            },
            SupBookKind::External { url, sheet_names } => {
                writer.write_all(&(sheet_names.len() as u16).to_le_bytes())?;
                url.write(writer)?;
                for name in sheet_names {
                    name.write(writer)?;
                }
            },
        }
        Ok(())
    }
}

/// A name defined in another workbook or an add-in function.
///
/// Record type: 0x0023
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternNameRecord {
    pub options: u16,
    pub reserved: u32,
    pub name: XlString,
    /// Definition or DDE/OLE value data that follows the name, kept verbatim.
    pub tail: Bytes,
}

impl ExternNameRecord {
    /// Add-in function name as referenced by tNameX.
    pub fn add_in_function(name: impl Into<String>) -> Self {
        Self {
            options: 0,
            reserved: 0,
            name: XlString::new(name),
            // cce 2: tErr #REF!
            tail: Bytes::from_static(&[0x02, 0x00, 0x1C, 0x17]),
        }
    }

    pub fn text(&self) -> &str {
        self.name.text()
    }
}

impl BiffRecord for ExternNameRecord {
    const SID: u16 = sid::EXTERNNAME;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let options = r.read_u16()?;
        let reserved = r.read_u32()?;
        let name = XlString::read_short(&mut r)?;
        let tail = Bytes::copy_from_slice(r.read_remaining());
        Ok(Self {
            options,
            reserved,
            name,
            tail,
        })
    }

    fn data_size(&self) -> usize {
        6 + self.name.encoded_size_short() + self.tail.len()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.options.to_le_bytes())?;
        writer.write_all(&self.reserved.to_le_bytes())?;
        self.name.write_short(writer)?;
        writer.write_all(&self.tail)?;
        Ok(())
    }
}

/// Number of CRN records cached for one external sheet.
///
/// Record type: 0x0059
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XctRecord {
    pub crn_count: u16,
    pub sheet_index: u16,
}

impl BiffRecord for XctRecord {
    const SID: u16 = sid::XCT;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let crn_count = r.read_u16()?;
        let sheet_index = r.read_u16()?;
        r.expect_end()?;
        Ok(Self {
            crn_count,
            sheet_index,
        })
    }

    fn data_size(&self) -> usize {
        4
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.crn_count.to_le_bytes())?;
        writer.write_all(&self.sheet_index.to_le_bytes())?;
        Ok(())
    }
}

/// Cached values of one row of an external sheet.
///
/// Record type: 0x005A
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrnRecord {
    pub last_col: u8,
    pub first_col: u8,
    pub row: u16,
    /// Encoded constant values, one per column.
    pub values: Bytes,
}

impl BiffRecord for CrnRecord {
    const SID: u16 = sid::CRN;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        Ok(Self {
            last_col: r.read_u8()?,
            first_col: r.read_u8()?,
            row: r.read_u16()?,
            values: Bytes::copy_from_slice(r.read_remaining()),
        })
    }

    fn data_size(&self) -> usize {
        4 + self.values.len()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&[self.last_col, self.first_col])?;
        writer.write_all(&self.row.to_le_bytes())?;
        writer.write_all(&self.values)?;
        Ok(())
    }
}

/// One EXTERNSHEET entry: a SUPBOOK and a sheet span within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternSheetRef {
    pub supbook_index: u16,
    pub first_sheet: u16,
    pub last_sheet: u16,
}

/// Record type: 0x0017
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternSheetRecord {
    pub refs: Vec<ExternSheetRef>,
}

impl ExternSheetRecord {
    /// Most entries one record can hold.
    pub const MAX_REFS: usize = (super::MAX_RECORD_DATA_SIZE - 2) / 6;

    /// Index of an existing entry.
    pub fn find(&self, supbook_index: u16, first_sheet: u16, last_sheet: u16) -> Option<usize> {
        self.refs.iter().position(|r| {
            r.supbook_index == supbook_index
                && r.first_sheet == first_sheet
                && r.last_sheet == last_sheet
        })
    }

    /// Append an entry and return its index.
    pub fn add(&mut self, supbook_index: u16, first_sheet: u16, last_sheet: u16) -> usize {
        self.refs.push(ExternSheetRef {
            supbook_index,
            first_sheet,
            last_sheet,
        });
        self.refs.len() - 1
    }

    /// Merge the entries of records split by the writer.
    pub fn combine(records: impl IntoIterator<Item = ExternSheetRecord>) -> Self {
        Self {
            refs: records.into_iter().flat_map(|r| r.refs).collect(),
        }
    }
}

impl BiffRecord for ExternSheetRecord {
    const SID: u16 = sid::EXTERNSHEET;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let count = r.read_u16()? as usize;
        if r.remaining() != count * 6 {
            return Err(XlsError::InvalidLength {
                sid: Self::SID,
                expected: 2 + count * 6,
                found: data.len(),
            });
        }
        let mut refs = Vec::with_capacity(count);
        for _ in 0..count {
            refs.push(ExternSheetRef {
                supbook_index: r.read_u16()?,
                first_sheet: r.read_u16()?,
                last_sheet: r.read_u16()?,
            });
        }
        Ok(Self { refs })
    }

    fn data_size(&self) -> usize {
        2 + 6 * self.refs.len()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&(self.refs.len() as u16).to_le_bytes())?;
        for r in &self.refs {
            writer.write_all(&r.supbook_index.to_le_bytes())?;
            writer.write_all(&r.first_sheet.to_le_bytes())?;
            writer.write_all(&r.last_sheet.to_le_bytes())?;
        }
        Ok(())
    }
}

/// NAME option bits.
pub mod name_options {
    pub const HIDDEN: u16 = 0x0001;
    pub const FUNCTION: u16 = 0x0002;
    pub const COMMAND: u16 = 0x0004;
    pub const MACRO: u16 = 0x0008;
    pub const COMPLEX: u16 = 0x0010;
    pub const BUILT_IN: u16 = 0x0020;
}

/// Codes of the built-in names.
pub mod built_in {
    pub const CONSOLIDATE_AREA: u8 = 0x00;
    pub const AUTO_OPEN: u8 = 0x01;
    pub const AUTO_CLOSE: u8 = 0x02;
    pub const EXTRACT: u8 = 0x03;
    pub const DATABASE: u8 = 0x04;
    pub const CRITERIA: u8 = 0x05;
    pub const PRINT_AREA: u8 = 0x06;
    pub const PRINT_TITLES: u8 = 0x07;
    pub const RECORDER: u8 = 0x08;
    pub const DATA_FORM: u8 = 0x09;
    pub const AUTO_ACTIVATE: u8 = 0x0A;
    pub const AUTO_DEACTIVATE: u8 = 0x0B;
    pub const SHEET_TITLE: u8 = 0x0C;
    pub const FILTER_DB: u8 = 0x0D;
}

/// Display text of a built-in name code.
pub fn built_in_name_text(code: u8) -> &'static str {
    match code {
        built_in::CONSOLIDATE_AREA => "Consolidate_Area",
        built_in::AUTO_OPEN => "Auto_Open",
        built_in::AUTO_CLOSE => "Auto_Close",
        built_in::EXTRACT => "Extract",
        built_in::DATABASE => "Database",
        built_in::CRITERIA => "Criteria",
        built_in::PRINT_AREA => "Print_Area",
        built_in::PRINT_TITLES => "Print_Titles",
        built_in::RECORDER => "Recorder",
        built_in::DATA_FORM => "Data_Form",
        built_in::AUTO_ACTIVATE => "Auto_Activate",
        built_in::AUTO_DEACTIVATE => "Auto_Deactivate",
        built_in::SHEET_TITLE => "Sheet_Title",
        built_in::FILTER_DB => "_FilterDatabase",
        _ => "Unknown",
    }
}

/// A defined name.
///
/// Record type: 0x0018
#[derive(Debug, Clone, PartialEq)]
pub struct NameRecord {
    pub options: u16,
    pub keyboard_shortcut: u8,
    pub reserved: u16,
    /// One-based sheet index for sheet-local names, 0 for global names.
    pub sheet_index: u16,
    /// Name text; built-in names hold a single character with the code.
    pub name: XlString,
    pub formula: Formula,
    pub menu_text: Option<XlString>,
    pub description: Option<XlString>,
    pub help_text: Option<XlString>,
    pub status_text: Option<XlString>,
}

impl NameRecord {
    pub fn new(name: impl Into<String>, sheet_index: u16) -> Self {
        Self {
            options: 0,
            keyboard_shortcut: 0,
            reserved: 0,
            sheet_index,
            name: XlString::new(name),
            formula: Formula::default(),
            menu_text: None,
            description: None,
            help_text: None,
            status_text: None,
        }
    }

    pub fn built_in(code: u8, sheet_index: u16) -> Self {
        let mut rec = Self::new(char::from(code).to_string(), sheet_index);
        rec.options |= name_options::BUILT_IN;
        rec
    }

    pub fn is_built_in(&self) -> bool {
        self.options & name_options::BUILT_IN != 0
    }

    pub fn is_hidden(&self) -> bool {
        self.options & name_options::HIDDEN != 0
    }

    pub fn is_function(&self) -> bool {
        self.options & name_options::FUNCTION != 0
    }

    pub fn built_in_code(&self) -> Option<u8> {
        if !self.is_built_in() {
            return None;
        }
        self.name.text().chars().next().map(|c| c as u32 as u8)
    }

    /// Text used in formulas.
    pub fn name_text(&self) -> String {
        match self.built_in_code() {
            Some(code) => built_in_name_text(code).to_string(),
            None => self.name.text().to_string(),
        }
    }

    fn optional_len(text: &Option<XlString>) -> XlsResult<u8> {
        let n = text.as_ref().map_or(0, XlString::char_count);
        u8::try_from(n).map_err(|_| XlsError::invalid_argument("name text longer than 255"))
    }
}

fn read_optional(r: &mut LittleEndianReader<'_>, cch: u8) -> XlsResult<Option<XlString>> {
    if cch == 0 {
        return Ok(None);
    }
    XlString::read_no_cch(r, cch as usize).map(Some)
}

impl BiffRecord for NameRecord {
    const SID: u16 = sid::NAME;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let options = r.read_u16()?;
        let keyboard_shortcut = r.read_u8()?;
        let name_len = r.read_u8()?;
        let cce = r.read_u16()? as usize;
        let reserved = r.read_u16()?;
        let sheet_index = r.read_u16()?;
        let menu_len = r.read_u8()?;
        let description_len = r.read_u8()?;
        let help_len = r.read_u8()?;
        let status_len = r.read_u8()?;
        let name = XlString::read_no_cch(&mut r, name_len as usize)?;
        let formula = Formula::read(&mut r, cce)?;
        let menu_text = read_optional(&mut r, menu_len)?;
        let description = read_optional(&mut r, description_len)?;
        let help_text = read_optional(&mut r, help_len)?;
        let status_text = read_optional(&mut r, status_len)?;
        r.expect_end()?;
        Ok(Self {
            options,
            keyboard_shortcut,
            reserved,
            sheet_index,
            name,
            formula,
            menu_text,
            description,
            help_text,
            status_text,
        })
    }

    fn data_size(&self) -> usize {
        let optional = |t: &Option<XlString>| t.as_ref().map_or(0, |s| 1 + s.data_size());
        14 + 1
            + self.name.data_size()
            + self.formula.encoded_size()
            + optional(&self.menu_text)
            + optional(&self.description)
            + optional(&self.help_text)
            + optional(&self.status_text)
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        let name_len = u8::try_from(self.name.char_count())
            .map_err(|_| XlsError::invalid_argument("name longer than 255 characters"))?;
        let cce = u16::try_from(self.formula.token_size())
            .map_err(|_| XlsError::InvalidFormula("name formula exceeds 65535 bytes".into()))?;
        writer.write_all(&self.options.to_le_bytes())?;
        writer.write_all(&[self.keyboard_shortcut, name_len])?;
        writer.write_all(&cce.to_le_bytes())?;
        writer.write_all(&self.reserved.to_le_bytes())?;
        writer.write_all(&self.sheet_index.to_le_bytes())?;
        writer.write_all(&[
            Self::optional_len(&self.menu_text)?,
            Self::optional_len(&self.description)?,
            Self::optional_len(&self.help_text)?,
            Self::optional_len(&self.status_text)?,
        ])?;
        self.name.write_no_cch(writer)?;
        self.formula.write_tokens(writer)?;
        for text in [
            &self.menu_text,
            &self.description,
            &self.help_text,
            &self.status_text,
        ]
        .into_iter()
        .flatten()
        {
            text.write_no_cch(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{AreaReference, CellReference, OperandClass, Ptg};

    #[test]
    fn test_supbook_kinds() {
        for rec in [
            SupBookRecord::internal(3),
            SupBookRecord::add_in(),
            SupBookRecord::external("book2.xls", &["Sheet1", "Data"]),
        ] {
            let mut out = Vec::new();
            rec.write_data(&mut out).unwrap();
            assert_eq!(out.len(), rec.data_size());
            assert_eq!(SupBookRecord::parse(&out).unwrap(), rec);
        }
    }

    #[test]
    fn test_extern_sheet_lookup() {
        let mut rec = ExternSheetRecord::default();
        assert_eq!(rec.add(0, 1, 1), 0);
        assert_eq!(rec.add(0, 0, 0), 1);
        assert_eq!(rec.find(0, 0, 0), Some(1));
        assert_eq!(rec.find(1, 0, 0), None);
        let combined = ExternSheetRecord::combine([rec.clone(), rec]);
        assert_eq!(combined.refs.len(), 4);
    }

    #[test]
    fn test_name_with_area_definition() {
        let mut name = NameRecord::new("Totals", 0);
        name.formula = Formula::new(vec![Ptg::Area3d {
            class: OperandClass::Reference,
            extern_sheet: 0,
            area: AreaReference::new(
                CellReference::new(0, 0, false, false).unwrap(),
                CellReference::new(9, 1, false, false).unwrap(),
            ),
        }]);
        name.description = Some(XlString::new("sum range"));
        let mut out = Vec::new();
        name.write_data(&mut out).unwrap();
        assert_eq!(out.len(), name.data_size());
        let parsed = NameRecord::parse(&out).unwrap();
        assert_eq!(parsed, name);
        assert_eq!(parsed.name_text(), "Totals");
    }

    #[test]
    fn test_built_in_name_text() {
        let name = NameRecord::built_in(built_in::PRINT_AREA, 1);
        assert!(name.is_built_in());
        assert_eq!(name.built_in_code(), Some(built_in::PRINT_AREA));
        assert_eq!(name.name_text(), "Print_Area");
    }
}
