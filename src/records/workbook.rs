//! Workbook globals: sheet directory and write protection.

use super::strings::XlString;
use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use std::io::Write;

/// Sheet name length limit enforced by Excel.
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Sheet visibility (low byte of the BOUNDSHEET options).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SheetVisibility {
    #[default]
    Visible,
    Hidden,
    VeryHidden,
}

/// Directory entry for one substream.
///
/// Record type: 0x0085
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundSheetRecord {
    /// Stream offset of the sheet's BOF; recomputed on write.
    pub bof_offset: u32,
    pub options: u16,
    pub name: XlString,
}

impl BoundSheetRecord {
    pub fn new(name: &str) -> XlsResult<Self> {
        validate_sheet_name(name)?;
        Ok(Self {
            bof_offset: 0,
            options: 0,
            name: XlString::new(name),
        })
    }

    pub fn sheet_name(&self) -> &str {
        self.name.text()
    }

    pub fn visibility(&self) -> SheetVisibility {
        match self.options & 0x03 {
            0 => SheetVisibility::Visible,
            1 => SheetVisibility::Hidden,
            _ => SheetVisibility::VeryHidden,
        }
    }

    pub fn set_visibility(&mut self, visibility: SheetVisibility) {
        let bits = match visibility {
            SheetVisibility::Visible => 0,
            SheetVisibility::Hidden => 1,
            SheetVisibility::VeryHidden => 2,
        };
        self.options = (self.options & !0x03) | bits;
    }

    /// Substream type: 0 worksheet, 2 chart, 6 VB module.
    pub fn sheet_type(&self) -> u8 {
        (self.options >> 8) as u8
    }
}

/// Reject names Excel would refuse.
pub fn validate_sheet_name(name: &str) -> XlsResult<()> {
    let len = name.encode_utf16().count();
    if len == 0 || len > MAX_SHEET_NAME_LEN {
        return Err(XlsError::invalid_argument(format!(
            "sheet name '{}' must be 1..={} characters",
            name, MAX_SHEET_NAME_LEN
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '?' | '*' | ']' | '[' | ':'))
    {
        return Err(XlsError::invalid_argument(format!(
            "sheet name '{}' contains '{}'",
            name, c
        )));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(XlsError::invalid_argument(format!(
            "sheet name '{}' starts or ends with an apostrophe",
            name
        )));
    }
    Ok(())
}

impl BiffRecord for BoundSheetRecord {
    const SID: u16 = sid::BOUNDSHEET;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let bof_offset = r.read_u32()?;
        let options = r.read_u16()?;
        let name = XlString::read_short(&mut r)?;
        r.expect_end()?;
        Ok(Self {
            bof_offset,
            options,
            name,
        })
    }

    fn data_size(&self) -> usize {
        6 + self.name.encoded_size_short()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.bof_offset.to_le_bytes())?;
        writer.write_all(&self.options.to_le_bytes())?;
        self.name.write_short(writer)
    }
}

/// Write reservation: read-only recommendation and password.
///
/// Record type: 0x005B
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileSharingRecord {
    pub read_only: u16,
    pub password_hash: u16,
    /// `None` when the record carries a zero-length name without option byte.
    pub username: Option<XlString>,
}

impl FileSharingRecord {
    pub fn new(password_hash: u16, username: &str) -> Self {
        Self {
            read_only: 1,
            password_hash,
            username: Some(XlString::new(username)),
        }
    }

    pub fn username(&self) -> &str {
        self.username.as_ref().map_or("", XlString::text)
    }
}

impl BiffRecord for FileSharingRecord {
    const SID: u16 = sid::FILESHARING;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let read_only = r.read_u16()?;
        let password_hash = r.read_u16()?;
        let cch = r.read_u16()? as usize;
        let username = if cch == 0 && r.is_empty() {
            None
        } else {
            Some(XlString::read_no_cch(&mut r, cch)?)
        };
        r.expect_end()?;
        Ok(Self {
            read_only,
            password_hash,
            username,
        })
    }

    fn data_size(&self) -> usize {
        4 + self.username.as_ref().map_or(2, XlString::encoded_size)
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.read_only.to_le_bytes())?;
        writer.write_all(&self.password_hash.to_le_bytes())?;
        match &self.username {
            Some(name) => name.write(writer),
            None => {
                writer.write_all(&0u16.to_le_bytes())?;
                Ok(())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_name_rules() {
        assert!(validate_sheet_name("Sheet1").is_ok());
        assert!(validate_sheet_name("").is_err());
        assert!(validate_sheet_name("a/b").is_err());
        assert!(validate_sheet_name("'quoted'").is_err());
        assert!(validate_sheet_name(&"x".repeat(32)).is_err());
    }

    #[test]
    fn test_boundsheet_round_trip() {
        let mut rec = BoundSheetRecord::new("Données").unwrap();
        rec.bof_offset = 0x1234;
        rec.set_visibility(SheetVisibility::Hidden);
        let mut out = Vec::new();
        rec.write_data(&mut out).unwrap();
        let parsed = BoundSheetRecord::parse(&out).unwrap();
        assert_eq!(parsed, rec);
        assert_eq!(parsed.visibility(), SheetVisibility::Hidden);
        assert!(!parsed.name.is_high_byte());
    }

    #[test]
    fn test_filesharing_without_username() {
        let data = [1, 0, 0x1A, 0xCC, 0, 0];
        let rec = FileSharingRecord::parse(&data).unwrap();
        assert_eq!(rec.username(), "");
        let mut out = Vec::new();
        rec.write_data(&mut out).unwrap();
        assert_eq!(out, data);
    }
}
