//! BIFF8 Unicode strings.
//!
//! Character data is stored either compressed (one byte per character, the
//! low byte of the UTF-16 code unit) or uncompressed (UTF-16LE), selected by
//! bit 0 of an option byte. The choice read from a file is preserved so that
//! re-encoding reproduces the original bytes.

use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use std::io::Write;

/// Option-byte flag: characters are stored as UTF-16LE.
pub const HIGH_BYTE: u8 = 0x01;
/// Option-byte flag: an extended (phonetic) block follows.
pub const EXT_STRING: u8 = 0x04;
/// Option-byte flag: rich text formatting runs follow.
pub const RICH_TEXT: u8 = 0x08;

/// Text together with its on-disk character width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct XlString {
    text: String,
    high_byte: bool,
}

impl XlString {
    /// Create a string, storing it compressed when every character fits in
    /// one byte.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let high_byte = text.chars().any(|c| c as u32 > 0xFF);
        Self { text, high_byte }
    }

    /// Create a string with an explicit character width.
    ///
    /// Compressed storage can only hold characters up to U+00FF.
    pub fn with_high_byte(text: impl Into<String>, high_byte: bool) -> XlsResult<Self> {
        let text = text.into();
        if !high_byte && text.chars().any(|c| c as u32 > 0xFF) {
            return Err(XlsError::invalid_argument(format!(
                "'{}' cannot be stored with compressed characters",
                text
            )));
        }
        Ok(Self { text, high_byte })
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn is_high_byte(&self) -> bool {
        self.high_byte
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of characters as counted on disk (UTF-16 code units).
    pub fn char_count(&self) -> usize {
        if self.high_byte {
            self.text.encode_utf16().count()
        } else {
            self.text.chars().count()
        }
    }

    /// Size of the character data alone.
    pub fn data_size(&self) -> usize {
        if self.high_byte {
            self.char_count() * 2
        } else {
            self.char_count()
        }
    }

    pub(crate) fn option_byte(&self) -> u8 {
        if self.high_byte { HIGH_BYTE } else { 0 }
    }

    /// Read an `XLUnicodeString`: 16-bit count, option byte, characters.
    pub fn read(r: &mut LittleEndianReader<'_>) -> XlsResult<Self> {
        let cch = r.read_u16()? as usize;
        Self::read_no_cch(r, cch)
    }

    /// Read a `ShortXLUnicodeString`: 8-bit count, option byte, characters.
    pub fn read_short(r: &mut LittleEndianReader<'_>) -> XlsResult<Self> {
        let cch = r.read_u8()? as usize;
        Self::read_no_cch(r, cch)
    }

    /// Read an option byte and `cch` characters.
    pub fn read_no_cch(r: &mut LittleEndianReader<'_>, cch: usize) -> XlsResult<Self> {
        let options = r.read_u8()?;
        let high_byte = options & HIGH_BYTE != 0;
        let text = r.read_chars(cch, high_byte)?;
        Ok(Self { text, high_byte })
    }

    /// Encoded size of the `XLUnicodeString` form.
    #[inline]
    pub fn encoded_size(&self) -> usize {
        3 + self.data_size()
    }

    /// Encoded size of the `ShortXLUnicodeString` form.
    #[inline]
    pub fn encoded_size_short(&self) -> usize {
        2 + self.data_size()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        let cch = u16::try_from(self.char_count())
            .map_err(|_| XlsError::invalid_argument("string longer than 65535 characters"))?;
        writer.write_all(&cch.to_le_bytes())?;
        self.write_no_cch(writer)
    }

    pub fn write_short<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        let cch = u8::try_from(self.char_count())
            .map_err(|_| XlsError::invalid_argument("string longer than 255 characters"))?;
        writer.write_all(&[cch])?;
        self.write_no_cch(writer)
    }

    pub fn write_no_cch<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&[self.option_byte()])?;
        self.write_chars(writer)
    }

    /// Write the character data without count or option byte.
    pub fn write_chars<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        if self.high_byte {
            for unit in self.text.encode_utf16() {
                writer.write_all(&unit.to_le_bytes())?;
            }
        } else {
            let bytes: Vec<u8> = self.text.chars().map(|c| c as u32 as u8).collect();
            writer.write_all(&bytes)?;
        }
        Ok(())
    }
}

impl From<&str> for XlString {
    fn from(text: &str) -> Self {
        XlString::new(text)
    }
}

impl std::fmt::Display for XlString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_selection() {
        assert!(!XlString::new("Sheet1").is_high_byte());
        assert!(!XlString::new("café").is_high_byte());
        assert!(XlString::new("Лист1").is_high_byte());
        assert!(XlString::with_high_byte("Лист1", false).is_err());
    }

    #[test]
    fn test_preserves_uncompressed_ascii() {
        // An ASCII string stored uncompressed must be written back uncompressed.
        let data = [0x02, 0x00, 0x01, 0x41, 0x00, 0x42, 0x00];
        let mut r = LittleEndianReader::new(0, &data);
        let s = XlString::read(&mut r).unwrap();
        assert_eq!(s.text(), "AB");
        assert!(s.is_high_byte());

        let mut out = Vec::new();
        s.write(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(s.encoded_size(), data.len());
    }

    #[test]
    fn test_short_string() {
        let s = XlString::new("Data");
        let mut out = Vec::new();
        s.write_short(&mut out).unwrap();
        assert_eq!(out, [4, 0, b'D', b'a', b't', b'a']);
        assert_eq!(s.encoded_size_short(), out.len());
    }
}
