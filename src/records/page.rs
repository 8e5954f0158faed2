//! Page layout records: page breaks, header/footer text and page setup.

use super::strings::XlString;
use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use std::io::Write;

/// A manual page break before row (or column) `main`, spanning the
/// perpendicular cells `sub_from..=sub_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageBreak {
    pub main: u16,
    pub sub_from: u16,
    pub sub_to: u16,
}

fn parse_breaks(sid: u16, data: &[u8]) -> XlsResult<Vec<PageBreak>> {
    let mut r = LittleEndianReader::new(sid, data);
    let count = r.read_u16()? as usize;
    if r.remaining() != count * 6 {
        return Err(XlsError::InvalidLength {
            sid,
            expected: 2 + count * 6,
            found: data.len(),
        });
    }
    let mut breaks = Vec::with_capacity(count);
    for _ in 0..count {
        breaks.push(PageBreak {
            main: r.read_u16()?,
            sub_from: r.read_u16()?,
            sub_to: r.read_u16()?,
        });
    }
    Ok(breaks)
}

fn write_breaks<W: Write>(writer: &mut W, breaks: &[PageBreak]) -> XlsResult<()> {
    writer.write_all(&(breaks.len() as u16).to_le_bytes())?;
    for b in breaks {
        writer.write_all(&b.main.to_le_bytes())?;
        writer.write_all(&b.sub_from.to_le_bytes())?;
        writer.write_all(&b.sub_to.to_le_bytes())?;
    }
    Ok(())
}

macro_rules! page_break_record {
    ($(#[$meta:meta])* $name:ident, $sid:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct $name {
            pub breaks: Vec<PageBreak>,
        }

        impl $name {
            /// Add or replace the break at `main`, keeping breaks ordered.
            pub fn add_break(&mut self, main: u16, sub_from: u16, sub_to: u16) {
                let b = PageBreak { main, sub_from, sub_to };
                match self.breaks.binary_search_by_key(&main, |existing| existing.main) {
                    Ok(i) => self.breaks[i] = b,
                    Err(i) => self.breaks.insert(i, b),
                }
            }

            pub fn remove_break(&mut self, main: u16) -> bool {
                let before = self.breaks.len();
                self.breaks.retain(|b| b.main != main);
                self.breaks.len() != before
            }

            pub fn get_break(&self, main: u16) -> Option<&PageBreak> {
                self.breaks.iter().find(|b| b.main == main)
            }

            pub fn is_empty(&self) -> bool {
                self.breaks.is_empty()
            }
        }

        impl BiffRecord for $name {
            const SID: u16 = $sid;

            fn parse(data: &[u8]) -> XlsResult<Self> {
                Ok(Self {
                    breaks: parse_breaks(Self::SID, data)?,
                })
            }

            fn data_size(&self) -> usize {
                2 + 6 * self.breaks.len()
            }

            fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
                write_breaks(writer, &self.breaks)
            }
        }
    };
}

page_break_record!(
    /// Row breaks.
    ///
    /// Record type: 0x001B
    HorizontalPageBreakRecord,
    sid::HORIZONTALPAGEBREAKS
);

page_break_record!(
    /// Column breaks.
    ///
    /// Record type: 0x001A
    VerticalPageBreakRecord,
    sid::VERTICALPAGEBREAKS
);

fn parse_optional_text(sid: u16, data: &[u8]) -> XlsResult<Option<XlString>> {
    if data.is_empty() {
        return Ok(None);
    }
    let mut r = LittleEndianReader::new(sid, data);
    let text = XlString::read(&mut r)?;
    r.expect_end()?;
    Ok(Some(text))
}

macro_rules! text_record {
    ($(#[$meta:meta])* $name:ident, $sid:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct $name {
            /// `None` is written as an empty record.
            pub text: Option<XlString>,
        }

        impl $name {
            pub fn new(text: impl Into<String>) -> Self {
                Self {
                    text: Some(XlString::new(text)),
                }
            }

            pub fn text(&self) -> &str {
                self.text.as_ref().map(XlString::text).unwrap_or("")
            }
        }

        impl BiffRecord for $name {
            const SID: u16 = $sid;

            fn parse(data: &[u8]) -> XlsResult<Self> {
                Ok(Self {
                    text: parse_optional_text(Self::SID, data)?,
                })
            }

            fn data_size(&self) -> usize {
                self.text.as_ref().map_or(0, XlString::encoded_size)
            }

            fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
                match &self.text {
                    Some(text) => text.write(writer),
                    None => Ok(()),
                }
            }
        }
    };
}

text_record!(
    /// Page header format string.
    ///
    /// Record type: 0x0014
    HeaderRecord,
    sid::HEADER
);

text_record!(
    /// Page footer format string.
    ///
    /// Record type: 0x0015
    FooterRecord,
    sid::FOOTER
);

/// Printer settings.
///
/// Record type: 0x00A1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetupRecord {
    pub paper_size: u16,
    pub scale: u16,
    pub page_start: u16,
    pub fit_width: u16,
    pub fit_height: u16,
    pub options: u16,
    pub h_resolution: u16,
    pub v_resolution: u16,
    pub header_margin: f64,
    pub footer_margin: f64,
    pub copies: u16,
}

impl Default for SetupRecord {
    fn default() -> Self {
        Self {
            paper_size: 1,
            scale: 100,
            page_start: 1,
            fit_width: 1,
            fit_height: 1,
            options: 2,
            h_resolution: 300,
            v_resolution: 300,
            header_margin: 0.5,
            footer_margin: 0.5,
            copies: 1,
        }
    }
}

impl BiffRecord for SetupRecord {
    const SID: u16 = sid::SETUP;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let rec = Self {
            paper_size: r.read_u16()?,
            scale: r.read_u16()?,
            page_start: r.read_u16()?,
            fit_width: r.read_u16()?,
            fit_height: r.read_u16()?,
            options: r.read_u16()?,
            h_resolution: r.read_u16()?,
            v_resolution: r.read_u16()?,
            header_margin: r.read_f64()?,
            footer_margin: r.read_f64()?,
            copies: r.read_u16()?,
        };
        r.expect_end()?;
        Ok(rec)
    }

    fn data_size(&self) -> usize {
        34
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        for v in [
            self.paper_size,
            self.scale,
            self.page_start,
            self.fit_width,
            self.fit_height,
            self.options,
            self.h_resolution,
            self.v_resolution,
        ] {
            writer.write_all(&v.to_le_bytes())?;
        }
        writer.write_all(&self.header_margin.to_le_bytes())?;
        writer.write_all(&self.footer_margin.to_le_bytes())?;
        writer.write_all(&self.copies.to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaks_stay_ordered() {
        let mut rec = HorizontalPageBreakRecord::default();
        rec.add_break(10, 0, 255);
        rec.add_break(3, 0, 255);
        rec.add_break(10, 0, 100);
        assert_eq!(
            rec.breaks.iter().map(|b| b.main).collect::<Vec<_>>(),
            vec![3, 10]
        );
        assert_eq!(rec.get_break(10).unwrap().sub_to, 100);
        assert!(rec.remove_break(3));
        assert!(!rec.remove_break(3));
    }

    #[test]
    fn test_empty_header_is_empty_record() {
        let rec = HeaderRecord::parse(&[]).unwrap();
        assert_eq!(rec.text, None);
        assert_eq!(rec.data_size(), 0);
        let footer = FooterRecord::new("&P");
        let mut out = Vec::new();
        footer.write_data(&mut out).unwrap();
        assert_eq!(FooterRecord::parse(&out).unwrap().text(), "&P");
    }

    #[test]
    fn test_setup_size() {
        let mut out = Vec::new();
        SetupRecord::default().write_data(&mut out).unwrap();
        assert_eq!(out.len(), 34);
        assert_eq!(SetupRecord::parse(&out).unwrap(), SetupRecord::default());
    }
}
