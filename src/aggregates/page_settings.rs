//! Page layout block: breaks, header and footer, centering, margins and
//! printer setup, written in a fixed order.

use super::{RecordAggregate, RecordStream};
use crate::common::error::{XlsError, XlsResult};
use crate::records::{
    BottomMarginRecord, FooterRecord, HCenterRecord, HeaderRecord, HorizontalPageBreakRecord,
    LeftMarginRecord, PageBreak, Record, RightMarginRecord, SetupRecord, TopMarginRecord,
    VCenterRecord, VerticalPageBreakRecord, sid,
};
use log::warn;

/// Page margins addressable through [`PageSettingsBlock::margin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Margin {
    Left,
    Right,
    Top,
    Bottom,
    Header,
    Footer,
}

impl Margin {
    /// Value Excel assumes when no margin record is present.
    pub fn default_inches(self) -> f64 {
        match self {
            Margin::Left | Margin::Right => 0.75,
            Margin::Top | Margin::Bottom => 1.0,
            Margin::Header | Margin::Footer => 0.5,
        }
    }
}

/// Far edges of a break line.
const LAST_ROW_FOR_COLUMN_BREAK: u16 = 0xFFFF;
const LAST_COL_FOR_ROW_BREAK: u16 = 0x00FF;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageSettingsBlock {
    row_breaks: Option<HorizontalPageBreakRecord>,
    column_breaks: Option<VerticalPageBreakRecord>,
    header: Option<HeaderRecord>,
    footer: Option<FooterRecord>,
    hcenter: Option<HCenterRecord>,
    vcenter: Option<VCenterRecord>,
    left_margin: Option<LeftMarginRecord>,
    right_margin: Option<RightMarginRecord>,
    top_margin: Option<TopMarginRecord>,
    bottom_margin: Option<BottomMarginRecord>,
    /// PLS with its CONTINUE records, kept opaque.
    printer_settings: Vec<Record>,
    setup: Option<SetupRecord>,
    bitmap: Option<Record>,
    header_footer: Option<Record>,
}

fn store<T>(slot: &mut Option<T>, value: T, sid: u16) -> XlsResult<()> {
    if slot.is_some() {
        return Err(XlsError::invalid_record(
            sid,
            format!("duplicate {} in page settings block", sid::name(sid)),
        ));
    }
    *slot = Some(value);
    Ok(())
}

impl PageSettingsBlock {
    /// Block for a new sheet: empty header and footer, no centering,
    /// default printer setup.
    pub fn create() -> Self {
        Self {
            header: Some(HeaderRecord::default()),
            footer: Some(FooterRecord::default()),
            hcenter: Some(HCenterRecord::default()),
            vcenter: Some(VCenterRecord::default()),
            setup: Some(SetupRecord::default()),
            ..Self::default()
        }
    }

    /// Whether `sid` starts or continues a page settings block.
    pub fn is_component(sid: u16) -> bool {
        sid::is_page_settings_component(sid)
    }

    /// Read one contiguous block.
    pub fn read(rs: &mut RecordStream<'_>) -> XlsResult<Self> {
        let mut block = Self::default();
        block.read_into(rs)?;
        Ok(block)
    }

    /// Fold a second run of page settings records into this block. Excel
    /// occasionally writes HEADERFOOTER apart from the rest of the block.
    pub fn merge_from(&mut self, rs: &mut RecordStream<'_>) -> XlsResult<()> {
        warn!("page settings records found in more than one place, merging");
        self.read_into(rs)
    }

    fn read_into(&mut self, rs: &mut RecordStream<'_>) -> XlsResult<()> {
        while let Some(record) = rs.peek() {
            if !Self::is_component(record.sid()) {
                break;
            }
            rs.next();
            let sid = record.sid();
            match record {
                Record::HorizontalPageBreak(r) => store(&mut self.row_breaks, r.clone(), sid)?,
                Record::VerticalPageBreak(r) => store(&mut self.column_breaks, r.clone(), sid)?,
                Record::Header(r) => store(&mut self.header, r.clone(), sid)?,
                Record::Footer(r) => store(&mut self.footer, r.clone(), sid)?,
                Record::HCenter(r) => store(&mut self.hcenter, *r, sid)?,
                Record::VCenter(r) => store(&mut self.vcenter, *r, sid)?,
                Record::LeftMargin(r) => store(&mut self.left_margin, *r, sid)?,
                Record::RightMargin(r) => store(&mut self.right_margin, *r, sid)?,
                Record::TopMargin(r) => store(&mut self.top_margin, *r, sid)?,
                Record::BottomMargin(r) => store(&mut self.bottom_margin, *r, sid)?,
                Record::Setup(r) => store(&mut self.setup, *r, sid)?,
                _ if sid == sid::PLS => {
                    if !self.printer_settings.is_empty() {
                        return Err(XlsError::invalid_record(
                            sid,
                            "duplicate PLS in page settings block",
                        ));
                    }
                    self.printer_settings.push(record.clone());
                    while rs.next_is_continue() {
                        if let Some(cont) = rs.next() {
                            self.printer_settings.push(cont.clone());
                        }
                    }
                },
                _ if sid == sid::BITMAP => store(&mut self.bitmap, record.clone(), sid)?,
                _ if sid == sid::HEADERFOOTER => {
                    store(&mut self.header_footer, record.clone(), sid)?
                },
                _ => unreachable!("is_component admitted 0x{:04X}", sid),
            }
        }
        Ok(())
    }

    pub fn set_row_break(&mut self, row: u16, from_col: u16, to_col: u16) {
        self.row_breaks
            .get_or_insert_with(HorizontalPageBreakRecord::default)
            .add_break(row, from_col, to_col.min(LAST_COL_FOR_ROW_BREAK));
    }

    pub fn remove_row_break(&mut self, row: u16) -> bool {
        let Some(breaks) = self.row_breaks.as_mut() else {
            return false;
        };
        let removed = breaks.remove_break(row);
        if breaks.is_empty() {
            self.row_breaks = None;
        }
        removed
    }

    pub fn is_row_broken(&self, row: u16) -> bool {
        self.row_breaks
            .as_ref()
            .is_some_and(|b| b.get_break(row).is_some())
    }

    pub fn row_breaks(&self) -> &[PageBreak] {
        self.row_breaks.as_ref().map_or(&[], |b| &b.breaks)
    }

    pub fn set_column_break(&mut self, col: u16, from_row: u16, to_row: u16) {
        self.column_breaks
            .get_or_insert_with(VerticalPageBreakRecord::default)
            .add_break(col, from_row, to_row.min(LAST_ROW_FOR_COLUMN_BREAK));
    }

    pub fn remove_column_break(&mut self, col: u16) -> bool {
        let Some(breaks) = self.column_breaks.as_mut() else {
            return false;
        };
        let removed = breaks.remove_break(col);
        if breaks.is_empty() {
            self.column_breaks = None;
        }
        removed
    }

    pub fn is_column_broken(&self, col: u16) -> bool {
        self.column_breaks
            .as_ref()
            .is_some_and(|b| b.get_break(col).is_some())
    }

    pub fn column_breaks(&self) -> &[PageBreak] {
        self.column_breaks.as_ref().map_or(&[], |b| &b.breaks)
    }

    /// Shift row breaks in `start..=end` by `n` rows, as done when rows
    /// are shifted.
    pub fn shift_row_breaks(&mut self, start: u16, end: u16, n: i32) {
        let Some(rec) = self.row_breaks.as_mut() else {
            return;
        };
        let moved: Vec<PageBreak> = rec
            .breaks
            .iter()
            .filter(|b| (start..=end).contains(&b.main))
            .copied()
            .collect();
        for b in &moved {
            rec.remove_break(b.main);
        }
        for b in moved {
            let target = i32::from(b.main) + n;
            if let Ok(main) = u16::try_from(target) {
                rec.add_break(main, b.sub_from, b.sub_to);
            }
        }
    }

    pub fn header_text(&self) -> &str {
        self.header.as_ref().map_or("", HeaderRecord::text)
    }

    pub fn set_header_text(&mut self, text: impl Into<String>) {
        self.header = Some(HeaderRecord::new(text));
    }

    pub fn footer_text(&self) -> &str {
        self.footer.as_ref().map_or("", FooterRecord::text)
    }

    pub fn set_footer_text(&mut self, text: impl Into<String>) {
        self.footer = Some(FooterRecord::new(text));
    }

    pub fn is_horizontally_centered(&self) -> bool {
        self.hcenter.is_some_and(|r| r.center != 0)
    }

    pub fn set_horizontally_centered(&mut self, center: bool) {
        self.hcenter = Some(HCenterRecord {
            center: u16::from(center),
        });
    }

    pub fn is_vertically_centered(&self) -> bool {
        self.vcenter.is_some_and(|r| r.center != 0)
    }

    pub fn set_vertically_centered(&mut self, center: bool) {
        self.vcenter = Some(VCenterRecord {
            center: u16::from(center),
        });
    }

    /// Margin in inches. Header and footer margins live in SETUP.
    pub fn margin(&self, which: Margin) -> f64 {
        let stored = match which {
            Margin::Left => self.left_margin.map(|r| r.inches),
            Margin::Right => self.right_margin.map(|r| r.inches),
            Margin::Top => self.top_margin.map(|r| r.inches),
            Margin::Bottom => self.bottom_margin.map(|r| r.inches),
            Margin::Header => self.setup.map(|r| r.header_margin),
            Margin::Footer => self.setup.map(|r| r.footer_margin),
        };
        stored.unwrap_or_else(|| which.default_inches())
    }

    pub fn set_margin(&mut self, which: Margin, inches: f64) {
        match which {
            Margin::Left => self.left_margin = Some(LeftMarginRecord { inches }),
            Margin::Right => self.right_margin = Some(RightMarginRecord { inches }),
            Margin::Top => self.top_margin = Some(TopMarginRecord { inches }),
            Margin::Bottom => self.bottom_margin = Some(BottomMarginRecord { inches }),
            Margin::Header => {
                self.setup
                    .get_or_insert_with(SetupRecord::default)
                    .header_margin = inches
            },
            Margin::Footer => {
                self.setup
                    .get_or_insert_with(SetupRecord::default)
                    .footer_margin = inches
            },
        }
    }

    pub fn setup(&self) -> Option<&SetupRecord> {
        self.setup.as_ref()
    }

    pub fn setup_mut(&mut self) -> &mut SetupRecord {
        self.setup.get_or_insert_with(SetupRecord::default)
    }
}

impl RecordAggregate for PageSettingsBlock {
    fn visit_contained_records(&self, visitor: &mut dyn FnMut(Record)) {
        if let Some(r) = &self.row_breaks {
            visitor(Record::HorizontalPageBreak(r.clone()));
        }
        if let Some(r) = &self.column_breaks {
            visitor(Record::VerticalPageBreak(r.clone()));
        }
        if let Some(r) = &self.header {
            visitor(Record::Header(r.clone()));
        }
        if let Some(r) = &self.footer {
            visitor(Record::Footer(r.clone()));
        }
        if let Some(r) = self.hcenter {
            visitor(Record::HCenter(r));
        }
        if let Some(r) = self.vcenter {
            visitor(Record::VCenter(r));
        }
        if let Some(r) = self.left_margin {
            visitor(Record::LeftMargin(r));
        }
        if let Some(r) = self.right_margin {
            visitor(Record::RightMargin(r));
        }
        if let Some(r) = self.top_margin {
            visitor(Record::TopMargin(r));
        }
        if let Some(r) = self.bottom_margin {
            visitor(Record::BottomMargin(r));
        }
        for r in &self.printer_settings {
            visitor(r.clone());
        }
        if let Some(r) = self.setup {
            visitor(Record::Setup(r));
        }
        if let Some(r) = &self.bitmap {
            visitor(r.clone());
        }
        if let Some(r) = &self.header_footer {
            visitor(r.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ContinueRecord, UnknownRecord};
    use bytes::Bytes;

    #[test]
    fn test_new_sheet_defaults() {
        let block = PageSettingsBlock::create();
        let sids: Vec<u16> = block.records().iter().map(Record::sid).collect();
        assert_eq!(
            sids,
            vec![sid::HEADER, sid::FOOTER, sid::HCENTER, sid::VCENTER, sid::SETUP]
        );
        assert_eq!(block.margin(Margin::Left), 0.75);
        assert_eq!(block.margin(Margin::Top), 1.0);
        assert_eq!(block.margin(Margin::Header), 0.5);
        assert!(!block.is_horizontally_centered());
    }

    #[test]
    fn test_write_order_is_fixed() {
        let mut block = PageSettingsBlock::create();
        block.set_margin(Margin::Bottom, 2.0);
        block.set_margin(Margin::Left, 1.5);
        block.set_column_break(3, 0, 100);
        block.set_row_break(10, 0, 300);
        let sids: Vec<u16> = block.records().iter().map(Record::sid).collect();
        assert_eq!(
            sids,
            vec![
                sid::HORIZONTALPAGEBREAKS,
                sid::VERTICALPAGEBREAKS,
                sid::HEADER,
                sid::FOOTER,
                sid::HCENTER,
                sid::VCENTER,
                sid::LEFTMARGIN,
                sid::BOTTOMMARGIN,
                sid::SETUP,
            ]
        );
        assert_eq!(block.row_breaks()[0].sub_to, 0xFF);
    }

    #[test]
    fn test_pls_continuations_kept() {
        let records = vec![
            Record::Header(HeaderRecord::new("&CPage &P")),
            Record::Unknown(UnknownRecord::new(sid::PLS, vec![1u8, 2, 3])),
            Record::Continue(ContinueRecord {
                data: Bytes::from_static(&[4, 5]),
            }),
            Record::Setup(SetupRecord::default()),
            Record::Dimensions(crate::records::DimensionsRecord::new(0, 0, 0, 0)),
        ];
        let mut rs = RecordStream::new(&records);
        let block = PageSettingsBlock::read(&mut rs).unwrap();
        assert_eq!(rs.count_read(), 4);
        assert_eq!(block.header_text(), "&CPage &P");
        assert_eq!(block.records(), records[..4].to_vec());
    }

    #[test]
    fn test_duplicate_is_format_error() {
        let records = vec![
            Record::Header(HeaderRecord::new("a")),
            Record::Header(HeaderRecord::new("b")),
        ];
        let err = PageSettingsBlock::read(&mut RecordStream::new(&records)).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_breaks_add_remove() {
        let mut block = PageSettingsBlock::default();
        block.set_row_break(5, 0, 255);
        block.set_row_break(2, 0, 255);
        assert!(block.is_row_broken(5));
        assert_eq!(block.row_breaks()[0].main, 2);
        assert!(block.remove_row_break(5));
        assert!(block.remove_row_break(2));
        assert!(block.records().is_empty());

        block.set_row_break(4, 0, 255);
        block.shift_row_breaks(0, 10, 3);
        assert!(block.is_row_broken(7));
        assert!(!block.is_row_broken(4));
    }
}
