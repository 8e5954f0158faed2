//! Globals of a newly created workbook.
//!
//! Formatting records are not modelled; a new workbook carries the
//! minimal font, number format, XF and style tables Excel expects so that
//! cell XF index 15 is valid. They are kept as raw records.

use crate::records::{BofRecord, BofType, CodePageRecord, Record, UnknownRecord, sid};

const FONT_HEIGHT: u16 = 200;
const FONT_WEIGHT_NORMAL: u16 = 400;
const FONT_WEIGHT_BOLD: u16 = 700;
const COLOR_AUTOMATIC: u16 = 0x7FFF;

const XF_TYPE_STYLE: u16 = 0xFFF5;
const XF_TYPE_CELL: u16 = 0x0001;

/// Format indices of the five built-in style XFs after the default cell XF.
const STYLE_XF_FORMATS: [u16; 5] = [0x002B, 0x0029, 0x002C, 0x002A, 0x0009];

/// (XF index, built-in style id) of the STYLE records.
const BUILTIN_STYLES: [(u16, u8); 6] = [
    (0x0010, 3),
    (0x0011, 6),
    (0x0012, 4),
    (0x0013, 7),
    (0x0000, 0),
    (0x0014, 5),
];

const BUILTIN_FORMATS: [&str; 8] = [
    "General",
    "0",
    "0.00",
    "#,##0",
    "#,##0.00",
    "\"$\"#,##0_);(\"$\"#,##0)",
    "\"$\"#,##0_);[Red](\"$\"#,##0)",
    "\"$\"#,##0.00_);(\"$\"#,##0.00)",
];

fn raw(sid: u16, data: Vec<u8>) -> Record {
    Record::Unknown(UnknownRecord::new(sid, data))
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn window1() -> Record {
    let mut data = Vec::with_capacity(18);
    for v in [0, 0, 0x3000, 0x1E00, 0x0038, 0, 0, 1, 0x0258] {
        push_u16(&mut data, v);
    }
    raw(sid::WINDOW1, data)
}

fn font(weight: u16, italic: bool) -> Record {
    let name = b"Arial";
    let mut data = Vec::with_capacity(16 + name.len());
    push_u16(&mut data, FONT_HEIGHT);
    push_u16(&mut data, if italic { 0x0002 } else { 0 });
    push_u16(&mut data, COLOR_AUTOMATIC);
    push_u16(&mut data, weight);
    push_u16(&mut data, 0);
    // underline, family, charset, reserved
    data.extend_from_slice(&[0, 0, 0, 0]);
    data.push(name.len() as u8);
    data.push(0);
    data.extend_from_slice(name);
    raw(sid::FONT, data)
}

fn format(index: u16, pattern: &str) -> Record {
    let mut data = Vec::with_capacity(5 + pattern.len());
    push_u16(&mut data, index);
    push_u16(&mut data, pattern.len() as u16);
    data.push(0);
    data.extend_from_slice(pattern.as_bytes());
    raw(sid::FORMAT, data)
}

fn xf(font_index: u16, format_index: u16, xf_type: u16) -> Record {
    let mut data = Vec::with_capacity(20);
    push_u16(&mut data, font_index);
    push_u16(&mut data, format_index);
    push_u16(&mut data, xf_type);
    // general alignment, bottom; no rotation, indent or used-attribute bits
    data.extend_from_slice(&[0x20, 0, 0, 0]);
    push_u16(&mut data, 0);
    push_u16(&mut data, 0x3FFF);
    data.extend_from_slice(&0x0000_3FFFu32.to_le_bytes());
    push_u16(&mut data, 0x3FFF);
    raw(sid::XF, data)
}

fn style(xf_index: u16, builtin: u8) -> Record {
    let mut data = Vec::with_capacity(4);
    push_u16(&mut data, (xf_index & 0x0FFF) | 0x8000);
    data.push(builtin);
    data.push(0xFF);
    raw(sid::STYLE, data)
}

/// Records from BOF up to, but not including, the BOUNDSHEET records.
pub(crate) fn workbook_prologue() -> Vec<Record> {
    let mut out = vec![
        Record::Bof(BofRecord::new(BofType::Workbook)),
        Record::CodePage(CodePageRecord { codepage: 0x04B0 }),
        raw(sid::DATE1904, vec![0, 0]),
        window1(),
        font(FONT_WEIGHT_NORMAL, false),
        font(FONT_WEIGHT_BOLD, false),
        font(FONT_WEIGHT_NORMAL, true),
        font(FONT_WEIGHT_BOLD, true),
    ];
    out.extend(
        BUILTIN_FORMATS
            .iter()
            .enumerate()
            .map(|(i, p)| format(i as u16, p)),
    );
    for i in 0..15 {
        let font_index = match i {
            1 | 2 => 1,
            3 | 4 => 2,
            _ => 0,
        };
        out.push(xf(font_index, 0, XF_TYPE_STYLE));
    }
    out.push(xf(0, 0, XF_TYPE_CELL));
    out.extend(STYLE_XF_FORMATS.iter().map(|&f| xf(0, f, XF_TYPE_STYLE)));
    out.extend(BUILTIN_STYLES.iter().map(|&(x, id)| style(x, id)));
    out.push(raw(sid::USESELFS, vec![0, 0]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prologue_shape() {
        let records = workbook_prologue();
        assert_eq!(records[0].sid(), sid::BOF);
        let xfs = records.iter().filter(|r| r.sid() == sid::XF).count();
        assert_eq!(xfs, 21);
        for r in &records {
            if r.sid() == sid::XF {
                assert_eq!(r.serialized_size(), 24);
            }
        }
        assert_eq!(window1().serialized_size(), 22);
        assert_eq!(font(FONT_WEIGHT_NORMAL, false).serialized_size(), 4 + 21);
    }
}
