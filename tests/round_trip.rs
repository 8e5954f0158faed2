//! Stream-level round trips through the record codec and the model.

use litchi_xls::XlsError;
use litchi_xls::container::{FileSink, FileSource, load_workbook, save_workbook};
use litchi_xls::records::{self, Record, sid};
use litchi_xls::{ReadOptions, Workbook};
use proptest::prelude::*;

fn populated_book() -> Workbook {
    let mut book = Workbook::create();
    let data = book.create_sheet("Data").unwrap();
    let summary = book.create_sheet("Summary").unwrap();

    for row in 0..70u32 {
        book.set_cell_number(data, row, 0, f64::from(row) * 1.5).unwrap();
        book.set_cell_string(data, row, 1, &format!("item {}", row % 7)).unwrap();
    }
    book.set_cell_bool(data, 0, 2, true).unwrap();
    book.set_cell_formula(data, 0, 3, "SUM(A1:A70)").unwrap();
    book.set_cell_formula(data, 1, 3, "IF(A2>1,\"big\",\"small\")").unwrap();
    book.set_cell_formula(summary, 0, 0, "Data!D1/2").unwrap();
    book.set_cell_formula(summary, 1, 0, "COUNTIF(Data!B1:B70,\"item 3\")").unwrap();

    let rate = book.create_name("Rate", None).unwrap();
    book.set_name_formula(rate, "Data!$A$3").unwrap();
    book.set_cell_formula(summary, 2, 0, "Rate*100").unwrap();

    let sheet = book.sheet_mut(data).unwrap();
    sheet.add_merged_region(0, 4, 1, 6).unwrap();
    sheet.set_column_width(1, 4000).unwrap();
    sheet.create_freeze_pane(0, 1, 1, 0);
    book
}

#[test]
fn test_reserialized_stream_is_identical() {
    let bytes = populated_book().to_bytes().unwrap();
    let reread = Workbook::from_bytes(&bytes).unwrap();
    assert_eq!(reread.to_bytes().unwrap(), bytes);

    let again = Workbook::from_bytes(&reread.to_bytes().unwrap()).unwrap();
    assert_eq!(again.cell_formula(1, 0, 0).as_deref(), Some("Data!D1/2"));
    assert_eq!(again.cell_formula(1, 2, 0).as_deref(), Some("Rate*100"));
    assert_eq!(again.sheet(0).unwrap().merged_region_count(), 1);
}

#[test]
fn test_record_list_reencodes_byte_for_byte() {
    let bytes = populated_book().to_bytes().unwrap();
    let decoded = records::read_records(&bytes).unwrap();
    assert!(matches!(decoded.first(), Some(Record::Bof(_))));
    assert!(decoded.iter().any(|r| r.sid() == sid::SST));
    assert!(decoded.iter().any(|r| r.sid() == sid::DBCELL));

    let mut out = Vec::new();
    let written = records::write_records(&mut out, &decoded).unwrap();
    assert_eq!(written, bytes.len());
    assert_eq!(out, bytes);
}

#[test]
fn test_unknown_records_survive() {
    let mut bytes = populated_book().to_bytes().unwrap();
    // Splice an unsupported record right after the workbook BOF.
    let bof_len = 4 + u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
    let foreign = [0x34u8, 0x12, 3, 0, 0xAA, 0xBB, 0xCC];
    bytes.splice(bof_len..bof_len, foreign);

    let decoded = records::read_records(&bytes).unwrap();
    assert!(matches!(&decoded[1], Record::Unknown(r) if r.sid == 0x1234 && r.data[..] == [0xAAu8, 0xBB, 0xCC]));
}

#[test]
fn test_truncated_stream_fails_to_load() {
    let bytes = populated_book().to_bytes().unwrap();
    let err = Workbook::from_bytes(&bytes[..bytes.len() - 3]).unwrap_err();
    assert!(matches!(err, XlsError::UnexpectedEndOfStream), "{err}");
}

#[test]
fn test_reversed_merge_is_rejected() {
    let mut book = Workbook::create();
    let sheet = book.create_sheet("Sheet1").unwrap();
    let sheet = book.sheet_mut(sheet).unwrap();
    for (r1, c1, r2, c2) in [(5, 0, 4, 0), (0, 3, 0, 2), (9, 9, 0, 0)] {
        let err = sheet.add_merged_region(r1, c1, r2, c2).unwrap_err();
        assert!(matches!(err, XlsError::InvalidArgument(_)), "{err}");
    }
    assert_eq!(sheet.merged_region_count(), 0);
    assert_eq!(sheet.add_merged_region(4, 0, 5, 0).unwrap(), 0);
}

#[test]
fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Workbook");
    let book = populated_book();

    let mut sink = FileSink::create(&path).unwrap();
    let written = save_workbook(&book, &mut sink).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), written as u64);

    let mut source = FileSource::open(&path).unwrap();
    let reread = load_workbook(&mut source, &ReadOptions::default()).unwrap();
    assert_eq!(reread.sheet_name(1), Some("Summary"));
    assert_eq!(reread.to_bytes().unwrap(), book.to_bytes().unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_dimensions_cover_every_cell(
        cells in prop::collection::vec((0u32..65_536, 0u16..256), 1..40)
    ) {
        let mut book = Workbook::create();
        let sheet = book.create_sheet("Sheet1").unwrap();
        for &(row, col) in &cells {
            book.set_cell_number(sheet, row, col, 1.0).unwrap();
        }
        let dims = book.sheet(sheet).unwrap().dimensions();
        let max_row = cells.iter().map(|c| c.0).max().unwrap();
        let min_row = cells.iter().map(|c| c.0).min().unwrap();
        let max_col = cells.iter().map(|c| c.1).max().unwrap();
        let min_col = cells.iter().map(|c| c.1).min().unwrap();
        prop_assert!(dims.first_row <= min_row);
        prop_assert!(dims.last_row > max_row);
        prop_assert!(dims.first_col <= min_col);
        prop_assert!(dims.last_col > max_col);

        let reread = Workbook::from_bytes(&book.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(reread.sheet(sheet).unwrap().dimensions(), dims);
    }
}
