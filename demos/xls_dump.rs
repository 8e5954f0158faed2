//! Inspect a raw BIFF8 workbook stream.
//!
//! The input is the bare `Workbook` stream (already extracted from its
//! compound document), for example:
//!
//! ```text
//! cargo run --example xls_dump -- Workbook.bin records
//! cargo run --example xls_dump -- Workbook.bin sheets
//! cargo run --example xls_dump -- Workbook.bin eval 0 B1
//! cargo run --example xls_dump -- Workbook.bin recalc out.bin
//! ```

use clap::{Parser, Subcommand};
use litchi_xls::container::{DocumentSource, FileSink, FileSource, load_workbook, save_workbook};
use litchi_xls::records::{self, sid};
use litchi_xls::{CellValue, FormulaEvaluator, ReadOptions, Workbook};
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Dump and evaluate BIFF8 workbook streams")]
struct Args {
    /// Path of the raw workbook stream
    input: PathBuf,

    /// Keep formulas whose tokens cannot be decoded as opaque bytes
    #[arg(long)]
    keep_unparsed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every record with its offset, type and length
    Records {
        /// Only show records with this type name (e.g. FORMULA)
        #[arg(long)]
        only: Option<String>,
    },
    /// List sheets with their used ranges and cell counts
    Sheets,
    /// Evaluate one cell, e.g. `eval 0 B3`
    Eval { sheet: usize, cell: String },
    /// Recalculate every formula and write the stream back out
    Recalc { output: PathBuf },
}

fn parse_a1(text: &str) -> Option<(u32, u16)> {
    let split = text.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = text.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col = 0u32;
    for b in letters.to_ascii_uppercase().bytes() {
        if !b.is_ascii_uppercase() {
            return None;
        }
        col = col * 26 + u32::from(b - b'A' + 1);
    }
    let row = digits.parse::<u32>().ok()?.checked_sub(1)?;
    Some((row, u16::try_from(col - 1).ok()?))
}

fn dump_records(bytes: &[u8], only: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let mut offset = 0;
    let mut shown = 0;
    while offset < bytes.len() {
        let (record, consumed) = records::decode_record(bytes, offset)?;
        let name = sid::name(record.sid());
        if only.is_none_or(|o| o.eq_ignore_ascii_case(name)) {
            println!("{:>8}  {:<16} 0x{:04X}  {:>5} bytes", offset, name, record.sid(), consumed);
            shown += 1;
        }
        offset += consumed;
    }
    println!("\n{} records shown, {} bytes", shown, bytes.len());
    Ok(())
}

fn describe(value: &CellValue) -> String {
    match value {
        CellValue::Number(n) => n.to_string(),
        CellValue::Text(s) => format!("{:?}", s),
        CellValue::Bool(b) => b.to_string().to_uppercase(),
        CellValue::Error(e) => e.to_string(),
        CellValue::Blank => "(blank)".to_string(),
    }
}

fn dump_sheets(book: &Workbook) {
    for index in 0..book.sheet_count() {
        let Some(sheet) = book.sheet(index) else {
            continue;
        };
        let dims = sheet.dimensions();
        let formulas = sheet.cells().filter(|c| c.as_formula().is_some()).count();
        println!(
            "{}: {:?} rows {}..{} cols {}..{}, {} cells ({} formulas), {} merged regions",
            index,
            book.sheet_name(index).unwrap_or(""),
            dims.first_row,
            dims.last_row,
            dims.first_col,
            dims.last_col,
            sheet.cells().count(),
            formulas,
            sheet.merged_region_count()
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let options = ReadOptions::new().with_keep_unparsed_formulas(args.keep_unparsed);

    let mut source = FileSource::open(&args.input)?;
    match args.command {
        Command::Records { only } => {
            let bytes = source.read_all()?;
            dump_records(&bytes, only.as_deref())?;
        },
        Command::Sheets => {
            let book = load_workbook(&mut source, &options)?;
            dump_sheets(&book);
        },
        Command::Eval { sheet, cell } => {
            let book = load_workbook(&mut source, &options)?;
            let (row, col) = parse_a1(&cell).ok_or_else(|| format!("'{}' is not an A1 reference", cell))?;
            if let Some(formula) = book.cell_formula(sheet, row, col) {
                println!("{} = {}", cell, formula);
            }
            let value = FormulaEvaluator::new().evaluate(&book, sheet, row, col)?;
            println!("{} -> {}", cell, describe(&value));
        },
        Command::Recalc { output } => {
            let mut book = load_workbook(&mut source, &options)?;
            let count = FormulaEvaluator::new().evaluate_all_formula_cells(&mut book)?;
            let mut sink = FileSink::create(&output)?;
            let written = save_workbook(&book, &mut sink)?;
            println!("recalculated {} formulas, wrote {} bytes to {}", count, written, output.display());
        },
    }
    Ok(())
}
