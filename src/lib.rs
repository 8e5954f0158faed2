//! Litchi XLS - BIFF8 workbook records, round-trip serialization and
//! formula evaluation.
//!
//! The crate works on the raw `Workbook` stream of a legacy Excel file
//! (BIFF8, Excel 97-2003). It is layered bottom-up:
//!
//! - [`records`]: typed codecs for every record the model understands, plus
//!   an opaque fallback that re-emits unknown records byte for byte
//! - [`aggregates`]: groups of records that behave as one unit (row blocks,
//!   column info, merged cells, conditional formats, page settings, links)
//! - [`model`]: [`Workbook`] and [`Sheet`], built from a record stream and
//!   serialized back in canonical order
//! - [`formula`]: token arrays, the formula parser and the renderer
//! - [`eval`]: a [`FormulaEvaluator`] with a dependency-tracking result cache
//! - [`container`]: byte sources and sinks for the workbook stream
//!
//! # Example - Building and evaluating a workbook
//!
//! ```
//! use litchi_xls::{CellValue, FormulaEvaluator, Workbook};
//!
//! # fn main() -> litchi_xls::XlsResult<()> {
//! let mut book = Workbook::create();
//! let sheet = book.create_sheet("Sheet1")?;
//! book.set_cell_number(sheet, 0, 0, 5.0)?;
//! book.set_cell_formula(sheet, 0, 1, "A1*2+1")?;
//!
//! let mut evaluator = FormulaEvaluator::new();
//! assert_eq!(evaluator.evaluate(&book, sheet, 0, 1)?, CellValue::Number(11.0));
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Round-tripping a stream
//!
//! ```no_run
//! use litchi_xls::{ReadOptions, Workbook};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("Workbook.bin")?;
//! let book = Workbook::from_bytes_with_options(&bytes, &ReadOptions::default())?;
//! for index in 0..book.sheet_count() {
//!     println!("sheet {}: {:?}", index, book.sheet_name(index));
//! }
//! assert_eq!(book.to_bytes()?, bytes);
//! # Ok(())
//! # }
//! ```

pub mod aggregates;
pub mod common;
pub mod config;
pub mod container;
pub mod eval;
pub mod formula;
pub mod model;
pub mod records;

// Re-export commonly used types for convenience
pub use common::{XlsError, XlsResult};
pub use config::{EvaluationOptions, ReadOptions};
pub use eval::{CellValue, ErrorCode, FormulaEvaluator};
pub use model::{Sheet, Workbook};
