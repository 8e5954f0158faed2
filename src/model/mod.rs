//! Sheet and workbook model.
//!
//! The model folds a decoded record stream into navigable documents. A
//! [`Workbook`] owns its globals, its shared string table, its link table
//! and one substream per sheet. A [`Sheet`] owns its rows, cells and the
//! optional tables that hang off a worksheet.
//!
//! Neither type is internally synchronized. Concurrent mutation of one
//! workbook must be serialized by the caller.
//!
//! # Example
//!
//! ```
//! use litchi_xls::Workbook;
//!
//! let mut book = Workbook::create();
//! let sheet = book.create_sheet("Data").unwrap();
//! book.set_cell_number(sheet, 0, 0, 5.0).unwrap();
//! book.set_cell_formula(sheet, 0, 1, "A1*2+1").unwrap();
//!
//! let bytes = book.to_bytes().unwrap();
//! let reread = Workbook::from_bytes(&bytes).unwrap();
//! assert_eq!(reread.cell_formula(sheet, 0, 1).as_deref(), Some("A1*2+1"));
//! ```

mod defaults;
pub mod shared_strings;
pub mod sheet;
pub mod workbook;

pub use shared_strings::SharedStrings;
pub use sheet::{DEFAULT_XF_INDEX, PaneInformation, Sheet, SheetProtection};
pub use workbook::{GlobalItem, SheetStream, Workbook};
