//! Formula evaluation.
//!
//! Formulas are evaluated straight from their token arrays: operand tokens
//! push values, operator and function tokens pop their operands and push
//! the result. Before a formula runs, the formula cells it references are
//! walked with an explicit stack and evaluated deepest first, so long
//! reference chains never nest deeply on the call stack.
//!
//! # Caching
//!
//! Every value read during evaluation is cached in the [`FormulaEvaluator`],
//! plain cell values included. Changing a cell in the workbook is therefore
//! *not* noticed until the cache is cleared with
//! [`FormulaEvaluator::clear_all_cached_results`] or, for one cell and its
//! dependents, [`FormulaEvaluator::clear_cached_result`].
//!
//! # Errors
//!
//! Spreadsheet errors (`#DIV/0!`, `#VALUE!`, ...) are values, not failures:
//! they come back as [`CellValue::Error`]. Only a circular reference and
//! nesting beyond [`EvaluationOptions::max_depth`] fail the call.
//!
//! ```
//! use litchi_xls::{CellValue, FormulaEvaluator, Workbook};
//!
//! let mut book = Workbook::create();
//! let sheet = book.create_sheet("Sheet1").unwrap();
//! book.set_cell_number(sheet, 0, 0, 5.0).unwrap();
//! book.set_cell_formula(sheet, 0, 1, "A1*2+1").unwrap();
//!
//! let mut evaluator = FormulaEvaluator::new();
//! assert_eq!(evaluator.evaluate(&book, sheet, 0, 1).unwrap(), CellValue::Number(11.0));
//! ```

mod coerce;
mod functions;
mod interpreter;
mod operators;
mod tracker;
mod value;

pub use crate::formula::ErrorCode;
pub use functions::is_supported as is_function_supported;
pub use value::CellValue;

use crate::common::error::XlsResult;
use crate::config::EvaluationOptions;
use crate::formula::Ptg;
use crate::model::Workbook;
use crate::records::{CachedValue, StringRecord};
use interpreter::Interpreter;
use log::debug;
use std::ops::RangeInclusive;
use tracker::{CellKey, EvaluationTracker};
use value::{SheetArea, Value};

/// Content of a cell as the evaluator sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationCell {
    Number(f64),
    Text(String),
    Bool(bool),
    /// Raw BIFF error code.
    Error(u8),
    Blank,
    /// Formula tokens; `None` when they could not be decoded.
    Formula(Option<Vec<Ptg>>),
}

/// Workbook access needed by the evaluator.
///
/// Sheets are addressed by their position in the workbook, rows and
/// columns are 0-based.
pub trait EvaluationWorkbook {
    fn sheet_count(&self) -> usize;

    fn sheet_name(&self, sheet: usize) -> Option<&str>;

    fn sheet_index(&self, name: &str) -> Option<usize>;

    /// The cell at the given position, `None` when it does not exist.
    fn cell(&self, sheet: usize, row: u32, col: u16) -> Option<EvaluationCell>;

    /// Positions of the existing cells inside the rectangle, row-major.
    fn cells_in_area(&self, sheet: usize, rows: RangeInclusive<u32>, cols: RangeInclusive<u16>)
    -> Vec<(u32, u16)>;

    /// Sheet referenced by an EXTERNSHEET entry, `None` for external
    /// workbooks and deleted sheets.
    fn sheet_index_from_extern_sheet(&self, extern_sheet: u16) -> Option<usize>;

    /// Tokens of a defined name, by its one-based index.
    fn name_tokens(&self, name_index: u16) -> Option<Vec<Ptg>>;

    /// Text of an external name reference.
    fn name_x_text(&self, extern_sheet: u16, name_index: u16) -> Option<String>;
}

/// What operand resolution and functions need from the running
/// evaluation.
pub(crate) trait EvalContext {
    /// Value of a cell, evaluating it first when it holds a formula.
    fn cell_value(&mut self, sheet: usize, row: u32, col: u16) -> XlsResult<Value>;

    /// Existing cells of `area`, row-major.
    fn existing_cells(&mut self, area: &SheetArea) -> Vec<(u32, u16)>;

    /// Row and column of the formula being evaluated.
    fn position(&self) -> (u32, u16);
}

/// Evaluates formula cells and caches the results.
#[derive(Debug, Default)]
pub struct FormulaEvaluator {
    options: EvaluationOptions,
    tracker: EvaluationTracker,
}

impl FormulaEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EvaluationOptions) -> Self {
        Self {
            options,
            tracker: EvaluationTracker::default(),
        }
    }

    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    /// Evaluate one cell. Plain cells give their value, missing cells are
    /// blank, formula cells are computed (or taken from the cache).
    ///
    /// # Errors
    ///
    /// [`XlsError::CircularReference`](crate::XlsError::CircularReference)
    /// when the formula depends on itself and
    /// [`XlsError::EvaluationDepthExceeded`](crate::XlsError::EvaluationDepthExceeded)
    /// when formulas nest deeper than the configured limit.
    pub fn evaluate(
        &mut self,
        book: &dyn EvaluationWorkbook,
        sheet: usize,
        row: u32,
        col: u16,
    ) -> XlsResult<CellValue> {
        if !self.options.cache_results {
            self.tracker.clear_all();
        }
        let key = CellKey::new(sheet, row, col);
        Interpreter::new(book, &mut self.tracker, &self.options, key).evaluate_cell(sheet, row, col)
    }

    /// Evaluate a formula cell and store the result as the cell's cached
    /// value. Returns `None`, and changes nothing, when the cell is not a
    /// formula.
    pub fn evaluate_formula_cell(
        &mut self,
        book: &mut Workbook,
        sheet: usize,
        row: u32,
        col: u16,
    ) -> XlsResult<Option<CellValue>> {
        if !is_formula_cell(book, sheet, row, col) {
            return Ok(None);
        }
        let value = self.evaluate(&*book, sheet, row, col)?;
        let Some(formula) = book
            .sheet_mut(sheet)
            .and_then(|s| s.cell_mut(row, col))
            .and_then(|c| c.as_formula_mut())
        else {
            return Ok(None);
        };
        let (cached, string) = match &value {
            CellValue::Number(n) => (CachedValue::Number(*n), None),
            CellValue::Text(s) if s.is_empty() => (CachedValue::Empty, None),
            CellValue::Text(s) => (CachedValue::String, Some(StringRecord::new(s.as_str()))),
            CellValue::Bool(b) => (CachedValue::Bool(*b), None),
            CellValue::Error(e) => (CachedValue::Error(e.code()), None),
            CellValue::Blank => (CachedValue::Number(0.0), None),
        };
        formula.record.cached = cached;
        formula.string = string;
        Ok(Some(value))
    }

    /// Evaluate a formula cell and replace the formula with its result.
    /// The cell keeps its format. Other cells are left alone and their
    /// value returned.
    pub fn evaluate_in_cell(
        &mut self,
        book: &mut Workbook,
        sheet: usize,
        row: u32,
        col: u16,
    ) -> XlsResult<CellValue> {
        let formula = is_formula_cell(book, sheet, row, col);
        let value = self.evaluate(&*book, sheet, row, col)?;
        if !formula {
            return Ok(value);
        }
        match &value {
            CellValue::Number(n) => book.set_cell_number(sheet, row, col, *n)?,
            CellValue::Text(s) => book.set_cell_string(sheet, row, col, s)?,
            CellValue::Bool(b) => book.set_cell_bool(sheet, row, col, *b)?,
            CellValue::Error(e) => book.set_cell_error(sheet, row, col, *e)?,
            CellValue::Blank => book.set_cell_number(sheet, row, col, 0.0)?,
        }
        Ok(value)
    }

    /// Evaluate every formula cell of every worksheet, storing the cached
    /// results. Returns the number of formula cells evaluated.
    pub fn evaluate_all_formula_cells(&mut self, book: &mut Workbook) -> XlsResult<usize> {
        let mut targets = Vec::new();
        for sheet in 0..book.sheet_count() {
            let Some(s) = book.sheet(sheet) else {
                continue;
            };
            targets.extend(
                s.cells()
                    .filter(|c| c.as_formula().is_some())
                    .map(|c| (sheet, c.row(), c.col())),
            );
        }
        debug!("evaluating {} formula cells", targets.len());
        let mut evaluated = 0;
        for (sheet, row, col) in targets {
            if self.evaluate_formula_cell(book, sheet, row, col)?.is_some() {
                evaluated += 1;
            }
        }
        Ok(evaluated)
    }

    /// Forget every cached value.
    pub fn clear_all_cached_results(&mut self) {
        self.tracker.clear_all();
    }

    /// Forget the cached value of one cell and of every cached formula
    /// that read it, directly or through other formulas.
    pub fn clear_cached_result(&mut self, sheet: usize, row: u32, col: u16) {
        self.tracker.invalidate(CellKey::new(sheet, row, col));
    }

    /// Number of cells whose value is currently cached.
    pub fn cached_result_count(&self) -> usize {
        self.tracker.cached_count()
    }
}

fn is_formula_cell(book: &Workbook, sheet: usize, row: u32, col: u16) -> bool {
    book.sheet(sheet)
        .and_then(|s| s.cell(row, col))
        .is_some_and(|c| c.as_formula().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::XlsError;
    use crate::config::EvaluationOptions;

    fn book_with(cells: &[(u32, u16, &str)]) -> (Workbook, usize) {
        let mut book = Workbook::create();
        let sheet = book.create_sheet("Sheet1").unwrap();
        for &(row, col, content) in cells {
            match content.strip_prefix('=') {
                Some(formula) => book.set_cell_formula(sheet, row, col, formula).unwrap(),
                None => match content.parse::<f64>() {
                    Ok(n) => book.set_cell_number(sheet, row, col, n).unwrap(),
                    Err(_) => book.set_cell_string(sheet, row, col, content).unwrap(),
                },
            }
        }
        (book, sheet)
    }

    #[test]
    fn test_simple_formula() {
        let (book, sheet) = book_with(&[(0, 0, "5"), (0, 1, "=A1*2+1")]);
        let mut evaluator = FormulaEvaluator::new();
        assert_eq!(evaluator.evaluate(&book, sheet, 0, 1).unwrap(), CellValue::Number(11.0));
        assert_eq!(evaluator.evaluate(&book, sheet, 0, 0).unwrap(), CellValue::Number(5.0));
        assert_eq!(evaluator.evaluate(&book, sheet, 9, 9).unwrap(), CellValue::Blank);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let (book, sheet) = book_with(&[(0, 0, "=B1+1"), (0, 1, "=A1+1")]);
        let mut evaluator = FormulaEvaluator::new();
        for col in 0..2 {
            let err = evaluator.evaluate(&book, sheet, 0, col).unwrap_err();
            assert!(matches!(err, XlsError::CircularReference { .. }), "{err}");
        }
        assert_eq!(evaluator.tracker.depth(), 0);
    }

    #[test]
    fn test_stale_until_cleared() {
        let (mut book, sheet) = book_with(&[(0, 0, "5"), (0, 1, "=A1*2+1"), (0, 2, "=B1")]);
        let mut evaluator = FormulaEvaluator::new();
        assert_eq!(evaluator.evaluate(&book, sheet, 0, 2).unwrap(), CellValue::Number(11.0));

        book.set_cell_number(sheet, 0, 0, 10.0).unwrap();
        assert_eq!(evaluator.evaluate(&book, sheet, 0, 1).unwrap(), CellValue::Number(11.0));

        evaluator.clear_cached_result(sheet, 0, 0);
        assert_eq!(evaluator.evaluate(&book, sheet, 0, 2).unwrap(), CellValue::Number(21.0));

        book.set_cell_number(sheet, 0, 0, 1.0).unwrap();
        evaluator.clear_all_cached_results();
        assert_eq!(evaluator.cached_result_count(), 0);
        assert_eq!(evaluator.evaluate(&book, sheet, 0, 1).unwrap(), CellValue::Number(3.0));
    }

    #[test]
    fn test_without_caching_changes_are_seen() {
        let (mut book, sheet) = book_with(&[(0, 0, "5"), (0, 1, "=A1+1")]);
        let mut evaluator = FormulaEvaluator::with_options(EvaluationOptions::new().with_cache_results(false));
        assert_eq!(evaluator.evaluate(&book, sheet, 0, 1).unwrap(), CellValue::Number(6.0));
        book.set_cell_number(sheet, 0, 0, 7.0).unwrap();
        assert_eq!(evaluator.evaluate(&book, sheet, 0, 1).unwrap(), CellValue::Number(8.0));
    }

    #[test]
    fn test_depth_limit() {
        let (book, sheet) = book_with(&[(0, 0, "1"), (1, 0, "=A1+1"), (2, 0, "=A2+1"), (3, 0, "=A3+1")]);
        let mut evaluator = FormulaEvaluator::with_options(EvaluationOptions::new().with_max_depth(2));
        let err = evaluator.evaluate(&book, sheet, 3, 0).unwrap_err();
        assert!(matches!(err, XlsError::EvaluationDepthExceeded { limit: 2 }));

        let mut evaluator = FormulaEvaluator::new();
        assert_eq!(evaluator.evaluate(&book, sheet, 3, 0).unwrap(), CellValue::Number(4.0));
    }

    #[test]
    fn test_formula_cell_write_back() {
        let (mut book, sheet) = book_with(&[(0, 0, "abc"), (0, 1, "=A1&\"def\""), (0, 2, "=1/0")]);
        let mut evaluator = FormulaEvaluator::new();
        let value = evaluator.evaluate_formula_cell(&mut book, sheet, 0, 1).unwrap();
        assert_eq!(value, Some(CellValue::Text("abcdef".to_string())));
        let cell = book.sheet(sheet).unwrap().cell(0, 1).unwrap().as_formula().unwrap();
        assert_eq!(cell.cached_string(), Some("abcdef"));
        assert_eq!(evaluator.evaluate_formula_cell(&mut book, sheet, 0, 0).unwrap(), None);

        let bytes = book.to_bytes().unwrap();
        let reread = Workbook::from_bytes(&bytes).unwrap();
        let cell = reread.sheet(sheet).unwrap().cell(0, 1).unwrap().as_formula().unwrap();
        assert_eq!(cell.cached_string(), Some("abcdef"));

        assert_eq!(evaluator.evaluate_all_formula_cells(&mut book).unwrap(), 2);
        let cell = book.sheet(sheet).unwrap().cell(0, 2).unwrap().as_formula().unwrap();
        assert_eq!(cell.record.cached, CachedValue::Error(ErrorCode::Div0.code()));
    }

    #[test]
    fn test_evaluate_in_cell_replaces_formula() {
        let (mut book, sheet) = book_with(&[(0, 0, "2"), (0, 1, "=A1>1")]);
        let mut evaluator = FormulaEvaluator::new();
        assert_eq!(
            evaluator.evaluate_in_cell(&mut book, sheet, 0, 1).unwrap(),
            CellValue::Bool(true)
        );
        let cell = book.sheet(sheet).unwrap().cell(0, 1).unwrap();
        assert!(cell.as_formula().is_none());
        assert_eq!(evaluator.evaluate_in_cell(&mut book, sheet, 0, 0).unwrap(), CellValue::Number(2.0));
    }

    #[test]
    fn test_function_support_query() {
        assert!(is_function_supported("SUMIF"));
        assert!(!is_function_supported("NPV"));
    }
}
