//! Values produced and consumed by the evaluator.

use crate::common::number::number_to_text;
use crate::formula::{ArrayConstant, ConstantValue, ErrorCode};
use std::fmt;

/// Result of evaluating a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Error(ErrorCode),
    Blank,
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<ErrorCode> {
        match self {
            CellValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => f.write_str(&number_to_text(*n)),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Bool(true) => f.write_str("TRUE"),
            CellValue::Bool(false) => f.write_str("FALSE"),
            CellValue::Error(e) => f.write_str(e.text()),
            CellValue::Blank => Ok(()),
        }
    }
}

/// A rectangle of cells on one sheet, first <= last on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SheetArea {
    pub sheet: usize,
    pub first_row: u32,
    pub last_row: u32,
    pub first_col: u16,
    pub last_col: u16,
}

impl SheetArea {
    pub fn new(sheet: usize, r1: u32, c1: u16, r2: u32, c2: u16) -> Self {
        Self {
            sheet,
            first_row: r1.min(r2),
            last_row: r1.max(r2),
            first_col: c1.min(c2),
            last_col: c1.max(c2),
        }
    }

    pub fn rows(&self) -> u32 {
        self.last_row - self.first_row + 1
    }

    pub fn cols(&self) -> u32 {
        u32::from(self.last_col - self.first_col) + 1
    }

    pub fn cell_count(&self) -> u64 {
        u64::from(self.rows()) * u64::from(self.cols())
    }

    pub fn contains(&self, sheet: usize, row: u32, col: u16) -> bool {
        self.sheet == sheet
            && (self.first_row..=self.last_row).contains(&row)
            && (self.first_col..=self.last_col).contains(&col)
    }

    pub fn intersect(&self, other: &SheetArea) -> Option<SheetArea> {
        if self.sheet != other.sheet {
            return None;
        }
        let first_row = self.first_row.max(other.first_row);
        let last_row = self.last_row.min(other.last_row);
        let first_col = self.first_col.max(other.first_col);
        let last_col = self.last_col.min(other.last_col);
        (first_row <= last_row && first_col <= last_col).then_some(SheetArea {
            sheet: self.sheet,
            first_row,
            last_row,
            first_col,
            last_col,
        })
    }
}

/// An array literal with scalar elements, row-major.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ArrayValue {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<Value>,
}

impl ArrayValue {
    pub fn from_constant(constant: &ArrayConstant) -> Self {
        let values = constant
            .values
            .iter()
            .map(|v| match v {
                ConstantValue::Empty => Value::Blank,
                ConstantValue::Number(n) => Value::Number(*n),
                ConstantValue::String(s) => Value::Text(s.text().to_string()),
                ConstantValue::Bool(b) => Value::Bool(*b),
                ConstantValue::Error(code) => Value::Error(error_from_code(*code)),
            })
            .collect();
        Self {
            rows: usize::from(constant.rows),
            cols: usize::from(constant.cols),
            values,
        }
    }

    pub fn first(&self) -> Value {
        self.values.first().cloned().unwrap_or(Value::Blank)
    }
}

/// A value on the operand stack.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Error(ErrorCode),
    Blank,
    /// An omitted function argument.
    Missing,
    Ref { sheet: usize, row: u32, col: u16 },
    Area(SheetArea),
    Array(ArrayValue),
}

impl Value {
    /// Reference operands as an area; a single cell becomes a 1x1 area.
    pub fn as_area(&self) -> Option<SheetArea> {
        match self {
            Value::Ref { sheet, row, col } => Some(SheetArea::new(*sheet, *row, *col, *row, *col)),
            Value::Area(area) => Some(*area),
            _ => None,
        }
    }

    /// Convert a scalar into a cell result. Blank stays blank; references
    /// and arrays must be dereferenced first.
    pub fn into_cell_value(self) -> CellValue {
        match self {
            Value::Number(n) if n.is_finite() => CellValue::Number(n),
            Value::Number(_) => CellValue::Error(ErrorCode::Num),
            Value::Text(s) => CellValue::Text(s),
            Value::Bool(b) => CellValue::Bool(b),
            Value::Error(e) => CellValue::Error(e),
            Value::Blank | Value::Missing => CellValue::Blank,
            Value::Ref { .. } | Value::Area(_) | Value::Array(_) => {
                CellValue::Error(ErrorCode::Value)
            },
        }
    }
}

impl From<CellValue> for Value {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Number(n) => Value::Number(n),
            CellValue::Text(s) => Value::Text(s),
            CellValue::Bool(b) => Value::Bool(b),
            CellValue::Error(e) => Value::Error(e),
            CellValue::Blank => Value::Blank,
        }
    }
}

/// Unknown codes read from a file are reported as `#VALUE!`.
pub(crate) fn error_from_code(code: u8) -> ErrorCode {
    ErrorCode::from_code(code).unwrap_or(ErrorCode::Value)
}
