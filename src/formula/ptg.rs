//! Parsed formula tokens ("ptgs").
//!
//! A formula is stored as a postfix token sequence. Each token starts with a
//! one-byte identifier; operand tokens (references, names, functions) fold
//! an operand class into bits 5 and 6 of that identifier. Array constants
//! and memory-area range lists do not live inside the token stream: they
//! follow it, in token order, after the last token.

use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use crate::records::strings::XlString;
use bitflags::bitflags;
use std::io::Write;

/// How a referencing token delivers its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperandClass {
    #[default]
    Reference,
    Value,
    Array,
}

impl OperandClass {
    fn from_id(id: u8) -> Self {
        match id & 0x60 {
            0x40 => OperandClass::Value,
            0x60 => OperandClass::Array,
            _ => OperandClass::Reference,
        }
    }

    fn bits(self) -> u8 {
        match self {
            OperandClass::Reference => 0x20,
            OperandClass::Value => 0x40,
            OperandClass::Array => 0x60,
        }
    }
}

const ROW_RELATIVE: u16 = 0x8000;
const COL_RELATIVE: u16 = 0x4000;
const COL_MASK: u16 = 0x3FFF;

/// A cell address with its relative/absolute flags.
///
/// The flags live in the top two bits of the 16-bit column field, exactly as
/// on disk. In RefN/AreaN tokens a relative row is a signed 16-bit offset and
/// a relative column is a signed 8-bit offset in the low byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellReference {
    row: u16,
    col_field: u16,
}

impl CellReference {
    /// Absolute-or-relative reference, validated against the sheet grid.
    pub fn new(row: u32, col: u32, row_relative: bool, col_relative: bool) -> XlsResult<Self> {
        if row > 0xFFFF {
            return Err(XlsError::invalid_argument(format!(
                "row {} is outside 0..=65535",
                row
            )));
        }
        if col > 0xFF {
            return Err(XlsError::invalid_argument(format!(
                "column {} is outside 0..=255",
                col
            )));
        }
        let mut col_field = col as u16;
        if row_relative {
            col_field |= ROW_RELATIVE;
        }
        if col_relative {
            col_field |= COL_RELATIVE;
        }
        Ok(Self {
            row: row as u16,
            col_field,
        })
    }

    /// Reference from the raw on-disk fields.
    pub const fn from_raw(row: u16, col_field: u16) -> Self {
        Self { row, col_field }
    }

    #[inline]
    pub fn row(&self) -> u16 {
        self.row
    }

    #[inline]
    pub fn col(&self) -> u16 {
        self.col_field & COL_MASK
    }

    #[inline]
    pub fn raw_col_field(&self) -> u16 {
        self.col_field
    }

    #[inline]
    pub fn is_row_relative(&self) -> bool {
        self.col_field & ROW_RELATIVE != 0
    }

    #[inline]
    pub fn is_col_relative(&self) -> bool {
        self.col_field & COL_RELATIVE != 0
    }

    /// Row as a signed offset (RefN/AreaN tokens).
    pub fn row_offset(&self) -> i32 {
        if self.is_row_relative() {
            self.row as i16 as i32
        } else {
            self.row as i32
        }
    }

    /// Column as a signed offset (RefN/AreaN tokens).
    pub fn col_offset(&self) -> i32 {
        if self.is_col_relative() {
            (self.col_field & 0x00FF) as u8 as i8 as i32
        } else {
            self.col() as i32
        }
    }

    /// Resolve a RefN-style reference against the cell holding the formula.
    pub fn resolve_relative_to(&self, row: u16, col: u16) -> CellReference {
        let new_row = if self.is_row_relative() {
            self.row.wrapping_add(row)
        } else {
            self.row
        };
        let new_col = if self.is_col_relative() {
            (self.col().wrapping_add(col)) & 0x00FF
        } else {
            self.col()
        };
        CellReference {
            row: new_row,
            col_field: (self.col_field & !COL_MASK) | new_col,
        }
    }

    fn read(r: &mut LittleEndianReader<'_>) -> XlsResult<Self> {
        Ok(Self {
            row: r.read_u16()?,
            col_field: r.read_u16()?,
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.row.to_le_bytes())?;
        writer.write_all(&self.col_field.to_le_bytes())?;
        Ok(())
    }
}

/// A rectangular range of cells. Encoded as first row, last row, first
/// column field, last column field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AreaReference {
    pub first: CellReference,
    pub last: CellReference,
}

impl AreaReference {
    pub fn new(first: CellReference, last: CellReference) -> Self {
        Self { first, last }
    }

    /// Whether the area spans entire columns (rows 0..=65535).
    pub fn is_whole_column(&self) -> bool {
        self.first.row() == 0 && self.last.row() == 0xFFFF
    }

    pub fn resolve_relative_to(&self, row: u16, col: u16) -> AreaReference {
        AreaReference {
            first: self.first.resolve_relative_to(row, col),
            last: self.last.resolve_relative_to(row, col),
        }
    }

    fn read(r: &mut LittleEndianReader<'_>) -> XlsResult<Self> {
        let first_row = r.read_u16()?;
        let last_row = r.read_u16()?;
        let first_col = r.read_u16()?;
        let last_col = r.read_u16()?;
        Ok(Self {
            first: CellReference::from_raw(first_row, first_col),
            last: CellReference::from_raw(last_row, last_col),
        })
    }

    fn write<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.first.row.to_le_bytes())?;
        writer.write_all(&self.last.row.to_le_bytes())?;
        writer.write_all(&self.first.col_field.to_le_bytes())?;
        writer.write_all(&self.last.col_field.to_le_bytes())?;
        Ok(())
    }
}

bitflags! {
    /// tAttr option bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttrFlags: u8 {
        const VOLATILE = 0x01;
        const IF = 0x02;
        const CHOOSE = 0x04;
        const SKIP = 0x08;
        const SUM = 0x10;
        const BAXCEL = 0x20;
        const SPACE = 0x40;
    }
}

/// Control token used for optimized IF/CHOOSE, volatility, SUM of a single
/// argument and whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrPtg {
    pub flags: AttrFlags,
    /// Jump distance for IF/SKIP, case count for CHOOSE, whitespace
    /// type/count for SPACE.
    pub data: u16,
    /// CHOOSE only: per-case jump offsets measured from the jump table start.
    pub jump_table: Vec<u16>,
    /// CHOOSE only: offset of the CHOOSE function token.
    pub choose_func_offset: u16,
}

impl AttrPtg {
    pub fn new(flags: AttrFlags, data: u16) -> Self {
        Self {
            flags,
            data,
            jump_table: Vec::new(),
            choose_func_offset: 0,
        }
    }

    pub fn if_attr(jump: u16) -> Self {
        Self::new(AttrFlags::IF, jump)
    }

    pub fn skip(distance: u16) -> Self {
        Self::new(AttrFlags::SKIP, distance)
    }

    pub fn sum() -> Self {
        Self::new(AttrFlags::SUM, 0)
    }

    pub fn is_if(&self) -> bool {
        self.flags.contains(AttrFlags::IF)
    }

    pub fn is_skip(&self) -> bool {
        self.flags.contains(AttrFlags::SKIP)
    }

    pub fn is_optimized_choose(&self) -> bool {
        self.flags.contains(AttrFlags::CHOOSE)
    }

    pub fn is_sum(&self) -> bool {
        self.flags.contains(AttrFlags::SUM)
    }

    pub fn is_space(&self) -> bool {
        self.flags.contains(AttrFlags::SPACE)
    }

    pub fn is_volatile(&self) -> bool {
        self.flags.contains(AttrFlags::VOLATILE)
    }

    /// Control-only attributes never change the operand stack.
    pub fn is_control(&self) -> bool {
        !self.is_sum()
    }

    fn size(&self) -> usize {
        if self.is_optimized_choose() {
            4 + 2 * (self.jump_table.len() + 1)
        } else {
            4
        }
    }
}

/// A constant inside an array literal (`{1,"a";TRUE,#N/A}`).
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Empty,
    Number(f64),
    String(XlString),
    Bool(bool),
    Error(u8),
}

impl ConstantValue {
    fn read(r: &mut LittleEndianReader<'_>) -> XlsResult<Self> {
        let kind = r.read_u8()?;
        Ok(match kind {
            0x00 => {
                r.read_slice(8)?;
                ConstantValue::Empty
            },
            0x01 => ConstantValue::Number(r.read_f64()?),
            0x02 => ConstantValue::String(XlString::read(r)?),
            0x04 => {
                let v = r.read_u8()?;
                r.read_slice(7)?;
                ConstantValue::Bool(v != 0)
            },
            0x10 => {
                let v = r.read_u8()?;
                r.read_slice(7)?;
                ConstantValue::Error(v)
            },
            other => {
                return Err(XlsError::InvalidFormula(format!(
                    "unknown array constant type 0x{:02X}",
                    other
                )));
            },
        })
    }

    fn size(&self) -> usize {
        match self {
            ConstantValue::String(s) => 1 + s.encoded_size(),
            _ => 9,
        }
    }

    fn write<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        match self {
            ConstantValue::Empty => writer.write_all(&[0x00; 9])?,
            ConstantValue::Number(n) => {
                writer.write_all(&[0x01])?;
                writer.write_all(&n.to_le_bytes())?;
            },
            ConstantValue::String(s) => {
                writer.write_all(&[0x02])?;
                s.write(writer)?;
            },
            ConstantValue::Bool(b) => {
                writer.write_all(&[0x04, *b as u8, 0, 0, 0, 0, 0, 0, 0])?;
            },
            ConstantValue::Error(e) => {
                writer.write_all(&[0x10, *e, 0, 0, 0, 0, 0, 0, 0])?;
            },
        }
        Ok(())
    }
}

/// Values of an array literal, row-major.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayConstant {
    pub cols: u16,
    pub rows: u16,
    pub values: Vec<ConstantValue>,
}

impl ArrayConstant {
    pub fn value(&self, row: u16, col: u16) -> Option<&ConstantValue> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.values
            .get(row as usize * self.cols as usize + col as usize)
    }

    fn read(r: &mut LittleEndianReader<'_>) -> XlsResult<Self> {
        let cols = r.read_u8()? as u16 + 1;
        let rows = r.read_u16()?.wrapping_add(1);
        let count = cols as usize * rows as usize;
        let mut values = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            values.push(ConstantValue::read(r)?);
        }
        Ok(Self { cols, rows, values })
    }

    fn size(&self) -> usize {
        3 + self.values.iter().map(ConstantValue::size).sum::<usize>()
    }

    fn write<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        if self.cols == 0 || self.cols > 256 || self.rows == 0 {
            return Err(XlsError::InvalidFormula(format!(
                "array constant of {}x{} cannot be encoded",
                self.rows, self.cols
            )));
        }
        writer.write_all(&[(self.cols - 1) as u8])?;
        writer.write_all(&(self.rows - 1).to_le_bytes())?;
        for v in &self.values {
            v.write(writer)?;
        }
        Ok(())
    }
}

/// One formula token.
#[derive(Debug, Clone, PartialEq)]
pub enum Ptg {
    /// Shared or array formula pointer to the master cell.
    Exp { row: u16, col: u16 },
    /// Data table pointer to the table's top-left cell.
    Tbl { row: u16, col: u16 },
    Add,
    Sub,
    Mul,
    Div,
    Power,
    Concat,
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
    Intersect,
    Union,
    Range,
    UnaryPlus,
    UnaryMinus,
    Percent,
    Paren,
    MissingArg,
    Str(XlString),
    Attr(AttrPtg),
    Err(u8),
    Bool(bool),
    Int(u16),
    Num(f64),
    Array {
        class: OperandClass,
        reserved: [u8; 7],
        value: ArrayConstant,
    },
    Func {
        class: OperandClass,
        index: u16,
    },
    FuncVar {
        class: OperandClass,
        /// Argument count; bit 7 is the prompt flag.
        arg_count: u8,
        /// Function index; bit 15 marks a command-equivalent.
        index: u16,
    },
    Name {
        class: OperandClass,
        /// One-based index into the workbook's NAME records.
        index: u16,
        reserved: u16,
    },
    Ref {
        class: OperandClass,
        cell: CellReference,
    },
    Area {
        class: OperandClass,
        area: AreaReference,
    },
    MemArea {
        class: OperandClass,
        reserved: u32,
        size: u16,
        ranges: Vec<AreaReference>,
    },
    MemErr {
        class: OperandClass,
        reserved: u32,
        size: u16,
    },
    MemNoMem {
        class: OperandClass,
        reserved: u32,
        size: u16,
    },
    MemFunc {
        class: OperandClass,
        size: u16,
    },
    RefErr {
        class: OperandClass,
        reserved: u32,
    },
    AreaErr {
        class: OperandClass,
        reserved: [u8; 8],
    },
    RefN {
        class: OperandClass,
        cell: CellReference,
    },
    AreaN {
        class: OperandClass,
        area: AreaReference,
    },
    NameX {
        class: OperandClass,
        extern_sheet: u16,
        /// One-based index into the SUPBOOK's EXTERNNAME (or NAME) list.
        name_index: u16,
        reserved: u16,
    },
    Ref3d {
        class: OperandClass,
        extern_sheet: u16,
        cell: CellReference,
    },
    Area3d {
        class: OperandClass,
        extern_sheet: u16,
        area: AreaReference,
    },
    RefErr3d {
        class: OperandClass,
        extern_sheet: u16,
        reserved: u32,
    },
    AreaErr3d {
        class: OperandClass,
        extern_sheet: u16,
        reserved: [u8; 8],
    },
}

impl Ptg {
    pub fn int_or_num(value: f64) -> Ptg {
        if value >= 0.0 && value <= 65535.0 && value.fract() == 0.0 {
            Ptg::Int(value as u16)
        } else {
            Ptg::Num(value)
        }
    }

    pub fn reference(cell: CellReference) -> Ptg {
        Ptg::Ref {
            class: OperandClass::Reference,
            cell,
        }
    }

    pub fn area(area: AreaReference) -> Ptg {
        Ptg::Area {
            class: OperandClass::Reference,
            area,
        }
    }

    /// Base identifier (class bits folded to the reference class).
    fn base_id(&self) -> u8 {
        match self {
            Ptg::Exp { .. } => 0x01,
            Ptg::Tbl { .. } => 0x02,
            Ptg::Add => 0x03,
            Ptg::Sub => 0x04,
            Ptg::Mul => 0x05,
            Ptg::Div => 0x06,
            Ptg::Power => 0x07,
            Ptg::Concat => 0x08,
            Ptg::Lt => 0x09,
            Ptg::Le => 0x0A,
            Ptg::Eq => 0x0B,
            Ptg::Ge => 0x0C,
            Ptg::Gt => 0x0D,
            Ptg::Ne => 0x0E,
            Ptg::Intersect => 0x0F,
            Ptg::Union => 0x10,
            Ptg::Range => 0x11,
            Ptg::UnaryPlus => 0x12,
            Ptg::UnaryMinus => 0x13,
            Ptg::Percent => 0x14,
            Ptg::Paren => 0x15,
            Ptg::MissingArg => 0x16,
            Ptg::Str(_) => 0x17,
            Ptg::Attr(_) => 0x19,
            Ptg::Err(_) => 0x1C,
            Ptg::Bool(_) => 0x1D,
            Ptg::Int(_) => 0x1E,
            Ptg::Num(_) => 0x1F,
            Ptg::Array { .. } => 0x20,
            Ptg::Func { .. } => 0x21,
            Ptg::FuncVar { .. } => 0x22,
            Ptg::Name { .. } => 0x23,
            Ptg::Ref { .. } => 0x24,
            Ptg::Area { .. } => 0x25,
            Ptg::MemArea { .. } => 0x26,
            Ptg::MemErr { .. } => 0x27,
            Ptg::MemNoMem { .. } => 0x28,
            Ptg::MemFunc { .. } => 0x29,
            Ptg::RefErr { .. } => 0x2A,
            Ptg::AreaErr { .. } => 0x2B,
            Ptg::RefN { .. } => 0x2C,
            Ptg::AreaN { .. } => 0x2D,
            Ptg::NameX { .. } => 0x39,
            Ptg::Ref3d { .. } => 0x3A,
            Ptg::Area3d { .. } => 0x3B,
            Ptg::RefErr3d { .. } => 0x3C,
            Ptg::AreaErr3d { .. } => 0x3D,
        }
    }

    /// Operand class of a classed token.
    pub fn operand_class(&self) -> Option<OperandClass> {
        match self {
            Ptg::Array { class, .. }
            | Ptg::Func { class, .. }
            | Ptg::FuncVar { class, .. }
            | Ptg::Name { class, .. }
            | Ptg::Ref { class, .. }
            | Ptg::Area { class, .. }
            | Ptg::MemArea { class, .. }
            | Ptg::MemErr { class, .. }
            | Ptg::MemNoMem { class, .. }
            | Ptg::MemFunc { class, .. }
            | Ptg::RefErr { class, .. }
            | Ptg::AreaErr { class, .. }
            | Ptg::RefN { class, .. }
            | Ptg::AreaN { class, .. }
            | Ptg::NameX { class, .. }
            | Ptg::Ref3d { class, .. }
            | Ptg::Area3d { class, .. }
            | Ptg::RefErr3d { class, .. }
            | Ptg::AreaErr3d { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Change the operand class; unclassed tokens are left alone.
    pub fn set_operand_class(&mut self, new_class: OperandClass) {
        match self {
            Ptg::Array { class, .. }
            | Ptg::Func { class, .. }
            | Ptg::FuncVar { class, .. }
            | Ptg::Name { class, .. }
            | Ptg::Ref { class, .. }
            | Ptg::Area { class, .. }
            | Ptg::MemArea { class, .. }
            | Ptg::MemErr { class, .. }
            | Ptg::MemNoMem { class, .. }
            | Ptg::MemFunc { class, .. }
            | Ptg::RefErr { class, .. }
            | Ptg::AreaErr { class, .. }
            | Ptg::RefN { class, .. }
            | Ptg::AreaN { class, .. }
            | Ptg::NameX { class, .. }
            | Ptg::Ref3d { class, .. }
            | Ptg::Area3d { class, .. }
            | Ptg::RefErr3d { class, .. }
            | Ptg::AreaErr3d { class, .. } => *class = new_class,
            _ => {},
        }
    }

    /// On-disk identifier including the class bits.
    pub fn id(&self) -> u8 {
        let base = self.base_id();
        match self.operand_class() {
            Some(class) => (base & 0x1F) | class.bits(),
            None => base,
        }
    }

    /// Whether this token is a binary or unary operator.
    pub fn is_operator(&self) -> bool {
        matches!(self.base_id(), 0x03..=0x15)
    }

    /// Encoded size inside the token stream (trailing data excluded).
    pub fn size(&self) -> usize {
        match self {
            Ptg::Exp { .. } | Ptg::Tbl { .. } => 5,
            Ptg::Str(s) => 1 + s.encoded_size_short(),
            Ptg::Attr(a) => a.size(),
            Ptg::Err(_) | Ptg::Bool(_) => 2,
            Ptg::Int(_) => 3,
            Ptg::Num(_) => 9,
            Ptg::Array { .. } => 8,
            Ptg::Func { .. } => 3,
            Ptg::FuncVar { .. } => 4,
            Ptg::Name { .. } => 5,
            Ptg::Ref { .. } | Ptg::RefN { .. } => 5,
            Ptg::Area { .. } | Ptg::AreaN { .. } => 9,
            Ptg::MemArea { .. } | Ptg::MemErr { .. } | Ptg::MemNoMem { .. } => 7,
            Ptg::MemFunc { .. } => 3,
            Ptg::RefErr { .. } => 5,
            Ptg::AreaErr { .. } => 9,
            Ptg::NameX { .. } => 7,
            Ptg::Ref3d { .. } | Ptg::RefErr3d { .. } => 7,
            Ptg::Area3d { .. } | Ptg::AreaErr3d { .. } => 11,
            _ => 1,
        }
    }

    /// Size of the data this token appends after the token stream.
    pub fn trailing_size(&self) -> usize {
        match self {
            Ptg::Array { value, .. } => value.size(),
            Ptg::MemArea { ranges, .. } => 2 + 8 * ranges.len(),
            _ => 0,
        }
    }

    fn read(r: &mut LittleEndianReader<'_>) -> XlsResult<Ptg> {
        let id = r.read_u8()?;
        if id < 0x20 {
            return Self::read_basic(id, r);
        }
        let class = OperandClass::from_id(id);
        let ptg = match (id & 0x1F) | 0x20 {
            0x20 => {
                let mut reserved = [0u8; 7];
                reserved.copy_from_slice(r.read_slice(7)?);
                Ptg::Array {
                    class,
                    reserved,
                    value: ArrayConstant::default(),
                }
            },
            0x21 => Ptg::Func {
                class,
                index: r.read_u16()?,
            },
            0x22 => Ptg::FuncVar {
                class,
                arg_count: r.read_u8()?,
                index: r.read_u16()?,
            },
            0x23 => Ptg::Name {
                class,
                index: r.read_u16()?,
                reserved: r.read_u16()?,
            },
            0x24 => Ptg::Ref {
                class,
                cell: CellReference::read(r)?,
            },
            0x25 => Ptg::Area {
                class,
                area: AreaReference::read(r)?,
            },
            0x26 => Ptg::MemArea {
                class,
                reserved: r.read_u32()?,
                size: r.read_u16()?,
                ranges: Vec::new(),
            },
            0x27 => Ptg::MemErr {
                class,
                reserved: r.read_u32()?,
                size: r.read_u16()?,
            },
            0x28 => Ptg::MemNoMem {
                class,
                reserved: r.read_u32()?,
                size: r.read_u16()?,
            },
            0x29 => Ptg::MemFunc {
                class,
                size: r.read_u16()?,
            },
            0x2A => Ptg::RefErr {
                class,
                reserved: r.read_u32()?,
            },
            0x2B => {
                let mut reserved = [0u8; 8];
                reserved.copy_from_slice(r.read_slice(8)?);
                Ptg::AreaErr { class, reserved }
            },
            0x2C => Ptg::RefN {
                class,
                cell: CellReference::read(r)?,
            },
            0x2D => Ptg::AreaN {
                class,
                area: AreaReference::read(r)?,
            },
            0x39 => Ptg::NameX {
                class,
                extern_sheet: r.read_u16()?,
                name_index: r.read_u16()?,
                reserved: r.read_u16()?,
            },
            0x3A => Ptg::Ref3d {
                class,
                extern_sheet: r.read_u16()?,
                cell: CellReference::read(r)?,
            },
            0x3B => Ptg::Area3d {
                class,
                extern_sheet: r.read_u16()?,
                area: AreaReference::read(r)?,
            },
            0x3C => Ptg::RefErr3d {
                class,
                extern_sheet: r.read_u16()?,
                reserved: r.read_u32()?,
            },
            0x3D => {
                let extern_sheet = r.read_u16()?;
                let mut reserved = [0u8; 8];
                reserved.copy_from_slice(r.read_slice(8)?);
                Ptg::AreaErr3d {
                    class,
                    extern_sheet,
                    reserved,
                }
            },
            _ => {
                return Err(XlsError::InvalidFormula(format!(
                    "unknown token id 0x{:02X}",
                    id
                )));
            },
        };
        Ok(ptg)
    }

    fn read_basic(id: u8, r: &mut LittleEndianReader<'_>) -> XlsResult<Ptg> {
        Ok(match id {
            0x01 => Ptg::Exp {
                row: r.read_u16()?,
                col: r.read_u16()?,
            },
            0x02 => Ptg::Tbl {
                row: r.read_u16()?,
                col: r.read_u16()?,
            },
            0x03 => Ptg::Add,
            0x04 => Ptg::Sub,
            0x05 => Ptg::Mul,
            0x06 => Ptg::Div,
            0x07 => Ptg::Power,
            0x08 => Ptg::Concat,
            0x09 => Ptg::Lt,
            0x0A => Ptg::Le,
            0x0B => Ptg::Eq,
            0x0C => Ptg::Ge,
            0x0D => Ptg::Gt,
            0x0E => Ptg::Ne,
            0x0F => Ptg::Intersect,
            0x10 => Ptg::Union,
            0x11 => Ptg::Range,
            0x12 => Ptg::UnaryPlus,
            0x13 => Ptg::UnaryMinus,
            0x14 => Ptg::Percent,
            0x15 => Ptg::Paren,
            0x16 => Ptg::MissingArg,
            0x17 => Ptg::Str(XlString::read_short(r)?),
            0x19 => {
                let flags = AttrFlags::from_bits_retain(r.read_u8()?);
                let data = r.read_u16()?;
                let mut attr = AttrPtg::new(flags, data);
                if attr.is_optimized_choose() {
                    for _ in 0..data {
                        attr.jump_table.push(r.read_u16()?);
                    }
                    attr.choose_func_offset = r.read_u16()?;
                }
                Ptg::Attr(attr)
            },
            0x1C => Ptg::Err(r.read_u8()?),
            0x1D => Ptg::Bool(r.read_u8()? != 0),
            0x1E => Ptg::Int(r.read_u16()?),
            0x1F => Ptg::Num(r.read_f64()?),
            other => {
                return Err(XlsError::InvalidFormula(format!(
                    "unsupported token id 0x{:02X}",
                    other
                )));
            },
        })
    }

    /// Write the token (trailing data excluded).
    pub fn write<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&[self.id()])?;
        match self {
            Ptg::Exp { row, col } | Ptg::Tbl { row, col } => {
                writer.write_all(&row.to_le_bytes())?;
                writer.write_all(&col.to_le_bytes())?;
            },
            Ptg::Str(s) => s.write_short(writer)?,
            Ptg::Attr(a) => {
                writer.write_all(&[a.flags.bits()])?;
                writer.write_all(&a.data.to_le_bytes())?;
                if a.is_optimized_choose() {
                    for offset in &a.jump_table {
                        writer.write_all(&offset.to_le_bytes())?;
                    }
                    writer.write_all(&a.choose_func_offset.to_le_bytes())?;
                }
            },
            Ptg::Err(code) => writer.write_all(&[*code])?,
            Ptg::Bool(b) => writer.write_all(&[*b as u8])?,
            Ptg::Int(v) => writer.write_all(&v.to_le_bytes())?,
            Ptg::Num(v) => writer.write_all(&v.to_le_bytes())?,
            Ptg::Array { reserved, .. } => writer.write_all(reserved)?,
            Ptg::Func { index, .. } => writer.write_all(&index.to_le_bytes())?,
            Ptg::FuncVar {
                arg_count, index, ..
            } => {
                writer.write_all(&[*arg_count])?;
                writer.write_all(&index.to_le_bytes())?;
            },
            Ptg::Name {
                index, reserved, ..
            } => {
                writer.write_all(&index.to_le_bytes())?;
                writer.write_all(&reserved.to_le_bytes())?;
            },
            Ptg::Ref { cell, .. } | Ptg::RefN { cell, .. } => cell.write(writer)?,
            Ptg::Area { area, .. } | Ptg::AreaN { area, .. } => area.write(writer)?,
            Ptg::MemArea { reserved, size, .. }
            | Ptg::MemErr { reserved, size, .. }
            | Ptg::MemNoMem { reserved, size, .. } => {
                writer.write_all(&reserved.to_le_bytes())?;
                writer.write_all(&size.to_le_bytes())?;
            },
            Ptg::MemFunc { size, .. } => writer.write_all(&size.to_le_bytes())?,
            Ptg::RefErr { reserved, .. } => writer.write_all(&reserved.to_le_bytes())?,
            Ptg::AreaErr { reserved, .. } => writer.write_all(reserved)?,
            Ptg::NameX {
                extern_sheet,
                name_index,
                reserved,
                ..
            } => {
                writer.write_all(&extern_sheet.to_le_bytes())?;
                writer.write_all(&name_index.to_le_bytes())?;
                writer.write_all(&reserved.to_le_bytes())?;
            },
            Ptg::Ref3d {
                extern_sheet, cell, ..
            } => {
                writer.write_all(&extern_sheet.to_le_bytes())?;
                cell.write(writer)?;
            },
            Ptg::Area3d {
                extern_sheet, area, ..
            } => {
                writer.write_all(&extern_sheet.to_le_bytes())?;
                area.write(writer)?;
            },
            Ptg::RefErr3d {
                extern_sheet,
                reserved,
                ..
            } => {
                writer.write_all(&extern_sheet.to_le_bytes())?;
                writer.write_all(&reserved.to_le_bytes())?;
            },
            Ptg::AreaErr3d {
                extern_sheet,
                reserved,
                ..
            } => {
                writer.write_all(&extern_sheet.to_le_bytes())?;
                writer.write_all(reserved)?;
            },
            _ => {},
        }
        Ok(())
    }

    fn write_trailing<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        match self {
            Ptg::Array { value, .. } => value.write(writer),
            Ptg::MemArea { ranges, .. } => {
                writer.write_all(&(ranges.len() as u16).to_le_bytes())?;
                for area in ranges {
                    writer.write_all(&area.first.row.to_le_bytes())?;
                    writer.write_all(&area.last.row.to_le_bytes())?;
                    writer.write_all(&area.first.col_field.to_le_bytes())?;
                    writer.write_all(&area.last.col_field.to_le_bytes())?;
                }
                Ok(())
            },
            _ => Ok(()),
        }
    }
}

/// Decode `token_bytes` into tokens. Trailing data is not read here.
pub fn parse_tokens(token_bytes: &[u8]) -> XlsResult<Vec<Ptg>> {
    // Token errors are reported against the FORMULA sid for context.
    let mut r = LittleEndianReader::new(crate::records::sid::FORMULA, token_bytes);
    let mut tokens = Vec::new();
    while !r.is_empty() {
        tokens.push(Ptg::read(&mut r)?);
    }
    Ok(tokens)
}

/// Fill array constants and memory-area lists from the trailing data.
pub fn read_trailing_data(tokens: &mut [Ptg], r: &mut LittleEndianReader<'_>) -> XlsResult<()> {
    for ptg in tokens.iter_mut() {
        match ptg {
            Ptg::Array { value, .. } => *value = ArrayConstant::read(r)?,
            Ptg::MemArea { ranges, .. } => {
                let count = r.read_u16()? as usize;
                let mut out = Vec::with_capacity(count);
                for _ in 0..count {
                    out.push(AreaReference::read(r)?);
                }
                *ranges = out;
            },
            _ => {},
        }
    }
    Ok(())
}

/// Total size of the tokens alone.
pub fn tokens_size(tokens: &[Ptg]) -> usize {
    tokens.iter().map(Ptg::size).sum()
}

/// Size of all trailing data.
pub fn trailing_size(tokens: &[Ptg]) -> usize {
    tokens.iter().map(Ptg::trailing_size).sum()
}

/// Write tokens followed by their trailing data.
pub fn write_tokens<W: Write>(tokens: &[Ptg], writer: &mut W) -> XlsResult<()> {
    for ptg in tokens {
        ptg.write(writer)?;
    }
    for ptg in tokens {
        ptg.write_trailing(writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(tokens: &[Ptg]) -> Vec<u8> {
        let mut out = Vec::new();
        write_tokens(tokens, &mut out).unwrap();
        out
    }

    #[test]
    fn test_reference_flags_in_column_field() {
        let cell = CellReference::new(4, 2, true, false).unwrap();
        assert_eq!(cell.raw_col_field(), 0x8002);
        assert_eq!(cell.col(), 2);
        assert!(cell.is_row_relative());
        assert!(!cell.is_col_relative());
    }

    #[test]
    fn test_reference_bounds() {
        assert!(CellReference::new(65535, 255, false, false).is_ok());
        assert!(matches!(
            CellReference::new(65536, 0, true, true),
            Err(XlsError::InvalidArgument(_))
        ));
        assert!(matches!(
            CellReference::new(0, 256, true, true),
            Err(XlsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_operand_class_round_trip() {
        let bytes = [0x44, 0x01, 0x00, 0x02, 0xC0];
        let tokens = parse_tokens(&bytes).unwrap();
        assert_eq!(tokens[0].operand_class(), Some(OperandClass::Value));
        assert_eq!(tokens[0].id(), 0x44);
        assert_eq!(encode(&tokens), bytes);
    }

    #[test]
    fn test_token_sizes() {
        let cases: Vec<(Ptg, usize)> = vec![
            (Ptg::Exp { row: 0, col: 0 }, 5),
            (Ptg::Str(XlString::new("abc")), 6),
            (Ptg::Attr(AttrPtg::sum()), 4),
            (Ptg::Err(7), 2),
            (Ptg::Bool(true), 2),
            (Ptg::Int(3), 3),
            (Ptg::Num(1.5), 9),
            (
                Ptg::Func {
                    class: OperandClass::Value,
                    index: 1,
                },
                3,
            ),
            (
                Ptg::FuncVar {
                    class: OperandClass::Value,
                    arg_count: 2,
                    index: 4,
                },
                4,
            ),
            (
                Ptg::Ref3d {
                    class: OperandClass::Reference,
                    extern_sheet: 0,
                    cell: CellReference::default(),
                },
                7,
            ),
            (
                Ptg::Area3d {
                    class: OperandClass::Reference,
                    extern_sheet: 0,
                    area: AreaReference::default(),
                },
                11,
            ),
        ];
        for (ptg, size) in cases {
            assert_eq!(ptg.size(), size, "{:?}", ptg);
            assert_eq!(encode(std::slice::from_ref(&ptg)).len(), size);
        }
    }

    #[test]
    fn test_choose_attr_round_trip() {
        let mut attr = AttrPtg::new(AttrFlags::CHOOSE, 2);
        attr.jump_table = vec![6, 12];
        attr.choose_func_offset = 18;
        let ptg = Ptg::Attr(attr);
        assert_eq!(ptg.size(), 10);
        let bytes = encode(std::slice::from_ref(&ptg));
        assert_eq!(parse_tokens(&bytes).unwrap(), vec![ptg]);
    }

    #[test]
    fn test_array_constant_trailing_data() {
        let array = Ptg::Array {
            class: OperandClass::Array,
            reserved: [0; 7],
            value: ArrayConstant {
                cols: 2,
                rows: 1,
                values: vec![
                    ConstantValue::Number(1.0),
                    ConstantValue::String(XlString::new("a")),
                ],
            },
        };
        let tokens = vec![array];
        let bytes = encode(&tokens);
        assert_eq!(tokens_size(&tokens), 8);
        assert_eq!(bytes.len(), 8 + trailing_size(&tokens));

        let mut parsed = parse_tokens(&bytes[..8]).unwrap();
        let mut r = LittleEndianReader::new(0, &bytes[8..]);
        read_trailing_data(&mut parsed, &mut r).unwrap();
        assert!(r.is_empty());
        assert_eq!(parsed, tokens);
    }

    #[test]
    fn test_refn_offsets_resolve() {
        // Row offset -1, column offset +2, both relative.
        let cell = CellReference::from_raw(0xFFFF, 0xC002);
        assert_eq!(cell.row_offset(), -1);
        assert_eq!(cell.col_offset(), 2);
        let resolved = cell.resolve_relative_to(5, 1);
        assert_eq!(resolved.row(), 4);
        assert_eq!(resolved.col(), 3);
        assert!(resolved.is_row_relative());
    }

    #[test]
    fn test_unknown_token_is_formula_error() {
        assert!(matches!(
            parse_tokens(&[0x18, 0x00]),
            Err(XlsError::InvalidFormula(_))
        ));
    }
}
