//! Cell value records.
//!
//! Every cell record starts with the same 6-byte header: row, column and
//! extended format index. MULRK and MULBLANK pack several adjacent cells of
//! one row into a single record; the row aggregate expands them into RK and
//! BLANK records so that each cell can be addressed on its own.

use super::strings::XlString;
use super::{BiffRecord, sid};
use crate::common::binary::LittleEndianReader;
use crate::common::error::{XlsError, XlsResult};
use std::io::Write;

/// Highest column index in a BIFF8 sheet.
pub const MAX_COLUMN: u16 = 0x00FF;

/// Highest row index in a BIFF8 sheet.
pub const MAX_ROW: u32 = 0xFFFF;

/// Row, column and style shared by all cell records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellHeader {
    pub row: u16,
    pub col: u16,
    pub xf_index: u16,
}

impl CellHeader {
    /// Validating constructor for caller-supplied coordinates.
    pub fn new(row: u32, col: u16, xf_index: u16) -> XlsResult<Self> {
        check_coordinates(row, col)?;
        Ok(Self {
            row: row as u16,
            col,
            xf_index,
        })
    }

    pub fn read(r: &mut LittleEndianReader<'_>) -> XlsResult<Self> {
        Ok(Self {
            row: r.read_u16()?,
            col: r.read_u16()?,
            xf_index: r.read_u16()?,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.row.to_le_bytes())?;
        writer.write_all(&self.col.to_le_bytes())?;
        writer.write_all(&self.xf_index.to_le_bytes())?;
        Ok(())
    }

    pub fn row_number(&self) -> u32 {
        self.row as u32
    }
}

/// Reject coordinates outside the 65536 x 256 grid.
pub fn check_coordinates(row: u32, col: u16) -> XlsResult<()> {
    if row > MAX_ROW {
        return Err(XlsError::invalid_argument(format!(
            "row {} is outside 0..={}",
            row, MAX_ROW
        )));
    }
    if col > MAX_COLUMN {
        return Err(XlsError::invalid_argument(format!(
            "column {} is outside 0..={}",
            col, MAX_COLUMN
        )));
    }
    Ok(())
}

macro_rules! header_only_parse {
    ($r:ident, $body:expr) => {{
        let out = $body;
        $r.expect_end()?;
        Ok(out)
    }};
}

/// Floating point cell.
///
/// Record type: 0x0203
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberRecord {
    pub cell: CellHeader,
    pub value: f64,
}

impl BiffRecord for NumberRecord {
    const SID: u16 = sid::NUMBER;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        header_only_parse!(
            r,
            Self {
                cell: CellHeader::read(&mut r)?,
                value: r.read_f64()?,
            }
        )
    }

    fn data_size(&self) -> usize {
        14
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.cell.write(writer)?;
        writer.write_all(&self.value.to_le_bytes())?;
        Ok(())
    }
}

/// Decode an RK number.
///
/// Bit 0 divides the value by 100, bit 1 selects a 30-bit signed integer
/// instead of the high 30 bits of an IEEE double.
///
/// ```
/// use litchi_xls::records::rk_to_f64;
///
/// assert_eq!(rk_to_f64((42 << 2) | 0x02), 42.0);
/// assert_eq!(rk_to_f64((1234 << 2) | 0x03), 12.34);
/// ```
pub fn rk_to_f64(rk: u32) -> f64 {
    let value = if rk & 0x02 != 0 {
        ((rk as i32) >> 2) as f64
    } else {
        f64::from_bits(u64::from(rk & 0xFFFF_FFFC) << 32)
    };
    if rk & 0x01 != 0 { value / 100.0 } else { value }
}

/// Compressed number cell.
///
/// Record type: 0x027E
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RkRecord {
    pub cell: CellHeader,
    /// Raw RK word, kept so the record re-encodes to the same bytes.
    pub rk: u32,
}

impl RkRecord {
    pub fn value(&self) -> f64 {
        rk_to_f64(self.rk)
    }
}

impl BiffRecord for RkRecord {
    const SID: u16 = sid::RK;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        header_only_parse!(
            r,
            Self {
                cell: CellHeader::read(&mut r)?,
                rk: r.read_u32()?,
            }
        )
    }

    fn data_size(&self) -> usize {
        10
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.cell.write(writer)?;
        writer.write_all(&self.rk.to_le_bytes())?;
        Ok(())
    }
}

/// Run of RK cells in one row.
///
/// Record type: 0x00BD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulRkRecord {
    pub row: u16,
    pub first_col: u16,
    /// `(xf_index, rk)` per column starting at `first_col`.
    pub cells: Vec<(u16, u32)>,
}

impl MulRkRecord {
    pub fn last_col(&self) -> u16 {
        self.first_col + self.cells.len() as u16 - 1
    }

    /// Split into one RK record per column.
    pub fn expand(&self) -> Vec<RkRecord> {
        self.cells
            .iter()
            .enumerate()
            .map(|(i, &(xf_index, rk))| RkRecord {
                cell: CellHeader {
                    row: self.row,
                    col: self.first_col + i as u16,
                    xf_index,
                },
                rk,
            })
            .collect()
    }
}

impl BiffRecord for MulRkRecord {
    const SID: u16 = sid::MULRK;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 6 || (data.len() - 6) % 6 != 0 {
            return Err(XlsError::invalid_record(
                Self::SID,
                format!("payload length {} is not 6 + 6n", data.len()),
            ));
        }
        let mut r = LittleEndianReader::new(Self::SID, data);
        let row = r.read_u16()?;
        let first_col = r.read_u16()?;
        let count = (data.len() - 6) / 6;
        let mut cells = Vec::with_capacity(count);
        for _ in 0..count {
            cells.push((r.read_u16()?, r.read_u32()?));
        }
        let last_col = r.read_u16()?;
        if count == 0 || last_col as usize != first_col as usize + count - 1 {
            return Err(XlsError::invalid_record(
                Self::SID,
                format!("last column {} does not match {} cells", last_col, count),
            ));
        }
        Ok(Self {
            row,
            first_col,
            cells,
        })
    }

    fn data_size(&self) -> usize {
        6 + 6 * self.cells.len()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.row.to_le_bytes())?;
        writer.write_all(&self.first_col.to_le_bytes())?;
        for (xf, rk) in &self.cells {
            writer.write_all(&xf.to_le_bytes())?;
            writer.write_all(&rk.to_le_bytes())?;
        }
        writer.write_all(&self.last_col().to_le_bytes())?;
        Ok(())
    }
}

/// Inline string cell (superseded by LABELSST, still found in old files).
///
/// Record type: 0x0204
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    pub cell: CellHeader,
    pub value: XlString,
}

impl BiffRecord for LabelRecord {
    const SID: u16 = sid::LABEL;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        header_only_parse!(
            r,
            Self {
                cell: CellHeader::read(&mut r)?,
                value: XlString::read(&mut r)?,
            }
        )
    }

    fn data_size(&self) -> usize {
        6 + self.value.encoded_size()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.cell.write(writer)?;
        self.value.write(writer)
    }
}

/// String cell referring to the shared string table.
///
/// Record type: 0x00FD
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSstRecord {
    pub cell: CellHeader,
    pub sst_index: u32,
}

impl BiffRecord for LabelSstRecord {
    const SID: u16 = sid::LABELSST;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        header_only_parse!(
            r,
            Self {
                cell: CellHeader::read(&mut r)?,
                sst_index: r.read_u32()?,
            }
        )
    }

    fn data_size(&self) -> usize {
        10
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.cell.write(writer)?;
        writer.write_all(&self.sst_index.to_le_bytes())?;
        Ok(())
    }
}

/// Value of a BOOLERR cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolErrValue {
    Bool(bool),
    Error(u8),
}

/// Boolean or error cell.
///
/// Record type: 0x0205
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolErrRecord {
    pub cell: CellHeader,
    pub value: BoolErrValue,
}

impl BiffRecord for BoolErrRecord {
    const SID: u16 = sid::BOOLERR;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let cell = CellHeader::read(&mut r)?;
        let raw = r.read_u8()?;
        let is_error = r.read_u8()?;
        r.expect_end()?;
        let value = match is_error {
            0 => match raw {
                0 => BoolErrValue::Bool(false),
                1 => BoolErrValue::Bool(true),
                other => {
                    return Err(XlsError::invalid_record(
                        Self::SID,
                        format!("boolean value {} is not 0 or 1", other),
                    ));
                },
            },
            1 => BoolErrValue::Error(raw),
            other => {
                return Err(XlsError::invalid_record(
                    Self::SID,
                    format!("error flag {} is not 0 or 1", other),
                ));
            },
        };
        Ok(Self { cell, value })
    }

    fn data_size(&self) -> usize {
        8
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.cell.write(writer)?;
        let bytes = match self.value {
            BoolErrValue::Bool(b) => [b as u8, 0],
            BoolErrValue::Error(code) => [code, 1],
        };
        writer.write_all(&bytes)?;
        Ok(())
    }
}

/// Formatted empty cell.
///
/// Record type: 0x0201
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlankRecord {
    pub cell: CellHeader,
}

impl BiffRecord for BlankRecord {
    const SID: u16 = sid::BLANK;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        header_only_parse!(
            r,
            Self {
                cell: CellHeader::read(&mut r)?,
            }
        )
    }

    fn data_size(&self) -> usize {
        6
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        self.cell.write(writer)
    }
}

/// Run of blank cells in one row.
///
/// Record type: 0x00BE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulBlankRecord {
    pub row: u16,
    pub first_col: u16,
    pub xf_indexes: Vec<u16>,
}

impl MulBlankRecord {
    pub fn last_col(&self) -> u16 {
        self.first_col + self.xf_indexes.len() as u16 - 1
    }

    /// Split into one BLANK record per column.
    pub fn expand(&self) -> Vec<BlankRecord> {
        self.xf_indexes
            .iter()
            .enumerate()
            .map(|(i, &xf_index)| BlankRecord {
                cell: CellHeader {
                    row: self.row,
                    col: self.first_col + i as u16,
                    xf_index,
                },
            })
            .collect()
    }
}

impl BiffRecord for MulBlankRecord {
    const SID: u16 = sid::MULBLANK;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 6 || data.len() % 2 != 0 {
            return Err(XlsError::invalid_record(
                Self::SID,
                format!("payload length {} is not 6 + 2n", data.len()),
            ));
        }
        let mut r = LittleEndianReader::new(Self::SID, data);
        let row = r.read_u16()?;
        let first_col = r.read_u16()?;
        let count = (data.len() - 6) / 2;
        let mut xf_indexes = Vec::with_capacity(count);
        for _ in 0..count {
            xf_indexes.push(r.read_u16()?);
        }
        let last_col = r.read_u16()?;
        if count == 0 || last_col as usize != first_col as usize + count - 1 {
            return Err(XlsError::invalid_record(
                Self::SID,
                format!("last column {} does not match {} cells", last_col, count),
            ));
        }
        Ok(Self {
            row,
            first_col,
            xf_indexes,
        })
    }

    fn data_size(&self) -> usize {
        6 + 2 * self.xf_indexes.len()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.row.to_le_bytes())?;
        writer.write_all(&self.first_col.to_le_bytes())?;
        for xf in &self.xf_indexes {
            writer.write_all(&xf.to_le_bytes())?;
        }
        writer.write_all(&self.last_col().to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode<T: BiffRecord>(record: &T) -> Vec<u8> {
        let mut out = Vec::new();
        record.write_data(&mut out).unwrap();
        out
    }

    #[test]
    fn test_header_validation() {
        assert!(CellHeader::new(65535, 255, 0).is_ok());
        assert!(matches!(
            CellHeader::new(65536, 0, 0),
            Err(XlsError::InvalidArgument(_))
        ));
        assert!(matches!(
            CellHeader::new(0, 256, 0),
            Err(XlsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_number_round_trip() {
        let rec = NumberRecord {
            cell: CellHeader::new(3, 4, 15).unwrap(),
            value: -2.5,
        };
        let bytes = encode(&rec);
        assert_eq!(bytes.len(), 14);
        assert_eq!(NumberRecord::parse(&bytes).unwrap(), rec);
    }

    #[test]
    fn test_rk_float_encoding() {
        // 1.0 is 0x3FF0_0000_0000_0000: the high word survives as an RK.
        assert_eq!(rk_to_f64(0x3FF0_0000), 1.0);
        assert_eq!(rk_to_f64(0x3FF0_0001), 0.01);
        assert_eq!(rk_to_f64(((-7i32 << 2) as u32) | 0x02), -7.0);
    }

    #[test]
    fn test_mulrk_expands() {
        let bytes = [
            1, 0, 2, 0, // row 1, first col 2
            15, 0, 0x0A, 0, 0, 0, // xf 15, int 2
            16, 0, 0x0E, 0, 0, 0, // xf 16, int 3
            3, 0, // last col 3
        ];
        let rec = MulRkRecord::parse(&bytes).unwrap();
        let cells = rec.expand();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].cell.col, 2);
        assert_eq!(cells[0].value(), 2.0);
        assert_eq!(cells[1].cell.col, 3);
        assert_eq!(cells[1].cell.xf_index, 16);
        assert_eq!(cells[1].value(), 3.0);
        assert_eq!(encode(&rec), bytes);
    }

    #[test]
    fn test_mulblank_bad_last_col() {
        let bytes = [0, 0, 1, 0, 15, 0, 15, 0, 9, 0];
        assert!(MulBlankRecord::parse(&bytes).is_err());
    }

    #[test]
    fn test_boolerr_values() {
        let t = BoolErrRecord::parse(&[0, 0, 0, 0, 15, 0, 1, 0]).unwrap();
        assert_eq!(t.value, BoolErrValue::Bool(true));
        let e = BoolErrRecord::parse(&[0, 0, 0, 0, 15, 0, 0x07, 1]).unwrap();
        assert_eq!(e.value, BoolErrValue::Error(0x07));
        assert_eq!(encode(&e), [0, 0, 0, 0, 15, 0, 0x07, 1]);
        assert!(BoolErrRecord::parse(&[0, 0, 0, 0, 15, 0, 2, 0]).is_err());
    }

    #[test]
    fn test_label_preserves_width() {
        let rec = LabelRecord {
            cell: CellHeader::default(),
            value: XlString::with_high_byte("abc", true).unwrap(),
        };
        let bytes = encode(&rec);
        assert_eq!(bytes.len(), 6 + 3 + 6);
        let back = LabelRecord::parse(&bytes).unwrap();
        assert!(back.value.is_high_byte());
        assert_eq!(back, rec);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_rk_integer_form(n in -(1i32 << 29)..(1i32 << 29)) {
            let rk = ((n << 2) as u32) | 0x02;
            prop_assert_eq!(rk_to_f64(rk), n as f64);
        }

        #[test]
        fn prop_rk_record_keeps_raw_word(rk in any::<u32>(), row in 0u16..=u16::MAX) {
            let rec = RkRecord { cell: CellHeader { row, col: 1, xf_index: 15 }, rk };
            let bytes = encode(&rec);
            prop_assert_eq!(RkRecord::parse(&bytes).unwrap(), rec);
        }
    }
}
