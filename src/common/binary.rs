//! Little-endian binary readers used by the record codec.
//!
//! BIFF8 stores every numeric field little-endian with no padding. The free
//! functions read at an absolute offset; [`LittleEndianReader`] walks a record
//! payload front to back and reports truncation against the owning record.

use crate::common::error::{XlsError, XlsResult};
use zerocopy::{F64, FromBytes, I16, I32, LE, U16, U32};

#[inline]
fn check(data: &[u8], offset: usize, size: usize) -> XlsResult<()> {
    if offset.checked_add(size).is_none_or(|end| end > data.len()) {
        return Err(XlsError::UnexpectedEndOfStream);
    }
    Ok(())
}

/// Read one byte at the given offset.
#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> XlsResult<u8> {
    check(data, offset, 1)?;
    Ok(data[offset])
}

/// Read a little-endian u16 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use litchi_xls::common::binary::read_u16_le;
/// let data = [0x34, 0x12, 0x78, 0x56];
/// assert_eq!(read_u16_le(&data, 0).unwrap(), 0x1234);
/// assert_eq!(read_u16_le(&data, 2).unwrap(), 0x5678);
/// assert!(read_u16_le(&data, 3).is_err());
/// ```
#[inline]
pub fn read_u16_le(data: &[u8], offset: usize) -> XlsResult<u16> {
    check(data, offset, 2)?;
    U16::<LE>::read_from_bytes(&data[offset..offset + 2])
        .map(|v| v.get())
        .map_err(|_| XlsError::UnexpectedEndOfStream)
}

/// Read a little-endian i16 from a byte slice at the given offset.
#[inline]
pub fn read_i16_le(data: &[u8], offset: usize) -> XlsResult<i16> {
    check(data, offset, 2)?;
    I16::<LE>::read_from_bytes(&data[offset..offset + 2])
        .map(|v| v.get())
        .map_err(|_| XlsError::UnexpectedEndOfStream)
}

/// Read a little-endian u32 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use litchi_xls::common::binary::read_u32_le;
/// let data = [0x78, 0x56, 0x34, 0x12];
/// assert_eq!(read_u32_le(&data, 0).unwrap(), 0x12345678);
/// ```
#[inline]
pub fn read_u32_le(data: &[u8], offset: usize) -> XlsResult<u32> {
    check(data, offset, 4)?;
    U32::<LE>::read_from_bytes(&data[offset..offset + 4])
        .map(|v| v.get())
        .map_err(|_| XlsError::UnexpectedEndOfStream)
}

/// Read a little-endian i32 from a byte slice at the given offset.
#[inline]
pub fn read_i32_le(data: &[u8], offset: usize) -> XlsResult<i32> {
    check(data, offset, 4)?;
    I32::<LE>::read_from_bytes(&data[offset..offset + 4])
        .map(|v| v.get())
        .map_err(|_| XlsError::UnexpectedEndOfStream)
}

/// Read a little-endian f64 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use litchi_xls::common::binary::read_f64_le;
/// let data = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0x3F];
/// assert!((read_f64_le(&data, 0).unwrap() - 1.0).abs() < f64::EPSILON);
/// ```
#[inline]
pub fn read_f64_le(data: &[u8], offset: usize) -> XlsResult<f64> {
    check(data, offset, 8)?;
    F64::<LE>::read_from_bytes(&data[offset..offset + 8])
        .map(|v| v.get())
        .map_err(|_| XlsError::UnexpectedEndOfStream)
}

/// Decode `count` compressed (one byte per char, Latin-1) characters.
#[inline]
pub fn decode_compressed(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Decode UTF-16LE code units, replacing unpaired surrogates.
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Sequential reader over one record payload.
///
/// Every read is bounds-checked; running off the end yields
/// [`XlsError::InvalidRecord`] naming the record being decoded.
#[derive(Debug, Clone)]
pub struct LittleEndianReader<'a> {
    data: &'a [u8],
    pos: usize,
    sid: u16,
}

impl<'a> LittleEndianReader<'a> {
    pub fn new(sid: u16, data: &'a [u8]) -> Self {
        Self { data, pos: 0, sid }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn truncated(&self, wanted: usize) -> XlsError {
        XlsError::invalid_record(
            self.sid,
            format!(
                "truncated payload: needed {} bytes at offset {}, {} available",
                wanted,
                self.pos,
                self.remaining()
            ),
        )
    }

    pub fn read_u8(&mut self) -> XlsResult<u8> {
        let v = read_u8(self.data, self.pos).map_err(|_| self.truncated(1))?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> XlsResult<u16> {
        let v = read_u16_le(self.data, self.pos).map_err(|_| self.truncated(2))?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> XlsResult<i16> {
        let v = read_i16_le(self.data, self.pos).map_err(|_| self.truncated(2))?;
        self.pos += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> XlsResult<u32> {
        let v = read_u32_le(self.data, self.pos).map_err(|_| self.truncated(4))?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> XlsResult<i32> {
        let v = read_i32_le(self.data, self.pos).map_err(|_| self.truncated(4))?;
        self.pos += 4;
        Ok(v)
    }

    pub fn read_f64(&mut self) -> XlsResult<f64> {
        let v = read_f64_le(self.data, self.pos).map_err(|_| self.truncated(8))?;
        self.pos += 8;
        Ok(v)
    }

    /// Borrow the next `len` bytes.
    pub fn read_slice(&mut self, len: usize) -> XlsResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.truncated(len));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Borrow everything not read yet.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }

    /// Read `cch` characters stored compressed or as UTF-16LE.
    pub fn read_chars(&mut self, cch: usize, high_byte: bool) -> XlsResult<String> {
        if high_byte {
            let bytes = self.read_slice(cch * 2)?;
            Ok(decode_utf16le(bytes))
        } else {
            let bytes = self.read_slice(cch)?;
            Ok(decode_compressed(bytes))
        }
    }

    /// Fail unless the whole payload has been consumed.
    pub fn expect_end(&self) -> XlsResult<()> {
        if self.remaining() != 0 {
            return Err(XlsError::InvalidLength {
                sid: self.sid,
                expected: self.pos,
                found: self.data.len(),
            });
        }
        Ok(())
    }
}
