//! Shared string table.
//!
//! The SST payload regularly exceeds one record and is continued in
//! CONTINUE records. Header fields never straddle a boundary, but character
//! data does: each continuation of character data restarts with an option
//! byte that selects the compression of the remaining characters.
//! Formatting runs and the phonetic block continue without option bytes.

use super::strings::{EXT_STRING, HIGH_BYTE, RICH_TEXT, XlString};
use super::{BiffRecord, MAX_RECORD_DATA_SIZE, RECORD_HEADER_SIZE, sid, write_record_header};
use crate::common::binary::{LittleEndianReader, decode_compressed, decode_utf16le};
use crate::common::error::{XlsError, XlsResult};
use bytes::Bytes;
use std::io::Write;

/// A formatting run: the font applies from `first_char` on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatRun {
    pub first_char: u16,
    pub font_index: u16,
}

/// An SST entry: text plus optional rich-text runs and phonetic data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct UnicodeString {
    pub string: XlString,
    pub runs: Vec<FormatRun>,
    /// Phonetic (Far East) block, kept verbatim.
    pub ext_data: Option<Bytes>,
}

impl UnicodeString {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            string: XlString::new(text),
            runs: Vec::new(),
            ext_data: None,
        }
    }

    pub fn text(&self) -> &str {
        self.string.text()
    }

    fn option_byte(&self) -> u8 {
        let mut options = self.string.option_byte();
        if !self.runs.is_empty() {
            options |= RICH_TEXT;
        }
        if self.ext_data.is_some() {
            options |= EXT_STRING;
        }
        options
    }

    fn header_size(&self) -> usize {
        3 + if self.runs.is_empty() { 0 } else { 2 } + if self.ext_data.is_some() { 4 } else { 0 }
    }
}

impl From<&str> for UnicodeString {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Reader that walks the SST payload and its continuations as one stream.
struct ChunkReader<'a> {
    chunks: &'a [&'a [u8]],
    chunk: usize,
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    fn new(chunks: &'a [&'a [u8]]) -> Self {
        Self {
            chunks,
            chunk: 0,
            pos: 0,
        }
    }

    fn current(&self) -> &'a [u8] {
        self.chunks.get(self.chunk).copied().unwrap_or(&[])
    }

    fn remaining_in_chunk(&self) -> usize {
        self.current().len().saturating_sub(self.pos)
    }

    fn next_chunk(&mut self) -> XlsResult<()> {
        if self.chunk + 1 >= self.chunks.len() {
            return Err(XlsError::invalid_record(
                sid::SST,
                "string data runs past the last CONTINUE record",
            ));
        }
        self.chunk += 1;
        self.pos = 0;
        Ok(())
    }

    fn is_at_end(&self) -> bool {
        self.chunk + 1 >= self.chunks.len() && self.remaining_in_chunk() == 0
    }

    /// Read a field that must lie entirely in one record.
    fn read_field(&mut self, len: usize) -> XlsResult<&'a [u8]> {
        if self.remaining_in_chunk() == 0 {
            self.next_chunk()?;
        }
        let data = self.current();
        let bytes = data.get(self.pos..self.pos + len).ok_or_else(|| {
            XlsError::invalid_record(sid::SST, "string header split across records")
        })?;
        self.pos += len;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> XlsResult<u8> {
        Ok(self.read_field(1)?[0])
    }

    fn read_u16(&mut self) -> XlsResult<u16> {
        let b = self.read_field(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> XlsResult<u32> {
        let b = self.read_field(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read raw bytes that may continue into the next record.
    fn read_spanning(&mut self, mut len: usize) -> XlsResult<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        while len > 0 {
            if self.remaining_in_chunk() == 0 {
                self.next_chunk()?;
            }
            let take = len.min(self.remaining_in_chunk());
            out.extend_from_slice(&self.current()[self.pos..self.pos + take]);
            self.pos += take;
            len -= take;
        }
        Ok(out)
    }

    /// Read `cch` characters; every continuation restarts with an option
    /// byte. Returns the text and whether any segment was uncompressed.
    fn read_chars(&mut self, cch: usize, mut high_byte: bool) -> XlsResult<(String, bool)> {
        let mut text = String::with_capacity(cch);
        let mut any_high = high_byte;
        let mut left = cch;
        while left > 0 {
            if self.remaining_in_chunk() == 0 {
                self.next_chunk()?;
                high_byte = self.read_u8()? & HIGH_BYTE != 0;
                any_high |= high_byte;
            }
            let width = if high_byte { 2 } else { 1 };
            let available = self.remaining_in_chunk() / width;
            if available == 0 {
                return Err(XlsError::invalid_record(sid::SST, "character split across records"));
            }
            let take = left.min(available);
            let bytes = &self.current()[self.pos..self.pos + take * width];
            if high_byte {
                text.push_str(&decode_utf16le(bytes));
            } else {
                text.push_str(&decode_compressed(bytes));
            }
            self.pos += take * width;
            left -= take;
        }
        Ok((text, any_high))
    }

    fn read_string(&mut self) -> XlsResult<UnicodeString> {
        let cch = self.read_u16()? as usize;
        let options = self.read_u8()?;
        let run_count = if options & RICH_TEXT != 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let ext_len = if options & EXT_STRING != 0 {
            Some(self.read_u32()? as usize)
        } else {
            None
        };
        let (text, high_byte) = self.read_chars(cch, options & HIGH_BYTE != 0)?;
        let mut runs = Vec::with_capacity(run_count);
        for _ in 0..run_count {
            let b = self.read_spanning(4)?;
            runs.push(FormatRun {
                first_char: u16::from_le_bytes([b[0], b[1]]),
                font_index: u16::from_le_bytes([b[2], b[3]]),
            });
        }
        let ext_data = match ext_len {
            Some(len) => Some(Bytes::from(self.read_spanning(len)?)),
            None => None,
        };
        Ok(UnicodeString {
            string: XlString::with_high_byte(text, high_byte)?,
            runs,
            ext_data,
        })
    }
}

/// Writer that splits the SST payload into records of at most
/// [`MAX_RECORD_DATA_SIZE`] bytes.
struct ChunkWriter {
    chunks: Vec<Vec<u8>>,
}

impl ChunkWriter {
    fn new() -> Self {
        Self {
            chunks: vec![Vec::new()],
        }
    }

    fn current(&mut self) -> &mut Vec<u8> {
        if self.chunks.is_empty() {
            self.chunks.push(Vec::new());
        }
        let last = self.chunks.len() - 1;
        &mut self.chunks[last]
    }

    fn space(&self) -> usize {
        MAX_RECORD_DATA_SIZE - self.chunks.last().map_or(0, Vec::len)
    }

    fn start_continue(&mut self) {
        self.chunks.push(Vec::new());
    }

    /// Start a new record unless `len` bytes fit in the current one.
    fn reserve(&mut self, len: usize) {
        if self.space() < len {
            self.start_continue();
        }
    }

    /// Position of the next byte: bytes written so far including record
    /// headers, and the offset within the current record including its header.
    fn position(&self) -> (usize, usize) {
        let full: usize = self
            .chunks
            .iter()
            .map(|c| RECORD_HEADER_SIZE + c.len())
            .sum();
        let in_record = RECORD_HEADER_SIZE + self.chunks.last().map_or(0, Vec::len);
        (full, in_record)
    }

    fn put(&mut self, bytes: &[u8]) {
        self.current().extend_from_slice(bytes);
    }

    fn put_spanning(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            if self.space() == 0 {
                self.start_continue();
            }
            let take = bytes.len().min(self.space());
            self.put(&bytes[..take]);
            bytes = &bytes[take..];
        }
    }

    fn put_string(&mut self, s: &UnicodeString) -> XlsResult<()> {
        let cch = u16::try_from(s.string.char_count())
            .map_err(|_| XlsError::invalid_argument("SST string longer than 65535 characters"))?;
        let high_byte = s.string.is_high_byte();
        let width = if high_byte { 2 } else { 1 };
        let first_char = if cch > 0 { width } else { 0 };
        self.reserve(s.header_size() + first_char);

        self.put(&cch.to_le_bytes());
        self.put(&[s.option_byte()]);
        if !s.runs.is_empty() {
            self.put(&(s.runs.len() as u16).to_le_bytes());
        }
        if let Some(ext) = &s.ext_data {
            self.put(&(ext.len() as u32).to_le_bytes());
        }

        let mut chars = Vec::with_capacity(s.string.data_size());
        s.string.write_chars(&mut chars)?;
        let mut rest = chars.as_slice();
        while !rest.is_empty() {
            if self.space() < width {
                self.start_continue();
                self.put(&[if high_byte { HIGH_BYTE } else { 0 }]);
            }
            let take = (self.space() / width * width).min(rest.len());
            self.put(&rest[..take]);
            rest = &rest[take..];
        }

        for run in &s.runs {
            self.reserve(4);
            self.put(&run.first_char.to_le_bytes());
            self.put(&run.font_index.to_le_bytes());
        }
        if let Some(ext) = &s.ext_data {
            self.put_spanning(ext);
        }
        Ok(())
    }
}

/// Offsets of one string, relative to the start of the SST record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringPosition {
    /// Bytes from the start of the SST record (headers included).
    pub stream_offset: u32,
    /// Offset within the record holding the string, header included.
    pub record_offset: u16,
}

/// Record type: 0x00FC
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SstRecord {
    /// Number of LABELSST references in the workbook.
    pub total_refs: u32,
    pub strings: Vec<UnicodeString>,
}

impl SstRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the SST payload and the payloads of its CONTINUE records.
    pub fn parse_chunks(chunks: &[&[u8]]) -> XlsResult<Self> {
        let first = chunks.first().copied().unwrap_or(&[]);
        let mut header = LittleEndianReader::new(sid::SST, first);
        let total_refs = header.read_u32()?;
        let unique = header.read_u32()? as usize;

        let mut reader = ChunkReader::new(chunks);
        reader.pos = 8;
        let mut strings = Vec::with_capacity(unique.min(65536));
        for _ in 0..unique {
            if reader.is_at_end() {
                // Some writers overstate the unique count.
                break;
            }
            strings.push(reader.read_string()?);
        }
        Ok(Self {
            total_refs,
            strings,
        })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&UnicodeString> {
        self.strings.get(index as usize)
    }

    /// Append a string and return its index.
    pub fn push(&mut self, string: UnicodeString) -> u32 {
        self.strings.push(string);
        (self.strings.len() - 1) as u32
    }

    fn build(&self) -> XlsResult<(ChunkWriter, Vec<StringPosition>)> {
        let mut w = ChunkWriter::new();
        w.put(&self.total_refs.to_le_bytes());
        w.put(&(self.strings.len() as u32).to_le_bytes());
        let mut positions = Vec::with_capacity(self.strings.len());
        for s in &self.strings {
            // Position is taken after any record break the header forces.
            let needed = s.header_size() + if s.string.is_empty() { 0 } else { 2 };
            w.reserve(needed);
            let (full, in_record) = w.position();
            positions.push(StringPosition {
                stream_offset: full as u32,
                record_offset: in_record as u16,
            });
            w.put_string(s)?;
        }
        Ok((w, positions))
    }

    /// Encoded size including CONTINUE records.
    pub fn serialized_size(&self) -> usize {
        match self.build() {
            Ok((w, _)) => w.chunks.iter().map(|c| RECORD_HEADER_SIZE + c.len()).sum(),
            Err(_) => 0,
        }
    }

    /// Write SST and CONTINUE records; returns bytes written.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> XlsResult<usize> {
        self.serialize_with_positions(writer).map(|(n, _)| n)
    }

    /// Write SST and CONTINUE records and report where each string starts.
    pub fn serialize_with_positions<W: Write>(
        &self,
        writer: &mut W,
    ) -> XlsResult<(usize, Vec<StringPosition>)> {
        let (w, positions) = self.build()?;
        let mut written = 0;
        for (i, chunk) in w.chunks.iter().enumerate() {
            let record_sid = if i == 0 { sid::SST } else { sid::CONTINUE };
            write_record_header(writer, record_sid, chunk.len())?;
            writer.write_all(chunk)?;
            written += RECORD_HEADER_SIZE + chunk.len();
        }
        Ok((written, positions))
    }
}

/// One EXTSST bucket: where the bucket's first string lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtSstInfo {
    pub stream_pos: u32,
    pub record_offset: u16,
    pub reserved: u16,
}

/// Index into the SST for fast lookup; recomputed whenever the SST is
/// written.
///
/// Record type: 0x00FF
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtSstRecord {
    pub bucket_size: u16,
    pub buckets: Vec<ExtSstInfo>,
}

impl ExtSstRecord {
    /// Strings per bucket for a table of `string_count` strings.
    pub fn bucket_size_for(string_count: usize) -> u16 {
        string_count.div_ceil(128).max(8).min(u16::MAX as usize) as u16
    }

    /// Build the index from the string positions of a written SST that
    /// starts at `sst_offset` in the stream.
    pub fn from_positions(sst_offset: usize, positions: &[StringPosition]) -> Self {
        let bucket_size = Self::bucket_size_for(positions.len());
        let buckets = positions
            .iter()
            .step_by(bucket_size as usize)
            .map(|p| ExtSstInfo {
                stream_pos: (sst_offset + p.stream_offset as usize) as u32,
                record_offset: p.record_offset,
                reserved: 0,
            })
            .collect();
        Self {
            bucket_size,
            buckets,
        }
    }

    /// Encoded size for a table of `string_count` strings.
    pub fn record_size_for(string_count: usize) -> usize {
        let bucket_size = Self::bucket_size_for(string_count) as usize;
        RECORD_HEADER_SIZE + 2 + 8 * string_count.div_ceil(bucket_size)
    }
}

impl BiffRecord for ExtSstRecord {
    const SID: u16 = sid::EXTSST;

    fn parse(data: &[u8]) -> XlsResult<Self> {
        let mut r = LittleEndianReader::new(Self::SID, data);
        let bucket_size = r.read_u16()?;
        let mut buckets = Vec::with_capacity(r.remaining() / 8);
        while r.remaining() >= 8 {
            buckets.push(ExtSstInfo {
                stream_pos: r.read_u32()?,
                record_offset: r.read_u16()?,
                reserved: r.read_u16()?,
            });
        }
        r.expect_end()?;
        Ok(Self {
            bucket_size,
            buckets,
        })
    }

    fn data_size(&self) -> usize {
        2 + 8 * self.buckets.len()
    }

    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()> {
        writer.write_all(&self.bucket_size.to_le_bytes())?;
        for b in &self.buckets {
            writer.write_all(&b.stream_pos.to_le_bytes())?;
            writer.write_all(&b.record_offset.to_le_bytes())?;
            writer.write_all(&b.reserved.to_le_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Record, read_records};

    #[test]
    fn test_small_table_round_trip() {
        let mut sst = SstRecord::new();
        sst.total_refs = 3;
        sst.push("alpha".into());
        sst.push(UnicodeString::new("日本"));
        let mut rich = UnicodeString::new("bold");
        rich.runs.push(FormatRun {
            first_char: 0,
            font_index: 5,
        });
        rich.ext_data = Some(Bytes::from_static(&[1, 2, 3]));
        sst.push(rich);

        let mut out = Vec::new();
        let written = sst.serialize(&mut out).unwrap();
        assert_eq!(written, out.len());
        assert_eq!(written, sst.serialized_size());
        let records = read_records(&out).unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            Record::Sst(parsed) => assert_eq!(parsed, &sst),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_long_strings_continue() {
        let mut sst = SstRecord::new();
        // Forces character data across several CONTINUE records, both
        // compressed and uncompressed.
        sst.push(UnicodeString::new("x".repeat(20_000)));
        sst.push(UnicodeString::new("é".repeat(100)));
        sst.push(UnicodeString::new("Ω".repeat(9_000)));
        let mut out = Vec::new();
        sst.serialize(&mut out).unwrap();
        let records = read_records(&out).unwrap();
        assert_eq!(records.len(), 1);
        let Record::Sst(parsed) = &records[0] else {
            panic!("expected SST");
        };
        assert_eq!(parsed.strings, sst.strings);
    }

    #[test]
    fn test_many_strings_positions() {
        let mut sst = SstRecord::new();
        for i in 0..3000 {
            sst.push(UnicodeString::new(format!("string number {}", i)));
        }
        let mut out = Vec::new();
        let (_, positions) = sst.serialize_with_positions(&mut out).unwrap();
        for (i, p) in positions.iter().enumerate().step_by(97) {
            let at = p.stream_offset as usize;
            let cch = u16::from_le_bytes([out[at], out[at + 1]]) as usize;
            assert_eq!(cch, sst.strings[i].string.char_count());
        }
        let ext = ExtSstRecord::from_positions(100, &positions);
        assert_eq!(ext.bucket_size, 24);
        assert_eq!(ext.buckets.len(), 125);
        assert_eq!(ext.buckets[0].stream_pos, 100 + 12);
        assert_eq!(
            ExtSstRecord::record_size_for(3000),
            RECORD_HEADER_SIZE + ext.data_size()
        );
    }

    #[test]
    fn test_bucket_size() {
        assert_eq!(ExtSstRecord::bucket_size_for(0), 8);
        assert_eq!(ExtSstRecord::bucket_size_for(1024), 8);
        assert_eq!(ExtSstRecord::bucket_size_for(1025), 9);
    }

    #[test]
    fn test_runaway_string_is_format_error() {
        let payload = [1, 0, 0, 0, 1, 0, 0, 0, 10, 0, 0, b'a'];
        assert!(SstRecord::parse_chunks(&[&payload]).is_err());
    }
}
