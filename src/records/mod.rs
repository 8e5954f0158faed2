//! BIFF8 record codec.
//!
//! A workbook stream is a flat sequence of records, each framed as
//! `[sid: u16][length: u16][payload]` in little-endian byte order. This
//! module decodes payloads into typed structures and encodes them back.
//!
//! Decoding is driven by a compile-time registry that maps a record
//! identifier (sid) to its decoder. Identifiers without a decoder are kept
//! as [`UnknownRecord`] so that their bytes survive a round trip unchanged.
//!
//! # Example
//!
//! ```
//! use litchi_xls::records::{decode_record, Record};
//!
//! // CALCCOUNT record: sid 0x000C, two payload bytes.
//! let bytes = [0x0C, 0x00, 0x02, 0x00, 0x64, 0x00];
//! let (record, consumed) = decode_record(&bytes, 0).unwrap();
//! assert_eq!(consumed, 6);
//! assert_eq!(record.sid(), 0x000C);
//! assert_eq!(record.to_bytes().unwrap(), bytes);
//! ```

use crate::common::error::{XlsError, XlsResult};
use bytes::Bytes;
use log::trace;
use phf::phf_map;
use std::io::Write;
use zerocopy::{FromBytes, IntoBytes, LE, U16};
use zerocopy_derive::*;

/// Implement [`BiffRecord`] for a record holding a single `u16`.
macro_rules! u16_record {
    ($(#[$meta:meta])* $name:ident, $sid:expr, $field:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name {
            pub $field: u16,
        }

        impl $crate::records::BiffRecord for $name {
            const SID: u16 = $sid;

            fn parse(data: &[u8]) -> $crate::common::error::XlsResult<Self> {
                let mut r = $crate::common::binary::LittleEndianReader::new(Self::SID, data);
                let $field = r.read_u16()?;
                r.expect_end()?;
                Ok(Self { $field })
            }

            fn data_size(&self) -> usize {
                2
            }

            fn write_data<W: std::io::Write>(
                &self,
                writer: &mut W,
            ) -> $crate::common::error::XlsResult<()> {
                writer.write_all(&self.$field.to_le_bytes())?;
                Ok(())
            }
        }
    };
}

/// Implement [`BiffRecord`] for a record holding a single IEEE double.
macro_rules! f64_record {
    ($(#[$meta:meta])* $name:ident, $sid:expr, $field:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub struct $name {
            pub $field: f64,
        }

        impl $crate::records::BiffRecord for $name {
            const SID: u16 = $sid;

            fn parse(data: &[u8]) -> $crate::common::error::XlsResult<Self> {
                let mut r = $crate::common::binary::LittleEndianReader::new(Self::SID, data);
                let $field = r.read_f64()?;
                r.expect_end()?;
                Ok(Self { $field })
            }

            fn data_size(&self) -> usize {
                8
            }

            fn write_data<W: std::io::Write>(
                &self,
                writer: &mut W,
            ) -> $crate::common::error::XlsResult<()> {
                writer.write_all(&self.$field.to_le_bytes())?;
                Ok(())
            }
        }
    };
}

pub mod cell;
pub mod cf;
pub mod colinfo;
pub mod formula_cells;
pub mod link;
pub mod merge;
pub mod page;
pub mod row;
pub mod sheet;
pub mod sid;
pub mod simple;
pub mod sst;
pub mod strings;
pub mod validation;
pub mod workbook;

pub use cell::{
    BlankRecord, BoolErrRecord, BoolErrValue, CellHeader, LabelRecord, LabelSstRecord,
    MulBlankRecord, MulRkRecord, NumberRecord, RkRecord, rk_to_f64,
};
pub use cf::{CfHeaderRecord, CfRuleRecord};
pub use colinfo::ColumnInfoRecord;
pub use formula_cells::{
    ArrayRecord, CachedValue, FormulaFlags, FormulaRange, FormulaRecord, SharedFormulaRecord,
    StringRecord, TableRecord,
};
pub use link::{
    CrnRecord, ExternNameRecord, ExternSheetRecord, ExternSheetRef, NameRecord, SupBookKind,
    SupBookRecord, XctRecord, built_in_name_text,
};
pub use merge::{CellRangeAddress, MergeCellsRecord};
pub use page::{
    FooterRecord, HeaderRecord, HorizontalPageBreakRecord, PageBreak, SetupRecord,
    VerticalPageBreakRecord,
};
pub use row::{DbCellRecord, IndexRecord, RowRecord};
pub use sheet::{
    BofRecord, BofType, DefaultRowHeightRecord, DimensionsRecord, EofRecord, GutsRecord,
    PaneRecord, SelectionRecord, SelectionRef, UncalcedRecord, Window2Flags, WindowTwoRecord,
};
pub use simple::*;
pub use sst::{ExtSstInfo, ExtSstRecord, FormatRun, SstRecord, StringPosition, UnicodeString};
pub use strings::XlString;
pub use validation::{DvRecord, DvalRecord};
pub use workbook::{
    BoundSheetRecord, FileSharingRecord, MAX_SHEET_NAME_LEN, SheetVisibility, validate_sheet_name,
};

/// Largest payload a single record may carry.
pub const MAX_RECORD_DATA_SIZE: usize = 8224;

/// Size of the `[sid][length]` frame in front of every payload.
pub const RECORD_HEADER_SIZE: usize = 4;

/// A record type with a fixed sid and a structured payload.
pub trait BiffRecord: Sized {
    /// Record identifier.
    const SID: u16;

    /// Decode the payload (without the 4-byte header).
    fn parse(data: &[u8]) -> XlsResult<Self>;

    /// Encoded payload length.
    fn data_size(&self) -> usize;

    /// Encode the payload (without the 4-byte header).
    fn write_data<W: Write>(&self, writer: &mut W) -> XlsResult<()>;

    /// Encoded length including the header.
    fn record_size(&self) -> usize {
        RECORD_HEADER_SIZE + self.data_size()
    }

    /// Write header and payload, returning the number of bytes written.
    fn serialize<W: Write>(&self, writer: &mut W) -> XlsResult<usize> {
        let len = self.data_size();
        write_record_header(writer, Self::SID, len)?;
        self.write_data(writer)?;
        Ok(RECORD_HEADER_SIZE + len)
    }
}

/// On-disk record frame.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawRecordHeader {
    sid: U16<LE>,
    length: U16<LE>,
}

/// Decoded record frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub sid: u16,
    pub length: u16,
}

impl RecordHeader {
    /// Read a frame at `offset`.
    pub fn read(data: &[u8], offset: usize) -> XlsResult<Self> {
        let tail = data.get(offset..).ok_or(XlsError::UnexpectedEndOfStream)?;
        let (raw, _) =
            RawRecordHeader::read_from_prefix(tail).map_err(|_| XlsError::UnexpectedEndOfStream)?;
        Ok(Self {
            sid: raw.sid.get(),
            length: raw.length.get(),
        })
    }
}

/// Write a record frame, rejecting payloads that do not fit one record.
pub fn write_record_header<W: Write>(writer: &mut W, sid: u16, len: usize) -> XlsResult<()> {
    if len > MAX_RECORD_DATA_SIZE {
        return Err(XlsError::invalid_record(
            sid,
            format!(
                "payload of {} bytes exceeds the {} byte record limit",
                len, MAX_RECORD_DATA_SIZE
            ),
        ));
    }
    let raw = RawRecordHeader {
        sid: U16::new(sid),
        length: U16::new(len as u16),
    };
    writer.write_all(raw.as_bytes())?;
    Ok(())
}

/// CONTINUE record not absorbed by the record in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinueRecord {
    pub data: Bytes,
}

/// Record without a structured decoder. Its payload is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRecord {
    pub sid: u16,
    pub data: Bytes,
}

impl UnknownRecord {
    pub fn new(sid: u16, data: impl Into<Bytes>) -> Self {
        Self {
            sid,
            data: data.into(),
        }
    }
}

macro_rules! define_records {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// Any record of a BIFF8 stream.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Record {
            $($variant($ty),)*
            Sst(SstRecord),
            Continue(ContinueRecord),
            Unknown(UnknownRecord),
        }

        impl Record {
            /// Record identifier.
            pub fn sid(&self) -> u16 {
                match self {
                    $(Record::$variant(_) => <$ty as BiffRecord>::SID,)*
                    Record::Sst(_) => sid::SST,
                    Record::Continue(_) => sid::CONTINUE,
                    Record::Unknown(r) => r.sid,
                }
            }

            /// Encoded length including headers of any CONTINUE records
            /// the record splits into.
            pub fn serialized_size(&self) -> usize {
                match self {
                    $(Record::$variant(r) => r.record_size(),)*
                    Record::Sst(r) => r.serialized_size(),
                    Record::Continue(r) => RECORD_HEADER_SIZE + r.data.len(),
                    Record::Unknown(r) => RECORD_HEADER_SIZE + r.data.len(),
                }
            }

            /// Write the record, returning the number of bytes written.
            pub fn serialize<W: Write>(&self, writer: &mut W) -> XlsResult<usize> {
                match self {
                    $(Record::$variant(r) => r.serialize(writer),)*
                    Record::Sst(r) => r.serialize(writer),
                    Record::Continue(r) => write_raw(writer, sid::CONTINUE, &r.data),
                    Record::Unknown(r) => write_raw(writer, r.sid, &r.data),
                }
            }
        }

        $(
            impl From<$ty> for Record {
                fn from(record: $ty) -> Self {
                    Record::$variant(record)
                }
            }
        )*
    };
}

define_records! {
    Bof(BofRecord),
    Eof(EofRecord),
    Index(IndexRecord),
    DbCell(DbCellRecord),
    Row(RowRecord),
    Dimensions(DimensionsRecord),
    Number(NumberRecord),
    Rk(RkRecord),
    MulRk(MulRkRecord),
    Label(LabelRecord),
    LabelSst(LabelSstRecord),
    BoolErr(BoolErrRecord),
    Blank(BlankRecord),
    MulBlank(MulBlankRecord),
    Formula(FormulaRecord),
    String(StringRecord),
    SharedFormula(SharedFormulaRecord),
    Array(ArrayRecord),
    Table(TableRecord),
    Window2(WindowTwoRecord),
    Selection(SelectionRecord),
    Pane(PaneRecord),
    CalcMode(CalcModeRecord),
    CalcCount(CalcCountRecord),
    RefMode(RefModeRecord),
    Iteration(IterationRecord),
    Delta(DeltaRecord),
    SaveRecalc(SaveRecalcRecord),
    PrintHeaders(PrintHeadersRecord),
    PrintGridlines(PrintGridlinesRecord),
    Gridset(GridsetRecord),
    Guts(GutsRecord),
    DefaultRowHeight(DefaultRowHeightRecord),
    WsBool(WsBoolRecord),
    DefaultColWidth(DefaultColWidthRecord),
    ColumnInfo(ColumnInfoRecord),
    MergeCells(MergeCellsRecord),
    CfHeader(CfHeaderRecord),
    CfRule(CfRuleRecord),
    Dval(DvalRecord),
    Dv(DvRecord),
    Protect(ProtectRecord),
    ObjectProtect(ObjectProtectRecord),
    ScenarioProtect(ScenarioProtectRecord),
    Password(PasswordRecord),
    Uncalced(UncalcedRecord),
    HorizontalPageBreak(HorizontalPageBreakRecord),
    VerticalPageBreak(VerticalPageBreakRecord),
    Header(HeaderRecord),
    Footer(FooterRecord),
    HCenter(HCenterRecord),
    VCenter(VCenterRecord),
    LeftMargin(LeftMarginRecord),
    RightMargin(RightMarginRecord),
    TopMargin(TopMarginRecord),
    BottomMargin(BottomMarginRecord),
    Setup(SetupRecord),
    BoundSheet(BoundSheetRecord),
    ExtSst(ExtSstRecord),
    CodePage(CodePageRecord),
    FileSharing(FileSharingRecord),
    SupBook(SupBookRecord),
    ExternName(ExternNameRecord),
    Xct(XctRecord),
    Crn(CrnRecord),
    ExternSheet(ExternSheetRecord),
    Name(NameRecord),
}

impl From<SstRecord> for Record {
    fn from(record: SstRecord) -> Self {
        Record::Sst(record)
    }
}

impl From<UnknownRecord> for Record {
    fn from(record: UnknownRecord) -> Self {
        Record::Unknown(record)
    }
}

impl Record {
    /// Encode the record into a fresh buffer.
    pub fn to_bytes(&self) -> XlsResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.serialized_size());
        self.serialize(&mut out)?;
        Ok(out)
    }

    /// Whether this record is a cell value record (including FORMULA).
    pub fn is_cell_value(&self) -> bool {
        sid::is_cell_value(self.sid())
    }
}

fn write_raw<W: Write>(writer: &mut W, sid: u16, data: &[u8]) -> XlsResult<usize> {
    write_record_header(writer, sid, data.len())?;
    writer.write_all(data)?;
    Ok(RECORD_HEADER_SIZE + data.len())
}

type DecoderFn = fn(&[u8]) -> XlsResult<Record>;

type DecoderMap = phf::Map<u16, DecoderFn>;

fn decode<T: BiffRecord + Into<Record>>(data: &[u8]) -> XlsResult<Record> {
    T::parse(data).map(Into::into)
}

/// Registry of structured decoders keyed by sid.
static DECODERS: DecoderMap = phf_map! {
    0x0809u16 => decode::<BofRecord>,
    0x000Au16 => decode::<EofRecord>,
    0x020Bu16 => decode::<IndexRecord>,
    0x00D7u16 => decode::<DbCellRecord>,
    0x0208u16 => decode::<RowRecord>,
    0x0200u16 => decode::<DimensionsRecord>,
    0x0203u16 => decode::<NumberRecord>,
    0x027Eu16 => decode::<RkRecord>,
    0x00BDu16 => decode::<MulRkRecord>,
    0x0204u16 => decode::<LabelRecord>,
    0x00FDu16 => decode::<LabelSstRecord>,
    0x0205u16 => decode::<BoolErrRecord>,
    0x0201u16 => decode::<BlankRecord>,
    0x00BEu16 => decode::<MulBlankRecord>,
    0x0006u16 => decode::<FormulaRecord>,
    0x0207u16 => decode::<StringRecord>,
    0x04BCu16 => decode::<SharedFormulaRecord>,
    0x0221u16 => decode::<ArrayRecord>,
    0x0236u16 => decode::<TableRecord>,
    0x023Eu16 => decode::<WindowTwoRecord>,
    0x001Du16 => decode::<SelectionRecord>,
    0x0041u16 => decode::<PaneRecord>,
    0x000Du16 => decode::<CalcModeRecord>,
    0x000Cu16 => decode::<CalcCountRecord>,
    0x000Fu16 => decode::<RefModeRecord>,
    0x0011u16 => decode::<IterationRecord>,
    0x0010u16 => decode::<DeltaRecord>,
    0x005Fu16 => decode::<SaveRecalcRecord>,
    0x002Au16 => decode::<PrintHeadersRecord>,
    0x002Bu16 => decode::<PrintGridlinesRecord>,
    0x0082u16 => decode::<GridsetRecord>,
    0x0080u16 => decode::<GutsRecord>,
    0x0225u16 => decode::<DefaultRowHeightRecord>,
    0x0081u16 => decode::<WsBoolRecord>,
    0x0055u16 => decode::<DefaultColWidthRecord>,
    0x007Du16 => decode::<ColumnInfoRecord>,
    0x00E5u16 => decode::<MergeCellsRecord>,
    0x01B0u16 => decode::<CfHeaderRecord>,
    0x01B1u16 => decode::<CfRuleRecord>,
    0x01B2u16 => decode::<DvalRecord>,
    0x01BEu16 => decode::<DvRecord>,
    0x0012u16 => decode::<ProtectRecord>,
    0x0063u16 => decode::<ObjectProtectRecord>,
    0x00DDu16 => decode::<ScenarioProtectRecord>,
    0x0013u16 => decode::<PasswordRecord>,
    0x005Eu16 => decode::<UncalcedRecord>,
    0x001Bu16 => decode::<HorizontalPageBreakRecord>,
    0x001Au16 => decode::<VerticalPageBreakRecord>,
    0x0014u16 => decode::<HeaderRecord>,
    0x0015u16 => decode::<FooterRecord>,
    0x0083u16 => decode::<HCenterRecord>,
    0x0084u16 => decode::<VCenterRecord>,
    0x0026u16 => decode::<LeftMarginRecord>,
    0x0027u16 => decode::<RightMarginRecord>,
    0x0028u16 => decode::<TopMarginRecord>,
    0x0029u16 => decode::<BottomMarginRecord>,
    0x00A1u16 => decode::<SetupRecord>,
    0x0085u16 => decode::<BoundSheetRecord>,
    0x00FFu16 => decode::<ExtSstRecord>,
    0x0042u16 => decode::<CodePageRecord>,
    0x005Bu16 => decode::<FileSharingRecord>,
    0x01AEu16 => decode::<SupBookRecord>,
    0x0023u16 => decode::<ExternNameRecord>,
    0x0059u16 => decode::<XctRecord>,
    0x005Au16 => decode::<CrnRecord>,
    0x0017u16 => decode::<ExternSheetRecord>,
    0x0018u16 => decode::<NameRecord>,
};

/// Whether a structured decoder exists for `sid`.
pub fn is_supported(sid: u16) -> bool {
    sid == sid::SST || DECODERS.contains_key(&sid)
}

/// Decode one payload that has already been separated from its frame.
pub fn decode_payload(sid: u16, data: &[u8]) -> XlsResult<Record> {
    match DECODERS.get(&sid) {
        Some(decoder) => decoder(data),
        None if sid == sid::CONTINUE => Ok(Record::Continue(ContinueRecord {
            data: Bytes::copy_from_slice(data),
        })),
        None => Ok(Record::Unknown(UnknownRecord::new(
            sid,
            Bytes::copy_from_slice(data),
        ))),
    }
}

fn frame_at(bytes: &[u8], offset: usize) -> XlsResult<(RecordHeader, &[u8])> {
    let header = RecordHeader::read(bytes, offset)?;
    let start = offset + RECORD_HEADER_SIZE;
    let end = start + header.length as usize;
    let payload = bytes.get(start..end).ok_or(XlsError::UnexpectedEndOfStream)?;
    Ok((header, payload))
}

/// Decode the record starting at `offset`.
///
/// Returns the record and the number of bytes consumed. SST absorbs the
/// CONTINUE records that follow it, so its consumed count covers them too.
pub fn decode_record(bytes: &[u8], offset: usize) -> XlsResult<(Record, usize)> {
    let (header, payload) = frame_at(bytes, offset)?;
    let mut consumed = RECORD_HEADER_SIZE + payload.len();
    trace!(
        "decoding {} (0x{:04X}) at offset {}, {} bytes",
        sid::name(header.sid),
        header.sid,
        offset,
        header.length
    );

    if header.sid == sid::SST {
        let mut chunks = vec![payload];
        while offset + consumed < bytes.len() {
            let (next, next_payload) = frame_at(bytes, offset + consumed)?;
            if next.sid != sid::CONTINUE {
                break;
            }
            chunks.push(next_payload);
            consumed += RECORD_HEADER_SIZE + next_payload.len();
        }
        return Ok((Record::Sst(SstRecord::parse_chunks(&chunks)?), consumed));
    }

    Ok((decode_payload(header.sid, payload)?, consumed))
}

/// Decode a complete record stream.
pub fn read_records(bytes: &[u8]) -> XlsResult<Vec<Record>> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let (record, consumed) = decode_record(bytes, offset)?;
        records.push(record);
        offset += consumed;
    }
    Ok(records)
}

/// Encode a record list back into a stream.
pub fn write_records<W: Write>(writer: &mut W, records: &[Record]) -> XlsResult<usize> {
    let mut written = 0;
    for record in records {
        written += record.serialize(writer)?;
    }
    Ok(written)
}

/// Record offsets are relative to the start of this writer.
pub(crate) struct CountingWriter<W> {
    inner: W,
    count: usize,
}

impl<W: Write> CountingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
