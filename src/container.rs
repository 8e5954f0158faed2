//! Where workbook bytes come from and go to.
//!
//! The record layer works on the raw BIFF8 workbook stream. Getting that
//! stream out of (or into) a compound document is the job of whoever
//! implements [`DocumentSource`] and [`DocumentSink`]; this crate ships
//! implementations for plain files holding the bare stream and for
//! in-memory buffers.
//!
//! ```no_run
//! use litchi_xls::ReadOptions;
//! use litchi_xls::container::{FileSink, FileSource, load_workbook, save_workbook};
//!
//! # fn main() -> litchi_xls::XlsResult<()> {
//! let mut source = FileSource::open("Workbook.bin")?;
//! let book = load_workbook(&mut source, &ReadOptions::default())?;
//!
//! let mut sink = FileSink::create("copy.bin")?;
//! save_workbook(&book, &mut sink)?;
//! # Ok(())
//! # }
//! ```

use crate::common::error::{XlsError, XlsResult};
use crate::config::ReadOptions;
use crate::model::Workbook;
use log::debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Random access to a workbook stream.
pub trait DocumentSource {
    /// Length of the stream in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read exactly `len` bytes at `offset`. Reading past the end is
    /// [`XlsError::UnexpectedEndOfStream`].
    fn read_at(&mut self, offset: u64, len: usize) -> XlsResult<Vec<u8>>;

    fn read_all(&mut self) -> XlsResult<Vec<u8>> {
        let len = usize::try_from(self.len()).map_err(|_| XlsError::UnexpectedEndOfStream)?;
        self.read_at(0, len)
    }
}

/// Sequential output of a workbook stream.
pub trait DocumentSink {
    fn write(&mut self, bytes: &[u8]) -> XlsResult<()>;

    /// Flush buffered output. Called once after the last write.
    fn finish(&mut self) -> XlsResult<()> {
        Ok(())
    }
}

fn slice_at(bytes: &[u8], offset: u64, len: usize) -> XlsResult<Vec<u8>> {
    let start = usize::try_from(offset).map_err(|_| XlsError::UnexpectedEndOfStream)?;
    let end = start.checked_add(len).ok_or(XlsError::UnexpectedEndOfStream)?;
    bytes
        .get(start..end)
        .map(<[u8]>::to_vec)
        .ok_or(XlsError::UnexpectedEndOfStream)
}

impl DocumentSource for &[u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_at(&mut self, offset: u64, len: usize) -> XlsResult<Vec<u8>> {
        slice_at(self, offset, len)
    }
}

impl DocumentSource for Vec<u8> {
    fn len(&self) -> u64 {
        Vec::len(self) as u64
    }

    fn read_at(&mut self, offset: u64, len: usize) -> XlsResult<Vec<u8>> {
        slice_at(self, offset, len)
    }
}

impl DocumentSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> XlsResult<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// A file that holds a bare workbook stream.
#[derive(Debug)]
pub struct FileSource {
    reader: BufReader<File>,
    len: u64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> XlsResult<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            reader: BufReader::new(file),
            len,
        })
    }
}

impl DocumentSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, len: usize) -> XlsResult<Vec<u8>> {
        let end = offset.checked_add(len as u64).ok_or(XlsError::UnexpectedEndOfStream)?;
        if end > self.len {
            return Err(XlsError::UnexpectedEndOfStream);
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Writes a bare workbook stream to a file.
#[derive(Debug)]
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create (or truncate) the file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> XlsResult<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl DocumentSink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> XlsResult<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    fn finish(&mut self) -> XlsResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Decode the whole stream of `source` into a workbook.
pub fn load_workbook(source: &mut dyn DocumentSource, options: &ReadOptions) -> XlsResult<Workbook> {
    let bytes = source.read_all()?;
    debug!("loading workbook stream of {} bytes", bytes.len());
    Workbook::from_bytes_with_options(&bytes, options)
}

/// Serialize `book` into `sink`. Returns the number of bytes written.
pub fn save_workbook(book: &Workbook, sink: &mut dyn DocumentSink) -> XlsResult<usize> {
    let bytes = book.to_bytes()?;
    sink.write(&bytes)?;
    sink.finish()?;
    debug!("saved workbook stream of {} bytes", bytes.len());
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> Workbook {
        let mut book = Workbook::create();
        let sheet = book.create_sheet("Data").unwrap();
        book.set_cell_number(sheet, 0, 0, 42.0).unwrap();
        book.set_cell_string(sheet, 1, 0, "text").unwrap();
        book.set_cell_formula(sheet, 2, 0, "A1/2").unwrap();
        book
    }

    #[test]
    fn test_memory_round_trip() {
        let book = sample_book();
        let mut sink = Vec::new();
        let written = save_workbook(&book, &mut sink).unwrap();
        assert_eq!(written, sink.len());

        let mut source = sink.clone();
        let reread = load_workbook(&mut source, &ReadOptions::default()).unwrap();
        assert_eq!(reread.to_bytes().unwrap(), sink);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Workbook.bin");
        let book = sample_book();

        let mut sink = FileSink::create(&path).unwrap();
        let written = save_workbook(&book, &mut sink).unwrap();

        let mut source = FileSource::open(&path).unwrap();
        assert_eq!(source.len(), written as u64);
        let header = source.read_at(0, 4).unwrap();
        assert_eq!(&header[..2], &[0x09, 0x08]);
        let reread = load_workbook(&mut source, &ReadOptions::default()).unwrap();
        assert_eq!(reread.sheet_name(0), Some("Data"));
        assert_eq!(reread.cell_formula(0, 2, 0).as_deref(), Some("A1/2"));
    }

    #[test]
    fn test_reads_past_the_end_fail() {
        let mut bytes: &[u8] = &[1, 2, 3];
        assert_eq!(bytes.read_at(1, 2).unwrap(), vec![2, 3]);
        assert!(matches!(bytes.read_at(2, 2), Err(XlsError::UnexpectedEndOfStream)));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [0u8; 8]).unwrap();
        let mut source = FileSource::open(&path).unwrap();
        assert!(matches!(source.read_at(4, 8), Err(XlsError::UnexpectedEndOfStream)));
        assert!(!source.is_empty());
    }
}
