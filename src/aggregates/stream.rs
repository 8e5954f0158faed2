//! Cursor over a decoded record list.

use crate::common::error::{XlsError, XlsResult};
use crate::records::{Record, sid};

/// Forward-only cursor used by every aggregate constructor.
///
/// Constructors consume exactly the records of their grammar; the caller
/// can check how far a constructor advanced through [`count_read`].
///
/// [`count_read`]: RecordStream::count_read
#[derive(Debug, Clone)]
pub struct RecordStream<'a> {
    records: &'a [Record],
    pos: usize,
    start: usize,
}

impl<'a> RecordStream<'a> {
    pub fn new(records: &'a [Record]) -> Self {
        Self::starting_at(records, 0)
    }

    pub fn starting_at(records: &'a [Record], pos: usize) -> Self {
        Self {
            records,
            pos,
            start: pos,
        }
    }

    pub fn has_next(&self) -> bool {
        self.pos < self.records.len()
    }

    /// Sid of the next record, `None` at the end.
    pub fn peek_sid(&self) -> Option<u16> {
        self.records.get(self.pos).map(Record::sid)
    }

    pub fn peek(&self) -> Option<&'a Record> {
        self.records.get(self.pos)
    }

    pub fn next(&mut self) -> Option<&'a Record> {
        let record = self.records.get(self.pos)?;
        self.pos += 1;
        Some(record)
    }

    /// Take the next record, failing unless it has the expected sid.
    pub fn expect(&mut self, expected: u16) -> XlsResult<&'a Record> {
        match self.peek() {
            Some(record) if record.sid() == expected => {
                self.pos += 1;
                Ok(record)
            },
            Some(record) => Err(XlsError::UnexpectedRecordType {
                expected,
                found: record.sid(),
            }),
            None => Err(XlsError::UnexpectedEndOfStream),
        }
    }

    /// Whether the next record is a CONTINUE.
    pub fn next_is_continue(&self) -> bool {
        self.peek_sid() == Some(sid::CONTINUE)
    }

    /// Number of records consumed since the cursor was created.
    pub fn count_read(&self) -> usize {
        self.pos - self.start
    }

    /// Absolute position in the underlying list.
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{CalcModeRecord, EofRecord};

    #[test]
    fn test_cursor_counts_consumed_records() {
        let records = vec![
            Record::CalcMode(CalcModeRecord { mode: 1 }),
            Record::Eof(EofRecord),
        ];
        let mut rs = RecordStream::new(&records);
        assert_eq!(rs.peek_sid(), Some(sid::CALCMODE));
        rs.next();
        assert_eq!(rs.count_read(), 1);
        assert!(rs.expect(sid::BOF).is_err());
        assert!(rs.expect(sid::EOF).is_ok());
        assert!(!rs.has_next());
        assert_eq!(rs.peek_sid(), None);
    }
}
