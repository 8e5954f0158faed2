use thiserror::Error;

/// Main error type for BIFF8 operations.
#[derive(Error, Debug)]
pub enum XlsError {
    /// IO error while reading or writing the byte stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record payload could not be decoded
    #[error("Invalid record 0x{sid:04X}: {message}")]
    InvalidRecord { sid: u16, message: String },

    /// A record payload has the wrong size
    #[error("Invalid length for record 0x{sid:04X}: expected {expected}, found {found}")]
    InvalidLength {
        sid: u16,
        expected: usize,
        found: usize,
    },

    /// The stream ended in the middle of a record or structure
    #[error("Unexpected end of stream")]
    UnexpectedEndOfStream,

    /// The record grammar required a different record type
    #[error("Unexpected record type: expected 0x{expected:04X}, found 0x{found:04X}")]
    UnexpectedRecordType { expected: u16, found: u16 },

    /// A mandatory record is absent
    #[error("Mandatory record {0} was not found")]
    MissingRecord(&'static str),

    /// A formula token stream or formula text could not be understood
    #[error("Invalid formula: {0}")]
    InvalidFormula(String),

    /// A caller supplied an out-of-range or inconsistent value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A formula depends on itself
    #[error("Circular reference detected at sheet {sheet}, row {row}, column {col}")]
    CircularReference { sheet: usize, row: u32, col: u16 },

    /// Formula cells are nested deeper than the configured limit
    #[error("Formula evaluation exceeded the nesting limit of {limit}")]
    EvaluationDepthExceeded { limit: usize },
}

impl XlsError {
    /// Whether this error means the byte stream itself is malformed.
    ///
    /// Format errors abort a document load; they are never retried.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            XlsError::Io(_)
                | XlsError::InvalidRecord { .. }
                | XlsError::InvalidLength { .. }
                | XlsError::UnexpectedEndOfStream
                | XlsError::UnexpectedRecordType { .. }
                | XlsError::MissingRecord(_)
        )
    }

    pub(crate) fn invalid_record(sid: u16, message: impl Into<String>) -> Self {
        XlsError::InvalidRecord {
            sid,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        XlsError::InvalidArgument(message.into())
    }
}

/// Result type for BIFF8 operations.
pub type XlsResult<T> = std::result::Result<T, XlsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_classification() {
        assert!(XlsError::UnexpectedEndOfStream.is_format_error());
        assert!(XlsError::MissingRecord("DIMENSIONS").is_format_error());
        assert!(!XlsError::invalid_argument("row").is_format_error());
        assert!(
            !XlsError::CircularReference {
                sheet: 0,
                row: 0,
                col: 0
            }
            .is_format_error()
        );
    }

    #[test]
    fn test_display() {
        let err = XlsError::InvalidLength {
            sid: 0x0203,
            expected: 14,
            found: 10,
        };
        assert_eq!(
            err.to_string(),
            "Invalid length for record 0x0203: expected 14, found 10"
        );
    }
}
