//! Spreadsheet error values (`#DIV/0!`, `#N/A`, ...).

use std::fmt;

/// An in-band error value as stored in BOOLERR cells, cached formula
/// results and tErr tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Null,
    Div0,
    Value,
    Ref,
    Name,
    Num,
    Na,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        match self {
            ErrorCode::Null => 0x00,
            ErrorCode::Div0 => 0x07,
            ErrorCode::Value => 0x0F,
            ErrorCode::Ref => 0x17,
            ErrorCode::Name => 0x1D,
            ErrorCode::Num => 0x24,
            ErrorCode::Na => 0x2A,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => ErrorCode::Null,
            0x07 => ErrorCode::Div0,
            0x0F => ErrorCode::Value,
            0x17 => ErrorCode::Ref,
            0x1D => ErrorCode::Name,
            0x24 => ErrorCode::Num,
            0x2A => ErrorCode::Na,
            _ => return None,
        })
    }

    pub fn text(self) -> &'static str {
        match self {
            ErrorCode::Null => "#NULL!",
            ErrorCode::Div0 => "#DIV/0!",
            ErrorCode::Value => "#VALUE!",
            ErrorCode::Ref => "#REF!",
            ErrorCode::Name => "#NAME?",
            ErrorCode::Num => "#NUM!",
            ErrorCode::Na => "#N/A",
        }
    }

    /// Parse an error literal, case-insensitively.
    pub fn from_text(text: &str) -> Option<Self> {
        [
            ErrorCode::Null,
            ErrorCode::Div0,
            ErrorCode::Value,
            ErrorCode::Ref,
            ErrorCode::Name,
            ErrorCode::Num,
            ErrorCode::Na,
        ]
        .into_iter()
        .find(|e| e.text().eq_ignore_ascii_case(text))
    }

    /// Text for a raw code, falling back to a hex form for unknown codes.
    pub fn text_for_code(code: u8) -> String {
        match Self::from_code(code) {
            Some(e) => e.text().to_string(),
            None => format!("#ERR{:02X}!", code),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in [0x00, 0x07, 0x0F, 0x17, 0x1D, 0x24, 0x2A] {
            let e = ErrorCode::from_code(code).unwrap();
            assert_eq!(e.code(), code);
            assert_eq!(ErrorCode::from_text(e.text()), Some(e));
        }
        assert_eq!(ErrorCode::from_code(0x01), None);
        assert_eq!(ErrorCode::from_text("#n/a"), Some(ErrorCode::Na));
    }
}
