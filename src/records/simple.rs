//! Records whose payload is a single scalar.

use super::sid;

u16_record!(
    /// Calculation mode: 0 manual, 1 automatic, 2 automatic except tables.
    CalcModeRecord,
    sid::CALCMODE,
    mode
);
u16_record!(
    /// Iteration limit for circular calculations.
    CalcCountRecord,
    sid::CALCCOUNT,
    iterations
);
u16_record!(
    /// Reference style: 1 for A1, 0 for R1C1.
    RefModeRecord,
    sid::REFMODE,
    mode
);
u16_record!(IterationRecord, sid::ITERATION, enabled);
u16_record!(SaveRecalcRecord, sid::SAVERECALC, recalc);
u16_record!(PrintHeadersRecord, sid::PRINTHEADERS, print_headers);
u16_record!(PrintGridlinesRecord, sid::PRINTGRIDLINES, print_gridlines);
u16_record!(
    /// Whether the user touched the print gridlines option.
    GridsetRecord,
    sid::GRIDSET,
    gridset
);
u16_record!(
    /// Sheet-level option bits (outline symbols, fit to page, ...).
    WsBoolRecord,
    sid::WSBOOL,
    options
);
u16_record!(
    /// Default column width in characters.
    DefaultColWidthRecord,
    sid::DEFCOLWIDTH,
    width
);
u16_record!(ProtectRecord, sid::PROTECT, protected);
u16_record!(ObjectProtectRecord, sid::OBJPROTECT, protected);
u16_record!(ScenarioProtectRecord, sid::SCENPROTECT, protected);
u16_record!(
    /// Sheet password verifier.
    PasswordRecord,
    sid::PASSWORD,
    hash
);
u16_record!(HCenterRecord, sid::HCENTER, center);
u16_record!(VCenterRecord, sid::VCENTER, center);
u16_record!(CodePageRecord, sid::CODEPAGE, codepage);

f64_record!(
    /// Maximum change for iterative calculation.
    DeltaRecord,
    sid::DELTA,
    max_change
);
f64_record!(LeftMarginRecord, sid::LEFTMARGIN, inches);
f64_record!(RightMarginRecord, sid::RIGHTMARGIN, inches);
f64_record!(TopMarginRecord, sid::TOPMARGIN, inches);
f64_record!(BottomMarginRecord, sid::BOTTOMMARGIN, inches);

impl ProtectRecord {
    pub fn new(protected: bool) -> Self {
        Self {
            protected: protected as u16,
        }
    }

    pub fn is_protected(&self) -> bool {
        self.protected != 0
    }
}

impl ObjectProtectRecord {
    pub fn new(protected: bool) -> Self {
        Self {
            protected: protected as u16,
        }
    }
}

impl ScenarioProtectRecord {
    pub fn new(protected: bool) -> Self {
        Self {
            protected: protected as u16,
        }
    }
}

impl PasswordRecord {
    /// Password verifier as computed by Excel for sheet protection.
    ///
    /// An empty password hashes to 0.
    ///
    /// ```
    /// use litchi_xls::records::PasswordRecord;
    ///
    /// assert_eq!(PasswordRecord::hash_password(""), 0);
    /// assert_eq!(PasswordRecord::hash_password("abc"), 0xCC1A);
    /// ```
    pub fn hash_password(password: &str) -> u16 {
        if password.is_empty() {
            return 0;
        }
        let units: Vec<u16> = password.encode_utf16().collect();
        let mut hash: u16 = 0;
        for &c in units.iter().rev() {
            hash = ((hash >> 14) & 0x01) | ((hash << 1) & 0x7FFF);
            hash ^= c;
        }
        hash = ((hash >> 14) & 0x01) | ((hash << 1) & 0x7FFF);
        hash ^= units.len() as u16;
        hash ^= 0x8000 | (u16::from(b'N') << 8) | u16::from(b'K');
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::BiffRecord;

    #[test]
    fn test_u16_record_round_trip() {
        let record = CalcCountRecord::parse(&[100, 0]).unwrap();
        assert_eq!(record.iterations, 100);
        let mut out = Vec::new();
        record.write_data(&mut out).unwrap();
        assert_eq!(out, [100, 0]);
    }

    #[test]
    fn test_f64_record_round_trip() {
        let bytes = 0.75f64.to_le_bytes();
        let record = LeftMarginRecord::parse(&bytes).unwrap();
        assert_eq!(record.inches, 0.75);
        assert_eq!(record.data_size(), 8);
    }

    #[test]
    fn test_password_hash_known_values() {
        // Values produced by Excel for the same passwords.
        assert_eq!(PasswordRecord::hash_password("abc"), 0xCC1A);
        assert_eq!(PasswordRecord::hash_password("password"), 0x83AF);
    }
}
