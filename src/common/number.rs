//! Number <-> text conversions shared by the formula renderer and the
//! evaluator.

/// Render a number the way a spreadsheet shows it in a formula or when
/// converting to text: integers without a fractional part, other values in
/// their shortest round-trip form.
///
/// ```
/// use litchi_xls::common::number::number_to_text;
///
/// assert_eq!(number_to_text(11.0), "11");
/// assert_eq!(number_to_text(-0.5), "-0.5");
/// assert_eq!(number_to_text(1e21), "1E+21");
/// ```
pub fn number_to_text(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let mut buffer = itoa::Buffer::new();
        return buffer.format(value as i64).to_string();
    }
    let mut buffer = ryu::Buffer::new();
    let s = buffer.format(value);
    // ryu writes "1e21"; spreadsheets write "1E+21".
    match s.find('e') {
        Some(pos) => {
            let (mantissa, exponent) = s.split_at(pos);
            let mantissa = mantissa.strip_suffix(".0").unwrap_or(mantissa);
            let exponent = &exponent[1..];
            if let Some(negative) = exponent.strip_prefix('-') {
                format!("{}E-{}", mantissa, negative)
            } else {
                format!("{}E+{}", mantissa, exponent)
            }
        },
        None => s.strip_suffix(".0").unwrap_or(s).to_string(),
    }
}

/// Parse text as a number, tolerating surrounding whitespace.
///
/// Returns `None` for anything that is not entirely a decimal number.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    // fast_float2 accepts "inf" and "nan" spellings that spreadsheets do not.
    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
    {
        return None;
    }
    fast_float2::parse::<f64, _>(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_to_text() {
        assert_eq!(number_to_text(0.0), "0");
        assert_eq!(number_to_text(-0.0), "0");
        assert_eq!(number_to_text(42.0), "42");
        assert_eq!(number_to_text(0.1), "0.1");
        assert_eq!(number_to_text(1.5e-7), "1.5E-7");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number("-3"), Some(-3.0));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("1.2.3"), None);
    }
}
