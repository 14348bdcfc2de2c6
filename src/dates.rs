//! Conversions between the date formats found on invoices and in the table.
//!
//! OCR text yields either `Jan 05, 2019` or ISO `2019-01-05`; the table and the
//! output file use `05-01-2019`.

use crate::error::InvoiceError;
use chrono::NaiveDate;

/// Output form of the long date, `Jan 05, 2019`
pub const LONG_FORMAT: &str = "%b %d, %Y";
/// `%B` also matches the three-letter abbreviation when parsing
const LONG_PARSE_FORMAT: &str = "%B %d, %Y";
pub const DASHED_FORMAT: &str = "%d-%m-%Y";
pub const ISO_FORMAT: &str = "%Y-%m-%d";

fn parse(value: &str, format: &'static str) -> Result<NaiveDate, InvoiceError> {
    NaiveDate::parse_from_str(value.trim(), format).map_err(|_| InvoiceError::InvalidDate {
        value: value.to_string(),
        format,
    })
}

/// Parse `Jan 05, 2019` (full month names are accepted as well)
pub fn parse_long(value: &str) -> Result<NaiveDate, InvoiceError> {
    parse(value, LONG_PARSE_FORMAT)
}

/// Parse `05-01-2019`
pub fn parse_dashed(value: &str) -> Result<NaiveDate, InvoiceError> {
    parse(value, DASHED_FORMAT)
}

pub fn iso_to_long(value: &str) -> Result<String, InvoiceError> {
    Ok(parse(value, ISO_FORMAT)?.format(LONG_FORMAT).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_to_dashed(value: &str) -> Result<String, InvoiceError> {
        Ok(parse_long(value)?.format(DASHED_FORMAT).to_string())
    }

    fn dashed_to_long(value: &str) -> Result<String, InvoiceError> {
        Ok(parse_dashed(value)?.format(LONG_FORMAT).to_string())
    }

    #[test]
    fn test_long_to_dashed() {
        assert_eq!(long_to_dashed("Jan 05, 2019").unwrap(), "05-01-2019");
        assert_eq!(long_to_dashed("Dec 31, 2020").unwrap(), "31-12-2020");
    }

    #[test]
    fn test_long_accepts_full_month_name() {
        assert_eq!(long_to_dashed("March 7, 2019").unwrap(), "07-03-2019");
    }

    #[test]
    fn test_parse_long_month_spellings() {
        let expected = NaiveDate::from_ymd_opt(2019, 9, 3).unwrap();
        for value in ["Sep 03, 2019", "September 3, 2019", "  Sep 3, 2019 "] {
            assert_eq!(parse_long(value).unwrap(), expected, "{}", value);
        }
    }

    #[test]
    fn test_dashed_round_trip() {
        for value in ["05-01-2019", "29-02-2020", "31-12-1999"] {
            let long = dashed_to_long(value).unwrap();
            assert_eq!(long_to_dashed(&long).unwrap(), value);
        }
    }

    #[test]
    fn test_iso_to_long() {
        assert_eq!(iso_to_long("2019-06-12").unwrap(), "Jun 12, 2019");
    }

    #[test]
    fn test_malformed_dates_are_rejected() {
        assert!(long_to_dashed("Foo 12, 2019").is_err());
        assert!(long_to_dashed("2019-01-05").is_err());
        assert!(dashed_to_long("31-02-2019").is_err());
        assert!(iso_to_long("2019-13-01").is_err());
        assert!(parse_dashed("").is_err());
    }

    #[test]
    fn test_error_carries_format() {
        match parse_dashed("tomorrow") {
            Err(InvoiceError::InvalidDate { value, format }) => {
                assert_eq!(value, "tomorrow");
                assert_eq!(format, DASHED_FORMAT);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
