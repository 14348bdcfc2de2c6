//! Field extraction from OCR text
//!
//! The invoices on the challenge site share a loose layout but OCR output is
//! noisy, so each field has a primary pattern and a fallback. Lines are scanned
//! once, top to bottom.

use crate::dates;
use crate::error::InvoiceError;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static ISO_DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());

static COMPANY_TOTAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.*?)(\$[\d,]+\.\d{2})").unwrap());

static TOTAL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Total\s+([\d,]+\.\d{2})").unwrap());

const INVOICE_MARKER: &str = "Invoice #";
const DATE_MARKER: &str = "Date:";
// U+2018/U+2019 as well as ASCII quotes
const QUOTES: &[char] = &['\'', '\u{2018}', '\u{2019}', '"'];

/// Fields recovered from one invoice image, as they appeared in the text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceFields {
    pub invoice_number: String,
    /// `Mon DD, YYYY`
    pub invoice_date: String,
    pub company_name: String,
    /// Includes the leading `$`
    pub total_due: String,
}

/// Partially filled scan state
#[derive(Debug, Default)]
struct Scan {
    invoice_number: Option<String>,
    invoice_date: Option<String>,
    company_name: Option<String>,
    total_due: Option<String>,
}

impl Scan {
    fn line(&mut self, line: &str) {
        self.invoice_number_from(line);
        self.invoice_date_from(line);
        self.company_and_total_from(line);
        self.company_fallback_from(line);
        self.total_fallback_from(line);
    }

    fn invoice_number_from(&mut self, line: &str) {
        if self.invoice_number.is_some() {
            return;
        }
        if let Some(idx) = line.rfind(INVOICE_MARKER) {
            self.invoice_number = Some(line[idx + INVOICE_MARKER.len()..].trim().to_string());
        } else if line.starts_with('#') {
            self.invoice_number = Some(line.trim_start_matches('#').trim().to_string());
        }
    }

    fn invoice_date_from(&mut self, line: &str) {
        if line.contains(DATE_MARKER) {
            // Later "Date:" lines win
            if let Some((_, rest)) = line.split_once(':') {
                self.invoice_date = Some(rest.trim().to_string());
            }
            return;
        }
        if self.invoice_date.is_some()
            || !line.contains('-')
            || !line.chars().any(|c| c.is_ascii_digit())
        {
            return;
        }
        if let Some(m) = ISO_DATE_RE.find(line) {
            match dates::iso_to_long(m.as_str()) {
                Ok(long) => self.invoice_date = Some(long),
                Err(e) => tracing::debug!("Ignoring date-like text: {}", e),
            }
        }
    }

    fn company_and_total_from(&mut self, line: &str) {
        if self.company_name.is_some() && self.total_due.is_some() {
            return;
        }
        if !names_company(line) || !line.contains('$') {
            return;
        }
        if let Some(caps) = COMPANY_TOTAL_RE.captures(line) {
            self.company_name = Some(caps[1].trim().to_string());
            self.total_due = Some(caps[2].trim().to_string());
        }
    }

    fn company_fallback_from(&mut self, line: &str) {
        if self.company_name.is_none() && names_company(line) {
            self.company_name = Some(line.replace("INVOICE", "").trim().to_string());
        }
    }

    fn total_fallback_from(&mut self, line: &str) {
        if self.total_due.is_some() {
            return;
        }
        if let Some(caps) = TOTAL_RE.captures(line) {
            self.total_due = Some(format!("${}", &caps[1]));
        }
    }

    fn finish(self) -> Result<InvoiceFields, InvoiceError> {
        let company_name = self
            .company_name
            .map(|name| name.replace(QUOTES, "").trim().to_string());

        let mut missing = Vec::new();
        let invoice_number = required(self.invoice_number, "invoice number", &mut missing);
        let invoice_date = required(self.invoice_date, "invoice date", &mut missing);
        let company_name = required(company_name, "company name", &mut missing);
        let total_due = required(self.total_due, "total due", &mut missing);

        if !missing.is_empty() {
            return Err(InvoiceError::MissingFields(missing));
        }

        Ok(InvoiceFields {
            invoice_number,
            invoice_date,
            company_name,
            total_due,
        })
    }
}

fn names_company(line: &str) -> bool {
    line.contains("Corp.") || line.contains("LLC")
}

fn required(
    value: Option<String>,
    name: &'static str,
    missing: &mut Vec<&'static str>,
) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => {
            missing.push(name);
            String::new()
        }
    }
}

/// Scan OCR text for the four invoice fields.
///
/// Fails with [`InvoiceError::MissingFields`] when any field is absent or empty.
pub fn extract_fields(text: &str) -> Result<InvoiceFields, InvoiceError> {
    let mut scan = Scan::default();
    for line in text.lines() {
        scan.line(line.trim());
    }
    scan.finish()
}

/// One row of the output file, in column order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRecord {
    pub invoice_id: String,
    pub due_date: String,
    pub invoice_number: String,
    pub invoice_date: String,
    pub company_name: String,
    pub total_due: String,
}

/// Why an extracted invoice did not become a record
#[derive(Debug)]
pub enum Rejection {
    Date(InvoiceError),
    Future(NaiveDate),
}

/// Normalise extracted fields into an output row.
///
/// The invoice date is converted to `DD-MM-YYYY`, the `$` is dropped from the
/// total, and invoices dated after `today` are rejected.
pub fn to_record(
    invoice_id: &str,
    due_date: &str,
    fields: InvoiceFields,
    today: NaiveDate,
) -> Result<InvoiceRecord, Rejection> {
    let date = dates::parse_long(&fields.invoice_date).map_err(Rejection::Date)?;
    if date > today {
        return Err(Rejection::Future(date));
    }

    Ok(InvoiceRecord {
        invoice_id: invoice_id.to_string(),
        due_date: due_date.to_string(),
        invoice_number: fields.invoice_number,
        invoice_date: date.format(dates::DASHED_FORMAT).to_string(),
        company_name: fields.company_name,
        total_due: fields.total_due.replace('$', "").trim().to_string(),
    })
}
