use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InvoiceError {
    #[error("Browser session failed: {0}")]
    Browser(String),

    #[error("Failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Invalid invoice id '{0}'")]
    InvalidInvoiceId(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize OCR engine: {0}")]
    InitializationError(String),

    #[error("Failed to process image: {0}")]
    ProcessingError(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid date '{value}' (expected {format})")]
    InvalidDate { value: String, format: &'static str },

    #[error("Missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl InvoiceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<fantoccini::error::CmdError> for InvoiceError {
    fn from(e: fantoccini::error::CmdError) -> Self {
        Self::Browser(e.to_string())
    }
}

impl From<fantoccini::error::NewSessionError> for InvoiceError {
    fn from(e: fantoccini::error::NewSessionError) -> Self {
        Self::Browser(format!("could not start WebDriver session: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_lists_names() {
        let err = InvoiceError::MissingFields(vec!["invoice number", "total due"]);
        assert_eq!(err.to_string(), "Missing fields: invoice number, total due");
    }

    #[test]
    fn test_invalid_date_message() {
        let err = InvoiceError::InvalidDate {
            value: "31-02-2019".to_string(),
            format: "%d-%m-%Y",
        };
        assert!(err.to_string().contains("31-02-2019"));
    }
}
