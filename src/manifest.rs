//! Download ledger kept next to the images
//!
//! Lets `extract` recover the due dates scraped by an earlier `download` run.

use crate::download::Downloaded;
use crate::error::InvoiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Serialize, Deserialize)]
struct ManifestRow {
    #[serde(rename = "Invoice ID")]
    invoice_id: String,
    #[serde(rename = "Due Date")]
    due_date: String,
    #[serde(rename = "Filename")]
    filename: String,
}

pub fn write(path: &Path, saved: &[Downloaded]) -> Result<(), InvoiceError> {
    let mut writer = csv::Writer::from_path(path)?;
    for item in saved {
        writer.serialize(ManifestRow {
            invoice_id: item.invoice_id.clone(),
            due_date: item.due_date.clone(),
            filename: item.file_name(),
        })?;
    }
    // serialize() writes the header lazily; an empty ledger still needs one
    if saved.is_empty() {
        writer.write_record(["Invoice ID", "Due Date", "Filename"])?;
    }
    writer.flush().map_err(|e| InvoiceError::io(path, e))?;
    Ok(())
}

/// Invoice id -> due date; empty when no manifest exists
pub fn read_due_dates(path: &Path) -> Result<HashMap<String, String>, InvoiceError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut due_dates = HashMap::new();
    for row in reader.deserialize::<ManifestRow>() {
        let row = row?;
        due_dates.insert(row.invoice_id, row.due_date);
    }
    Ok(due_dates)
}
