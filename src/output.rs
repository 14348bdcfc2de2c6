use crate::error::InvoiceError;
use crate::extract::InvoiceRecord;
use std::path::Path;

pub const HEADER: [&str; 6] = [
    "ID",
    "DueDate",
    "InvoiceNo",
    "InvoiceDate",
    "CompanyName",
    "TotalDue",
];

/// Write the extracted invoices as CSV. The header is written even with no records.
pub fn write_records(path: &Path, records: &[InvoiceRecord]) -> Result<(), InvoiceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| InvoiceError::io(parent, e))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    writer.write_record(HEADER)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|e| InvoiceError::io(path, e))?;
    Ok(())
}
