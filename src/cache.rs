//! On-disk cache for OCR models and training data

use crate::error::InvoiceError;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `<user cache dir>/invoice-ocr/<subdir>`, created if missing
pub fn cache_dir(subdir: &str) -> Result<PathBuf, InvoiceError> {
    let dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("invoice-ocr")
        .join(subdir);

    std::fs::create_dir_all(&dir).map_err(|e| {
        InvoiceError::InitializationError(format!("Failed to create cache directory: {}", e))
    })?;

    Ok(dir)
}

/// Return `dir/filename`, downloading it from `url` first if it is not cached
pub fn ensure_cached(url: &str, dir: &Path, filename: &str) -> Result<PathBuf, InvoiceError> {
    let path = dir.join(filename);

    if path.exists() {
        tracing::info!("Using cached {} from {:?}", filename, path);
        return Ok(path);
    }

    tracing::info!("Downloading {} (this may take a moment)...", filename);
    download_to(url, &path)?;
    tracing::info!("Downloaded {} to {:?}", filename, path);

    Ok(path)
}

fn download_to(url: &str, path: &Path) -> Result<(), InvoiceError> {
    let init_err = |what: &str, e: &dyn std::fmt::Display| {
        InvoiceError::InitializationError(format!("{}: {}", what, e))
    };

    let buffer = ureq::get(url)
        .call()
        .map_err(|e| init_err("Failed to download", &e))?
        .into_body()
        .with_config()
        .limit(200 * 1024 * 1024)
        .read_to_vec()
        .map_err(|e| init_err("Failed to read response body", &e))?;

    // Partial downloads never reach the final path
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| init_err("Failed to create cache file", &e))?;
    file.write_all(&buffer)
        .map_err(|e| init_err("Failed to write cache file", &e))?;
    file.persist(path)
        .map_err(|e| init_err("Failed to store cache file", &e.error))?;

    Ok(())
}
