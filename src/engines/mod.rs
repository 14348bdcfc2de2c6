//! OCR engine implementations
//!
//! Engines are conditionally compiled based on feature flags; only the one
//! selected for a run is initialised, since each downloads its models on first
//! use.

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-tesseract")]
pub mod tesseract;

use crate::config::Config;
use crate::engine::OcrEngine;
use crate::error::InvoiceError;

/// Names of the engines compiled into this binary, default first
pub fn available() -> Vec<&'static str> {
    let mut names = Vec::new();

    #[cfg(feature = "engine-ocrs")]
    names.push("ocrs");

    #[cfg(feature = "engine-tesseract")]
    names.push("tesseract");

    names
}

/// Initialise the engine named in the config, or the default one
pub fn build(config: &Config) -> Result<Box<dyn OcrEngine>, InvoiceError> {
    let names = available();
    let name = match config.engine.as_deref() {
        Some(name) => name,
        None => names.first().copied().ok_or_else(|| {
            InvoiceError::InitializationError(
                "No OCR engines available. Build with --features engine-ocrs or --features engine-tesseract".to_string(),
            )
        })?,
    };

    tracing::info!("Initializing {} engine...", name);

    match name {
        #[cfg(feature = "engine-ocrs")]
        "ocrs" => Ok(Box::new(ocrs::OcrsEngine::new(config)?)),

        #[cfg(feature = "engine-tesseract")]
        "tesseract" => Ok(Box::new(tesseract::TesseractEngine::new(config)?)),

        other => Err(InvoiceError::InitializationError(format!(
            "Unknown OCR engine '{}' (available: {})",
            other,
            names.join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_engine_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests(dir.path());
        config.engine = Some("abacus".to_string());

        match build(&config) {
            Err(InvoiceError::InitializationError(msg)) => assert!(msg.contains("abacus")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(engine) => panic!("unexpectedly built {}", engine.name()),
        }
    }

    #[cfg(feature = "engine-ocrs")]
    #[test]
    fn test_ocrs_is_default() {
        assert_eq!(available().first(), Some(&"ocrs"));
    }
}
