//! Tesseract engine implementation
//!
//! Uses the statically linked tesseract-static crate, so no system install is
//! needed. Training data for the configured language is downloaded on first
//! use unless a tessdata directory is given.

use crate::cache;
use crate::config::Config;
use crate::engine::{OcrEngine, OcrResult};
use crate::error::InvoiceError;
use image::DynamicImage;
use std::path::PathBuf;
use tesseract_static::tesseract::Tesseract;

pub struct TesseractEngine {
    tessdata_path: String,
    language: String,
}

impl TesseractEngine {
    pub fn new(config: &Config) -> Result<Self, InvoiceError> {
        let language = config.language.clone();
        let dir = match &config.tessdata_path {
            Some(dir) => dir.clone(),
            None => download_tessdata(&language)?,
        };

        let tessdata_path = dir
            .to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| InvoiceError::InitializationError("Invalid tessdata path".to_string()))?;

        // Fail at startup rather than on the first image
        Tesseract::new(Some(&tessdata_path), Some(&language)).map_err(|e| {
            InvoiceError::InitializationError(format!("Failed to initialize Tesseract: {}", e))
        })?;

        tracing::info!(
            "Tesseract engine initialized (tessdata: {}, language: {})",
            tessdata_path,
            language
        );

        Ok(Self {
            tessdata_path,
            language,
        })
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - closest to the layout analysis of the classic tesseract CLI"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, InvoiceError> {
        let processing = |what: &str, e: &dyn std::fmt::Display| {
            InvoiceError::ProcessingError(format!("Failed to {}: {}", what, e))
        };

        // Leptonica always reads BMP, whatever formats it was built with
        let rgb_img = image.to_rgb8();
        let mut bmp_data = Vec::new();
        rgb_img
            .write_to(&mut std::io::Cursor::new(&mut bmp_data), image::ImageFormat::Bmp)
            .map_err(|e| processing("convert to BMP", &e))?;

        let (width, height) = rgb_img.dimensions();
        tracing::debug!("Tesseract input: {}x{}, {} bytes", width, height, bmp_data.len());

        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(&self.language))
            .map_err(|e| processing("create Tesseract", &e))?
            .set_image_from_mem(&bmp_data)
            .map_err(|e| processing("set image", &e))?
            .recognize()
            .map_err(|e| processing("recognize text", &e))?;

        let text = tess.get_text().map_err(|e| processing("get text", &e))?;

        // 0-100 scale
        let confidence = tess.mean_text_conf() as f32 / 100.0;

        Ok(OcrResult {
            text: text.trim().to_string(),
            confidence,
            warnings: Vec::new(),
        })
    }
}

fn download_tessdata(language: &str) -> Result<PathBuf, InvoiceError> {
    let dir = cache::cache_dir("tessdata")?;
    let url = format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    );
    cache::ensure_cached(&url, &dir, &format!("{}.traineddata", language))?;

    // Tesseract wants the directory, not the file
    Ok(dir)
}
