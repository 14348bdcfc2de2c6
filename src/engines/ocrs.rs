//! OCRS engine implementation
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies required.
//! Downloads neural network models automatically on first use.

use crate::cache;
use crate::config::Config;
use crate::engine::{OcrEngine, OcrResult};
use crate::error::InvoiceError;
use image::DynamicImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams};
use rten::Model;

/// Default model URLs from the ocrs project
const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

/// Below this score a warning is attached to the result
const LOW_CONFIDENCE: f32 = 0.5;

pub struct OcrsEngine {
    engine: OcrsOcrEngine,
}

impl OcrsEngine {
    pub fn new(_config: &Config) -> Result<Self, InvoiceError> {
        let dir = cache::cache_dir("ocrs")?;
        let detection_path = cache::ensure_cached(DETECTION_MODEL_URL, &dir, "text-detection.rten")?;
        let recognition_path =
            cache::ensure_cached(RECOGNITION_MODEL_URL, &dir, "text-recognition.rten")?;

        let load = |path: &std::path::Path, what: &str| {
            Model::load_file(path).map_err(|e| {
                InvoiceError::InitializationError(format!("Failed to load {} model: {}", what, e))
            })
        };

        let engine = OcrsOcrEngine::new(OcrEngineParams {
            detection_model: Some(load(&detection_path, "detection")?),
            recognition_model: Some(load(&recognition_path, "recognition")?),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| InvoiceError::InitializationError(format!("Failed to create OCR engine: {}", e)))?;

        tracing::info!("ocrs engine initialized");
        Ok(Self { engine })
    }
}

impl OcrEngine for OcrsEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, InvoiceError> {
        let processing = |what: &str, e: &dyn std::fmt::Display| {
            InvoiceError::ProcessingError(format!("Failed to {}: {}", what, e))
        };

        // ImageSource::from_bytes expects RGB8 in HWC layout
        let rgb_img = image.to_rgb8();
        let img_source = ImageSource::from_bytes(rgb_img.as_raw(), rgb_img.dimensions())
            .map_err(|e| processing("create image source", &e))?;

        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| processing("prepare input", &e))?;
        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| processing("detect words", &e))?;
        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);
        let line_texts = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| processing("recognize text", &e))?;

        // Lines stay separate; the field heuristics work line by line
        let text = line_texts
            .iter()
            .flatten()
            .map(|line| line.words().map(|w| w.to_string()).collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n");

        let confidence = text_confidence(&text);
        let mut warnings = Vec::new();
        if confidence < LOW_CONFIDENCE {
            warnings.push(format!("Low OCR confidence ({:.2})", confidence));
        }

        Ok(OcrResult {
            text,
            confidence,
            warnings,
        })
    }
}

/// Estimate recognition quality from the text alone.
///
/// ocrs reports no per-character scores. Invoice text is mostly letters,
/// digits and common punctuation, so the share of such characters among the
/// non-whitespace ones is used, reduced for long runs of one repeated
/// character.
fn text_confidence(text: &str) -> f32 {
    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.is_empty() {
        return 0.0;
    }

    let plausible = visible
        .iter()
        .filter(|c| c.is_alphanumeric() || "$#.,:-/&'()%".contains(**c))
        .count();
    let score = plausible as f32 / visible.len() as f32;

    let longest_run = visible
        .windows(2)
        .fold((1usize, 1usize), |(longest, run), pair| {
            let run = if pair[0] == pair[1] { run + 1 } else { 1 };
            (longest.max(run), run)
        })
        .0;

    let penalty = match longest_run {
        0..=3 => 1.0,
        4..=6 => 0.8,
        _ => 0.5,
    };

    (score * penalty).clamp(0.0, 1.0)
}
