//! Image preparation before OCR
//!
//! The challenge invoices are small, clean renders, so the steps are few:
//! grayscale, upscaling of small images and optional binarisation.

use clap::ValueEnum;
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use std::time::Instant;

/// Short side images are scaled up to
const MIN_SHORT_SIDE: u32 = 1000;
/// Upper bound for the long side after scaling
const MAX_DIMENSION: u32 = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Preset {
    /// Hand the decoded image to the engine unchanged
    None,
    /// Grayscale only
    Minimal,
    /// Grayscale and upscale small images
    #[default]
    Default,
    /// Default plus Otsu binarisation
    Aggressive,
}

impl Preset {
    fn steps(self) -> &'static [Step] {
        match self {
            Preset::None => &[],
            Preset::Minimal => &[Step::Grayscale],
            Preset::Default => &[Step::Grayscale, Step::Upscale],
            Preset::Aggressive => &[Step::Grayscale, Step::Upscale, Step::Binarize],
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Grayscale,
    Upscale,
    Binarize,
}

impl Step {
    fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Step::Grayscale => DynamicImage::ImageLuma8(image.to_luma8()),
            Step::Upscale => upscale(image),
            Step::Binarize => DynamicImage::ImageLuma8(binarize(&image.to_luma8())),
        }
    }
}

/// Run the preset's steps in order, logging how long each took
pub fn prepare(image: DynamicImage, preset: Preset) -> DynamicImage {
    let start = Instant::now();
    let mut img = image;

    for step in preset.steps() {
        let step_start = Instant::now();
        img = step.apply(img);
        tracing::debug!(
            "Preprocess step {:?} took {}ms",
            step,
            step_start.elapsed().as_millis()
        );
    }

    tracing::debug!(
        "Preprocessing ({:?}) finished in {}ms, result {}x{}",
        preset,
        start.elapsed().as_millis(),
        img.width(),
        img.height()
    );
    img
}

/// Target size for `upscale`, or `None` when the image is large enough
fn upscaled_dimensions(width: u32, height: u32) -> Option<(u32, u32)> {
    let short = width.min(height);
    if short == 0 || short >= MIN_SHORT_SIDE {
        return None;
    }

    let long = width.max(height) as f32;
    let scale = (MIN_SHORT_SIDE as f32 / short as f32).min(MAX_DIMENSION as f32 / long);
    if scale <= 1.0 {
        return None;
    }

    Some((
        (width as f32 * scale).round() as u32,
        (height as f32 * scale).round() as u32,
    ))
}

fn upscale(image: DynamicImage) -> DynamicImage {
    match upscaled_dimensions(image.width(), image.height()) {
        Some((w, h)) => image.resize_exact(w, h, FilterType::CatmullRom),
        None => image,
    }
}

/// Global Otsu threshold: dark text becomes 0, background 255
fn binarize(gray: &GrayImage) -> GrayImage {
    let level = imageproc::contrast::otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}
