//! Stage orchestration for the CLI subcommands

use crate::browser;
use crate::config::Config;
use crate::download::{DownloadReport, Downloader};
use crate::engine::OcrEngine;
use crate::engines;
use crate::error::InvoiceError;
use crate::extract::{self, InvoiceRecord, Rejection};
use crate::manifest;
use crate::output;
use crate::preprocess;
use anyhow::Context;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Due date written when the table never listed an invoice
pub const UNKNOWN_DUE_DATE: &str = "Unknown";

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Counts for the end-of-run summary
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub images: usize,
    pub saved: usize,
    pub missing_fields: usize,
    pub bad_dates: usize,
    pub future: usize,
    pub failed: usize,
}

/// Scrape, download, OCR and write the output file
pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting invoice workflow");
    let report = scrape_and_download(&config).await?;

    tracing::info!("Extracting data from downloaded invoices");
    let due_dates = report.due_dates;
    tokio::task::spawn_blocking(move || extract_with(&config, &due_dates, build_engine))
        .await
        .context("extraction task panicked")??;
    Ok(())
}

/// Download stage only
pub async fn download(config: Config, numbered: Option<u32>) -> anyhow::Result<()> {
    match numbered {
        Some(count) => {
            tracing::info!("Fetching invoices 1..={} without the browser", count);
            tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                let downloader = Downloader::from_config(&config)?;
                let report = downloader.fetch_numbered(&config.base_url, count);
                finish_download(&config, &report)
            })
            .await
            .context("download task panicked")?
        }
        None => scrape_and_download(&config).await.map(|_| ()),
    }
}

/// Extraction stage only; due dates come from the manifest of an earlier download
pub async fn extract(config: Config) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let due_dates = manifest::read_due_dates(&config.manifest_path())
            .context("reading download manifest")?;
        extract_with(&config, &due_dates, build_engine)?;
        Ok(())
    })
    .await
    .context("extraction task panicked")?
}

/// Print the fields found in an OCR text dump as JSON
pub fn fields(path: Option<&Path>) -> anyhow::Result<()> {
    let text = match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            text
        }
    };

    let fields = extract::extract_fields(&text)?;
    println!("{}", serde_json::to_string_pretty(&fields)?);
    Ok(())
}

async fn scrape_and_download(config: &Config) -> anyhow::Result<DownloadReport> {
    let rows = browser::scrape(config).await?;

    let worker_config = config.clone();
    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<DownloadReport> {
        let downloader = Downloader::from_config(&worker_config)?;
        let report = downloader.fetch_rows(&rows, worker_config.today);
        finish_download(&worker_config, &report)?;
        Ok(report)
    })
    .await
    .context("download task panicked")??;

    Ok(report)
}

fn finish_download(config: &Config, report: &DownloadReport) -> anyhow::Result<()> {
    let manifest_path = config.manifest_path();
    manifest::write(&manifest_path, &report.saved)
        .with_context(|| format!("writing manifest {:?}", manifest_path))?;

    tracing::info!(
        "Download done: {} saved, {} future skipped, {} failed. Images in {:?}",
        report.saved.len(),
        report.skipped_future,
        report.failed,
        config.download_dir
    );
    Ok(())
}

fn build_engine(config: &Config) -> Result<Box<dyn OcrEngine>, InvoiceError> {
    engines::build(config)
}

/// Invoice images in `dir`, sorted by file name
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, InvoiceError> {
    if !dir.exists() {
        tracing::warn!("Download directory {:?} does not exist", dir);
        return Ok(Vec::new());
    }

    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| InvoiceError::io(dir, e))? {
        let path = entry.map_err(|e| InvoiceError::io(dir, e))?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            images.push(path);
        }
    }

    images.sort();
    Ok(images)
}

/// OCR every image in the download directory and write the output file.
///
/// The engine is only built when there is at least one image.
pub fn extract_with<F>(
    config: &Config,
    due_dates: &HashMap<String, String>,
    make_engine: F,
) -> anyhow::Result<ExtractSummary>
where
    F: FnOnce(&Config) -> Result<Box<dyn OcrEngine>, InvoiceError>,
{
    let images = list_images(&config.download_dir)?;
    let mut summary = ExtractSummary {
        images: images.len(),
        ..Default::default()
    };
    let mut records = Vec::new();

    if !images.is_empty() {
        let engine = make_engine(config)?;
        tracing::info!("Using {} engine: {}", engine.name(), engine.description());

        for path in &images {
            match process_image(config, engine.as_ref(), path, due_dates) {
                Ok(record) => {
                    records.push(record);
                    summary.saved += 1;
                }
                Err(Skip::Rejected(Rejection::Date(e))) => {
                    tracing::error!("Failed to process date for {:?}: {}", path, e);
                    summary.bad_dates += 1;
                }
                Err(Skip::Rejected(Rejection::Future(date))) => {
                    tracing::info!("Skipping {:?} - invoice date {} is in the future", path, date);
                    summary.future += 1;
                }
                Err(Skip::Failed(e @ InvoiceError::MissingFields(_))) => {
                    tracing::warn!("Missing data for image {:?}: {}", path, e);
                    summary.missing_fields += 1;
                }
                Err(Skip::Failed(e)) => {
                    tracing::error!("Error processing image {:?}: {}", path, e);
                    summary.failed += 1;
                }
            }
        }
    }

    output::write_records(&config.output, &records)
        .with_context(|| format!("writing {:?}", config.output))?;

    tracing::info!(
        "Done. {} of {} invoices saved to {:?} ({} missing fields, {} bad dates, {} future, {} failed)",
        summary.saved,
        summary.images,
        config.output,
        summary.missing_fields,
        summary.bad_dates,
        summary.future,
        summary.failed
    );
    Ok(summary)
}

enum Skip {
    Failed(InvoiceError),
    Rejected(Rejection),
}

impl From<InvoiceError> for Skip {
    fn from(e: InvoiceError) -> Self {
        Skip::Failed(e)
    }
}

fn process_image(
    config: &Config,
    engine: &dyn OcrEngine,
    path: &Path,
    due_dates: &HashMap<String, String>,
) -> Result<InvoiceRecord, Skip> {
    let invoice_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::info!("Extracting data from {:?}", path);

    let start = Instant::now();
    let image = image::open(path)
        .map_err(|e| InvoiceError::ProcessingError(format!("Failed to load image: {}", e)))?;
    let image = preprocess::prepare(image, config.preset);
    let result = engine.recognize(&image)?;

    tracing::debug!(
        "OCR of {} took {}ms, confidence {:.2}, {} chars",
        invoice_id,
        start.elapsed().as_millis(),
        result.confidence,
        result.text.len()
    );
    for warning in &result.warnings {
        tracing::warn!("{}: {}", invoice_id, warning);
    }

    if config.keep_text {
        let text_path = path.with_extension("txt");
        if let Err(e) = std::fs::write(&text_path, &result.text) {
            tracing::warn!("Could not save OCR text to {:?}: {}", text_path, e);
        }
    }

    let fields = extract::extract_fields(&result.text)?;
    let due_date = due_dates
        .get(&invoice_id)
        .map(String::as_str)
        .unwrap_or(UNKNOWN_DUE_DATE);

    extract::to_record(&invoice_id, due_date, fields, config.today).map_err(Skip::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OcrResult;
    use image::{DynamicImage, RgbImage};

    /// Returns canned text per image width, so each fixture image "reads" differently
    struct CannedEngine {
        by_width: HashMap<u32, &'static str>,
    }

    impl OcrEngine for CannedEngine {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn description(&self) -> &'static str {
            "fixed text for tests"
        }

        fn recognize(&self, image: &DynamicImage) -> Result<OcrResult, InvoiceError> {
            let text = self.by_width.get(&image.width()).copied().unwrap_or("");
            Ok(OcrResult {
                text: text.to_string(),
                confidence: 1.0,
                warnings: Vec::new(),
            })
        }
    }

    fn save_png(dir: &Path, name: &str, width: u32) {
        RgbImage::new(width, 8).save(dir.join(name)).unwrap();
    }

    const GOOD: &str = "Aenean LLC INVOICE\nInvoice # 1001\nDate: Jun 12, 2019\nAenean LLC $1,128.05";
    const FUTURE: &str = "Invoice # 1002\nDate: Jan 1, 2099\nTotal 5.00\nFuture Corp.";
    const INCOMPLETE: &str = "Invoice # 1003\nTotal 5.00";

    #[test]
    fn test_list_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        save_png(dir.path(), "b.png", 10);
        save_png(dir.path(), "a.PNG", 10);
        std::fs::write(dir.path().join("c.jpeg"), b"x").unwrap();
        std::fs::write(dir.path().join("invoices.csv"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("d.jpg")).unwrap();

        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.png", "c.jpeg"]);
    }

    #[test]
    fn test_extract_with_writes_surviving_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests(dir.path());
        config.keep_text = true;

        save_png(dir.path(), "good.png", 10);
        save_png(dir.path(), "future.png", 11);
        save_png(dir.path(), "partial.png", 12);
        std::fs::write(dir.path().join("broken.jpg"), b"not an image").unwrap();

        let due_dates: HashMap<String, String> =
            [("good".to_string(), "25-02-2019".to_string())].into_iter().collect();

        let engine = CannedEngine {
            by_width: [(10, GOOD), (11, FUTURE), (12, INCOMPLETE)].into_iter().collect(),
        };
        let summary =
            extract_with(&config, &due_dates, move |_| Ok(Box::new(engine) as Box<dyn OcrEngine>))
                .unwrap();

        assert_eq!(
            summary,
            ExtractSummary {
                images: 4,
                saved: 1,
                missing_fields: 1,
                bad_dates: 0,
                future: 1,
                failed: 1,
            }
        );

        let csv = std::fs::read_to_string(&config.output).unwrap();
        assert_eq!(
            csv,
            "ID,DueDate,InvoiceNo,InvoiceDate,CompanyName,TotalDue\n\
             good,25-02-2019,1001,12-06-2019,Aenean LLC,\"1,128.05\"\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("good.txt")).unwrap(),
            GOOD
        );
    }

    #[test]
    fn test_failed_text_sidecar_keeps_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests(dir.path());
        config.keep_text = true;

        save_png(dir.path(), "good.png", 10);
        // A directory where the sidecar should go makes the write fail
        std::fs::create_dir(dir.path().join("good.txt")).unwrap();

        let engine = CannedEngine {
            by_width: [(10, GOOD)].into_iter().collect(),
        };
        let summary = extract_with(&config, &HashMap::new(), move |_| {
            Ok(Box::new(engine) as Box<dyn OcrEngine>)
        })
        .unwrap();

        assert_eq!(summary.saved, 1);
        assert_eq!(summary.failed, 0);
        let csv = std::fs::read_to_string(&config.output).unwrap();
        assert!(csv.contains("good,Unknown,1001"), "{}", csv);
    }

    #[test]
    fn test_unknown_due_date() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_tests(dir.path());
        save_png(dir.path(), "zz.png", 10);

        let engine = CannedEngine {
            by_width: [(10, GOOD)].into_iter().collect(),
        };
        extract_with(&config, &HashMap::new(), move |_| {
            Ok(Box::new(engine) as Box<dyn OcrEngine>)
        })
        .unwrap();

        let csv = std::fs::read_to_string(&config.output).unwrap();
        assert!(csv.contains("zz,Unknown,1001"), "{}", csv);
    }

    #[test]
    fn test_engine_not_built_without_images() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_tests(dir.path());

        let summary = extract_with(&config, &HashMap::new(), |_| {
            panic!("engine should not be built for an empty directory")
        })
        .unwrap();

        assert_eq!(summary, ExtractSummary::default());
        assert_eq!(
            std::fs::read_to_string(&config.output).unwrap(),
            "ID,DueDate,InvoiceNo,InvoiceDate,CompanyName,TotalDue\n"
        );
    }
}
