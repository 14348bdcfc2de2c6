//! Blocking HTTP download of invoice images

use crate::config::Config;
use crate::dates;
use crate::error::InvoiceError;
use crate::table::InvoiceRow;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Due date recorded for invoices fetched without a table row
pub const NO_DUE_DATE: &str = "N/A";

/// A saved invoice image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub invoice_id: String,
    pub due_date: String,
    pub path: PathBuf,
}

impl Downloaded {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Outcome of the download stage
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub saved: Vec<Downloaded>,
    /// Invoice id -> due date as shown in the table, including skipped rows
    pub due_dates: HashMap<String, String>,
    pub skipped_future: usize,
    pub failed: usize,
}

pub struct Downloader {
    agent: ureq::Agent,
    dir: PathBuf,
}

impl Downloader {
    pub fn new(dir: &Path, timeout: Duration) -> Result<Self, InvoiceError> {
        std::fs::create_dir_all(dir).map_err(|e| InvoiceError::io(dir, e))?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Ok(Self {
            agent,
            dir: dir.to_path_buf(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, InvoiceError> {
        Self::new(&config.download_dir, config.http_timeout)
    }

    /// Fetch one image and save it as `<invoice_id>.<ext>`
    pub fn fetch_invoice(&self, url: &str, invoice_id: &str) -> Result<PathBuf, InvoiceError> {
        check_invoice_id(invoice_id)?;

        let download_err = |reason: String| InvoiceError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| download_err(e.to_string()))?;

        if response.status() != 200 {
            return Err(download_err(format!("HTTP status {}", response.status())));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let ext = extension_for(&content_type);

        let body = response
            .into_body()
            .read_to_vec()
            .map_err(|e| download_err(format!("failed to read body: {}", e)))?;

        let path = self.dir.join(format!("{}.{}", invoice_id, ext));

        // Only complete downloads get the final name
        let mut temp_file = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&self.dir)
            .map_err(|e| InvoiceError::io(&self.dir, e))?;
        temp_file
            .write_all(&body)
            .map_err(|e| InvoiceError::io(temp_file.path(), e))?;
        temp_file
            .persist(&path)
            .map_err(|e| InvoiceError::io(&path, e.error))?;

        tracing::debug!("Saved {} bytes ({}) to {:?}", body.len(), content_type, path);
        Ok(path)
    }

    /// Download every row whose due date is not after `today`.
    ///
    /// Failures are logged per row and do not stop the batch.
    pub fn fetch_rows(&self, rows: &[InvoiceRow], today: NaiveDate) -> DownloadReport {
        let mut report = DownloadReport::default();

        for row in rows {
            tracing::info!(
                "Row {}: invoice {} (due {}) from {}",
                row.index,
                row.invoice_id,
                row.due_date,
                row.url
            );

            if let Err(e) = check_invoice_id(&row.invoice_id) {
                tracing::error!("Skipping row {}: {}", row.index, e);
                report.failed += 1;
                continue;
            }

            let due = match dates::parse_dashed(&row.due_date) {
                Ok(due) => due,
                Err(e) => {
                    tracing::error!("Error processing {}: {}", row.invoice_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            report
                .due_dates
                .insert(row.invoice_id.clone(), row.due_date.clone());

            if due > today {
                tracing::info!("Skipping {} - due {} (future)", row.invoice_id, row.due_date);
                report.skipped_future += 1;
                continue;
            }

            match self.fetch_invoice(row.url.as_str(), &row.invoice_id) {
                Ok(path) => {
                    tracing::info!("Downloaded {:?}", path);
                    report.saved.push(Downloaded {
                        invoice_id: row.invoice_id.clone(),
                        due_date: row.due_date.clone(),
                        path,
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to download image for {}: {}", row.invoice_id, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Fetch `invoices/1.jpg` through `invoices/<count>.jpg` below `base_url`
    pub fn fetch_numbered(&self, base_url: &str, count: u32) -> DownloadReport {
        let mut report = DownloadReport::default();
        let base = base_url.trim_end_matches('/');

        for n in 1..=count {
            let invoice_id = n.to_string();
            let url = format!("{}/invoices/{}.jpg", base, n);

            match self.fetch_invoice(&url, &invoice_id) {
                Ok(path) => {
                    tracing::info!("Downloaded {:?}", path);
                    report
                        .due_dates
                        .insert(invoice_id.clone(), NO_DUE_DATE.to_string());
                    report.saved.push(Downloaded {
                        invoice_id,
                        due_date: NO_DUE_DATE.to_string(),
                        path,
                    });
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

/// Invoice ids become file names, so only `[A-Za-z0-9_-]` is allowed
fn check_invoice_id(invoice_id: &str) -> Result<(), InvoiceError> {
    let valid = !invoice_id.is_empty()
        && invoice_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(InvoiceError::InvalidInvoiceId(invoice_id.to_string()))
    }
}

/// File extension for a response content type; JPEG unless the server says PNG
fn extension_for(content_type: &str) -> &'static str {
    if content_type.contains("image/png") {
        "png"
    } else {
        "jpg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, routing::get, Router};
    use url::Url;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";
    const JPG_BYTES: &[u8] = b"\xff\xd8\xff\xe0fake";

    /// Serve a handful of fixed images on a random local port
    async fn start_server() -> String {
        let app = Router::new()
            .route(
                "/invoices/1.jpg",
                get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], JPG_BYTES) }),
            )
            .route(
                "/invoices/2.jpg",
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn row(base: &str, id: &str, due: &str, path: &str) -> InvoiceRow {
        InvoiceRow {
            index: "1".to_string(),
            invoice_id: id.to_string(),
            due_date: due.to_string(),
            url: Url::parse(base).unwrap().join(path).unwrap(),
        }
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "jpg");
        assert_eq!(extension_for(""), "jpg");
    }

    #[test]
    fn test_check_invoice_id() {
        for id in ["obnsdmkq", "wmd5fv3z", "12", "a_b-C"] {
            assert!(check_invoice_id(id).is_ok(), "{}", id);
        }
        for id in ["", "..", "../escaped", "a/b", "a\\b", "x.jpg", "id with space", "caf\u{e9}"] {
            assert!(
                matches!(check_invoice_id(id), Err(InvoiceError::InvalidInvoiceId(_))),
                "{:?}",
                id
            );
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_rows_rejects_unsafe_ids() {
        let base = start_server().await;
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("invoices");
        let dir_path = downloads.clone();

        let rows = vec![
            row(&base, "../escaped", "25-02-2019", "/invoices/1.jpg"),
            row(&base, "", "25-02-2019", "/invoices/1.jpg"),
            row(&base, "ok", "25-02-2019", "/invoices/1.jpg"),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let report = tokio::task::spawn_blocking(move || {
            let downloader = Downloader::new(&dir_path, Duration::from_secs(5)).unwrap();
            downloader.fetch_rows(&rows, today)
        })
        .await
        .unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.saved.len(), 1);
        assert_eq!(report.saved[0].path, downloads.join("ok.jpg"));
        assert!(!root.path().join("escaped.jpg").exists());
        assert!(!downloads.join(".jpg").exists());
        assert!(!report.due_dates.contains_key("../escaped"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_rows_saves_and_filters() {
        let base = start_server().await;
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();

        let rows = vec![
            row(&base, "past", "25-02-2019", "/invoices/1.jpg"),
            row(&base, "png", "26-02-2019", "/invoices/2.jpg"),
            row(&base, "future", "01-01-2099", "/invoices/1.jpg"),
            row(&base, "missing", "25-02-2019", "/invoices/404.jpg"),
            row(&base, "baddate", "someday", "/invoices/1.jpg"),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let report = tokio::task::spawn_blocking(move || {
            let downloader = Downloader::new(&dir_path, Duration::from_secs(5)).unwrap();
            downloader.fetch_rows(&rows, today)
        })
        .await
        .unwrap();

        let names: Vec<String> = report.saved.iter().map(|d| d.file_name()).collect();
        assert_eq!(names, vec!["past.jpg", "png.png"]);
        assert_eq!(report.skipped_future, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.due_dates.get("future").unwrap(), "01-01-2099");
        assert!(!report.due_dates.contains_key("baddate"));

        assert_eq!(std::fs::read(dir.path().join("past.jpg")).unwrap(), JPG_BYTES);
        assert_eq!(std::fs::read(dir.path().join("png.png")).unwrap(), PNG_BYTES);
        assert!(!dir.path().join("missing.jpg").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_numbered() {
        let base = start_server().await;
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();

        let report = tokio::task::spawn_blocking(move || {
            let downloader = Downloader::new(&dir_path, Duration::from_secs(5)).unwrap();
            downloader.fetch_numbered(&base, 3)
        })
        .await
        .unwrap();

        assert_eq!(report.saved.len(), 2);
        assert_eq!(report.failed, 1);
        assert!(report.saved.iter().all(|d| d.due_date == NO_DUE_DATE));
        assert!(dir.path().join("2.png").exists());
    }
}
