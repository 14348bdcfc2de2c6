use crate::preprocess::Preset;
use crate::Args;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

/// File name of the download ledger inside the download directory
pub const MANIFEST_FILE: &str = "invoices.csv";

/// Run configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub webdriver_url: String,
    pub download_dir: PathBuf,
    pub output: PathBuf,
    pub engine: Option<String>,
    pub language: String,
    pub tessdata_path: Option<PathBuf>,
    pub preset: Preset,
    pub wait_timeout: Duration,
    pub page_settle: Duration,
    pub http_timeout: Duration,
    pub today: NaiveDate,
    pub headless: bool,
    pub keep_text: bool,
}

impl Config {
    pub fn manifest_path(&self) -> PathBuf {
        self.download_dir.join(MANIFEST_FILE)
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            base_url: args.base_url,
            webdriver_url: args.webdriver_url,
            download_dir: args.download_dir,
            output: args.output,
            engine: args.engine,
            language: args.language,
            tessdata_path: args.tessdata_path,
            preset: args.preprocess,
            wait_timeout: Duration::from_secs(args.wait_timeout_secs),
            page_settle: Duration::from_millis(args.page_settle_ms),
            http_timeout: Duration::from_secs(args.http_timeout_secs),
            today: args
                .today
                .unwrap_or_else(|| chrono::Local::now().date_naive()),
            headless: !args.headed,
            keep_text: args.keep_text,
        }
    }
}

#[cfg(test)]
impl Config {
    /// Configuration pointing at a scratch directory, for unit tests
    pub fn for_tests(dir: &std::path::Path) -> Self {
        Self {
            base_url: "http://127.0.0.1/".to_string(),
            webdriver_url: "http://127.0.0.1:4444".to_string(),
            download_dir: dir.to_path_buf(),
            output: dir.join("out.csv"),
            engine: None,
            language: "eng".to_string(),
            tessdata_path: None,
            preset: Preset::None,
            wait_timeout: Duration::from_secs(1),
            page_settle: Duration::from_millis(0),
            http_timeout: Duration::from_secs(5),
            today: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            headless: true,
            keep_text: false,
        }
    }
}
