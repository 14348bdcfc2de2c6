use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod browser;
mod cache;
mod config;
mod dates;
mod download;
mod engine;
mod engines;
mod error;
mod extract;
mod manifest;
mod output;
mod preprocess;
mod table;
mod workflow;

#[derive(Parser, Debug)]
#[command(name = "invoice-ocr")]
#[command(about = "Scrape, download and OCR invoices from the RPA Challenge OCR site")]
#[command(version)]
pub struct Args {
    /// Root URL of the invoice table page
    #[arg(
        long,
        env = "INVOICE_BASE_URL",
        default_value = "https://rpachallengeocr.azurewebsites.net/",
        global = true
    )]
    pub base_url: String,

    /// WebDriver endpoint (e.g. a running chromedriver)
    #[arg(
        long,
        env = "WEBDRIVER_URL",
        default_value = "http://localhost:4444",
        global = true
    )]
    pub webdriver_url: String,

    /// Directory that downloaded invoice images are written to
    #[arg(long, env = "INVOICE_DOWNLOAD_DIR", default_value = "invoices", global = true)]
    pub download_dir: PathBuf,

    /// Output CSV with the extracted fields
    #[arg(
        long,
        env = "INVOICE_OUTPUT",
        default_value = "extracted_invoices.csv",
        global = true
    )]
    pub output: PathBuf,

    /// OCR engine to use ("ocrs", "tesseract"); defaults to the first compiled engine
    #[arg(long, env = "OCR_ENGINE", global = true)]
    pub engine: Option<String>,

    /// Language for the tesseract engine (e.g., "eng", "deu", "fra")
    #[arg(long, env = "OCR_LANGUAGE", default_value = "eng", global = true)]
    pub language: String,

    /// Path to tessdata directory (downloaded to the cache dir if not set)
    #[arg(long, env = "TESSDATA_PREFIX", global = true)]
    pub tessdata_path: Option<PathBuf>,

    /// Image preprocessing preset applied before OCR
    #[arg(long, value_enum, default_value_t = preprocess::Preset::Default, global = true)]
    pub preprocess: preprocess::Preset,

    /// Maximum time to wait for table elements to appear
    #[arg(long, env = "INVOICE_WAIT_TIMEOUT", default_value = "10", global = true)]
    pub wait_timeout_secs: u64,

    /// Pause after switching table pages
    #[arg(long, default_value = "2000", global = true)]
    pub page_settle_ms: u64,

    /// Timeout for each image download
    #[arg(long, default_value = "30", global = true)]
    pub http_timeout_secs: u64,

    /// Date used as "today" when filtering future invoices (YYYY-MM-DD)
    #[arg(long, global = true)]
    pub today: Option<NaiveDate>,

    /// Show the browser window instead of running headless
    #[arg(long, global = true)]
    pub headed: bool,

    /// Save raw OCR text next to each image as <id>.txt
    #[arg(long, global = true)]
    pub keep_text: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scrape the table, download images, OCR them and write the CSV (default)
    Run,
    /// Scrape the table and download images only
    Download {
        /// Skip the browser and fetch invoices/1.jpg..=N.jpg directly
        #[arg(long)]
        numbered: Option<u32>,
    },
    /// OCR previously downloaded images and write the CSV
    Extract,
    /// Print the fields found in an OCR text dump (reads stdin without a path)
    Fields { path: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so `fields` can print JSON on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = args.command.clone().unwrap_or(Command::Run);
    let config = config::Config::from(args);

    tracing::debug!("invoice-ocr v{} starting", env!("CARGO_PKG_VERSION"));

    match command {
        Command::Run => workflow::run(config).await,
        Command::Download { numbered } => workflow::download(config, numbered).await,
        Command::Extract => workflow::extract(config).await,
        Command::Fields { path } => workflow::fields(path.as_deref()),
    }
}
