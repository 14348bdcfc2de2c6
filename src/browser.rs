//! WebDriver session that walks the paginated invoice table

use crate::config::Config;
use crate::error::InvoiceError;
use crate::table::{self, InvoiceRow};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use url::Url;

const ROWS_CSS: &str = "#tableSandbox tbody tr";
const PAGE_BUTTONS_CSS: &str = "#tableSandbox_paginate a.paginate_button";
const NEXT_BUTTON_CSS: &str = "#tableSandbox_next";

pub struct Browser {
    client: Client,
    base_url: Url,
    config: Config,
}

impl Browser {
    /// Start a Chrome session through the configured WebDriver endpoint
    pub async fn launch(config: &Config) -> Result<Self, InvoiceError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| InvoiceError::Browser(format!("invalid base URL: {}", e)))?;

        let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
        if config.headless {
            args.push("--headless");
        }

        let mut caps = serde_json::Map::new();
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        tracing::info!("Connecting to WebDriver at {}", config.webdriver_url);
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&config.webdriver_url)
            .await?;

        Ok(Self {
            client,
            base_url,
            config: config.clone(),
        })
    }

    /// Visit every table page and append its rows to `rows`.
    ///
    /// Rows from pages visited before a failure stay in `rows`.
    pub async fn collect_rows(&self, rows: &mut Vec<InvoiceRow>) -> Result<(), InvoiceError> {
        tracing::info!("Navigating to {}", self.base_url);
        self.client.goto(self.base_url.as_str()).await?;

        self.client
            .wait()
            .at_most(self.config.wait_timeout)
            .for_element(Locator::Css(PAGE_BUTTONS_CSS))
            .await?;

        // A table without numbered buttons still has its first page loaded
        let total_pages = table::count_pages(&self.client.source().await?).max(1);
        tracing::info!("Found {} pages", total_pages);

        for page in 1..=total_pages {
            self.client
                .wait()
                .at_most(self.config.wait_timeout)
                .for_element(Locator::Css(ROWS_CSS))
                .await?;

            let found = table::parse_rows(&self.client.source().await?, &self.base_url);
            tracing::info!("Found {} rows on page {}", found.len(), page);
            rows.extend(found);

            if page < total_pages {
                self.goto_page(page + 1).await?;
                tokio::time::sleep(self.config.page_settle).await;
            }
        }

        Ok(())
    }

    async fn goto_page(&self, page: usize) -> Result<(), InvoiceError> {
        let xpath = format!(
            "//div[@id='tableSandbox_paginate']//a[contains(@class, 'paginate_button') and text()='{}']",
            page
        );

        let numbered = self
            .client
            .wait()
            .at_most(self.config.wait_timeout)
            .for_element(Locator::XPath(&xpath))
            .await;

        let button = match numbered {
            Ok(button) => button,
            Err(e) => {
                tracing::debug!("No button for page {} ({}), using Next", page, e);
                self.client
                    .wait()
                    .at_most(self.config.wait_timeout)
                    .for_element(Locator::Css(NEXT_BUTTON_CSS))
                    .await?
            }
        };

        button.click().await?;
        Ok(())
    }

    pub async fn quit(self) {
        if let Err(e) = self.client.close().await {
            tracing::warn!("Failed to close browser session: {}", e);
        }
    }
}

/// Scrape all table rows, always tearing the session down.
///
/// Navigation errors are logged; whatever was collected before is returned.
pub async fn scrape(config: &Config) -> Result<Vec<InvoiceRow>, InvoiceError> {
    let browser = Browser::launch(config).await?;
    let mut rows = Vec::new();

    if let Err(e) = browser.collect_rows(&mut rows).await {
        tracing::error!("Scraping stopped early: {}", e);
    }

    browser.quit().await;
    tracing::info!("Collected {} invoice rows", rows.len());
    Ok(rows)
}
