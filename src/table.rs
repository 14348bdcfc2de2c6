//! Parsing of the rendered invoice table
//!
//! The table is built client-side, so these functions operate on the page
//! source taken from the live browser session rather than on the raw HTTP body.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#tableSandbox tbody tr").unwrap());
static CELL_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("td").unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static PAGE_BUTTON_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#tableSandbox_paginate a.paginate_button").unwrap());

/// One entry of the source table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRow {
    pub index: String,
    pub invoice_id: String,
    /// As shown in the table, `DD-MM-YYYY`
    pub due_date: String,
    pub url: Url,
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Extract invoice rows from the page source, resolving links against `base`.
pub fn parse_rows(html: &str, base: &Url) -> Vec<InvoiceRow> {
    let document = Html::parse_document(html);
    let mut rows = Vec::new();

    for (i, tr) in document.select(&ROW_SELECTOR).enumerate() {
        let cells: Vec<ElementRef<'_>> = tr.select(&CELL_SELECTOR).collect();
        if cells.len() < 4 {
            tracing::warn!("Skipping table row {} (only {} columns)", i + 1, cells.len());
            continue;
        }

        let invoice_id = cell_text(&cells[1]);
        let href = cells[3]
            .select(&LINK_SELECTOR)
            .next()
            .and_then(|a| a.value().attr("href"));

        let url = match href.map(|h| base.join(h.trim())) {
            Some(Ok(url)) => url,
            Some(Err(e)) => {
                tracing::warn!("Skipping {}: bad download link: {}", invoice_id, e);
                continue;
            }
            None => {
                tracing::warn!("Skipping {}: no download link", invoice_id);
                continue;
            }
        };

        rows.push(InvoiceRow {
            index: cell_text(&cells[0]),
            invoice_id,
            due_date: cell_text(&cells[2]),
            url,
        });
    }

    rows
}

/// Number of numbered pagination buttons; 0 when the table has no pager.
pub fn count_pages(html: &str) -> usize {
    let document = Html::parse_document(html);
    document
        .select(&PAGE_BUTTON_SELECTOR)
        .map(|a| cell_text(&a))
        .filter(|t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))
        .count()
}
