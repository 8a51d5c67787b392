pub mod parse;

use std::fmt::Write;

use anyhow::{Context, Result};
use sentinel_core::{config::NewsConfig, error::AdapterError, util::format_datetime};
use time::OffsetDateTime;
use url::Url;

use crate::parse::{NewsItem, parse_front_page};

pub const SOURCE_NAME: &str = "Hacker News";

#[derive(Clone)]
pub struct HackerNews {
    client: reqwest::Client,
    base_url: Url,
}

impl HackerNews {
    pub fn new(config: &NewsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, base_url: config.base_url.clone() })
    }

    pub async fn fetch_page(&self, page: u32, now: OffsetDateTime) -> Result<Vec<NewsItem>> {
        let url = self.base_url.join("news").context("Invalid news URL")?;
        let html = self
            .client
            .get(url)
            .query(&[("p", page)])
            .send()
            .await
            .with_context(|| format!("Failed to fetch page {page}"))?
            .error_for_status()?
            .text()
            .await
            .with_context(|| format!("Failed to read page {page}"))?;
        Ok(parse_front_page(&html, &self.base_url, now))
    }

    /// Fetch every page in `page_from..=page_to` and render the stories as a
    /// markdown digest. Returns `None` when no story was collected.
    pub async fn fetch(
        &self,
        page_from: u32,
        page_to: u32,
        now: OffsetDateTime,
    ) -> Result<Option<String>, AdapterError> {
        let mut items = Vec::new();
        let mut last_error = None;
        let mut fetched = 0;
        for page in page_from..=page_to {
            match self.fetch_page(page, now).await {
                Ok(news) if news.is_empty() => {
                    fetched += 1;
                    tracing::warn!("No news found on page {}", page);
                }
                Ok(news) => {
                    fetched += 1;
                    tracing::debug!("Fetched {} stories from page {}", news.len(), page);
                    items.extend(news);
                }
                Err(e) => {
                    tracing::error!("Failed to fetch news page {}: {:?}", page, e);
                    last_error = Some(e);
                }
            }
        }
        if fetched == 0
            && let Some(e) = last_error
        {
            return Err(AdapterError::Unreachable { unit: SOURCE_NAME.to_string(), cause: e.into() });
        }
        if items.is_empty() {
            tracing::info!("No news items were fetched from pages {}-{}", page_from, page_to);
            return Ok(None);
        }
        tracing::info!("Fetched {} stories from pages {}-{}", items.len(), page_from, page_to);
        Ok(Some(render_digest(&items, now)))
    }
}

pub fn render_digest(items: &[NewsItem], generated_at: OffsetDateTime) -> String {
    let mut out = String::from("# Hacker News Top List\n");
    let _ = writeln!(out, "Generated at: {}\n", format_datetime(generated_at));
    for item in items {
        let _ = writeln!(out, "## {}", item.title);
        let _ = writeln!(out, "Rank: {}\n", item.rank);
        let _ = writeln!(out, "Link: {} ({})\n", item.url, item.source);
        let _ = writeln!(out, "Score: {}\n", item.score.as_deref().unwrap_or("N/A"));
        let _ = writeln!(out, "Author: {}\n", item.author.as_deref().unwrap_or("N/A"));
        let time = item.posted_at.map(format_datetime).unwrap_or_else(|| item.age.clone());
        let _ = writeln!(out, "Time: {}\n", time);
        out.push_str("---\n\n");
    }
    out
}
