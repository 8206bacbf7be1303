//! Bulk XML feed fetching and parsing for Grantwatch.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use grantwatch_core::FeedRecord;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub const CRATE_NAME: &str = "grantwatch-feed";

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("feed returned http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("feed xml parse failed: {0}")]
    Parse(#[from] quick_xml::DeError),
}

/// Seam between the sync pipeline and the upstream feed. The production
/// implementation fetches over HTTP; tests hand the pipeline a fixed list.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<FeedRecord>, FeedError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Grants")]
struct GrantsXml {
    #[serde(rename = "OpportunityDetail", default)]
    opportunities: Vec<OpportunityXml>,
}

#[derive(Debug, Deserialize)]
struct OpportunityXml {
    #[serde(rename = "OpportunityID")]
    opportunity_id: Option<String>,
    #[serde(rename = "OpportunityTitle")]
    title: Option<String>,
    #[serde(rename = "AgencyName")]
    agency: Option<String>,
    #[serde(rename = "PostDate")]
    post_date: Option<String>,
    #[serde(rename = "CloseDate")]
    close_date: Option<String>,
    #[serde(rename = "Synopsis")]
    synopsis: Option<String>,
    #[serde(rename = "EligibilityDescription")]
    eligibility: Option<String>,
}

/// Feed dates arrive as `MMDDYYYY`; ISO `YYYY-MM-DD` is accepted as a
/// fallback. Anything else is treated as absent rather than failing the run.
pub fn parse_feed_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%m%d%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse one bulk feed document into feed records.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedRecord>, FeedError> {
    let document: GrantsXml = quick_xml::de::from_str(xml)?;
    Ok(document
        .opportunities
        .into_iter()
        .map(|opportunity| FeedRecord {
            external_id: non_empty(opportunity.opportunity_id),
            title: non_empty(opportunity.title),
            agency: non_empty(opportunity.agency),
            post_date: opportunity.post_date.as_deref().and_then(parse_feed_date),
            close_date: opportunity.close_date.as_deref().and_then(parse_feed_date),
            synopsis: non_empty(opportunity.synopsis),
            eligibility: non_empty(opportunity.eligibility),
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct HttpFeedConfig {
    pub url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

/// HTTP-backed feed source. One GET per sync run, no retries; a non-success
/// status or parse failure surfaces as a single run-level error.
#[derive(Debug)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(config: HttpFeedConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent)
            .build()
            .context("building feed http client")?;
        Ok(Self {
            client,
            url: config.url,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<Vec<FeedRecord>, FeedError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(FeedError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }
        let body = response.text().await?;
        let records = parse_feed(&body)?;
        info!(url = %final_url, records = records.len(), "fetched grants feed");
        Ok(records)
    }
}

/// Fixed-content feed source for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticFeedSource {
    records: Vec<FeedRecord>,
}

impl StaticFeedSource {
    pub fn new(records: Vec<FeedRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl FeedSource for StaticFeedSource {
    async fn fetch(&self) -> Result<Vec<FeedRecord>, FeedError> {
        Ok(self.records.clone())
    }
}
