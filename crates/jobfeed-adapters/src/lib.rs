//! Source client adapters: one per vendor dialect, all producing
//! [`RawCandidate`]s for the normalizer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_core::{RawCandidate, SourceConfig, Vendor};
use jobfeed_storage::{FetchError, HttpRequest, HttpTransport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub mod feed;

mod adzuna;
mod indeed;
mod rss;
mod usajobs;

pub use adzuna::AdzunaAdapter;
pub use feed::{discover_feeds, parse_feed, strip_html, DiscoveredFeed, Feed, FeedItem, FeedKind};
pub use indeed::IndeedPublisherAdapter;
pub use rss::{feed_url_for, RssAdapter};
pub use usajobs::UsajobsAdapter;

pub const CRATE_NAME: &str = "jobfeed-adapters";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Missing or malformed source settings. Shown to operators verbatim.
    #[error("{0}")]
    Config(String),
    #[error("{vendor} fetch failed: {source}")]
    Transport {
        vendor: Vendor,
        #[source]
        source: FetchError,
    },
    #[error("{vendor} response could not be parsed: {message}")]
    Parse { vendor: Vendor, message: String },
    #[error("no adapter available for vendor {0}")]
    Unsupported(Vendor),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Performs the upstream requests for one sync run.
    async fn fetch_listing(
        &self,
        http: &dyn HttpTransport,
        ctx: &AdapterContext,
        source: &SourceConfig,
    ) -> Result<Vec<FetchedPage>, AdapterError>;

    /// Maps fetched bodies to candidates. Malformed items are skipped.
    fn parse_listing(&self, pages: &[FetchedPage]) -> Result<Vec<RawCandidate>, AdapterError>;

    async fn fetch_candidates(
        &self,
        http: &dyn HttpTransport,
        ctx: &AdapterContext,
        source: &SourceConfig,
    ) -> Result<Vec<RawCandidate>, AdapterError> {
        let pages = self.fetch_listing(http, ctx, source).await?;
        let candidates = self.parse_listing(&pages)?;
        debug!(
            vendor = %self.vendor(),
            pages = pages.len(),
            candidates = candidates.len(),
            "adapter produced candidates"
        );
        Ok(candidates)
    }
}

pub fn adapter_for_vendor(vendor: Vendor) -> Result<Box<dyn SourceAdapter>, AdapterError> {
    match vendor {
        Vendor::Rss => Ok(Box::new(RssAdapter)),
        Vendor::Adzuna => Ok(Box::new(AdzunaAdapter)),
        Vendor::Usajobs => Ok(Box::new(UsajobsAdapter)),
        Vendor::IndeedPublisher => Ok(Box::new(IndeedPublisherAdapter)),
        Vendor::Scraper => Err(AdapterError::Unsupported(vendor)),
    }
}

/// Deserializes the source's config blob into vendor settings.
pub(crate) fn settings<T>(source: &SourceConfig) -> Result<T, AdapterError>
where
    T: DeserializeOwned + Default,
{
    if source.config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(source.config.clone())
        .map_err(|e| AdapterError::Config(format!("invalid config for source {}: {e}", source.name)))
}

/// Trimmed non-empty setting, or a "missing ..." configuration error.
pub(crate) fn required(value: Option<&str>, what: &str) -> Result<String, AdapterError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| AdapterError::Config(format!("missing {what}")))
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub(crate) async fn fetch_page(
    http: &dyn HttpTransport,
    vendor: Vendor,
    ctx: &AdapterContext,
    source: &SourceConfig,
    request: HttpRequest,
) -> Result<FetchedPage, AdapterError> {
    let request = request.rate_limited(
        source
            .rate_limit_per_minute
            .and_then(|n| u32::try_from(n).ok()),
    );
    let response = http
        .fetch(&source.id.to_string(), &request)
        .await
        .map_err(|source| AdapterError::Transport { vendor, source })?;
    Ok(FetchedPage {
        url: response.final_url,
        content_type: response.content_type,
        body: response.body,
        fetched_at: ctx.fetched_at,
    })
}
