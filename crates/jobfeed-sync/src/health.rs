//! Live feed validation and the consecutive-failure circuit breaker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobfeed_adapters::{feed_url_for, parse_feed};
use jobfeed_core::{SourceConfig, SourceType, SyncLog, SyncStatus, Vendor};
use jobfeed_storage::{HttpRequest, HttpTransport, IngestionStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::SyncError;

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive failed runs that deactivate a feed.
    pub failure_threshold: u32,
    /// Sync logs scanned per source.
    pub log_window: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            log_window: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedValidation {
    pub ok: bool,
    pub item_count: usize,
    pub feed_title: Option<String>,
    pub error: Option<String>,
}

impl FeedValidation {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            item_count: 0,
            feed_title: None,
            error: Some(error.into()),
        }
    }
}

/// Fetches and parses `url` now. Feeds without items are not ok.
pub async fn validate_feed(http: &dyn HttpTransport, source_key: &str, url: &str) -> FeedValidation {
    let request = HttpRequest::get(url).header("Accept", FEED_ACCEPT);
    let response = match http.fetch(source_key, &request).await {
        Ok(response) => response,
        Err(err) => return FeedValidation::failed(err.to_string()),
    };
    let feed = parse_feed(&response.text());
    if feed.items.is_empty() {
        return FeedValidation {
            feed_title: feed.title,
            ..FeedValidation::failed("feed contains no items")
        };
    }
    FeedValidation {
        ok: true,
        item_count: feed.items.len(),
        feed_title: feed.title,
        error: None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedHealth {
    pub source_id: Uuid,
    pub source_name: String,
    pub feed_url: Option<String>,
    pub is_active: bool,
    pub healthy: bool,
    pub validation: FeedValidation,
    pub consecutive_failures: u32,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Set when this check switched the source off.
    pub deactivated: bool,
}

/// Failed runs counted newest first. Runs still in progress are skipped;
/// any other status ends the streak.
pub fn consecutive_failures(logs: &[SyncLog]) -> u32 {
    let mut count = 0;
    for log in logs {
        match log.status {
            SyncStatus::Failed => count += 1,
            SyncStatus::Running => continue,
            SyncStatus::Success | SyncStatus::Partial => break,
        }
    }
    count
}

pub struct FeedHealthMonitor {
    store: Arc<dyn IngestionStore>,
    http: Arc<dyn HttpTransport>,
    config: HealthConfig,
}

impl FeedHealthMonitor {
    pub fn new(store: Arc<dyn IngestionStore>, http: Arc<dyn HttpTransport>, config: HealthConfig) -> Self {
        Self { store, http, config }
    }

    /// Health of every configured RSS source. Read-only apart from the
    /// validation fetches.
    pub async fn report(&self) -> Result<Vec<FeedHealth>, StoreError> {
        let mut out = Vec::new();
        for source in self.rss_sources().await? {
            out.push(self.check(&source).await?);
        }
        Ok(out)
    }

    /// Checks active RSS sources and deactivates the ones at or past the
    /// failure threshold.
    pub async fn enforce(&self) -> Result<Vec<FeedHealth>, StoreError> {
        let mut out = Vec::new();
        for source in self.rss_sources().await?.into_iter().filter(|s| s.is_active) {
            let mut health = self.check(&source).await?;
            if health.consecutive_failures >= self.config.failure_threshold {
                self.store.set_source_active(source.id, false).await?;
                warn!(
                    source_id = %source.id,
                    source = %source.name,
                    failures = health.consecutive_failures,
                    "deactivating feed after consecutive failed syncs"
                );
                health.is_active = false;
                health.deactivated = true;
            }
            out.push(health);
        }
        info!(
            checked = out.len(),
            deactivated = out.iter().filter(|h| h.deactivated).count(),
            "feed health check finished"
        );
        Ok(out)
    }

    async fn rss_sources(&self) -> Result<Vec<SourceConfig>, StoreError> {
        Ok(self
            .store
            .list_sources()
            .await?
            .into_iter()
            .filter(|s| s.vendor == Vendor::Rss)
            .collect())
    }

    async fn check(&self, source: &SourceConfig) -> Result<FeedHealth, StoreError> {
        let (feed_url, validation) = match feed_url_for(source) {
            Ok(url) => {
                let validation = validate_feed(self.http.as_ref(), &source.id.to_string(), &url).await;
                (Some(url), validation)
            }
            Err(err) => (None, FeedValidation::failed(err.to_string())),
        };
        let logs = self
            .store
            .recent_sync_logs(source.id, self.config.log_window)
            .await?;
        let failures = consecutive_failures(&logs);
        Ok(FeedHealth {
            source_id: source.id,
            source_name: source.name.clone(),
            feed_url,
            is_active: source.is_active,
            healthy: validation.ok && failures < self.config.failure_threshold,
            validation,
            consecutive_failures: failures,
            last_synced_at: source.last_synced_at,
            deactivated: false,
        })
    }
}

/// Validates `url` and registers it as an active RSS source.
pub async fn register_feed(
    store: &dyn IngestionStore,
    http: &dyn HttpTransport,
    name: &str,
    url: &str,
) -> Result<SourceConfig, SyncError> {
    let name = name.trim();
    if store.find_source_by_name(name).await?.is_some() {
        return Err(SyncError::SourceExists(name.to_string()));
    }
    let id = Uuid::new_v4();
    let validation = validate_feed(http, &id.to_string(), url).await;
    if !validation.ok {
        return Err(SyncError::InvalidFeed {
            url: url.to_string(),
            reason: validation.error.unwrap_or_else(|| "unknown error".into()),
        });
    }
    let source = SourceConfig {
        id,
        name: name.to_string(),
        source_type: SourceType::Rss,
        vendor: Vendor::Rss,
        is_active: true,
        config: json!({ "feed_url": url }),
        sync_frequency_minutes: None,
        rate_limit_per_minute: None,
        last_synced_at: None,
    };
    store.save_source(&source).await?;
    info!(source_id = %source.id, source = %source.name, items = validation.item_count, "registered feed");
    Ok(source)
}
