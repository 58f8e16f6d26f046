use async_trait::async_trait;
use jobfeed_core::normalize::extract_city_state;
use jobfeed_core::{Location, RawCandidate, SourceConfig, Vendor};
use jobfeed_storage::{HttpRequest, HttpTransport};
use serde::Deserialize;
use tracing::debug;
use url::form_urlencoded::byte_serialize;

use crate::feed::{parse_feed, strip_html, FeedItem};
use crate::{fetch_page, non_empty, required, settings, AdapterContext, AdapterError, FetchedPage, SourceAdapter};

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RssSettings {
    pub feed_url: Option<String>,
    pub query: Option<String>,
    pub location: Option<String>,
}

fn encode(value: Option<&str>) -> String {
    byte_serialize(value.unwrap_or("").trim().as_bytes()).collect()
}

/// Substitutes `{query}` and `{location}` placeholders, URL-encoded.
pub(crate) fn expand_feed_url(template: &str, query: Option<&str>, location: Option<&str>) -> String {
    template
        .replace("{query}", &encode(query))
        .replace("{location}", &encode(location))
}

/// Feed URL of an RSS source with its placeholders expanded.
pub fn feed_url_for(source: &SourceConfig) -> Result<String, AdapterError> {
    let cfg: RssSettings = settings(source)?;
    let template = required(cfg.feed_url.as_deref(), "feed url")?;
    Ok(expand_feed_url(&template, cfg.query.as_deref(), cfg.location.as_deref()))
}

/// Generic RSS/Atom feed source.
#[derive(Debug, Clone, Copy, Default)]
pub struct RssAdapter;

impl RssAdapter {
    fn candidate(item: &FeedItem) -> Option<RawCandidate> {
        let link = non_empty(item.link.clone())?;
        let title = non_empty(item.title.clone())?;
        let external_id = non_empty(item.guid.clone()).unwrap_or_else(|| link.clone());

        let description = item
            .description
            .as_deref()
            .map(strip_html)
            .and_then(|d| non_empty(Some(d)));
        let location = description
            .as_deref()
            .and_then(extract_city_state)
            .map(|(city, state)| Location {
                city: Some(city),
                state: Some(state),
                country: None,
            })
            .unwrap_or_default();

        let mut candidate = RawCandidate::new(external_id, link, title);
        candidate.description = description;
        candidate.company_name = non_empty(item.author.clone());
        candidate.location = location;
        candidate.posted_at = item.published_at;
        candidate.raw = serde_json::to_value(item).unwrap_or_default();
        Some(candidate)
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Rss
    }

    async fn fetch_listing(
        &self,
        http: &dyn HttpTransport,
        ctx: &AdapterContext,
        source: &SourceConfig,
    ) -> Result<Vec<FetchedPage>, AdapterError> {
        let url = feed_url_for(source)?;
        let request = HttpRequest::get(url)
            .header("Accept", "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8");
        Ok(vec![fetch_page(http, Vendor::Rss, ctx, source, request).await?])
    }

    fn parse_listing(&self, pages: &[FetchedPage]) -> Result<Vec<RawCandidate>, AdapterError> {
        let mut out = Vec::new();
        for page in pages {
            let feed = parse_feed(&page.text());
            let total = feed.items.len();
            out.extend(feed.items.iter().filter_map(Self::candidate));
            debug!(url = %page.url, items = total, kept = out.len(), "parsed feed page");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use serde_json::json;

    #[test]
    fn placeholders_are_url_encoded() {
        let url = expand_feed_url(
            "https://jobs.example/rss?q={query}&l={location}",
            Some("rust engineer"),
            Some("Austin, TX"),
        );
        assert_eq!(url, "https://jobs.example/rss?q=rust+engineer&l=Austin%2C+TX");
        assert_eq!(expand_feed_url("https://jobs.example/{query}", None, None), "https://jobs.example/");
    }

    #[test]
    fn items_without_link_are_skipped() {
        let candidates = RssAdapter.parse_listing(&[page(fixture("rss/jobs.xml"))]).unwrap();
        assert_eq!(candidates.len(), 3);

        let first = &candidates[0];
        assert_eq!(first.external_id, "job-1001");
        assert_eq!(first.source_url, "https://jobs.example.com/postings/1001");
        assert_eq!(first.company_name.as_deref(), Some("Acme Corp"));
        assert_eq!(first.location.city.as_deref(), Some("Austin"));
        assert_eq!(first.location.state.as_deref(), Some("TX"));
        assert!(!first.description.as_deref().unwrap().contains("<p>"));

        // No guid: the link doubles as the external id.
        assert_eq!(candidates[2].external_id, "https://jobs.example.com/postings/1003");
    }

    #[test]
    fn atom_feeds_map_the_same_way() {
        let candidates = RssAdapter.parse_listing(&[page(fixture("rss/jobs.atom"))]).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].external_id, "urn:uuid:77");
        assert_eq!(candidates[0].company_name.as_deref(), Some("Globex"));
    }

    #[tokio::test]
    async fn missing_feed_url_is_reported() {
        let http = CannedTransport::default();
        let err = RssAdapter
            .fetch_listing(&http, &ctx(), &source(Vendor::Rss, json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "missing feed url");
        assert!(http.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_uses_expanded_url_and_source_rate_limit() {
        let http = CannedTransport::with("https://jobs.example.com/", fixture("rss/jobs.xml"));
        let src = source(
            Vendor::Rss,
            json!({"feed_url": "https://jobs.example.com/rss?q={query}", "query": "rust"}),
        );
        let candidates = RssAdapter.fetch_candidates(&http, &ctx(), &src).await.unwrap();
        assert_eq!(candidates.len(), 3);

        let requests = http.requests.lock().unwrap();
        assert_eq!(requests[0].url, "https://jobs.example.com/rss?q=rust");
        assert_eq!(requests[0].rate_limit_per_minute, Some(30));
    }
}
