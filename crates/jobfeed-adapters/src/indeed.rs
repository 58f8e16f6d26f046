use async_trait::async_trait;
use jobfeed_core::{Location, RawCandidate, SourceConfig, Vendor};
use jobfeed_storage::{HttpRequest, HttpTransport};
use serde_json::{json, Map, Value as JsonValue};
use url::Url;

use crate::feed::{child_text, elements, parse_date, strip_html};
use crate::{fetch_page, non_empty, required, settings, AdapterContext, AdapterError, FetchedPage, SourceAdapter};

const SEARCH_URL: &str = "https://api.indeed.com/ads/apisearch";
const FIELDS: &[&str] = &[
    "jobkey", "jobtitle", "company", "city", "state", "country", "snippet", "url", "date", "expired",
];

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct IndeedSettings {
    publisher_id: Option<String>,
    query: Option<String>,
    location: Option<String>,
    days: Option<u32>,
    limit: Option<u32>,
}

fn candidate(block: &str) -> Option<RawCandidate> {
    let field = |name: &str| child_text(block, &[name]);
    if field("expired").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return None;
    }

    let external_id = field("jobkey")?;
    let source_url = field("url")?;
    let title = field("jobtitle")?;

    let raw: Map<String, JsonValue> = FIELDS
        .iter()
        .filter_map(|name| field(name).map(|v| (name.to_string(), json!(v))))
        .collect();

    let mut candidate = RawCandidate::new(external_id, source_url, title);
    candidate.description = field("snippet").map(|s| strip_html(&s)).and_then(|s| non_empty(Some(s)));
    candidate.company_name = field("company");
    candidate.location = Location {
        city: field("city"),
        state: field("state"),
        country: field("country"),
    };
    candidate.posted_at = field("date").as_deref().and_then(parse_date);
    candidate.raw = JsonValue::Object(raw);
    Some(candidate)
}

/// Indeed publisher search API (XML dialect).
#[derive(Debug, Clone, Copy, Default)]
pub struct IndeedPublisherAdapter;

#[async_trait]
impl SourceAdapter for IndeedPublisherAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::IndeedPublisher
    }

    async fn fetch_listing(
        &self,
        http: &dyn HttpTransport,
        ctx: &AdapterContext,
        source: &SourceConfig,
    ) -> Result<Vec<FetchedPage>, AdapterError> {
        let cfg: IndeedSettings = settings(source)?;
        let publisher = required(cfg.publisher_id.as_deref(), "publisher id")?;

        let mut params = vec![
            ("publisher", publisher),
            ("format", "xml".to_string()),
            ("v", "2".to_string()),
            ("limit", cfg.limit.unwrap_or(25).to_string()),
        ];
        if let Some(q) = non_empty(cfg.query) {
            params.push(("q", q));
        }
        if let Some(l) = non_empty(cfg.location) {
            params.push(("l", l));
        }
        if let Some(days) = cfg.days {
            params.push(("fromage", days.to_string()));
        }
        let url = Url::parse_with_params(SEARCH_URL, &params)
            .map_err(|e| AdapterError::Config(format!("invalid indeed query: {e}")))?;

        let request = HttpRequest::get(url.as_str()).header("Accept", "application/xml");
        Ok(vec![fetch_page(http, Vendor::IndeedPublisher, ctx, source, request).await?])
    }

    fn parse_listing(&self, pages: &[FetchedPage]) -> Result<Vec<RawCandidate>, AdapterError> {
        Ok(pages
            .iter()
            .flat_map(|page| {
                let text = page.text();
                elements(&text, "result")
                    .into_iter()
                    .filter_map(|el| candidate(el.inner))
                    .collect::<Vec<_>>()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn expired_results_are_skipped() {
        let candidates = IndeedPublisherAdapter
            .parse_listing(&[page(fixture("indeed/search.xml"))])
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.external_id != "old999"));

        let first = &candidates[0];
        assert_eq!(first.external_id, "abc123");
        assert_eq!(first.title, "Rust Developer");
        assert_eq!(first.company_name.as_deref(), Some("Hooli"));
        assert_eq!(first.location.city.as_deref(), Some("San Francisco"));
        assert_eq!(first.description.as_deref(), Some("Work on  Rust  services. $150,000 - $190,000."));
        assert!(first.posted_at.is_some());
        assert_eq!(first.raw["jobkey"], "abc123");
    }

    #[tokio::test]
    async fn publisher_id_is_required() {
        let http = CannedTransport::default();
        let err = IndeedPublisherAdapter
            .fetch_listing(&http, &ctx(), &source(Vendor::IndeedPublisher, serde_json::json!({"query": "rust"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "missing publisher id");
    }
}
