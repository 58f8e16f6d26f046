use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use jobfeed_core::{JobType, Location, RawCandidate, SalaryRange, SourceConfig, Vendor};
use jobfeed_storage::{HttpRequest, HttpTransport};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use url::Url;

use crate::{fetch_page, non_empty, required, settings, AdapterContext, AdapterError, FetchedPage, SourceAdapter};

const SEARCH_URL: &str = "https://data.usajobs.gov/api/search";
const HOST: &str = "data.usajobs.gov";
const ANNUAL_RATE: &str = "PA";

#[derive(Debug, Clone, Default, Deserialize)]
struct UsajobsSettings {
    api_key: Option<String>,
    user_agent_email: Option<String>,
    keyword: Option<String>,
    location: Option<String>,
    days_posted: Option<u32>,
    results_per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchEnvelope {
    search_result: SearchResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResult {
    #[serde(default)]
    search_result_items: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchItem {
    matched_object_id: String,
    matched_object_descriptor: Descriptor,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Descriptor {
    position_title: Option<String>,
    #[serde(rename = "PositionURI")]
    position_uri: Option<String>,
    organization_name: Option<String>,
    #[serde(default)]
    position_location: Vec<PositionLocation>,
    #[serde(default)]
    position_remuneration: Vec<Remuneration>,
    #[serde(default)]
    position_schedule: Vec<Schedule>,
    publication_start_date: Option<String>,
    application_close_date: Option<String>,
    user_area: Option<UserArea>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PositionLocation {
    city_name: Option<String>,
    country_sub_division_code: Option<String>,
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Remuneration {
    minimum_range: Option<String>,
    maximum_range: Option<String>,
    rate_interval_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Schedule {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UserArea {
    details: Option<Details>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Details {
    job_summary: Option<String>,
}

/// USAJOBS timestamps carry no offset and are treated as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn salary(pay: Option<&Remuneration>) -> SalaryRange {
    let Some(pay) = pay.filter(|p| p.rate_interval_code.as_deref() == Some(ANNUAL_RATE)) else {
        return SalaryRange::default();
    };
    let amount = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<f64>().ok());
    SalaryRange {
        min: amount(&pay.minimum_range),
        max: amount(&pay.maximum_range),
    }
}

fn job_type(schedule: Option<&str>) -> Option<JobType> {
    let schedule = schedule?.to_ascii_lowercase();
    if schedule.contains("full") {
        Some(JobType::FullTime)
    } else if schedule.contains("part") {
        Some(JobType::PartTime)
    } else if schedule.contains("intermittent") || schedule.contains("seasonal") {
        Some(JobType::Temporary)
    } else {
        None
    }
}

/// `CityName` is "City, State"; only the city part is kept.
fn location(loc: Option<&PositionLocation>) -> Location {
    let Some(loc) = loc else {
        return Location::default();
    };
    Location {
        city: loc
            .city_name
            .as_deref()
            .and_then(|c| c.split(',').next())
            .and_then(|c| non_empty(Some(c.to_string()))),
        state: non_empty(loc.country_sub_division_code.clone()),
        country: non_empty(loc.country_code.clone()),
    }
}

fn candidate(value: JsonValue) -> Option<RawCandidate> {
    let item: SearchItem = serde_json::from_value(value.clone()).ok()?;
    let desc = item.matched_object_descriptor;
    let external_id = non_empty(Some(item.matched_object_id))?;
    let source_url = non_empty(desc.position_uri)?;
    let title = non_empty(desc.position_title)?;

    let schedule = desc.position_schedule.first().and_then(|s| s.name.clone());
    let mut candidate = RawCandidate::new(external_id, source_url, title);
    candidate.description = desc
        .user_area
        .and_then(|u| u.details)
        .and_then(|d| non_empty(d.job_summary));
    candidate.company_name = non_empty(desc.organization_name);
    candidate.location = location(desc.position_location.first());
    candidate.salary = salary(desc.position_remuneration.first());
    candidate.job_type = job_type(schedule.as_deref());
    candidate.job_type_text = schedule;
    candidate.posted_at = desc.publication_start_date.as_deref().and_then(parse_timestamp);
    candidate.expires_at = desc.application_close_date.as_deref().and_then(parse_timestamp);
    candidate.raw = value;
    Some(candidate)
}

/// USAJOBS search API (JSON, `Authorization-Key` header auth).
#[derive(Debug, Clone, Copy, Default)]
pub struct UsajobsAdapter;

#[async_trait]
impl SourceAdapter for UsajobsAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Usajobs
    }

    async fn fetch_listing(
        &self,
        http: &dyn HttpTransport,
        ctx: &AdapterContext,
        source: &SourceConfig,
    ) -> Result<Vec<FetchedPage>, AdapterError> {
        let cfg: UsajobsSettings = settings(source)?;
        let api_key = required(cfg.api_key.as_deref(), "api key")?;
        let email = required(cfg.user_agent_email.as_deref(), "user agent email")?;

        let mut params = vec![("ResultsPerPage", cfg.results_per_page.unwrap_or(100).to_string())];
        if let Some(keyword) = non_empty(cfg.keyword) {
            params.push(("Keyword", keyword));
        }
        if let Some(place) = non_empty(cfg.location) {
            params.push(("LocationName", place));
        }
        if let Some(days) = cfg.days_posted {
            params.push(("DatePosted", days.to_string()));
        }
        let url = Url::parse_with_params(SEARCH_URL, &params)
            .map_err(|e| AdapterError::Config(format!("invalid usajobs query: {e}")))?;

        let request = HttpRequest::get(url.as_str())
            .header("Host", HOST)
            .header("User-Agent", email)
            .header("Authorization-Key", api_key);
        Ok(vec![fetch_page(http, Vendor::Usajobs, ctx, source, request).await?])
    }

    fn parse_listing(&self, pages: &[FetchedPage]) -> Result<Vec<RawCandidate>, AdapterError> {
        let mut out = Vec::new();
        for page in pages {
            let envelope: SearchEnvelope = serde_json::from_slice(&page.body).map_err(|e| AdapterError::Parse {
                vendor: Vendor::Usajobs,
                message: e.to_string(),
            })?;
            out.extend(
                envelope
                    .search_result
                    .search_result_items
                    .into_iter()
                    .filter_map(candidate),
            );
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
    fn maps_descriptor_fields() {
        let candidates = UsajobsAdapter.parse_listing(&[page(fixture("usajobs/search.json"))]).unwrap();
        assert_eq!(candidates.len(), 2);

        let it = &candidates[0];
        assert_eq!(it.external_id, "781234500");
        assert_eq!(it.source_url, "https://www.usajobs.gov/job/781234500");
        assert_eq!(it.company_name.as_deref(), Some("Department of Examples"));
        assert_eq!(it.location.city.as_deref(), Some("Denver"));
        assert_eq!(it.location.state.as_deref(), Some("Colorado"));
        assert_eq!(it.salary.min, Some(86962.0));
        assert_eq!(it.salary.max, Some(113047.0));
        assert_eq!(it.job_type, Some(JobType::FullTime));
        assert_eq!(
            it.expires_at.map(|d| d.format("%Y-%m-%d").to_string()).as_deref(),
            Some("2026-03-20")
        );
        assert!(it.description.as_deref().unwrap().starts_with("Maintain agency systems"));
    }

    #[test]
    fn hourly_pay_is_not_annualized() {
        let candidates = UsajobsAdapter.parse_listing(&[page(fixture("usajobs/search.json"))]).unwrap();
        let guide = &candidates[1];
        assert!(guide.salary.is_empty());
        assert_eq!(guide.job_type, Some(JobType::PartTime));
        assert!(guide.expires_at.is_none());
    }

    #[tokio::test]
    async fn sends_auth_headers() {
        let http = CannedTransport::with(SEARCH_URL, fixture("usajobs/search.json"));
        let src = source(
            Vendor::Usajobs,
            json!({"api_key": "secret", "user_agent_email": "ops@example.com", "keyword": "it specialist"}),
        );
        UsajobsAdapter.fetch_candidates(&http, &ctx(), &src).await.unwrap();

        let requests = http.requests.lock().unwrap();
        let headers = &requests[0].headers;
        assert!(headers.contains(&("Authorization-Key".to_string(), "secret".to_string())));
        assert!(headers.contains(&("User-Agent".to_string(), "ops@example.com".to_string())));
        assert!(requests[0].url.contains("Keyword=it+specialist"));
    }

    #[tokio::test]
    async fn user_agent_email_is_required() {
        let http = CannedTransport::default();
        let err = UsajobsAdapter
            .fetch_listing(&http, &ctx(), &source(Vendor::Usajobs, json!({"api_key": "secret"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "missing user agent email");
    }
}
