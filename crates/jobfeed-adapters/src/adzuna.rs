use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_core::{JobType, Location, RawCandidate, SalaryRange, SourceConfig, Vendor};
use jobfeed_storage::{HttpRequest, HttpTransport};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;
use url::Url;

use crate::{fetch_page, non_empty, required, settings, AdapterContext, AdapterError, FetchedPage, SourceAdapter};

const API_BASE: &str = "https://api.adzuna.com/v1/api/jobs";
const DEFAULT_COUNTRY: &str = "us";
const DEFAULT_RESULTS_PER_PAGE: u32 = 50;

#[derive(Debug, Clone, Default, Deserialize)]
struct AdzunaSettings {
    app_id: Option<String>,
    app_key: Option<String>,
    country: Option<String>,
    query: Option<String>,
    location: Option<String>,
    max_days_old: Option<u32>,
    results_per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct AdzunaJob {
    id: JsonValue,
    title: Option<String>,
    description: Option<String>,
    redirect_url: Option<String>,
    created: Option<String>,
    company: Option<AdzunaCompany>,
    location: Option<AdzunaLocation>,
    salary_min: Option<f64>,
    salary_max: Option<f64>,
    contract_time: Option<String>,
    contract_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaCompany {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdzunaLocation {
    #[serde(default)]
    area: Vec<String>,
}

fn search_url(cfg: &AdzunaSettings, app_id: &str, app_key: &str) -> Result<Url, AdapterError> {
    let country = non_empty(cfg.country.clone()).unwrap_or_else(|| DEFAULT_COUNTRY.to_string());
    let results_per_page = cfg.results_per_page.unwrap_or(DEFAULT_RESULTS_PER_PAGE).to_string();

    let mut params = vec![
        ("app_id", app_id.to_string()),
        ("app_key", app_key.to_string()),
        ("results_per_page", results_per_page),
        ("content-type", "application/json".to_string()),
    ];
    if let Some(what) = non_empty(cfg.query.clone()) {
        params.push(("what", what));
    }
    if let Some(place) = non_empty(cfg.location.clone()) {
        params.push(("where", place));
    }
    if let Some(days) = cfg.max_days_old {
        params.push(("max_days_old", days.to_string()));
    }

    Url::parse_with_params(&format!("{API_BASE}/{}/search/1", country.to_ascii_lowercase()), &params)
        .map_err(|e| AdapterError::Config(format!("invalid adzuna country {country}: {e}")))
}

fn external_id(id: &JsonValue) -> Option<String> {
    match id {
        JsonValue::String(s) => non_empty(Some(s.clone())),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn job_type(contract_time: Option<&str>, contract_type: Option<&str>) -> Option<JobType> {
    if contract_type == Some("contract") {
        return Some(JobType::Contract);
    }
    match contract_time {
        Some("full_time") => Some(JobType::FullTime),
        Some("part_time") => Some(JobType::PartTime),
        _ => None,
    }
}

/// `area` runs country, state, county, city; shorter lists stop early.
fn location(area: &[String]) -> Location {
    Location {
        country: area.first().cloned(),
        state: area.get(1).cloned(),
        city: if area.len() > 2 { area.last().cloned() } else { None },
    }
}

fn candidate(value: JsonValue) -> Option<RawCandidate> {
    let job: AdzunaJob = serde_json::from_value(value.clone()).ok()?;
    let external_id = external_id(&job.id)?;
    let source_url = non_empty(job.redirect_url)?;
    let title = non_empty(job.title)?;

    let mut candidate = RawCandidate::new(external_id, source_url, title);
    candidate.description = non_empty(job.description);
    candidate.company_name = job.company.and_then(|c| non_empty(c.display_name));
    candidate.location = job.location.map(|l| location(&l.area)).unwrap_or_default();
    candidate.salary = SalaryRange {
        min: job.salary_min,
        max: job.salary_max,
    };
    candidate.job_type = job_type(job.contract_time.as_deref(), job.contract_type.as_deref());
    candidate.job_type_text = [job.contract_time, job.contract_type]
        .into_iter()
        .flatten()
        .reduce(|a, b| format!("{a} {b}"));
    candidate.posted_at = job
        .created
        .as_deref()
        .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
        .map(|dt| dt.with_timezone(&Utc));
    candidate.raw = value;
    Some(candidate)
}

/// Adzuna job search API (JSON, app id/key in query string).
#[derive(Debug, Clone, Copy, Default)]
pub struct AdzunaAdapter;

#[async_trait]
impl SourceAdapter for AdzunaAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Adzuna
    }

    async fn fetch_listing(
        &self,
        http: &dyn HttpTransport,
        ctx: &AdapterContext,
        source: &SourceConfig,
    ) -> Result<Vec<FetchedPage>, AdapterError> {
        let cfg: AdzunaSettings = settings(source)?;
        let app_id = required(cfg.app_id.as_deref(), "app id")?;
        let app_key = required(cfg.app_key.as_deref(), "app key")?;
        let url = search_url(&cfg, &app_id, &app_key)?;
        let request = HttpRequest::get(url.as_str()).header("Accept", "application/json");
        Ok(vec![fetch_page(http, Vendor::Adzuna, ctx, source, request).await?])
    }

    fn parse_listing(&self, pages: &[FetchedPage]) -> Result<Vec<RawCandidate>, AdapterError> {
        let mut out = Vec::new();
        for page in pages {
            let response: SearchResponse = serde_json::from_slice(&page.body).map_err(|e| AdapterError::Parse {
                vendor: Vendor::Adzuna,
                message: e.to_string(),
            })?;
            let total = response.results.len();
            let before = out.len();
            out.extend(response.results.into_iter().filter_map(candidate));
            debug!(results = total, kept = out.len() - before, "parsed adzuna page");
        }
        Ok(out)
    }
}
