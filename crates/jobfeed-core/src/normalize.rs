//! Text heuristics that turn adapter output into a [`NewPosting`].
//!
//! Every function here is pure and total: a missing signal yields a safe
//! default, never an error. The only failure mode is a candidate that has
//! no usable identity at all (see [`normalize_candidate`]).

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    ExperienceLevel, JobType, Location, NewPosting, RawCandidate, SalaryRange, WorkSetting,
    MAX_DESCRIPTION_CHARS,
};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static INLINE_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\x0B\x0C\u{A0}]+").unwrap());
static EXCESS_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static HYPHEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*-\s*").unwrap());
static SENIOR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:sr\.?|senior)\s+").unwrap());
static JUNIOR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:jr\.?|junior)\s+").unwrap());
static COMPANY_TLD_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(?:com|io|net|org|co|ai|dev|app)$").unwrap());
static COMPANY_THE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^the\s+").unwrap());

static SALARY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\$)?\s*(\d[\d,]*(?:\.\d+)?)\s*(k\b)?\s*(?:-|–|—|to)\s*\$?\s*(\d[\d,]*(?:\.\d+)?)\s*(k\b)?",
    )
    .unwrap()
});
static SALARY_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\$)?\s*(\d[\d,]*(?:\.\d+)?)\s*(k\b)?").unwrap());

static EXECUTIVE_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:executive|chief|c-level|c-suite|vice president|vp|ceo|cto|cfo|coo)\b").unwrap()
});
static LEAD_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:lead|principal|architect)\b").unwrap());
static SENIOR_WORDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(?:senior|sr)\b").unwrap());
static ENTRY_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:entry|junior|jr|associate|intern|internship)\b").unwrap()
});
static YEARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2})\s*\+?\s*(?:-\s*\d{1,2}\s*)?(?:years?|yrs?)\b").unwrap()
});

static INTERNSHIP_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:intern|interns|internship)\b").unwrap());
static PART_TIME_WORDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpart[- ]?time\b").unwrap());
static CONTRACT_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:contract|contractor|freelance|1099)\b").unwrap());
static TEMPORARY_WORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:temporary|temp|seasonal)\b").unwrap());

static CITY_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z.'-]+(?:\s[A-Z][a-zA-Z.'-]+){0,2}),\s*([A-Z]{2})\b").unwrap()
});

fn collapse_whitespace(input: &str) -> String {
    WHITESPACE.replace_all(input.trim(), " ").into_owned()
}

pub fn normalize_title(title: &str) -> String {
    let collapsed = collapse_whitespace(title);
    let spaced = HYPHEN.replace_all(&collapsed, " - ");
    let senior = SENIOR_PREFIX.replace(&spaced, "Senior ");
    let junior = JUNIOR_PREFIX.replace(&senior, "Junior ");
    junior.trim().to_string()
}

pub fn normalize_company_name(name: &str) -> String {
    let collapsed = collapse_whitespace(name);
    let without_tld = COMPANY_TLD_SUFFIX.replace(&collapsed, "");
    let without_the = COMPANY_THE_PREFIX.replace(&without_tld, "");
    without_the.trim().to_string()
}

fn parse_amount(digits: &str, thousands: bool) -> Option<f64> {
    let value = digits.replace(',', "").parse::<f64>().ok()?;
    if thousands && value < 1000.0 {
        Some(value * 1000.0)
    } else {
        Some(value)
    }
}

/// Parses "NUMBER[k] - NUMBER[k]" ranges and single "$NUMBER[k]" amounts.
///
/// A `k` suffix only expands values below 1000, so "$50k" and "$50,000"
/// both yield 50000. A single bare number without `$` or `k` is ignored.
pub fn parse_salary(text: &str) -> SalaryRange {
    for caps in SALARY_RANGE.captures_iter(text) {
        let dollar = caps.get(1).is_some();
        let k_low = caps.get(3).is_some();
        let k_high = caps.get(5).is_some();
        let low_digits = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let high_digits = caps.get(4).map(|m| m.as_str()).unwrap_or_default();
        // Bare "9-5" or "2020-2021" style pairs are not salaries.
        if dollar || k_low || k_high || low_digits.contains(',') {
            // "50-75k": the suffix on the upper bound applies to both ends.
            let min = parse_amount(low_digits, k_low || k_high);
            let max = parse_amount(high_digits, k_high);
            if min.is_some() || max.is_some() {
                return SalaryRange { min, max };
            }
        }
    }

    for caps in SALARY_SINGLE.captures_iter(text) {
        let dollar = caps.get(1).is_some();
        let k = caps.get(3).is_some();
        if !dollar && !k {
            continue;
        }
        if let Some(min) = caps.get(2).and_then(|m| parse_amount(m.as_str(), k)) {
            return SalaryRange { min: Some(min), max: None };
        }
    }

    SalaryRange::default()
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

/// Missing text and missing location together read as a remote posting.
pub fn extract_work_setting(text: Option<&str>, city: Option<&str>, state: Option<&str>) -> WorkSetting {
    if is_blank(text) {
        return if is_blank(city) && is_blank(state) {
            WorkSetting::Remote
        } else {
            WorkSetting::Onsite
        };
    }
    let lower = text.unwrap_or_default().to_lowercase();
    let remote = lower.contains("remote");
    let hybrid = lower.contains("hybrid");
    if remote && (hybrid || lower.contains("partially")) {
        WorkSetting::Hybrid
    } else if remote {
        WorkSetting::Remote
    } else if hybrid || lower.contains("flexible") {
        WorkSetting::Hybrid
    } else {
        WorkSetting::Onsite
    }
}

pub fn extract_experience_level(text: &str) -> Option<ExperienceLevel> {
    if text.trim().is_empty() {
        return None;
    }
    if EXECUTIVE_WORDS.is_match(text) {
        return Some(ExperienceLevel::Executive);
    }
    if LEAD_WORDS.is_match(text) {
        return Some(ExperienceLevel::Lead);
    }
    if SENIOR_WORDS.is_match(text) {
        return Some(ExperienceLevel::Senior);
    }
    if ENTRY_WORDS.is_match(text) {
        return Some(ExperienceLevel::Entry);
    }
    if let Some(years) = YEARS
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        return Some(match years {
            y if y >= 10 => ExperienceLevel::Executive,
            y if y >= 7 => ExperienceLevel::Lead,
            y if y >= 5 => ExperienceLevel::Senior,
            y if y >= 2 => ExperienceLevel::Mid,
            _ => ExperienceLevel::Entry,
        });
    }
    Some(ExperienceLevel::Mid)
}

pub fn extract_job_type(text: &str) -> JobType {
    if INTERNSHIP_WORDS.is_match(text) {
        JobType::Internship
    } else if PART_TIME_WORDS.is_match(text) {
        JobType::PartTime
    } else if CONTRACT_WORDS.is_match(text) {
        JobType::Contract
    } else if TEMPORARY_WORDS.is_match(text) {
        JobType::Temporary
    } else {
        JobType::FullTime
    }
}

pub fn normalize_description(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let lines = unified
        .split('\n')
        .map(|line| INLINE_WHITESPACE.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    let collapsed = EXCESS_BLANK_LINES.replace_all(&lines, "\n\n");
    let trimmed = collapsed.trim();
    match trimmed.char_indices().nth(MAX_DESCRIPTION_CHARS) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}

/// Finds the first "City, ST" pair in free text.
pub fn extract_city_state(text: &str) -> Option<(String, String)> {
    let caps = CITY_STATE.captures(text)?;
    Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("candidate has no external id")]
    MissingExternalId,
    #[error("candidate {0} has an empty title")]
    EmptyTitle(String),
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Applies every normalizer to an adapter candidate.
///
/// Structured values supplied by the vendor win over text heuristics.
pub fn normalize_candidate(
    source_id: Uuid,
    raw: RawCandidate,
    seen_at: DateTime<Utc>,
) -> Result<NewPosting, NormalizeError> {
    let external_id = raw.external_id.trim().to_string();
    if external_id.is_empty() {
        return Err(NormalizeError::MissingExternalId);
    }
    let title = normalize_title(&raw.title);
    if title.is_empty() {
        return Err(NormalizeError::EmptyTitle(external_id));
    }

    let description = raw
        .description
        .as_deref()
        .map(normalize_description)
        .filter(|d| !d.is_empty());
    let company_name = raw
        .company_name
        .as_deref()
        .map(normalize_company_name)
        .filter(|c| !c.is_empty());
    let location = Location {
        city: non_empty(raw.location.city),
        state: non_empty(raw.location.state),
        country: non_empty(raw.location.country),
    };

    let salary = if !raw.salary.is_empty() {
        raw.salary
    } else if let Some(text) = raw.salary_text.as_deref() {
        parse_salary(text)
    } else {
        description.as_deref().map(parse_salary).unwrap_or_default()
    };

    let job_type = raw.job_type.unwrap_or_else(|| {
        let hint = [
            raw.job_type_text.as_deref(),
            Some(title.as_str()),
            description.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n");
        extract_job_type(&hint)
    });

    let city = location.city.as_deref();
    let state = location.state.as_deref();
    let work_setting = match extract_work_setting(Some(&title), city, state) {
        WorkSetting::Onsite => extract_work_setting(description.as_deref(), city, state),
        signalled => signalled,
    };

    let experience_text = match description.as_deref() {
        Some(d) => format!("{title}\n{d}"),
        None => title.clone(),
    };

    Ok(NewPosting {
        source_id,
        external_id,
        source_url: raw.source_url.trim().to_string(),
        title,
        experience_level: extract_experience_level(&experience_text),
        description,
        company_name,
        company_url: non_empty(raw.company_url),
        location,
        salary,
        job_type: Some(job_type),
        work_setting: Some(work_setting),
        raw_payload: raw.raw,
        seen_at,
        expires_at: raw.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn titles_get_standard_prefixes_and_spaced_hyphens() {
        assert_eq!(normalize_title("  Sr.   Backend Engineer-Payments "), "Senior Backend Engineer - Payments");
        assert_eq!(normalize_title("jr developer"), "Junior developer");
        assert_eq!(normalize_title("Senior  Analyst"), "Senior Analyst");
    }

    #[test]
    fn company_names_drop_tld_and_leading_article() {
        assert_eq!(normalize_company_name("  The   Acme Corp "), "Acme Corp");
        assert_eq!(normalize_company_name("Stripe.com"), "Stripe");
        assert_eq!(normalize_company_name("linear.io"), "linear");
        assert_eq!(normalize_company_name("Theory Labs"), "Theory Labs");
    }

    #[test]
    fn salary_ranges_and_single_amounts() {
        assert_eq!(
            parse_salary("$50,000 - $75,000"),
            SalaryRange { min: Some(50000.0), max: Some(75000.0) }
        );
        assert_eq!(parse_salary("$50k"), SalaryRange { min: Some(50000.0), max: None });
        assert_eq!(parse_salary("negotiable"), SalaryRange::default());
        assert_eq!(
            parse_salary("Pay: 80k-120k per year"),
            SalaryRange { min: Some(80000.0), max: Some(120000.0) }
        );
        assert_eq!(
            parse_salary("$60 to 75k"),
            SalaryRange { min: Some(60000.0), max: Some(75000.0) }
        );
        assert_eq!(parse_salary("5 years of experience"), SalaryRange::default());
    }

    #[test]
    fn work_setting_defaults() {
        assert_eq!(extract_work_setting(None, None, None), WorkSetting::Remote);
        assert_eq!(
            extract_work_setting(Some("onsite only in Dallas"), Some("Dallas"), Some("TX")),
            WorkSetting::Onsite
        );
        assert_eq!(extract_work_setting(None, Some("Austin"), None), WorkSetting::Onsite);
        assert_eq!(extract_work_setting(Some("Fully remote team"), None, None), WorkSetting::Remote);
        assert_eq!(
            extract_work_setting(Some("Remote, partially in office"), None, None),
            WorkSetting::Hybrid
        );
        assert_eq!(extract_work_setting(Some("Flexible schedule"), None, None), WorkSetting::Hybrid);
    }

    #[test]
    fn experience_level_keywords_then_years() {
        assert_eq!(extract_experience_level("VP of Engineering"), Some(ExperienceLevel::Executive));
        assert_eq!(extract_experience_level("Principal Engineer"), Some(ExperienceLevel::Lead));
        assert_eq!(extract_experience_level("Sr. Data Analyst"), Some(ExperienceLevel::Senior));
        assert_eq!(extract_experience_level("Software Intern"), Some(ExperienceLevel::Entry));
        assert_eq!(extract_experience_level("Requires 7+ years"), Some(ExperienceLevel::Lead));
        assert_eq!(extract_experience_level("3-5 years with Rust"), Some(ExperienceLevel::Mid));
        assert_eq!(extract_experience_level("1 year of support work"), Some(ExperienceLevel::Entry));
        assert_eq!(extract_experience_level("Backend developer"), Some(ExperienceLevel::Mid));
        assert_eq!(extract_experience_level("   "), None);
    }

    #[test]
    fn job_type_defaults_to_full_time() {
        assert_eq!(extract_job_type("Summer Internship"), JobType::Internship);
        assert_eq!(extract_job_type("Part-time barista"), JobType::PartTime);
        assert_eq!(extract_job_type("6 month contract"), JobType::Contract);
        assert_eq!(extract_job_type("Seasonal warehouse help"), JobType::Temporary);
        assert_eq!(extract_job_type("Accountant"), JobType::FullTime);
    }

    #[test]
    fn descriptions_are_collapsed_and_capped() {
        let text = "  Hello   world \r\n\r\n\r\n\r\nSecond\tline  ";
        assert_eq!(normalize_description(text), "Hello world\n\nSecond line");
        let long = "a".repeat(MAX_DESCRIPTION_CHARS + 50);
        assert_eq!(normalize_description(&long).chars().count(), MAX_DESCRIPTION_CHARS);
    }

    #[test]
    fn city_state_pairs_are_found_in_prose() {
        assert_eq!(
            extract_city_state("Join our team in San Francisco, CA today"),
            Some(("San Francisco".to_string(), "CA".to_string()))
        );
        assert_eq!(extract_city_state("no location here"), None);
    }

    #[test]
    fn candidate_normalization_prefers_structured_values() {
        let seen = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap();
        let mut raw = RawCandidate::new("abc", "https://jobs.example/abc", " sr  platform engineer ");
        raw.description = Some("Remote friendly. $120k - $150k".into());
        raw.company_name = Some("The Example.com".into());
        raw.salary = SalaryRange { min: Some(100000.0), max: None };
        raw.job_type = Some(JobType::Contract);

        let posting = normalize_candidate(Uuid::nil(), raw, seen).unwrap();
        assert_eq!(posting.title, "Senior platform engineer");
        assert_eq!(posting.company_name.as_deref(), Some("Example"));
        assert_eq!(posting.salary.min, Some(100000.0));
        assert_eq!(posting.job_type, Some(JobType::Contract));
        assert_eq!(posting.work_setting, Some(WorkSetting::Remote));
        assert_eq!(posting.experience_level, Some(ExperienceLevel::Senior));
    }

    #[test]
    fn candidate_without_title_is_rejected() {
        let seen = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap();
        let raw = RawCandidate::new("x1", "https://example.com", "   ");
        assert_eq!(
            normalize_candidate(Uuid::nil(), raw, seen),
            Err(NormalizeError::EmptyTitle("x1".into()))
        );
    }
}
