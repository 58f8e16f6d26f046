//! Tiered duplicate detection for incoming postings.

use std::sync::Arc;

use jobfeed_core::{ExternalPosting, NewPosting};
use jobfeed_storage::{EmployerCatalog, IngestionStore, SimilarPostingQuery, StoreError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::similarity::{Similarity, TokenSetSimilarity};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Same-source tier requiring matching location.
    pub location_match_threshold: f64,
    /// Same-source tier on title and company only.
    pub title_match_threshold: f64,
    /// Cross-source tier against published jobs.
    pub cross_source_threshold: f64,
    pub location_prefix_chars: usize,
    pub title_prefix_chars: usize,
    pub cross_source_prefix_chars: usize,
    pub candidate_limit: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            location_match_threshold: 0.9,
            title_match_threshold: 0.85,
            cross_source_threshold: 0.85,
            location_prefix_chars: 20,
            title_prefix_chars: 30,
            cross_source_prefix_chars: 20,
            candidate_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    ExactExternalId,
    TitleCompanyLocationMatch,
    TitleCompanyMatch,
    AlreadyImported,
}

impl DuplicateReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateReason::ExactExternalId => "exact_external_id",
            DuplicateReason::TitleCompanyLocationMatch => "title_company_location_match",
            DuplicateReason::TitleCompanyMatch => "title_company_match",
            DuplicateReason::AlreadyImported => "already_imported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    /// Existing posting id, or the published job id for `already_imported`.
    pub existing_id: Option<Uuid>,
    pub confidence: f64,
    pub reason: Option<DuplicateReason>,
}

impl DuplicateCheck {
    pub fn unique() -> Self {
        Self {
            is_duplicate: false,
            existing_id: None,
            confidence: 0.0,
            reason: None,
        }
    }

    fn found(existing_id: Uuid, confidence: f64, reason: DuplicateReason) -> Self {
        Self {
            is_duplicate: true,
            existing_id: Some(existing_id),
            confidence,
            reason: Some(reason),
        }
    }

    /// A similarity hit rather than a re-seen external id.
    pub fn is_near_duplicate(&self) -> bool {
        self.is_duplicate && self.reason != Some(DuplicateReason::ExactExternalId)
    }

    pub fn note(&self) -> String {
        match (self.reason, self.existing_id) {
            (Some(reason), Some(id)) => format!(
                "duplicate of {id} ({}, confidence {:.2})",
                reason.as_str(),
                self.confidence
            ),
            _ => "not a duplicate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DuplicateQuery<'a> {
    pub source_id: Uuid,
    pub external_id: &'a str,
    pub title: &'a str,
    pub company_name: Option<&'a str>,
    pub city: Option<&'a str>,
    pub state: Option<&'a str>,
}

impl<'a> From<&'a NewPosting> for DuplicateQuery<'a> {
    fn from(posting: &'a NewPosting) -> Self {
        Self {
            source_id: posting.source_id,
            external_id: &posting.external_id,
            title: &posting.title,
            company_name: posting.company_name.as_deref(),
            city: posting.location.city.as_deref(),
            state: posting.location.state.as_deref(),
        }
    }
}

fn prefix(text: &str, chars: usize) -> String {
    text.chars().take(chars).collect()
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Every location field the incoming posting specifies must match.
fn location_matches(query: &DuplicateQuery<'_>, existing: &ExternalPosting) -> bool {
    let field_ok = |incoming: Option<&str>, stored: Option<&str>| match incoming {
        None => true,
        Some(v) => stored.is_some_and(|s| same_text(v, s)),
    };
    field_ok(query.city, existing.location.city.as_deref())
        && field_ok(query.state, existing.location.state.as_deref())
}

pub struct DuplicateDetector {
    store: Arc<dyn IngestionStore>,
    catalog: Arc<dyn EmployerCatalog>,
    similarity: Arc<dyn Similarity>,
    config: DedupConfig,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn IngestionStore>, catalog: Arc<dyn EmployerCatalog>, config: DedupConfig) -> Self {
        Self {
            store,
            catalog,
            similarity: Arc::new(TokenSetSimilarity),
            config,
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// First matching tier wins: exact external id, same-source title +
    /// company + location, same-source title + company, already published.
    pub async fn check_duplicate(&self, query: &DuplicateQuery<'_>) -> Result<DuplicateCheck, StoreError> {
        if let Some(existing) = self
            .store
            .find_posting_by_external_id(query.source_id, query.external_id)
            .await?
        {
            return Ok(DuplicateCheck::found(existing.id, 1.0, DuplicateReason::ExactExternalId));
        }

        let Some(company) = query.company_name.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(DuplicateCheck::unique());
        };

        if let Some(found) = self
            .same_source_tier(
                query,
                company,
                self.config.location_prefix_chars,
                self.config.location_match_threshold,
                true,
            )
            .await?
        {
            let (id, score) = found;
            return Ok(DuplicateCheck::found(id, score * 0.95, DuplicateReason::TitleCompanyLocationMatch));
        }

        if let Some((id, score)) = self
            .same_source_tier(
                query,
                company,
                self.config.title_prefix_chars,
                self.config.title_match_threshold,
                false,
            )
            .await?
        {
            return Ok(DuplicateCheck::found(id, score * 0.8, DuplicateReason::TitleCompanyMatch));
        }

        if let Some((id, score)) = self.cross_source_tier(query, company).await? {
            return Ok(DuplicateCheck::found(id, score * 0.75, DuplicateReason::AlreadyImported));
        }

        Ok(DuplicateCheck::unique())
    }

    async fn same_source_tier(
        &self,
        query: &DuplicateQuery<'_>,
        company: &str,
        prefix_chars: usize,
        threshold: f64,
        require_location: bool,
    ) -> Result<Option<(Uuid, f64)>, StoreError> {
        let title_prefix = prefix(query.title, prefix_chars);
        let candidates = self
            .store
            .find_similar_postings(SimilarPostingQuery {
                source_id: query.source_id,
                title_prefix: &title_prefix,
                company_name: company,
                exclude_external_id: query.external_id,
                limit: self.config.candidate_limit,
            })
            .await?;

        Ok(candidates
            .iter()
            .filter(|existing| !require_location || location_matches(query, existing))
            .map(|existing| (existing.id, self.similarity.similarity(query.title, &existing.title)))
            .filter(|(_, score)| *score > threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1)))
    }

    async fn cross_source_tier(
        &self,
        query: &DuplicateQuery<'_>,
        company: &str,
    ) -> Result<Option<(Uuid, f64)>, StoreError> {
        let title_prefix = prefix(query.title, self.config.cross_source_prefix_chars);
        let jobs = self
            .catalog
            .find_published_jobs_by_title_prefix(&title_prefix, self.config.candidate_limit)
            .await?;

        Ok(jobs
            .iter()
            .filter(|job| same_text(&job.employer_name, company))
            .map(|job| (job.job_id, self.similarity.similarity(query.title, &job.title)))
            .filter(|(_, score)| *score > self.config.cross_source_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use jobfeed_core::{Location, SalaryRange};
    use jobfeed_storage::MemoryStore;

    fn posting(source_id: Uuid, external_id: &str, title: &str, company: &str, city: Option<&str>) -> NewPosting {
        NewPosting {
            source_id,
            external_id: external_id.into(),
            source_url: format!("https://jobs.example/{external_id}"),
            title: title.into(),
            description: None,
            company_name: Some(company.into()),
            company_url: None,
            location: Location {
                city: city.map(Into::into),
                state: city.map(|_| "TX".to_string()),
                country: None,
            },
            salary: SalaryRange::default(),
            job_type: None,
            work_setting: None,
            experience_level: None,
            raw_payload: serde_json::Value::Null,
            seen_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().unwrap(),
            expires_at: None,
        }
    }

    fn detector(store: &Arc<MemoryStore>) -> DuplicateDetector {
        DuplicateDetector::new(store.clone(), store.clone(), DedupConfig::default())
    }

    #[tokio::test]
    async fn exact_external_id_short_circuits() {
        let store = Arc::new(MemoryStore::new());
        let source = Uuid::new_v4();
        let id = store
            .upsert_posting(&posting(source, "x-1", "Senior Rust Engineer", "Acme", None))
            .await
            .unwrap()
            .id();

        let incoming = posting(source, "x-1", "Completely Different Title", "Other Co", None);
        let check = detector(&store).check_duplicate(&(&incoming).into()).await.unwrap();
        assert!(check.is_duplicate);
        assert_eq!(check.confidence, 1.0);
        assert_eq!(check.existing_id, Some(id));
        assert_eq!(check.reason, Some(DuplicateReason::ExactExternalId));
        assert!(!check.is_near_duplicate());
    }

    #[tokio::test]
    async fn same_title_company_and_location_is_tier_two() {
        let store = Arc::new(MemoryStore::new());
        let source = Uuid::new_v4();
        store
            .upsert_posting(&posting(source, "a", "Senior Rust Engineer", "Acme", Some("Austin")))
            .await
            .unwrap();

        let incoming = posting(source, "b", "Senior Rust Engineer", "ACME", Some("austin"));
        let check = detector(&store).check_duplicate(&(&incoming).into()).await.unwrap();
        assert_eq!(check.reason, Some(DuplicateReason::TitleCompanyLocationMatch));
        assert!((check.confidence - 0.95).abs() < 1e-9);
        assert!(check.is_near_duplicate());
    }

    #[tokio::test]
    async fn location_mismatch_falls_through_to_title_company_tier() {
        let store = Arc::new(MemoryStore::new());
        let source = Uuid::new_v4();
        store
            .upsert_posting(&posting(source, "a", "Senior Rust Engineer", "Acme", Some("Austin")))
            .await
            .unwrap();

        let incoming = posting(source, "b", "Senior Rust Engineer", "Acme", Some("Dallas"));
        let check = detector(&store).check_duplicate(&(&incoming).into()).await.unwrap();
        assert_eq!(check.reason, Some(DuplicateReason::TitleCompanyMatch));
        assert!((check.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn other_sources_and_companies_do_not_collide() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_posting(&posting(Uuid::new_v4(), "a", "Senior Rust Engineer", "Acme", None))
            .await
            .unwrap();
        let source = Uuid::new_v4();
        store
            .upsert_posting(&posting(source, "c", "Senior Rust Engineer", "Globex", None))
            .await
            .unwrap();

        let incoming = posting(source, "b", "Senior Rust Engineer", "Acme", None);
        let check = detector(&store).check_duplicate(&(&incoming).into()).await.unwrap();
        assert_eq!(check, DuplicateCheck::unique());
    }

    #[tokio::test]
    async fn published_job_under_same_employer_is_already_imported() {
        let store = Arc::new(MemoryStore::new());
        let employer = store.add_employer("Acme", Some("https://acme.example")).await;
        let job_id = store.add_published_job("Senior Rust Engineer", employer.id, None).await;

        let incoming = posting(Uuid::new_v4(), "new", "Senior Rust Engineer", "acme", None);
        let check = detector(&store).check_duplicate(&(&incoming).into()).await.unwrap();
        assert_eq!(check.reason, Some(DuplicateReason::AlreadyImported));
        assert_eq!(check.existing_id, Some(job_id));
        assert!((check.confidence - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn postings_without_company_only_check_external_id() {
        let store = Arc::new(MemoryStore::new());
        let source = Uuid::new_v4();
        let mut existing = posting(source, "a", "Barista", "Cafe", None);
        existing.company_name = None;
        store.upsert_posting(&existing).await.unwrap();

        let mut incoming = posting(source, "b", "Barista", "Cafe", None);
        incoming.company_name = None;
        let check = detector(&store).check_duplicate(&(&incoming).into()).await.unwrap();
        assert!(!check.is_duplicate);
    }

    #[test]
    fn note_mentions_reason_and_confidence() {
        let id = Uuid::nil();
        let check = DuplicateCheck::found(id, 0.8, DuplicateReason::TitleCompanyMatch);
        assert_eq!(
            check.note(),
            "duplicate of 00000000-0000-0000-0000-000000000000 (title_company_match, confidence 0.80)"
        );
    }
}
