use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_core::{
    CompanyMatch, Employer, ExternalPosting, ImportQueueEntry, ImportStatus, JobImport,
    JobImportUpdate, NewPosting, PostingStatus, PublishedJobRef, RunType, SourceConfig, SyncCounts,
    SyncLog, SyncOutcome, SyncStatus,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    EmployerCatalog, IngestionStore, SimilarPostingQuery, StoreError, UpsertOutcome,
    PLACEHOLDER_EMPLOYER_NAME,
};

#[derive(Debug, Clone)]
struct PublishedJob {
    id: Uuid,
    employer_id: Uuid,
    title: String,
    external_posting_id: Option<Uuid>,
}

#[derive(Debug, Default)]
struct MemoryState {
    sources: Vec<SourceConfig>,
    postings: Vec<ExternalPosting>,
    sync_logs: Vec<SyncLog>,
    imports: Vec<JobImport>,
    employers: Vec<Employer>,
    jobs: Vec<PublishedJob>,
    failing_external_ids: HashSet<String>,
    fail_job_creation: bool,
}

/// In-process gateway with the same semantics as [`crate::PgStore`]
/// (keyed upserts, checked transitions, immutable finished logs). Used by
/// tests and by dry runs that should not touch a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_employer(&self, name: &str, website: Option<&str>) -> Employer {
        let employer = Employer {
            id: Uuid::new_v4(),
            name: name.to_string(),
            website: website.map(ToString::to_string),
            is_active: true,
            is_placeholder: false,
        };
        self.state.lock().await.employers.push(employer.clone());
        employer
    }

    pub async fn add_published_job(&self, title: &str, employer_id: Uuid, external_posting_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.jobs.push(PublishedJob {
            id,
            employer_id,
            title: title.to_string(),
            external_posting_id,
        });
        id
    }

    /// Makes every upsert of `external_id` fail with a backend error.
    pub async fn fail_upserts_for(&self, external_id: &str) {
        self.state
            .lock()
            .await
            .failing_external_ids
            .insert(external_id.to_string());
    }

    pub async fn fail_job_creation(&self, fail: bool) {
        self.state.lock().await.fail_job_creation = fail;
    }

    pub async fn postings(&self) -> Vec<ExternalPosting> {
        self.state.lock().await.postings.clone()
    }

    pub async fn published_job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }
}

fn posting_mut(state: &mut MemoryState, id: Uuid) -> Result<&mut ExternalPosting, StoreError> {
    state
        .postings
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| StoreError::not_found("external posting", id))
}

#[async_trait]
impl IngestionStore for MemoryStore {
    async fn get_source(&self, id: Uuid) -> Result<Option<SourceConfig>, StoreError> {
        Ok(self.state.lock().await.sources.iter().find(|s| s.id == id).cloned())
    }

    async fn find_source_by_name(&self, name: &str) -> Result<Option<SourceConfig>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .sources
            .iter()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn list_sources(&self) -> Result<Vec<SourceConfig>, StoreError> {
        let mut sources = self.state.lock().await.sources.clone();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    async fn save_source(&self, source: &SourceConfig) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.sources.iter().any(|s| s.name == source.name && s.id != source.id) {
            return Err(StoreError::UniqueViolation("job_sources_name_key".into()));
        }
        match state.sources.iter_mut().find(|s| s.id == source.id) {
            Some(existing) => *existing = source.clone(),
            None => state.sources.push(source.clone()),
        }
        Ok(())
    }

    async fn mark_source_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::not_found("source", id))?;
        source.last_synced_at = Some(at);
        Ok(())
    }

    async fn set_source_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::not_found("source", id))?;
        source.is_active = active;
        Ok(())
    }

    async fn upsert_posting(&self, posting: &NewPosting) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state.lock().await;
        if state.failing_external_ids.contains(&posting.external_id) {
            return Err(StoreError::Backend(format!(
                "write rejected for external id {}",
                posting.external_id
            )));
        }

        if let Some(existing) = state
            .postings
            .iter_mut()
            .find(|p| p.source_id == posting.source_id && p.external_id == posting.external_id)
        {
            existing.source_url = posting.source_url.clone();
            existing.title = posting.title.clone();
            existing.description = posting.description.clone();
            existing.company_name = posting.company_name.clone();
            existing.company_url = posting.company_url.clone();
            existing.location = posting.location.clone();
            existing.salary = posting.salary;
            existing.job_type = posting.job_type;
            existing.work_setting = posting.work_setting;
            existing.experience_level = posting.experience_level;
            existing.raw_payload = posting.raw_payload.clone();
            existing.last_seen_at = posting.seen_at;
            existing.expires_at = posting.expires_at;
            return Ok(UpsertOutcome::Updated(existing.id));
        }

        let id = Uuid::new_v4();
        state.postings.push(ExternalPosting {
            id,
            source_id: posting.source_id,
            external_id: posting.external_id.clone(),
            source_url: posting.source_url.clone(),
            title: posting.title.clone(),
            description: posting.description.clone(),
            company_name: posting.company_name.clone(),
            company_url: posting.company_url.clone(),
            location: posting.location.clone(),
            salary: posting.salary,
            job_type: posting.job_type,
            work_setting: posting.work_setting,
            experience_level: posting.experience_level,
            matched_employer_id: None,
            match_confidence: None,
            match_method: None,
            status: PostingStatus::Pending,
            notes: None,
            raw_payload: posting.raw_payload.clone(),
            first_seen_at: posting.seen_at,
            last_seen_at: posting.seen_at,
            expires_at: posting.expires_at,
        });
        Ok(UpsertOutcome::Inserted(id))
    }

    async fn get_posting(&self, id: Uuid) -> Result<Option<ExternalPosting>, StoreError> {
        Ok(self.state.lock().await.postings.iter().find(|p| p.id == id).cloned())
    }

    async fn find_posting_by_external_id(
        &self,
        source_id: Uuid,
        external_id: &str,
    ) -> Result<Option<ExternalPosting>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .postings
            .iter()
            .find(|p| p.source_id == source_id && p.external_id == external_id)
            .cloned())
    }

    async fn find_similar_postings(
        &self,
        query: SimilarPostingQuery<'_>,
    ) -> Result<Vec<ExternalPosting>, StoreError> {
        let prefix = query.title_prefix.to_lowercase();
        let mut found = self
            .state
            .lock()
            .await
            .postings
            .iter()
            .filter(|p| p.source_id == query.source_id)
            .filter(|p| p.external_id != query.exclude_external_id)
            .filter(|p| p.title.to_lowercase().starts_with(&prefix))
            .filter(|p| {
                p.company_name
                    .as_deref()
                    .is_some_and(|c| eq_ignore_case(c, query.company_name))
            })
            .cloned()
            .collect::<Vec<_>>();
        found.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        found.truncate(query.limit.max(0) as usize);
        Ok(found)
    }

    async fn record_match(&self, id: Uuid, found: &CompanyMatch) -> Result<ExternalPosting, StoreError> {
        let mut state = self.state.lock().await;
        let posting = posting_mut(&mut state, id)?;
        posting.status = posting.status.transition(PostingStatus::Matched)?;
        posting.matched_employer_id = Some(found.employer_id);
        posting.match_confidence = Some(found.confidence);
        posting.match_method = Some(found.method);
        Ok(posting.clone())
    }

    async fn set_posting_status(
        &self,
        id: Uuid,
        status: PostingStatus,
        notes: Option<&str>,
    ) -> Result<ExternalPosting, StoreError> {
        let mut state = self.state.lock().await;
        let posting = posting_mut(&mut state, id)?;
        posting.status = posting.status.transition(status)?;
        if let Some(notes) = notes {
            posting.notes = Some(notes.to_string());
        }
        Ok(posting.clone())
    }

    async fn list_import_queue(
        &self,
        status: Option<PostingStatus>,
        limit: i64,
    ) -> Result<Vec<ImportQueueEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut postings = state
            .postings
            .iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect::<Vec<_>>();
        postings.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        postings.truncate(limit.max(0) as usize);
        Ok(postings
            .into_iter()
            .map(|posting| {
                let import = state
                    .imports
                    .iter()
                    .find(|i| i.external_posting_id == posting.id)
                    .cloned();
                ImportQueueEntry { posting, import }
            })
            .collect())
    }

    async fn start_sync_log(
        &self,
        source_id: Uuid,
        run_type: RunType,
        started_at: DateTime<Utc>,
    ) -> Result<SyncLog, StoreError> {
        let log = SyncLog {
            id: Uuid::new_v4(),
            source_id,
            run_type,
            status: SyncStatus::Running,
            counts: SyncCounts::default(),
            errors: Vec::new(),
            started_at,
            completed_at: None,
            duration_ms: None,
        };
        self.state.lock().await.sync_logs.push(log.clone());
        Ok(log)
    }

    async fn finish_sync_log(&self, id: Uuid, outcome: &SyncOutcome) -> Result<SyncLog, StoreError> {
        let mut state = self.state.lock().await;
        let log = state
            .sync_logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| StoreError::not_found("sync log", id))?;
        if log.status != SyncStatus::Running {
            return Err(StoreError::Conflict(format!("sync log {id} is already {}", log.status)));
        }
        log.status = outcome.status;
        log.counts = outcome.counts;
        log.errors = outcome.errors.clone();
        log.completed_at = Some(outcome.completed_at);
        log.duration_ms = Some(outcome.duration_ms);
        Ok(log.clone())
    }

    async fn recent_sync_logs(&self, source_id: Uuid, limit: i64) -> Result<Vec<SyncLog>, StoreError> {
        // Reverse insertion order first so equal timestamps still list newest first.
        let mut logs = self
            .state
            .lock()
            .await
            .sync_logs
            .iter()
            .rev()
            .filter(|l| l.source_id == source_id)
            .cloned()
            .collect::<Vec<_>>();
        logs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        logs.truncate(limit.max(0) as usize);
        Ok(logs)
    }

    async fn upsert_job_import(&self, update: &JobImportUpdate) -> Result<JobImport, StoreError> {
        let mut state = self.state.lock().await;
        let imported_now = update.status == ImportStatus::Imported;
        if let Some(existing) = state
            .imports
            .iter_mut()
            .find(|i| i.external_posting_id == update.external_posting_id)
        {
            existing.employer_id = update.employer_id.or(existing.employer_id);
            existing.status = update.status;
            existing.method = update.method;
            existing.job_id = update.job_id.or(existing.job_id);
            existing.error_message = update.error_message.clone();
            existing.updated_at = update.at;
            if imported_now && existing.imported_at.is_none() {
                existing.imported_at = Some(update.at);
            }
            return Ok(existing.clone());
        }

        let import = JobImport {
            id: Uuid::new_v4(),
            external_posting_id: update.external_posting_id,
            employer_id: update.employer_id,
            status: update.status,
            method: update.method,
            job_id: update.job_id,
            error_message: update.error_message.clone(),
            created_at: update.at,
            updated_at: update.at,
            imported_at: imported_now.then_some(update.at),
        };
        state.imports.push(import.clone());
        Ok(import)
    }

    async fn get_job_import(&self, external_posting_id: Uuid) -> Result<Option<JobImport>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .imports
            .iter()
            .find(|i| i.external_posting_id == external_posting_id)
            .cloned())
    }
}

#[async_trait]
impl EmployerCatalog for MemoryStore {
    async fn find_employer_by_exact_name(&self, name: &str) -> Result<Option<Employer>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .employers
            .iter()
            .find(|e| e.is_active && !e.is_placeholder && eq_ignore_case(&e.name, name))
            .cloned())
    }

    async fn search_employers_by_name(&self, fragment: &str, limit: i64) -> Result<Vec<Employer>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .employers
            .iter()
            .filter(|e| e.is_active && !e.is_placeholder && contains_ignore_case(&e.name, fragment))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn find_employer_by_website_host(&self, host: &str) -> Result<Option<Employer>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .employers
            .iter()
            .find(|e| {
                e.is_active
                    && !e.is_placeholder
                    && e.website.as_deref().is_some_and(|w| contains_ignore_case(w, host))
            })
            .cloned())
    }

    async fn get_employer(&self, id: Uuid) -> Result<Option<Employer>, StoreError> {
        Ok(self.state.lock().await.employers.iter().find(|e| e.id == id).cloned())
    }

    async fn placeholder_employer(&self) -> Result<Employer, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.employers.iter().find(|e| e.is_placeholder) {
            return Ok(existing.clone());
        }
        let employer = Employer {
            id: Uuid::new_v4(),
            name: PLACEHOLDER_EMPLOYER_NAME.to_string(),
            website: None,
            is_active: true,
            is_placeholder: true,
        };
        state.employers.push(employer.clone());
        Ok(employer)
    }

    async fn find_published_jobs_by_title_prefix(
        &self,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<PublishedJobRef>, StoreError> {
        let state = self.state.lock().await;
        let prefix = prefix.to_lowercase();
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.title.to_lowercase().starts_with(&prefix))
            .filter_map(|j| {
                let employer = state.employers.iter().find(|e| e.id == j.employer_id)?;
                Some(PublishedJobRef {
                    job_id: j.id,
                    title: j.title.clone(),
                    employer_name: employer.name.clone(),
                    external_posting_id: j.external_posting_id,
                })
            })
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn create_published_job(&self, posting: &ExternalPosting, employer_id: Uuid) -> Result<Uuid, StoreError> {
        let mut state = self.state.lock().await;
        if state.fail_job_creation {
            return Err(StoreError::Backend("job catalog unavailable".into()));
        }
        if let Some(existing) = state
            .jobs
            .iter_mut()
            .find(|j| j.external_posting_id == Some(posting.id))
        {
            existing.title = posting.title.clone();
            existing.employer_id = employer_id;
            return Ok(existing.id);
        }
        let id = Uuid::new_v4();
        state.jobs.push(PublishedJob {
            id,
            employer_id,
            title: posting.title.clone(),
            external_posting_id: Some(posting.id),
        });
        Ok(id)
    }
}
