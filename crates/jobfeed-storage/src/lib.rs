//! Ingestion store gateway and HTTP transport for the job ingestion pipeline.
//!
//! Two traits make up the gateway: [`IngestionStore`] owns the pipeline's
//! own tables (sources, external postings, sync logs, job imports) and
//! [`EmployerCatalog`] fronts the employer/published-job catalog the
//! pipeline reads from and publishes into. [`PgStore`] implements both over
//! PostgreSQL; [`MemoryStore`] implements both in memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_core::{
    CompanyMatch, Employer, ExternalPosting, ImportQueueEntry, JobImport, JobImportUpdate,
    NewPosting, PostingStatus, PublishedJobRef, RunType, SourceConfig, SyncLog, SyncOutcome,
    TransitionError,
};
use thiserror::Error;
use uuid::Uuid;

pub mod http;
mod memory;
mod pg;

pub use http::{
    BackoffPolicy, FetchError, FetchedResponse, HttpClientConfig, HttpFetcher, HttpRequest,
    HttpTransport,
};
pub use memory::MemoryStore;
pub use pg::PgStore;

pub const CRATE_NAME: &str = "jobfeed-storage";

/// Name given to the synthetic employer that unmatched imports are attributed to.
pub const PLACEHOLDER_EMPLOYER_NAME: &str = "External Job Source";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),
    #[error("corrupt {column} value: {message}")]
    Decode { column: &'static str, message: String },
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.constraint().unwrap_or("unknown").to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result of an upsert keyed by (source id, external id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(Uuid),
    Updated(Uuid),
}

impl UpsertOutcome {
    pub fn id(self) -> Uuid {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => id,
        }
    }
}

/// Same-source near-duplicate lookup: title starts with `title_prefix` and
/// company equals `company_name`, both case-insensitively.
#[derive(Debug, Clone, Copy)]
pub struct SimilarPostingQuery<'a> {
    pub source_id: Uuid,
    pub title_prefix: &'a str,
    pub company_name: &'a str,
    pub exclude_external_id: &'a str,
    pub limit: i64,
}

#[async_trait]
pub trait IngestionStore: Send + Sync {
    async fn get_source(&self, id: Uuid) -> Result<Option<SourceConfig>, StoreError>;
    async fn find_source_by_name(&self, name: &str) -> Result<Option<SourceConfig>, StoreError>;
    async fn list_sources(&self) -> Result<Vec<SourceConfig>, StoreError>;
    /// Insert or replace a source by id. Administrative path only.
    async fn save_source(&self, source: &SourceConfig) -> Result<(), StoreError>;
    async fn mark_source_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
    async fn set_source_active(&self, id: Uuid, active: bool) -> Result<(), StoreError>;

    async fn upsert_posting(&self, posting: &NewPosting) -> Result<UpsertOutcome, StoreError>;
    async fn get_posting(&self, id: Uuid) -> Result<Option<ExternalPosting>, StoreError>;
    async fn find_posting_by_external_id(
        &self,
        source_id: Uuid,
        external_id: &str,
    ) -> Result<Option<ExternalPosting>, StoreError>;
    async fn find_similar_postings(
        &self,
        query: SimilarPostingQuery<'_>,
    ) -> Result<Vec<ExternalPosting>, StoreError>;
    /// Writes the match and moves the posting to `matched`.
    async fn record_match(&self, id: Uuid, found: &CompanyMatch) -> Result<ExternalPosting, StoreError>;
    /// Checked status change; illegal transitions fail with
    /// [`StoreError::IllegalTransition`]. `notes` replaces the notes when set.
    async fn set_posting_status(
        &self,
        id: Uuid,
        status: PostingStatus,
        notes: Option<&str>,
    ) -> Result<ExternalPosting, StoreError>;
    async fn list_import_queue(
        &self,
        status: Option<PostingStatus>,
        limit: i64,
    ) -> Result<Vec<ImportQueueEntry>, StoreError>;

    async fn start_sync_log(
        &self,
        source_id: Uuid,
        run_type: RunType,
        started_at: DateTime<Utc>,
    ) -> Result<SyncLog, StoreError>;
    /// Finalizes a `running` log. Completed logs are immutable.
    async fn finish_sync_log(&self, id: Uuid, outcome: &SyncOutcome) -> Result<SyncLog, StoreError>;
    /// Newest first.
    async fn recent_sync_logs(&self, source_id: Uuid, limit: i64) -> Result<Vec<SyncLog>, StoreError>;

    async fn upsert_job_import(&self, update: &JobImportUpdate) -> Result<JobImport, StoreError>;
    async fn get_job_import(&self, external_posting_id: Uuid) -> Result<Option<JobImport>, StoreError>;
}

#[async_trait]
pub trait EmployerCatalog: Send + Sync {
    /// Case-insensitive exact name match among active, non-placeholder employers.
    async fn find_employer_by_exact_name(&self, name: &str) -> Result<Option<Employer>, StoreError>;
    /// Active employers whose name contains `fragment`, case-insensitively.
    async fn search_employers_by_name(&self, fragment: &str, limit: i64) -> Result<Vec<Employer>, StoreError>;
    async fn find_employer_by_website_host(&self, host: &str) -> Result<Option<Employer>, StoreError>;
    async fn get_employer(&self, id: Uuid) -> Result<Option<Employer>, StoreError>;
    /// Returns the placeholder employer, creating it on first use.
    async fn placeholder_employer(&self) -> Result<Employer, StoreError>;
    async fn find_published_jobs_by_title_prefix(
        &self,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<PublishedJobRef>, StoreError>;
    /// Publishes a job for the posting; idempotent per external posting.
    async fn create_published_job(&self, posting: &ExternalPosting, employer_id: Uuid) -> Result<Uuid, StoreError>;
}

/// Escapes `%`, `_` and `\` for use inside an ILIKE pattern.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("Acme"), "Acme");
    }

    #[test]
    fn upsert_outcome_exposes_id() {
        let id = Uuid::new_v4();
        assert_eq!(UpsertOutcome::Inserted(id).id(), id);
        assert_eq!(UpsertOutcome::Updated(id).id(), id);
    }
}
