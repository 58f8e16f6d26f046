//! Human review actions: approve into the job catalog, reject, or resolve
//! the employer by hand.

use std::sync::Arc;

use jobfeed_core::{
    Clock, CompanyMatch, ExternalPosting, ImportMethod, ImportQueueEntry, ImportStatus, JobImport,
    JobImportUpdate, MatchMethod, PostingStatus,
};
use jobfeed_storage::{EmployerCatalog, IngestionStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Publish unmatched postings under the placeholder employer instead of
    /// refusing them.
    pub allow_placeholder_employer: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            allow_placeholder_employer: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("external posting {0} not found")]
    PostingNotFound(Uuid),
    #[error("employer {0} not found")]
    EmployerNotFound(Uuid),
    #[error("external posting {0} has no matched employer")]
    NoEmployer(Uuid),
    #[error("publishing external posting {posting_id} failed: {message}")]
    Publish { posting_id: Uuid, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct ReviewWorkflow {
    store: Arc<dyn IngestionStore>,
    catalog: Arc<dyn EmployerCatalog>,
    clock: Arc<dyn Clock>,
    config: ReviewConfig,
}

impl ReviewWorkflow {
    pub fn new(
        store: Arc<dyn IngestionStore>,
        catalog: Arc<dyn EmployerCatalog>,
        clock: Arc<dyn Clock>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            config,
        }
    }

    pub async fn import_queue(
        &self,
        status: Option<PostingStatus>,
        limit: i64,
    ) -> Result<Vec<ImportQueueEntry>, ReviewError> {
        Ok(self.store.list_import_queue(status, limit).await?)
    }

    /// Publishes the posting and marks it imported. Re-approving updates the
    /// existing import row and job.
    pub async fn approve(&self, posting_id: Uuid, method: ImportMethod) -> Result<JobImport, ReviewError> {
        let posting = self.posting(posting_id).await?;
        posting
            .status
            .transition(PostingStatus::Imported)
            .map_err(StoreError::from)?;

        let employer_id = match posting.matched_employer_id {
            Some(id) => {
                self.catalog
                    .get_employer(id)
                    .await?
                    .ok_or(ReviewError::EmployerNotFound(id))?;
                id
            }
            None if self.config.allow_placeholder_employer => self.catalog.placeholder_employer().await?.id,
            None => {
                self.write_import(&posting, None, ImportStatus::Failed, method, None, Some("no employer matched"))
                    .await?;
                return Err(ReviewError::NoEmployer(posting_id));
            }
        };

        self.write_import(&posting, Some(employer_id), ImportStatus::Importing, method, None, None)
            .await?;
        let job_id = match self.catalog.create_published_job(&posting, employer_id).await {
            Ok(job_id) => job_id,
            Err(err) => {
                let message = err.to_string();
                warn!(posting_id = %posting_id, error = %message, "publishing external posting failed");
                self.write_import(
                    &posting,
                    Some(employer_id),
                    ImportStatus::Failed,
                    method,
                    None,
                    Some(&message),
                )
                .await?;
                return Err(ReviewError::Publish { posting_id, message });
            }
        };

        self.store
            .set_posting_status(posting_id, PostingStatus::Imported, None)
            .await?;
        let import = self
            .write_import(&posting, Some(employer_id), ImportStatus::Imported, method, Some(job_id), None)
            .await?;
        info!(posting_id = %posting_id, job_id = %job_id, employer_id = %employer_id, "external posting imported");
        Ok(import)
    }

    pub async fn reject(&self, posting_id: Uuid, reason: Option<&str>) -> Result<JobImport, ReviewError> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("rejected by reviewer");
        let posting = self
            .store
            .set_posting_status(posting_id, PostingStatus::Rejected, Some(reason))
            .await
            .map_err(|err| match err {
                StoreError::NotFound { .. } => ReviewError::PostingNotFound(posting_id),
                other => other.into(),
            })?;
        let import = self
            .write_import(
                &posting,
                posting.matched_employer_id,
                ImportStatus::Failed,
                ImportMethod::ManualReview,
                None,
                Some(reason),
            )
            .await?;
        info!(posting_id = %posting_id, reason, "external posting rejected");
        Ok(import)
    }

    /// Records a reviewer's employer choice as a full-confidence manual match.
    pub async fn assign_employer(&self, posting_id: Uuid, employer_id: Uuid) -> Result<ExternalPosting, ReviewError> {
        self.posting(posting_id).await?;
        self.catalog
            .get_employer(employer_id)
            .await?
            .ok_or(ReviewError::EmployerNotFound(employer_id))?;
        let found = CompanyMatch {
            employer_id,
            confidence: 1.0,
            method: MatchMethod::Manual,
        };
        Ok(self.store.record_match(posting_id, &found).await?)
    }

    async fn posting(&self, id: Uuid) -> Result<ExternalPosting, ReviewError> {
        self.store
            .get_posting(id)
            .await?
            .ok_or(ReviewError::PostingNotFound(id))
    }

    async fn write_import(
        &self,
        posting: &ExternalPosting,
        employer_id: Option<Uuid>,
        status: ImportStatus,
        method: ImportMethod,
        job_id: Option<Uuid>,
        error_message: Option<&str>,
    ) -> Result<JobImport, StoreError> {
        self.store
            .upsert_job_import(&JobImportUpdate {
                external_posting_id: posting.id,
                employer_id,
                status,
                method,
                job_id,
                error_message: error_message.map(ToString::to_string),
                at: self.clock.now(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{feed_source, new_posting, now};
    use jobfeed_core::FixedClock;
    use jobfeed_storage::{MemoryStore, PLACEHOLDER_EMPLOYER_NAME};

    async fn setup(config: ReviewConfig) -> (ReviewWorkflow, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let source = feed_source("Board");
        store.save_source(&source).await.unwrap();
        let id = store
            .upsert_posting(&new_posting(source.id, "ext-1", "Platform Engineer", Some("Initech")))
            .await
            .unwrap()
            .id();
        let workflow = ReviewWorkflow::new(store.clone(), store.clone(), Arc::new(FixedClock(now())), config);
        (workflow, store, id)
    }

    #[tokio::test]
    async fn unmatched_approval_uses_placeholder_employer() {
        let (workflow, store, id) = setup(ReviewConfig::default()).await;
        let import = workflow.approve(id, ImportMethod::ManualReview).await.unwrap();

        let placeholder = store.placeholder_employer().await.unwrap();
        assert_eq!(placeholder.name, PLACEHOLDER_EMPLOYER_NAME);
        assert_eq!(import.employer_id, Some(placeholder.id));
        assert_eq!(import.status, ImportStatus::Imported);
        assert!(import.job_id.is_some());
        assert_eq!(import.imported_at, Some(now()));
        assert_eq!(store.get_posting(id).await.unwrap().unwrap().status, PostingStatus::Imported);
    }

    #[tokio::test]
    async fn re_approval_updates_instead_of_duplicating() {
        let (workflow, store, id) = setup(ReviewConfig::default()).await;
        let first = workflow.approve(id, ImportMethod::ManualReview).await.unwrap();
        let second = workflow.approve(id, ImportMethod::Auto).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.job_id, second.job_id);
        assert_eq!(second.method, ImportMethod::Auto);
        assert_eq!(store.published_job_count().await, 1);
    }

    #[tokio::test]
    async fn matched_employer_is_used_when_present() {
        let (workflow, store, id) = setup(ReviewConfig::default()).await;
        let initech = store.add_employer("Initech", None).await;
        let posting = workflow.assign_employer(id, initech.id).await.unwrap();
        assert_eq!(posting.status, PostingStatus::Matched);
        assert_eq!(posting.match_method, Some(MatchMethod::Manual));
        assert_eq!(posting.match_confidence, Some(1.0));

        let import = workflow.approve(id, ImportMethod::ManualReview).await.unwrap();
        assert_eq!(import.employer_id, Some(initech.id));
    }

    #[tokio::test]
    async fn placeholder_can_be_disabled() {
        let (workflow, store, id) = setup(ReviewConfig {
            allow_placeholder_employer: false,
        })
        .await;
        let err = workflow.approve(id, ImportMethod::ManualReview).await.unwrap_err();
        assert!(matches!(err, ReviewError::NoEmployer(_)));

        let import = store.get_job_import(id).await.unwrap().unwrap();
        assert_eq!(import.status, ImportStatus::Failed);
        assert_eq!(import.error_message.as_deref(), Some("no employer matched"));
        assert_eq!(store.get_posting(id).await.unwrap().unwrap().status, PostingStatus::Pending);
    }

    #[tokio::test]
    async fn catalog_failure_leaves_posting_unimported() {
        let (workflow, store, id) = setup(ReviewConfig::default()).await;
        store.fail_job_creation(true).await;
        let err = workflow.approve(id, ImportMethod::ManualReview).await.unwrap_err();
        assert!(matches!(err, ReviewError::Publish { .. }));

        let import = store.get_job_import(id).await.unwrap().unwrap();
        assert_eq!(import.status, ImportStatus::Failed);
        assert!(import.error_message.unwrap().contains("job catalog unavailable"));
        assert_eq!(store.get_posting(id).await.unwrap().unwrap().status, PostingStatus::Pending);
    }

    #[tokio::test]
    async fn reject_is_repeatable_and_keeps_the_latest_reason() {
        let (workflow, store, id) = setup(ReviewConfig::default()).await;
        let import = workflow.reject(id, Some("spam listing")).await.unwrap();
        assert_eq!(import.status, ImportStatus::Failed);
        assert_eq!(import.error_message.as_deref(), Some("spam listing"));

        let again = workflow.reject(id, None).await.unwrap();
        assert_eq!(again.id, import.id);
        let posting = store.get_posting(id).await.unwrap().unwrap();
        assert_eq!(posting.status, PostingStatus::Rejected);
        assert_eq!(posting.notes.as_deref(), Some("rejected by reviewer"));
    }

    #[tokio::test]
    async fn imported_postings_cannot_be_rejected() {
        let (workflow, _, id) = setup(ReviewConfig::default()).await;
        workflow.approve(id, ImportMethod::ManualReview).await.unwrap();
        let err = workflow.reject(id, Some("too late")).await.unwrap_err();
        assert!(matches!(err, ReviewError::Store(StoreError::IllegalTransition(_))));
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let (workflow, _, id) = setup(ReviewConfig::default()).await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            workflow.approve(missing, ImportMethod::ManualReview).await,
            Err(ReviewError::PostingNotFound(_))
        ));
        assert!(matches!(workflow.reject(missing, None).await, Err(ReviewError::PostingNotFound(_))));
        assert!(matches!(
            workflow.assign_employer(id, missing).await,
            Err(ReviewError::EmployerNotFound(_))
        ));
    }
}
