use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobfeed_core::{
    CompanyMatch, Employer, ExternalPosting, ImportQueueEntry, ImportStatus, JobImport,
    JobImportUpdate, Location, NewPosting, PostingStatus, PublishedJobRef, RunType, SalaryRange,
    SourceConfig, SyncCounts, SyncLog, SyncOutcome, UnknownVariant,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::{
    escape_like, EmployerCatalog, IngestionStore, SimilarPostingQuery, StoreError, UpsertOutcome,
    PLACEHOLDER_EMPLOYER_NAME,
};

const POSTING_COLUMNS: &str = r#"
    ep.id, ep.source_id, ep.external_id, ep.source_url, ep.title, ep.description,
    ep.company_name, ep.company_url, ep.city, ep.state, ep.country,
    ep.salary_min, ep.salary_max, ep.job_type, ep.work_setting, ep.experience_level,
    ep.matched_employer_id, ep.match_confidence, ep.match_method, ep.status, ep.notes,
    ep.raw_payload, ep.first_seen_at, ep.last_seen_at, ep.expires_at
"#;

const SOURCE_COLUMNS: &str = r#"
    id, name, source_type, vendor, is_active, config,
    sync_frequency_minutes, rate_limit_per_minute, last_synced_at
"#;

const SYNC_LOG_COLUMNS: &str = r#"
    id, source_id, run_type, status, jobs_found, jobs_new, jobs_updated, jobs_duplicates,
    errors, started_at, completed_at, duration_ms
"#;

const IMPORT_COLUMNS: &str = r#"
    id, external_posting_id, employer_id, status, method, job_id, error_message,
    created_at, updated_at, imported_at
"#;

/// PostgreSQL implementation of the gateway traits. Schema lives in
/// `migrations/` at the workspace root.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    async fn require_posting(&self, id: Uuid) -> Result<ExternalPosting, StoreError> {
        self.get_posting(id)
            .await?
            .ok_or_else(|| StoreError::not_found("external posting", id))
    }
}

fn parse_text<T>(column: &'static str, text: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = UnknownVariant>,
{
    text.parse().map_err(|e: UnknownVariant| StoreError::Decode {
        column,
        message: e.to_string(),
    })
}

fn decode_enum<T>(row: &PgRow, column: &'static str) -> Result<T, StoreError>
where
    T: FromStr<Err = UnknownVariant>,
{
    let text: String = row.try_get(column)?;
    parse_text(column, &text)
}

fn decode_opt_enum<T>(row: &PgRow, column: &'static str) -> Result<Option<T>, StoreError>
where
    T: FromStr<Err = UnknownVariant>,
{
    let text: Option<String> = row.try_get(column)?;
    text.map(|t| parse_text(column, &t)).transpose()
}

fn posting_from_row(row: &PgRow) -> Result<ExternalPosting, StoreError> {
    Ok(ExternalPosting {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        external_id: row.try_get("external_id")?,
        source_url: row.try_get("source_url")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        company_name: row.try_get("company_name")?,
        company_url: row.try_get("company_url")?,
        location: Location {
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            country: row.try_get("country")?,
        },
        salary: SalaryRange {
            min: row.try_get("salary_min")?,
            max: row.try_get("salary_max")?,
        },
        job_type: decode_opt_enum(row, "job_type")?,
        work_setting: decode_opt_enum(row, "work_setting")?,
        experience_level: decode_opt_enum(row, "experience_level")?,
        matched_employer_id: row.try_get("matched_employer_id")?,
        match_confidence: row.try_get("match_confidence")?,
        match_method: decode_opt_enum(row, "match_method")?,
        status: decode_enum(row, "status")?,
        notes: row.try_get("notes")?,
        raw_payload: row.try_get("raw_payload")?,
        first_seen_at: row.try_get("first_seen_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

fn source_from_row(row: &PgRow) -> Result<SourceConfig, StoreError> {
    Ok(SourceConfig {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        source_type: decode_enum(row, "source_type")?,
        vendor: decode_enum(row, "vendor")?,
        is_active: row.try_get("is_active")?,
        config: row.try_get("config")?,
        sync_frequency_minutes: row.try_get("sync_frequency_minutes")?,
        rate_limit_per_minute: row.try_get("rate_limit_per_minute")?,
        last_synced_at: row.try_get("last_synced_at")?,
    })
}

fn sync_log_from_row(row: &PgRow) -> Result<SyncLog, StoreError> {
    let Json(errors): Json<Vec<String>> = row.try_get("errors")?;
    Ok(SyncLog {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        run_type: decode_enum(row, "run_type")?,
        status: decode_enum(row, "status")?,
        counts: SyncCounts {
            jobs_found: row.try_get("jobs_found")?,
            jobs_new: row.try_get("jobs_new")?,
            jobs_updated: row.try_get("jobs_updated")?,
            jobs_duplicates: row.try_get("jobs_duplicates")?,
        },
        errors,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        duration_ms: row.try_get("duration_ms")?,
    })
}

fn import_from_row(row: &PgRow, prefix: &str) -> Result<JobImport, StoreError> {
    let col = |name: &str| format!("{prefix}{name}");
    let status: String = row.try_get(col("status").as_str())?;
    let method: String = row.try_get(col("method").as_str())?;
    Ok(JobImport {
        id: row.try_get(col("id").as_str())?,
        external_posting_id: row.try_get(col("external_posting_id").as_str())?,
        employer_id: row.try_get(col("employer_id").as_str())?,
        status: parse_text("job_imports.status", &status)?,
        method: parse_text("job_imports.method", &method)?,
        job_id: row.try_get(col("job_id").as_str())?,
        error_message: row.try_get(col("error_message").as_str())?,
        created_at: row.try_get(col("created_at").as_str())?,
        updated_at: row.try_get(col("updated_at").as_str())?,
        imported_at: row.try_get(col("imported_at").as_str())?,
    })
}

fn employer_from_row(row: &PgRow) -> Result<Employer, StoreError> {
    Ok(Employer {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        website: row.try_get("website")?,
        is_active: row.try_get("is_active")?,
        is_placeholder: row.try_get("is_placeholder")?,
    })
}

#[async_trait]
impl IngestionStore for PgStore {
    async fn get_source(&self, id: Uuid) -> Result<Option<SourceConfig>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM job_sources WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn find_source_by_name(&self, name: &str) -> Result<Option<SourceConfig>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM job_sources WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn list_sources(&self) -> Result<Vec<SourceConfig>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM job_sources ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn save_source(&self, source: &SourceConfig) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_sources (
                id, name, source_type, vendor, is_active, config,
                sync_frequency_minutes, rate_limit_per_minute, last_synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                source_type = EXCLUDED.source_type,
                vendor = EXCLUDED.vendor,
                is_active = EXCLUDED.is_active,
                config = EXCLUDED.config,
                sync_frequency_minutes = EXCLUDED.sync_frequency_minutes,
                rate_limit_per_minute = EXCLUDED.rate_limit_per_minute,
                last_synced_at = EXCLUDED.last_synced_at,
                updated_at = NOW()
            "#,
        )
        .bind(source.id)
        .bind(&source.name)
        .bind(source.source_type.as_str())
        .bind(source.vendor.as_str())
        .bind(source.is_active)
        .bind(&source.config)
        .bind(source.sync_frequency_minutes)
        .bind(source.rate_limit_per_minute)
        .bind(source.last_synced_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_source_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE job_sources SET last_synced_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("source", id));
        }
        Ok(())
    }

    async fn set_source_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE job_sources SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("source", id));
        }
        Ok(())
    }

    async fn upsert_posting(&self, posting: &NewPosting) -> Result<UpsertOutcome, StoreError> {
        // xmax is zero only for a freshly inserted tuple.
        let row = sqlx::query(
            r#"
            INSERT INTO external_postings AS ep (
                id, source_id, external_id, source_url, title, description,
                company_name, company_url, city, state, country,
                salary_min, salary_max, job_type, work_setting, experience_level,
                status, raw_payload, first_seen_at, last_seen_at, expires_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16,
                'pending', $17, $18, $18, $19
            )
            ON CONFLICT (source_id, external_id) DO UPDATE SET
                source_url = EXCLUDED.source_url,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                company_name = EXCLUDED.company_name,
                company_url = EXCLUDED.company_url,
                city = EXCLUDED.city,
                state = EXCLUDED.state,
                country = EXCLUDED.country,
                salary_min = EXCLUDED.salary_min,
                salary_max = EXCLUDED.salary_max,
                job_type = EXCLUDED.job_type,
                work_setting = EXCLUDED.work_setting,
                experience_level = EXCLUDED.experience_level,
                raw_payload = EXCLUDED.raw_payload,
                last_seen_at = EXCLUDED.last_seen_at,
                expires_at = EXCLUDED.expires_at
            RETURNING ep.id, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(posting.source_id)
        .bind(&posting.external_id)
        .bind(&posting.source_url)
        .bind(&posting.title)
        .bind(&posting.description)
        .bind(&posting.company_name)
        .bind(&posting.company_url)
        .bind(&posting.location.city)
        .bind(&posting.location.state)
        .bind(&posting.location.country)
        .bind(posting.salary.min)
        .bind(posting.salary.max)
        .bind(posting.job_type.map(|v| v.as_str()))
        .bind(posting.work_setting.map(|v| v.as_str()))
        .bind(posting.experience_level.map(|v| v.as_str()))
        .bind(&posting.raw_payload)
        .bind(posting.seen_at)
        .bind(posting.expires_at)
        .fetch_one(&self.pool)
        .await?;

        let id: Uuid = row.try_get("id")?;
        let inserted: bool = row.try_get("inserted")?;
        debug!(%id, external_id = %posting.external_id, inserted, "upserted external posting");
        Ok(if inserted {
            UpsertOutcome::Inserted(id)
        } else {
            UpsertOutcome::Updated(id)
        })
    }

    async fn get_posting(&self, id: Uuid) -> Result<Option<ExternalPosting>, StoreError> {
        let row = sqlx::query(&format!("SELECT {POSTING_COLUMNS} FROM external_postings ep WHERE ep.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(posting_from_row).transpose()
    }

    async fn find_posting_by_external_id(
        &self,
        source_id: Uuid,
        external_id: &str,
    ) -> Result<Option<ExternalPosting>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {POSTING_COLUMNS} FROM external_postings ep WHERE ep.source_id = $1 AND ep.external_id = $2"
        ))
        .bind(source_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(posting_from_row).transpose()
    }

    async fn find_similar_postings(
        &self,
        query: SimilarPostingQuery<'_>,
    ) -> Result<Vec<ExternalPosting>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {POSTING_COLUMNS}
              FROM external_postings ep
             WHERE ep.source_id = $1
               AND ep.external_id <> $2
               AND ep.title ILIKE $3
               AND lower(ep.company_name) = lower($4)
             ORDER BY ep.last_seen_at DESC
             LIMIT $5
            "#
        ))
        .bind(query.source_id)
        .bind(query.exclude_external_id)
        .bind(format!("{}%", escape_like(query.title_prefix)))
        .bind(query.company_name)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(posting_from_row).collect()
    }

    async fn record_match(&self, id: Uuid, found: &CompanyMatch) -> Result<ExternalPosting, StoreError> {
        let current = self.require_posting(id).await?;
        current.status.transition(PostingStatus::Matched)?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE external_postings ep
               SET status = 'matched',
                   matched_employer_id = $2,
                   match_confidence = $3,
                   match_method = $4
             WHERE ep.id = $1 AND ep.status = $5
            RETURNING {POSTING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(found.employer_id)
        .bind(found.confidence)
        .bind(found.method.as_str())
        .bind(current.status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref()
            .map(posting_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::Conflict(format!("posting {id} changed status during match")))
    }

    async fn set_posting_status(
        &self,
        id: Uuid,
        status: PostingStatus,
        notes: Option<&str>,
    ) -> Result<ExternalPosting, StoreError> {
        let current = self.require_posting(id).await?;
        current.status.transition(status)?;
        let row = sqlx::query(&format!(
            r#"
            UPDATE external_postings ep
               SET status = $2,
                   notes = COALESCE($3, ep.notes)
             WHERE ep.id = $1 AND ep.status = $4
            RETURNING {POSTING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(notes)
        .bind(current.status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref()
            .map(posting_from_row)
            .transpose()?
            .ok_or_else(|| StoreError::Conflict(format!("posting {id} changed status concurrently")))
    }

    async fn list_import_queue(
        &self,
        status: Option<PostingStatus>,
        limit: i64,
    ) -> Result<Vec<ImportQueueEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {POSTING_COLUMNS},
                   ji.id AS ji_id,
                   ji.external_posting_id AS ji_external_posting_id,
                   ji.employer_id AS ji_employer_id,
                   ji.status AS ji_status,
                   ji.method AS ji_method,
                   ji.job_id AS ji_job_id,
                   ji.error_message AS ji_error_message,
                   ji.created_at AS ji_created_at,
                   ji.updated_at AS ji_updated_at,
                   ji.imported_at AS ji_imported_at
              FROM external_postings ep
              LEFT JOIN job_imports ji ON ji.external_posting_id = ep.id
             WHERE ($1::text IS NULL OR ep.status = $1)
             ORDER BY ep.last_seen_at DESC
             LIMIT $2
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let import_id: Option<Uuid> = row.try_get("ji_id")?;
                let import = match import_id {
                    Some(_) => Some(import_from_row(row, "ji_")?),
                    None => None,
                };
                Ok(ImportQueueEntry {
                    posting: posting_from_row(row)?,
                    import,
                })
            })
            .collect()
    }

    async fn start_sync_log(
        &self,
        source_id: Uuid,
        run_type: RunType,
        started_at: DateTime<Utc>,
    ) -> Result<SyncLog, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO sync_logs (id, source_id, run_type, status, errors, started_at)
            VALUES ($1, $2, $3, 'running', '[]'::jsonb, $4)
            RETURNING {SYNC_LOG_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(source_id)
        .bind(run_type.as_str())
        .bind(started_at)
        .fetch_one(&self.pool)
        .await?;
        sync_log_from_row(&row)
    }

    async fn finish_sync_log(&self, id: Uuid, outcome: &SyncOutcome) -> Result<SyncLog, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE sync_logs
               SET status = $2,
                   jobs_found = $3,
                   jobs_new = $4,
                   jobs_updated = $5,
                   jobs_duplicates = $6,
                   errors = $7,
                   completed_at = $8,
                   duration_ms = $9
             WHERE id = $1 AND status = 'running'
            RETURNING {SYNC_LOG_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(outcome.status.as_str())
        .bind(outcome.counts.jobs_found)
        .bind(outcome.counts.jobs_new)
        .bind(outcome.counts.jobs_updated)
        .bind(outcome.counts.jobs_duplicates)
        .bind(Json(&outcome.errors))
        .bind(outcome.completed_at)
        .bind(outcome.duration_ms)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => sync_log_from_row(&row),
            None => {
                let exists: Option<String> = sqlx::query_scalar("SELECT status FROM sync_logs WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
                Err(match exists {
                    Some(status) => StoreError::Conflict(format!("sync log {id} is already {status}")),
                    None => StoreError::not_found("sync log", id),
                })
            }
        }
    }

    async fn recent_sync_logs(&self, source_id: Uuid, limit: i64) -> Result<Vec<SyncLog>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SYNC_LOG_COLUMNS} FROM sync_logs WHERE source_id = $1 ORDER BY started_at DESC, created_seq DESC LIMIT $2"
        ))
        .bind(source_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(sync_log_from_row).collect()
    }

    async fn upsert_job_import(&self, update: &JobImportUpdate) -> Result<JobImport, StoreError> {
        let imported_at = (update.status == ImportStatus::Imported).then_some(update.at);
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO job_imports AS ji (
                id, external_posting_id, employer_id, status, method, job_id,
                error_message, created_at, updated_at, imported_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9)
            ON CONFLICT (external_posting_id) DO UPDATE SET
                employer_id = COALESCE(EXCLUDED.employer_id, ji.employer_id),
                status = EXCLUDED.status,
                method = EXCLUDED.method,
                job_id = COALESCE(EXCLUDED.job_id, ji.job_id),
                error_message = EXCLUDED.error_message,
                updated_at = EXCLUDED.updated_at,
                imported_at = COALESCE(ji.imported_at, EXCLUDED.imported_at)
            RETURNING {IMPORT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(update.external_posting_id)
        .bind(update.employer_id)
        .bind(update.status.as_str())
        .bind(update.method.as_str())
        .bind(update.job_id)
        .bind(&update.error_message)
        .bind(update.at)
        .bind(imported_at)
        .fetch_one(&self.pool)
        .await?;
        import_from_row(&row, "")
    }

    async fn get_job_import(&self, external_posting_id: Uuid) -> Result<Option<JobImport>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {IMPORT_COLUMNS} FROM job_imports WHERE external_posting_id = $1"
        ))
        .bind(external_posting_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(|r| import_from_row(r, "")).transpose()
    }
}

#[async_trait]
impl EmployerCatalog for PgStore {
    async fn find_employer_by_exact_name(&self, name: &str) -> Result<Option<Employer>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, website, is_active, is_placeholder
              FROM employers
             WHERE lower(name) = lower($1) AND is_active AND NOT is_placeholder
             LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(employer_from_row).transpose()
    }

    async fn search_employers_by_name(&self, fragment: &str, limit: i64) -> Result<Vec<Employer>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, website, is_active, is_placeholder
              FROM employers
             WHERE name ILIKE $1 AND is_active AND NOT is_placeholder
             ORDER BY name
             LIMIT $2
            "#,
        )
        .bind(format!("%{}%", escape_like(fragment)))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(employer_from_row).collect()
    }

    async fn find_employer_by_website_host(&self, host: &str) -> Result<Option<Employer>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, website, is_active, is_placeholder
              FROM employers
             WHERE website ILIKE $1 AND is_active AND NOT is_placeholder
             LIMIT 1
            "#,
        )
        .bind(format!("%{}%", escape_like(host)))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(employer_from_row).transpose()
    }

    async fn get_employer(&self, id: Uuid) -> Result<Option<Employer>, StoreError> {
        let row = sqlx::query("SELECT id, name, website, is_active, is_placeholder FROM employers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(employer_from_row).transpose()
    }

    async fn placeholder_employer(&self) -> Result<Employer, StoreError> {
        // Partial unique index on is_placeholder keeps this single-row.
        sqlx::query(
            r#"
            INSERT INTO employers (id, name, website, is_active, is_placeholder)
            VALUES ($1, $2, NULL, TRUE, TRUE)
            ON CONFLICT (is_placeholder) WHERE is_placeholder DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(PLACEHOLDER_EMPLOYER_NAME)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, name, website, is_active, is_placeholder FROM employers WHERE is_placeholder LIMIT 1",
        )
        .fetch_one(&self.pool)
        .await?;
        employer_from_row(&row)
    }

    async fn find_published_jobs_by_title_prefix(
        &self,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<PublishedJobRef>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT j.id AS job_id, j.title, e.name AS employer_name, j.external_posting_id
              FROM jobs j
              JOIN employers e ON e.id = j.employer_id
             WHERE j.title ILIKE $1
             ORDER BY j.created_at DESC
             LIMIT $2
            "#,
        )
        .bind(format!("{}%", escape_like(prefix)))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PublishedJobRef {
                    job_id: row.try_get("job_id")?,
                    title: row.try_get("title")?,
                    employer_name: row.try_get("employer_name")?,
                    external_posting_id: row.try_get("external_posting_id")?,
                })
            })
            .collect()
    }

    async fn create_published_job(&self, posting: &ExternalPosting, employer_id: Uuid) -> Result<Uuid, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO jobs (
                id, employer_id, external_posting_id, title, description, source_url,
                city, state, country, salary_min, salary_max,
                job_type, work_setting, experience_level, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (external_posting_id) DO UPDATE SET
                employer_id = EXCLUDED.employer_id,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(employer_id)
        .bind(posting.id)
        .bind(&posting.title)
        .bind(&posting.description)
        .bind(&posting.source_url)
        .bind(&posting.location.city)
        .bind(&posting.location.state)
        .bind(&posting.location.country)
        .bind(posting.salary.min)
        .bind(posting.salary.max)
        .bind(posting.job_type.map(|v| v.as_str()))
        .bind(posting.work_setting.map(|v| v.as_str()))
        .bind(posting.experience_level.map(|v| v.as_str()))
        .bind(posting.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }
}
