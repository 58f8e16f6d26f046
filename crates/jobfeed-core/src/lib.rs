//! Core domain model for the external job ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

pub mod normalize;

pub const CRATE_NAME: &str = "jobfeed-core";

/// Hard cap on stored description length, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed set of snake_case text values as a Rust enum with
/// matching serde, `Display` and `FromStr` impls (the same text is used as
/// the database representation).
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(
    /// Broad category of an upstream source, as recorded by the administrator.
    SourceType {
        Rss => "rss",
        Api => "api",
        Scraper => "scraper",
        Partner => "partner",
    }
);

text_enum!(
    /// Explicit adapter tag. Adapter dispatch happens on this value only.
    Vendor {
        Rss => "rss",
        Adzuna => "adzuna",
        Usajobs => "usajobs",
        IndeedPublisher => "indeed_publisher",
        Scraper => "scraper",
    }
);

text_enum!(
    PostingStatus {
        Pending => "pending",
        Matched => "matched",
        Imported => "imported",
        Duplicate => "duplicate",
        Rejected => "rejected",
    }
);

text_enum!(
    MatchMethod {
        ExactName => "exact_name",
        FuzzyName => "fuzzy_name",
        Domain => "domain",
        Manual => "manual",
    }
);

text_enum!(
    JobType {
        FullTime => "full_time",
        PartTime => "part_time",
        Contract => "contract",
        Internship => "internship",
        Temporary => "temporary",
    }
);

text_enum!(
    WorkSetting {
        Onsite => "onsite",
        Remote => "remote",
        Hybrid => "hybrid",
    }
);

text_enum!(
    ExperienceLevel {
        Entry => "entry",
        Mid => "mid",
        Senior => "senior",
        Lead => "lead",
        Executive => "executive",
    }
);

text_enum!(
    SyncStatus {
        Running => "running",
        Success => "success",
        Partial => "partial",
        Failed => "failed",
    }
);

text_enum!(
    RunType {
        Manual => "manual",
        Scheduled => "scheduled",
    }
);

text_enum!(
    ImportStatus {
        Pending => "pending",
        Importing => "importing",
        Imported => "imported",
        Failed => "failed",
    }
);

text_enum!(
    ImportMethod {
        Auto => "auto",
        ManualReview => "manual_review",
        EmployerApproval => "employer_approval",
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal posting status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: PostingStatus,
    pub to: PostingStatus,
}

impl PostingStatus {
    /// Same-state transitions are always allowed so that review actions stay
    /// idempotent under re-invocation.
    pub fn can_transition_to(self, next: PostingStatus) -> bool {
        use PostingStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Matched | Duplicate | Rejected | Imported)
                | (Matched, Imported | Rejected)
                | (Duplicate, Imported | Rejected)
                | (Rejected, Imported)
        )
    }

    pub fn transition(self, next: PostingStatus) -> Result<PostingStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SalaryRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SalaryRange {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Adapter output before normalization. Vendor adapters map their own
/// schemas onto this shape; structured salary and job-type values take
/// precedence over the text heuristics applied by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub external_id: String,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    pub company_name: Option<String>,
    pub company_url: Option<String>,
    pub location: Location,
    pub salary: SalaryRange,
    pub salary_text: Option<String>,
    pub job_type: Option<JobType>,
    pub job_type_text: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub raw: JsonValue,
}

impl RawCandidate {
    pub fn new(external_id: impl Into<String>, source_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            source_url: source_url.into(),
            title: title.into(),
            description: None,
            company_name: None,
            company_url: None,
            location: Location::default(),
            salary: SalaryRange::default(),
            salary_text: None,
            job_type: None,
            job_type_text: None,
            posted_at: None,
            expires_at: None,
            raw: JsonValue::Null,
        }
    }
}

/// Normalized posting handed to the store gateway for upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosting {
    pub source_id: Uuid,
    pub external_id: String,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    pub company_name: Option<String>,
    pub company_url: Option<String>,
    pub location: Location,
    pub salary: SalaryRange,
    pub job_type: Option<JobType>,
    pub work_setting: Option<WorkSetting>,
    pub experience_level: Option<ExperienceLevel>,
    pub raw_payload: JsonValue,
    pub seen_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPosting {
    pub id: Uuid,
    pub source_id: Uuid,
    pub external_id: String,
    pub source_url: String,
    pub title: String,
    pub description: Option<String>,
    pub company_name: Option<String>,
    pub company_url: Option<String>,
    pub location: Location,
    pub salary: SalaryRange,
    pub job_type: Option<JobType>,
    pub work_setting: Option<WorkSetting>,
    pub experience_level: Option<ExperienceLevel>,
    pub matched_employer_id: Option<Uuid>,
    pub match_confidence: Option<f64>,
    pub match_method: Option<MatchMethod>,
    pub status: PostingStatus,
    pub notes: Option<String>,
    pub raw_payload: JsonValue,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: Uuid,
    pub name: String,
    pub source_type: SourceType,
    pub vendor: Vendor,
    pub is_active: bool,
    /// Vendor-specific settings (feed URL, query, credentials).
    pub config: JsonValue,
    pub sync_frequency_minutes: Option<i32>,
    pub rate_limit_per_minute: Option<i32>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SourceConfig {
    /// Whether a scheduled sweep should pick this source up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match (self.last_synced_at, self.sync_frequency_minutes) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(last), Some(minutes)) => now - last >= chrono::Duration::minutes(i64::from(minutes)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub jobs_found: i32,
    pub jobs_new: i32,
    pub jobs_updated: i32,
    pub jobs_duplicates: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: Uuid,
    pub source_id: Uuid,
    pub run_type: RunType,
    pub status: SyncStatus,
    pub counts: SyncCounts,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

/// Terminal state written onto a SyncLog when a run finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub status: SyncStatus,
    pub counts: SyncCounts,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobImport {
    pub id: Uuid,
    pub external_posting_id: Uuid,
    pub employer_id: Option<Uuid>,
    pub status: ImportStatus,
    pub method: ImportMethod,
    pub job_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub imported_at: Option<DateTime<Utc>>,
}

/// Desired state of the JobImport row for a posting; applied as an upsert
/// keyed by external posting id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobImportUpdate {
    pub external_posting_id: Uuid,
    pub employer_id: Option<Uuid>,
    pub status: ImportStatus,
    pub method: ImportMethod,
    pub job_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportQueueEntry {
    pub posting: ExternalPosting,
    pub import: Option<JobImport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompanyMatch {
    pub employer_id: Uuid,
    pub confidence: f64,
    pub method: MatchMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employer {
    pub id: Uuid,
    pub name: String,
    pub website: Option<String>,
    pub is_active: bool,
    pub is_placeholder: bool,
}

/// Published catalog job as seen by cross-source duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedJobRef {
    pub job_id: Uuid,
    pub title: String,
    pub employer_name: String,
    pub external_posting_id: Option<Uuid>,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a single instant, for deterministic runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
