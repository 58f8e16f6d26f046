//! JSON endpoints the admin UI and external schedulers call.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jobfeed_core::{Clock, ImportMethod, PostingStatus, RunType, SystemClock};
use jobfeed_storage::{EmployerCatalog, HttpFetcher, HttpTransport, IngestionStore, PgStore, StoreError};
use jobfeed_sync::{FeedHealthMonitor, ReviewError, ReviewWorkflow, SyncConfig, SyncError, SyncOrchestrator};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobfeed-web";

const DEFAULT_QUEUE_LIMIT: i64 = 100;
const DEFAULT_LOG_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IngestionStore>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub review: Arc<ReviewWorkflow>,
    pub health: Arc<FeedHealthMonitor>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IngestionStore>,
        catalog: Arc<dyn EmployerCatalog>,
        http: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            orchestrator: Arc::new(SyncOrchestrator::new(
                store.clone(),
                catalog.clone(),
                http.clone(),
                clock.clone(),
                config,
            )),
            review: Arc::new(ReviewWorkflow::new(store.clone(), catalog, clock, config.review)),
            health: Arc::new(FeedHealthMonitor::new(store.clone(), http, config.health)),
            store,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/sources", get(list_sources_handler))
        .route("/api/sources/{id}/sync", post(sync_source_handler))
        .route("/api/sources/{id}/logs", get(sync_logs_handler))
        .route("/api/imports", get(import_queue_handler))
        .route("/api/postings/{id}/approve", post(approve_handler))
        .route("/api/postings/{id}/reject", post(reject_handler))
        .route("/api/postings/{id}/employer", post(assign_employer_handler))
        .route("/api/feeds/health", get(feed_health_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving jobfeed api");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();
    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    let http = Arc::new(HttpFetcher::new(config.http_client_config())?);
    let state = AppState::new(store.clone(), store, http, Arc::new(SystemClock), &config);
    serve(state, config.web_port).await
}

/// Maps pipeline errors to HTTP statuses with a `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::IllegalTransition(_) | StoreError::Conflict(_) | StoreError::UniqueViolation(_) => {
            StatusCode::CONFLICT
        }
        StoreError::Decode { .. } | StoreError::Database(_) | StoreError::Backend(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::new(store_status(&err), err.to_string())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            SyncError::SourceExists(_) => StatusCode::CONFLICT,
            SyncError::InvalidFeed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SyncError::Store(inner) => store_status(inner),
        };
        Self::new(status, err.to_string())
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        let status = match &err {
            ReviewError::PostingNotFound(_) | ReviewError::EmployerNotFound(_) => StatusCode::NOT_FOUND,
            ReviewError::NoEmployer(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReviewError::Publish { .. } => StatusCode::BAD_GATEWAY,
            ReviewError::Store(inner) => store_status(inner),
        };
        Self::new(status, err.to_string())
    }
}

type ApiResult = Result<Response, ApiError>;

async fn list_sources_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(state.store.list_sources().await?).into_response())
}

#[derive(Debug, Deserialize, Default)]
struct SyncQuery {
    run_type: Option<RunType>,
}

async fn sync_source_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<SyncQuery>,
) -> ApiResult {
    let run_type = query.run_type.unwrap_or(RunType::Manual);
    let summary = state.orchestrator.sync_source(id, run_type).await?;
    Ok(Json(summary).into_response())
}

#[derive(Debug, Deserialize, Default)]
struct LimitQuery {
    limit: Option<i64>,
}

async fn sync_logs_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> ApiResult {
    if state.store.get_source(id).await?.is_none() {
        return Err(SyncError::SourceNotFound(id).into());
    }
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, 200);
    Ok(Json(state.store.recent_sync_logs(id, limit).await?).into_response())
}

#[derive(Debug, Deserialize, Default)]
struct ImportQueueQuery {
    status: Option<PostingStatus>,
    limit: Option<i64>,
}

async fn import_queue_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImportQueueQuery>,
) -> ApiResult {
    let limit = query.limit.unwrap_or(DEFAULT_QUEUE_LIMIT).clamp(1, 500);
    let entries = state.review.import_queue(query.status, limit).await?;
    Ok(Json(entries).into_response())
}

#[derive(Debug, Deserialize, Default)]
struct ApproveQuery {
    method: Option<ImportMethod>,
}

async fn approve_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ApproveQuery>,
) -> ApiResult {
    let method = query.method.unwrap_or(ImportMethod::ManualReview);
    Ok(Json(state.review.approve(id, method).await?).into_response())
}

#[derive(Debug, Deserialize, Default)]
struct RejectBody {
    reason: Option<String>,
}

async fn reject_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectBody>,
) -> ApiResult {
    Ok(Json(state.review.reject(id, body.reason.as_deref()).await?).into_response())
}

#[derive(Debug, Deserialize)]
struct AssignEmployerBody {
    employer_id: Uuid,
}

async fn assign_employer_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignEmployerBody>,
) -> ApiResult {
    Ok(Json(state.review.assign_employer(id, body.employer_id).await?).into_response())
}

async fn feed_health_handler(State(state): State<Arc<AppState>>) -> ApiResult {
    Ok(Json(state.health.report().await?).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use jobfeed_core::{FixedClock, SourceConfig, SourceType, Vendor};
    use jobfeed_storage::{FetchError, FetchedResponse, HttpRequest, MemoryStore};
    use serde_json::Value;
    use tower::ServiceExt;

    const FEED_URL: &str = "https://jobs.example.com/rss";
    const FEED: &str = r#"<rss><channel><title>Board</title>
        <item><title>Platform Engineer</title><link>https://jobs.example.com/p/1</link><guid>p-1</guid><author>Initech</author></item>
        <item><title>Support Analyst</title><link>https://jobs.example.com/p/2</link><guid>p-2</guid></item>
        </channel></rss>"#;

    struct OneFeed;

    #[async_trait]
    impl HttpTransport for OneFeed {
        async fn fetch(&self, _source_key: &str, request: &HttpRequest) -> Result<FetchedResponse, FetchError> {
            if request.url != FEED_URL {
                return Err(FetchError::HttpStatus {
                    status: 404,
                    url: request.url.clone(),
                });
            }
            Ok(FetchedResponse {
                status: 200,
                final_url: request.url.clone(),
                content_type: Some("application/rss+xml".into()),
                body: FEED.as_bytes().to_vec(),
            })
        }
    }

    async fn setup() -> (Router, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let source = SourceConfig {
            id: Uuid::new_v4(),
            name: "Board".into(),
            source_type: SourceType::Rss,
            vendor: Vendor::Rss,
            is_active: true,
            config: json!({ "feed_url": FEED_URL }),
            sync_frequency_minutes: None,
            rate_limit_per_minute: None,
            last_synced_at: None,
        };
        store.save_source(&source).await.unwrap();
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 3, 5, 12, 0, 0).single().unwrap()));
        let state = AppState::new(store.clone(), store.clone(), Arc::new(OneFeed), clock, &SyncConfig::default());
        (app(state), store, source.id)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn trigger_sync_returns_counts() {
        let (app, _, source_id) = setup().await;
        let (status, body) = call(&app, "POST", &format!("/api/sources/{source_id}/sync"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["counts"]["jobs_new"], 2);
        assert_eq!(body["run_type"], "manual");

        let (status, logs) = call(&app, "GET", &format!("/api/sources/{source_id}/logs"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_source_is_404() {
        let (app, _, _) = setup().await;
        let (status, body) = call(&app, "POST", &format!("/api/sources/{}/sync", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn review_round_trip_through_the_api() {
        let (app, store, source_id) = setup().await;
        call(&app, "POST", &format!("/api/sources/{source_id}/sync"), None).await;

        let (status, queue) = call(&app, "GET", "/api/imports?status=pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(queue.as_array().unwrap().len(), 2);

        let posting = store.find_posting_by_external_id(source_id, "p-1").await.unwrap().unwrap();
        let (status, import) = call(&app, "POST", &format!("/api/postings/{}/approve", posting.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(import["status"], "imported");

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/postings/{}/reject", posting.id),
            Some(json!({ "reason": "changed my mind" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("imported"));

        let other = store.find_posting_by_external_id(source_id, "p-2").await.unwrap().unwrap();
        let (status, import) = call(
            &app,
            "POST",
            &format!("/api/postings/{}/reject", other.id),
            Some(json!({ "reason": "not a real job" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(import["status"], "failed");
        assert_eq!(import["error_message"], "not a real job");

        let (_, queue) = call(&app, "GET", "/api/imports?status=rejected", None).await;
        assert_eq!(queue.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn manual_employer_assignment() {
        let (app, store, source_id) = setup().await;
        call(&app, "POST", &format!("/api/sources/{source_id}/sync"), None).await;
        let initech = store.add_employer("Initech Systems", None).await;
        let posting = store.find_posting_by_external_id(source_id, "p-2").await.unwrap().unwrap();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/postings/{}/employer", posting.id),
            Some(json!({ "employer_id": initech.id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "matched");
        assert_eq!(body["match_method"], "manual");

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/postings/{}/employer", posting.id),
            Some(json!({ "employer_id": Uuid::new_v4() })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn feed_health_lists_rss_sources() {
        let (app, _, source_id) = setup().await;
        let (status, body) = call(&app, "GET", "/api/feeds/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["source_id"], source_id.to_string());
        assert_eq!(rows[0]["healthy"], true);
        assert_eq!(rows[0]["validation"]["item_count"], 2);
    }

    #[tokio::test]
    async fn bad_status_filter_is_rejected() {
        let (app, _, _) = setup().await;
        let (status, _) = call(&app, "GET", "/api/imports?status=bogus", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
