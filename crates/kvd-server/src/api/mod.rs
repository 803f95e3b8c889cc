use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use kvd_core::AppConfig;
use kvd_scraper::{CrawlRange, CrawlSummary};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::crawl::{run_crawl, CrawlError};
use crate::middleware::{request_id, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    /// Held for the duration of any crawl, scheduled or triggered.
    pub crawl_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, config: Arc<AppConfig>) -> Self {
        Self {
            pool,
            config,
            crawl_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMeta {
    fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

/// Optional body of `POST /`. Both bounds are 1-based and inclusive.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrawlRequest {
    start_auction_crawl_count: Option<usize>,
    end_auction_crawl_count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct CrawlResponse {
    status: &'static str,
    #[serde(flatten)]
    summary: CrawlSummary,
}

/// Error payload of the trigger surface: `{"error": "..."}`.
#[derive(Debug)]
pub struct TriggerError {
    status: StatusCode,
    message: String,
}

impl TriggerError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<CrawlError> for TriggerError {
    fn from(error: CrawlError) -> Self {
        match error {
            CrawlError::Busy => Self::new(StatusCode::CONFLICT, error.to_string()),
            CrawlError::Scraper(e) => {
                tracing::error!(error = %e, "triggered crawl failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(usage).post(trigger_crawl))
        .route("/api/v1/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn usage() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "kvd-crawler",
        "usage": {
            "method": "POST",
            "path": "/",
            "body": {
                "startAuctionCrawlCount": "optional, 1-based index of the first listing url",
                "endAuctionCrawlCount": "optional, 1-based inclusive index of the last listing url"
            }
        }
    }))
}

async fn trigger_crawl(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CrawlResponse>, TriggerError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CrawlRequest::default()
    } else {
        // A JSON `null` body means no range, like an empty one.
        serde_json::from_slice::<Option<CrawlRequest>>(&body)
            .map_err(|e| {
                TriggerError::new(StatusCode::BAD_REQUEST, format!("invalid request body: {e}"))
            })?
            .unwrap_or_default()
    };

    let range = CrawlRange::new(
        request.start_auction_crawl_count,
        request.end_auction_crawl_count,
    )
    .map_err(|e| TriggerError::new(StatusCode::BAD_REQUEST, e.to_string()))?;

    tracing::info!(
        start = range.start(),
        end = range.end(),
        "crawl triggered over http"
    );
    let summary = run_crawl(&state, range).await?;
    Ok(Json(CrawlResponse {
        status: "success",
        summary,
    }))
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match kvd_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
