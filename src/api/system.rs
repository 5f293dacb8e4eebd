//! System API endpoints: health probes and the audit trail.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::validation::validate_audit_limit;
use super::{ApiError, ApiResponse, AppState, AuditEntryDto};
use crate::constants::limits::DEFAULT_AUDIT_LIMIT;
use crate::domain::AccountId;

#[derive(Debug, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthReadyResponse {
    pub ready: bool,
    pub database: bool,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<u64>,
    pub account_id: Option<i32>,
    pub event_type: Option<String>,
}

/// `GET /api/system/health/live`
///
/// Lightweight liveness probe to indicate the API process is running.
pub async fn health_live(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthLiveResponse {
        status: "alive",
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /api/system/health/ready`
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store().ping().await.is_ok();
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(HealthReadyResponse {
            ready: database,
            database,
        })),
    )
        .into_response()
}

/// `GET /api/system/audit`
///
/// Newest audit entries, optionally narrowed to one account or event type.
pub async fn get_audit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<Vec<AuditEntryDto>>>, ApiError> {
    let limit = validate_audit_limit(query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT))?;

    let entries = state
        .shared
        .audit_service
        .recent(
            limit,
            query.account_id.map(AccountId::new),
            query.event_type.filter(|t| !t.is_empty()),
        )
        .await?;

    Ok(Json(ApiResponse::success(
        entries.into_iter().map(AuditEntryDto::from).collect(),
    )))
}
