use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::models::DIRECT_REFERER;
use crate::analytics::{
    extract_client_ip, HealthReport, PaginatedVisitors, VisitorService, VisitorStats,
    VisitorSummary,
};
use crate::storage::QueryError;

pub const MAX_PAGE_SIZE: i64 = 100;

pub struct AppState {
    pub service: Arc<VisitorService>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordVisitResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordVisitRequest {
    pub session_id: Option<String>,
    #[serde(rename = "ref")]
    pub referer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordVisitQuery {
    #[serde(rename = "ref")]
    pub referer: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    pub limit: i64,
}

fn default_recent_limit() -> i64 {
    10
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub page_size: i64,
    pub total: i64,
    pub has_more: bool,
    pub total_pages: i64,
}

#[derive(Serialize)]
pub struct PageData {
    pub visitors: Vec<VisitorSummary>,
    pub pagination: Pagination,
}

fn failure(error: &str, err: QueryError) -> ApiError {
    tracing::error!("{}: {}", error, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            success: false,
            error: error.to_string(),
            details: Some(err.to_string()),
        }),
    )
}

fn invalid_pagination(details: Option<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            error: "Invalid pagination parameters".to_string(),
            details,
        }),
    )
}

/// Reject pagination outside `page >= 1` and `1 <= page_size <= 100`
pub fn validate_pagination(page: i64, page_size: i64) -> Result<(u32, u32), ApiError> {
    let valid = page >= 1 && (1..=MAX_PAGE_SIZE).contains(&page_size);
    match (valid, u32::try_from(page), u32::try_from(page_size)) {
        (true, Ok(page), Ok(page_size)) => Ok((page, page_size)),
        _ => Err(invalid_pagination(None)),
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Random part plus millisecond clock, both base36
pub fn generate_session_id() -> String {
    let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
    format!("{}{}", to_base36(rand::random::<u64>()), to_base36(millis))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Record one visit for the calling client
pub async fn record_visit(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordVisitQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RecordVisitResponse>, ApiError> {
    let payload: RecordVisitRequest = if body.is_empty() {
        RecordVisitRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    success: false,
                    error: "Invalid request body".to_string(),
                    details: Some(e.to_string()),
                }),
            )
        })?
    };

    let ip_address = extract_client_ip(&headers);
    let user_agent = header_str(&headers, header::USER_AGENT.as_str());
    let referer = header_str(&headers, header::REFERER.as_str())
        .map(str::to_string)
        .or(query.referer)
        .or(payload.referer)
        .unwrap_or_else(|| DIRECT_REFERER.to_string());
    let session_id = payload
        .session_id
        .filter(|s| !s.trim().is_empty())
        .or_else(|| header_str(&headers, "x-session-id").map(str::to_string))
        .unwrap_or_else(generate_session_id);

    state
        .service
        .record_visit(&ip_address, user_agent, &referer, &session_id)
        .await
        .map_err(|e| failure("Failed to record visit", e))?;

    Ok(Json(RecordVisitResponse {
        success: true,
        message: "Visit recorded".to_string(),
        session_id,
    }))
}

/// Visitor totals and the latest visits
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<VisitorStats>>, ApiError> {
    state
        .service
        .get_stats()
        .await
        .map(DataResponse::ok)
        .map_err(|e| failure("Failed to fetch visitor stats", e))
}

/// One page of visit history
pub async fn get_paginated(
    State(state): State<Arc<AppState>>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<DataResponse<PageData>>, ApiError> {
    let Query(query) =
        query.map_err(|rejection| invalid_pagination(Some(rejection.body_text())))?;
    let (page, page_size) = validate_pagination(query.page, query.page_size)?;

    let PaginatedVisitors {
        visitors,
        total,
        has_more,
    } = state
        .service
        .get_paginated(page, page_size)
        .await
        .map_err(|e| failure("Failed to fetch visitor records", e))?;

    let page_size = i64::from(page_size);
    Ok(DataResponse::ok(PageData {
        visitors,
        pagination: Pagination {
            current_page: i64::from(page),
            page_size,
            total,
            has_more,
            total_pages: (total + page_size - 1) / page_size,
        },
    }))
}

/// Latest visits, newest first
pub async fn get_recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<DataResponse<Vec<VisitorSummary>>>, ApiError> {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE) as u32;

    state
        .service
        .get_recent_visitors(limit)
        .await
        .map(DataResponse::ok)
        .map_err(|e| failure("Failed to fetch recent visitors", e))
}

/// Drop every cached visitor read
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<SuccessResponse> {
    state.service.clear_cache();
    Json(SuccessResponse {
        success: true,
        message: "Cache cleared".to_string(),
    })
}

/// Health check endpoint
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthReport>) {
    let report = state.service.health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        tracing::error!("Database health check failed: {:?}", report.error);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}
