use axum::{
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::analytics::VisitorService;

use super::handlers::{
    clear_cache, get_paginated, get_recent, get_stats, health_check, record_visit, AppState,
};

pub fn create_api_router(service: Arc<VisitorService>) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/visitors", get(get_stats).post(record_visit))
        .route("/api/visitors/paginated", get(get_paginated))
        .route("/api/visitors/recent", get(get_recent))
        .route("/api/visitors/cache", delete(clear_cache))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
