use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

mod health;
mod humanize;
#[cfg(test)]
mod tests;

pub(crate) const SERVICE_NAME: &str = "Humanization Relay";

/// Success envelope shared by the JSON endpoints.
#[derive(Serialize, Debug)]
pub(crate) struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(ApiResponse {
            success: true,
            data,
        })
    }
}

pub(crate) fn router(state: AppState, cors_origins: Vec<HeaderValue>) -> Router {
    let humanize_router = Router::new()
        .route("/", post(humanize::handle_humanize))
        .route("/quick", post(humanize::handle_quick))
        .route("/stream", post(humanize::handle_stream))
        .route("/styles", get(humanize::handle_styles));

    let health_router = Router::new()
        .route("/", get(health::handle_health))
        .route("/detailed", get(health::handle_detailed_health));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(cors_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(handle_root))
        .nest("/humanize", humanize_router)
        .nest("/health", health_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[axum_macros::debug_handler]
async fn handle_root() -> Json<Value> {
    Json(json!({
        "message": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "humanize": "/humanize",
        },
    }))
}
