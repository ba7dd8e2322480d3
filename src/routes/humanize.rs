use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::StreamExt;
use tracing::info;

use crate::error::RelayResult;
use crate::extractors::ValidatedJson;
use crate::humanize::request::{HumanizeRequest, QuickHumanizeRequest, StyleCatalog};
use crate::humanize::result::{HumanizedResult, QuickHumanizedResult};
use crate::routes::ApiResponse;
use crate::AppState;

#[axum_macros::debug_handler]
pub(crate) async fn handle_humanize(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<HumanizeRequest>,
) -> RelayResult<Json<ApiResponse<HumanizedResult>>> {
    let result = state.relay.humanize(&request).await?;
    Ok(ApiResponse::ok(result))
}

#[axum_macros::debug_handler]
pub(crate) async fn handle_quick(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<QuickHumanizeRequest>,
) -> RelayResult<Json<ApiResponse<QuickHumanizedResult>>> {
    let result = state.relay.quick(&request).await?;
    Ok(ApiResponse::ok(result))
}

/// Every relay event goes out as a single `data:` line. The stream body is dropped as soon as
/// the client disconnects, which cancels the upstream request with it.
#[axum_macros::debug_handler]
pub(crate) async fn handle_stream(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<HumanizeRequest>,
) -> impl IntoResponse {
    info!(style = %request.style, length = %request.length, "Streaming humanization started");
    let events = state
        .relay
        .stream(request)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.payload().to_string())));
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[axum_macros::debug_handler]
pub(crate) async fn handle_styles() -> Json<ApiResponse<StyleCatalog>> {
    ApiResponse::ok(StyleCatalog::new())
}
