use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::routes::SERVICE_NAME;
use crate::AppState;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Serialize, Debug)]
pub(crate) struct HealthReport {
    status: HealthStatus,
    /// Unix time in milliseconds
    timestamp: u64,
    /// Seconds since startup
    uptime: f64,
    service: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    checks: Option<HealthChecks>,
}

#[derive(Serialize, Debug)]
pub(crate) struct HealthChecks {
    api: HealthStatus,
    providers: BTreeMap<&'static str, &'static str>,
}

impl HealthReport {
    fn new(state: &AppState, status: HealthStatus, checks: Option<HealthChecks>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        HealthReport {
            status,
            timestamp,
            uptime: state.started_at.elapsed().as_secs_f64(),
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            checks,
        }
    }
}

#[axum_macros::debug_handler]
pub(crate) async fn handle_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::new(&state, HealthStatus::Healthy, None))
}

/// Readiness: the service is only as healthy as the share of providers that have a key.
#[axum_macros::debug_handler]
pub(crate) async fn handle_detailed_health(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthReport>) {
    let providers: BTreeMap<_, _> = state
        .relay
        .providers()
        .iter()
        .map(|provider| {
            let check = if provider.is_configured() {
                "configured"
            } else {
                "missing"
            };
            (provider.kind().id(), check)
        })
        .collect();

    let configured = providers.values().filter(|check| **check == "configured").count();
    let (status, code) = match configured {
        0 => (HealthStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE),
        n if n == providers.len() => (HealthStatus::Healthy, StatusCode::OK),
        _ => (HealthStatus::Degraded, StatusCode::OK),
    };

    let checks = HealthChecks {
        api: HealthStatus::Healthy,
        providers,
    };
    (code, Json(HealthReport::new(&state, status, Some(checks))))
}
