use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    configured_boards: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub boards: HealthCheck,
    pub checked_at: String,
}

pub fn router(configured_boards: Vec<String>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { configured_boards })
}

/// Liveness plus board configuration; the data source itself is probed by `boardsight doctor`.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let boards = boards_check(&state.configured_boards);
    let ready = boards.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "boardsight-server runtime initialized".to_string() },
        boards,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn boards_check(configured_boards: &[String]) -> HealthCheck {
    if configured_boards.is_empty() {
        HealthCheck { status: "degraded", detail: "no boards configured".to_string() }
    } else {
        HealthCheck { status: "ready", detail: format!("serving boards: {}", configured_boards.join(", ")) }
    }
}
