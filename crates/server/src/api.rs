use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use boardsight_agent::AgentRuntime;
use boardsight_core::{BoardSchema, InterfaceError, QueryRequest, ResponseEnvelope};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::health;

#[derive(Clone)]
pub struct ApiState {
    runtime: AgentRuntime,
    /// Cancelled on shutdown; every request runs under a child token.
    shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
pub struct SchemaQuery {
    pub board: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
pub struct Banner {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// HTTP-facing error; only bad-request details are echoed back to the caller.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, Some(message.clone())),
            InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, None),
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        let body = ErrorBody {
            error: self.0.user_message(),
            detail,
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(runtime: AgentRuntime, shutdown: CancellationToken) -> Router {
    let board_keys = runtime.boards().iter().map(|board| board.key.clone()).collect();

    Router::new()
        .route("/", get(banner))
        .route("/query", post(query))
        .route("/boards/schema", get(board_schema))
        .with_state(ApiState { runtime, shutdown })
        .merge(health::router(board_keys))
        .layer(CorsLayer::permissive())
}

async fn banner() -> Json<Banner> {
    Json(Banner { status: "ok", service: "boardsight", version: env!("CARGO_PKG_VERSION") })
}

async fn query(
    State(state): State<ApiState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ResponseEnvelope>, ApiError> {
    if request.message.trim().is_empty() {
        let correlation_id = Uuid::new_v4().to_string();
        warn!(event_name = "api.query.rejected", correlation_id = %correlation_id, "empty message");
        let message = "message cannot be empty".to_string();
        return Err(InterfaceError::BadRequest { message, correlation_id }.into());
    }

    let envelope = state.runtime.handle(request, state.shutdown.child_token()).await;
    Ok(Json(envelope))
}

async fn board_schema(
    State(state): State<ApiState>,
    Query(params): Query<SchemaQuery>,
) -> Result<Json<BoardSchema>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let key = params.board.unwrap_or_default();
    let Some(board) = state.runtime.board(key.trim()) else {
        let known = state.runtime.boards().iter().map(|board| board.key.as_str()).collect::<Vec<_>>();
        warn!(event_name = "api.schema.unknown_board", correlation_id = %correlation_id, board = %key);
        return Err(InterfaceError::BadRequest {
            message: format!("unknown board `{key}`; expected one of: {}", known.join(", ")),
            correlation_id,
        }
        .into());
    };

    match state.runtime.describe(board).await {
        Ok(schema) => {
            info!(
                event_name = "api.schema.served",
                correlation_id = %correlation_id,
                board_id = %schema.board_id,
                fields = schema.fields.len(),
                "board schema served"
            );
            Ok(Json(schema))
        }
        Err(error) => {
            warn!(
                event_name = "api.schema.failed",
                correlation_id = %correlation_id,
                board_id = %board.board_id,
                error = %error,
                "board schema could not be retrieved"
            );
            Err(error.into_interface(correlation_id).into())
        }
    }
}
