use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};

use crate::domains::chat::DEFAULT_SESSION;
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct MessagePayload {
    pub message: String,
    /// Conversation thread; omitted means the shared default session
    /// (single-user deployments).
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub result: String,
    /// Machine-readable code, present on rejected or errored turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Conversational entry point. Synchronous, no streaming; the turn blocks
/// through any acquisition it triggers.
pub async fn message_handler(
    Extension(state): Extension<AppState>,
    Json(payload): Json<MessagePayload>,
) -> Json<MessageResponse> {
    let session_id = payload
        .session_id
        .unwrap_or_else(|| DEFAULT_SESSION.to_string());

    let turn = state.engine.handle_turn(&session_id, &payload.message).await;

    Json(MessageResponse {
        result: turn.answer,
        code: turn.code.map(str::to_string),
    })
}
