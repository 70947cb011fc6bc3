//! Stored conversation lookups

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use triad_core::state::{ConversationStore, PipelineState};
use utoipa::ToSchema;

use super::{blocking, ApiError, ErrorResponse};
use crate::SharedState;

#[derive(Serialize, ToSchema)]
pub struct ConversationItem {
    pub thread_id: String,
    pub user_prompt: String,
}

#[derive(Serialize, ToSchema)]
pub struct HistoryResponse {
    pub user_id: String,
    /// Most recently updated first
    pub conversations: Vec<ConversationItem>,
}

/// List a user's conversations
#[utoipa::path(
    get,
    path = "/history/{user_id}",
    tag = "conversations",
    params(("user_id" = String, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Conversation summaries", body = HistoryResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn get_history(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let store = state.store.clone();
    let lookup = user_id.clone();
    let summaries = blocking(move || store.list_for_user(&lookup)).await?;

    Ok(Json(HistoryResponse {
        user_id,
        conversations: summaries
            .into_iter()
            .map(|s| ConversationItem {
                thread_id: s.thread_id,
                user_prompt: s.user_prompt,
            })
            .collect(),
    }))
}

/// Fetch the full stored state of one run
#[utoipa::path(
    get,
    path = "/conversation/{thread_id}",
    tag = "conversations",
    params(("thread_id" = String, Path, description = "Thread identifier")),
    responses(
        (status = 200, description = "Stored pipeline state"),
        (status = 404, description = "Unknown thread", body = ErrorResponse),
        (status = 500, description = "Store failure", body = ErrorResponse)
    )
)]
pub async fn get_conversation(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
) -> Result<Json<PipelineState>, ApiError> {
    let store = state.store.clone();
    blocking(move || store.load(&thread_id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))
}
