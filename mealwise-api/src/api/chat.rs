//! Assistant conversations and tool proposals

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::{optional_body, ApiJson, ApiPath, AuthUser};
use crate::db;
use crate::models::{
    ChatTurnResponse, Conversation, ConversationDetail, NewConversationRequest,
    ProposalActionResponse, SendMessageRequest, Validate,
};
use crate::services::{proposals, ChatAgent};
use crate::{ApiError, ApiResult, AppState};

async fn owned_conversation(state: &AppState, user_id: Uuid, id: Uuid) -> ApiResult<Conversation> {
    db::chat::get_conversation(&state.db, user_id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Conversation {}", id)))
}

/// GET /api/chat/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Conversation>>> {
    Ok(Json(db::chat::list_conversations(&state.db, auth.user.id).await?))
}

/// POST /api/chat/conversations (body optional)
pub async fn create_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let request: NewConversationRequest = optional_body(&body)?;
    request.validate()?;
    let conversation =
        db::chat::create_conversation(&state.db, auth.user.id, request.title.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /api/chat/conversations/:id
pub async fn get_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ConversationDetail>> {
    let conversation = owned_conversation(&state, auth.user.id, id).await?;
    let messages = db::chat::list_messages(&state.db, id).await?;
    let proposals = db::chat::list_proposals(&state.db, id).await?;
    Ok(Json(ConversationDetail {
        conversation,
        messages,
        proposals,
    }))
}

/// DELETE /api/chat/conversations/:id
pub async fn delete_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    if !db::chat::delete_conversation(&state.db, auth.user.id, id).await? {
        return Err(ApiError::NotFound(format!("Conversation {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/chat/conversations/:id/messages
///
/// Runs one assistant turn and returns what it created.
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SendMessageRequest>,
) -> ApiResult<Json<ChatTurnResponse>> {
    payload.validate()?;
    let conversation = owned_conversation(&state, auth.user.id, id).await?;

    let agent = ChatAgent::new(state.db.clone(), state.model.clone());
    let turn = agent.run_turn(&auth.user, &conversation, &payload.content).await?;
    tracing::info!(
        user_id = %auth.user.id,
        conversation_id = %id,
        messages = turn.messages.len(),
        proposals = turn.proposals.len(),
        "Chat turn complete"
    );
    Ok(Json(turn))
}

/// POST /api/chat/proposals/:id/confirm
pub async fn confirm_proposal(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ProposalActionResponse>> {
    Ok(Json(proposals::confirm_proposal(&state.db, auth.user.id, id).await?))
}

/// POST /api/chat/proposals/:id/cancel
pub async fn cancel_proposal(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ProposalActionResponse>> {
    Ok(Json(proposals::cancel_proposal(&state.db, auth.user.id, id).await?))
}

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/chat/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/chat/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/chat/conversations/:id/messages", post(send_message))
        .route("/api/chat/proposals/:id/confirm", post(confirm_proposal))
        .route("/api/chat/proposals/:id/cancel", post(cancel_proposal))
}
