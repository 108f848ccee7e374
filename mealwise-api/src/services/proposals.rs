//! Confirming and cancelling assistant tool proposals
//!
//! A confirm first claims the proposal (pending -> confirmed) and only the
//! winner of that claim runs the tool, so a proposal executes at most once.

use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use super::tools::ToolInvocation;
use crate::db;
use crate::models::{ChatMessage, ChatRole, ProposalActionResponse, ProposalStatus, ToolProposal};

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("Proposal not found: {0}")]
    NotFound(Uuid),

    #[error("Proposal is already {}", .0.as_str())]
    AlreadyResolved(ProposalStatus),

    #[error("Database error: {0}")]
    Database(#[from] mealwise_common::Error),
}

async fn load(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<ToolProposal, ProposalError> {
    db::chat::get_proposal(pool, user_id, id)
        .await?
        .ok_or(ProposalError::NotFound(id))
}

/// Claim a pending proposal, or explain why it can't be claimed
async fn claim(
    pool: &SqlitePool,
    user_id: Uuid,
    id: Uuid,
    status: ProposalStatus,
) -> Result<ToolProposal, ProposalError> {
    let proposal = load(pool, user_id, id).await?;
    if !proposal.status.is_pending() {
        return Err(ProposalError::AlreadyResolved(proposal.status));
    }
    if !db::chat::resolve_proposal(pool, id, status, None).await? {
        let current = load(pool, user_id, id).await?;
        return Err(ProposalError::AlreadyResolved(current.status));
    }
    Ok(proposal)
}

async fn append_tool_message(
    pool: &SqlitePool,
    proposal: &ToolProposal,
    content: String,
) -> Result<ChatMessage, ProposalError> {
    let message = db::chat::insert_message(
        pool,
        proposal.conversation_id,
        ChatRole::Tool,
        &content,
        Some(&proposal.tool_name),
        Some(proposal.id),
    )
    .await?;
    db::chat::touch_conversation(pool, proposal.conversation_id).await?;
    Ok(message)
}

/// Run a pending proposal's tool on behalf of its owner
pub async fn confirm_proposal(
    pool: &SqlitePool,
    user_id: Uuid,
    id: Uuid,
) -> Result<ProposalActionResponse, ProposalError> {
    let proposal = claim(pool, user_id, id, ProposalStatus::Confirmed).await?;

    let outcome = match ToolInvocation::parse(&proposal.tool_name, &proposal.arguments) {
        Ok(invocation) => invocation.execute(pool, user_id).await,
        Err(e) => Err(e),
    };
    let (status, result, content) = match outcome {
        Ok(value) => {
            tracing::info!(proposal_id = %id, tool = %proposal.tool_name, "Proposal executed");
            let content = json!({"status": "confirmed", "result": value}).to_string();
            (ProposalStatus::Confirmed, value, content)
        }
        Err(e) => {
            tracing::warn!(proposal_id = %id, tool = %proposal.tool_name, error = %e, "Proposal failed");
            let value = json!({"error": e.to_string()});
            let content = json!({"status": "failed", "error": e.to_string()}).to_string();
            (ProposalStatus::Failed, value, content)
        }
    };
    db::chat::finish_proposal(pool, id, status, &result).await?;

    let message = append_tool_message(pool, &proposal, content).await?;
    Ok(ProposalActionResponse {
        proposal: load(pool, user_id, id).await?,
        message: Some(message),
    })
}

/// Reject a pending proposal without running it
pub async fn cancel_proposal(
    pool: &SqlitePool,
    user_id: Uuid,
    id: Uuid,
) -> Result<ProposalActionResponse, ProposalError> {
    let proposal = claim(pool, user_id, id, ProposalStatus::Cancelled).await?;
    tracing::info!(proposal_id = %id, tool = %proposal.tool_name, "Proposal cancelled");

    let content = json!({"status": "cancelled", "summary": proposal.summary}).to_string();
    let message = append_tool_message(pool, &proposal, content).await?;
    Ok(ProposalActionResponse {
        proposal: load(pool, user_id, id).await?,
        message: Some(message),
    })
}
