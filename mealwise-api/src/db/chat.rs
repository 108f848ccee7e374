//! Conversation, message and tool proposal persistence
//!
//! Messages are ordered by `created_at` with `rowid` as tie-breaker, so
//! insertion order is preserved even within one clock tick.

use chrono::Utc;
use mealwise_common::{Error, Result};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use super::{parse_ts, parse_uuid, to_json, ts};
use crate::models::chat::DEFAULT_CONVERSATION_TITLE;
use crate::models::{ChatMessage, ChatRole, Conversation, ProposalStatus, ToolProposal};

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(Conversation {
        id: parse_uuid(&id)?,
        title: row.get("title"),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

pub async fn create_conversation(
    pool: &SqlitePool,
    user_id: Uuid,
    title: Option<&str>,
) -> Result<Conversation> {
    let id = Uuid::new_v4();
    let now = ts(Utc::now());
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_CONVERSATION_TITLE);

    sqlx::query(
        "INSERT INTO conversations (id, user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(title)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_conversation(pool, user_id, id)
        .await?
        .ok_or_else(|| Error::Internal("Conversation vanished after insert".to_string()))
}

pub async fn get_conversation(
    pool: &SqlitePool,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<Conversation>> {
    let row = sqlx::query(
        "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ? AND user_id = ?",
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(conversation_from_row).transpose()
}

/// Most recently active first
pub async fn list_conversations(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Conversation>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, created_at, updated_at FROM conversations
        WHERE user_id = ?
        ORDER BY updated_at DESC, rowid DESC
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(conversation_from_row).collect()
}

pub async fn delete_conversation(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM conversations WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Replace the title only while it is still the default
pub async fn set_title_if_default(pool: &SqlitePool, id: Uuid, title: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE conversations SET title = ? WHERE id = ? AND title = ?")
        .bind(title)
        .bind(id.to_string())
        .bind(DEFAULT_CONVERSATION_TITLE)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn touch_conversation(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
        .bind(ts(Utc::now()))
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

fn message_from_row(row: &SqliteRow) -> Result<ChatMessage> {
    let id: String = row.get("id");
    let conversation_id: String = row.get("conversation_id");
    let role: String = row.get("role");
    let proposal_id: Option<String> = row.get("proposal_id");
    let created_at: String = row.get("created_at");

    Ok(ChatMessage {
        id: parse_uuid(&id)?,
        conversation_id: parse_uuid(&conversation_id)?,
        role: ChatRole::from_db(&role)
            .ok_or_else(|| Error::Internal(format!("Invalid stored chat role '{}'", role)))?,
        content: row.get("content"),
        tool_name: row.get("tool_name"),
        proposal_id: proposal_id.as_deref().map(parse_uuid).transpose()?,
        created_at: parse_ts(&created_at)?,
    })
}

pub async fn insert_message(
    pool: &SqlitePool,
    conversation_id: Uuid,
    role: ChatRole,
    content: &str,
    tool_name: Option<&str>,
    proposal_id: Option<Uuid>,
) -> Result<ChatMessage> {
    let message = ChatMessage {
        id: Uuid::new_v4(),
        conversation_id,
        role,
        content: content.to_string(),
        tool_name: tool_name.map(str::to_string),
        proposal_id,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO chat_messages (id, conversation_id, role, content, tool_name, proposal_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(message.id.to_string())
    .bind(conversation_id.to_string())
    .bind(role.as_str())
    .bind(&message.content)
    .bind(&message.tool_name)
    .bind(proposal_id.map(|p| p.to_string()))
    .bind(ts(message.created_at))
    .execute(pool)
    .await?;

    Ok(message)
}

pub async fn list_messages(pool: &SqlitePool, conversation_id: Uuid) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query(
        r#"
        SELECT id, conversation_id, role, content, tool_name, proposal_id, created_at
        FROM chat_messages
        WHERE conversation_id = ?
        ORDER BY created_at, rowid
        "#,
    )
    .bind(conversation_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(message_from_row).collect()
}

/// The last `limit` messages, oldest first
pub async fn recent_messages(
    pool: &SqlitePool,
    conversation_id: Uuid,
    limit: i64,
) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM (
            SELECT id, conversation_id, role, content, tool_name, proposal_id, created_at,
                   rowid AS seq
            FROM chat_messages
            WHERE conversation_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
        )
        ORDER BY created_at, seq
        "#,
    )
    .bind(conversation_id.to_string())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(message_from_row).collect()
}

fn proposal_from_row(row: &SqliteRow) -> Result<ToolProposal> {
    let id: String = row.get("id");
    let conversation_id: String = row.get("conversation_id");
    let arguments: String = row.get("arguments");
    let status: String = row.get("status");
    let result: Option<String> = row.get("result");
    let created_at: String = row.get("created_at");
    let resolved_at: Option<String> = row.get("resolved_at");

    let parse_json = |text: &str| -> Result<Value> {
        serde_json::from_str(text)
            .map_err(|e| Error::Internal(format!("Invalid stored proposal JSON: {}", e)))
    };

    Ok(ToolProposal {
        id: parse_uuid(&id)?,
        conversation_id: parse_uuid(&conversation_id)?,
        tool_name: row.get("tool_name"),
        arguments: parse_json(&arguments)?,
        summary: row.get("summary"),
        status: ProposalStatus::from_db(&status)
            .ok_or_else(|| Error::Internal(format!("Invalid stored proposal status '{}'", status)))?,
        result: result.as_deref().map(parse_json).transpose()?,
        created_at: parse_ts(&created_at)?,
        resolved_at: resolved_at.as_deref().map(parse_ts).transpose()?,
    })
}

const PROPOSAL_COLUMNS: &str =
    "id, conversation_id, tool_name, arguments, summary, status, result, created_at, resolved_at";

/// Store a new pending proposal
pub async fn create_proposal(
    pool: &SqlitePool,
    conversation_id: Uuid,
    user_id: Uuid,
    tool_name: &str,
    arguments: &Value,
    summary: &str,
) -> Result<ToolProposal> {
    let proposal = ToolProposal {
        id: Uuid::new_v4(),
        conversation_id,
        tool_name: tool_name.to_string(),
        arguments: arguments.clone(),
        summary: summary.to_string(),
        status: ProposalStatus::Pending,
        result: None,
        created_at: Utc::now(),
        resolved_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO tool_proposals (
            id, conversation_id, user_id, tool_name, arguments, summary, status, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(proposal.id.to_string())
    .bind(conversation_id.to_string())
    .bind(user_id.to_string())
    .bind(tool_name)
    .bind(to_json(arguments)?)
    .bind(summary)
    .bind(ProposalStatus::Pending.as_str())
    .bind(ts(proposal.created_at))
    .execute(pool)
    .await?;

    Ok(proposal)
}

/// Load a proposal owned by `user_id`
pub async fn get_proposal(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<Option<ToolProposal>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM tool_proposals WHERE id = ? AND user_id = ?",
        PROPOSAL_COLUMNS
    ))
    .bind(id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(proposal_from_row).transpose()
}

pub async fn list_proposals(pool: &SqlitePool, conversation_id: Uuid) -> Result<Vec<ToolProposal>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM tool_proposals WHERE conversation_id = ? ORDER BY created_at, rowid",
        PROPOSAL_COLUMNS
    ))
    .bind(conversation_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(proposal_from_row).collect()
}

/// Move a proposal out of `pending`
///
/// Compare-and-set on the status column: returns `false` when the proposal
/// was no longer pending, so two concurrent confirms cannot both win.
pub async fn resolve_proposal(
    pool: &SqlitePool,
    id: Uuid,
    status: ProposalStatus,
    result: Option<&Value>,
) -> Result<bool> {
    let result_json = result.map(to_json).transpose()?;
    let updated = sqlx::query(
        r#"
        UPDATE tool_proposals
        SET status = ?, result = ?, resolved_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(status.as_str())
    .bind(result_json)
    .bind(ts(Utc::now()))
    .bind(id.to_string())
    .bind(ProposalStatus::Pending.as_str())
    .execute(pool)
    .await?;
    Ok(updated.rows_affected() > 0)
}

/// Record the outcome of a claimed (already confirmed) proposal
pub async fn finish_proposal(
    pool: &SqlitePool,
    id: Uuid,
    status: ProposalStatus,
    result: &Value,
) -> Result<()> {
    sqlx::query(
        "UPDATE tool_proposals SET status = ?, result = ?, resolved_at = ? WHERE id = ? AND status = ?",
    )
    .bind(status.as_str())
    .bind(to_json(result)?)
    .bind(ts(Utc::now()))
    .bind(id.to_string())
    .bind(ProposalStatus::Confirmed.as_str())
    .execute(pool)
    .await?;
    Ok(())
}
