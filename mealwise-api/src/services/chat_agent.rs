//! Meal-planning assistant run loop
//!
//! One call to [`ChatAgent::run_turn`] handles one user message:
//! the model is called up to [`MAX_AGENT_STEPS`] times; read-only tool
//! calls are answered inline, mutating ones become pending proposals.

use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

use super::llm::{CompletionRequest, LanguageModel, LlmError, LlmMessage};
use super::tools::{tool_definitions, ToolInvocation};
use crate::db;
use crate::models::chat::title_from_message;
use crate::models::{ChatMessage, ChatRole, ChatTurnResponse, Conversation, ToolProposal, User};

pub const MAX_AGENT_STEPS: usize = 6;
/// Messages of history sent with each model call
pub const HISTORY_WINDOW: i64 = 40;
pub const FALLBACK_REPLY: &str =
    "Sorry, I couldn't finish working that out. Could you try asking in a simpler way?";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Language model failed: {0}")]
    Model(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] mealwise_common::Error),
}

fn system_prompt(user: &User) -> String {
    let preferences = if user.dietary_preferences.is_empty() {
        "none".to_string()
    } else {
        user.dietary_preferences.join(", ")
    };
    format!(
        "You are Mealwise, a friendly meal-planning assistant.\n\
         Today is {} (UTC). The user's time zone is {}.\n\
         Household size: {}. Dietary preferences: {}.\n\
         Use the tools to look up the user's recipes and meal plan instead of guessing ids.\n\
         Changes (adding or removing meal plan entries, saving recipes) are only proposed; \
         the user confirms them in the app, so tell them what you proposed.\n\
         Keep answers short and practical.",
        Utc::now().format("%A %Y-%m-%d"),
        user.timezone,
        user.household_size,
        preferences
    )
}

/// Stored history as model transcript
///
/// Tool calls of earlier turns are not stored, so their results are
/// replayed as assistant notes.
fn transcript_from_history(history: &[ChatMessage]) -> Vec<LlmMessage> {
    history
        .iter()
        .map(|message| match message.role {
            ChatRole::User => LlmMessage::user(message.content.clone()),
            ChatRole::Assistant => LlmMessage::assistant(message.content.clone(), Vec::new()),
            ChatRole::Tool => LlmMessage::assistant(
                format!(
                    "(tool {}) {}",
                    message.tool_name.as_deref().unwrap_or("result"),
                    message.content
                ),
                Vec::new(),
            ),
        })
        .collect()
}

pub struct ChatAgent {
    pool: SqlitePool,
    model: Arc<dyn LanguageModel>,
}

impl ChatAgent {
    pub fn new(pool: SqlitePool, model: Arc<dyn LanguageModel>) -> Self {
        Self { pool, model }
    }

    /// Store a tool message and mirror it into the live transcript
    async fn record_tool_result(
        &self,
        conversation: &Conversation,
        call_id: &str,
        tool_name: &str,
        content: String,
        proposal: Option<&ToolProposal>,
        transcript: &mut Vec<LlmMessage>,
        created: &mut Vec<ChatMessage>,
    ) -> Result<(), AgentError> {
        let message = db::chat::insert_message(
            &self.pool,
            conversation.id,
            ChatRole::Tool,
            &content,
            Some(tool_name),
            proposal.map(|p| p.id),
        )
        .await?;
        transcript.push(LlmMessage::tool(call_id, content));
        created.push(message);
        Ok(())
    }

    /// Handle one user message
    pub async fn run_turn(
        &self,
        user: &User,
        conversation: &Conversation,
        content: &str,
    ) -> Result<ChatTurnResponse, AgentError> {
        let content = content.trim();
        let mut response = ChatTurnResponse::default();

        let user_message =
            db::chat::insert_message(&self.pool, conversation.id, ChatRole::User, content, None, None)
                .await?;
        response.messages.push(user_message);
        db::chat::set_title_if_default(&self.pool, conversation.id, &title_from_message(content)).await?;

        let history = db::chat::recent_messages(&self.pool, conversation.id, HISTORY_WINDOW).await?;
        let mut transcript = transcript_from_history(&history);
        let system = system_prompt(user);
        let mut finished = false;

        for step in 0..MAX_AGENT_STEPS {
            let request = CompletionRequest {
                system: system.clone(),
                messages: transcript.clone(),
                tools: tool_definitions(),
                json_mode: false,
            };
            let reply = self.model.complete(request).await.map_err(|e| {
                tracing::warn!(conversation_id = %conversation.id, step, error = %e, "Chat model call failed");
                e
            })?;

            let text = reply.content.clone().unwrap_or_default();
            if reply.tool_calls.is_empty() {
                let text = if text.trim().is_empty() { FALLBACK_REPLY.to_string() } else { text };
                let message = db::chat::insert_message(
                    &self.pool,
                    conversation.id,
                    ChatRole::Assistant,
                    &text,
                    None,
                    None,
                )
                .await?;
                response.messages.push(message);
                finished = true;
                break;
            }

            if !text.trim().is_empty() {
                let message = db::chat::insert_message(
                    &self.pool,
                    conversation.id,
                    ChatRole::Assistant,
                    &text,
                    None,
                    None,
                )
                .await?;
                response.messages.push(message);
            }
            transcript.push(LlmMessage::assistant(text, reply.tool_calls.clone()));

            for call in &reply.tool_calls {
                tracing::debug!(conversation_id = %conversation.id, tool = %call.name, "Tool call");
                let invocation = match ToolInvocation::parse(&call.name, &call.arguments) {
                    Ok(invocation) => invocation,
                    Err(e) => {
                        let content = json!({"error": e.to_string()}).to_string();
                        self.record_tool_result(
                            conversation, &call.id, &call.name, content, None,
                            &mut transcript, &mut response.messages,
                        )
                        .await?;
                        continue;
                    }
                };

                if !invocation.is_mutating() {
                    let content = match invocation.execute(&self.pool, user.id).await {
                        Ok(value) => value.to_string(),
                        Err(e) => json!({"error": e.to_string()}).to_string(),
                    };
                    self.record_tool_result(
                        conversation, &call.id, &call.name, content, None,
                        &mut transcript, &mut response.messages,
                    )
                    .await?;
                    continue;
                }

                let summary = match invocation.summarize(&self.pool, user.id).await {
                    Ok(summary) => summary,
                    Err(e) => {
                        let content = json!({"error": e.to_string()}).to_string();
                        self.record_tool_result(
                            conversation, &call.id, &call.name, content, None,
                            &mut transcript, &mut response.messages,
                        )
                        .await?;
                        continue;
                    }
                };
                let proposal = db::chat::create_proposal(
                    &self.pool,
                    conversation.id,
                    user.id,
                    invocation.name(),
                    &call.arguments,
                    &summary,
                )
                .await?;
                tracing::info!(
                    conversation_id = %conversation.id,
                    proposal_id = %proposal.id,
                    tool = invocation.name(),
                    "Tool proposal awaiting confirmation"
                );
                let content = json!({
                    "status": "awaiting_confirmation",
                    "proposal_id": proposal.id,
                    "summary": summary,
                })
                .to_string();
                self.record_tool_result(
                    conversation, &call.id, &call.name, content, Some(&proposal),
                    &mut transcript, &mut response.messages,
                )
                .await?;
                response.proposals.push(proposal);
            }
        }

        if !finished {
            tracing::warn!(conversation_id = %conversation.id, "Agent step budget exhausted");
            let message = db::chat::insert_message(
                &self.pool,
                conversation.id,
                ChatRole::Assistant,
                FALLBACK_REPLY,
                None,
                None,
            )
            .await?;
            response.messages.push(message);
        }

        db::chat::touch_conversation(&self.pool, conversation.id).await?;
        Ok(response)
    }
}
