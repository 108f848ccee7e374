//! Chat conversations, messages and tool proposals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::validation::{optional_text, require_text, Validate, ValidationError};

pub const DEFAULT_CONVERSATION_TITLE: &str = "New conversation";
pub const MAX_CONVERSATION_TITLE_CHARS: usize = 60;
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        }
    }

    pub fn from_db(value: &str) -> Option<ChatRole> {
        match value {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            "tool" => Some(ChatRole::Tool),
            _ => None,
        }
    }
}

/// Lifecycle of a tool proposal; only `Pending` may transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Confirmed,
    Cancelled,
    Failed,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Confirmed => "confirmed",
            ProposalStatus::Cancelled => "cancelled",
            ProposalStatus::Failed => "failed",
        }
    }

    pub fn from_db(value: &str) -> Option<ProposalStatus> {
        match value {
            "pending" => Some(ProposalStatus::Pending),
            "confirmed" => Some(ProposalStatus::Confirmed),
            "cancelled" => Some(ProposalStatus::Cancelled),
            "failed" => Some(ProposalStatus::Failed),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ProposalStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    pub tool_name: Option<String>,
    pub proposal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A mutating tool call held for explicit confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProposal {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub tool_name: String,
    pub arguments: Value,
    /// Human-readable description shown to the user
    pub summary: String,
    pub status: ProposalStatus,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/chat/conversations`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

impl Validate for NewConversationRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        optional_text("title", self.title.as_deref(), MAX_CONVERSATION_TITLE_CHARS)
    }
}

/// Body of `POST /api/chat/conversations/:id/messages`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

impl Validate for SendMessageRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("content", &self.content, MAX_MESSAGE_CHARS)
    }
}

/// Messages and proposals created by one assistant turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatTurnResponse {
    pub messages: Vec<ChatMessage>,
    pub proposals: Vec<ToolProposal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
    pub proposals: Vec<ToolProposal>,
}

/// Response of proposal confirm/cancel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalActionResponse {
    pub proposal: ToolProposal,
    /// Tool message appended to the conversation, if any
    pub message: Option<ChatMessage>,
}

/// Derive a conversation title from the first user message
pub fn title_from_message(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_CONVERSATION_TITLE_CHARS {
        return collapsed;
    }
    let mut title: String = collapsed
        .chars()
        .take(MAX_CONVERSATION_TITLE_CHARS - 1)
        .collect();
    title = title.trim_end().to_string();
    title.push('…');
    title
}
