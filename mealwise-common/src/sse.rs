//! Server-Sent Events (SSE) utilities
//!
//! Extraction progress is reported as a sequence of [`ExtractionEvent`]
//! records. Every stream ends with exactly one terminal event
//! (`complete` or `error`); the fixed fields of each status are set by the
//! constructors below and nowhere else.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tracing::warn;

/// Status tag carried by every extraction event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
    Progress,
    Complete,
    Error,
}

impl ExtractionStatus {
    /// SSE `event:` name for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Progress => "progress",
            ExtractionStatus::Complete => "complete",
            ExtractionStatus::Error => "error",
        }
    }
}

/// JSON payload of one extraction SSE message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionEvent {
    pub status: ExtractionStatus,
    /// Pipeline stage (`fetching`, `sanitizing`, `extracting`, `saving`, `done`, `failed`)
    pub stage: String,
    pub message: String,
    /// Completion percentage, 0-100
    pub progress: u8,
    pub draft_token: Option<String>,
    pub error_code: Option<String>,
    pub done: bool,
}

impl ExtractionEvent {
    /// Non-terminal progress update
    pub fn progress(stage: impl Into<String>, message: impl Into<String>, progress: u8) -> Self {
        Self {
            status: ExtractionStatus::Progress,
            stage: stage.into(),
            message: message.into(),
            progress: progress.min(99),
            draft_token: None,
            error_code: None,
            done: false,
        }
    }

    /// Terminal success carrying the draft token
    pub fn complete(draft_token: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Complete,
            stage: "done".to_string(),
            message: "Recipe draft ready for review".to_string(),
            progress: 100,
            draft_token: Some(draft_token.into()),
            error_code: None,
            done: true,
        }
    }

    /// Terminal failure carrying an error code
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Error,
            stage: "failed".to_string(),
            message: message.into(),
            progress: 100,
            draft_token: None,
            error_code: Some(code.into()),
            done: true,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ExtractionStatus::Complete | ExtractionStatus::Error)
    }

    /// Encode as an SSE message (`event:` = status, `data:` = JSON)
    pub fn to_sse_event(&self) -> Event {
        match serde_json::to_string(self) {
            Ok(json) => Event::default().event(self.status.as_str()).data(json),
            Err(e) => {
                // Only reachable with a broken Serialize impl
                warn!("SSE: Failed to serialize extraction event: {}", e);
                Event::default()
                    .event(ExtractionStatus::Error.as_str())
                    .data(r#"{"status":"error","done":true}"#)
            }
        }
    }
}

/// Wrap an event stream in an SSE response with periodic keep-alives
pub fn sse_response<S>(stream: S) -> Sse<S>
where
    S: Stream<Item = Result<Event, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
