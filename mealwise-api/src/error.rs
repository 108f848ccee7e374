//! Error types for mealwise-api
//!
//! [`ApiError`] is what handlers return; it renders as
//! `{"error": {"code": ..., "message": ...}}` with a matching status code.
//! [`ExtractionError`] covers the recipe import pipeline and is also
//! rendered as the terminal SSE error event.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::models::validation::ValidationError;
use crate::services::chat_agent::AgentError;
use crate::services::draft_store::DraftError;
use crate::services::proposals::ProposalError;

/// Failure kinds of the recipe extraction pipeline
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// Page could not be downloaded (network, status, size, content type)
    #[error("{0}")]
    FetchFailed(String),

    /// URL refused by the outbound request guard
    #[error("{0}")]
    Blocked(String),

    /// Page body was empty
    #[error("{0}")]
    EmptyHtml(String),

    /// Page body is not usable HTML
    #[error("{0}")]
    InvalidHtml(String),

    /// Language model call failed or returned malformed output
    #[error("{0}")]
    AgentFailed(String),

    /// No recipe on the page, or the requested draft does not exist
    #[error("{0}")]
    NotFound(String),

    /// Extracted data could not be turned into a valid recipe
    #[error("{0}")]
    ConversionFailed(String),
}

impl ExtractionError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ExtractionError::FetchFailed(_) => "fetch_failed",
            ExtractionError::Blocked(_) => "blocked_url",
            ExtractionError::EmptyHtml(_) => "empty_html",
            ExtractionError::InvalidHtml(_) => "invalid_html",
            ExtractionError::AgentFailed(_) => "agent_failed",
            ExtractionError::NotFound(_) => "not_found",
            ExtractionError::ConversionFailed(_) => "conversion_failed",
        }
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        match self {
            ExtractionError::FetchFailed(m)
            | ExtractionError::Blocked(m)
            | ExtractionError::EmptyHtml(m)
            | ExtractionError::InvalidHtml(m)
            | ExtractionError::AgentFailed(m)
            | ExtractionError::NotFound(m)
            | ExtractionError::ConversionFailed(m) => m,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ExtractionError::FetchFailed(_)
            | ExtractionError::Blocked(_)
            | ExtractionError::EmptyHtml(_)
            | ExtractionError::InvalidHtml(_)
            | ExtractionError::ConversionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ExtractionError::AgentFailed(_) => StatusCode::BAD_GATEWAY,
            ExtractionError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl From<&ExtractionError> for mealwise_common::sse::ExtractionEvent {
    fn from(err: &ExtractionError) -> Self {
        mealwise_common::sse::ExtractionEvent::error(err.code(), err.message())
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// DTO validation failure (400)
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Missing or invalid credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Wrong email or password (401)
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Conflict (409) - duplicate email, proposal already resolved
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Language model or other upstream dependency failed (502)
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Extraction pipeline failure (status depends on kind)
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// mealwise-common error
    #[error("Common error: {0}")]
    Common(#[from] mealwise_common::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Common(mealwise_common::Error::Database(err))
    }
}

impl From<DraftError> for ApiError {
    fn from(err: DraftError) -> Self {
        match err {
            DraftError::NotFound => ApiError::NotFound("Draft not found".to_string()),
            DraftError::Conversion(e) => ApiError::Extraction(e),
            DraftError::Validation(e) => ApiError::Validation(e),
            DraftError::Database(e) => ApiError::Common(e),
        }
    }
}

impl From<ProposalError> for ApiError {
    fn from(err: ProposalError) -> Self {
        match err {
            ProposalError::NotFound(id) => ApiError::NotFound(format!("Proposal {}", id)),
            err @ ProposalError::AlreadyResolved(_) => ApiError::Conflict(err.to_string()),
            ProposalError::Database(e) => ApiError::Common(e),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Model(e) => ApiError::Upstream(e.to_string()),
            AgentError::Database(e) => ApiError::Common(e),
        }
    }
}

/// True when a database error is a UNIQUE constraint violation
fn is_unique_violation(err: &mealwise_common::Error) -> bool {
    match err {
        mealwise_common::Error::Database(sqlx::Error::Database(db_err)) => {
            db_err.is_unique_violation()
        }
        _ => false,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Validation(err) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "Invalid email or password".to_string(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Upstream(msg) => {
                error!(error = %msg, "Upstream failure");
                (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg)
            }
            ApiError::Extraction(err) => (err.status_code(), err.code(), err.message().to_string()),
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiError::Common(ref err) if is_unique_violation(err) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                "Resource already exists".to_string(),
            ),
            ApiError::Common(mealwise_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(mealwise_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => {
                error!(error = %err, "Unhandled common error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mealwise_common::sse::{ExtractionEvent, ExtractionStatus};

    #[test]
    fn test_extraction_error_codes_and_messages() {
        let cases = [
            (ExtractionError::FetchFailed("timeout".into()), "fetch_failed"),
            (ExtractionError::Blocked("private".into()), "blocked_url"),
            (ExtractionError::EmptyHtml("empty".into()), "empty_html"),
            (ExtractionError::InvalidHtml("bad".into()), "invalid_html"),
            (ExtractionError::AgentFailed("model".into()), "agent_failed"),
            (ExtractionError::NotFound("none".into()), "not_found"),
            (ExtractionError::ConversionFailed("title".into()), "conversion_failed"),
        ];

        for (err, code) in cases {
            assert_eq!(err.code(), code);
            assert!(!err.message().is_empty());
            assert_eq!(err.to_string(), err.message());
        }
    }

    #[test]
    fn test_extraction_error_message_preserved() {
        let err = ExtractionError::FetchFailed("HTTP 503 from example.com".into());
        assert_eq!(err.message(), "HTTP 503 from example.com");
    }

    #[test]
    fn test_extraction_error_status_codes() {
        assert_eq!(
            ExtractionError::AgentFailed("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ExtractionError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ExtractionError::EmptyHtml("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_extraction_error_to_terminal_event() {
        let err = ExtractionError::AgentFailed("model timed out".into());
        let event = ExtractionEvent::from(&err);
        assert_eq!(event.status, ExtractionStatus::Error);
        assert_eq!(event.error_code.as_deref(), Some("agent_failed"));
        assert_eq!(event.message, "model timed out");
        assert!(event.done);
    }

    #[test]
    fn test_api_error_status_mapping() {
        let response = ApiError::Conflict("x".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = ApiError::Unauthorized("x".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ApiError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ApiError::Upstream("model down".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response =
            ApiError::Common(mealwise_common::Error::NotFound("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::Extraction(ExtractionError::Blocked("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_service_errors_map_to_api_errors() {
        let response = ApiError::from(DraftError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let conversion = DraftError::Conversion(ExtractionError::ConversionFailed("no title".into()));
        assert_eq!(ApiError::from(conversion).into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let resolved = ProposalError::AlreadyResolved(crate::models::ProposalStatus::Cancelled);
        assert_eq!(ApiError::from(resolved).into_response().status(), StatusCode::CONFLICT);

        let model = AgentError::Model(crate::services::llm::LlmError::NotConfigured);
        assert_eq!(ApiError::from(model).into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
