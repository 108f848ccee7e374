//! Recipe import: URL extraction over SSE and draft review
//!
//! `POST /api/recipes/extract` streams [`ExtractionEvent`]s. The stream
//! always ends with exactly one terminal event: `complete` carrying the
//! draft token, or `error` carrying an extraction error code.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use mealwise_common::sse::{sse_response, ExtractionEvent};
use std::convert::Infallible;
use tracing::{info, warn};

use super::{optional_body, ApiJson, ApiPath, AuthUser};
use crate::models::{ConfirmDraftRequest, DraftResponse, ExtractRequest, Recipe, Validate};
use crate::{ApiResult, AppState};

/// POST /api/recipes/extract
///
/// Request validation errors are returned as a plain JSON error before
/// the stream starts; everything after that is reported in-stream.
pub async fn extract_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<ExtractRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    payload.validate()?;

    let url = payload.url.trim().to_string();
    let user_id = auth.user.id;
    let extractor = state.extractor();
    let drafts = state.drafts.clone();
    info!(user_id = %user_id, url = %url, "Recipe extraction started");

    let stream = async_stream::stream! {
        yield Ok(ExtractionEvent::progress("fetching", "Downloading page", 10).to_sse_event());
        let page = match extractor.fetch_page(&url).await {
            Ok(page) => page,
            Err(e) => {
                warn!(user_id = %user_id, url = %url, code = e.code(), error = %e, "Extraction failed");
                yield Ok(ExtractionEvent::from(&e).to_sse_event());
                return;
            }
        };

        yield Ok(ExtractionEvent::progress("sanitizing", "Cleaning up page content", 30).to_sse_event());
        let sanitized = match extractor.prepare(&page) {
            Ok(sanitized) => sanitized,
            Err(e) => {
                warn!(user_id = %user_id, url = %url, code = e.code(), error = %e, "Extraction failed");
                yield Ok(ExtractionEvent::from(&e).to_sse_event());
                return;
            }
        };

        yield Ok(ExtractionEvent::progress("extracting", "Reading the recipe", 50).to_sse_event());
        let outcome = match extractor.run_agent(&page.final_url, sanitized).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(user_id = %user_id, url = %url, code = e.code(), error = %e, "Extraction failed");
                yield Ok(ExtractionEvent::from(&e).to_sse_event());
                return;
            }
        };

        yield Ok(ExtractionEvent::progress("saving", "Saving draft", 90).to_sse_event());
        match drafts.store(user_id, &outcome).await {
            Ok(token) => {
                info!(user_id = %user_id, url = %url, "Recipe extraction complete");
                if let Err(e) = drafts.purge_expired().await {
                    warn!(error = %e, "Failed to purge expired drafts");
                }
                yield Ok(ExtractionEvent::complete(token).to_sse_event());
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Failed to store recipe draft");
                yield Ok(ExtractionEvent::error("internal_error", "Failed to save the draft").to_sse_event());
            }
        }
    };

    Ok(sse_response(stream))
}

/// GET /api/recipes/drafts/:token
pub async fn get_draft(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(token): ApiPath<String>,
) -> ApiResult<Json<DraftResponse>> {
    Ok(Json(state.drafts.fetch(auth.user.id, &token).await?))
}

/// POST /api/recipes/drafts/:token/confirm
///
/// Body is optional: `{"overrides": RecipeInput}` replaces the draft.
pub async fn confirm_draft(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(token): ApiPath<String>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Recipe>)> {
    let request: ConfirmDraftRequest = optional_body(&body)?;
    let recipe = state
        .drafts
        .confirm(auth.user.id, &token, request.overrides)
        .await?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

/// DELETE /api/recipes/drafts/:token
pub async fn discard_draft(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(token): ApiPath<String>,
) -> ApiResult<StatusCode> {
    state.drafts.discard(auth.user.id, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn draft_routes() -> Router<AppState> {
    Router::new()
        .route("/api/recipes/extract", post(extract_recipe))
        .route("/api/recipes/drafts/:token", get(get_draft).delete(discard_draft))
        .route("/api/recipes/drafts/:token/confirm", post(confirm_draft))
}
