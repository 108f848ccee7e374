//! Current user profile

use axum::{extract::State, routing::get, Json, Router};

use super::{ApiJson, AuthUser};
use crate::db;
use crate::models::{UpdateProfileRequest, User, Validate};
use crate::{ApiResult, AppState};

/// GET /api/users/me
pub async fn get_me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// PATCH /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    payload.validate()?;
    let user = db::users::update_profile(&state.db, auth.user.id, &payload).await?;
    tracing::debug!(user_id = %user.id, "Updated profile");
    Ok(Json(user))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/api/users/me", get(get_me).patch(update_me))
}
