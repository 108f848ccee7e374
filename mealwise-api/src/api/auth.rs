//! Registration, login and bearer-token authentication

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Duration;
use mealwise_common::auth::{hash_password_blocking, verify_credentials_blocking};
use tracing::info;

use super::ApiJson;
use crate::db;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, User, Validate};
use crate::{ApiError, ApiResult, AppState};

/// Authenticated caller, resolved from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    /// Raw token as presented, needed for logout
    pub token: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?
            .to_string();

        let user_id = db::tokens::resolve_token(&state.db, &token)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;
        let user = db::users::get_user(&state.db, user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(AuthUser { user, token })
    }
}

async fn issue(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let ttl = Duration::hours(state.settings.auth.token_ttl_hours);
    let (token, expires_at) = db::tokens::issue_token(&state.db, user.id, ttl).await?;
    Ok(AuthResponse { token, expires_at, user })
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    payload.validate()?;

    let email = db::users::normalize_email(&payload.email);
    if db::users::find_credentials(&state.db, &email).await?.is_some() {
        return Err(ApiError::Conflict("Email is already registered".to_string()));
    }

    let password_hash = hash_password_blocking(payload.password.clone()).await?;
    let user = db::users::create_user(&state.db, &email, &payload.display_name, &password_hash).await?;
    info!(user_id = %user.id, "Registered user");

    Ok((StatusCode::CREATED, Json(issue(&state, user).await?)))
}

/// POST /api/auth/login
///
/// Unknown email and wrong password give the same 401.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    payload.validate()?;

    let found = db::users::find_credentials(&state.db, &payload.email).await?;
    let stored_hash = found.as_ref().map(|(_, hash)| hash.clone());
    let valid = verify_credentials_blocking(payload.password.clone(), stored_hash).await;
    let user = match found {
        Some((user, _)) if valid => user,
        _ => return Err(ApiError::InvalidCredentials),
    };

    info!(user_id = %user.id, "User logged in");
    Ok(Json(issue(&state, user).await?))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> ApiResult<StatusCode> {
    db::tokens::revoke_token(&state.db, &auth.token).await?;
    info!(user_id = %auth.user.id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
}
