//! Meal plan calendar endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::db;
use crate::models::{MealPlanEntry, MealPlanQuery, NewMealPlanEntry, Validate};
use crate::{ApiError, ApiResult, AppState};

/// GET /api/meal-plan?from=YYYY-MM-DD&to=YYYY-MM-DD
pub async fn list_entries(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<MealPlanQuery>,
) -> ApiResult<Json<Vec<MealPlanEntry>>> {
    query.validate()?;
    let entries = db::meal_plan::list_entries(&state.db, auth.user.id, query.from, query.to).await?;
    Ok(Json(entries))
}

/// POST /api/meal-plan
///
/// A `recipe_id` that isn't one of the caller's recipes is a 404.
pub async fn add_entry(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<NewMealPlanEntry>,
) -> ApiResult<(StatusCode, Json<MealPlanEntry>)> {
    payload.validate()?;
    let entry = db::meal_plan::add_entry(&state.db, auth.user.id, &payload).await?;
    tracing::info!(
        user_id = %auth.user.id,
        entry_id = %entry.id,
        plan_date = %entry.plan_date,
        "Added meal plan entry"
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

/// DELETE /api/meal-plan/:id
pub async fn delete_entry(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    if !db::meal_plan::delete_entry(&state.db, auth.user.id, id).await? {
        return Err(ApiError::NotFound(format!("Meal plan entry {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn meal_plan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/meal-plan", get(list_entries).post(add_entry))
        .route("/api/meal-plan/:id", delete(delete_entry))
}
