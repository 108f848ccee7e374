//! Recipe CRUD endpoints

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::db;
use crate::models::{Page, Recipe, RecipeInput, RecipeListQuery, RecipeSummary, Validate};
use crate::{ApiError, ApiResult, AppState};

fn not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Recipe {}", id))
}

/// GET /api/recipes?q=&tag=&limit=&offset=
pub async fn list_recipes(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<RecipeListQuery>,
) -> ApiResult<Json<Page<RecipeSummary>>> {
    query.validate()?;
    let page = db::recipes::list_recipes(&state.db, auth.user.id, &query).await?;
    Ok(Json(page))
}

/// POST /api/recipes
pub async fn create_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(payload): ApiJson<RecipeInput>,
) -> ApiResult<(StatusCode, Json<Recipe>)> {
    let input = payload.normalized();
    input.validate()?;
    let recipe = db::recipes::create_recipe(&state.db, auth.user.id, &input).await?;
    tracing::info!(user_id = %auth.user.id, recipe_id = %recipe.id, "Created recipe");
    Ok((StatusCode::CREATED, Json(recipe)))
}

/// GET /api/recipes/:id
pub async fn get_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Recipe>> {
    db::recipes::get_recipe(&state.db, auth.user.id, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// PUT /api/recipes/:id
pub async fn replace_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<RecipeInput>,
) -> ApiResult<Json<Recipe>> {
    let input = payload.normalized();
    input.validate()?;
    db::recipes::replace_recipe(&state.db, auth.user.id, id, &input)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// DELETE /api/recipes/:id
pub async fn delete_recipe(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    if !db::recipes::delete_recipe(&state.db, auth.user.id, id).await? {
        return Err(not_found(id));
    }
    tracing::info!(user_id = %auth.user.id, recipe_id = %id, "Deleted recipe");
    Ok(StatusCode::NO_CONTENT)
}

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/api/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/api/recipes/:id",
            get(get_recipe).put(replace_recipe).delete(delete_recipe),
        )
}
