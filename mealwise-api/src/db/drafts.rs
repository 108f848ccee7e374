//! Recipe draft persistence

use chrono::{DateTime, Utc};
use mealwise_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_string_list, parse_ts, recipes, to_json, ts};
use crate::models::{DraftOutcome, DraftResponse, Recipe, RecipeDraft, RecipeInput};

pub async fn insert_draft(
    pool: &SqlitePool,
    token: &str,
    user_id: Uuid,
    outcome: &DraftOutcome,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO recipe_drafts (
            token, user_id, source_url, payload, warnings, used_structured_data,
            created_at, expires_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(token)
    .bind(user_id.to_string())
    .bind(&outcome.source_url)
    .bind(to_json(&outcome.draft)?)
    .bind(to_json(&outcome.warnings)?)
    .bind(outcome.used_structured_data)
    .bind(ts(Utc::now()))
    .bind(ts(expires_at))
    .execute(pool)
    .await?;
    Ok(())
}

/// Load an unexpired draft owned by `user_id`
pub async fn get_draft(pool: &SqlitePool, user_id: Uuid, token: &str) -> Result<Option<DraftResponse>> {
    let row = sqlx::query(
        r#"
        SELECT token, source_url, payload, warnings, used_structured_data, created_at, expires_at
        FROM recipe_drafts
        WHERE token = ? AND user_id = ? AND expires_at > ?
        "#,
    )
    .bind(token)
    .bind(user_id.to_string())
    .bind(ts(Utc::now()))
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let payload: String = row.get("payload");
    let warnings: String = row.get("warnings");
    let created_at: String = row.get("created_at");
    let expires_at: String = row.get("expires_at");
    let draft: RecipeDraft = serde_json::from_str(&payload)
        .map_err(|e| Error::Internal(format!("Corrupt draft payload: {}", e)))?;

    Ok(Some(DraftResponse {
        token: row.get("token"),
        outcome: DraftOutcome::new(
            draft,
            row.get::<String, _>("source_url"),
            parse_string_list(&warnings)?,
            row.get("used_structured_data"),
        ),
        created_at: parse_ts(&created_at)?,
        expires_at: parse_ts(&expires_at)?,
    }))
}

pub async fn delete_draft(pool: &SqlitePool, user_id: Uuid, token: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM recipe_drafts WHERE token = ? AND user_id = ?")
        .bind(token)
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Consume a live draft and create its recipe in one transaction
///
/// The draft row is deleted first; when another caller already consumed
/// it (or it expired) nothing is written and `None` is returned.
pub async fn consume_draft_into_recipe(
    pool: &SqlitePool,
    user_id: Uuid,
    token: &str,
    input: &RecipeInput,
) -> Result<Option<Recipe>> {
    let mut tx = pool.begin().await?;
    let claimed = sqlx::query(
        "DELETE FROM recipe_drafts WHERE token = ? AND user_id = ? AND expires_at > ?",
    )
    .bind(token)
    .bind(user_id.to_string())
    .bind(ts(Utc::now()))
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    let id = recipes::insert_recipe(&mut tx, user_id, input).await?;
    tx.commit().await?;

    let recipe = recipes::get_recipe(pool, user_id, id)
        .await?
        .ok_or_else(|| Error::Internal("Recipe vanished after insert".to_string()))?;
    Ok(Some(recipe))
}

pub async fn purge_expired_drafts(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM recipe_drafts WHERE expires_at <= ?")
        .bind(ts(Utc::now()))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
