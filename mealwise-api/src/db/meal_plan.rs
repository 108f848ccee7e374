//! Meal plan persistence

use chrono::{NaiveDate, Utc};
use mealwise_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use super::{date_str, parse_date, parse_ts, parse_uuid, ts};
use crate::models::{MealPlanEntry, MealSlot, NewMealPlanEntry};

fn entry_from_row(row: &SqliteRow) -> Result<MealPlanEntry> {
    let id: String = row.get("id");
    let plan_date: String = row.get("plan_date");
    let slot: String = row.get("meal_slot");
    let recipe_id: Option<String> = row.get("recipe_id");
    let created_at: String = row.get("created_at");

    Ok(MealPlanEntry {
        id: parse_uuid(&id)?,
        plan_date: parse_date(&plan_date)?,
        meal_slot: MealSlot::from_db(&slot)
            .ok_or_else(|| Error::Internal(format!("Invalid stored meal slot '{}'", slot)))?,
        recipe_id: recipe_id.as_deref().map(parse_uuid).transpose()?,
        title: row.get("title"),
        servings: row.get("servings"),
        notes: row.get("notes"),
        created_at: parse_ts(&created_at)?,
    })
}

/// Insert an entry
///
/// When `recipe_id` is set it must name one of the user's recipes; the
/// recipe title fills in a missing entry title.
pub async fn add_entry(
    pool: &SqlitePool,
    user_id: Uuid,
    entry: &NewMealPlanEntry,
) -> Result<MealPlanEntry> {
    let recipe_title: Option<String> = match entry.recipe_id {
        Some(recipe_id) => {
            let row = sqlx::query("SELECT title FROM recipes WHERE id = ? AND user_id = ?")
                .bind(recipe_id.to_string())
                .bind(user_id.to_string())
                .fetch_optional(pool)
                .await?;
            match row {
                Some(row) => Some(row.get("title")),
                None => return Err(Error::NotFound(format!("Recipe {}", recipe_id))),
            }
        }
        None => None,
    };

    let title = entry
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or(recipe_title)
        .ok_or_else(|| Error::InvalidInput("title is required".to_string()))?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO meal_plan_entries (
            id, user_id, plan_date, meal_slot, recipe_id, title, servings, notes, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .bind(date_str(entry.plan_date))
    .bind(entry.meal_slot.as_str())
    .bind(entry.recipe_id.map(|r| r.to_string()))
    .bind(&title)
    .bind(entry.servings)
    .bind(entry.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()))
    .bind(ts(Utc::now()))
    .execute(pool)
    .await?;

    get_entry(pool, user_id, id)
        .await?
        .ok_or_else(|| Error::Internal("Meal plan entry vanished after insert".to_string()))
}

pub async fn get_entry(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<Option<MealPlanEntry>> {
    let row = sqlx::query(
        r#"
        SELECT id, plan_date, meal_slot, recipe_id, title, servings, notes, created_at
        FROM meal_plan_entries
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

/// Entries between `from` and `to` inclusive, ordered by date then slot
pub async fn list_entries(
    pool: &SqlitePool,
    user_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<MealPlanEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, plan_date, meal_slot, recipe_id, title, servings, notes, created_at
        FROM meal_plan_entries
        WHERE user_id = ? AND plan_date >= ? AND plan_date <= ?
        ORDER BY plan_date, created_at
        "#,
    )
    .bind(user_id.to_string())
    .bind(date_str(from))
    .bind(date_str(to))
    .fetch_all(pool)
    .await?;

    let mut entries = rows
        .iter()
        .map(entry_from_row)
        .collect::<Result<Vec<_>>>()?;
    // stable sort keeps creation order within a slot
    entries.sort_by_key(|e| (e.plan_date, e.meal_slot.rank()));
    Ok(entries)
}

pub async fn delete_entry(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM meal_plan_entries WHERE id = ? AND user_id = ?")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
