//! User account persistence

use chrono::Utc;
use mealwise_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

use super::{parse_string_list, parse_ts, parse_uuid, to_json, ts};
use crate::models::{UpdateProfileRequest, User};

const USER_COLUMNS: &str = "id, email, display_name, household_size, dietary_preferences, timezone, created_at";

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let id: String = row.get("id");
    let prefs: String = row.get("dietary_preferences");
    let created_at: String = row.get("created_at");

    Ok(User {
        id: parse_uuid(&id)?,
        email: row.get("email"),
        display_name: row.get("display_name"),
        household_size: row.get("household_size"),
        dietary_preferences: parse_string_list(&prefs)?,
        timezone: row.get("timezone"),
        created_at: parse_ts(&created_at)?,
    })
}

/// Emails are compared case-insensitively and stored trimmed, lowercase
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Insert a new user; a duplicate email surfaces as a unique violation
pub async fn create_user(
    pool: &SqlitePool,
    email: &str,
    display_name: &str,
    password_hash: &str,
) -> Result<User> {
    let id = Uuid::new_v4();
    let now = ts(Utc::now());

    sqlx::query(
        r#"
        INSERT INTO users (id, email, display_name, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(normalize_email(email))
    .bind(display_name.trim())
    .bind(password_hash)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_user(pool, id)
        .await?
        .ok_or_else(|| Error::Internal("User vanished after insert".to_string()))
}

pub async fn get_user(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// Look up a user and their password hash by email
pub async fn find_credentials(pool: &SqlitePool, email: &str) -> Result<Option<(User, String)>> {
    let row = sqlx::query(&format!(
        "SELECT {}, password_hash FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(normalize_email(email))
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let user = user_from_row(&row)?;
            Ok(Some((user, row.get("password_hash"))))
        }
        None => Ok(None),
    }
}

/// Apply the fields present in `update`
pub async fn update_profile(
    pool: &SqlitePool,
    id: Uuid,
    update: &UpdateProfileRequest,
) -> Result<User> {
    let current = get_user(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))?;

    let display_name = update
        .display_name
        .as_deref()
        .map(str::trim)
        .unwrap_or(&current.display_name)
        .to_string();
    let household_size = update.household_size.unwrap_or(current.household_size);
    let prefs: Vec<String> = match &update.dietary_preferences {
        Some(prefs) => prefs.iter().map(|p| p.trim().to_lowercase()).collect(),
        None => current.dietary_preferences,
    };
    let timezone = update.timezone.clone().unwrap_or(current.timezone);

    sqlx::query(
        r#"
        UPDATE users
        SET display_name = ?, household_size = ?, dietary_preferences = ?, timezone = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&display_name)
    .bind(household_size)
    .bind(to_json(&prefs)?)
    .bind(&timezone)
    .bind(ts(Utc::now()))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    get_user(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))
}
