//! Session token persistence
//!
//! Only SHA-256 digests of tokens are stored.

use chrono::{DateTime, Duration, Utc};
use mealwise_common::auth::{generate_token, hash_token};
use mealwise_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_uuid, ts};

/// Issue a token for `user_id`; returns the raw token and its expiry
pub async fn issue_token(
    pool: &SqlitePool,
    user_id: Uuid,
    ttl: Duration,
) -> Result<(String, DateTime<Utc>)> {
    let token = generate_token();
    let now = Utc::now();
    let expires_at = now + ttl;

    sqlx::query(
        "INSERT INTO auth_tokens (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(hash_token(&token))
    .bind(user_id.to_string())
    .bind(ts(now))
    .bind(ts(expires_at))
    .execute(pool)
    .await?;

    Ok((token, expires_at))
}

/// Resolve a raw token to its user, ignoring expired tokens
pub async fn resolve_token(pool: &SqlitePool, token: &str) -> Result<Option<Uuid>> {
    let row = sqlx::query("SELECT user_id FROM auth_tokens WHERE token_hash = ? AND expires_at > ?")
        .bind(hash_token(token))
        .bind(ts(Utc::now()))
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let user_id: String = row.get("user_id");
            Ok(Some(parse_uuid(&user_id)?))
        }
        None => Ok(None),
    }
}

/// Revoke a token; returns whether it existed
pub async fn revoke_token(pool: &SqlitePool, token: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE token_hash = ?")
        .bind(hash_token(token))
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn purge_expired_tokens(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at <= ?")
        .bind(ts(Utc::now()))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::pool_with_user;

    #[tokio::test]
    async fn test_issue_resolve_revoke() {
        let (pool, user_id) = pool_with_user().await;
        let (token, expires_at) = issue_token(&pool, user_id, Duration::hours(1)).await.unwrap();
        assert!(expires_at > Utc::now());
        assert_eq!(token.len(), 64);

        assert_eq!(resolve_token(&pool, &token).await.unwrap(), Some(user_id));
        assert_eq!(resolve_token(&pool, "bogus").await.unwrap(), None);

        assert!(revoke_token(&pool, &token).await.unwrap());
        assert!(!revoke_token(&pool, &token).await.unwrap());
        assert_eq!(resolve_token(&pool, &token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_tokens_rejected_and_purged() {
        let (pool, user_id) = pool_with_user().await;
        let (token, _) = issue_token(&pool, user_id, Duration::hours(-1)).await.unwrap();
        assert_eq!(resolve_token(&pool, &token).await.unwrap(), None);
        assert_eq!(purge_expired_tokens(&pool).await.unwrap(), 1);
    }
}
