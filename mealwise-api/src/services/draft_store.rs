//! Short-lived storage for extracted recipe drafts
//!
//! Drafts are kept under a random token until the user confirms or
//! discards them, or they expire.

use chrono::{Duration, Utc};
use mealwise_common::auth::generate_token;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::db;
use crate::error::ExtractionError;
use crate::models::{DraftOutcome, DraftResponse, Recipe, RecipeInput, Validate, ValidationError};

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("Draft not found")]
    NotFound,

    #[error(transparent)]
    Conversion(#[from] ExtractionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] mealwise_common::Error),
}

#[derive(Clone)]
pub struct DraftStore {
    pool: SqlitePool,
    ttl: Duration,
}

impl DraftStore {
    pub fn new(pool: SqlitePool, ttl_hours: i64) -> Self {
        Self {
            pool,
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Persist an outcome and return its token
    pub async fn store(&self, user_id: Uuid, outcome: &DraftOutcome) -> Result<String, DraftError> {
        let token = generate_token();
        let expires_at = Utc::now() + self.ttl;
        db::drafts::insert_draft(&self.pool, &token, user_id, outcome, expires_at).await?;
        tracing::debug!(user_id = %user_id, source_url = %outcome.source_url, "Stored recipe draft");
        Ok(token)
    }

    pub async fn fetch(&self, user_id: Uuid, token: &str) -> Result<DraftResponse, DraftError> {
        db::drafts::get_draft(&self.pool, user_id, token)
            .await?
            .ok_or(DraftError::NotFound)
    }

    /// Turn a draft into a saved recipe
    ///
    /// `overrides` replaces the extracted fields wholesale. Conversion runs
    /// before the draft is touched, so a failed conversion can be retried
    /// with corrected overrides. The draft is consumed atomically with the
    /// recipe insert, so a token yields at most one recipe.
    pub async fn confirm(
        &self,
        user_id: Uuid,
        token: &str,
        overrides: Option<RecipeInput>,
    ) -> Result<Recipe, DraftError> {
        let draft = self.fetch(user_id, token).await?;
        let input = match overrides {
            Some(input) => {
                let mut input = input.normalized();
                if input.source_url.is_none() {
                    input.source_url = Some(draft.outcome.source_url.clone());
                }
                input.validate()?;
                input
            }
            None => draft.outcome.draft.to_recipe_input(&draft.outcome.source_url)?,
        };

        let recipe = db::drafts::consume_draft_into_recipe(&self.pool, user_id, token, &input)
            .await?
            .ok_or(DraftError::NotFound)?;
        tracing::info!(user_id = %user_id, recipe_id = %recipe.id, "Confirmed recipe draft");
        Ok(recipe)
    }

    pub async fn discard(&self, user_id: Uuid, token: &str) -> Result<(), DraftError> {
        if db::drafts::delete_draft(&self.pool, user_id, token).await? {
            Ok(())
        } else {
            Err(DraftError::NotFound)
        }
    }

    pub async fn purge_expired(&self) -> Result<u64, DraftError> {
        let purged = db::drafts::purge_expired_drafts(&self.pool).await?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired recipe drafts");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{add_user, pool_with_user};
    use crate::models::{IngredientInput, RecipeDraft};
    use serde_json::json;

    fn outcome() -> DraftOutcome {
        let draft = RecipeDraft {
            title: "Shakshuka".to_string(),
            servings: Some(2),
            ingredients: vec![
                serde_json::from_value::<IngredientInput>(json!({"name": "eggs", "quantity": 4.0}))
                    .unwrap(),
                serde_json::from_value::<IngredientInput>(json!({"name": "tomatoes"})).unwrap(),
            ],
            instructions: vec!["Simmer the sauce.".to_string(), "Poach the eggs.".to_string()],
            ..Default::default()
        };
        DraftOutcome::new(
            draft,
            "https://example.com/shakshuka",
            vec!["Dropped quantity for salt".to_string()],
            true,
        )
    }

    #[tokio::test]
    async fn test_store_fetch_preserves_outcome() {
        let (pool, user_id) = pool_with_user().await;
        let store = DraftStore::new(pool.clone(), 24);
        let original = outcome();

        let token = store.store(user_id, &original).await.unwrap();
        assert_eq!(token.len(), 64);

        let fetched = store.fetch(user_id, &token).await.unwrap();
        assert_eq!(fetched.token, token);
        assert_eq!(fetched.outcome, original);
        assert!(fetched.expires_at > fetched.created_at);

        let other = add_user(&pool, "other@example.com").await;
        assert!(matches!(store.fetch(other, &token).await, Err(DraftError::NotFound)));
    }

    #[tokio::test]
    async fn test_confirm_creates_recipe_and_removes_draft() {
        let (pool, user_id) = pool_with_user().await;
        let store = DraftStore::new(pool.clone(), 24);
        let token = store.store(user_id, &outcome()).await.unwrap();

        let recipe = store.confirm(user_id, &token, None).await.unwrap();
        assert_eq!(recipe.title, "Shakshuka");
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.source_url.as_deref(), Some("https://example.com/shakshuka"));

        assert!(matches!(store.fetch(user_id, &token).await, Err(DraftError::NotFound)));
        assert!(matches!(
            store.confirm(user_id, &token, None).await,
            Err(DraftError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_confirms_create_one_recipe() {
        let (pool, user_id) = pool_with_user().await;
        let store = DraftStore::new(pool.clone(), 24);
        let token = store.store(user_id, &outcome()).await.unwrap();

        let (a, b) = tokio::join!(
            store.confirm(user_id, &token, None),
            store.confirm(user_id, &token, None)
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let failed = if a.is_ok() { b } else { a };
        assert!(matches!(failed, Err(DraftError::NotFound)));

        let query = crate::models::RecipeListQuery::default();
        let page = db::recipes::list_recipes(&pool, user_id, &query).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_confirm_conversion_failure_keeps_draft() {
        let (pool, user_id) = pool_with_user().await;
        let store = DraftStore::new(pool, 24);
        let mut empty = outcome();
        empty.draft.ingredients.clear();
        let token = store.store(user_id, &empty).await.unwrap();

        let err = store.confirm(user_id, &token, None).await.unwrap_err();
        match err {
            DraftError::Conversion(e) => assert_eq!(e.code(), "conversion_failed"),
            other => panic!("unexpected error: {:?}", other),
        }

        let overrides: RecipeInput = serde_json::from_value(json!({
            "title": "Shakshuka",
            "ingredients": [{"name": "eggs"}]
        }))
        .unwrap();
        let recipe = store.confirm(user_id, &token, Some(overrides)).await.unwrap();
        assert_eq!(recipe.source_url.as_deref(), Some("https://example.com/shakshuka"));
    }

    #[tokio::test]
    async fn test_expired_drafts_are_hidden_and_purged() {
        let (pool, user_id) = pool_with_user().await;
        let store = DraftStore::new(pool, 0);
        let token = store.store(user_id, &outcome()).await.unwrap();

        assert!(matches!(store.fetch(user_id, &token).await, Err(DraftError::NotFound)));
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(matches!(store.discard(user_id, &token).await, Err(DraftError::NotFound)));
    }
}
