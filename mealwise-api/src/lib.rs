//! mealwise-api library interface
//!
//! Exposes the router and application state so integration tests can
//! drive the service with in-memory databases and fake collaborators.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use mealwise_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::services::{
    DisabledModel, DraftStore, HttpPageFetcher, LanguageModel, LlmError, OpenAiCompatibleModel,
    PageFetcher, RecipeExtractor,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Resolved bootstrap configuration
    pub settings: Arc<TomlConfig>,
    pub model: Arc<dyn LanguageModel>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub drafts: DraftStore,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        settings: TomlConfig,
        model: Arc<dyn LanguageModel>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let drafts = DraftStore::new(db.clone(), settings.drafts.ttl_hours);
        Self {
            db,
            settings: Arc::new(settings),
            model,
            fetcher,
            drafts,
            startup_time: Utc::now(),
        }
    }

    /// State with the production HTTP fetcher and language model
    ///
    /// Without an API key the service still starts; extraction falls back
    /// to page metadata and chat turns fail with an upstream error.
    pub fn from_config(db: SqlitePool, settings: TomlConfig) -> Result<Self, LlmError> {
        let model: Arc<dyn LanguageModel> = match settings.llm.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                info!(model = %settings.llm.model, base_url = %settings.llm.base_url, "Language model configured");
                Arc::new(OpenAiCompatibleModel::new(&settings.llm, key)?)
            }
            _ => {
                warn!("No language model API key configured; AI features are disabled");
                Arc::new(DisabledModel)
            }
        };
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new(settings.fetch.clone()));
        Ok(Self::new(db, settings, model, fetcher))
    }

    /// Extraction pipeline over this state's collaborators
    pub fn extractor(&self) -> RecipeExtractor {
        RecipeExtractor::new(
            self.fetcher.clone(),
            self.model.clone(),
            self.settings.fetch.max_prompt_chars,
        )
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::auth_routes())
        .merge(api::user_routes())
        .merge(api::recipe_routes())
        .merge(api::draft_routes())
        .merge(api::meal_plan_routes())
        .merge(api::chat_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
