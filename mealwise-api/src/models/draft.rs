//! Recipe drafts produced by the extraction pipeline
//!
//! A draft is an unconfirmed recipe. It is deliberately lenient (no
//! `deny_unknown_fields`, optional everything) because it comes from a
//! model reply or page metadata; the strict [`RecipeInput`] rules apply
//! only when the draft is confirmed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recipe::{IngredientInput, RecipeInput};
use super::validation::Validate;
use crate::error::ExtractionError;

/// Extracted recipe awaiting review
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub servings: Option<i64>,
    #[serde(default)]
    pub prep_minutes: Option<i64>,
    #[serde(default)]
    pub cook_minutes: Option<i64>,
    #[serde(default)]
    pub ingredients: Vec<IngredientInput>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RecipeDraft {
    /// Convert to a validated recipe payload
    ///
    /// Fails with `ConversionFailed` when the title is blank, there are no
    /// ingredients, or any field breaks the recipe rules.
    pub fn to_recipe_input(&self, source_url: &str) -> Result<RecipeInput, ExtractionError> {
        if self.title.trim().is_empty() {
            return Err(ExtractionError::ConversionFailed(
                "Recipe draft has no title".to_string(),
            ));
        }
        if self.ingredients.is_empty() {
            return Err(ExtractionError::ConversionFailed(
                "Recipe draft has no ingredients".to_string(),
            ));
        }

        let input = RecipeInput {
            title: self.title.clone(),
            description: self.description.clone(),
            servings: self.servings,
            prep_minutes: self.prep_minutes,
            cook_minutes: self.cook_minutes,
            ingredients: self.ingredients.clone(),
            instructions: self.instructions.clone(),
            tags: self.tags.clone(),
            source_url: Some(source_url.to_string()),
        }
        .normalized();

        input
            .validate()
            .map_err(|e| ExtractionError::ConversionFailed(e.to_string()))?;
        Ok(input)
    }
}

/// Result of one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOutcome {
    pub draft: RecipeDraft,
    pub source_url: String,
    pub warnings: Vec<String>,
    /// True when page JSON-LD recipe data informed the draft
    pub used_structured_data: bool,
}

impl DraftOutcome {
    pub fn new(
        draft: RecipeDraft,
        source_url: impl Into<String>,
        warnings: Vec<String>,
        used_structured_data: bool,
    ) -> Self {
        Self {
            draft,
            source_url: source_url.into(),
            warnings,
            used_structured_data,
        }
    }
}

/// Draft as returned by `GET /api/recipes/drafts/:token`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftResponse {
    pub token: String,
    #[serde(flatten)]
    pub outcome: DraftOutcome,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /api/recipes/drafts/:token/confirm`
///
/// `overrides` replaces the draft wholesale (the client edited it before
/// saving).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmDraftRequest {
    #[serde(default)]
    pub overrides: Option<RecipeInput>,
}

/// Body of `POST /api/recipes/extract`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractRequest {
    pub url: String,
}

impl Validate for ExtractRequest {
    fn validate(&self) -> Result<(), super::validation::ValidationError> {
        super::validation::http_url("url", self.url.trim())
    }
}
