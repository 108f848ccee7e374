//! Recipe and ingredient DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{
    http_url, max_items, optional_quantity, optional_range, optional_text, require_text, Validate,
    ValidationError,
};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const MAX_INGREDIENTS: usize = 200;
pub const MAX_STEPS: usize = 100;
pub const MAX_STEP_CHARS: usize = 2000;
pub const MAX_TAGS: usize = 30;
pub const MAX_TAG_CHARS: usize = 40;
pub const MAX_NOTE_CHARS: usize = 500;
pub const MAX_SERVINGS: i64 = 100;
/// One week
pub const MAX_MINUTES: i64 = 10_080;

/// Measurement unit of an ingredient quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    G,
    Kg,
    Ml,
    L,
    Tsp,
    Tbsp,
    Cup,
    Oz,
    Lb,
    Piece,
    Pinch,
    Clove,
    Can,
    Slice,
    ToTaste,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::G => "g",
            Unit::Kg => "kg",
            Unit::Ml => "ml",
            Unit::L => "l",
            Unit::Tsp => "tsp",
            Unit::Tbsp => "tbsp",
            Unit::Cup => "cup",
            Unit::Oz => "oz",
            Unit::Lb => "lb",
            Unit::Piece => "piece",
            Unit::Pinch => "pinch",
            Unit::Clove => "clove",
            Unit::Can => "can",
            Unit::Slice => "slice",
            Unit::ToTaste => "to_taste",
        }
    }

    /// Strict parse of the stored form
    pub fn from_db(value: &str) -> Option<Unit> {
        serde_json::from_value(serde_json::Value::String(value.to_string())).ok()
    }

    /// Lenient parse of free-form unit words ("Tablespoons", "grams", "c.")
    pub fn parse_loose(value: &str) -> Option<Unit> {
        let normalized = value.trim().trim_end_matches('.').to_lowercase();
        let unit = match normalized.as_str() {
            "g" | "gr" | "gram" | "grams" | "gramme" | "grammes" => Unit::G,
            "kg" | "kilo" | "kilos" | "kilogram" | "kilograms" => Unit::Kg,
            "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => Unit::Ml,
            "l" | "liter" | "liters" | "litre" | "litres" => Unit::L,
            "tsp" | "tsps" | "teaspoon" | "teaspoons" => Unit::Tsp,
            "tbsp" | "tbsps" | "tbs" | "tablespoon" | "tablespoons" | "tbl" => Unit::Tbsp,
            "cup" | "cups" | "c" => Unit::Cup,
            "oz" | "ounce" | "ounces" => Unit::Oz,
            "lb" | "lbs" | "pound" | "pounds" => Unit::Lb,
            "piece" | "pieces" | "pc" | "pcs" | "whole" => Unit::Piece,
            "pinch" | "pinches" => Unit::Pinch,
            "clove" | "cloves" => Unit::Clove,
            "can" | "cans" | "tin" | "tins" => Unit::Can,
            "slice" | "slices" => Unit::Slice,
            "to taste" | "to_taste" => Unit::ToTaste,
            _ => return None,
        };
        Some(unit)
    }
}

/// Ingredient as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngredientInput {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<Unit>,
    #[serde(default)]
    pub note: Option<String>,
}

impl IngredientInput {
    fn validate_at(&self, index: usize) -> Result<(), ValidationError> {
        require_text(&format!("ingredients[{}].name", index), &self.name, MAX_TITLE_CHARS)?;
        optional_quantity(&format!("ingredients[{}].quantity", index), self.quantity)?;
        optional_text(
            &format!("ingredients[{}].note", index),
            self.note.as_deref(),
            MAX_NOTE_CHARS,
        )
    }
}

/// Create/replace payload for a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeInput {
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
    #[serde(default)]
    pub source_url: Option<String>,
}

impl RecipeInput {
    /// Trim text fields and normalize tags (lowercase, deduplicated)
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        for ingredient in &mut self.ingredients {
            ingredient.name = ingredient.name.trim().to_string();
            ingredient.note = ingredient
                .note
                .take()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty());
        }
        self.instructions = self
            .instructions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        self.tags = tags;
        self
    }
}

impl Validate for RecipeInput {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title, MAX_TITLE_CHARS)?;
        optional_text("description", self.description.as_deref(), MAX_DESCRIPTION_CHARS)?;
        optional_range("servings", self.servings, 1, MAX_SERVINGS)?;
        optional_range("prep_minutes", self.prep_minutes, 0, MAX_MINUTES)?;
        optional_range("cook_minutes", self.cook_minutes, 0, MAX_MINUTES)?;

        max_items("ingredients", &self.ingredients, MAX_INGREDIENTS)?;
        for (index, ingredient) in self.ingredients.iter().enumerate() {
            ingredient.validate_at(index)?;
        }

        max_items("instructions", &self.instructions, MAX_STEPS)?;
        for (index, step) in self.instructions.iter().enumerate() {
            require_text(&format!("instructions[{}]", index), step, MAX_STEP_CHARS)?;
        }

        max_items("tags", &self.tags, MAX_TAGS)?;
        for (index, tag) in self.tags.iter().enumerate() {
            require_text(&format!("tags[{}]", index), tag, MAX_TAG_CHARS)?;
        }

        if let Some(url) = &self.source_url {
            http_url("source_url", url)?;
        }
        Ok(())
    }
}

/// Stored ingredient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Uuid,
    pub position: i64,
    pub name: String,
    pub quantity: Option<f64>,
    pub unit: Option<Unit>,
    pub note: Option<String>,
}

/// Stored recipe with its ingredients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub servings: Option<i64>,
    pub prep_minutes: Option<i64>,
    pub cook_minutes: Option<i64>,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    pub tags: Vec<String>,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// List view of a recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub servings: Option<i64>,
    pub total_minutes: Option<i64>,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Query parameters of `GET /api/recipes`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeListQuery {
    pub q: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl RecipeListQuery {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

impl Validate for RecipeListQuery {
    fn validate(&self) -> Result<(), ValidationError> {
        optional_range("limit", self.limit, 1, Self::MAX_LIMIT)?;
        optional_range("offset", self.offset, 0, i64::MAX)?;
        optional_text("q", self.q.as_deref(), MAX_TITLE_CHARS)?;
        optional_text("tag", self.tag.as_deref(), MAX_TAG_CHARS)
    }
}

/// Paginated list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
