//! Meal plan DTOs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::recipe::{MAX_NOTE_CHARS, MAX_SERVINGS, MAX_TITLE_CHARS};
use super::validation::{optional_range, optional_text, Validate, ValidationError};

/// Longest range `GET /api/meal-plan` accepts, in days (inclusive)
pub const MAX_RANGE_DAYS: i64 = 62;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealSlot::Breakfast => "breakfast",
            MealSlot::Lunch => "lunch",
            MealSlot::Dinner => "dinner",
            MealSlot::Snack => "snack",
        }
    }

    pub fn from_db(value: &str) -> Option<MealSlot> {
        match value {
            "breakfast" => Some(MealSlot::Breakfast),
            "lunch" => Some(MealSlot::Lunch),
            "dinner" => Some(MealSlot::Dinner),
            "snack" => Some(MealSlot::Snack),
            _ => None,
        }
    }

    /// Order of slots within a day
    pub fn rank(&self) -> u8 {
        match self {
            MealSlot::Breakfast => 0,
            MealSlot::Lunch => 1,
            MealSlot::Dinner => 2,
            MealSlot::Snack => 3,
        }
    }
}

/// Stored meal plan entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanEntry {
    pub id: Uuid,
    pub plan_date: NaiveDate,
    pub meal_slot: MealSlot,
    pub recipe_id: Option<Uuid>,
    pub title: String,
    pub servings: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/meal-plan`
///
/// Either `recipe_id` or `title` must be given; with a recipe and no title
/// the recipe title is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewMealPlanEntry {
    pub plan_date: NaiveDate,
    pub meal_slot: MealSlot,
    #[serde(default)]
    pub recipe_id: Option<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub servings: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Validate for NewMealPlanEntry {
    fn validate(&self) -> Result<(), ValidationError> {
        let has_title = self
            .title
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);
        if self.recipe_id.is_none() && !has_title {
            return Err(ValidationError::new(
                "title",
                "either recipe_id or a non-blank title is required",
            ));
        }
        optional_text("title", self.title.as_deref(), MAX_TITLE_CHARS)?;
        optional_range("servings", self.servings, 1, MAX_SERVINGS)?;
        optional_text("notes", self.notes.as_deref(), MAX_NOTE_CHARS)
    }
}

/// Query of `GET /api/meal-plan`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MealPlanQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Validate for MealPlanQuery {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.to < self.from {
            return Err(ValidationError::new("to", "must not be before from"));
        }
        let days = (self.to - self.from).num_days() + 1;
        if days > MAX_RANGE_DAYS {
            return Err(ValidationError::new(
                "to",
                format!("range must not exceed {} days", MAX_RANGE_DAYS),
            ));
        }
        Ok(())
    }
}
