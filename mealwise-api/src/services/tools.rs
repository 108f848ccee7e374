//! Assistant tools
//!
//! Read-only tools run as soon as the model calls them. Mutating tools are
//! only parsed and validated during a chat turn; they run later, when the
//! user confirms the stored proposal.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use super::llm::ToolDefinition;
use crate::db;
use crate::models::{NewMealPlanEntry, RecipeInput, RecipeListQuery, Validate};
use crate::models::meal_plan::MAX_RANGE_DAYS;

const SEARCH_LIMIT_MAX: i64 = 20;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] mealwise_common::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRecipesArgs {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetRecipeArgs {
    pub recipe_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetMealPlanArgs {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveMealPlanEntryArgs {
    pub entry_id: Uuid,
}

/// A parsed, validated tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    SearchRecipes(SearchRecipesArgs),
    GetRecipe(GetRecipeArgs),
    GetMealPlan(GetMealPlanArgs),
    AddMealPlanEntry(NewMealPlanEntry),
    RemoveMealPlanEntry(RemoveMealPlanEntryArgs),
    CreateRecipe(RecipeInput),
}

fn decode<T: serde::de::DeserializeOwned>(tool: &str, arguments: &Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments.clone()).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

fn invalid(tool: &str, message: impl ToString) -> ToolError {
    ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

impl ToolInvocation {
    /// Parse and validate a model tool call
    pub fn parse(name: &str, arguments: &Value) -> Result<Self, ToolError> {
        if !arguments.is_object() {
            return Err(invalid(name, "arguments must be a JSON object"));
        }
        let invocation = match name {
            "search_recipes" => {
                let args: SearchRecipesArgs = decode(name, arguments)?;
                if let Some(limit) = args.limit {
                    if !(1..=SEARCH_LIMIT_MAX).contains(&limit) {
                        return Err(invalid(name, format!("limit must be between 1 and {}", SEARCH_LIMIT_MAX)));
                    }
                }
                ToolInvocation::SearchRecipes(args)
            }
            "get_recipe" => ToolInvocation::GetRecipe(decode(name, arguments)?),
            "get_meal_plan" => {
                let args: GetMealPlanArgs = decode(name, arguments)?;
                let days = (args.to - args.from).num_days() + 1;
                if days < 1 || days > MAX_RANGE_DAYS {
                    return Err(invalid(name, format!("range must cover 1 to {} days", MAX_RANGE_DAYS)));
                }
                ToolInvocation::GetMealPlan(args)
            }
            "add_meal_plan_entry" => {
                let entry: NewMealPlanEntry = decode(name, arguments)?;
                entry.validate().map_err(|e| invalid(name, e))?;
                ToolInvocation::AddMealPlanEntry(entry)
            }
            "remove_meal_plan_entry" => ToolInvocation::RemoveMealPlanEntry(decode(name, arguments)?),
            "create_recipe" => {
                let input: RecipeInput = decode::<RecipeInput>(name, arguments)?.normalized();
                input.validate().map_err(|e| invalid(name, e))?;
                ToolInvocation::CreateRecipe(input)
            }
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };
        Ok(invocation)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolInvocation::SearchRecipes(_) => "search_recipes",
            ToolInvocation::GetRecipe(_) => "get_recipe",
            ToolInvocation::GetMealPlan(_) => "get_meal_plan",
            ToolInvocation::AddMealPlanEntry(_) => "add_meal_plan_entry",
            ToolInvocation::RemoveMealPlanEntry(_) => "remove_meal_plan_entry",
            ToolInvocation::CreateRecipe(_) => "create_recipe",
        }
    }

    /// Mutating tools need user confirmation
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ToolInvocation::AddMealPlanEntry(_)
                | ToolInvocation::RemoveMealPlanEntry(_)
                | ToolInvocation::CreateRecipe(_)
        )
    }

    /// Text shown to the user on the confirmation card
    pub async fn summarize(&self, pool: &SqlitePool, user_id: Uuid) -> Result<String, ToolError> {
        let summary = match self {
            ToolInvocation::AddMealPlanEntry(entry) => {
                let title = match (&entry.title, entry.recipe_id) {
                    (Some(title), _) if !title.trim().is_empty() => title.trim().to_string(),
                    (_, Some(recipe_id)) => db::recipes::get_recipe(pool, user_id, recipe_id)
                        .await?
                        .map(|r| r.title)
                        .ok_or_else(|| ToolError::NotFound(format!("Recipe {} not found", recipe_id)))?,
                    _ => "a meal".to_string(),
                };
                format!(
                    "Add \"{}\" to {} on {}",
                    title,
                    entry.meal_slot.as_str(),
                    entry.plan_date.format("%A %Y-%m-%d")
                )
            }
            ToolInvocation::RemoveMealPlanEntry(args) => {
                let entry = db::meal_plan::get_entry(pool, user_id, args.entry_id)
                    .await?
                    .ok_or_else(|| ToolError::NotFound(format!("Meal plan entry {} not found", args.entry_id)))?;
                format!(
                    "Remove \"{}\" from {} on {}",
                    entry.title,
                    entry.meal_slot.as_str(),
                    entry.plan_date.format("%A %Y-%m-%d")
                )
            }
            ToolInvocation::CreateRecipe(input) => format!(
                "Save new recipe \"{}\" ({} ingredients)",
                input.title,
                input.ingredients.len()
            ),
            other => format!("Run {}", other.name()),
        };
        Ok(summary)
    }

    /// Run the tool as `user_id`
    pub async fn execute(&self, pool: &SqlitePool, user_id: Uuid) -> Result<Value, ToolError> {
        match self {
            ToolInvocation::SearchRecipes(args) => {
                let query = RecipeListQuery {
                    q: args.query.clone(),
                    tag: args.tag.clone(),
                    limit: Some(args.limit.unwrap_or(10)),
                    offset: None,
                };
                let page = db::recipes::list_recipes(pool, user_id, &query).await?;
                Ok(json!({"total": page.total, "recipes": page.items}))
            }
            ToolInvocation::GetRecipe(args) => {
                let recipe = db::recipes::get_recipe(pool, user_id, args.recipe_id)
                    .await?
                    .ok_or_else(|| ToolError::NotFound(format!("Recipe {} not found", args.recipe_id)))?;
                Ok(json!({"recipe": recipe}))
            }
            ToolInvocation::GetMealPlan(args) => {
                let entries = db::meal_plan::list_entries(pool, user_id, args.from, args.to).await?;
                Ok(json!({"from": args.from, "to": args.to, "entries": entries}))
            }
            ToolInvocation::AddMealPlanEntry(entry) => {
                let stored = db::meal_plan::add_entry(pool, user_id, entry)
                    .await
                    .map_err(|e| match e {
                        mealwise_common::Error::NotFound(what) => ToolError::NotFound(format!("{} not found", what)),
                        other => ToolError::Database(other),
                    })?;
                Ok(json!({"entry": stored}))
            }
            ToolInvocation::RemoveMealPlanEntry(args) => {
                if db::meal_plan::delete_entry(pool, user_id, args.entry_id).await? {
                    Ok(json!({"removed": true, "entry_id": args.entry_id}))
                } else {
                    Err(ToolError::NotFound(format!("Meal plan entry {} not found", args.entry_id)))
                }
            }
            ToolInvocation::CreateRecipe(input) => {
                let recipe = db::recipes::create_recipe(pool, user_id, input).await?;
                Ok(json!({"recipe": {"id": recipe.id, "title": recipe.title}}))
            }
        }
    }
}

/// Tool schemas offered to the model
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let slot = json!({"type": "string", "enum": ["breakfast", "lunch", "dinner", "snack"]});
    let date = json!({"type": "string", "format": "date", "description": "YYYY-MM-DD"});
    vec![
        ToolDefinition {
            name: "search_recipes",
            description: "Search the user's saved recipes by text and/or tag.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "tag": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "maximum": SEARCH_LIMIT_MAX}
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_recipe",
            description: "Fetch one saved recipe with its ingredients and steps.",
            parameters: json!({
                "type": "object",
                "properties": {"recipe_id": {"type": "string", "format": "uuid"}},
                "required": ["recipe_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_meal_plan",
            description: "List meal plan entries between two dates (inclusive).",
            parameters: json!({
                "type": "object",
                "properties": {"from": date, "to": date},
                "required": ["from", "to"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "add_meal_plan_entry",
            description: "Propose adding a meal to the plan. The user must confirm it.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "plan_date": date,
                    "meal_slot": slot,
                    "recipe_id": {"type": "string", "format": "uuid"},
                    "title": {"type": "string"},
                    "servings": {"type": "integer", "minimum": 1},
                    "notes": {"type": "string"}
                },
                "required": ["plan_date", "meal_slot"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "remove_meal_plan_entry",
            description: "Propose removing a meal plan entry. The user must confirm it.",
            parameters: json!({
                "type": "object",
                "properties": {"entry_id": {"type": "string", "format": "uuid"}},
                "required": ["entry_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "create_recipe",
            description: "Propose saving a new recipe. The user must confirm it.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "servings": {"type": "integer", "minimum": 1},
                    "prep_minutes": {"type": "integer", "minimum": 0},
                    "cook_minutes": {"type": "integer", "minimum": 0},
                    "ingredients": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string"},
                                "quantity": {"type": "number", "minimum": 0},
                                "unit": {"type": "string"},
                                "note": {"type": "string"}
                            },
                            "required": ["name"]
                        }
                    },
                    "instructions": {"type": "array", "items": {"type": "string"}},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["title"],
                "additionalProperties": false
            }),
        },
    ]
}
