//! Recipe extraction pipeline
//!
//! fetch -> sanitize -> agent call -> parse/normalize -> [`DraftOutcome`]
//!
//! The stages are public so the SSE handler can report progress between
//! them; [`RecipeExtractor::extract`] runs them back to back.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::html_fetcher::{FetchedPage, PageFetcher};
use super::html_sanitizer::{sanitize_html, SanitizedPage};
use super::llm::{CompletionRequest, LanguageModel, LlmMessage};
use super::structured_recipe::{
    collect_steps, draft_from_json_ld, normalize_draft, parse_ingredient_line, parse_iso_duration,
    parse_yield,
};
use crate::error::ExtractionError;
use crate::models::{DraftOutcome, IngredientInput, RecipeDraft, Unit};

const EXTRACTION_PROMPT: &str = r#"You extract cooking recipes from web page text.
Reply with a single JSON object and nothing else, using exactly these keys:
{
  "title": string,
  "description": string or null,
  "servings": integer or null,
  "prep_minutes": integer or null,
  "cook_minutes": integer or null,
  "ingredients": [{"name": string, "quantity": number or null, "unit": string or null, "note": string or null}],
  "instructions": [string],
  "tags": [string]
}
Units must be one of: g, kg, ml, l, tsp, tbsp, cup, oz, lb, piece, pinch, clove, can, slice, to_taste.
Use only information present on the page. Do not invent ingredients or steps.
If the page does not contain a recipe, reply with {"error": "not_a_recipe"}."#;

/// Ingredient as a model writes it: a plain line or an object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AgentIngredient {
    Line(String),
    Structured {
        name: String,
        #[serde(default)]
        quantity: Option<Value>,
        #[serde(default)]
        unit: Option<String>,
        #[serde(default)]
        note: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentRecipe {
    title: String,
    description: Option<String>,
    servings: Option<Value>,
    prep_minutes: Option<Value>,
    cook_minutes: Option<Value>,
    ingredients: Vec<AgentIngredient>,
    instructions: Vec<Value>,
    tags: Vec<String>,
}

/// Integer from a number or a string like "20 minutes" / "PT20M"
fn loose_int(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => parse_iso_duration(s).or_else(|| parse_yield(value)),
        other => parse_yield(other),
    }
}

fn loose_quantity(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .or_else(|| parse_ingredient_line(s).quantity),
        _ => None,
    }
}

fn convert_ingredient(raw: AgentIngredient) -> IngredientInput {
    match raw {
        AgentIngredient::Line(line) => parse_ingredient_line(&line),
        AgentIngredient::Structured {
            name,
            quantity,
            unit,
            note,
        } => {
            let mut note = note.filter(|n| !n.trim().is_empty());
            let parsed_unit = match unit.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                Some(raw_unit) => match Unit::parse_loose(raw_unit) {
                    Some(unit) => Some(unit),
                    None => {
                        // unknown units survive as a note
                        note = Some(match note {
                            Some(existing) => format!("{} ({})", raw_unit, existing),
                            None => raw_unit.to_string(),
                        });
                        None
                    }
                },
                None => None,
            };
            IngredientInput {
                name,
                quantity: quantity.as_ref().and_then(loose_quantity),
                unit: parsed_unit,
                note,
            }
        }
    }
}

/// Strip a surrounding Markdown code fence, if any
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // drop the info string ("json") on the opening line
    match inner.split_once('\n') {
        Some((info, body)) if !info.trim_start().starts_with('{') => body.trim(),
        _ => inner.trim(),
    }
}

/// Parse the model's JSON reply into a draft (not yet normalized)
pub fn parse_agent_reply(reply: &str) -> Result<RecipeDraft, ExtractionError> {
    let body = strip_code_fence(reply);
    let value: Value = serde_json::from_str(body).map_err(|e| {
        ExtractionError::AgentFailed(format!("The model reply was not valid JSON: {}", e))
    })?;

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        tracing::info!(reason = %error, "Model reported no recipe on page");
        return Err(ExtractionError::NotFound(
            "No recipe was found on this page".to_string(),
        ));
    }
    if !value.is_object() {
        return Err(ExtractionError::AgentFailed(
            "The model reply was not a JSON object".to_string(),
        ));
    }

    let raw: AgentRecipe = serde_json::from_value(value).map_err(|e| {
        ExtractionError::AgentFailed(format!("The model reply had an unexpected shape: {}", e))
    })?;

    let mut instructions = Vec::new();
    for step in &raw.instructions {
        collect_steps(step, &mut instructions);
    }

    Ok(RecipeDraft {
        title: raw.title,
        description: raw.description.filter(|d| !d.trim().is_empty()),
        servings: raw.servings.as_ref().and_then(loose_int),
        prep_minutes: raw.prep_minutes.as_ref().and_then(loose_int),
        cook_minutes: raw.cook_minutes.as_ref().and_then(loose_int),
        ingredients: raw.ingredients.into_iter().map(convert_ingredient).collect(),
        instructions,
        tags: raw.tags,
    })
}

fn build_user_prompt(url: &str, page: &SanitizedPage) -> String {
    let mut prompt = format!("URL: {}\n", url);
    if let Some(title) = &page.title {
        prompt.push_str(&format!("Page title: {}\n", title));
    }
    if let Some(recipe) = &page.structured_recipe {
        prompt.push_str("\nStructured recipe data (JSON-LD) found on the page:\n");
        prompt.push_str(&recipe.to_string());
        prompt.push('\n');
    }
    prompt.push_str("\nPage text:\n");
    prompt.push_str(&page.text);
    prompt
}

/// Reject drafts that cannot become a recipe
fn ensure_usable(draft: &RecipeDraft) -> Result<(), ExtractionError> {
    if draft.title.trim().is_empty() {
        return Err(ExtractionError::ConversionFailed(
            "The extracted recipe has no title".to_string(),
        ));
    }
    if draft.ingredients.is_empty() {
        return Err(ExtractionError::ConversionFailed(
            "The extracted recipe has no ingredients".to_string(),
        ));
    }
    Ok(())
}

pub struct RecipeExtractor {
    fetcher: Arc<dyn PageFetcher>,
    model: Arc<dyn LanguageModel>,
    max_prompt_chars: usize,
}

impl RecipeExtractor {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        model: Arc<dyn LanguageModel>,
        max_prompt_chars: usize,
    ) -> Self {
        Self {
            fetcher,
            model,
            max_prompt_chars,
        }
    }

    /// Stage 1: download
    pub async fn fetch_page(&self, url: &str) -> Result<FetchedPage, ExtractionError> {
        self.fetcher.fetch(url).await
    }

    /// Stage 2: sanitize
    pub fn prepare(&self, page: &FetchedPage) -> Result<SanitizedPage, ExtractionError> {
        sanitize_html(&page.html, self.max_prompt_chars)
    }

    /// Stage 3: turn page text into a normalized draft
    ///
    /// Without a configured model, a page with JSON-LD recipe data is still
    /// imported from that data alone.
    pub async fn run_agent(&self, url: &str, page: SanitizedPage) -> Result<DraftOutcome, ExtractionError> {
        let mut warnings = page.warnings.clone();
        let used_structured_data = page.structured_recipe.is_some();

        let draft = if !self.model.is_configured() {
            match &page.structured_recipe {
                Some(recipe) => {
                    warnings.push(
                        "Imported from the page's structured data only; review carefully".to_string(),
                    );
                    draft_from_json_ld(recipe)
                }
                None => {
                    return Err(ExtractionError::AgentFailed(
                        "language model not configured".to_string(),
                    ))
                }
            }
        } else {
            let request = CompletionRequest {
                system: EXTRACTION_PROMPT.to_string(),
                messages: vec![LlmMessage::user(build_user_prompt(url, &page))],
                tools: Vec::new(),
                json_mode: true,
            };
            let response = self.model.complete(request).await.map_err(|e| {
                tracing::warn!(url = %url, error = %e, "Extraction model call failed");
                ExtractionError::AgentFailed(e.to_string())
            })?;
            let reply = response.content.ok_or_else(|| {
                ExtractionError::AgentFailed("The model returned an empty reply".to_string())
            })?;
            parse_agent_reply(&reply)?
        };

        let draft = normalize_draft(draft, &mut warnings);
        ensure_usable(&draft)?;

        tracing::info!(
            url = %url,
            title = %draft.title,
            ingredients = draft.ingredients.len(),
            warnings = warnings.len(),
            used_structured_data,
            "Recipe draft extracted"
        );

        Ok(DraftOutcome::new(draft, url, warnings, used_structured_data))
    }

    /// All stages
    pub async fn extract(&self, url: &str) -> Result<DraftOutcome, ExtractionError> {
        let page = self.fetch_page(url).await?;
        let sanitized = self.prepare(&page)?;
        self.run_agent(&page.final_url, sanitized).await
    }
}
