//! Loose recipe data to [`RecipeDraft`]
//!
//! Handles schema.org `Recipe` JSON-LD and the free-form strings models and
//! sites produce (ISO 8601 durations, "4 servings", "1 1/2 cups flour,
//! sifted"). [`normalize_draft`] then clamps everything into the ranges a
//! confirmed recipe must satisfy, recording a warning for each change.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::html_sanitizer::html_to_text;
use crate::models::recipe::{
    MAX_INGREDIENTS, MAX_MINUTES, MAX_NOTE_CHARS, MAX_SERVINGS, MAX_STEPS, MAX_TAGS, MAX_TAG_CHARS,
    MAX_TITLE_CHARS,
};
use crate::models::{IngredientInput, RecipeDraft, Unit};

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$").expect("valid regex")
});

static FIRST_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Leading quantity: "1 1/2", "1/2", "1.5", "1,5", "2-3", "1½", "½"
static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)\s+(\d+)/(\d+)|(\d+)/(\d+)|(\d+(?:[.,]\d+)?)\s*([½⅓⅔¼¾⅛⅜⅝⅞])?|([½⅓⅔¼¾⅛⅜⅝⅞]))(?:\s*(?:-|–|to)\s*\d+(?:[.,]\d+)?)?\s*")
        .expect("valid regex")
});

fn vulgar_fraction(c: &str) -> Option<f64> {
    let value = match c {
        "½" => 0.5,
        "⅓" => 1.0 / 3.0,
        "⅔" => 2.0 / 3.0,
        "¼" => 0.25,
        "¾" => 0.75,
        "⅛" => 0.125,
        "⅜" => 0.375,
        "⅝" => 0.625,
        "⅞" => 0.875,
        _ => return None,
    };
    Some(value)
}

/// ISO 8601 duration (`PT1H30M`, `P1DT2H`) in whole minutes, seconds rounded up
pub fn parse_iso_duration(value: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(value.trim())?;
    if caps.iter().skip(1).all(|c| c.is_none()) {
        return None;
    }
    // Out-of-range components make the whole duration unusable
    let part = |i: usize| -> Option<i64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse::<i64>().ok(),
            None => Some(0),
        }
    };
    let seconds: f64 = match caps.get(4) {
        Some(m) => m.as_str().parse().ok().filter(|s: &f64| s.is_finite())?,
        None => 0.0,
    };
    let second_minutes = (seconds / 60.0).ceil();
    if second_minutes > i64::MAX as f64 {
        return None;
    }
    part(1)?
        .checked_mul(1440)?
        .checked_add(part(2)?.checked_mul(60)?)?
        .checked_add(part(3)?)?
        .checked_add(second_minutes as i64)
}

/// Servings from `recipeYield` (number, "4 servings", or a list of those)
pub fn parse_yield(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => FIRST_NUMBER_RE.find(s).and_then(|m| m.as_str().parse().ok()),
        Value::Array(items) => items.iter().find_map(parse_yield),
        _ => None,
    }
}

/// Split "1 1/2 cups flour, sifted" into quantity, unit, name and note
pub fn parse_ingredient_line(line: &str) -> IngredientInput {
    let line = line.trim();
    let mut quantity = None;
    let mut rest = line;

    if let Some(caps) = QUANTITY_RE.captures(line) {
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok());
        let parsed = if let (Some(whole), Some(n), Some(d)) = (num(1), num(2), num(3)) {
            (d != 0.0).then(|| whole + n / d)
        } else if let (Some(n), Some(d)) = (num(4), num(5)) {
            (d != 0.0).then(|| n / d)
        } else if let Some(base) = num(6) {
            let frac = caps.get(7).and_then(|m| vulgar_fraction(m.as_str())).unwrap_or(0.0);
            Some(base + frac)
        } else {
            caps.get(8).and_then(|m| vulgar_fraction(m.as_str()))
        };
        if let Some(value) = parsed {
            quantity = Some(value);
            rest = &line[caps.get(0).map(|m| m.end()).unwrap_or(0)..];
        }
    }

    let mut unit = None;
    if quantity.is_some() {
        let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if let Some(parsed) = Unit::parse_loose(&rest[..word_end]) {
            unit = Some(parsed);
            rest = rest[word_end..].trim_start();
            rest = rest.strip_prefix("of ").unwrap_or(rest);
        }
    }

    let (name, mut note) = match rest.split_once(',') {
        Some((name, note)) => (name.trim(), Some(note.trim().to_string())),
        None => (rest.trim(), None),
    };

    const TO_TASTE: &str = " to taste";
    let split = name.len().saturating_sub(TO_TASTE.len());
    if unit.is_none()
        && name.len() > TO_TASTE.len()
        && name.is_char_boundary(split)
        && name[split..].eq_ignore_ascii_case(TO_TASTE)
    {
        unit = Some(Unit::ToTaste);
        let trimmed = name[..split].trim();
        return IngredientInput {
            name: trimmed.to_string(),
            quantity,
            unit,
            note: note.filter(|n| !n.is_empty()),
        };
    }

    let name = if name.is_empty() { line.to_string() } else { name.to_string() };
    note = note.filter(|n| !n.is_empty());
    IngredientInput {
        name,
        quantity,
        unit,
        note,
    }
}

fn text_of(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(|s| html_to_text(s).replace('\n', " "))
        .filter(|s| !s.is_empty())
}

/// Strings from a value that is either a string or an array of strings
fn string_list(value: Option<&Value>, split_commas: bool) -> Vec<String> {
    let raw: Vec<String> = match value {
        Some(Value::String(s)) if split_commas => s.split(',').map(str::to_string).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Flatten `recipeInstructions` (text, HowToStep, HowToSection)
pub(crate) fn collect_steps(value: &Value, steps: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let text = html_to_text(s);
            steps.extend(text.lines().map(str::to_string).filter(|l| !l.trim().is_empty()));
        }
        Value::Array(items) => {
            for item in items {
                collect_steps(item, steps);
            }
        }
        Value::Object(map) => {
            if let Some(list) = map.get("itemListElement") {
                collect_steps(list, steps);
            } else if let Some(text) = map.get("text").or_else(|| map.get("name")).and_then(text_of) {
                steps.push(text);
            }
        }
        _ => {}
    }
}

/// Draft from a schema.org Recipe object
pub fn draft_from_json_ld(recipe: &Value) -> RecipeDraft {
    let ingredients = string_list(
        recipe.get("recipeIngredient").or_else(|| recipe.get("ingredients")),
        false,
    )
    .iter()
    .map(|line| parse_ingredient_line(&html_to_text(line)))
    .collect();

    let mut instructions = Vec::new();
    if let Some(value) = recipe.get("recipeInstructions") {
        collect_steps(value, &mut instructions);
    }

    let mut tags = string_list(recipe.get("keywords"), true);
    tags.extend(string_list(recipe.get("recipeCategory"), true));
    tags.extend(string_list(recipe.get("recipeCuisine"), true));

    let minutes = |key: &str| recipe.get(key).and_then(Value::as_str).and_then(parse_iso_duration);
    let mut prep_minutes = minutes("prepTime");
    let mut cook_minutes = minutes("cookTime");
    if prep_minutes.is_none() && cook_minutes.is_none() {
        cook_minutes = minutes("totalTime");
    }
    if prep_minutes == Some(0) {
        prep_minutes = None;
    }

    RecipeDraft {
        title: recipe.get("name").and_then(text_of).unwrap_or_default(),
        description: recipe.get("description").and_then(text_of),
        servings: recipe.get("recipeYield").and_then(parse_yield),
        prep_minutes,
        cook_minutes,
        ingredients,
        instructions,
        tags,
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Clamp a draft into recipe limits, appending a warning per adjustment
pub fn normalize_draft(mut draft: RecipeDraft, warnings: &mut Vec<String>) -> RecipeDraft {
    draft.title = truncate_chars(draft.title.trim(), MAX_TITLE_CHARS);

    if let Some(servings) = draft.servings {
        if !(1..=MAX_SERVINGS).contains(&servings) {
            warnings.push(format!("Ignored implausible servings value ({})", servings));
            draft.servings = None;
        }
    }
    for (label, field) in [("prep", &mut draft.prep_minutes), ("cook", &mut draft.cook_minutes)] {
        if let Some(minutes) = *field {
            if !(0..=MAX_MINUTES).contains(&minutes) {
                warnings.push(format!("Ignored implausible {} time ({} minutes)", label, minutes));
                *field = None;
            }
        }
    }

    let mut ingredients = Vec::with_capacity(draft.ingredients.len());
    for mut ingredient in draft.ingredients {
        ingredient.name = truncate_chars(ingredient.name.trim(), MAX_TITLE_CHARS);
        if ingredient.name.is_empty() {
            warnings.push("Dropped an ingredient without a name".to_string());
            continue;
        }
        if let Some(q) = ingredient.quantity {
            if !q.is_finite() || q < 0.0 {
                warnings.push(format!("Dropped invalid quantity for {}", ingredient.name));
                ingredient.quantity = None;
            }
        }
        ingredient.note = ingredient
            .note
            .map(|n| truncate_chars(n.trim(), MAX_NOTE_CHARS))
            .filter(|n| !n.is_empty());
        ingredients.push(ingredient);
    }
    if ingredients.len() > MAX_INGREDIENTS {
        warnings.push(format!("Kept only the first {} ingredients", MAX_INGREDIENTS));
        ingredients.truncate(MAX_INGREDIENTS);
    }
    draft.ingredients = ingredients;

    draft.instructions.retain(|s| !s.trim().is_empty());
    if draft.instructions.len() > MAX_STEPS {
        warnings.push(format!("Kept only the first {} instruction steps", MAX_STEPS));
        draft.instructions.truncate(MAX_STEPS);
    }

    let mut tags: Vec<String> = Vec::new();
    for tag in draft.tags {
        let tag = truncate_chars(tag.trim(), MAX_TAG_CHARS).to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.truncate(MAX_TAGS);
    draft.tags = tags;

    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_iso_durations() {
        assert_eq!(parse_iso_duration("PT45M"), Some(45));
        assert_eq!(parse_iso_duration("PT1H30M"), Some(90));
        assert_eq!(parse_iso_duration("P1DT2H"), Some(1560));
        assert_eq!(parse_iso_duration("PT30S"), Some(1));
        assert_eq!(parse_iso_duration("pt2h"), Some(120));
        assert_eq!(parse_iso_duration("P"), None);
        assert_eq!(parse_iso_duration("45 minutes"), None);
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        assert_eq!(parse_iso_duration("P9999999999999999D"), None);
        assert_eq!(parse_iso_duration("PT9999999999999999999H"), None);
        assert_eq!(parse_iso_duration("PT9223372036854775807M"), Some(i64::MAX));
        assert_eq!(parse_iso_duration("PT1M1000000000000000000000000S"), None);
        assert_eq!(parse_iso_duration("P1DT9223372036854775807M"), None);

        let draft = draft_from_json_ld(&json!({
            "@type": "Recipe",
            "name": "Forever Stew",
            "prepTime": "P9999999999999999D",
            "cookTime": "PT99999999999H",
            "recipeIngredient": ["1 onion"]
        }));
        assert_eq!(draft.prep_minutes, None);
        assert_eq!(draft.cook_minutes, Some(99_999_999_999 * 60));

        let mut warnings = Vec::new();
        let draft = normalize_draft(draft, &mut warnings);
        assert_eq!(draft.cook_minutes, None);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_yield() {
        assert_eq!(parse_yield(&json!(4)), Some(4));
        assert_eq!(parse_yield(&json!("6 servings")), Some(6));
        assert_eq!(parse_yield(&json!(["Serves 8", "8"])), Some(8));
        assert_eq!(parse_yield(&json!("a crowd")), None);
    }

    #[test]
    fn test_ingredient_lines() {
        let i = parse_ingredient_line("1 1/2 cups flour, sifted");
        assert_eq!(i.quantity, Some(1.5));
        assert_eq!(i.unit, Some(Unit::Cup));
        assert_eq!(i.name, "flour");
        assert_eq!(i.note.as_deref(), Some("sifted"));

        let i = parse_ingredient_line("½ tsp salt");
        assert_eq!(i.quantity, Some(0.5));
        assert_eq!(i.unit, Some(Unit::Tsp));

        let i = parse_ingredient_line("2½ tablespoons of butter");
        assert_eq!(i.quantity, Some(2.5));
        assert_eq!(i.unit, Some(Unit::Tbsp));
        assert_eq!(i.name, "butter");

        let i = parse_ingredient_line("3 eggs");
        assert_eq!(i.quantity, Some(3.0));
        assert_eq!(i.unit, None);
        assert_eq!(i.name, "eggs");

        let i = parse_ingredient_line("2-3 cloves garlic");
        assert_eq!(i.quantity, Some(2.0));
        assert_eq!(i.unit, Some(Unit::Clove));

        let i = parse_ingredient_line("Black pepper to taste");
        assert_eq!(i.quantity, None);
        assert_eq!(i.unit, Some(Unit::ToTaste));
        assert_eq!(i.name, "Black pepper");

        let i = parse_ingredient_line("Fresh parsley");
        assert_eq!(i.quantity, None);
        assert_eq!(i.name, "Fresh parsley");
    }

    #[test]
    fn test_draft_from_json_ld() {
        let recipe = json!({
            "@type": "Recipe",
            "name": "Tomato &amp; Basil Soup",
            "description": "<p>Bright and quick.</p>",
            "recipeYield": ["4", "4 bowls"],
            "prepTime": "PT10M",
            "cookTime": "PT25M",
            "recipeIngredient": ["800 g tomatoes", "1 handful basil"],
            "recipeInstructions": [
                {"@type": "HowToSection", "name": "Soup", "itemListElement": [
                    {"@type": "HowToStep", "text": "Simmer tomatoes."},
                    {"@type": "HowToStep", "text": "Blend with basil."}
                ]},
                "Season."
            ],
            "keywords": "soup, quick",
            "recipeCuisine": ["Italian"]
        });

        let draft = draft_from_json_ld(&recipe);
        assert_eq!(draft.title, "Tomato & Basil Soup");
        assert_eq!(draft.description.as_deref(), Some("Bright and quick."));
        assert_eq!(draft.servings, Some(4));
        assert_eq!(draft.prep_minutes, Some(10));
        assert_eq!(draft.cook_minutes, Some(25));
        assert_eq!(draft.ingredients.len(), 2);
        assert_eq!(draft.ingredients[0].unit, Some(Unit::G));
        assert_eq!(draft.ingredients[1].name, "handful basil");
        assert_eq!(draft.instructions, vec!["Simmer tomatoes.", "Blend with basil.", "Season."]);
        assert_eq!(draft.tags, vec!["soup", "quick", "Italian"]);
    }

    #[test]
    fn test_normalize_draft_clamps_with_warnings() {
        let draft = RecipeDraft {
            title: "Stew".into(),
            servings: Some(500),
            cook_minutes: Some(-5),
            ingredients: vec![
                IngredientInput { name: "beef".into(), quantity: Some(-2.0), unit: None, note: Some(" ".into()) },
                IngredientInput { name: "  ".into(), quantity: None, unit: None, note: None },
            ],
            tags: vec!["Dinner".into(), "dinner".into()],
            ..Default::default()
        };

        let mut warnings = Vec::new();
        let draft = normalize_draft(draft, &mut warnings);
        assert_eq!(draft.servings, None);
        assert_eq!(draft.cook_minutes, None);
        assert_eq!(draft.ingredients.len(), 1);
        assert_eq!(draft.ingredients[0].quantity, None);
        assert_eq!(draft.ingredients[0].note, None);
        assert_eq!(draft.tags, vec!["dinner"]);
        assert_eq!(warnings.len(), 4);
    }
}
