//! HTML to prompt text
//!
//! Reduces a page to its visible text for the language model and pulls out
//! any schema.org `Recipe` object published as JSON-LD. This is a
//! tolerant regex pass, not an HTML parser: it only has to produce readable
//! text from real-world markup.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::ExtractionError;

static JSON_LD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']?application/ld\+json["']?[^>]*>(.*?)</script\s*>"#)
        .expect("valid regex")
});

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("valid regex"));

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

/// Elements removed together with their content
static STRIPPED_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "noscript", "svg", "iframe", "template", "title"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>", tag = tag)).expect("valid regex")
        })
        .collect()
});

static BLOCK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|td|th|table|section|article|header|footer|blockquote|pre)\b[^>]*>")
        .expect("valid regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,15});").expect("valid regex"));

static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}\r\f\v]+").expect("valid regex"));

/// Page reduced to model input
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedPage {
    pub title: Option<String>,
    /// Visible text, one block per line
    pub text: String,
    /// schema.org Recipe object from JSON-LD, if the page has one
    pub structured_recipe: Option<Value>,
    pub warnings: Vec<String>,
}

/// Decode named and numeric character references
pub fn decode_entities(input: &str) -> String {
    ENTITY_RE
        .replace_all(input, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).map(String::from)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32).map(String::from)
            } else {
                named_entity(entity).map(str::to_string)
            };
            decoded.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<&'static str> {
    let value = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "ndash" => "–",
        "mdash" => "—",
        "hellip" => "…",
        "lsquo" | "rsquo" => "'",
        "ldquo" | "rdquo" => "\"",
        "deg" => "°",
        "frac12" => "½",
        "frac14" => "¼",
        "frac34" => "¾",
        "times" => "×",
        "eacute" => "é",
        "egrave" => "è",
        "uuml" => "ü",
        "ouml" => "ö",
        "auml" => "ä",
        "ntilde" => "ñ",
        "ccedil" => "ç",
        _ => return None,
    };
    Some(value)
}

fn is_recipe_type(value: &Value) -> bool {
    let matches = |t: &str| t == "Recipe" || t.ends_with("/Recipe") || t.ends_with(":Recipe");
    match value.get("@type") {
        Some(Value::String(t)) => matches(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

/// Depth-first search for a Recipe object (top level, array, or `@graph`)
fn find_recipe(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            if is_recipe_type(value) {
                return Some(value);
            }
            map.get("@graph").and_then(find_recipe)
        }
        Value::Array(items) => items.iter().find_map(find_recipe),
        _ => None,
    }
}

/// First schema.org Recipe among the page's JSON-LD blocks
pub fn find_json_ld_recipe(html: &str) -> Option<Value> {
    JSON_LD_RE.captures_iter(html).find_map(|caps| {
        let raw = caps.get(1)?.as_str().trim();
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => find_recipe(&value).cloned(),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparseable JSON-LD block");
                None
            }
        }
    })
}

/// Collapse runs of whitespace and drop blank lines
fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| SPACES_RE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Visible text of an HTML fragment
pub fn html_to_text(html: &str) -> String {
    let mut text = COMMENT_RE.replace_all(html, " ").into_owned();
    for block in STRIPPED_BLOCKS.iter() {
        text = block.replace_all(&text, " ").into_owned();
    }
    let text = BLOCK_TAG_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, " ");
    collapse_whitespace(&decode_entities(&text))
}

/// Sanitize a page for the extraction prompt
///
/// - blank input: `EmptyHtml`
/// - no markup at all, or nothing visible after stripping: `InvalidHtml`
/// - text longer than `max_chars` is cut at a char boundary with a warning
pub fn sanitize_html(html: &str, max_chars: usize) -> Result<SanitizedPage, ExtractionError> {
    if html.trim().is_empty() {
        return Err(ExtractionError::EmptyHtml("The page is empty".to_string()));
    }
    if !html.contains('<') {
        return Err(ExtractionError::InvalidHtml(
            "The page does not contain HTML markup".to_string(),
        ));
    }

    let title = TITLE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| collapse_whitespace(&decode_entities(&TAG_RE.replace_all(m.as_str(), " "))))
        .filter(|t| !t.is_empty());
    let structured_recipe = find_json_ld_recipe(html);

    let mut text = html_to_text(html);
    if text.is_empty() {
        return Err(ExtractionError::InvalidHtml(
            "The page has no readable text".to_string(),
        ));
    }

    let mut warnings = Vec::new();
    if text.chars().count() > max_chars {
        text = text.chars().take(max_chars).collect();
        warnings.push(format!(
            "Page text was truncated to {} characters; some details may be missing",
            max_chars
        ));
    }

    Ok(SanitizedPage {
        title,
        text,
        structured_recipe,
        warnings,
    })
}
