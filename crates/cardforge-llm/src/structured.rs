use serde::de::DeserializeOwned;

use cardforge_core::error::{CardforgeError, Result};

/// Extract the JSON object from a completion that may wrap it in markdown
/// code fences or surrounding prose.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

/// Parse a completion into `T`. Anything that does not fit the schema is
/// an [`CardforgeError::LlmParse`].
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json(text);
    serde_json::from_str(json).map_err(|e| {
        CardforgeError::LlmParse(format!("{} (response: {})", e, preview(text)))
    })
}

fn preview(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(120) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Schema hint appended to prompts that expect a JSON object back.
pub fn format_instructions(schema: &serde_json::Value) -> String {
    format!(
        "Respond with ONLY a JSON object (no markdown, no commentary) matching this schema:\n{}",
        schema
    )
}
