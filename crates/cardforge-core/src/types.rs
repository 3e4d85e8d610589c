use serde::{Deserialize, Serialize};

/// Identifier of a note in the flashcard store.
pub type NoteId = i64;

/// A single text-generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Register of an example sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExampleKind {
    /// 요체 (polite, spoken).
    Casual,
    /// ㅂ니다체 (formal).
    Formal,
}

/// An example sentence with its translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    #[serde(rename = "type")]
    pub kind: ExampleKind,
    #[serde(rename = "kr", alias = "source_text")]
    pub source_text: String,
    #[serde(rename = "zh", alias = "translated_text")]
    pub translated_text: String,
}

/// Lookup of a note by one of its fields inside a deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteQuery {
    pub deck: String,
    pub field: String,
    pub value: String,
}

impl NoteQuery {
    pub fn new(deck: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            deck: deck.into(),
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A note as written to the flashcard store. Field order is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub deck: String,
    pub model: String,
    pub fields: Vec<(String, String)>,
    pub tags: Vec<String>,
}

impl NoteRecord {
    pub fn new(deck: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            deck: deck.into(),
            model: model.into(),
            fields: vec![],
            tags: vec![],
        }
    }

    /// Append a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Definition of a note type (fields, styling, one card template).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTypeSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub css: String,
    pub template_name: String,
    pub front: String,
    pub back: String,
}
