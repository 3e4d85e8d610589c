use std::collections::BTreeSet;

use serde_json::{json, Value};
use tracing::info;

use cardforge_core::error::Result;
use cardforge_core::types::NoteTypeSpec;

use crate::client::AnkiConnect;

impl AnkiConnect {
    /// Create the deck if it does not exist yet. Returns whether it was created.
    pub async fn ensure_deck(&self, deck: &str) -> Result<bool> {
        let decks = self.deck_names().await?;
        if decks.iter().any(|d| d == deck) {
            return Ok(false);
        }
        self.invoke::<Value>("createDeck", json!({ "deck": deck }))
            .await?;
        info!(deck, "Created deck");
        Ok(true)
    }

    /// Create the note type if missing. An existing note type is left as is.
    pub async fn ensure_note_type(&self, spec: &NoteTypeSpec) -> Result<bool> {
        let models = self.model_names().await?;
        if models.iter().any(|m| *m == spec.name) {
            info!(model = %spec.name, "Note type already exists");
            return Ok(false);
        }
        self.invoke::<Value>("createModel", model_payload(spec))
            .await?;
        info!(model = %spec.name, fields = spec.fields.len(), "Created note type");
        Ok(true)
    }

    /// Every non-empty value of `field` across the deck.
    pub async fn field_values(&self, deck: &str, field: &str) -> Result<BTreeSet<String>> {
        let ids = self
            .find_notes(&format!("deck:\"{}\"", deck.replace('"', "\\\"")))
            .await?;
        if ids.is_empty() {
            info!(deck, "No notes found in deck");
            return Ok(BTreeSet::new());
        }

        let infos = self.notes_info(&ids).await?;
        let values: BTreeSet<String> = infos
            .iter()
            .map(|n| n.field(field))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        info!(deck, count = values.len(), "Retrieved field values");
        Ok(values)
    }
}

/// `createModel` params for a note type with a single card template.
pub fn model_payload(spec: &NoteTypeSpec) -> Value {
    json!({
        "modelName": spec.name,
        "inOrderFields": spec.fields,
        "css": spec.css,
        "cardTemplates": [{
            "Name": spec.template_name,
            "Front": spec.front,
            "Back": spec.back,
        }],
    })
}
