use base64::Engine as _;
use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::traits::FlashcardStore;
use cardforge_core::types::{NoteId, NoteQuery, NoteRecord};

use crate::client::AnkiConnect;

/// Anki search query for one field value inside a deck.
///
/// Double quotes in the value are escaped so sentences containing quotes
/// still match exactly.
pub fn search_query(query: &NoteQuery) -> String {
    format!(
        "deck:\"{}\" {}:\"{}\"",
        escape(&query.deck),
        query.field,
        escape(&query.value)
    )
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn fields_object(note: &NoteRecord) -> Map<String, Value> {
    note.fields
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect()
}

/// `addNote` payload. Duplicates are rejected within the deck.
pub fn note_payload(note: &NoteRecord) -> Value {
    json!({
        "deckName": note.deck,
        "modelName": note.model,
        "fields": fields_object(note),
        "options": {"allowDuplicate": false, "duplicateScope": "deck"},
        "tags": note.tags,
    })
}

impl FlashcardStore for AnkiConnect {
    fn find_by_key(&self, query: &NoteQuery) -> BoxFuture<'_, Result<Option<NoteId>>> {
        let search = search_query(query);
        Box::pin(async move {
            let ids = self.find_notes(&search).await?;
            match ids.first() {
                Some(&id) => {
                    info!(note_id = id, "Found existing note");
                    Ok(Some(id))
                }
                None => {
                    debug!(query = %search, "No existing note");
                    Ok(None)
                }
            }
        })
    }

    fn add(&self, note: &NoteRecord) -> BoxFuture<'_, Result<NoteId>> {
        let payload = note_payload(note);
        Box::pin(async move {
            let id: NoteId = self.invoke("addNote", json!({ "note": payload })).await?;
            info!(note_id = id, "ADD -> {}", id);
            Ok(id)
        })
    }

    fn update(&self, id: NoteId, note: &NoteRecord) -> BoxFuture<'_, Result<()>> {
        let fields = fields_object(note);
        Box::pin(async move {
            self.invoke::<Value>(
                "updateNoteFields",
                json!({ "note": { "id": id, "fields": fields } }),
            )
            .await?;
            info!(note_id = id, "UPDATE -> {}", id);
            Ok(())
        })
    }

    fn add_tags(&self, id: NoteId, tags: &[String]) -> BoxFuture<'_, Result<()>> {
        // AnkiConnect takes tags as one space-separated string.
        let joined = tags.join(" ");
        Box::pin(async move {
            if joined.is_empty() {
                return Ok(());
            }
            self.invoke::<Value>("addTags", json!({ "notes": [id], "tags": joined }))
                .await?;
            Ok(())
        })
    }

    fn remove_tags(&self, id: NoteId, tags: &[String]) -> BoxFuture<'_, Result<()>> {
        let joined = tags.join(" ");
        Box::pin(async move {
            if joined.is_empty() {
                return Ok(());
            }
            debug!(note_id = id, tags = %joined, "Removing tags");
            self.invoke::<Value>("removeTags", json!({ "notes": [id], "tags": joined }))
                .await?;
            Ok(())
        })
    }

    fn note_tags(&self, id: NoteId) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let infos = self.notes_info(&[id]).await?;
            infos
                .into_iter()
                .next()
                .map(|info| info.tags)
                .ok_or_else(|| CardforgeError::Store(format!("note {} not found", id)))
        })
    }

    fn store_media(&self, data: &[u8], filename: &str) -> BoxFuture<'_, Result<()>> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        let filename = filename.to_string();
        Box::pin(async move {
            self.invoke::<Value>(
                "storeMediaFile",
                json!({ "filename": filename, "data": encoded }),
            )
            .await?;
            debug!(filename = %filename, "Stored media file");
            Ok(())
        })
    }
}
