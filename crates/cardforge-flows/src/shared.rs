//! Steps both flows run: duplicate check, speech, media upload.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use cardforge_core::error::Result;
use cardforge_core::traits::{FlashcardStore, SpeechSynthesizer};
use cardforge_core::types::NoteQuery;
use cardforge_graph::{State, StateUpdate, Step};

use crate::keys;

/// Looks the input up in the store and decides whether to go on.
///
/// | note found | `force_update` | update                          |
/// |------------|----------------|---------------------------------|
/// | no         | any            | `exists: false`                 |
/// | yes        | false          | `exists: true`, `anki_note_id`  |
/// | yes        | true           | `exists: false`, `anki_note_id` |
pub struct CheckDuplicate {
    store: Arc<dyn FlashcardStore>,
    deck: String,
    field: String,
    input_key: &'static str,
}

impl CheckDuplicate {
    pub fn new(
        store: Arc<dyn FlashcardStore>,
        deck: impl Into<String>,
        field: impl Into<String>,
        input_key: &'static str,
    ) -> Self {
        Self {
            store,
            deck: deck.into(),
            field: field.into(),
            input_key,
        }
    }
}

impl Step for CheckDuplicate {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let value = state.require_str(self.input_key)?;
            let query = NoteQuery::new(&self.deck, &self.field, value);
            let force = state.get_bool(keys::FORCE_UPDATE).unwrap_or(false);

            let update = match self.store.find_by_key(&query).await? {
                None => {
                    info!(key = %value, "New entry");
                    StateUpdate::new().set(keys::EXISTS, false)
                }
                Some(id) if !force => StateUpdate::new()
                    .set(keys::EXISTS, true)
                    .set(keys::ANKI_NOTE_ID, id),
                Some(id) => {
                    info!(note_id = id, "Note exists, forcing update");
                    StateUpdate::new()
                        .set(keys::EXISTS, false)
                        .set(keys::ANKI_NOTE_ID, id)
                }
            };
            Ok(update)
        })
    }
}

/// `<prefix>_<first 12 hex digits of md5(text)>.mp3`
pub fn audio_filename(prefix: &str, text: &str) -> String {
    let digest = format!("{:x}", md5::compute(text.as_bytes()));
    format!("{}_{}.mp3", prefix, &digest[..12])
}

/// Synthesizes audio for the input text.
pub struct GenerateTts {
    speech: Arc<dyn SpeechSynthesizer>,
    input_key: &'static str,
    prefix: &'static str,
}

impl GenerateTts {
    pub fn new(speech: Arc<dyn SpeechSynthesizer>, input_key: &'static str, prefix: &'static str) -> Self {
        Self {
            speech,
            input_key,
            prefix,
        }
    }
}

impl Step for GenerateTts {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let text = state.require_str(self.input_key)?;
            let filename = audio_filename(self.prefix, text);
            let audio = self.speech.synthesize(text).await?;
            debug!(filename = %filename, bytes = audio.len(), "Audio generated");
            Ok(StateUpdate::new()
                .set(keys::AUDIO_BYTES, audio)
                .set(keys::AUDIO_FILENAME, filename))
        })
    }
}

/// Uploads the generated audio to the store's media collection.
pub struct StoreAudio {
    store: Arc<dyn FlashcardStore>,
}

impl StoreAudio {
    pub fn new(store: Arc<dyn FlashcardStore>) -> Self {
        Self { store }
    }
}

impl Step for StoreAudio {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let audio = state.require_bytes(keys::AUDIO_BYTES)?;
            let filename = state.require_str(keys::AUDIO_FILENAME)?;
            self.store.store_media(audio, filename).await?;
            Ok(StateUpdate::new().set(keys::AUDIO_STORED, true))
        })
    }
}

/// `[sound:<file>]` reference used in note fields.
pub fn sound_tag(filename: &str) -> String {
    format!("[sound:{}]", filename)
}
