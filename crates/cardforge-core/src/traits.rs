use bytes::Bytes;
use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Text generation: a prompt in, structured text out.
pub trait TextGenerator: Send + Sync + 'static {
    /// Run one completion and return the full response text.
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String>>;
}

/// Flashcard store holding notes, their tags and media files.
///
/// Each call is idempotent on its own, but nothing coordinates concurrent
/// callers: two runs racing on the same key can both decide to add.
pub trait FlashcardStore: Send + Sync + 'static {
    /// Find the first note matching the query.
    fn find_by_key(&self, query: &NoteQuery) -> BoxFuture<'_, Result<Option<NoteId>>>;

    /// Add a new note, returning its id.
    fn add(&self, note: &NoteRecord) -> BoxFuture<'_, Result<NoteId>>;

    /// Overwrite the fields of an existing note. Tags are left alone.
    fn update(&self, id: NoteId, note: &NoteRecord) -> BoxFuture<'_, Result<()>>;

    fn add_tags(&self, id: NoteId, tags: &[String]) -> BoxFuture<'_, Result<()>>;

    fn remove_tags(&self, id: NoteId, tags: &[String]) -> BoxFuture<'_, Result<()>>;

    /// Current tags of a note.
    fn note_tags(&self, id: NoteId) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Store a binary media asset under the given filename.
    fn store_media(&self, data: &[u8], filename: &str) -> BoxFuture<'_, Result<()>>;
}

/// Text-to-speech.
pub trait SpeechSynthesizer: Send + Sync + 'static {
    /// Synthesize `text`, returning encoded audio (mp3).
    fn synthesize(&self, text: &str) -> BoxFuture<'_, Result<Bytes>>;
}
