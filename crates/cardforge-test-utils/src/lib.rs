//! Deterministic in-memory collaborators for driving flows without the
//! network: a scripted generator, a recording note store and fixed audio.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures::future::BoxFuture;

use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::traits::{FlashcardStore, SpeechSynthesizer, TextGenerator};
use cardforge_core::types::{GenerateRequest, NoteId, NoteQuery, NoteRecord};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// What the scripted generator answers.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Fail with a request error carrying this message.
    Fail(String),
    /// Fail as if the service could not be reached.
    Unavailable,
}

/// Answers by the first rule whose needle occurs in the system or user
/// prompt. Unmatched requests fail.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    rules: Arc<Mutex<Vec<(String, Reply)>>>,
    calls: Arc<Mutex<Vec<GenerateRequest>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: impl Into<String>, reply: Reply) -> Self {
        lock(&self.rules).push((needle.into(), reply));
        self
    }

    /// Every request seen so far, in arrival order.
    pub fn calls(&self) -> Vec<GenerateRequest> {
        lock(&self.calls).clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let reply = lock(&self.rules)
                .iter()
                .find(|(needle, _)| {
                    request.system_prompt.contains(needle.as_str())
                        || request.user_prompt.contains(needle.as_str())
                })
                .map(|(_, reply)| reply.clone());
            lock(&self.calls).push(request);

            match reply {
                Some(Reply::Text(text)) => Ok(text),
                Some(Reply::Fail(message)) => Err(CardforgeError::LlmRequest(message)),
                Some(Reply::Unavailable) => Err(CardforgeError::ExternalUnavailable {
                    service: "llm".into(),
                    message: "connection refused".into(),
                }),
                None => Err(CardforgeError::LlmRequest("no scripted reply".into())),
            }
        })
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    notes: BTreeMap<NoteId, NoteRecord>,
    media: BTreeMap<String, Vec<u8>>,
    ops: Vec<String>,
    last_id: NoteId,
    unavailable: bool,
    drop_next_tag_add: bool,
}

/// In-memory [`FlashcardStore`] that records every call it receives.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a note, returning its id.
    pub fn insert(&self, note: NoteRecord) -> NoteId {
        let mut inner = lock(&self.inner);
        inner.last_id += 1;
        let id = inner.last_id;
        inner.notes.insert(id, note);
        id
    }

    pub fn note(&self, id: NoteId) -> Option<NoteRecord> {
        lock(&self.inner).notes.get(&id).cloned()
    }

    pub fn note_count(&self) -> usize {
        lock(&self.inner).notes.len()
    }

    pub fn media(&self, filename: &str) -> Option<Vec<u8>> {
        lock(&self.inner).media.get(filename).cloned()
    }

    /// Operation log: `find`, `add`, `update`, `add_tags`, `remove_tags`,
    /// `note_tags`, `store_media`.
    pub fn ops(&self) -> Vec<String> {
        lock(&self.inner).ops.clone()
    }

    /// Operations that change the store.
    pub fn writes(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter(|op| op != "find" && op != "note_tags")
            .collect()
    }

    /// Make every call fail as if the store were not running.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.inner).unavailable = unavailable;
    }

    /// Silently ignore the next `add_tags` call.
    pub fn drop_next_tag_add(&self) {
        lock(&self.inner).drop_next_tag_add = true;
    }

    fn begin(&self, op: &str) -> Result<MutexGuard<'_, StoreInner>> {
        let mut inner = lock(&self.inner);
        if inner.unavailable {
            return Err(CardforgeError::ExternalUnavailable {
                service: "anki".into(),
                message: "connection refused".into(),
            });
        }
        inner.ops.push(op.to_string());
        Ok(inner)
    }
}

fn missing(id: NoteId) -> CardforgeError {
    CardforgeError::Store(format!("note {} not found", id))
}

impl FlashcardStore for MemoryStore {
    fn find_by_key(&self, query: &NoteQuery) -> BoxFuture<'_, Result<Option<NoteId>>> {
        let query = query.clone();
        Box::pin(async move {
            let inner = self.begin("find")?;
            Ok(inner
                .notes
                .iter()
                .find(|(_, n)| n.deck == query.deck && n.get(&query.field) == Some(query.value.as_str()))
                .map(|(id, _)| *id))
        })
    }

    fn add(&self, note: &NoteRecord) -> BoxFuture<'_, Result<NoteId>> {
        let note = note.clone();
        Box::pin(async move {
            let mut inner = self.begin("add")?;
            inner.last_id += 1;
            let id = inner.last_id;
            inner.notes.insert(id, note);
            Ok(id)
        })
    }

    fn update(&self, id: NoteId, note: &NoteRecord) -> BoxFuture<'_, Result<()>> {
        let fields = note.fields.clone();
        Box::pin(async move {
            let mut inner = self.begin("update")?;
            let existing = inner.notes.get_mut(&id).ok_or_else(|| missing(id))?;
            existing.fields = fields;
            Ok(())
        })
    }

    fn add_tags(&self, id: NoteId, tags: &[String]) -> BoxFuture<'_, Result<()>> {
        let tags = tags.to_vec();
        Box::pin(async move {
            let mut inner = self.begin("add_tags")?;
            if std::mem::take(&mut inner.drop_next_tag_add) {
                return Ok(());
            }
            let note = inner.notes.get_mut(&id).ok_or_else(|| missing(id))?;
            for tag in tags {
                if !note.tags.contains(&tag) {
                    note.tags.push(tag);
                }
            }
            Ok(())
        })
    }

    fn remove_tags(&self, id: NoteId, tags: &[String]) -> BoxFuture<'_, Result<()>> {
        let tags = tags.to_vec();
        Box::pin(async move {
            let mut inner = self.begin("remove_tags")?;
            let note = inner.notes.get_mut(&id).ok_or_else(|| missing(id))?;
            note.tags.retain(|t| !tags.contains(t));
            Ok(())
        })
    }

    fn note_tags(&self, id: NoteId) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let inner = self.begin("note_tags")?;
            inner
                .notes
                .get(&id)
                .map(|n| n.tags.clone())
                .ok_or_else(|| missing(id))
        })
    }

    fn store_media(&self, data: &[u8], filename: &str) -> BoxFuture<'_, Result<()>> {
        let data = data.to_vec();
        let filename = filename.to_string();
        Box::pin(async move {
            let mut inner = self.begin("store_media")?;
            inner.media.insert(filename, data);
            Ok(())
        })
    }
}

/// Returns the same audio for any text.
#[derive(Clone)]
pub struct ConstantSpeech {
    audio: Bytes,
}

impl ConstantSpeech {
    pub fn new(audio: impl Into<Bytes>) -> Self {
        Self {
            audio: audio.into(),
        }
    }
}

impl Default for ConstantSpeech {
    fn default() -> Self {
        Self::new(Bytes::from_static(b"ID3\x03fake-mp3"))
    }
}

impl SpeechSynthesizer for ConstantSpeech {
    fn synthesize(&self, _text: &str) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move { Ok(self.audio.clone()) })
    }
}
