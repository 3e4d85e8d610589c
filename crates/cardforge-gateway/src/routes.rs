use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::types::{GenerateRequest, NoteId};
use cardforge_flows::{ListeningCard, ListeningOutcome, VocabCard, VocabOutcome};

use crate::error::ApiError;
use crate::state::AppState;

/// Outcome of one input, for single and batch endpoints alike.
#[derive(Debug, Serialize)]
pub struct ItemResult<C> {
    pub input: String,
    /// `success`, `skipped` or `failed`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anki_note_id: Option<NoteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<C>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<C> ItemResult<C> {
    fn success(input: &str, anki_note_id: NoteId, card: C) -> Self {
        Self {
            input: input.to_string(),
            status: "success",
            anki_note_id: Some(anki_note_id),
            card: Some(card),
            error: None,
        }
    }

    fn skipped(input: &str, anki_note_id: NoteId) -> Self {
        Self {
            input: input.to_string(),
            status: "skipped",
            anki_note_id: Some(anki_note_id),
            card: None,
            error: None,
        }
    }

    fn failed(input: &str, error: String) -> Self {
        Self {
            input: input.to_string(),
            status: "failed",
            anki_note_id: None,
            card: None,
            error: Some(error),
        }
    }
}

impl From<(&str, VocabOutcome)> for ItemResult<VocabCard> {
    fn from((input, outcome): (&str, VocabOutcome)) -> Self {
        match outcome {
            VocabOutcome::Created(card) => Self::success(input, card.anki_note_id, card),
            VocabOutcome::Skipped { anki_note_id } => Self::skipped(input, anki_note_id),
        }
    }
}

impl From<(&str, ListeningOutcome)> for ItemResult<ListeningCard> {
    fn from((input, outcome): (&str, ListeningOutcome)) -> Self {
        match outcome {
            ListeningOutcome::Created(card) => Self::success(input, card.anki_note_id, card),
            ListeningOutcome::Skipped { anki_note_id } => Self::skipped(input, anki_note_id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse<C> {
    pub results: Vec<ItemResult<C>>,
    pub success_count: usize,
    pub fail_count: usize,
}

impl<C> BatchResponse<C> {
    fn new(results: Vec<ItemResult<C>>) -> Self {
        let count = |status: &str| results.iter().filter(|r| r.status == status).count();
        Self {
            success_count: count("success"),
            fail_count: count("failed"),
            results,
        }
    }
}

fn require_input(value: &str, what: &str) -> std::result::Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", what)));
    }
    Ok(())
}

fn empty_item<C>(input: &str, what: &str) -> Option<ItemResult<C>> {
    input
        .trim()
        .is_empty()
        .then(|| ItemResult::failed(input, format!("{} must not be empty", what)))
}

/// Turn a per-item run result into a batch entry, logging failures.
fn batch_item<C, O>(input: &str, result: Result<O>) -> ItemResult<C>
where
    for<'a> ItemResult<C>: From<(&'a str, O)>,
{
    match result {
        Ok(outcome) => ItemResult::from((input, outcome)),
        Err(e) => {
            warn!(input, error = %e, "Batch item failed");
            ItemResult::failed(input, e.to_string())
        }
    }
}

// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Vocabulary ──────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

/// A single word rewrites an existing card unless told otherwise.
#[derive(Deserialize)]
pub struct VocabRequest {
    pub word: String,
    #[serde(default = "default_true")]
    pub force_update: bool,
}

#[derive(Deserialize)]
pub struct VocabBatchRequest {
    pub words: Vec<String>,
    #[serde(default)]
    pub force_update: bool,
}

// POST /vocab
pub async fn create_vocab(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VocabRequest>,
) -> std::result::Result<Json<ItemResult<VocabCard>>, ApiError> {
    require_input(&body.word, "word")?;
    let outcome = state.vocab.run(&body.word, body.force_update).await?;
    Ok(Json(ItemResult::from((body.word.as_str(), outcome))))
}

// POST /vocab/batch: items run one after another; a failure is recorded
// and the batch carries on.
pub async fn create_vocab_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VocabBatchRequest>,
) -> Json<BatchResponse<VocabCard>> {
    let mut results = Vec::with_capacity(body.words.len());
    for word in &body.words {
        if let Some(empty) = empty_item(word, "word") {
            results.push(empty);
            continue;
        }
        let result = state.vocab.run(word, body.force_update).await;
        results.push(batch_item(word, result));
    }
    let response = BatchResponse::new(results);
    info!(
        total = body.words.len(),
        success = response.success_count,
        failed = response.fail_count,
        "Vocab batch finished"
    );
    Json(response)
}

// GET /vocab/words
pub async fn list_vocab_words(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let deck = &state.config.anki.deck_name;
    let words = state.anki.field_values(deck, "Word").await?;
    Ok(Json(serde_json::json!({
        "deck": deck,
        "count": words.len(),
        "words": words,
    })))
}

// ── Listening ───────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListeningItem {
    #[serde(alias = "korean_sentence")]
    pub sentence: String,
    #[serde(default, alias = "chinese_translation")]
    pub translation: Option<String>,
}

#[derive(Deserialize)]
pub struct ListeningRequest {
    #[serde(flatten)]
    pub item: ListeningItem,
    #[serde(default)]
    pub force_update: bool,
}

#[derive(Deserialize)]
pub struct ListeningBatchRequest {
    pub items: Vec<ListeningItem>,
    #[serde(default)]
    pub force_update: bool,
}

// POST /listening
pub async fn create_listening(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ListeningRequest>,
) -> std::result::Result<Json<ItemResult<ListeningCard>>, ApiError> {
    let item = &body.item;
    require_input(&item.sentence, "sentence")?;
    let outcome = state
        .listening
        .run(&item.sentence, item.translation.as_deref(), body.force_update)
        .await?;
    Ok(Json(ItemResult::from((item.sentence.as_str(), outcome))))
}

// POST /listening/batch
pub async fn create_listening_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ListeningBatchRequest>,
) -> Json<BatchResponse<ListeningCard>> {
    let mut results = Vec::with_capacity(body.items.len());
    for item in &body.items {
        if let Some(empty) = empty_item(&item.sentence, "sentence") {
            results.push(empty);
            continue;
        }
        let result = state
            .listening
            .run(&item.sentence, item.translation.as_deref(), body.force_update)
            .await;
        results.push(batch_item(&item.sentence, result));
    }
    let response = BatchResponse::new(results);
    info!(
        total = body.items.len(),
        success = response.success_count,
        failed = response.fail_count,
        "Listening batch finished"
    );
    Json(response)
}

// ── Status ──────────────────────────────────────────────────────

fn unavailable(e: &CardforgeError) -> (StatusCode, Json<serde_json::Value>) {
    let status = if e.is_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(serde_json::json!({ "status": "unavailable", "error": e.to_string() })),
    )
}

// GET /status/anki
pub async fn anki_status(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    match state.anki.version().await {
        Ok(version) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "url": state.anki.url(),
                "version": version,
            })),
        ),
        Err(e) => unavailable(&e),
    }
}

// GET /status/api: one tiny completion against the configured model.
pub async fn api_status(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let llm = &state.config.llm;
    let probe = GenerateRequest {
        model: llm.model_id.clone(),
        system_prompt: "Reply with OK.".to_string(),
        user_prompt: "ping".to_string(),
        temperature: 0.0,
        max_tokens: 5,
    };
    match state.generator.generate(probe).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "provider": llm.provider,
                "model": llm.model_id,
            })),
        ),
        Err(e) => unavailable(&e),
    }
}
