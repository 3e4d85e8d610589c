use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use cardforge_core::config::AnkiConfig;
use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::traits::{FlashcardStore, TextGenerator};
use cardforge_core::types::{Example, NoteId, NoteQuery, NoteRecord};
use cardforge_graph::{State, StateUpdate, Step, Value};
use cardforge_llm::{format_instructions, parse_json};

use crate::keys;
use crate::prompts::PromptTemplate;
use crate::shared::sound_tag;

/// Part of speech as the generator is allowed to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartOfSpeech {
    N,
    V,
    Adj,
    Adv,
    P,
}

impl PartOfSpeech {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartOfSpeech::N => "n",
            PartOfSpeech::V => "v",
            PartOfSpeech::Adj => "adj",
            PartOfSpeech::Adv => "adv",
            PartOfSpeech::P => "p",
        }
    }
}

/// Structured reply of the word-analysis prompt.
#[derive(Debug, Clone, Deserialize)]
pub struct WordAnalysis {
    pub word: String,
    pub meaning: String,
    pub pos: PartOfSpeech,
    pub examples: Vec<Example>,
}

fn word_schema() -> serde_json::Value {
    serde_json::json!({
        "word": "string, dictionary form",
        "meaning": "string, Traditional Chinese",
        "pos": "n | v | adj | adv | p",
        "examples": [
            {"type": "casual", "kr": "string", "zh": "string"},
            {"type": "formal", "kr": "string", "zh": "string"}
        ]
    })
}

/// Asks the generator for meaning, part of speech and two examples.
/// Any failure, transport or schema, fails the run.
pub struct ParseWord {
    generator: Arc<dyn TextGenerator>,
    prompt: PromptTemplate,
}

impl ParseWord {
    pub fn new(generator: Arc<dyn TextGenerator>, prompt: PromptTemplate) -> Self {
        Self { generator, prompt }
    }
}

impl Step for ParseWord {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let word = state.require_str(keys::WORD)?;
            let instructions = format_instructions(&word_schema());
            let request = self
                .prompt
                .request(&[("word", word), ("format_instructions", instructions.as_str())]);

            let reply = self.generator.generate(request).await?;
            let analysis: WordAnalysis = parse_json(&reply)?;
            if analysis.word.trim() != word.trim() {
                info!(input = %word, lemma = %analysis.word, "Generator normalised the word");
            }

            Ok(StateUpdate::new()
                .set(keys::MEANING, analysis.meaning)
                .set(keys::POS, analysis.pos.as_str())
                .set(keys::EXAMPLES, Value::list(&analysis.examples)?))
        })
    }
}

#[derive(Debug, Deserialize)]
struct RootReply {
    root: String,
}

/// `N` for native words, otherwise 1-4 CJK unified ideographs.
const ROOT_PATTERN: &str = r"^(?:N|[\u{4e00}-\u{9fff}]{1,4})$";

/// Asks the generator for the word's Hanja root.
///
/// A failed generator call does not fail the run: the step degrades to a
/// null root plus `root_error`, and tagging carries on without a root tag.
/// A reply that does not fit the root format still fails the run.
pub struct ExtractRoot {
    generator: Arc<dyn TextGenerator>,
    prompt: PromptTemplate,
    tag_native: String,
    pattern: Regex,
}

impl ExtractRoot {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        prompt: PromptTemplate,
        tag_native: impl Into<String>,
    ) -> Result<Self> {
        let pattern = Regex::new(ROOT_PATTERN)
            .map_err(|e| CardforgeError::Config(format!("invalid root pattern: {}", e)))?;
        Ok(Self {
            generator,
            prompt,
            tag_native: tag_native.into(),
            pattern,
        })
    }

    fn validate(&self, raw: &str) -> Result<String> {
        let root = raw.trim();
        if self.pattern.is_match(root) {
            Ok(root.to_string())
        } else {
            Err(CardforgeError::LlmParse(format!(
                "invalid root '{}': must be 1-4 Han characters or 'N'",
                root
            )))
        }
    }
}

impl Step for ExtractRoot {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let word = state.require_str(keys::WORD)?;
            let instructions = format_instructions(&serde_json::json!({
                "root": "string, 1-4 Hanja characters or N"
            }));
            let request = self
                .prompt
                .request(&[("word", word), ("format_instructions", instructions.as_str())]);

            let reply = match self.generator.generate(request).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(word = %word, error = %e, "Root extraction failed, continuing without root");
                    return Ok(StateUpdate::degraded(
                        &[keys::ROOT, keys::ROOT_TAG],
                        keys::ROOT_ERROR,
                        e.to_string(),
                    ));
                }
            };

            let parsed: RootReply = parse_json(&reply)?;
            let root = self.validate(&parsed.root)?;
            let root_tag = if root == "N" {
                self.tag_native.clone()
            } else {
                format!("root_{}", root)
            };

            Ok(StateUpdate::new()
                .set(keys::ROOT, root)
                .set(keys::ROOT_TAG, root_tag))
        })
    }
}

/// Default tag, then the root tag (native or `root_<hanja>`), then `pos_<pos>`.
pub struct BuildTags {
    tag_default: String,
    tag_native: String,
}

impl BuildTags {
    pub fn new(tag_default: impl Into<String>, tag_native: impl Into<String>) -> Self {
        Self {
            tag_default: tag_default.into(),
            tag_native: tag_native.into(),
        }
    }

    pub fn tags(&self, root: Option<&str>, pos: Option<&str>) -> Vec<String> {
        let mut tags = vec![self.tag_default.clone()];
        match root {
            Some("N") => tags.push(self.tag_native.clone()),
            Some(r) if !r.is_empty() => tags.push(format!("root_{}", r)),
            _ => {}
        }
        if let Some(p) = pos.filter(|p| !p.is_empty()) {
            tags.push(format!("pos_{}", p));
        }
        tags
    }
}

impl Step for BuildTags {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        let tags = self.tags(state.get_str(keys::ROOT), state.get_str(keys::POS));
        Box::pin(async move { Ok(StateUpdate::new().set(keys::TAGS, tags)) })
    }
}

/// Chinese label for a part-of-speech code. Unknown codes pass through.
pub fn pos_label(pos: &str) -> String {
    let label = match pos.to_lowercase().as_str() {
        "n" => "名詞",
        "v" => "動詞",
        "adj" => "形容詞",
        "adv" => "副詞",
        "pron" => "代名詞",
        "prep" => "介詞",
        "conj" => "連接詞",
        "interj" => "感嘆詞",
        "num" => "數詞",
        "aux" => "助動詞",
        "det" => "限定詞",
        "part" => "助詞",
        "suffix" => "詞尾",
        "prefix" => "詞頭",
        "phrase" => "片語",
        "expr" => "慣用語",
        _ => return pos.to_string(),
    };
    label.to_string()
}

/// Flattens the first two examples into card fields and labels the POS.
pub struct BuildExamples;

impl Step for BuildExamples {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let examples: Vec<Example> = state.get_records(keys::EXAMPLES)?.unwrap_or_default();
            let pos_zh = state.get_str(keys::POS).map(pos_label).unwrap_or_default();

            let text = |i: usize| -> (String, String) {
                examples
                    .get(i)
                    .map(|e| (e.source_text.clone(), e.translated_text.clone()))
                    .unwrap_or_default()
            };
            let (kr1, zh1) = text(0);
            let (kr2, zh2) = text(1);

            Ok(StateUpdate::new()
                .set(keys::EXAMPLE_KOREAN_1, kr1)
                .set(keys::EXAMPLE_CHINESE_1, zh1)
                .set(keys::EXAMPLE_KOREAN_2, kr2)
                .set(keys::EXAMPLE_CHINESE_2, zh2)
                .set(keys::POS_ZH, pos_zh))
        })
    }
}

/// Field order of the vocabulary note type.
pub const VOCAB_FIELDS: [&str; 8] = [
    "Word",
    "Audio",
    "Meaning",
    "POS",
    "ExampleKorean1",
    "ExampleChinese1",
    "ExampleKorean2",
    "ExampleChinese2",
];

/// Writes the vocabulary note: updates an existing one in place (re-tagging
/// only the tags this flow manages) or adds a new one.
pub struct SendVocabToAnki {
    store: Arc<dyn FlashcardStore>,
    deck: String,
    model: String,
    tag_default: String,
    tag_native: String,
}

impl SendVocabToAnki {
    pub fn new(store: Arc<dyn FlashcardStore>, config: &AnkiConfig) -> Self {
        Self {
            store,
            deck: config.deck_name.clone(),
            model: config.model_name.clone(),
            tag_default: config.tag_default.clone(),
            tag_native: config.tag_native.clone(),
        }
    }

    fn record(&self, state: &State) -> Result<NoteRecord> {
        let text = |key: &str| state.get_str(key).unwrap_or_default().to_string();
        let values = [
            state.require_str(keys::WORD)?.to_string(),
            sound_tag(state.require_str(keys::AUDIO_FILENAME)?),
            state.require_str(keys::MEANING)?.to_string(),
            text(keys::POS_ZH),
            text(keys::EXAMPLE_KOREAN_1),
            text(keys::EXAMPLE_CHINESE_1),
            text(keys::EXAMPLE_KOREAN_2),
            text(keys::EXAMPLE_CHINESE_2),
        ];

        let record = VOCAB_FIELDS
            .iter()
            .zip(values)
            .fold(NoteRecord::new(&self.deck, &self.model), |note, (name, value)| {
                note.field(*name, value)
            });
        Ok(record.with_tags(state.get_strings(keys::TAGS)))
    }

    /// Tags this flow owns on a note; anything else was added by the user.
    fn managed_tags(&self, current: &[String]) -> Vec<String> {
        let mut managed: BTreeSet<String> =
            [self.tag_default.clone(), self.tag_native.clone()].into();
        managed.extend(
            current
                .iter()
                .filter(|t| t.starts_with("root_") || t.starts_with("pos_"))
                .cloned(),
        );
        managed.into_iter().collect()
    }

    async fn update(&self, id: NoteId, note: &NoteRecord) -> Result<()> {
        self.store.update(id, note).await?;

        let current = self.store.note_tags(id).await?;
        let stale = self.managed_tags(&current);
        self.store.remove_tags(id, &stale).await?;

        self.store.add_tags(id, &note.tags).await?;
        let confirmed = self.store.note_tags(id).await?;
        let missing: Vec<String> = note
            .tags
            .iter()
            .filter(|t| !confirmed.contains(t))
            .cloned()
            .collect();
        if missing.is_empty() {
            info!(note_id = id, "Tags confirmed");
        } else {
            warn!(note_id = id, missing = ?missing, "Retrying add tags");
            self.store.add_tags(id, &missing).await?;
        }
        Ok(())
    }
}

impl Step for SendVocabToAnki {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let note = self.record(&state)?;
            let word = state.require_str(keys::WORD)?;
            let query = NoteQuery::new(&self.deck, "Word", word);

            let id = match self.store.find_by_key(&query).await? {
                Some(id) => {
                    self.update(id, &note).await?;
                    id
                }
                None => self.store.add(&note).await?,
            };
            Ok(StateUpdate::new().set(keys::ANKI_NOTE_ID, id))
        })
    }
}
