use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::info;

use cardforge_core::config::ListeningConfig;
use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::traits::{FlashcardStore, TextGenerator};
use cardforge_core::types::{NoteQuery, NoteRecord};
use cardforge_graph::{State, StateUpdate, Step};

use crate::keys;
use crate::prompts::PromptTemplate;
use crate::shared::sound_tag;

pub const SOURCE_USER: &str = "user";
pub const SOURCE_LLM: &str = "llm";

/// Uses the caller's translation when one was given, otherwise asks the
/// generator for one.
pub struct TranslateSentence {
    generator: Arc<dyn TextGenerator>,
    prompt: PromptTemplate,
}

impl TranslateSentence {
    pub fn new(generator: Arc<dyn TextGenerator>, prompt: PromptTemplate) -> Self {
        Self { generator, prompt }
    }
}

impl Step for TranslateSentence {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            if let Some(given) = state
                .get_str(keys::CHINESE_TRANSLATION)
                .map(str::trim)
                .filter(|t| !t.is_empty())
            {
                return Ok(StateUpdate::new()
                    .set(keys::TRANSLATION, given)
                    .set(keys::TRANSLATION_SOURCE, SOURCE_USER));
            }

            let sentence = state.require_str(keys::KOREAN_SENTENCE)?;
            let request = self.prompt.request(&[("sentence", sentence)]);
            let reply = self.generator.generate(request).await?;
            let translation = reply.trim();
            if translation.is_empty() {
                return Err(CardforgeError::LlmParse("empty translation".into()));
            }
            info!(sentence = %sentence, "Sentence translated by generator");

            Ok(StateUpdate::new()
                .set(keys::TRANSLATION, translation)
                .set(keys::TRANSLATION_SOURCE, SOURCE_LLM))
        })
    }
}

/// Renders the card faces and the tag list.
pub struct BuildCard {
    tag_default: String,
}

impl BuildCard {
    pub fn new(config: &ListeningConfig) -> Self {
        Self {
            tag_default: config.tag_default.clone(),
        }
    }
}

pub fn back_html(korean: &str, chinese: &str) -> String {
    format!(
        "<div class=\"korean\">{}</div>\n<div class=\"chinese\">{}</div>",
        korean, chinese
    )
}

impl Step for BuildCard {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let korean = state.require_str(keys::KOREAN_SENTENCE)?;
            let chinese = state.require_str(keys::TRANSLATION)?;
            let filename = state.require_str(keys::AUDIO_FILENAME)?;

            let mut tags = vec![self.tag_default.clone(), "listening".to_string()];
            if state.get_str(keys::TRANSLATION_SOURCE) == Some(SOURCE_LLM) {
                tags.push("auto_translated".to_string());
            }

            Ok(StateUpdate::new()
                .set(keys::FRONT_HTML, sound_tag(filename))
                .set(keys::BACK_HTML, back_html(korean, chinese))
                .set(keys::TAGS, tags))
        })
    }
}

/// Field order of the listening note type.
pub const LISTENING_FIELDS: [&str; 3] = ["Audio", "Korean", "Chinese"];

/// Writes the listening note, updating in place when the sentence is
/// already in the deck.
pub struct SendListeningToAnki {
    store: Arc<dyn FlashcardStore>,
    deck: String,
    model: String,
}

impl SendListeningToAnki {
    pub fn new(store: Arc<dyn FlashcardStore>, config: &ListeningConfig) -> Self {
        Self {
            store,
            deck: config.deck_name.clone(),
            model: config.model_name.clone(),
        }
    }
}

impl Step for SendListeningToAnki {
    fn run(&self, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        Box::pin(async move {
            let korean = state.require_str(keys::KOREAN_SENTENCE)?;
            let note = NoteRecord::new(&self.deck, &self.model)
                .field("Audio", sound_tag(state.require_str(keys::AUDIO_FILENAME)?))
                .field("Korean", korean)
                .field("Chinese", state.require_str(keys::TRANSLATION)?)
                .with_tags(state.get_strings(keys::TAGS));

            let query = NoteQuery::new(&self.deck, "Korean", korean);
            let id = match self.store.find_by_key(&query).await? {
                Some(id) => {
                    self.store.update(id, &note).await?;
                    self.store.add_tags(id, &note.tags).await?;
                    id
                }
                None => self.store.add(&note).await?,
            };
            Ok(StateUpdate::new().set(keys::ANKI_NOTE_ID, id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_html() {
        assert_eq!(
            back_html("밥 먹었어요?", "吃飯了嗎？"),
            "<div class=\"korean\">밥 먹었어요?</div>\n<div class=\"chinese\">吃飯了嗎？</div>"
        );
    }

    #[tokio::test]
    async fn test_build_card_tags() {
        let step = BuildCard::new(&ListeningConfig::default());
        let state = State::new()
            .with(keys::KOREAN_SENTENCE, "안녕하세요")
            .with(keys::TRANSLATION, "你好")
            .with(keys::AUDIO_FILENAME, "listening_abc.mp3")
            .with(keys::TRANSLATION_SOURCE, SOURCE_LLM);

        let update = step.run(state.clone()).await.unwrap();
        let merged = state.merged(&update);
        assert_eq!(
            merged.get_strings(keys::TAGS),
            vec!["listening_auto", "listening", "auto_translated"]
        );
        assert_eq!(merged.get_str(keys::FRONT_HTML), Some("[sound:listening_abc.mp3]"));

        let user = state.with(keys::TRANSLATION_SOURCE, SOURCE_USER);
        let update = step.run(user.clone()).await.unwrap();
        assert_eq!(
            user.merged(&update).get_strings(keys::TAGS),
            vec!["listening_auto", "listening"]
        );
    }

    #[tokio::test]
    async fn test_user_translation_is_trimmed() {
        let generator = cardforge_test_utils::ScriptedGenerator::new();
        let step = TranslateSentence::new(
            Arc::new(generator.clone()),
            crate::prompts::Prompts::new("m", &Default::default()).translate_sentence,
        );
        let state = State::new()
            .with(keys::KOREAN_SENTENCE, "안녕하세요")
            .with(keys::CHINESE_TRANSLATION, "  你好  ");

        let merged = state.merged(&step.run(state.clone()).await.unwrap());
        assert_eq!(merged.get_str(keys::TRANSLATION), Some("你好"));
        assert_eq!(merged.get_str(keys::TRANSLATION_SOURCE), Some(SOURCE_USER));
        assert!(generator.calls().is_empty());
    }
}
