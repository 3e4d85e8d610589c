//! Vocabulary card flow.
//!
//! ```text
//! check_duplicate ─skip──▶ END
//!        │continue
//!      fanout ──▶ parse_word ───┐
//!        └──────▶ extract_root ─┴▶ build_tags ▶ build_examples
//!                    ▶ generate_tts ▶ store_audio ▶ send_to_anki ▶ END
//! ```

pub mod steps;

use std::sync::Arc;

use serde::Serialize;

use cardforge_core::error::Result;
use cardforge_core::types::{Example, NoteId};
use cardforge_graph::{
    CompiledGraph, ExecutionResult, ExistsPredicate, GraphBuilder, GraphExecutor, Node, State,
    StepObserver, CONTINUE, END, SKIP,
};

use crate::deps::FlowDeps;
use crate::keys;
use crate::shared::{CheckDuplicate, GenerateTts, StoreAudio};
use steps::{BuildExamples, BuildTags, ExtractRoot, ParseWord, SendVocabToAnki};

/// Build and validate the vocabulary graph.
pub fn vocab_graph(deps: &FlowDeps) -> Result<CompiledGraph> {
    let anki = &deps.config.anki;
    let prompts = deps.prompts();

    GraphBuilder::new("vocab")
        .add_node(Node::step(
            "check_duplicate",
            CheckDuplicate::new(deps.store.clone(), &anki.deck_name, "Word", keys::WORD),
        ))
        .add_node(Node::split("fanout"))
        .add_node(Node::step(
            "parse_word",
            ParseWord::new(deps.generator.clone(), prompts.parse_word),
        ))
        .add_node(Node::step(
            "extract_root",
            ExtractRoot::new(deps.generator.clone(), prompts.extract_root, &anki.tag_native)?,
        ))
        .add_node(Node::step(
            "build_tags",
            BuildTags::new(&anki.tag_default, &anki.tag_native),
        ))
        .add_node(Node::step("build_examples", BuildExamples))
        .add_node(Node::step(
            "generate_tts",
            GenerateTts::new(deps.speech.clone(), keys::WORD, "vocab"),
        ))
        .add_node(Node::step("store_audio", StoreAudio::new(deps.store.clone())))
        .add_node(Node::step(
            "send_to_anki",
            SendVocabToAnki::new(deps.store.clone(), anki),
        ))
        .set_start("check_duplicate")
        .add_conditional_edges(
            "check_duplicate",
            ExistsPredicate,
            &[(SKIP, END), (CONTINUE, "fanout")],
        )
        .add_edge("fanout", "parse_word")
        .add_edge("fanout", "extract_root")
        .add_edge("parse_word", "build_tags")
        .add_edge("extract_root", "build_tags")
        .add_edge("build_tags", "build_examples")
        .add_edge("build_examples", "generate_tts")
        .add_edge("generate_tts", "store_audio")
        .add_edge("store_audio", "send_to_anki")
        .add_edge("send_to_anki", END)
        .compile()
}

/// A finished vocabulary card, projected from the final run state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VocabCard {
    pub word: String,
    pub meaning: String,
    pub pos: String,
    pub pos_zh: String,
    pub root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_error: Option<String>,
    pub examples: Vec<Example>,
    pub tags: Vec<String>,
    pub audio_filename: String,
    pub anki_note_id: NoteId,
}

impl VocabCard {
    pub fn from_state(state: &State) -> Result<Self> {
        Ok(Self {
            word: state.require_str(keys::WORD)?.to_string(),
            meaning: state.require_str(keys::MEANING)?.to_string(),
            pos: state.require_str(keys::POS)?.to_string(),
            pos_zh: state.get_str(keys::POS_ZH).unwrap_or_default().to_string(),
            root: state.get_str(keys::ROOT).map(str::to_string),
            root_error: state.get_str(keys::ROOT_ERROR).map(str::to_string),
            examples: state.get_records(keys::EXAMPLES)?.unwrap_or_default(),
            tags: state.get_strings(keys::TAGS),
            audio_filename: state.require_str(keys::AUDIO_FILENAME)?.to_string(),
            anki_note_id: state.require_int(keys::ANKI_NOTE_ID)?,
        })
    }
}

/// How a vocabulary run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum VocabOutcome {
    /// The card was written (added, or updated under `force`).
    Created(VocabCard),
    /// The word was already in the deck and `force` was off.
    Skipped { anki_note_id: NoteId },
}

/// The vocabulary graph bound to its collaborators, ready to run per word.
pub struct VocabFlow {
    executor: GraphExecutor,
}

impl VocabFlow {
    pub fn new(deps: &FlowDeps) -> Result<Self> {
        Ok(Self {
            executor: GraphExecutor::new(vocab_graph(deps)?),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.executor = self.executor.with_observer(observer);
        self
    }

    /// Run the graph and hand back the raw final state.
    pub async fn execute(&self, word: &str, force: bool) -> Result<ExecutionResult> {
        let initial = State::new()
            .with(keys::WORD, word.trim())
            .with(keys::FORCE_UPDATE, force);
        self.executor.execute(initial).await
    }

    pub async fn run(&self, word: &str, force: bool) -> Result<VocabOutcome> {
        let result = self.execute(word, force).await?;
        if result.is_skipped() {
            return Ok(VocabOutcome::Skipped {
                anki_note_id: result.state.require_int(keys::ANKI_NOTE_ID)?,
            });
        }
        Ok(VocabOutcome::Created(VocabCard::from_state(&result.state)?))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cardforge_core::config::AppConfig;
    use cardforge_test_utils::{ConstantSpeech, MemoryStore, ScriptedGenerator};

    use super::*;

    #[test]
    fn test_vocab_graph_compiles() {
        let deps = FlowDeps::new(
            Arc::new(ScriptedGenerator::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(ConstantSpeech::default()),
            Arc::new(AppConfig::default()),
        );
        let graph = vocab_graph(&deps).unwrap();
        assert_eq!(graph.start(), "check_duplicate");
        let mut parents = graph.parents_of("build_tags").unwrap();
        parents.sort();
        assert_eq!(parents, vec!["extract_root", "parse_word"]);
        assert_eq!(graph.node_names().count(), 9);
    }
}
