//! Listening card flow: a Korean sentence with its audio on the front and
//! the sentence plus a Chinese translation on the back.

pub mod steps;

use std::sync::Arc;

use serde::Serialize;

use cardforge_core::error::Result;
use cardforge_core::types::NoteId;
use cardforge_graph::{
    CompiledGraph, ExecutionResult, ExistsPredicate, GraphBuilder, GraphExecutor, Node, State,
    StepObserver, CONTINUE, END, SKIP,
};

use crate::deps::FlowDeps;
use crate::keys;
use crate::shared::{CheckDuplicate, GenerateTts, StoreAudio};
use steps::{BuildCard, SendListeningToAnki, TranslateSentence};

pub fn listening_graph(deps: &FlowDeps) -> Result<CompiledGraph> {
    let listening = &deps.config.listening;

    GraphBuilder::new("listening")
        .add_node(Node::step(
            "check_duplicate",
            CheckDuplicate::new(
                deps.store.clone(),
                &listening.deck_name,
                "Korean",
                keys::KOREAN_SENTENCE,
            ),
        ))
        .add_node(Node::step(
            "translate_sentence",
            TranslateSentence::new(deps.generator.clone(), deps.prompts().translate_sentence),
        ))
        .add_node(Node::step(
            "generate_tts",
            GenerateTts::new(deps.speech.clone(), keys::KOREAN_SENTENCE, "listening"),
        ))
        .add_node(Node::step("store_audio", StoreAudio::new(deps.store.clone())))
        .add_node(Node::step("build_card", BuildCard::new(listening)))
        .add_node(Node::step(
            "send_to_anki",
            SendListeningToAnki::new(deps.store.clone(), listening),
        ))
        .set_start("check_duplicate")
        .add_conditional_edges(
            "check_duplicate",
            ExistsPredicate,
            &[(SKIP, END), (CONTINUE, "translate_sentence")],
        )
        .add_edge("translate_sentence", "generate_tts")
        .add_edge("generate_tts", "store_audio")
        .add_edge("store_audio", "build_card")
        .add_edge("build_card", "send_to_anki")
        .add_edge("send_to_anki", END)
        .compile()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListeningCard {
    pub korean: String,
    pub chinese: String,
    pub translation_source: String,
    pub front_html: String,
    pub back_html: String,
    pub tags: Vec<String>,
    pub audio_filename: String,
    pub anki_note_id: NoteId,
}

impl ListeningCard {
    pub fn from_state(state: &State) -> Result<Self> {
        Ok(Self {
            korean: state.require_str(keys::KOREAN_SENTENCE)?.to_string(),
            chinese: state.require_str(keys::TRANSLATION)?.to_string(),
            translation_source: state.require_str(keys::TRANSLATION_SOURCE)?.to_string(),
            front_html: state.require_str(keys::FRONT_HTML)?.to_string(),
            back_html: state.require_str(keys::BACK_HTML)?.to_string(),
            tags: state.get_strings(keys::TAGS),
            audio_filename: state.require_str(keys::AUDIO_FILENAME)?.to_string(),
            anki_note_id: state.require_int(keys::ANKI_NOTE_ID)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListeningOutcome {
    Created(ListeningCard),
    Skipped { anki_note_id: NoteId },
}

pub struct ListeningFlow {
    executor: GraphExecutor,
}

impl ListeningFlow {
    pub fn new(deps: &FlowDeps) -> Result<Self> {
        Ok(Self {
            executor: GraphExecutor::new(listening_graph(deps)?),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.executor = self.executor.with_observer(observer);
        self
    }

    pub async fn execute(
        &self,
        sentence: &str,
        translation: Option<&str>,
        force: bool,
    ) -> Result<ExecutionResult> {
        let initial = State::new()
            .with(keys::KOREAN_SENTENCE, sentence.trim())
            .with(keys::CHINESE_TRANSLATION, translation)
            .with(keys::FORCE_UPDATE, force);
        self.executor.execute(initial).await
    }

    pub async fn run(
        &self,
        sentence: &str,
        translation: Option<&str>,
        force: bool,
    ) -> Result<ListeningOutcome> {
        let result = self.execute(sentence, translation, force).await?;
        if result.is_skipped() {
            return Ok(ListeningOutcome::Skipped {
                anki_note_id: result.state.require_int(keys::ANKI_NOTE_ID)?,
            });
        }
        Ok(ListeningOutcome::Created(ListeningCard::from_state(
            &result.state,
        )?))
    }
}
