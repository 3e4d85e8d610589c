use std::sync::Arc;

use cardforge_core::config::AppConfig;
use cardforge_core::traits::{FlashcardStore, SpeechSynthesizer, TextGenerator};

use crate::prompts::Prompts;

/// Collaborators and settings a flow is wired with.
#[derive(Clone)]
pub struct FlowDeps {
    pub generator: Arc<dyn TextGenerator>,
    pub store: Arc<dyn FlashcardStore>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub config: Arc<AppConfig>,
}

impl FlowDeps {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn FlashcardStore>,
        speech: Arc<dyn SpeechSynthesizer>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            generator,
            store,
            speech,
            config,
        }
    }

    pub fn prompts(&self) -> Prompts {
        Prompts::new(&self.config.llm.model_id, &self.config.prompts)
    }
}
