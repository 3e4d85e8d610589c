use std::sync::Arc;

use cardforge_anki::AnkiConnect;
use cardforge_core::config::AppConfig;
use cardforge_core::error::Result;
use cardforge_core::traits::TextGenerator;
use cardforge_flows::{FlowDeps, ListeningFlow, VocabFlow};

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub anki: AnkiConnect,
    pub generator: Arc<dyn TextGenerator>,
    pub vocab: VocabFlow,
    pub listening: ListeningFlow,
}

impl AppState {
    /// Compile both flows over the given collaborators.
    pub fn new(anki: AnkiConnect, deps: FlowDeps) -> Result<Self> {
        Ok(Self {
            config: deps.config.clone(),
            generator: deps.generator.clone(),
            vocab: VocabFlow::new(&deps)?,
            listening: ListeningFlow::new(&deps)?,
            anki,
        })
    }
}
