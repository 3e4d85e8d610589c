use tracing::info;

use cardforge_anki::AnkiConnect;
use cardforge_core::config::AppConfig;
use cardforge_core::error::Result;
use cardforge_flows::{listening_note_type, vocab_note_type};

/// Make sure Anki is reachable and both decks and note types exist.
pub async fn provision(anki: &AnkiConnect, config: &AppConfig) -> Result<()> {
    let version = anki.version().await?;
    info!(url = %anki.url(), version, "AnkiConnect reachable");

    for deck in [&config.anki.deck_name, &config.listening.deck_name] {
        anki.ensure_deck(deck).await?;
    }
    for spec in [
        vocab_note_type(&config.anki),
        listening_note_type(&config.listening),
    ] {
        anki.ensure_note_type(&spec).await?;
    }
    Ok(())
}
