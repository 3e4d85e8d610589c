//! AnkiConnect-backed flashcard store.

pub mod client;
pub mod provision;
pub mod store;

pub use client::{AnkiConnect, NoteInfo, API_VERSION};
pub use provision::model_payload;
pub use store::{note_payload, search_query};
