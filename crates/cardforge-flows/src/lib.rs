//! The vocabulary and listening card workflows.
//!
//! Each flow is a [`cardforge_graph`] graph whose steps call out to the
//! text generator, the flashcard store and the speech synthesizer held in
//! [`FlowDeps`].

mod deps;
pub mod keys;
pub mod listening;
pub mod note_types;
pub mod prompts;
pub mod shared;
pub mod vocab;

pub use deps::FlowDeps;
pub use listening::{listening_graph, ListeningCard, ListeningFlow, ListeningOutcome};
pub use note_types::{listening_note_type, vocab_note_type};
pub use prompts::{PromptTemplate, Prompts};
pub use vocab::{vocab_graph, VocabCard, VocabFlow, VocabOutcome};
