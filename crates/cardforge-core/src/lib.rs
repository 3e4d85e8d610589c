pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{CardforgeError, Result};
pub use traits::{FlashcardStore, SpeechSynthesizer, TextGenerator};
pub use types::*;
