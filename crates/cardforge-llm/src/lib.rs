pub mod providers;
pub mod streaming;
pub mod structured;

use cardforge_core::config::LlmConfig;
use cardforge_core::error::Result;
use cardforge_core::traits::TextGenerator;

pub use providers::azure::AzureGenerator;
pub use providers::openai::OpenAiGenerator;
pub use structured::{extract_json, format_instructions, parse_json};

/// Create a text generator based on the provider name.
pub fn create_generator(config: &LlmConfig) -> Result<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        "azure" | "azure-openai" => Ok(Box::new(AzureGenerator::new(config)?)),
        // Everything else uses the OpenAI-compatible client
        _ => Ok(Box::new(OpenAiGenerator::new(config)?)),
    }
}
