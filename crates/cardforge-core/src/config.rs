use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CardforgeError, Result};

/// Top-level cardforge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub anki: AnkiConfig,
    #[serde(default)]
    pub listening: ListeningConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Text-generation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Azure resource name (the `<resource>` in `<resource>.openai.azure.com`).
    #[serde(default)]
    pub azure_resource: Option<String>,
    /// Azure deployment name. Falls back to the requested model name when unset.
    #[serde(default)]
    pub azure_deployment: Option<String>,
    #[serde(default = "default_azure_api_version")]
    pub azure_api_version: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            azure_resource: None,
            azure_deployment: None,
            azure_api_version: default_azure_api_version(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_provider() -> String { "azure".to_string() }
fn default_model_id() -> String { "gpt-4o-mini".to_string() }
fn default_azure_api_version() -> String { "2025-01-01-preview".to_string() }
fn default_llm_timeout() -> u64 { 60 }

/// AnkiConnect settings and the vocabulary deck / note type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnkiConfig {
    #[serde(default = "default_anki_url")]
    pub url: String,
    #[serde(default = "default_vocab_deck")]
    pub deck_name: String,
    #[serde(default = "default_vocab_model")]
    pub model_name: String,
    #[serde(default = "default_tag_default")]
    pub tag_default: String,
    #[serde(default = "default_tag_native")]
    pub tag_native: String,
    #[serde(default = "default_anki_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_vocab_css")]
    pub card_css: String,
    #[serde(default = "default_vocab_front")]
    pub card_front: String,
    #[serde(default = "default_vocab_back")]
    pub card_back: String,
}

impl Default for AnkiConfig {
    fn default() -> Self {
        Self {
            url: default_anki_url(),
            deck_name: default_vocab_deck(),
            model_name: default_vocab_model(),
            tag_default: default_tag_default(),
            tag_native: default_tag_native(),
            timeout_secs: default_anki_timeout(),
            card_css: default_vocab_css(),
            card_front: default_vocab_front(),
            card_back: default_vocab_back(),
        }
    }
}

fn default_anki_url() -> String { "http://127.0.0.1:8765".to_string() }
fn default_vocab_deck() -> String { "Korean::Auto".to_string() }
fn default_vocab_model() -> String { "Korean Vocabulary".to_string() }
fn default_tag_default() -> String { "korean_auto".to_string() }
fn default_tag_native() -> String { "native_kor".to_string() }
fn default_anki_timeout() -> u64 { 10 }

fn default_vocab_css() -> String {
    r#".card { font-family: sans-serif; text-align: center; }
.word { font-size: 32px; margin: 12px 0; }
.meaning { font-size: 22px; }
.pos { font-size: 14px; color: #6B7280; }
.example { font-size: 16px; margin: 6px 0; }
.example .zh { color: #666; }"#
        .to_string()
}

fn default_vocab_front() -> String {
    r#"<div class="word">{{Word}}</div>
{{Audio}}"#
        .to_string()
}

fn default_vocab_back() -> String {
    r#"{{FrontSide}}
<hr id=answer>
<div class="meaning">{{Meaning}}</div>
<div class="pos">{{POS}}</div>
<div class="example">{{ExampleKorean1}}<div class="zh">{{ExampleChinese1}}</div></div>
<div class="example">{{ExampleKorean2}}<div class="zh">{{ExampleChinese2}}</div></div>"#
        .to_string()
}

/// Listening deck / note type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListeningConfig {
    #[serde(default = "default_listening_deck")]
    pub deck_name: String,
    #[serde(default = "default_listening_model")]
    pub model_name: String,
    #[serde(default = "default_listening_tag")]
    pub tag_default: String,
    #[serde(default = "default_listening_css")]
    pub card_css: String,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            deck_name: default_listening_deck(),
            model_name: default_listening_model(),
            tag_default: default_listening_tag(),
            card_css: default_listening_css(),
        }
    }
}

fn default_listening_deck() -> String { "Korean::Listening".to_string() }
fn default_listening_model() -> String { "Listening".to_string() }
fn default_listening_tag() -> String { "listening_auto".to_string() }

fn default_listening_css() -> String {
    r#".card { text-align: center; }
.korean { font-size: 24px; margin: 10px 0; }
.chinese { font-size: 18px; color: #666; }"#
        .to_string()
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_language")]
    pub language: String,
    #[serde(default = "default_speech_url")]
    pub base_url: String,
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            language: default_speech_language(),
            base_url: default_speech_url(),
            timeout_secs: default_speech_timeout(),
        }
    }
}

fn default_speech_language() -> String { "ko".to_string() }
fn default_speech_url() -> String { "https://translate.google.com/translate_tts".to_string() }
fn default_speech_timeout() -> u64 { 20 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String { "127.0.0.1:8000".to_string() }

/// Per-step prompt overrides. Unset steps use the built-in prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default)]
    pub parse_word: Option<PromptOverride>,
    #[serde(default)]
    pub extract_root: Option<PromptOverride>,
    #[serde(default)]
    pub translate_sentence: Option<PromptOverride>,
}

/// Partial prompt definition; any field left out keeps the built-in value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptOverride {
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| CardforgeError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| CardforgeError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
