use cardforge_core::config::{PromptOverride, PromptsConfig};
use cardforge_core::types::GenerateRequest;

pub const PARSE_WORD_SYSTEM: &str = "You are a Korean vocabulary analyst writing flashcards for \
Traditional Chinese speakers. Be accurate and concise.";

const PARSE_WORD_USER: &str = "Analyse the Korean word \"{word}\".\n\
- word: its dictionary form (verbs and adjectives end in 다)\n\
- meaning: its meaning in Traditional Chinese\n\
- pos: one of n, v, adj, adv, p\n\
- examples: exactly two present-tense example sentences, the first casual (요체), \
the second formal (ㅂ니다체), each with a Traditional Chinese translation\n\n\
{format_instructions}";

pub const EXTRACT_ROOT_SYSTEM: &str = "You identify the Sino-Korean (Hanja) origin of Korean words.";

const EXTRACT_ROOT_USER: &str = "Give the Hanja root of the Korean word \"{word}\".\n\
- If the word is Sino-Korean, answer with its 1 to 4 Hanja characters (e.g. 學生 for 학생).\n\
- If it is a native Korean word (고유어), answer with the single letter N.\n\n\
{format_instructions}";

pub const TRANSLATE_SYSTEM: &str = "You translate Korean sentences into natural Traditional Chinese.";

const TRANSLATE_USER: &str = "Translate this Korean sentence into Traditional Chinese. \
Reply with the translation only.\n\n{sentence}";

/// A prompt plus the generation parameters it runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl PromptTemplate {
    fn builtin(system: &str, user: &str, model: &str, temperature: f32, max_tokens: u32) -> Self {
        Self {
            system_prompt: system.to_string(),
            user_prompt: user.to_string(),
            model: model.to_string(),
            temperature,
            max_tokens,
        }
    }

    /// Apply a partial override from the config file.
    pub fn with_override(mut self, over: Option<&PromptOverride>) -> Self {
        let Some(over) = over else {
            return self;
        };
        if let Some(s) = &over.system_prompt {
            self.system_prompt = s.clone();
        }
        if let Some(u) = &over.user_prompt {
            self.user_prompt = u.clone();
        }
        if let Some(m) = &over.model {
            self.model = m.clone();
        }
        if let Some(t) = over.temperature {
            self.temperature = t;
        }
        if let Some(n) = over.max_tokens {
            self.max_tokens = n;
        }
        self
    }

    /// Fill `{name}` placeholders in the user prompt and build the request.
    pub fn request(&self, vars: &[(&str, &str)]) -> GenerateRequest {
        let mut user = self.user_prompt.clone();
        for (name, value) in vars {
            user = user.replace(&format!("{{{}}}", name), value);
        }
        GenerateRequest {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            user_prompt: user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// The prompts every generator-backed step uses.
#[derive(Debug, Clone)]
pub struct Prompts {
    pub parse_word: PromptTemplate,
    pub extract_root: PromptTemplate,
    pub translate_sentence: PromptTemplate,
}

impl Prompts {
    /// Built-in prompts on `model`, with any configured overrides applied.
    pub fn new(model: &str, overrides: &PromptsConfig) -> Self {
        Self {
            parse_word: PromptTemplate::builtin(PARSE_WORD_SYSTEM, PARSE_WORD_USER, model, 0.2, 800)
                .with_override(overrides.parse_word.as_ref()),
            extract_root: PromptTemplate::builtin(EXTRACT_ROOT_SYSTEM, EXTRACT_ROOT_USER, model, 0.0, 50)
                .with_override(overrides.extract_root.as_ref()),
            translate_sentence: PromptTemplate::builtin(TRANSLATE_SYSTEM, TRANSLATE_USER, model, 0.2, 300)
                .with_override(overrides.translate_sentence.as_ref()),
        }
    }
}
