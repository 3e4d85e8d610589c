//! State keys shared by the flows and their callers.

// Control surface
pub const FORCE_UPDATE: &str = "force_update";
pub const EXISTS: &str = "exists";
pub const ANKI_NOTE_ID: &str = "anki_note_id";

// Vocabulary
pub const WORD: &str = "word";
pub const MEANING: &str = "meaning";
pub const POS: &str = "pos";
pub const POS_ZH: &str = "pos_zh";
pub const EXAMPLES: &str = "examples";
pub const ROOT: &str = "root";
pub const ROOT_TAG: &str = "root_tag";
pub const ROOT_ERROR: &str = "root_error";
pub const EXAMPLE_KOREAN_1: &str = "example_korean_1";
pub const EXAMPLE_CHINESE_1: &str = "example_chinese_1";
pub const EXAMPLE_KOREAN_2: &str = "example_korean_2";
pub const EXAMPLE_CHINESE_2: &str = "example_chinese_2";

// Listening
pub const KOREAN_SENTENCE: &str = "korean_sentence";
pub const CHINESE_TRANSLATION: &str = "chinese_translation";
pub const TRANSLATION: &str = "translation";
pub const TRANSLATION_SOURCE: &str = "translation_source";
pub const FRONT_HTML: &str = "front_html";
pub const BACK_HTML: &str = "back_html";

// Both
pub const TAGS: &str = "tags";
pub const AUDIO_BYTES: &str = "audio_bytes";
pub const AUDIO_FILENAME: &str = "audio_filename";
pub const AUDIO_STORED: &str = "audio_stored";
