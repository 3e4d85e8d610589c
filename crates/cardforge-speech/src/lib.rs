//! Text-to-speech over the Google Translate TTS endpoint.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use reqwest::Client;
use tracing::debug;

use cardforge_core::config::SpeechConfig;
use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::traits::SpeechSynthesizer;

/// The endpoint rejects requests longer than this many characters.
const MAX_CHUNK_CHARS: usize = 100;

const SERVICE: &str = "speech";

/// Google Translate TTS client. Long text is split into chunks the
/// endpoint accepts and the returned MP3 segments are concatenated.
pub struct GoogleTts {
    http: Client,
    base_url: String,
    language: String,
}

impl GoogleTts {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| CardforgeError::Speech(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            language: config.language.clone(),
        })
    }

    fn chunk_url(&self, chunk: &str, idx: usize, total: usize) -> String {
        format!(
            "{}?ie=UTF-8&q={}&tl={}&total={}&idx={}&textlen={}&client=tw-ob",
            self.base_url,
            urlencoding::encode(chunk),
            urlencoding::encode(&self.language),
            total,
            idx,
            chunk.chars().count()
        )
    }

    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let resp = self.http.get(url).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                CardforgeError::ExternalUnavailable {
                    service: SERVICE.to_string(),
                    message: e.to_string(),
                }
            } else {
                CardforgeError::Speech(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CardforgeError::Speech(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        resp.bytes()
            .await
            .map_err(|e| CardforgeError::Speech(format!("failed to read audio: {}", e)))
    }
}

impl SpeechSynthesizer for GoogleTts {
    fn synthesize(&self, text: &str) -> BoxFuture<'_, Result<Bytes>> {
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        Box::pin(async move {
            if chunks.is_empty() {
                return Err(CardforgeError::Speech("nothing to speak".into()));
            }

            let total = chunks.len();
            let mut audio = BytesMut::new();
            for (idx, chunk) in chunks.iter().enumerate() {
                let segment = self.fetch(&self.chunk_url(chunk, idx, total)).await?;
                audio.extend_from_slice(&segment);
            }
            debug!(chunks = total, bytes = audio.len(), "Synthesized speech");
            Ok(audio.freeze())
        })
    }
}

/// Split text into chunks of at most `max_chars` characters, preferring to
/// break after sentence punctuation, then at whitespace.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        if rest.chars().count() <= max_chars {
            chunks.push(rest.to_string());
            break;
        }

        let window_end = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..window_end];

        let cut = window
            .rfind(['.', '!', '?', '。', '！', '？', ',', '，'])
            .map(|i| i + window[i..].chars().next().map_or(1, char::len_utf8))
            .or_else(|| window.rfind(char::is_whitespace))
            .filter(|&i| i > 0)
            .unwrap_or(window_end);

        let (head, tail) = rest.split_at(cut);
        let head = head.trim();
        if !head.is_empty() {
            chunks.push(head.to_string());
        }
        rest = tail.trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_text("  학생  ", 100), vec!["학생"]);
        assert!(split_text("   ", 100).is_empty());
    }

    #[test]
    fn test_split_prefers_punctuation() {
        let chunks = split_text("안녕하세요. 저는 학생입니다.", 12);
        assert_eq!(chunks, vec!["안녕하세요.", "저는 학생입니다."]);
    }

    #[test]
    fn test_split_falls_back_to_whitespace_then_hard_cut() {
        let chunks = split_text("가나다 라마바사", 5);
        assert_eq!(chunks, vec!["가나다", "라마바사"]);

        let chunks = split_text("가나다라마바사", 3);
        assert_eq!(chunks, vec!["가나다", "라마바", "사"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 3));
    }

    #[test]
    fn test_chunk_url() {
        let tts = GoogleTts::new(&SpeechConfig::default()).unwrap();
        let url = tts.chunk_url("학생", 0, 1);
        assert!(url.starts_with("https://translate.google.com/translate_tts?ie=UTF-8&q="));
        assert!(url.contains(&format!("q={}", urlencoding::encode("학생"))));
        assert!(url.contains("&tl=ko&"));
        assert!(url.contains("&textlen=2&"));
        assert!(url.ends_with("client=tw-ob"));
    }
}
