use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use cardforge_core::config::AnkiConfig;
use cardforge_core::error::{CardforgeError, Result};
use cardforge_core::types::NoteId;

/// AnkiConnect protocol version spoken by this client.
pub const API_VERSION: u32 = 6;

const SERVICE: &str = "anki";

/// Client for the AnkiConnect add-on's JSON-RPC endpoint.
///
/// Every call is a POST of `{action, version, params}`; the reply carries
/// either `result` or `error`.
#[derive(Clone)]
pub struct AnkiConnect {
    http: Client,
    url: String,
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
    version: u32,
    params: Value,
}

#[derive(Deserialize, Debug)]
struct Envelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<Value>,
}

/// One entry of a `notesInfo` reply.
#[derive(Deserialize, Debug, Clone)]
pub struct NoteInfo {
    #[serde(rename = "noteId")]
    pub note_id: NoteId,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

impl NoteInfo {
    /// Value of a field, trimmed. Empty when the field is missing.
    pub fn field(&self, name: &str) -> &str {
        self.fields
            .get(name)
            .and_then(|f| f.get("value"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("")
    }
}

impl AnkiConnect {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CardforgeError::Store(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn from_config(config: &AnkiConfig) -> Result<Self> {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call one AnkiConnect action and decode its result.
    pub async fn invoke<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T> {
        debug!(action, "AnkiConnect request");
        let body = ActionRequest {
            action,
            version: API_VERSION,
            params,
        };

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(CardforgeError::Store(format!(
                "AnkiConnect {} returned HTTP {}",
                action,
                resp.status()
            )));
        }

        let envelope: Envelope = resp.json().await.map_err(|e| {
            CardforgeError::Store(format!("AnkiConnect {}: malformed reply: {}", action, e))
        })?;
        decode_envelope(action, envelope)
    }

    /// AnkiConnect version; doubles as a reachability check.
    pub async fn version(&self) -> Result<u32> {
        self.invoke("version", json!({})).await
    }

    pub async fn find_notes(&self, query: &str) -> Result<Vec<NoteId>> {
        self.invoke("findNotes", json!({ "query": query })).await
    }

    pub async fn notes_info(&self, ids: &[NoteId]) -> Result<Vec<NoteInfo>> {
        self.invoke("notesInfo", json!({ "notes": ids })).await
    }

    pub async fn deck_names(&self) -> Result<Vec<String>> {
        self.invoke("deckNames", json!({})).await
    }

    pub async fn model_names(&self) -> Result<Vec<String>> {
        self.invoke("modelNames", json!({})).await
    }
}

fn decode_envelope<T: DeserializeOwned>(action: &str, envelope: Envelope) -> Result<T> {
    match envelope.error {
        None | Some(Value::Null) => {}
        Some(Value::String(msg)) => {
            return Err(CardforgeError::Store(format!("AnkiConnect {}: {}", action, msg)))
        }
        Some(other) => {
            return Err(CardforgeError::Store(format!("AnkiConnect {}: {}", action, other)))
        }
    }
    serde_json::from_value(envelope.result).map_err(|e| {
        CardforgeError::Store(format!("AnkiConnect {}: unexpected result: {}", action, e))
    })
}

/// Refused connections and timeouts mean Anki is not running.
fn transport_error(e: reqwest::Error) -> CardforgeError {
    if e.is_connect() || e.is_timeout() {
        CardforgeError::ExternalUnavailable {
            service: SERVICE.to_string(),
            message: format!("cannot reach AnkiConnect ({}); is Anki running?", e),
        }
    } else {
        CardforgeError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(raw: Value) -> Envelope {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(ActionRequest {
            action: "findNotes",
            version: API_VERSION,
            params: json!({"query": "deck:\"Korean::Auto\""}),
        })
        .unwrap();
        assert_eq!(body["action"], "findNotes");
        assert_eq!(body["version"], 6);
        assert_eq!(body["params"]["query"], "deck:\"Korean::Auto\"");
    }

    #[test]
    fn test_decode_result() {
        let ids: Vec<NoteId> =
            decode_envelope("findNotes", envelope(json!({"result": [1517, 1518], "error": null})))
                .unwrap();
        assert_eq!(ids, vec![1517, 1518]);
    }

    #[test]
    fn test_decode_null_result_as_unit() {
        let decoded: Result<()> =
            decode_envelope("updateNoteFields", envelope(json!({"result": null, "error": null})));
        assert!(decoded.is_ok());
    }

    #[test]
    fn test_decode_error_field() {
        let err = decode_envelope::<Value>(
            "addNote",
            envelope(json!({"result": null, "error": "cannot create note because it is a duplicate"})),
        )
        .unwrap_err();
        assert!(matches!(err, CardforgeError::Store(_)));
        assert!(err.to_string().contains("duplicate"));
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_note_info_field() {
        let info: NoteInfo = serde_json::from_value(json!({
            "noteId": 1517,
            "tags": ["korean_auto", "pos_n"],
            "fields": {"Word": {"value": " 학생 ", "order": 0}},
        }))
        .unwrap();
        assert_eq!(info.field("Word"), "학생");
        assert_eq!(info.field("Meaning"), "");
        assert_eq!(info.tags.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_anki_is_unavailable() {
        // Nothing listens on port 9 locally.
        let client = AnkiConnect::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.version().await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {}", err);
    }
}
