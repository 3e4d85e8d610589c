use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::provision::provision;
use crate::routes;
use crate::state::AppState;

/// HTTP gateway over the card flows, built on axum.
pub struct GatewayServer {
    state: Arc<AppState>,
}

impl GatewayServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Provision Anki, then serve until the cancellation token is triggered.
    ///
    /// An unreachable Anki does not stop the server; requests report it
    /// with 503 until it comes up.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        if let Err(e) = provision(&self.state.anki, &self.state.config).await {
            error!(error = %e, "Anki provisioning failed, serving anyway");
        }

        let bind = &self.state.config.gateway.bind;
        let listener = TcpListener::bind(bind).await?;
        info!(bind = %bind, "Gateway listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/vocab", post(routes::create_vocab))
        .route("/vocab/batch", post(routes::create_vocab_batch))
        .route("/vocab/words", get(routes::list_vocab_words))
        .route("/listening", post(routes::create_listening))
        .route("/listening/batch", post(routes::create_listening_batch))
        .route("/status/anki", get(routes::anki_status))
        .route("/status/api", get(routes::api_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use cardforge_anki::AnkiConnect;
    use cardforge_core::config::AppConfig;
    use cardforge_core::types::NoteRecord;
    use cardforge_flows::prompts::{EXTRACT_ROOT_SYSTEM, PARSE_WORD_SYSTEM};
    use cardforge_flows::FlowDeps;
    use cardforge_test_utils::{ConstantSpeech, MemoryStore, Reply, ScriptedGenerator};

    use super::*;

    const PARSED: &str = r#"{"word": "학생", "meaning": "學生", "pos": "n", "examples": [
        {"type": "casual", "kr": "저는 학생이에요.", "zh": "我是學生。"},
        {"type": "formal", "kr": "그는 학생입니다.", "zh": "他是學生。"}]}"#;

    fn app(store: MemoryStore) -> Router {
        let generator = ScriptedGenerator::new()
            .on(PARSE_WORD_SYSTEM, Reply::Text(PARSED.into()))
            .on(EXTRACT_ROOT_SYSTEM, Reply::Text(r#"{"root": "學生"}"#.into()))
            .on("Reply with OK.", Reply::Text("OK".into()));
        // Nothing listens on the discard port.
        let anki = AnkiConnect::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let deps = FlowDeps::new(
            Arc::new(generator),
            Arc::new(store),
            Arc::new(ConstantSpeech::default()),
            Arc::new(AppConfig::default()),
        );
        let state = AppState::new(anki, deps).unwrap();
        router(Arc::new(state))
    }

    async fn call(app: Router, method: &str, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_create_vocab() {
        let (status, body) = call(
            app(MemoryStore::new()),
            "POST",
            "/vocab",
            serde_json::json!({ "word": "학생" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["card"]["meaning"], "學生");
        assert!(body["anki_note_id"].is_i64());
    }

    #[tokio::test]
    async fn test_existing_vocab_is_updated_by_default() {
        let store = MemoryStore::new();
        let id = store.insert(
            NoteRecord::new("Korean::Auto", "Korean Vocabulary")
                .field("Word", "학생")
                .field("Meaning", "old"),
        );
        let (status, body) = call(
            app(store.clone()),
            "POST",
            "/vocab",
            serde_json::json!({ "word": "학생" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["anki_note_id"], id);
        assert_eq!(store.note_count(), 1);
        assert_eq!(store.note(id).unwrap().get("Meaning"), Some("學生"));
        assert!(store.writes().contains(&"update".to_string()));
        assert!(!store.writes().contains(&"add".to_string()));
    }

    #[tokio::test]
    async fn test_existing_vocab_reports_skipped_without_force() {
        let store = MemoryStore::new();
        let id = store.insert(
            NoteRecord::new("Korean::Auto", "Korean Vocabulary").field("Word", "학생"),
        );
        let (status, body) = call(
            app(store),
            "POST",
            "/vocab",
            serde_json::json!({ "word": "학생", "force_update": false }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "skipped");
        assert_eq!(body["anki_note_id"], id);
        assert!(body.get("card").is_none());
    }

    #[tokio::test]
    async fn test_empty_word_is_bad_request() {
        let (status, _) = call(
            app(MemoryStore::new()),
            "POST",
            "/vocab",
            serde_json::json!({ "word": "  " }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_store_down_is_503() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let (status, body) = call(
            app(store),
            "POST",
            "/vocab",
            serde_json::json!({ "word": "학생" }),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["step"], "check_duplicate");
    }

    #[tokio::test]
    async fn test_vocab_batch_counts() {
        let store = MemoryStore::new();
        store.insert(NoteRecord::new("Korean::Auto", "Korean Vocabulary").field("Word", "학교"));
        let (status, body) = call(
            app(store),
            "POST",
            "/vocab/batch",
            serde_json::json!({ "words": ["학생", "학교", ""] }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success_count"], 1);
        assert_eq!(body["fail_count"], 1);
        let statuses: Vec<&str> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["status"].as_str().unwrap())
            .collect();
        assert_eq!(statuses, vec!["success", "skipped", "failed"]);
        assert!(body["results"][2]["error"].is_string());
    }

    #[tokio::test]
    async fn test_listening_with_user_translation() {
        let (status, body) = call(
            app(MemoryStore::new()),
            "POST",
            "/listening",
            serde_json::json!({ "korean_sentence": "안녕하세요", "translation": "你好" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["card"]["translation_source"], "user");
    }

    #[tokio::test]
    async fn test_status_endpoints() {
        let (status, body) = call(app(MemoryStore::new()), "GET", "/status/anki", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unavailable");

        let (status, body) = call(app(MemoryStore::new()), "GET", "/status/api", serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model"], "gpt-4o-mini");
    }
}
