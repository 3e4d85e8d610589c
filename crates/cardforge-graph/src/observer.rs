use std::time::Duration;

use tracing::{debug, error, info};

use cardforge_core::error::CardforgeError;

use crate::state::{State, StateUpdate, Value};

/// Longest value preview printed in a diff line.
const PREVIEW_LIMIT: usize = 60;

/// Hooks the executor wraps around every step invocation.
///
/// Steps never call these themselves; the executor applies the observer
/// uniformly so timing and diff reporting cannot be forgotten on one step.
pub trait StepObserver: Send + Sync + 'static {
    fn on_start(&self, _node: &str, _state: &State) {}

    fn on_finish(&self, _node: &str, _before: &State, _update: &StateUpdate, _elapsed: Duration) {}

    fn on_error(&self, _node: &str, _error: &CardforgeError, _elapsed: Duration) {}
}

/// Observer that does nothing.
pub struct NoopObserver;

impl StepObserver for NoopObserver {}

/// Default observer: logs start, elapsed time and a before/after diff of
/// every key the step changed.
pub struct TracingObserver;

impl StepObserver for TracingObserver {
    fn on_start(&self, node: &str, _state: &State) {
        debug!(node = %node, "▶ start");
    }

    fn on_finish(&self, node: &str, before: &State, update: &StateUpdate, elapsed: Duration) {
        let changes = diff_lines(before, update);
        info!(
            node = %node,
            elapsed_ms = elapsed.as_millis() as u64,
            changed = changes.len(),
            "✔ done"
        );
        for line in changes {
            debug!(node = %node, "  {}", line);
        }
    }

    fn on_error(&self, node: &str, err: &CardforgeError, elapsed: Duration) {
        error!(
            node = %node,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %err,
            "✘ failed"
        );
    }
}

/// One `key: before → after` line per key whose value the update changes.
pub fn diff_lines(before: &State, update: &StateUpdate) -> Vec<String> {
    update
        .iter()
        .filter(|(key, value)| before.get(key) != Some(*value))
        .map(|(key, value)| {
            let old = before.get(key).map(preview).unwrap_or_else(|| "∅".to_string());
            format!("{}: {} → {}", key, old, preview(value))
        })
        .collect()
}

/// Short printable rendering of a state value.
pub fn preview(value: &Value) -> String {
    let full = match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Text(s) => format!("{:?}", s),
        Value::Bytes(b) => return format!("<bytes: {}>", b.len()),
        Value::List(items) => serde_json::Value::Array(items.clone()).to_string(),
    };
    truncate(&full, PREVIEW_LIMIT)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_preview_bytes() {
        let v = Value::Bytes(Bytes::from_static(b"ID3\x03\x00"));
        assert_eq!(preview(&v), "<bytes: 5>");
    }

    #[test]
    fn test_preview_truncates_long_values() {
        let long = "가".repeat(100);
        let p = preview(&Value::Text(long));
        assert!(p.ends_with("..."));
        // 60 chars kept, counting the opening quote.
        assert_eq!(p.chars().count(), PREVIEW_LIMIT + 3);
    }

    #[test]
    fn test_preview_scalars() {
        assert_eq!(preview(&Value::Null), "null");
        assert_eq!(preview(&Value::Bool(true)), "true");
        assert_eq!(preview(&Value::Int(1517)), "1517");
        assert_eq!(preview(&Value::Text("學".into())), "\"學\"");
        assert_eq!(
            preview(&Value::from(vec!["korean_auto".to_string()])),
            r#"["korean_auto"]"#
        );
    }

    #[test]
    fn test_diff_only_reports_changes() {
        let before = State::new().with("word", "학생").with("exists", false);
        let update = StateUpdate::new()
            .set("exists", false)
            .set("meaning", "學生")
            .set("word", "학교");

        let lines = diff_lines(&before, &update);
        assert_eq!(
            lines,
            vec![
                "meaning: ∅ → \"學生\"".to_string(),
                "word: \"학생\" → \"학교\"".to_string(),
            ]
        );
    }
}
