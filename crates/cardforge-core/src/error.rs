use thiserror::Error;

#[derive(Debug, Error)]
pub enum CardforgeError {
    // Graph errors
    #[error("Graph configuration error: {0}")]
    GraphConfig(String),

    #[error("Step '{step}' failed: {source}")]
    StepExecution {
        step: String,
        #[source]
        source: Box<CardforgeError>,
    },

    // State errors
    #[error("Missing state key: {key}")]
    MissingStateKey { key: String },

    #[error("State key '{key}' is not a {expected}")]
    StateType { key: String, expected: &'static str },

    // Collaborator errors
    #[error("{service} is unreachable: {message}")]
    ExternalUnavailable { service: String, message: String },

    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("Flashcard store error: {0}")]
    Store(String),

    #[error("Speech synthesis failed: {0}")]
    Speech(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CardforgeError {
    /// Wrap an error raised inside a graph step with the step's name.
    pub fn in_step(step: impl Into<String>, source: CardforgeError) -> Self {
        Self::StepExecution {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through step wrappers.
    pub fn root_cause(&self) -> &CardforgeError {
        match self {
            Self::StepExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether a collaborator could not be reached at all.
    ///
    /// Callers surface this separately from generic failures: it usually
    /// means the local Anki companion app is not running.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.root_cause(), Self::ExternalUnavailable { .. })
    }

    /// Name of the step that failed, if the error came out of a graph run.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::StepExecution { step, .. } => Some(step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CardforgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_seen_through_step_wrapper() {
        let err = CardforgeError::in_step(
            "check_duplicate",
            CardforgeError::ExternalUnavailable {
                service: "anki".into(),
                message: "connection refused".into(),
            },
        );
        assert!(err.is_unavailable());
        assert_eq!(err.failed_step(), Some("check_duplicate"));
    }

    #[test]
    fn test_step_error_display() {
        let err = CardforgeError::in_step("parse_word", CardforgeError::LlmParse("bad json".into()));
        assert_eq!(
            err.to_string(),
            "Step 'parse_word' failed: LLM response parse error: bad json"
        );
        assert!(!err.is_unavailable());
        assert!(matches!(err.root_cause(), CardforgeError::LlmParse(_)));
    }
}
