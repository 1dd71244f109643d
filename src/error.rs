//! Error taxonomy for the retrieval/ranking core.
//!
//! Per-candidate failures (`ParseFailed`/`ScoreFailed`) never escape the orchestrator as
//! this type: they are caught and folded into a `Hit` with
//! `is_feasible: Feasibility::Undetermined` instead of failing the whole request.

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TrialRankError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("lexical backend error: {0}")]
    LexicalBackend(String),

    #[error("dense index not ready: {0}")]
    DenseNotReady(String),

    #[error("failed to parse eligibility criteria for {nct_id}: {message}")]
    ParseFailed { nct_id: String, message: String },

    #[error("failed to score trial {nct_id}: {message}")]
    ScoreFailed { nct_id: String, message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("HTTP client initialization failed: {0}")]
    HttpClientInit(reqwest::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrialRankError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for "nothing is wrong, there's just no dense index to query" rather than
    /// "the request failed" — the orchestrator uses this to degrade to lexical-only
    /// instead of failing.
    pub fn is_dense_not_ready(&self) -> bool {
        matches!(self, Self::DenseNotReady(_))
    }
}

#[cfg(test)]
mod tests {
    use super::TrialRankError;

    #[test]
    fn validation_display_includes_message() {
        let err = TrialRankError::validation("size must be between 1 and 100");
        assert!(err.to_string().contains("size must be between 1 and 100"));
    }

    #[test]
    fn parse_failed_display_includes_nct_id_and_message() {
        let err = TrialRankError::ParseFailed {
            nct_id: "NCT00000001".to_string(),
            message: "unexpected end of input".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("NCT00000001"));
        assert!(msg.contains("unexpected end of input"));
    }

    #[test]
    fn is_dense_not_ready_identifies_variant() {
        assert!(TrialRankError::DenseNotReady("no artifacts".into()).is_dense_not_ready());
        assert!(!TrialRankError::Cancelled.is_dense_not_ready());
    }
}
