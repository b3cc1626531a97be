//! Error taxonomy for the suggestion engine.
//!
//! These are the failures with defined recovery semantics. Everything else
//! propagates as `anyhow::Error` through the application layer.
//!
//! | Variant | Recovery |
//! |---------|----------|
//! | [`EngineError::ProviderTimeout`] | Suggestion rejected with reason `provider_timeout`; not retried within the request |
//! | [`EngineError::ProviderFailure`] | Suggestion rejected with reason `provider_error` |
//! | [`EngineError::EmbeddingFailure`] | Chunk marked stale, excluded from retrieval, retried on the next index pass |
//! | [`EngineError::StaleApprovalConflict`] | Logged no-op; the existing terminal state is returned |
//! | [`EngineError::InvalidTransition`] | Programming error guard on the gate state machine |
//!
//! An empty retrieval is deliberately *not* represented here: missing
//! context is a valid low-confidence signal, not a failure.

use thiserror::Error;

use crate::models::SuggestionStatus;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The model call exceeded its deadline.
    #[error("model provider timed out after {timeout_secs}s")]
    ProviderTimeout { timeout_secs: u64 },

    /// The model call failed for a reason other than the deadline.
    #[error("model provider failed: {0}")]
    ProviderFailure(String),

    /// Embedding computation failed for a chunk.
    #[error("embedding failed for chunk {chunk_id}: {message}")]
    EmbeddingFailure { chunk_id: i64, message: String },

    /// An approval or decline arrived after the suggestion already reached
    /// a terminal state.
    #[error("suggestion {suggestion_id} already resolved to {status:?}")]
    StaleApprovalConflict {
        suggestion_id: String,
        status: SuggestionStatus,
    },

    /// A transition the gate state machine does not permit.
    #[error("illegal transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: SuggestionStatus,
        to: SuggestionStatus,
    },

    /// Unknown suggestion id.
    #[error("suggestion not found: {0}")]
    SuggestionNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_reason() {
        let e = EngineError::ProviderTimeout { timeout_secs: 30 };
        assert!(e.to_string().contains("30s"));

        let e = EngineError::StaleApprovalConflict {
            suggestion_id: "abc".into(),
            status: SuggestionStatus::Approved,
        };
        assert!(e.to_string().contains("abc"));
    }
}
