//! Core data models used throughout Suggestion Gate.
//!
//! These types represent the chunks, suggestions, sessions, and acceptance
//! statistics that flow through the indexing, retrieval, scoring, and
//! gating pipeline.

use serde::{Deserialize, Serialize};

/// Monotonically increasing chunk identifier.
///
/// Chunk ids are assigned by the store in insertion order and are never
/// reused. A file change supersedes the old chunk rows instead of deleting
/// them, so an id held by a concurrent reader stays valid.
pub type ChunkId = i64;

/// A retrievable unit of indexed code content.
///
/// Owned exclusively by the Context Store. The embedding vector is kept in
/// a separate record keyed by `id`, together with the `content_hash` it was
/// computed from; a mismatch between the two hashes means the embedding is
/// out of date.
#[derive(Debug, Clone, Serialize)]
pub struct CodeChunk {
    pub id: ChunkId,
    pub project_id: String,
    pub file_path: String,
    /// Position of this chunk within its file, contiguous from 0.
    pub chunk_index: i64,
    pub byte_start: i64,
    pub byte_end: i64,
    pub text: String,
    /// SHA-256 of `text`, hex-encoded.
    pub content_hash: String,
    pub last_indexed_at: i64,
    /// Set when embedding computation failed; the chunk is excluded from
    /// query results until recomputation succeeds.
    pub stale: bool,
}

/// A chunk produced by the chunker, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub chunk_index: i64,
    pub byte_start: i64,
    pub byte_end: i64,
    pub text: String,
    pub content_hash: String,
}

/// Result of upserting one file's content into the Context Store.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    /// Ids of chunks created by this upsert.
    pub created: Vec<ChunkId>,
    /// Ids of previously live chunks superseded by this upsert.
    pub invalidated: Vec<ChunkId>,
}

impl UpsertOutcome {
    /// True when the upsert changed nothing (identical content re-indexed).
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.invalidated.is_empty()
    }
}

/// A ranked chunk returned from retrieval, relevance in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: ChunkId,
    pub file_path: String,
    pub text: String,
    pub relevance: f64,
}

/// The file region a suggestion proposes to edit.
///
/// Used for the overlap invariant: two suggestions in the same session may
/// not simultaneously await approval for intersecting regions of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditTarget {
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
}

impl EditTarget {
    /// True when both targets name the same file and their line ranges
    /// intersect.
    pub fn overlaps(&self, other: &EditTarget) -> bool {
        self.file_path == other.file_path
            && self.start_line <= other.end_line
            && other.start_line <= self.end_line
    }
}

/// Lifecycle state of a [`Suggestion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    AutoApplied,
    AwaitingApproval,
    Approved,
    Rejected,
    Expired,
}

impl SuggestionStatus {
    /// Terminal states are immutable; no further transition is legal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SuggestionStatus::AutoApplied
                | SuggestionStatus::Approved
                | SuggestionStatus::Rejected
                | SuggestionStatus::Expired
        )
    }

    /// True for outcomes counted as acceptance in [`AcceptanceStats`].
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            SuggestionStatus::AutoApplied | SuggestionStatus::Approved
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::AutoApplied => "auto_applied",
            SuggestionStatus::AwaitingApproval => "awaiting_approval",
            SuggestionStatus::Approved => "approved",
            SuggestionStatus::Rejected => "rejected",
            SuggestionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<SuggestionStatus> {
        match s {
            "pending" => Some(SuggestionStatus::Pending),
            "auto_applied" => Some(SuggestionStatus::AutoApplied),
            "awaiting_approval" => Some(SuggestionStatus::AwaitingApproval),
            "approved" => Some(SuggestionStatus::Approved),
            "rejected" => Some(SuggestionStatus::Rejected),
            "expired" => Some(SuggestionStatus::Expired),
            _ => None,
        }
    }
}

/// Machine-readable reason attached to a rejected suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LowConfidence,
    ProviderTimeout,
    ProviderError,
    ClientDisconnected,
    StaleOverlap,
    HumanDeclined,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::LowConfidence => "low_confidence",
            RejectReason::ProviderTimeout => "provider_timeout",
            RejectReason::ProviderError => "provider_error",
            RejectReason::ClientDisconnected => "client_disconnected",
            RejectReason::StaleOverlap => "stale_overlap",
            RejectReason::HumanDeclined => "human_declined",
        }
    }

    pub fn parse(s: &str) -> Option<RejectReason> {
        match s {
            "low_confidence" => Some(RejectReason::LowConfidence),
            "provider_timeout" => Some(RejectReason::ProviderTimeout),
            "provider_error" => Some(RejectReason::ProviderError),
            "client_disconnected" => Some(RejectReason::ClientDisconnected),
            "stale_overlap" => Some(RejectReason::StaleOverlap),
            "human_declined" => Some(RejectReason::HumanDeclined),
            _ => None,
        }
    }
}

/// A scored, gated model suggestion.
///
/// Created by the Gate Controller after scoring and mutated only by it.
/// `confidence` is fixed at creation and never recomputed; re-scoring means
/// creating a new suggestion. Once `status` is terminal the record is
/// immutable.
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub id: String,
    pub project_id: String,
    pub session_id: String,
    pub target: Option<EditTarget>,
    /// The prompt sent to the model, including concatenated context.
    pub prompt_context: String,
    /// Raw model output text.
    pub raw_text: String,
    pub confidence: f64,
    pub status: SuggestionStatus,
    pub reason: Option<RejectReason>,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}

/// Per-project, per-connection record of suggestion history.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub project_id: String,
    pub created_at: i64,
    pub last_active_at: i64,
}

/// Rolling acceptance counters scoped per project.
///
/// Updated atomically with every terminal suggestion transition and fed to
/// the scorer as a Beta-smoothed prior. Expiry counts as rejection here but
/// is recorded distinctly on the suggestion itself.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AcceptanceStats {
    pub total_suggested: i64,
    pub total_accepted: i64,
    pub total_rejected: i64,
}

/// Event emitted on every suggestion status transition, for the front end
/// to render or notify on.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionEvent {
    pub suggestion_id: String,
    pub status: SuggestionStatus,
    pub text: String,
    pub confidence: f64,
    pub reason: Option<RejectReason>,
    /// True when the engine is running on the ephemeral in-memory session
    /// fallback because the persistent store was unreachable.
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!SuggestionStatus::Pending.is_terminal());
        assert!(!SuggestionStatus::AwaitingApproval.is_terminal());
        assert!(SuggestionStatus::AutoApplied.is_terminal());
        assert!(SuggestionStatus::Approved.is_terminal());
        assert!(SuggestionStatus::Rejected.is_terminal());
        assert!(SuggestionStatus::Expired.is_terminal());
    }

    #[test]
    fn test_status_roundtrip() {
        for s in [
            SuggestionStatus::Pending,
            SuggestionStatus::AutoApplied,
            SuggestionStatus::AwaitingApproval,
            SuggestionStatus::Approved,
            SuggestionStatus::Rejected,
            SuggestionStatus::Expired,
        ] {
            assert_eq!(SuggestionStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(SuggestionStatus::parse("bogus"), None);
    }

    #[test]
    fn test_target_overlap() {
        let a = EditTarget {
            file_path: "src/main.rs".into(),
            start_line: 10,
            end_line: 20,
        };
        let b = EditTarget {
            file_path: "src/main.rs".into(),
            start_line: 20,
            end_line: 25,
        };
        let c = EditTarget {
            file_path: "src/main.rs".into(),
            start_line: 21,
            end_line: 25,
        };
        let d = EditTarget {
            file_path: "src/lib.rs".into(),
            start_line: 10,
            end_line: 20,
        };
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&d));
    }

    #[test]
    fn test_accepted_outcomes() {
        assert!(SuggestionStatus::AutoApplied.is_accepted());
        assert!(SuggestionStatus::Approved.is_accepted());
        assert!(!SuggestionStatus::Rejected.is_accepted());
        assert!(!SuggestionStatus::Expired.is_accepted());
    }
}
