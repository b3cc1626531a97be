//! Storage abstractions for Suggestion Gate.
//!
//! Two traits cover the engine's persistence needs: [`ChunkStore`] for the
//! Context Store (indexed code chunks and their embeddings) and
//! [`SessionStore`] for sessions, suggestions, and acceptance statistics.
//! Both have a SQLite implementation in the app crate and an in-memory
//! implementation here, used by tests and as the degraded-mode fallback
//! when the persistent session store is unreachable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    AcceptanceStats, ChunkDraft, ChunkId, CodeChunk, RejectReason, Session, Suggestion,
    SuggestionStatus, UpsertOutcome,
};

/// A candidate chunk returned from a similarity query, before recency
/// boosting. Carries enough to rank, boost, and assemble a prompt without
/// further round-trips.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: ChunkId,
    pub file_path: String,
    pub text: String,
    /// Raw cosine similarity from the store.
    pub raw_score: f64,
    /// Tie-break: more recently indexed ranks first.
    pub last_indexed_at: i64,
}

/// Session pruning policy.
#[derive(Debug, Clone, Copy)]
pub struct PrunePolicy {
    /// Sessions idle longer than this are pruned.
    pub max_idle_secs: i64,
    /// Per-session history cap; oldest terminal entries beyond it are
    /// dropped.
    pub history_cap: usize,
}

/// What a prune pass removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PruneOutcome {
    pub sessions_removed: u64,
    pub suggestions_removed: u64,
}

/// Abstract storage for indexed code chunks and their embeddings.
///
/// Chunk ids are arena-style: monotonically increasing and never reused.
/// A file change supersedes the file's previous chunks instead of deleting
/// them, so concurrent queries never observe a chunk mid-update.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Replace the live chunk set for one file.
    ///
    /// Idempotent: when the drafts' content hashes match the live chunks,
    /// nothing changes and the outcome is a no-op. Otherwise the previous
    /// chunks are superseded and new rows created; embeddings of chunks
    /// whose `content_hash` is unchanged are carried over so only changed
    /// content needs recomputation. The whole operation is atomic per file.
    async fn upsert_file(
        &self,
        project_id: &str,
        file_path: &str,
        drafts: &[ChunkDraft],
        now: i64,
    ) -> Result<UpsertOutcome>;

    /// The live (non-superseded) chunks for a file, ordered by index.
    async fn live_chunks(&self, project_id: &str, file_path: &str) -> Result<Vec<CodeChunk>>;

    /// Top-`k` live chunks by cosine similarity against `query_vec`.
    ///
    /// Ties break most-recently-indexed first, then by id for determinism.
    /// Chunks marked stale, superseded, or whose stored embedding no longer
    /// matches their `content_hash` are excluded — a chunk is never served
    /// with a wrong or missing vector. An empty store yields an empty
    /// result, not an error.
    async fn query(
        &self,
        project_id: &str,
        query_vec: &[f32],
        k: i64,
    ) -> Result<Vec<ChunkCandidate>>;

    /// Live chunks that have no current embedding (missing, hash-stale, or
    /// previously failed), ordered by file then index.
    async fn pending_embeddings(
        &self,
        project_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<CodeChunk>>;

    /// Store or replace the embedding for a chunk and clear its stale flag.
    async fn store_embedding(
        &self,
        chunk_id: ChunkId,
        vector: &[f32],
        model: &str,
        dims: usize,
        content_hash: &str,
    ) -> Result<()>;

    /// Mark a chunk stale after a failed embedding computation; it stays
    /// out of query results until recomputed.
    async fn mark_stale(&self, chunk_id: ChunkId) -> Result<()>;
}

/// Abstract storage for sessions, suggestion history, and acceptance
/// statistics.
///
/// A session's history is the ordered set of its suggestions; it only
/// grows by append, and pruning removes oldest terminal entries only.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The active session for a project, creating one if none exists.
    /// Bumps `last_active_at`.
    async fn get_or_create(&self, project_id: &str, now: i64) -> Result<Session>;

    async fn session(&self, session_id: &str) -> Result<Option<Session>>;

    async fn list_sessions(&self, project_id: Option<&str>) -> Result<Vec<Session>>;

    /// Append a freshly created suggestion to its session's history.
    ///
    /// Atomically bumps the project's `total_suggested` — and the
    /// accepted/rejected counter when the suggestion is created already
    /// terminal — in the same write as the insert.
    async fn insert_suggestion(&self, suggestion: &Suggestion) -> Result<()>;

    async fn suggestion(&self, id: &str) -> Result<Option<Suggestion>>;

    /// Resolve an awaiting suggestion to a terminal state, exactly once.
    ///
    /// The transition commits only if the suggestion still holds status
    /// `awaiting_approval`; the stats update rides the same atomic write.
    /// Returns `false` when another resolution won the race — the caller
    /// treats that as a no-op, not an error.
    async fn resolve_suggestion(
        &self,
        id: &str,
        to: SuggestionStatus,
        reason: Option<RejectReason>,
        resolved_at: i64,
    ) -> Result<bool>;

    /// Suggestions currently awaiting approval in a session, oldest first.
    async fn awaiting_in_session(&self, session_id: &str) -> Result<Vec<Suggestion>>;

    /// Awaiting suggestions created at or before `cutoff`, for expiry.
    async fn overdue_approvals(&self, cutoff: i64) -> Result<Vec<Suggestion>>;

    /// Full suggestion history for a session, in creation order.
    async fn session_history(&self, session_id: &str) -> Result<Vec<Suggestion>>;

    /// Distinct files targeted by the session's last `window` suggestions,
    /// newest first. Feeds the retriever's recency boost.
    async fn recent_files(&self, session_id: &str, window: usize) -> Result<Vec<String>>;

    async fn acceptance_stats(&self, project_id: &str) -> Result<AcceptanceStats>;

    /// Apply the pruning policy.
    ///
    /// Never removes a `pending` or `awaiting_approval` suggestion, and
    /// never removes a session that still holds one. Safe to run
    /// concurrently with appends: only strictly-older terminal entries are
    /// touched.
    async fn prune(&self, policy: &PrunePolicy, now: i64) -> Result<PruneOutcome>;
}
