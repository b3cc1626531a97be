//! In-memory store implementation.
//!
//! Backs the test suite and serves as the ephemeral degraded-mode session
//! store when the persistent backend is unreachable. State lives behind a
//! single `std::sync::RwLock`; vector search is brute-force cosine over
//! all live chunks.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    AcceptanceStats, ChunkDraft, ChunkId, CodeChunk, RejectReason, Session, Suggestion,
    SuggestionStatus, UpsertOutcome,
};
use crate::vector::cosine_similarity;

use super::{ChunkCandidate, ChunkStore, PruneOutcome, PrunePolicy, SessionStore};

struct StoredChunk {
    chunk: CodeChunk,
    superseded: bool,
}

struct StoredEmbedding {
    vector: Vec<f32>,
    #[allow(dead_code)]
    model: String,
    #[allow(dead_code)]
    dims: usize,
    content_hash: String,
}

#[derive(Default)]
struct Inner {
    next_chunk_id: ChunkId,
    chunks: Vec<StoredChunk>,
    embeddings: HashMap<ChunkId, StoredEmbedding>,
    sessions: HashMap<String, Session>,
    /// Insertion order doubles as creation order per session.
    suggestions: Vec<Suggestion>,
    stats: HashMap<String, AcceptanceStats>,
}

/// In-memory store for tests and degraded-mode fallback.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn upsert_file(
        &self,
        project_id: &str,
        file_path: &str,
        drafts: &[ChunkDraft],
        now: i64,
    ) -> Result<UpsertOutcome> {
        let mut inner = self.inner.write().unwrap();

        let live_hashes: Vec<String> = inner
            .chunks
            .iter()
            .filter(|sc| {
                !sc.superseded
                    && sc.chunk.project_id == project_id
                    && sc.chunk.file_path == file_path
            })
            .map(|sc| sc.chunk.content_hash.clone())
            .collect();

        let draft_hashes: Vec<&str> = drafts.iter().map(|d| d.content_hash.as_str()).collect();
        if live_hashes.iter().map(String::as_str).eq(draft_hashes) {
            return Ok(UpsertOutcome::default());
        }

        let mut outcome = UpsertOutcome::default();
        for sc in inner.chunks.iter_mut() {
            if !sc.superseded
                && sc.chunk.project_id == project_id
                && sc.chunk.file_path == file_path
            {
                sc.superseded = true;
                outcome.invalidated.push(sc.chunk.id);
            }
        }

        for draft in drafts {
            let id = inner.next_chunk_id;
            inner.next_chunk_id += 1;

            // Carry over an existing embedding when the content is unchanged,
            // so only new content needs recomputation.
            let reusable = inner
                .embeddings
                .values()
                .find(|e| e.content_hash == draft.content_hash)
                .map(|e| StoredEmbedding {
                    vector: e.vector.clone(),
                    model: e.model.clone(),
                    dims: e.dims,
                    content_hash: e.content_hash.clone(),
                });
            if let Some(emb) = reusable {
                inner.embeddings.insert(id, emb);
            }

            inner.chunks.push(StoredChunk {
                chunk: CodeChunk {
                    id,
                    project_id: project_id.to_string(),
                    file_path: file_path.to_string(),
                    chunk_index: draft.chunk_index,
                    byte_start: draft.byte_start,
                    byte_end: draft.byte_end,
                    text: draft.text.clone(),
                    content_hash: draft.content_hash.clone(),
                    last_indexed_at: now,
                    stale: false,
                },
                superseded: false,
            });
            outcome.created.push(id);
        }

        Ok(outcome)
    }

    async fn live_chunks(&self, project_id: &str, file_path: &str) -> Result<Vec<CodeChunk>> {
        let inner = self.inner.read().unwrap();
        let mut chunks: Vec<CodeChunk> = inner
            .chunks
            .iter()
            .filter(|sc| {
                !sc.superseded
                    && sc.chunk.project_id == project_id
                    && sc.chunk.file_path == file_path
            })
            .map(|sc| sc.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn query(
        &self,
        project_id: &str,
        query_vec: &[f32],
        k: i64,
    ) -> Result<Vec<ChunkCandidate>> {
        let inner = self.inner.read().unwrap();
        let mut candidates: Vec<ChunkCandidate> = inner
            .chunks
            .iter()
            .filter(|sc| {
                !sc.superseded && !sc.chunk.stale && sc.chunk.project_id == project_id
            })
            .filter_map(|sc| {
                let emb = inner.embeddings.get(&sc.chunk.id)?;
                if emb.content_hash != sc.chunk.content_hash {
                    return None;
                }
                Some(ChunkCandidate {
                    chunk_id: sc.chunk.id,
                    file_path: sc.chunk.file_path.clone(),
                    text: sc.chunk.text.clone(),
                    raw_score: cosine_similarity(query_vec, &emb.vector) as f64,
                    last_indexed_at: sc.chunk.last_indexed_at,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.last_indexed_at.cmp(&a.last_indexed_at))
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        candidates.truncate(k.max(0) as usize);
        Ok(candidates)
    }

    async fn pending_embeddings(
        &self,
        project_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<CodeChunk>> {
        let inner = self.inner.read().unwrap();
        let mut pending: Vec<CodeChunk> = inner
            .chunks
            .iter()
            .filter(|sc| !sc.superseded)
            .filter(|sc| project_id.map_or(true, |p| sc.chunk.project_id == p))
            .filter(|sc| {
                match inner.embeddings.get(&sc.chunk.id) {
                    Some(emb) => emb.content_hash != sc.chunk.content_hash,
                    None => true,
                }
            })
            .map(|sc| sc.chunk.clone())
            .collect();
        pending.sort_by(|a, b| {
            a.file_path
                .cmp(&b.file_path)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        if let Some(limit) = limit {
            pending.truncate(limit);
        }
        Ok(pending)
    }

    async fn store_embedding(
        &self,
        chunk_id: ChunkId,
        vector: &[f32],
        model: &str,
        dims: usize,
        content_hash: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.embeddings.insert(
            chunk_id,
            StoredEmbedding {
                vector: vector.to_vec(),
                model: model.to_string(),
                dims,
                content_hash: content_hash.to_string(),
            },
        );
        if let Some(sc) = inner.chunks.iter_mut().find(|sc| sc.chunk.id == chunk_id) {
            sc.chunk.stale = false;
        }
        Ok(())
    }

    async fn mark_stale(&self, chunk_id: ChunkId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(sc) = inner.chunks.iter_mut().find(|sc| sc.chunk.id == chunk_id) {
            sc.chunk.stale = true;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get_or_create(&self, project_id: &str, now: i64) -> Result<Session> {
        let mut inner = self.inner.write().unwrap();
        let existing = inner
            .sessions
            .values()
            .filter(|s| s.project_id == project_id)
            .max_by_key(|s| (s.last_active_at, s.id.clone()))
            .map(|s| s.id.clone());

        let id = match existing {
            Some(id) => id,
            None => {
                let session = Session {
                    id: Uuid::new_v4().to_string(),
                    project_id: project_id.to_string(),
                    created_at: now,
                    last_active_at: now,
                };
                let id = session.id.clone();
                inner.sessions.insert(id.clone(), session);
                id
            }
        };

        let session = inner.sessions.get_mut(&id).unwrap();
        session.last_active_at = now;
        Ok(session.clone())
    }

    async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.sessions.get(session_id).cloned())
    }

    async fn list_sessions(&self, project_id: Option<&str>) -> Result<Vec<Session>> {
        let inner = self.inner.read().unwrap();
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| project_id.map_or(true, |p| s.project_id == p))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    async fn insert_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        let mut inner = self.inner.write().unwrap();

        let stats = inner
            .stats
            .entry(suggestion.project_id.clone())
            .or_default();
        stats.total_suggested += 1;
        if suggestion.status.is_accepted() {
            stats.total_accepted += 1;
        } else if suggestion.status.is_terminal() {
            stats.total_rejected += 1;
        }

        if let Some(session) = inner.sessions.get_mut(&suggestion.session_id) {
            session.last_active_at = suggestion.created_at;
        }

        inner.suggestions.push(suggestion.clone());
        Ok(())
    }

    async fn suggestion(&self, id: &str) -> Result<Option<Suggestion>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.suggestions.iter().find(|s| s.id == id).cloned())
    }

    async fn resolve_suggestion(
        &self,
        id: &str,
        to: SuggestionStatus,
        reason: Option<RejectReason>,
        resolved_at: i64,
    ) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();

        let project_id = {
            let Some(s) = inner.suggestions.iter_mut().find(|s| s.id == id) else {
                return Ok(false);
            };
            if s.status != SuggestionStatus::AwaitingApproval || !to.is_terminal() {
                return Ok(false);
            }
            s.status = to;
            s.reason = reason;
            s.resolved_at = Some(resolved_at);
            s.project_id.clone()
        };

        let stats = inner.stats.entry(project_id).or_default();
        if to.is_accepted() {
            stats.total_accepted += 1;
        } else {
            stats.total_rejected += 1;
        }
        Ok(true)
    }

    async fn awaiting_in_session(&self, session_id: &str) -> Result<Vec<Suggestion>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .suggestions
            .iter()
            .filter(|s| {
                s.session_id == session_id && s.status == SuggestionStatus::AwaitingApproval
            })
            .cloned()
            .collect())
    }

    async fn overdue_approvals(&self, cutoff: i64) -> Result<Vec<Suggestion>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .suggestions
            .iter()
            .filter(|s| {
                s.status == SuggestionStatus::AwaitingApproval && s.created_at <= cutoff
            })
            .cloned()
            .collect())
    }

    async fn session_history(&self, session_id: &str) -> Result<Vec<Suggestion>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .suggestions
            .iter()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn recent_files(&self, session_id: &str, window: usize) -> Result<Vec<String>> {
        let inner = self.inner.read().unwrap();
        let mut files: Vec<String> = Vec::new();
        for s in inner
            .suggestions
            .iter()
            .rev()
            .filter(|s| s.session_id == session_id)
            .take(window)
        {
            if let Some(target) = &s.target {
                if !files.contains(&target.file_path) {
                    files.push(target.file_path.clone());
                }
            }
        }
        Ok(files)
    }

    async fn acceptance_stats(&self, project_id: &str) -> Result<AcceptanceStats> {
        let inner = self.inner.read().unwrap();
        Ok(inner.stats.get(project_id).copied().unwrap_or_default())
    }

    async fn prune(&self, policy: &PrunePolicy, now: i64) -> Result<PruneOutcome> {
        let mut inner = self.inner.write().unwrap();
        let mut outcome = PruneOutcome::default();
        let idle_cutoff = now - policy.max_idle_secs;

        // Expired sessions: drop their terminal suggestions, and the
        // session itself once nothing non-terminal remains.
        let expired: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| s.last_active_at < idle_cutoff)
            .map(|s| s.id.clone())
            .collect();

        for session_id in expired {
            let before = inner.suggestions.len();
            inner
                .suggestions
                .retain(|s| s.session_id != session_id || !s.status.is_terminal());
            outcome.suggestions_removed += (before - inner.suggestions.len()) as u64;

            let has_open = inner
                .suggestions
                .iter()
                .any(|s| s.session_id == session_id);
            if !has_open {
                inner.sessions.remove(&session_id);
                outcome.sessions_removed += 1;
            }
        }

        // History cap on retained sessions: drop oldest terminal entries.
        let session_ids: Vec<String> = inner.sessions.keys().cloned().collect();
        for session_id in session_ids {
            let count = inner
                .suggestions
                .iter()
                .filter(|s| s.session_id == session_id)
                .count();
            if count <= policy.history_cap {
                continue;
            }
            let mut to_drop = count - policy.history_cap;
            let drop_ids: Vec<String> = inner
                .suggestions
                .iter()
                .filter(|s| s.session_id == session_id && s.status.is_terminal())
                .map(|s| s.id.clone())
                .take(to_drop)
                .collect();
            to_drop = drop_ids.len();
            inner.suggestions.retain(|s| !drop_ids.contains(&s.id));
            outcome.suggestions_removed += to_drop as u64;
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_code;
    use crate::models::EditTarget;

    fn draft_set(text: &str) -> Vec<ChunkDraft> {
        chunk_code(text, 300, 40)
    }

    fn suggestion(
        id: &str,
        session: &Session,
        status: SuggestionStatus,
        created_at: i64,
    ) -> Suggestion {
        Suggestion {
            id: id.to_string(),
            project_id: session.project_id.clone(),
            session_id: session.id.clone(),
            target: Some(EditTarget {
                file_path: format!("src/{id}.rs"),
                start_line: 1,
                end_line: 5,
            }),
            prompt_context: String::new(),
            raw_text: "let x = 1;".into(),
            confidence: 0.5,
            status,
            reason: None,
            created_at,
            resolved_at: status.is_terminal().then_some(created_at),
        }
    }

    #[tokio::test]
    async fn test_upsert_idempotent() {
        let store = InMemoryStore::new();
        let drafts = draft_set("fn a() { 1 }\n");

        let first = store.upsert_file("p1", "src/a.rs", &drafts, 100).await.unwrap();
        assert_eq!(first.created.len(), drafts.len());
        assert!(first.invalidated.is_empty());

        let second = store.upsert_file("p1", "src/a.rs", &drafts, 200).await.unwrap();
        assert!(second.is_noop());
    }

    #[tokio::test]
    async fn test_upsert_supersedes_on_change() {
        let store = InMemoryStore::new();
        let v1 = draft_set("fn a() { 1 }\n");
        let v2 = draft_set("fn a() { 2 }\n");

        let first = store.upsert_file("p1", "src/a.rs", &v1, 100).await.unwrap();
        let second = store.upsert_file("p1", "src/a.rs", &v2, 200).await.unwrap();

        assert_eq!(second.invalidated, first.created);
        assert!(!second.created.is_empty());
        // Ids are never reused.
        assert!(second.created.iter().all(|id| !first.created.contains(id)));

        let live = store.live_chunks("p1", "src/a.rs").await.unwrap();
        assert_eq!(live.len(), v2.len());
        assert!(live[0].text.contains('2'));
    }

    #[tokio::test]
    async fn test_embedding_carried_over_for_unchanged_content() {
        let store = InMemoryStore::new();
        let v1 = draft_set("fn a() { 1 }\n");
        let first = store.upsert_file("p1", "src/a.rs", &v1, 100).await.unwrap();
        store
            .store_embedding(first.created[0], &[1.0, 0.0], "m", 2, &v1[0].content_hash)
            .await
            .unwrap();

        // Re-index identical content under another path: embedding reused,
        // nothing pending.
        store.upsert_file("p1", "src/b.rs", &v1, 200).await.unwrap();
        let pending = store.pending_embeddings(Some("p1"), None).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_query_excludes_stale_and_unembedded() {
        let store = InMemoryStore::new();
        let drafts = draft_set("fn a() { 1 }\n\nfn b() { 2 }\n");
        assert!(drafts.len() >= 1);
        let outcome = store.upsert_file("p1", "src/a.rs", &drafts, 100).await.unwrap();

        // Nothing embedded yet: query must be empty, not an error.
        let hits = store.query("p1", &[1.0, 0.0], 10).await.unwrap();
        assert!(hits.is_empty());

        store
            .store_embedding(outcome.created[0], &[1.0, 0.0], "m", 2, &drafts[0].content_hash)
            .await
            .unwrap();
        let hits = store.query("p1", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);

        store.mark_stale(outcome.created[0]).await.unwrap();
        let hits = store.query("p1", &[1.0, 0.0], 10).await.unwrap();
        assert!(hits.is_empty(), "stale chunks must not be served");
    }

    #[tokio::test]
    async fn test_query_tie_break_most_recent_first() {
        let store = InMemoryStore::new();
        let a = draft_set("fn a() { 1 }\n");
        let b = draft_set("fn b() { 2 }\n");
        let out_a = store.upsert_file("p1", "src/a.rs", &a, 100).await.unwrap();
        let out_b = store.upsert_file("p1", "src/b.rs", &b, 200).await.unwrap();
        store
            .store_embedding(out_a.created[0], &[1.0, 0.0], "m", 2, &a[0].content_hash)
            .await
            .unwrap();
        store
            .store_embedding(out_b.created[0], &[1.0, 0.0], "m", 2, &b[0].content_hash)
            .await
            .unwrap();

        let hits = store.query("p1", &[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].file_path, "src/b.rs", "newer index wins the tie");
    }

    #[tokio::test]
    async fn test_pending_embeddings_includes_stale() {
        let store = InMemoryStore::new();
        let drafts = draft_set("fn a() { 1 }\n");
        let outcome = store.upsert_file("p1", "src/a.rs", &drafts, 100).await.unwrap();

        let pending = store.pending_embeddings(Some("p1"), None).await.unwrap();
        assert_eq!(pending.len(), drafts.len());

        store
            .store_embedding(outcome.created[0], &[1.0], "m", 1, &drafts[0].content_hash)
            .await
            .unwrap();
        let pending = store.pending_embeddings(Some("p1"), None).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_active_session() {
        let store = InMemoryStore::new();
        let s1 = store.get_or_create("p1", 100).await.unwrap();
        let s2 = store.get_or_create("p1", 200).await.unwrap();
        assert_eq!(s1.id, s2.id);
        assert_eq!(s2.last_active_at, 200);

        let other = store.get_or_create("p2", 100).await.unwrap();
        assert_ne!(other.id, s1.id);
    }

    #[tokio::test]
    async fn test_insert_updates_stats() {
        let store = InMemoryStore::new();
        let session = store.get_or_create("p1", 100).await.unwrap();

        store
            .insert_suggestion(&suggestion("s1", &session, SuggestionStatus::AutoApplied, 101))
            .await
            .unwrap();
        store
            .insert_suggestion(&suggestion("s2", &session, SuggestionStatus::Rejected, 102))
            .await
            .unwrap();
        store
            .insert_suggestion(&suggestion(
                "s3",
                &session,
                SuggestionStatus::AwaitingApproval,
                103,
            ))
            .await
            .unwrap();

        let stats = store.acceptance_stats("p1").await.unwrap();
        assert_eq!(stats.total_suggested, 3);
        assert_eq!(stats.total_accepted, 1);
        assert_eq!(stats.total_rejected, 1);
    }

    #[tokio::test]
    async fn test_resolve_exactly_once() {
        let store = InMemoryStore::new();
        let session = store.get_or_create("p1", 100).await.unwrap();
        store
            .insert_suggestion(&suggestion(
                "s1",
                &session,
                SuggestionStatus::AwaitingApproval,
                101,
            ))
            .await
            .unwrap();

        let won = store
            .resolve_suggestion("s1", SuggestionStatus::Approved, None, 150)
            .await
            .unwrap();
        assert!(won);

        // The losing expiry is a no-op, not an error, and stats move once.
        let lost = store
            .resolve_suggestion("s1", SuggestionStatus::Expired, None, 151)
            .await
            .unwrap();
        assert!(!lost);

        let stats = store.acceptance_stats("p1").await.unwrap();
        assert_eq!(stats.total_accepted, 1);
        assert_eq!(stats.total_rejected, 0);

        let s = store.suggestion("s1").await.unwrap().unwrap();
        assert_eq!(s.status, SuggestionStatus::Approved);
        assert_eq!(s.resolved_at, Some(150));
    }

    #[tokio::test]
    async fn test_prune_never_drops_open_suggestions() {
        let store = InMemoryStore::new();
        let session = store.get_or_create("p1", 100).await.unwrap();

        for i in 0..5 {
            store
                .insert_suggestion(&suggestion(
                    &format!("t{i}"),
                    &session,
                    SuggestionStatus::Rejected,
                    100 + i,
                ))
                .await
                .unwrap();
        }
        store
            .insert_suggestion(&suggestion(
                "open",
                &session,
                SuggestionStatus::AwaitingApproval,
                106,
            ))
            .await
            .unwrap();

        // Session far past the idle cutoff, cap smaller than history.
        let policy = PrunePolicy {
            max_idle_secs: 10,
            history_cap: 2,
        };
        let outcome = store.prune(&policy, 100_000).await.unwrap();
        assert_eq!(outcome.suggestions_removed, 5);

        let history = store.session_history(&session.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "open");
        // The session survives because an open suggestion remains.
        assert!(store.session(&session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_prune_caps_history_oldest_terminal_first() {
        let store = InMemoryStore::new();
        let session = store.get_or_create("p1", 100).await.unwrap();

        for i in 0..6 {
            store
                .insert_suggestion(&suggestion(
                    &format!("t{i}"),
                    &session,
                    SuggestionStatus::Approved,
                    100 + i,
                ))
                .await
                .unwrap();
        }

        let policy = PrunePolicy {
            max_idle_secs: 1_000_000,
            history_cap: 3,
        };
        let outcome = store.prune(&policy, 200).await.unwrap();
        assert_eq!(outcome.suggestions_removed, 3);
        assert_eq!(outcome.sessions_removed, 0);

        let history = store.session_history(&session.id).await.unwrap();
        let ids: Vec<&str> = history.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t4", "t5"], "oldest entries dropped first");
    }

    #[tokio::test]
    async fn test_prune_removes_idle_sessions() {
        let store = InMemoryStore::new();
        let session = store.get_or_create("p1", 100).await.unwrap();
        store
            .insert_suggestion(&suggestion("t0", &session, SuggestionStatus::Rejected, 101))
            .await
            .unwrap();

        let policy = PrunePolicy {
            max_idle_secs: 10,
            history_cap: 100,
        };
        let outcome = store.prune(&policy, 100_000).await.unwrap();
        assert_eq!(outcome.sessions_removed, 1);
        assert!(store.session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_files_window() {
        let store = InMemoryStore::new();
        let session = store.get_or_create("p1", 100).await.unwrap();
        for i in 0..6 {
            store
                .insert_suggestion(&suggestion(
                    &format!("t{i}"),
                    &session,
                    SuggestionStatus::Approved,
                    100 + i,
                ))
                .await
                .unwrap();
        }

        let files = store.recent_files(&session.id, 3).await.unwrap();
        assert_eq!(files, vec!["src/t5.rs", "src/t4.rs", "src/t3.rs"]);
    }
}
