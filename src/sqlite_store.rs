//! SQLite-backed [`ChunkStore`] and [`SessionStore`] implementation.
//!
//! Wraps a [`SqlitePool`] and translates every store operation into SQL
//! against the schema in [`crate::migrate`]. Multi-statement writes run in
//! transactions so readers never observe a chunk mid-update and a status
//! write never lands without its stats update.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use suggestion_gate_core::models::{
    AcceptanceStats, ChunkDraft, ChunkId, CodeChunk, EditTarget, RejectReason, Session,
    Suggestion, SuggestionStatus, UpsertOutcome,
};
use suggestion_gate_core::store::{
    ChunkCandidate, ChunkStore, PruneOutcome, PrunePolicy, SessionStore,
};
use suggestion_gate_core::vector::{blob_to_vec, cosine_similarity, vec_to_blob};

const TERMINAL_STATUSES: &str = "('auto_applied', 'approved', 'rejected', 'expired')";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> CodeChunk {
    CodeChunk {
        id: row.get("id"),
        project_id: row.get("project_id"),
        file_path: row.get("file_path"),
        chunk_index: row.get("chunk_index"),
        byte_start: row.get("byte_start"),
        byte_end: row.get("byte_end"),
        text: row.get("text"),
        content_hash: row.get("content_hash"),
        last_indexed_at: row.get("last_indexed_at"),
        stale: row.get::<i64, _>("stale") != 0,
    }
}

fn suggestion_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Suggestion> {
    let status_str: String = row.get("status");
    let status = SuggestionStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("corrupt suggestion status: {}", status_str))?;
    let reason: Option<String> = row.get("reason");
    let reason = reason.as_deref().and_then(RejectReason::parse);

    let target_file: Option<String> = row.get("target_file");
    let target = target_file.map(|file_path| EditTarget {
        file_path,
        start_line: row.get::<Option<i64>, _>("target_start_line").unwrap_or(0),
        end_line: row.get::<Option<i64>, _>("target_end_line").unwrap_or(0),
    });

    Ok(Suggestion {
        id: row.get("id"),
        project_id: row.get("project_id"),
        session_id: row.get("session_id"),
        target,
        prompt_context: row.get("prompt_context"),
        raw_text: row.get("raw_text"),
        confidence: row.get("confidence"),
        status,
        reason,
        created_at: row.get("created_at"),
        resolved_at: row.get("resolved_at"),
    })
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        project_id: row.get("project_id"),
        created_at: row.get("created_at"),
        last_active_at: row.get("last_active_at"),
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn upsert_file(
        &self,
        project_id: &str,
        file_path: &str,
        drafts: &[ChunkDraft],
        now: i64,
    ) -> Result<UpsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let live_rows = sqlx::query(
            "SELECT id, content_hash FROM chunks
             WHERE project_id = ? AND file_path = ? AND superseded = 0
             ORDER BY chunk_index ASC",
        )
        .bind(project_id)
        .bind(file_path)
        .fetch_all(&mut *tx)
        .await?;

        let live_hashes: Vec<String> = live_rows.iter().map(|r| r.get("content_hash")).collect();
        let draft_hashes: Vec<&str> = drafts.iter().map(|d| d.content_hash.as_str()).collect();
        if live_hashes.iter().map(String::as_str).eq(draft_hashes) {
            // Identical content re-indexed: nothing to do.
            return Ok(UpsertOutcome::default());
        }

        let mut outcome = UpsertOutcome::default();
        for row in &live_rows {
            outcome.invalidated.push(row.get::<i64, _>("id"));
        }

        sqlx::query(
            "UPDATE chunks SET superseded = 1
             WHERE project_id = ? AND file_path = ? AND superseded = 0",
        )
        .bind(project_id)
        .bind(file_path)
        .execute(&mut *tx)
        .await?;

        for draft in drafts {
            let result = sqlx::query(
                "INSERT INTO chunks (project_id, file_path, chunk_index, byte_start, byte_end,
                                     text, content_hash, last_indexed_at, stale, superseded)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0)",
            )
            .bind(project_id)
            .bind(file_path)
            .bind(draft.chunk_index)
            .bind(draft.byte_start)
            .bind(draft.byte_end)
            .bind(&draft.text)
            .bind(&draft.content_hash)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            let chunk_id = result.last_insert_rowid();

            // Carry over an embedding computed for identical content, so
            // only changed chunks need recomputation.
            let reusable = sqlx::query(
                "SELECT e.model, e.dims, cv.embedding
                 FROM embeddings e
                 JOIN chunk_vectors cv ON cv.chunk_id = e.chunk_id
                 WHERE e.content_hash = ?
                 LIMIT 1",
            )
            .bind(&draft.content_hash)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = reusable {
                let model: String = row.get("model");
                let dims: i64 = row.get("dims");
                let blob: Vec<u8> = row.get("embedding");

                sqlx::query(
                    "INSERT INTO embeddings (chunk_id, model, dims, created_at, content_hash)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(chunk_id)
                .bind(&model)
                .bind(dims)
                .bind(now)
                .bind(&draft.content_hash)
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, project_id, embedding) VALUES (?, ?, ?)",
                )
                .bind(chunk_id)
                .bind(project_id)
                .bind(&blob)
                .execute(&mut *tx)
                .await?;
            }

            outcome.created.push(chunk_id);
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn live_chunks(&self, project_id: &str, file_path: &str) -> Result<Vec<CodeChunk>> {
        let rows = sqlx::query(
            "SELECT id, project_id, file_path, chunk_index, byte_start, byte_end,
                    text, content_hash, last_indexed_at, stale
             FROM chunks
             WHERE project_id = ? AND file_path = ? AND superseded = 0
             ORDER BY chunk_index ASC",
        )
        .bind(project_id)
        .bind(file_path)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn query(
        &self,
        project_id: &str,
        query_vec: &[f32],
        k: i64,
    ) -> Result<Vec<ChunkCandidate>> {
        // Brute-force cosine over the live, embedded, non-stale chunk set.
        // The embeddings join enforces hash freshness: a chunk whose text
        // changed since its vector was computed is not served.
        let rows = sqlx::query(
            "SELECT c.id, c.file_path, c.text, c.last_indexed_at, cv.embedding
             FROM chunks c
             JOIN chunk_vectors cv ON cv.chunk_id = c.id
             JOIN embeddings e ON e.chunk_id = c.id AND e.content_hash = c.content_hash
             WHERE c.project_id = ? AND c.superseded = 0 AND c.stale = 0",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                ChunkCandidate {
                    chunk_id: row.get("id"),
                    file_path: row.get("file_path"),
                    text: row.get("text"),
                    raw_score: cosine_similarity(query_vec, &vec) as f64,
                    last_indexed_at: row.get("last_indexed_at"),
                }
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
        let limit_val = limit.unwrap_or(usize::MAX).min(i64::MAX as usize) as i64;

        let rows = match project_id {
            Some(project) => {
                sqlx::query(
                    "SELECT c.id, c.project_id, c.file_path, c.chunk_index, c.byte_start,
                            c.byte_end, c.text, c.content_hash, c.last_indexed_at, c.stale
                     FROM chunks c
                     LEFT JOIN embeddings e ON e.chunk_id = c.id
                     WHERE c.superseded = 0 AND c.project_id = ?
                       AND (e.chunk_id IS NULL OR e.content_hash != c.content_hash)
                     ORDER BY c.file_path, c.chunk_index
                     LIMIT ?",
                )
                .bind(project)
                .bind(limit_val)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT c.id, c.project_id, c.file_path, c.chunk_index, c.byte_start,
                            c.byte_end, c.text, c.content_hash, c.last_indexed_at, c.stale
                     FROM chunks c
                     LEFT JOIN embeddings e ON e.chunk_id = c.id
                     WHERE c.superseded = 0
                       AND (e.chunk_id IS NULL OR e.content_hash != c.content_hash)
                     ORDER BY c.file_path, c.chunk_index
                     LIMIT ?",
                )
                .bind(limit_val)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    async fn store_embedding(
        &self,
        chunk_id: ChunkId,
        vector: &[f32],
        model: &str,
        dims: usize,
        content_hash: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let blob = vec_to_blob(vector);

        let mut tx = self.pool.begin().await?;

        let project_id: Option<String> =
            sqlx::query_scalar("SELECT project_id FROM chunks WHERE id = ?")
                .bind(chunk_id)
                .fetch_optional(&mut *tx)
                .await?;
        let project_id = project_id.ok_or_else(|| anyhow!("unknown chunk id: {}", chunk_id))?;

        sqlx::query(
            "INSERT INTO embeddings (chunk_id, model, dims, created_at, content_hash)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(chunk_id) DO UPDATE SET
                 model = excluded.model,
                 dims = excluded.dims,
                 created_at = excluded.created_at,
                 content_hash = excluded.content_hash",
        )
        .bind(chunk_id)
        .bind(model)
        .bind(dims as i64)
        .bind(now)
        .bind(content_hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO chunk_vectors (chunk_id, project_id, embedding)
             VALUES (?, ?, ?)
             ON CONFLICT(chunk_id) DO UPDATE SET
                 project_id = excluded.project_id,
                 embedding = excluded.embedding",
        )
        .bind(chunk_id)
        .bind(&project_id)
        .bind(&blob)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE chunks SET stale = 0 WHERE id = ?")
            .bind(chunk_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_stale(&self, chunk_id: ChunkId) -> Result<()> {
        sqlx::query("UPDATE chunks SET stale = 1 WHERE id = ?")
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get_or_create(&self, project_id: &str, now: i64) -> Result<Session> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM sessions WHERE project_id = ?
             ORDER BY last_active_at DESC, id ASC LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&mut *tx)
        .await?;

        let id = match existing {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                sqlx::query(
                    "INSERT INTO sessions (id, project_id, created_at, last_active_at)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(project_id)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                id
            }
        };

        sqlx::query("UPDATE sessions SET last_active_at = ? WHERE id = ?")
            .bind(now)
            .bind(&id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            "SELECT id, project_id, created_at, last_active_at FROM sessions WHERE id = ?",
        )
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session_from_row(&row))
    }

    async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, project_id, created_at, last_active_at FROM sessions WHERE id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(session_from_row))
    }

    async fn list_sessions(&self, project_id: Option<&str>) -> Result<Vec<Session>> {
        let rows = match project_id {
            Some(project) => {
                sqlx::query(
                    "SELECT id, project_id, created_at, last_active_at FROM sessions
                     WHERE project_id = ? ORDER BY last_active_at DESC, id ASC",
                )
                .bind(project)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, project_id, created_at, last_active_at FROM sessions
                     ORDER BY last_active_at DESC, id ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(session_from_row).collect())
    }

    async fn insert_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO suggestions (id, project_id, session_id, target_file,
                                      target_start_line, target_end_line, prompt_context,
                                      raw_text, confidence, status, reason, created_at,
                                      resolved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&suggestion.id)
        .bind(&suggestion.project_id)
        .bind(&suggestion.session_id)
        .bind(suggestion.target.as_ref().map(|t| t.file_path.as_str()))
        .bind(suggestion.target.as_ref().map(|t| t.start_line))
        .bind(suggestion.target.as_ref().map(|t| t.end_line))
        .bind(&suggestion.prompt_context)
        .bind(&suggestion.raw_text)
        .bind(suggestion.confidence)
        .bind(suggestion.status.as_str())
        .bind(suggestion.reason.map(|r| r.as_str()))
        .bind(suggestion.created_at)
        .bind(suggestion.resolved_at)
        .execute(&mut *tx)
        .await?;

        // Stats ride the same transaction as the insert: a suggestion
        // created already terminal counts immediately.
        let accepted = suggestion.status.is_accepted() as i64;
        let rejected = (suggestion.status.is_terminal() && !suggestion.status.is_accepted()) as i64;
        sqlx::query(
            "INSERT INTO acceptance_stats (project_id, total_suggested, total_accepted, total_rejected)
             VALUES (?, 1, ?, ?)
             ON CONFLICT(project_id) DO UPDATE SET
                 total_suggested = total_suggested + 1,
                 total_accepted = total_accepted + excluded.total_accepted,
                 total_rejected = total_rejected + excluded.total_rejected",
        )
        .bind(&suggestion.project_id)
        .bind(accepted)
        .bind(rejected)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE sessions SET last_active_at = ? WHERE id = ?")
            .bind(suggestion.created_at)
            .bind(&suggestion.session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn suggestion(&self, id: &str) -> Result<Option<Suggestion>> {
        let row = sqlx::query("SELECT * FROM suggestions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(suggestion_from_row).transpose()
    }

    async fn resolve_suggestion(
        &self,
        id: &str,
        to: SuggestionStatus,
        reason: Option<RejectReason>,
        resolved_at: i64,
    ) -> Result<bool> {
        if !to.is_terminal() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;

        // Exactly-once: the conditional predicate makes the race loser a
        // zero-row update, and the stats write commits with the winner.
        let result = sqlx::query(
            "UPDATE suggestions SET status = ?, reason = ?, resolved_at = ?
             WHERE id = ? AND status = 'awaiting_approval'",
        )
        .bind(to.as_str())
        .bind(reason.map(|r| r.as_str()))
        .bind(resolved_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let project_id: String = sqlx::query_scalar("SELECT project_id FROM suggestions WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let accepted = to.is_accepted() as i64;
        let rejected = (!to.is_accepted()) as i64;
        sqlx::query(
            "INSERT INTO acceptance_stats (project_id, total_suggested, total_accepted, total_rejected)
             VALUES (?, 0, ?, ?)
             ON CONFLICT(project_id) DO UPDATE SET
                 total_accepted = total_accepted + excluded.total_accepted,
                 total_rejected = total_rejected + excluded.total_rejected",
        )
        .bind(&project_id)
        .bind(accepted)
        .bind(rejected)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn awaiting_in_session(&self, session_id: &str) -> Result<Vec<Suggestion>> {
        let rows = sqlx::query(
            "SELECT * FROM suggestions
             WHERE session_id = ? AND status = 'awaiting_approval'
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(suggestion_from_row).collect()
    }

    async fn overdue_approvals(&self, cutoff: i64) -> Result<Vec<Suggestion>> {
        let rows = sqlx::query(
            "SELECT * FROM suggestions
             WHERE status = 'awaiting_approval' AND created_at <= ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(suggestion_from_row).collect()
    }

    async fn session_history(&self, session_id: &str) -> Result<Vec<Suggestion>> {
        let rows = sqlx::query(
            "SELECT * FROM suggestions WHERE session_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(suggestion_from_row).collect()
    }

    async fn recent_files(&self, session_id: &str, window: usize) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT target_file FROM (
                 SELECT target_file, created_at, rowid AS rid FROM suggestions
                 WHERE session_id = ?
                 ORDER BY created_at DESC, rid DESC
                 LIMIT ?
             )
             WHERE target_file IS NOT NULL
             ORDER BY created_at DESC, rid DESC",
        )
        .bind(session_id)
        .bind(window.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut files: Vec<String> = Vec::new();
        for row in rows {
            let file: String = row.get("target_file");
            if !files.contains(&file) {
                files.push(file);
            }
        }
        Ok(files)
    }

    async fn acceptance_stats(&self, project_id: &str) -> Result<AcceptanceStats> {
        let row = sqlx::query(
            "SELECT total_suggested, total_accepted, total_rejected
             FROM acceptance_stats WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => AcceptanceStats {
                total_suggested: row.get("total_suggested"),
                total_accepted: row.get("total_accepted"),
                total_rejected: row.get("total_rejected"),
            },
            None => AcceptanceStats::default(),
        })
    }

    async fn prune(&self, policy: &PrunePolicy, now: i64) -> Result<PruneOutcome> {
        let mut outcome = PruneOutcome::default();
        let idle_cutoff = now - policy.max_idle_secs;

        let mut tx = self.pool.begin().await?;

        // Idle sessions: drop their terminal suggestions; the session row
        // goes once nothing open remains. Open entries are never touched.
        let idle_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM sessions WHERE last_active_at < ?")
                .bind(idle_cutoff)
                .fetch_all(&mut *tx)
                .await?;

        for session_id in &idle_ids {
            let deleted = sqlx::query(&format!(
                "DELETE FROM suggestions WHERE session_id = ? AND status IN {TERMINAL_STATUSES}"
            ))
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
            outcome.suggestions_removed += deleted.rows_affected();

            let open: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM suggestions WHERE session_id = ?")
                    .bind(session_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if open == 0 {
                sqlx::query("DELETE FROM sessions WHERE id = ?")
                    .bind(session_id)
                    .execute(&mut *tx)
                    .await?;
                outcome.sessions_removed += 1;
            }
        }

        // History cap on retained sessions: oldest terminal entries first.
        let session_ids: Vec<String> = sqlx::query_scalar("SELECT id FROM sessions")
            .fetch_all(&mut *tx)
            .await?;

        for session_id in &session_ids {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM suggestions WHERE session_id = ?")
                    .bind(session_id)
                    .fetch_one(&mut *tx)
                    .await?;
            let excess = count - policy.history_cap as i64;
            if excess <= 0 {
                continue;
            }

            let deleted = sqlx::query(&format!(
                "DELETE FROM suggestions WHERE id IN (
                     SELECT id FROM suggestions
                     WHERE session_id = ? AND status IN {TERMINAL_STATUSES}
                     ORDER BY created_at ASC, rowid ASC
                     LIMIT ?
                 )"
            ))
            .bind(session_id)
            .bind(excess)
            .execute(&mut *tx)
            .await?;
            outcome.suggestions_removed += deleted.rows_affected();
        }

        tx.commit().await?;
        Ok(outcome)
    }
}
