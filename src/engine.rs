//! Engine orchestrator.
//!
//! Wires the pipeline together: file-change event → chunking and indexing
//! → retrieval → model call → confidence scoring → gate decision → session
//! write → event emission. This is the only component that creates or
//! mutates suggestions.
//!
//! # Concurrency
//!
//! Suggestions within one session are processed in creation order: the
//! submit pipeline holds a per-session async mutex across the model call.
//! Sessions are independent — a slow model call for one client never
//! blocks another. The `awaiting_approval → {approved, rejected, expired}`
//! transition is exactly-once: the store's conditional update picks the
//! race winner and the loser is a no-op.
//!
//! # Failure containment
//!
//! Provider timeouts, provider errors, and client disconnects all surface
//! as terminal rejected suggestions with a reason code — never a crash. If
//! the persistent session store becomes unreachable, the engine switches
//! to an ephemeral in-memory session store and flags every subsequent
//! event with `degraded: true` so the front end can tell the user.
//!
//! # Side effects
//!
//! The engine never edits files. The `auto_applied` and `approved` events
//! on the broadcast channel are the application signal for the editor/CLI
//! collaborator; rejection and expiry never reach external state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use suggestion_gate_core::chunk::chunk_code;
use suggestion_gate_core::error::EngineError;
use suggestion_gate_core::gate::{self, ApprovalDecision, GateThresholds};
use suggestion_gate_core::models::{
    AcceptanceStats, EditTarget, RejectReason, RetrievedChunk, Session, Suggestion,
    SuggestionEvent, SuggestionStatus, UpsertOutcome,
};
use suggestion_gate_core::retrieve::{retrieve, RetrievalParams};
use suggestion_gate_core::score::{score, PriorSmoothing, ScoreWeights};
use suggestion_gate_core::store::memory::InMemoryStore;
use suggestion_gate_core::store::{ChunkStore, PruneOutcome, PrunePolicy, SessionStore};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::provider::{build_prompt, Completion, CompletionProvider};

/// Everything the engine needs from configuration, decoupled from the
/// config file format.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub chunk_max_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub retrieval: RetrievalParams,
    pub weights: ScoreWeights,
    pub smoothing: PriorSmoothing,
    pub thresholds: GateThresholds,
    pub approval_timeout: Duration,
    pub max_prompt_tokens: usize,
    pub provider_timeout: Duration,
    pub prune: PrunePolicy,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_max_tokens: config.chunking.max_tokens,
            chunk_overlap_tokens: config.chunking.overlap_tokens,
            retrieval: config.retrieval.params(),
            weights: config.scoring.weights(),
            smoothing: config.scoring.smoothing(),
            thresholds: config.gate.thresholds(),
            approval_timeout: Duration::from_secs(config.gate.approval_timeout_seconds),
            max_prompt_tokens: config.provider.max_prompt_tokens,
            provider_timeout: Duration::from_secs(config.provider.timeout_secs),
            prune: PrunePolicy {
                max_idle_secs: config.session.retention_days * 86_400,
                history_cap: config.session.history_cap,
            },
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chunk_max_tokens: 300,
            chunk_overlap_tokens: 40,
            retrieval: RetrievalParams::default(),
            weights: ScoreWeights::default(),
            smoothing: PriorSmoothing::default(),
            thresholds: GateThresholds::default(),
            approval_timeout: Duration::from_secs(30),
            max_prompt_tokens: 2048,
            provider_timeout: Duration::from_secs(30),
            prune: PrunePolicy {
                max_idle_secs: 14 * 86_400,
                history_cap: 200,
            },
        }
    }
}

/// Where the editor's cursor sits and what the suggestion would replace.
#[derive(Debug, Clone, Deserialize)]
pub struct CursorLocation {
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
    /// Window of text around the cursor, supplied by the editor. Folded
    /// into the query embedding when present.
    #[serde(default)]
    pub surrounding: Option<String>,
}

/// One front-end query: produce a scored, gated suggestion.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub project_id: String,
    /// Continue an existing session. Falls back to the project's active
    /// session (creating one if needed) when absent or unknown.
    #[serde(default)]
    pub session_id: Option<String>,
    pub query_text: String,
    #[serde(default)]
    pub cursor: Option<CursorLocation>,
}

enum CallOutcome {
    Done(Completion),
    TimedOut,
    Failed(String),
    Cancelled,
}

pub struct Engine {
    chunks: Arc<dyn ChunkStore>,
    sessions: Arc<dyn SessionStore>,
    /// Ephemeral stand-in when the persistent session store is down.
    fallback_sessions: Arc<InMemoryStore>,
    degraded: AtomicBool,
    provider: Arc<dyn CompletionProvider>,
    embedder: Arc<dyn Embedder>,
    settings: EngineSettings,
    events: broadcast::Sender<SuggestionEvent>,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Engine {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn CompletionProvider>,
        embedder: Arc<dyn Embedder>,
        settings: EngineSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            chunks,
            sessions,
            fallback_sessions: Arc::new(InMemoryStore::new()),
            degraded: AtomicBool::new(false),
            provider,
            embedder,
            settings,
            events,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Subscribe to suggestion status transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SuggestionEvent> {
        self.events.subscribe()
    }

    /// True once the engine has fallen back to the in-memory session store.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn session_store(&self) -> &dyn SessionStore {
        if self.is_degraded() {
            self.fallback_sessions.as_ref()
        } else {
            self.sessions.as_ref()
        }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn emit(&self, suggestion: &Suggestion) {
        let event = SuggestionEvent {
            suggestion_id: suggestion.id.clone(),
            status: suggestion.status,
            text: suggestion.raw_text.clone(),
            confidence: suggestion.confidence,
            reason: suggestion.reason,
            degraded: self.is_degraded(),
        };
        if gate::applies_edit(suggestion.status) {
            info!(
                suggestion_id = %suggestion.id,
                status = suggestion.status.as_str(),
                confidence = suggestion.confidence,
                "apply signal for editor collaborator"
            );
        }
        // No receivers is fine; events are best-effort.
        let _ = self.events.send(event);
    }

    async fn get_or_create_session(&self, project_id: &str, now: i64) -> Result<Session> {
        if !self.is_degraded() {
            match self.sessions.get_or_create(project_id, now).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!(
                        error = %format!("{e:#}"),
                        "session store unreachable, falling back to in-memory sessions"
                    );
                    self.degraded.store(true, Ordering::Relaxed);
                }
            }
        }
        self.fallback_sessions.get_or_create(project_id, now).await
    }

    // ============ Indexing ============

    /// File-watcher collaborator entry point: chunk, diff by hash, upsert,
    /// and embed what changed. Embedding failure is contained — affected
    /// chunks are marked stale and retried on the next index pass.
    pub async fn on_file_changed(
        &self,
        project_id: &str,
        file_path: &str,
        content: &str,
    ) -> Result<UpsertOutcome> {
        let drafts = chunk_code(
            content,
            self.settings.chunk_max_tokens,
            self.settings.chunk_overlap_tokens,
        );
        let outcome = self
            .chunks
            .upsert_file(project_id, file_path, &drafts, Self::now())
            .await?;

        if outcome.is_noop() {
            debug!(file_path, "content unchanged, index no-op");
            return Ok(outcome);
        }

        if self.embedder.is_enabled() {
            let (embedded, failed) = self.embed_pending(Some(project_id), None).await?;
            debug!(file_path, embedded, failed, "inline embedding pass");
        }
        Ok(outcome)
    }

    /// Embed every live chunk still missing a current vector. Returns
    /// `(embedded, failed)`; failed chunks are marked stale and excluded
    /// from retrieval until a later pass succeeds.
    pub async fn embed_pending(
        &self,
        project_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<(u64, u64)> {
        if !self.embedder.is_enabled() {
            return Ok((0, 0));
        }

        let pending = self.chunks.pending_embeddings(project_id, limit).await?;
        if pending.is_empty() {
            return Ok((0, 0));
        }

        let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
        match self.embedder.embed(&texts).await {
            Ok(vectors) => {
                let mut embedded = 0u64;
                for (chunk, vector) in pending.iter().zip(vectors.iter()) {
                    self.chunks
                        .store_embedding(
                            chunk.id,
                            vector,
                            self.embedder.model_name(),
                            self.embedder.dims(),
                            &chunk.content_hash,
                        )
                        .await?;
                    embedded += 1;
                }
                Ok((embedded, 0))
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "embedding batch failed, marking chunks stale");
                for chunk in &pending {
                    if let Err(e) = self.chunks.mark_stale(chunk.id).await {
                        warn!(chunk_id = chunk.id, error = %format!("{e:#}"), "mark_stale failed");
                    }
                }
                Ok((0, pending.len() as u64))
            }
        }
    }

    // ============ Retrieval ============

    async fn embed_query(&self, text: &str) -> Option<Vec<f32>> {
        if !self.embedder.is_enabled() {
            return None;
        }
        match self.embedder.embed_query(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                // Missing context is a low-confidence signal, not a failure.
                warn!(error = %format!("{e:#}"), "query embedding failed, retrieving nothing");
                None
            }
        }
    }

    /// Retrieval without the rest of the pipeline, for debugging and the
    /// `sgate retrieve` command.
    pub async fn retrieve_context(
        &self,
        project_id: &str,
        query_text: &str,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_vec = self.embed_query(query_text).await;
        retrieve(
            self.chunks.as_ref(),
            project_id,
            query_vec.as_deref(),
            &[],
            &self.settings.retrieval,
        )
        .await
    }

    // ============ Submit pipeline ============

    pub async fn submit_query(&self, request: QueryRequest) -> Result<Suggestion> {
        self.submit_query_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Full pipeline for one query. `cancel` fires when the submitting
    /// client disconnects; an in-flight model call is abandoned and the
    /// suggestion recorded as rejected with reason `client_disconnected`.
    pub async fn submit_query_with_cancel(
        &self,
        request: QueryRequest,
        cancel: CancellationToken,
    ) -> Result<Suggestion> {
        let session = match request.session_id.as_deref() {
            Some(id) => self.session_store().session(id).await.ok().flatten(),
            None => None,
        };
        let session = match session {
            Some(session) => session,
            None => {
                self.get_or_create_session(&request.project_id, Self::now())
                    .await?
            }
        };

        // Within a session, suggestions are created and gated in order.
        let session_lock = {
            let mut locks = self.session_locks.lock().await;
            locks
                .entry(session.id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _ordering_guard = session_lock.lock().await;

        let embed_input = match &request.cursor {
            Some(cursor) => match &cursor.surrounding {
                Some(surrounding) => format!("{}\n{}", request.query_text, surrounding),
                None => request.query_text.clone(),
            },
            None => request.query_text.clone(),
        };
        let query_vec = self.embed_query(&embed_input).await;

        let recent_files = self
            .session_store()
            .recent_files(&session.id, self.settings.retrieval.recency_window)
            .await
            .unwrap_or_default();

        let context = retrieve(
            self.chunks.as_ref(),
            &request.project_id,
            query_vec.as_deref(),
            &recent_files,
            &self.settings.retrieval,
        )
        .await?;
        let relevance_top1 = context.first().map(|c| c.relevance).unwrap_or(0.0);

        let prompt = build_prompt(&request.query_text, &context, self.settings.max_prompt_tokens);
        let target = request.cursor.as_ref().map(|c| EditTarget {
            file_path: c.file_path.clone(),
            start_line: c.start_line,
            end_line: c.end_line,
        });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => CallOutcome::Cancelled,
            result = tokio::time::timeout(
                self.settings.provider_timeout,
                self.provider.complete(&prompt),
            ) => match result {
                Err(_) => CallOutcome::TimedOut,
                Ok(Ok(completion)) => CallOutcome::Done(completion),
                Ok(Err(e)) => CallOutcome::Failed(format!("{e:#}")),
            },
        };

        let (status, reason, confidence, raw_text) = match outcome {
            CallOutcome::Cancelled => {
                debug!(session_id = %session.id, "client disconnected mid-inference");
                (
                    SuggestionStatus::Rejected,
                    Some(RejectReason::ClientDisconnected),
                    0.0,
                    String::new(),
                )
            }
            CallOutcome::TimedOut => {
                let err = EngineError::ProviderTimeout {
                    timeout_secs: self.settings.provider_timeout.as_secs(),
                };
                warn!(session_id = %session.id, error = %err, "model call timed out");
                (
                    SuggestionStatus::Rejected,
                    Some(RejectReason::ProviderTimeout),
                    0.0,
                    String::new(),
                )
            }
            CallOutcome::Failed(message) => {
                warn!(session_id = %session.id, error = %message, "model call failed");
                (
                    SuggestionStatus::Rejected,
                    Some(RejectReason::ProviderError),
                    0.0,
                    String::new(),
                )
            }
            CallOutcome::Done(completion) => {
                let stats = self
                    .session_store()
                    .acceptance_stats(&request.project_id)
                    .await
                    .unwrap_or_default();
                let confidence = score(
                    completion.raw_signal,
                    relevance_top1,
                    &stats,
                    &self.settings.weights,
                    &self.settings.smoothing,
                );

                let mut status = gate::decide(confidence, &self.settings.thresholds).initial_status();
                let mut reason = (status == SuggestionStatus::Rejected)
                    .then_some(RejectReason::LowConfidence);

                // Only one awaiting suggestion per edit target per session;
                // a second overlapping one is stale on arrival.
                if status == SuggestionStatus::AwaitingApproval {
                    if let Some(target) = &target {
                        let awaiting =
                            self.session_store().awaiting_in_session(&session.id).await?;
                        let overlapping = awaiting.iter().any(|s| {
                            s.target.as_ref().map_or(false, |t| t.overlaps(target))
                        });
                        if overlapping {
                            status = SuggestionStatus::Rejected;
                            reason = Some(RejectReason::StaleOverlap);
                        }
                    }
                }

                (status, reason, confidence, completion.text)
            }
        };

        let created_at = Self::now();
        let suggestion = Suggestion {
            id: Uuid::new_v4().to_string(),
            project_id: request.project_id.clone(),
            session_id: session.id.clone(),
            target,
            prompt_context: prompt,
            raw_text,
            confidence,
            status,
            reason,
            created_at,
            resolved_at: status.is_terminal().then_some(created_at),
        };

        self.insert_suggestion(&suggestion).await?;
        self.emit(&suggestion);
        Ok(suggestion)
    }

    async fn insert_suggestion(&self, suggestion: &Suggestion) -> Result<()> {
        if !self.is_degraded() {
            match self.sessions.insert_suggestion(suggestion).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        error = %format!("{e:#}"),
                        "session store write failed, falling back to in-memory sessions"
                    );
                    self.degraded.store(true, Ordering::Relaxed);
                }
            }
        }
        self.fallback_sessions.insert_suggestion(suggestion).await
    }

    // ============ Approval lifecycle ============

    /// Human decision relayed by the front end.
    ///
    /// A decision arriving after the suggestion already reached a terminal
    /// state (the human raced the expiry sweep, or double-clicked) is a
    /// logged no-op returning the settled record.
    pub async fn respond_to_approval(
        &self,
        suggestion_id: &str,
        decision: ApprovalDecision,
    ) -> Result<Suggestion> {
        let store = self.session_store();
        let existing = store
            .suggestion(suggestion_id)
            .await?
            .ok_or_else(|| EngineError::SuggestionNotFound(suggestion_id.to_string()))?;

        let (to, reason) = match decision {
            ApprovalDecision::Approve => (SuggestionStatus::Approved, None),
            ApprovalDecision::Decline => {
                (SuggestionStatus::Rejected, Some(RejectReason::HumanDeclined))
            }
        };

        let committed = store
            .resolve_suggestion(suggestion_id, to, reason, Self::now())
            .await?;
        let settled = store.suggestion(suggestion_id).await?.unwrap_or(existing);

        if !committed {
            let conflict = EngineError::StaleApprovalConflict {
                suggestion_id: suggestion_id.to_string(),
                status: settled.status,
            };
            warn!(error = %conflict, "ignoring stale approval response");
            return Ok(settled);
        }

        self.emit(&settled);
        Ok(settled)
    }

    /// Expire awaiting suggestions whose approval window has passed.
    ///
    /// Runs periodically in serve mode. Racing a concurrent human response
    /// is safe: the conditional store update resolves each suggestion
    /// exactly once.
    pub async fn expire_overdue(&self) -> Result<Vec<Suggestion>> {
        let now = Self::now();
        let cutoff = now - self.settings.approval_timeout.as_secs() as i64;
        let store = self.session_store();

        let mut expired = Vec::new();
        for suggestion in store.overdue_approvals(cutoff).await? {
            if store
                .resolve_suggestion(&suggestion.id, SuggestionStatus::Expired, None, now)
                .await?
            {
                if let Some(settled) = store.suggestion(&suggestion.id).await? {
                    self.emit(&settled);
                    expired.push(settled);
                }
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "expired overdue approvals");
        }
        Ok(expired)
    }

    // ============ Session maintenance ============

    pub async fn suggestion(&self, suggestion_id: &str) -> Result<Option<Suggestion>> {
        self.session_store().suggestion(suggestion_id).await
    }

    pub async fn session_history(&self, session_id: &str) -> Result<Vec<Suggestion>> {
        self.session_store().session_history(session_id).await
    }

    pub async fn list_sessions(&self, project_id: Option<&str>) -> Result<Vec<Session>> {
        self.session_store().list_sessions(project_id).await
    }

    pub async fn acceptance_stats(&self, project_id: &str) -> Result<AcceptanceStats> {
        self.session_store().acceptance_stats(project_id).await
    }

    pub async fn prune_sessions(&self) -> Result<PruneOutcome> {
        self.session_store()
            .prune(&self.settings.prune, Self::now())
            .await
    }
}
