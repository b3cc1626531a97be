//! Retrieval ranking with recency boosting.
//!
//! The ranking algorithm operates entirely through the [`ChunkStore`]
//! trait, with no database or configuration dependencies. The calling
//! application is responsible for embedding the query text and supplying
//! the session's recently touched files.
//!
//! # Algorithm
//!
//! 1. Fetch similarity candidates from the store (over-fetched so boosting
//!    can reorder beyond the final cut).
//! 2. Map raw cosine similarity to relevance in `[0, 1]`.
//! 3. Multiply the relevance of chunks from recently touched files by the
//!    configured boost (capped at [`RECENCY_BOOST_CAP`]), clamping back
//!    into `[0, 1]` — the developer's current focus outranks stale matches,
//!    but boosting never manufactures certainty.
//! 4. Sort by relevance (desc), last_indexed_at (desc), id (asc); truncate
//!    to `top_k`.
//!
//! A missing query embedding or an empty store yields an empty result,
//! never an error: callers treat absent context as a valid low-confidence
//! signal.

use anyhow::Result;

use crate::models::RetrievedChunk;
use crate::store::ChunkStore;
use crate::vector::similarity_to_relevance;

/// Hard upper bound on the recency multiplier, whatever the configuration
/// says.
pub const RECENCY_BOOST_CAP: f64 = 1.2;

/// Over-fetch factor applied before boosting and the final cut.
const CANDIDATE_FACTOR: i64 = 4;

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Number of chunks to return.
    pub top_k: i64,
    /// Multiplicative bonus for chunks from recently touched files.
    pub recency_boost: f64,
    /// How many of the session's most recent interactions define "recently
    /// touched".
    pub recency_window: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 8,
            recency_boost: 1.15,
            recency_window: 5,
        }
    }
}

/// Rank the most relevant chunks for a query embedding.
///
/// `recent_files` is the output of the session store's recency window —
/// the caller applies `recency_window` there. `query_vec = None` (no
/// embedding backend, or the query could not be embedded) returns an empty
/// result.
pub async fn retrieve<S: ChunkStore + ?Sized>(
    store: &S,
    project_id: &str,
    query_vec: Option<&[f32]>,
    recent_files: &[String],
    params: &RetrievalParams,
) -> Result<Vec<RetrievedChunk>> {
    let Some(query_vec) = query_vec else {
        return Ok(Vec::new());
    };
    if params.top_k <= 0 {
        return Ok(Vec::new());
    }

    let candidates = store
        .query(
            project_id,
            query_vec,
            params.top_k.saturating_mul(CANDIDATE_FACTOR),
        )
        .await?;

    let boost = params.recency_boost.clamp(1.0, RECENCY_BOOST_CAP);

    let mut ranked: Vec<(RetrievedChunk, i64)> = candidates
        .into_iter()
        .map(|c| {
            let mut relevance = similarity_to_relevance(c.raw_score as f32);
            if recent_files.iter().any(|f| f == &c.file_path) {
                relevance = (relevance * boost).min(1.0);
            }
            (
                RetrievedChunk {
                    chunk_id: c.chunk_id,
                    file_path: c.file_path,
                    text: c.text,
                    relevance,
                },
                c.last_indexed_at,
            )
        })
        .collect();

    ranked.sort_by(|(a, a_ts), (b, b_ts)| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b_ts.cmp(a_ts))
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    ranked.truncate(params.top_k as usize);

    Ok(ranked.into_iter().map(|(chunk, _)| chunk).collect())
}
