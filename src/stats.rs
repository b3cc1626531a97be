//! Database statistics and health overview.
//!
//! Provides a quick summary of engine state: chunk counts, embedding
//! coverage, session counts, and per-project gate outcomes. Used by
//! `sgate stats` to give confidence that indexing, scoring, and gating are
//! working as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-project breakdown of suggestion outcomes.
struct ProjectStats {
    project_id: String,
    chunk_count: i64,
    embedded_count: i64,
    suggested: i64,
    accepted: i64,
    rejected: i64,
    awaiting: i64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_chunks: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE superseded = 0")
            .fetch_one(&pool)
            .await?;

    let total_embedded: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM chunks c
         JOIN embeddings e ON e.chunk_id = c.id AND e.content_hash = c.content_hash
         WHERE c.superseded = 0",
    )
    .fetch_one(&pool)
    .await?;

    let total_stale: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE superseded = 0 AND stale = 1")
            .fetch_one(&pool)
            .await?;

    let total_sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
        .fetch_one(&pool)
        .await?;

    let total_awaiting: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM suggestions WHERE status = 'awaiting_approval'",
    )
    .fetch_one(&pool)
    .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Suggestion Gate — Engine Stats");
    println!("==============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Live chunks: {}", total_chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        total_embedded,
        total_chunks,
        if total_chunks > 0 {
            (total_embedded * 100) / total_chunks
        } else {
            0
        }
    );
    if total_stale > 0 {
        println!("  Stale:       {}", total_stale);
    }
    println!("  Sessions:    {}", total_sessions);
    println!("  Awaiting:    {}", total_awaiting);

    // Per-project breakdown
    let project_rows = sqlx::query(
        r#"
        SELECT
            s.project_id,
            s.total_suggested,
            s.total_accepted,
            s.total_rejected,
            (SELECT COUNT(*) FROM chunks c WHERE c.project_id = s.project_id AND c.superseded = 0) AS chunk_count,
            (SELECT COUNT(*) FROM chunks c
               JOIN embeddings e ON e.chunk_id = c.id AND e.content_hash = c.content_hash
               WHERE c.project_id = s.project_id AND c.superseded = 0) AS embedded_count,
            (SELECT COUNT(*) FROM suggestions g
               WHERE g.project_id = s.project_id AND g.status = 'awaiting_approval') AS awaiting
        FROM acceptance_stats s
        ORDER BY s.total_suggested DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let project_stats: Vec<ProjectStats> = project_rows
        .iter()
        .map(|row| ProjectStats {
            project_id: row.get("project_id"),
            chunk_count: row.get("chunk_count"),
            embedded_count: row.get("embedded_count"),
            suggested: row.get("total_suggested"),
            accepted: row.get("total_accepted"),
            rejected: row.get("total_rejected"),
            awaiting: row.get("awaiting"),
        })
        .collect();

    if !project_stats.is_empty() {
        println!();
        println!("  By project:");
        println!(
            "  {:<20} {:>7} {:>9} {:>10} {:>9} {:>9} {:>9}",
            "PROJECT", "CHUNKS", "EMBEDDED", "SUGGESTED", "ACCEPTED", "REJECTED", "AWAITING"
        );
        println!("  {}", "-".repeat(78));

        for s in &project_stats {
            println!(
                "  {:<20} {:>7} {:>9} {:>10} {:>9} {:>9} {:>9}",
                s.project_id,
                s.chunk_count,
                s.embedded_count,
                s.suggested,
                s.accepted,
                s.rejected,
                s.awaiting
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
