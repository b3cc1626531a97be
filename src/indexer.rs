//! Bulk project indexing.
//!
//! Walks a project root, applies include/exclude globs, and feeds every
//! matching file through the engine's `on_file_changed` path — the same
//! path the file-watcher collaborator uses for single-file events. Used by
//! `sgate index` for the initial sweep over a codebase.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::engine::Engine;

/// Summary of one indexing sweep.
#[derive(Debug, Default)]
pub struct IndexSummary {
    pub files_seen: u64,
    pub files_changed: u64,
    pub chunks_created: u64,
    pub chunks_invalidated: u64,
    pub embed_failures: u64,
}

/// Index every matching file under the configured root.
pub async fn index_project(
    engine: &Engine,
    config: &Config,
    project_id: &str,
    root_override: Option<&Path>,
) -> Result<IndexSummary> {
    let root = match root_override {
        Some(root) => root.to_path_buf(),
        None => config
            .indexing
            .root
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No indexing root configured; pass a path or set [indexing] root"))?,
    };
    if !root.exists() {
        bail!("Indexing root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.indexing.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.indexing.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = scan_files(&root, &include_set, &exclude_set)?;
    // Deterministic ordering across runs.
    files.sort();

    let mut summary = IndexSummary::default();
    for path in files {
        let relative = path
            .strip_prefix(&root)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            // Binary or unreadable files are skipped, not fatal.
            Err(_) => continue,
        };

        summary.files_seen += 1;
        let outcome = engine.on_file_changed(project_id, &relative, &content).await?;
        if !outcome.is_noop() {
            summary.files_changed += 1;
            summary.chunks_created += outcome.created.len() as u64;
            summary.chunks_invalidated += outcome.invalidated.len() as u64;
        }
    }

    // One catch-up pass for anything a failed inline batch left stale.
    let (_, failed) = engine.embed_pending(Some(project_id), None).await?;
    summary.embed_failures = failed;

    Ok(summary)
}

fn scan_files(root: &Path, include: &GlobSet, exclude: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude.is_match(rel_str.as_ref()) {
            continue;
        }
        if !include.is_match(rel_str.as_ref()) {
            continue;
        }

        files.push(path.to_path_buf());
    }
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
