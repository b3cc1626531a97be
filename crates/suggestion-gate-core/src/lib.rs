//! # Suggestion Gate Core
//!
//! Shared, runtime-free logic for Suggestion Gate: data models, the error
//! taxonomy, code chunking, confidence scoring, the gate state machine,
//! retrieval ranking, store abstractions, and vector helpers.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O. The
//! SQLite-backed stores, the model providers, and the serving layer live
//! in the `suggestion-gate` app crate; everything here is pure and
//! deterministic so the scoring and gating behavior can be tested without
//! a database or a model endpoint.

pub mod chunk;
pub mod error;
pub mod gate;
pub mod models;
pub mod retrieve;
pub mod score;
pub mod store;
pub mod vector;
