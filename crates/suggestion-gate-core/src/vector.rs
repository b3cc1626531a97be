//! Embedding vector helpers.
//!
//! Pure functions shared by the stores and the retriever: cosine
//! similarity for ranking, and the little-endian `f32` BLOB encoding used
//! to persist vectors in SQLite.

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, mismatched lengths, or zero-magnitude
/// inputs, so a malformed stored vector ranks last instead of poisoning
/// the ordering.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denom = mag_a * mag_b;
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Map a raw cosine similarity to a relevance score in `[0, 1]`.
///
/// Negative similarity carries no useful ranking information for text
/// embeddings, so it floors at zero rather than stretching the scale.
pub fn similarity_to_relevance(sim: f32) -> f64 {
    (sim as f64).clamp(0.0, 1.0)
}

/// Encode a vector as 4-byte little-endian `f32`s for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`]. Trailing partial values are
/// dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
