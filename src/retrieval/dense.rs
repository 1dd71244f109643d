//! The dense (vector-similarity) index client.
//!
//! A lazily-loaded, process-wide-shareable index over unit-normalized embeddings that
//! reports `ready` rather than erroring when its artifacts are absent. Construction
//! itself is the load, not a background warm-up, so no `OnceLock` guard is needed here.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::TrialRankError;

/// Maps free text to a vector. The core L2-normalizes the output before search.
pub trait Encoder: Send + Sync {
    fn dimension(&self) -> usize;
    fn encode(&self, text: &str) -> Vec<f32>;
}

/// Deterministic feature-hashing encoder: a placeholder sentence encoder that needs no
/// model weights, standing in for the real `model_name`-identified encoder the
/// metadata sidecar names. Concrete ML-backed encoders are configuration, the same
/// way the concept linker is.
pub struct HashingEncoder {
    dimension: usize,
}

impl HashingEncoder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn hash_token(token: &str, dimension: usize) -> (usize, f32) {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        let bucket = (hash % dimension as u64) as usize;
        let sign = if (hash >> 63) & 1 == 1 { -1.0 } else { 1.0 };
        (bucket, sign)
    }
}

impl Encoder for HashingEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let (bucket, sign) = Self::hash_token(token, self.dimension);
            vector[bucket] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum()
}

/// Contract for the dense index: `search(query_text, k) -> ordered
/// (nct_id, cosine_similarity)`. `is_ready` reports whether the artifacts loaded; the
/// orchestrator treats "not ready" as skip-dense rather than an error.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    fn is_ready(&self) -> bool;
    async fn search(&self, query_text: &str, k: usize) -> Vec<(String, f64)>;
}

#[derive(Debug, Deserialize)]
struct DenseMeta {
    nct_ids: Vec<String>,
    #[allow(dead_code)]
    model_name: String,
    dimension: usize,
}

/// Flat inner-product index over unit-normalized float32 vectors, held fully in
/// memory. `None` when artifacts are absent or fail to parse — "not ready" is
/// reported, not an error.
pub struct FlatInnerProductIndex {
    encoder: Box<dyn Encoder>,
    loaded: Option<LoadedArtifacts>,
}

struct LoadedArtifacts {
    nct_ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl FlatInnerProductIndex {
    /// Builds a not-ready index that always reports no artifacts; useful when no
    /// dense backend is configured at all.
    pub fn not_ready(encoder: Box<dyn Encoder>) -> Self {
        Self {
            encoder,
            loaded: None,
        }
    }

    /// Loads a vector file (raw little-endian f32, `nct_ids.len() * dimension`
    /// entries) and its JSON metadata sidecar. Returns a not-ready index rather than
    /// an error when the files are missing or malformed.
    pub fn load(vector_path: &Path, meta_path: &Path, encoder: Box<dyn Encoder>) -> Self {
        let loaded = Self::try_load(vector_path, meta_path, encoder.dimension());
        Self { encoder, loaded }
    }

    fn try_load(vector_path: &Path, meta_path: &Path, expected_dim: usize) -> Option<LoadedArtifacts> {
        let meta_raw = std::fs::read_to_string(meta_path).ok()?;
        let meta: DenseMeta = serde_json::from_str(&meta_raw).ok()?;
        if meta.dimension != expected_dim || meta.nct_ids.is_empty() {
            return None;
        }
        let bytes = std::fs::read(vector_path).ok()?;
        let expected_len = meta.nct_ids.len() * meta.dimension * 4;
        if bytes.len() != expected_len {
            return None;
        }
        let mut vectors = Vec::with_capacity(meta.nct_ids.len());
        for chunk in bytes.chunks_exact(meta.dimension * 4) {
            let vector: Vec<f32> = chunk
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            vectors.push(vector);
        }
        Some(LoadedArtifacts {
            nct_ids: meta.nct_ids,
            vectors,
        })
    }

    /// Builds an index directly from in-memory vectors, for tests and for embedding
    /// pipelines that keep the index resident without round-tripping through files.
    pub fn from_vectors(nct_ids: Vec<String>, mut vectors: Vec<Vec<f32>>, encoder: Box<dyn Encoder>) -> Self {
        for vector in &mut vectors {
            l2_normalize(vector);
        }
        Self {
            encoder,
            loaded: Some(LoadedArtifacts { nct_ids, vectors }),
        }
    }
}

#[async_trait]
impl DenseIndex for FlatInnerProductIndex {
    fn is_ready(&self) -> bool {
        self.loaded.is_some()
    }

    async fn search(&self, query_text: &str, k: usize) -> Vec<(String, f64)> {
        let Some(loaded) = &self.loaded else {
            return Vec::new();
        };
        if query_text.is_empty() {
            return Vec::new();
        }
        let query_vector = self.encoder.encode(query_text);
        let mut scored: Vec<(String, f64)> = loaded
            .nct_ids
            .iter()
            .zip(loaded.vectors.iter())
            .map(|(id, vector)| (id.clone(), cosine(&query_vector, vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_encoder_output_is_unit_norm() {
        let encoder = HashingEncoder::new(32);
        let vector = encoder.encode("non small cell lung cancer egfr");
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5 || norm == 0.0);
    }

    #[test]
    fn hashing_encoder_is_deterministic() {
        let encoder = HashingEncoder::new(16);
        assert_eq!(encoder.encode("nsclc egfr"), encoder.encode("nsclc egfr"));
    }

    #[tokio::test]
    async fn not_ready_index_returns_empty_without_error() {
        let index = FlatInnerProductIndex::not_ready(Box::new(HashingEncoder::new(8)));
        assert!(!index.is_ready());
        assert!(index.search("anything", 5).await.is_empty());
    }

    #[tokio::test]
    async fn search_ranks_closer_vector_first() {
        let encoder = HashingEncoder::new(8);
        let target = encoder.encode("nsclc egfr mutation");
        let other = encoder.encode("completely unrelated text about cardiology");
        let index = FlatInnerProductIndex::from_vectors(
            vec!["NCT_OTHER".to_string(), "NCT_TARGET".to_string()],
            vec![other, target],
            Box::new(HashingEncoder::new(8)),
        );
        let hits = index.search("nsclc egfr mutation", 2).await;
        assert_eq!(hits[0].0, "NCT_TARGET");
    }

    #[tokio::test]
    async fn empty_query_text_returns_empty() {
        let encoder = HashingEncoder::new(8);
        let vector = encoder.encode("x");
        let index = FlatInnerProductIndex::from_vectors(
            vec!["NCT01".to_string()],
            vec![vector],
            Box::new(HashingEncoder::new(8)),
        );
        assert!(index.search("", 5).await.is_empty());
    }

    #[test]
    fn load_reports_not_ready_when_files_are_missing() {
        let index = FlatInnerProductIndex::load(
            Path::new("/nonexistent/vectors.bin"),
            Path::new("/nonexistent/meta.json"),
            Box::new(HashingEncoder::new(8)),
        );
        assert!(!index.is_ready());
    }
}
