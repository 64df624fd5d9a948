//! Embedding provider trait, vector math, and the name embedding cache.
//!
//! Concrete providers (Ollama, OpenAI) live in the `scanshelf` app crate.
//! This module only holds what the clustering code needs to reason about
//! vectors: similarity, distance, and the append-only cache that maps
//! merchant names to their vectors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality.
    fn dims(&self) -> usize;
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// `1 - cosine_similarity`, clamped to `[0.0, 2.0]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    (1.0 - cosine_similarity(a, b) as f64).clamp(0.0, 2.0)
}

/// Append-only table of name vectors, persisted as `name_embeddings.json`.
///
/// Entries are never rewritten. `names[i]` owns `vectors[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingCache {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub vectors: Vec<Vec<f32>>,
}

impl EmbeddingCache {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names not yet cached, deduplicated, in first-seen order.
    pub fn missing(&self, names: &[String]) -> Vec<String> {
        let mut seen: std::collections::HashSet<&str> =
            self.names.iter().map(String::as_str).collect();
        let mut missing = Vec::new();
        for name in names {
            if seen.insert(name.as_str()) {
                missing.push(name.clone());
            }
        }
        missing
    }

    /// Append vectors for new names. Already-cached names are ignored.
    pub fn append(&mut self, names: Vec<String>, vectors: Vec<Vec<f32>>) {
        for (name, vector) in names.into_iter().zip(vectors) {
            if self.names.contains(&name) {
                continue;
            }
            self.names.push(name);
            self.vectors.push(vector);
        }
    }

    pub fn vector(&self, name: &str) -> Option<&[f32]> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.vectors.get(i))
            .map(Vec::as_slice)
    }

    /// Name → vector lookup for a batch of queries.
    pub fn lookup(&self) -> HashMap<&str, &[f32]> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.vectors.iter().map(Vec::as_slice))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&v, &v) < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cache_is_append_only() {
        let mut cache = EmbeddingCache::default();
        cache.append(vec!["Cafe".into()], vec![vec![1.0, 0.0]]);
        cache.append(
            vec!["Cafe".into(), "Bakery".into()],
            vec![vec![9.0, 9.0], vec![0.0, 1.0]],
        );
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.vector("Cafe"), Some(&[1.0, 0.0][..]));
        assert_eq!(cache.vector("Bakery"), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn test_missing_dedupes_in_order() {
        let mut cache = EmbeddingCache::default();
        cache.append(vec!["a".into()], vec![vec![1.0]]);
        let names: Vec<String> = ["b", "a", "c", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(cache.missing(&names), vec!["b", "c"]);
    }
}
