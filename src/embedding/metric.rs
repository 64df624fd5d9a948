//! Cosine distance over cached name embeddings.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

use scanshelf_core::cluster::{DistanceMatrix, DistanceMetric};
use scanshelf_core::embedding::{cosine_distance, EmbeddingCache};

use super::{create_provider, embed_texts, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::persist::{load_embeddings, save_embeddings};

/// [`DistanceMetric`] backed by `name_embeddings.json`.
///
/// Names missing from the cache are embedded on demand and appended; cached
/// vectors are never recomputed.
pub struct EmbeddingMetric {
    config: EmbeddingConfig,
    provider: Box<dyn EmbeddingProvider>,
    state_dir: PathBuf,
    cache: Mutex<EmbeddingCache>,
    label: String,
}

impl EmbeddingMetric {
    pub fn new(config: &EmbeddingConfig, state_dir: impl Into<PathBuf>) -> Result<Self> {
        let provider = create_provider(config)?;
        let state_dir = state_dir.into();
        let cache = load_embeddings(&state_dir)?;
        let label = format!("Embedding (cosine, {})", provider.model_name());
        Ok(Self {
            config: config.clone(),
            provider,
            state_dir,
            cache: Mutex::new(cache),
            label,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, EmbeddingCache>> {
        self.cache
            .lock()
            .map_err(|_| anyhow!("embedding cache lock poisoned"))
    }

    /// Embed and persist any of `names` the cache has not seen.
    async fn ensure_cached(&self, names: &[String]) -> Result<()> {
        let missing = self.lock()?.missing(names);
        if missing.is_empty() {
            return Ok(());
        }
        let vectors = embed_texts(&self.config, &missing).await?;
        let mut cache = self.lock()?;
        let count = missing.len();
        cache.append(missing, vectors);
        save_embeddings(&self.state_dir, &cache)?;
        info!(
            added = count,
            total = cache.len(),
            dims = self.provider.dims(),
            "name embeddings cached"
        );
        Ok(())
    }
}

#[async_trait]
impl DistanceMetric for EmbeddingMetric {
    fn label(&self) -> &str {
        &self.label
    }

    async fn distances(&self, names: &[String]) -> Result<DistanceMatrix> {
        self.ensure_cached(names).await?;
        let cache = self.lock()?;
        let lookup = cache.lookup();
        let vectors = names
            .iter()
            .map(|name| {
                lookup
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| anyhow!("no embedding cached for '{}'", name))
            })
            .collect::<Result<Vec<&[f32]>>>()?;
        Ok(DistanceMatrix::from_fn(names.len(), |i, j| {
            cosine_distance(vectors[i], vectors[j])
        }))
    }
}
