//! Merchant-name clustering.
//!
//! Names are turned into a symmetric pairwise [`DistanceMatrix`] by a
//! [`DistanceMetric`] and grouped with DBSCAN over that precomputed matrix.
//! Two metrics exist: [`StringMetric`] here (normalized Levenshtein) and the
//! embedding metric in the app crate (cosine distance over cached vectors).
//!
//! [`visible_clusters`] turns raw clusters into merge suggestions: only
//! clusters touching a name in use are kept, and confirmed-distinct pairs
//! are never left in the same group.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};

use crate::normalize::{DistinctPairSet, NormalizationMap};

/// Default `eps` for the string metric (80% similarity).
pub const DEFAULT_STRING_THRESHOLD: f64 = 0.2;
/// Default `eps` for the embedding metric.
pub const DEFAULT_EMBEDDING_THRESHOLD: f64 = 0.05;
/// Minimum similarity for a cached name to be suggested.
pub const SUGGEST_THRESHOLD: f64 = 0.35;

/// Symmetric `n × n` distance matrix with a zero diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    /// Build from a pairwise function evaluated once per unordered pair.
    pub fn from_fn(n: usize, mut distance: impl FnMut(usize, usize) -> f64) -> Self {
        let mut matrix = Self::zeros(n);
        for i in 0..n {
            for j in i + 1..n {
                matrix.set(i, j, distance(i, j));
            }
        }
        matrix
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    /// Set both `(i, j)` and `(j, i)`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n + j] = value;
        self.data[j * self.n + i] = value;
    }
}

/// Pairwise distance between names.
#[async_trait]
pub trait DistanceMetric: Send + Sync {
    /// Human-readable label for reports.
    fn label(&self) -> &str;

    /// Distances in `[0, 1]`-ish space between every pair of `names`.
    async fn distances(&self, names: &[String]) -> Result<DistanceMatrix>;
}

/// `1 - normalized Levenshtein similarity`. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringMetric;

#[async_trait]
impl DistanceMetric for StringMetric {
    fn label(&self) -> &str {
        "String similarity (Levenshtein)"
    }

    async fn distances(&self, names: &[String]) -> Result<DistanceMatrix> {
        Ok(DistanceMatrix::from_fn(names.len(), |i, j| {
            1.0 - levenshtein_similarity(&names[i], &names[j])
        }))
    }
}

/// Character-level edit distance.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut row = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        row[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            row[j] = (prev[j] + 1).min(row[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// `1 - edits / max(len)`; two empty strings are identical.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// DBSCAN over a precomputed distance matrix.
///
/// A point is a neighbour of another when their distance is `<= eps`; a
/// point's neighbourhood includes itself. Returns clusters as index lists in
/// discovery order. Noise points are dropped.
pub fn dbscan(matrix: &DistanceMatrix, eps: f64, min_samples: usize) -> Vec<Vec<usize>> {
    let n = matrix.len();
    let neighbours =
        |p: usize| -> Vec<usize> { (0..n).filter(|&q| matrix.get(p, q) <= eps).collect() };

    let mut label: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for p in 0..n {
        if visited[p] {
            continue;
        }
        visited[p] = true;
        let seeds = neighbours(p);
        if seeds.len() < min_samples {
            continue;
        }

        let id = clusters.len();
        clusters.push(vec![p]);
        label[p] = Some(id);

        let mut queue = seeds;
        let mut k = 0;
        while k < queue.len() {
            let q = queue[k];
            k += 1;
            if label[q].is_none() {
                label[q] = Some(id);
                clusters[id].push(q);
            }
            if visited[q] {
                continue;
            }
            visited[q] = true;
            let expansion = neighbours(q);
            if expansion.len() >= min_samples {
                queue.extend(expansion);
            }
        }
    }

    for cluster in &mut clusters {
        cluster.sort_unstable();
    }
    clusters
}

/// Cluster `names` with `metric` at threshold `eps` (`min_samples = 2`).
pub async fn cluster_names<M: DistanceMetric + ?Sized>(
    metric: &M,
    names: &[String],
    eps: f64,
) -> Result<Vec<Vec<String>>> {
    if names.len() < 2 {
        return Ok(Vec::new());
    }
    let matrix = metric.distances(names).await?;
    Ok(dbscan(&matrix, eps, 2)
        .into_iter()
        .map(|cluster| cluster.into_iter().map(|i| names[i].clone()).collect())
        .collect())
}

/// Turn raw clusters into groups worth offering for a merge.
///
/// A cluster is kept only if it contains a name some decision uses. Each
/// kept cluster is split greedily so that no group holds two names whose
/// normalization classes contain a confirmed distinct pair; groups of two or
/// more are returned.
pub fn visible_clusters(
    clusters: Vec<Vec<String>>,
    decision_names: &BTreeSet<String>,
    distinct: &DistinctPairSet,
    normalizations: &NormalizationMap,
) -> Vec<Vec<String>> {
    let mut visible = Vec::new();
    for cluster in clusters {
        if !cluster.iter().any(|name| decision_names.contains(name)) {
            continue;
        }
        let mut groups: Vec<Vec<String>> = Vec::new();
        for name in cluster {
            let home = groups
                .iter_mut()
                .find(|group| {
                    group
                        .iter()
                        .all(|member| !distinct.separates(normalizations, member, &name))
                });
            match home {
                Some(group) => group.push(name),
                None => groups.push(vec![name]),
            }
        }
        visible.extend(groups.into_iter().filter(|group| group.len() >= 2));
    }
    visible
}

/// Names within `threshold` of `query`, nearest first, at most `top_n`.
pub async fn similar_names<M: DistanceMetric + ?Sized>(
    metric: &M,
    query: &str,
    names: &[String],
    threshold: f64,
    top_n: usize,
) -> Result<Vec<(String, f64)>> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    let mut all = vec![query.to_string()];
    all.extend(names.iter().filter(|n| n.as_str() != query).cloned());
    if all.len() < 2 {
        return Ok(Vec::new());
    }

    let matrix = metric.distances(&all).await?;
    let mut hits: Vec<(String, f64)> = (1..all.len())
        .map(|j| (all[j].clone(), matrix.get(0, j)))
        .filter(|(_, d)| *d <= threshold)
        .collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    hits.truncate(top_n);
    Ok(hits)
}

/// Confirmed names whose extracted spelling resembles `query`.
///
/// `pairs` are `(extracted, confirmed)` name pairs recorded at archive
/// time. Matches with similarity >= [`SUGGEST_THRESHOLD`] are ranked by
/// similarity and each confirmed name appears once, at its best match; equal
/// similarities keep the order of `pairs`. Also returns the best similarity
/// seen.
pub fn suggest_names<'a, I>(query: &str, pairs: I, top_n: usize) -> (Vec<String>, Option<f64>)
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    if query.is_empty() {
        return (Vec::new(), None);
    }
    let mut scored: Vec<(f64, &str)> = pairs
        .into_iter()
        .map(|(extracted, confirmed)| (levenshtein_similarity(query, extracted), confirmed))
        .filter(|(sim, _)| *sim >= SUGGEST_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    let best = scored.first().map(|(sim, _)| *sim);

    let mut seen: HashSet<&str> = HashSet::new();
    let mut order: Vec<&str> = Vec::new();
    for &(_, confirmed) in &scored {
        if seen.insert(confirmed) {
            order.push(confirmed);
        }
    }
    order.truncate(top_n);
    (order.into_iter().map(str::to_string).collect(), best)
}
