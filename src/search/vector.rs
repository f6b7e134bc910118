use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::llm::embeddings::Embedder;
use crate::models::Document;
use crate::search::Retriever;

const STORE_FILE: &str = "vectors.json";

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub document: Document,
    pub embedding: Vec<f32>,
}

/// Read-only vector store loaded from disk, searched by cosine similarity.
pub struct VectorStore {
    entries: Vec<VectorEntry>,
    persist_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub document: Document,
    pub score: f32,
}

impl VectorStore {
    /// Open a persisted store. A missing directory or store file is an error:
    /// the index has to be built before the assistant can start.
    pub fn open(vector_dir: &Path) -> Result<Self> {
        if !vector_dir.is_dir() {
            anyhow::bail!(
                "Vector index directory {} not found (run `pcos-rag index` first)",
                vector_dir.display()
            );
        }
        let persist_path = vector_dir.join(STORE_FILE);
        let data = std::fs::read_to_string(&persist_path)
            .with_context(|| format!("Failed to read vector store {}", persist_path.display()))?;
        let entries: Vec<VectorEntry> = serde_json::from_str(&data)
            .with_context(|| format!("Corrupt vector store {}", persist_path.display()))?;

        Ok(Self {
            entries,
            persist_path,
        })
    }

    /// Write a new store to `vector_dir`, replacing any previous one
    /// (atomic write via temp file + rename).
    pub fn create(vector_dir: &Path, entries: Vec<VectorEntry>) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)?;
        let persist_path = vector_dir.join(STORE_FILE);
        let tmp_path = persist_path.with_extension("json.tmp");

        let data = serde_json::to_string(&entries)?;
        std::fs::write(&tmp_path, data)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &persist_path)
            .with_context(|| format!("Failed to move vector store into {}", persist_path.display()))?;

        Ok(Self {
            entries,
            persist_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.persist_path
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Search by cosine similarity against a query embedding.
    pub fn search(&self, query_embedding: &[f32], limit: usize) -> Vec<VectorHit> {
        self.ranked(query_embedding, limit)
            .into_iter()
            .map(|(score, e)| VectorHit {
                document: e.document.clone(),
                score,
            })
            .collect()
    }

    /// Maximal marginal relevance: take the `fetch_k` most similar entries,
    /// then greedily pick `k` of them trading query similarity against
    /// similarity to what was already picked.
    pub fn mmr_search(
        &self,
        query_embedding: &[f32],
        k: usize,
        fetch_k: usize,
        lambda_mult: f32,
    ) -> Vec<VectorHit> {
        let candidates = self.ranked(query_embedding, fetch_k);
        let embeddings: Vec<&[f32]> = candidates
            .iter()
            .map(|(_, e)| e.embedding.as_slice())
            .collect();

        maximal_marginal_relevance(query_embedding, &embeddings, k, lambda_mult)
            .into_iter()
            .map(|i| {
                let (score, entry) = candidates[i];
                VectorHit {
                    document: entry.document.clone(),
                    score,
                }
            })
            .collect()
    }

    fn ranked(&self, query_embedding: &[f32], limit: usize) -> Vec<(f32, &VectorEntry)> {
        let mut scored: Vec<(f32, &VectorEntry)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        // Sort descending by score
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(limit);
        scored
    }
}

/// Indices of the selected candidates, in selection order.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda_mult: f32,
) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }

    let to_query: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut best = 0;
    for (i, score) in to_query.iter().enumerate() {
        if *score > to_query[best] {
            best = i;
        }
    }
    let mut selected = vec![best];

    while selected.len() < k {
        let mut best_score = f32::NEG_INFINITY;
        let mut best_idx = None;

        for (i, query_score) in to_query.iter().enumerate() {
            if selected.contains(&i) {
                continue;
            }
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(candidates[i], candidates[s]))
                .fold(f32::NEG_INFINITY, f32::max);
            let score = lambda_mult * query_score - (1.0 - lambda_mult) * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(i) => selected.push(i),
            None => break,
        }
    }

    selected
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// MMR retriever over one corpus' vector store.
pub struct VectorRetriever {
    name: String,
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    k: usize,
    fetch_k: usize,
    lambda_mult: f32,
}

impl VectorRetriever {
    pub fn new(
        name: impl Into<String>,
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        k: usize,
        fetch_k: usize,
        lambda_mult: f32,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            embedder,
            k,
            fetch_k,
            lambda_mult,
        }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let query_embedding = self
            .embedder
            .embed_query(query)
            .await
            .with_context(|| format!("Failed to embed query for {}", self.name))?;

        Ok(self
            .store
            .mmr_search(&query_embedding, self.k, self.fetch_k, self.lambda_mult)
            .into_iter()
            .map(|hit| hit.document)
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
