use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::Document;
use crate::search::Retriever;

/// RRF constant
const RRF_K: f32 = 60.0;

/// Weighted reciprocal-rank fusion of several retrievers' ranked lists.
///
/// A document at 1-based rank `r` in list `i` contributes `wᵢ / (r + 60)`.
/// Lists are fused by rank rather than raw score, so a cosine similarity and
/// a BM25 score never have to be compared directly. Documents are keyed by
/// content; the first instance seen is the one returned.
pub fn weighted_rrf_fusion(ranked_lists: Vec<Vec<Document>>, weights: &[f32]) -> Vec<Document> {
    let mut order: Vec<Document> = Vec::new();
    let mut scores: HashMap<String, f32> = HashMap::new();

    for (list, weight) in ranked_lists.into_iter().zip(weights.iter()) {
        for (rank, doc) in list.into_iter().enumerate() {
            let rrf_score = weight / (rank as f32 + 1.0 + RRF_K);
            match scores.get_mut(&doc.content) {
                Some(score) => *score += rrf_score,
                None => {
                    scores.insert(doc.content.clone(), rrf_score);
                    order.push(doc);
                }
            }
        }
    }

    let mut fused: Vec<(f32, Document)> = order
        .into_iter()
        .map(|d| (scores.get(&d.content).copied().unwrap_or(0.0), d))
        .collect();

    // Stable: equal scores keep first-seen order.
    fused.sort_by(|a, b| b.0.total_cmp(&a.0));
    fused.into_iter().map(|(_, d)| d).collect()
}

/// Hybrid retriever: runs each member in turn and fuses their rankings with
/// fixed weights.
pub struct EnsembleRetriever {
    name: String,
    retrievers: Vec<Arc<dyn Retriever>>,
    weights: Vec<f32>,
}

impl EnsembleRetriever {
    pub fn new(
        name: impl Into<String>,
        retrievers: Vec<Arc<dyn Retriever>>,
        weights: Vec<f32>,
    ) -> Result<Self> {
        if retrievers.len() != weights.len() {
            anyhow::bail!(
                "Ensemble needs one weight per retriever ({} retrievers, {} weights)",
                retrievers.len(),
                weights.len()
            );
        }
        Ok(Self {
            name: name.into(),
            retrievers,
            weights,
        })
    }
}

#[async_trait]
impl Retriever for EnsembleRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let mut ranked_lists = Vec::with_capacity(self.retrievers.len());
        for retriever in &self.retrievers {
            let docs = retriever.retrieve(query).await?;
            tracing::debug!("{}: {} returned {} documents", self.name, retriever.name(), docs.len());
            ranked_lists.push(docs);
        }
        Ok(weighted_rrf_fusion(ranked_lists, &self.weights))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
