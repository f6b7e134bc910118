//! Cross-encoder reranker via OpenAI-compatible `/v1/rerank` endpoint.
//!
//! Sends a single batch request with all query-document pairs and maps the
//! scores back onto the input order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::RerankerConfig;
use crate::models::Document;

/// Scores (query, passage) pairs jointly. Higher means more relevant.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// One score per passage, in input order.
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}

pub struct HttpCrossEncoder {
    client: reqwest::Client,
    config: RerankerConfig,
}

impl HttpCrossEncoder {
    /// Fails if no reranker base URL is configured.
    pub fn new(client: reqwest::Client, config: RerankerConfig) -> Result<Self> {
        if config.base_url.is_none() {
            anyhow::bail!("Reranking enabled but RERANKER_BASE_URL is not set");
        }
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Reranker for HttpCrossEncoder {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let base_url = self
            .config
            .base_url
            .as_deref()
            .context("Reranker base_url not configured")?;

        let model = self.config.model.as_deref().unwrap_or("default");

        let url = format!("{}/v1/rerank", base_url.trim_end_matches('/'));

        let req_body = RerankRequest {
            model: model.to_string(),
            query: query.to_string(),
            documents: passages.to_vec(),
            top_n: passages.len(),
        };

        let timeout = std::time::Duration::from_secs(self.config.timeout_secs.min(30));

        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&req_body)
            .send()
            .await
            .context("Failed to reach reranker endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Reranker returned {status}: {body}");
        }

        let body: RerankResponse = resp
            .json()
            .await
            .context("Failed to parse reranker response")?;

        scores_in_input_order(body, passages.len())
    }
}

fn scores_in_input_order(body: RerankResponse, len: usize) -> Result<Vec<f32>> {
    let mut scores: Vec<Option<f32>> = vec![None; len];
    for r in body.results {
        let slot = scores
            .get_mut(r.index)
            .with_context(|| format!("Reranker returned out-of-range index {}", r.index))?;
        *slot = Some(sigmoid(r.relevance_score));
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.with_context(|| format!("Reranker returned no score for passage {i}")))
        .collect()
}

/// Reorder documents by score, highest first. The sort is stable, so equal
/// scores keep their incoming order. Extra documents beyond `scores` keep a
/// score of negative infinity.
pub fn rerank_documents(docs: Vec<Document>, scores: &[f32]) -> Vec<Document> {
    let mut scored: Vec<(f32, Document)> = docs
        .into_iter()
        .enumerate()
        .map(|(i, d)| (scores.get(i).copied().unwrap_or(f32::NEG_INFINITY), d))
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, d)| d).collect()
}

/// Sigmoid normalization: maps raw logits to 0-1 range.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// ─── Request/Response types ────────────────────────────

#[derive(Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: usize,
    relevance_score: f32,
}
