use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::corpus::passages::passages_for;
use crate::corpus::patient::load_patient_articles;
use crate::corpus::research::load_research_papers;
use crate::llm::embeddings::Embedder;
use crate::models::Document;
use crate::search::vector::{VectorEntry, VectorStore};

/// Texts sent to the embedder per request.
const EMBED_BATCH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub documents: usize,
    pub passages: usize,
}

/// Split documents into passages, embed them, and write a fresh vector
/// store to `vector_dir`.
pub async fn build_vector_index(
    embedder: &dyn Embedder,
    documents: &[Document],
    vector_dir: &Path,
) -> Result<IndexStats> {
    let passages: Vec<Document> = documents.iter().flat_map(passages_for).collect();
    tracing::info!(
        "Embedding {} passages from {} documents into {}",
        passages.len(),
        documents.len(),
        vector_dir.display()
    );

    let mut entries = Vec::with_capacity(passages.len());
    for batch in passages.chunks(EMBED_BATCH) {
        let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed passages")?;

        if embeddings.len() != batch.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} passages",
                embeddings.len(),
                batch.len()
            );
        }

        entries.extend(
            batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(document, embedding)| VectorEntry { document, embedding }),
        );
        tracing::debug!("Embedded {}/{} passages", entries.len(), passages.len());
    }

    let store = VectorStore::create(vector_dir, entries)?;
    tracing::info!("Wrote {} vectors to {}", store.entry_count(), store.path().display());

    Ok(IndexStats {
        documents: documents.len(),
        passages: store.entry_count(),
    })
}

/// Build the research store, and the patient store when requested. Only the
/// embedder is needed here; the LLM is never called while indexing.
pub async fn index_corpora(
    config: &Config,
    embedder: &dyn Embedder,
    include_patient_data: bool,
) -> Result<()> {
    let research = load_research_papers(&config.research_csv)?;
    let stats = build_vector_index(embedder, &research, &config.research_index_dir()).await?;
    tracing::info!(
        "Research index: {} documents -> {} passages",
        stats.documents,
        stats.passages
    );

    if include_patient_data {
        let patient = load_patient_articles(&config.patient_json)?;
        let stats = build_vector_index(embedder, &patient, &config.patient_index_dir()).await?;
        tracing::info!(
            "Patient index: {} documents -> {} passages",
            stats.documents,
            stats.passages
        );
    }

    Ok(())
}
