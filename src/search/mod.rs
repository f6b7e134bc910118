//! Retrieval: per-corpus vector (MMR) and BM25 retrievers, weighted fusion into
//! hybrid retrievers, combined multi-retriever lookup, and the web fallback.

pub mod bm25;
pub mod hybrid;
pub mod vector;
pub mod web;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::models::Document;

/// Cap on unique documents returned by [`retrieve_combined`].
pub const COMBINED_LIMIT: usize = 10;

/// Anything that turns a query into documents, most relevant first.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>>;

    /// Short label for logs.
    fn name(&self) -> &str;
}

/// Drop later documents whose signature (content + metadata set) was already
/// seen. Keeps first occurrences in their original order.
pub fn dedup_by_signature(docs: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|d| seen.insert(d.signature()))
        .collect()
}

/// Query every retriever in order, concatenate, dedup by signature, and keep
/// the first [`COMBINED_LIMIT`] documents.
pub async fn retrieve_combined(
    retrievers: &[Arc<dyn Retriever>],
    query: &str,
) -> Result<Vec<Document>> {
    let mut results = Vec::new();
    for retriever in retrievers {
        let docs = retriever.retrieve(query).await?;
        tracing::debug!("{} returned {} documents", retriever.name(), docs.len());
        results.extend(docs);
    }

    let mut unique = dedup_by_signature(results);
    unique.truncate(COMBINED_LIMIT);
    Ok(unique)
}


#[cfg(test)]
mod tests {
    use super::testing::{doc, FixedRetriever};
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let docs = vec![doc("a", "A"), doc("b", "B"), doc("a", "A"), doc("c", "C")];
        let out = dedup_by_signature(docs);
        let contents: Vec<&str> = out.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let docs = vec![doc("a", "A"), doc("a", "A"), doc("a", "other"), doc("b", "B")];
        let once = dedup_by_signature(docs);
        let twice = dedup_by_signature(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_same_content_different_metadata_is_kept() {
        let docs = vec![doc("same", "A"), doc("same", "B")];
        assert_eq!(dedup_by_signature(docs).len(), 2);
    }

    #[tokio::test]
    async fn test_identical_documents_from_two_retrievers_collapse() {
        // Separately constructed but equal documents.
        let r1 = FixedRetriever::new("research", vec![doc("PCOS overview", "Guide")]);
        let r2 = FixedRetriever::new("patient", vec![doc("PCOS overview", "Guide")]);
        let out = retrieve_combined(&[r1, r2], "What is PCOS?").await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_earlier_retriever_keeps_rank() {
        let r1 = FixedRetriever::new("r1", vec![doc("x", "X"), doc("shared", "S")]);
        let r2 = FixedRetriever::new("r2", vec![doc("shared", "S"), doc("y", "Y")]);
        let out = retrieve_combined(&[r1, r2], "q").await.unwrap();
        let contents: Vec<&str> = out.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(contents, vec!["x", "shared", "y"]);
    }

    #[tokio::test]
    async fn test_combined_is_capped_and_drawn_from_inputs() {
        let many: Vec<Document> = (0..8).map(|i| doc(&format!("r{i}"), "R")).collect();
        let more: Vec<Document> = (0..8).map(|i| doc(&format!("p{i}"), "P")).collect();
        let union: Vec<Document> = many.iter().chain(more.iter()).cloned().collect();

        let out = retrieve_combined(
            &[FixedRetriever::new("r", many), FixedRetriever::new("p", more)],
            "q",
        )
        .await
        .unwrap();

        assert_eq!(out.len(), COMBINED_LIMIT);
        assert!(out.iter().all(|d| union.contains(d)));
        assert_eq!(out[8].content, "p0");
    }

    #[tokio::test]
    async fn test_no_retrievers_yields_nothing() {
        let out = retrieve_combined(&[], "q").await.unwrap();
        assert!(out.is_empty());
    }
}
