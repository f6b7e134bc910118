use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy};

use crate::models::Document;
use crate::search::Retriever;

/// In-memory BM25 index built on tantivy. Documents are kept alongside the
/// index and looked up by ordinal, so hits come back with their metadata intact.
pub struct Bm25Index {
    index: Index,
    reader: IndexReader,
    documents: Vec<Document>,
    // Field handles
    f_ordinal: Field,
    f_content: Field,
}

#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub document: Document,
    pub score: f32,
}

impl Bm25Index {
    /// Build a RAM index over the given documents.
    pub fn from_documents(documents: Vec<Document>) -> Result<Self> {
        let mut schema_builder = Schema::builder();
        let f_ordinal =
            schema_builder.add_u64_field("ordinal", NumericOptions::default() | STORED);
        let f_content = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index
            .writer(50_000_000)
            .context("Failed to create index writer")?;

        for (ordinal, document) in documents.iter().enumerate() {
            writer.add_document(doc!(
                f_ordinal => ordinal as u64,
                f_content => document.content.clone(),
            ))?;
        }

        writer.commit().context("Failed to commit index")?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create reader")?;

        Ok(Self {
            index,
            reader,
            documents,
            f_ordinal,
            f_content,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Search the index and return scored hits. Query syntax errors (stray
    /// punctuation, unbalanced quotes) are ignored rather than failing the search.
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<Bm25Hit>> {
        if limit == 0 || query_str.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(&self.index, vec![self.f_content]);
        let (query, errors) = query_parser.parse_query_lenient(query_str);
        if !errors.is_empty() {
            tracing::debug!("Lenient BM25 parse of {query_str:?} dropped {} fragments", errors.len());
        }

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .context("Search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());

        for (score, doc_address) in top_docs {
            let stored: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            let ordinal = stored
                .get_first(self.f_ordinal)
                .and_then(|v| v.as_u64())
                .context("Indexed document is missing its ordinal")? as usize;

            if let Some(document) = self.documents.get(ordinal) {
                hits.push(Bm25Hit {
                    document: document.clone(),
                    score,
                });
            }
        }

        Ok(hits)
    }
}

/// BM25 retriever over one corpus.
pub struct Bm25Retriever {
    name: String,
    index: Arc<Bm25Index>,
    k: usize,
}

impl Bm25Retriever {
    pub fn new(name: impl Into<String>, index: Arc<Bm25Index>, k: usize) -> Self {
        Self {
            name: name.into(),
            index,
            k,
        }
    }

    pub fn from_documents(name: impl Into<String>, documents: Vec<Document>, k: usize) -> Result<Self> {
        Ok(Self::new(name, Arc::new(Bm25Index::from_documents(documents)?), k))
    }
}

#[async_trait]
impl Retriever for Bm25Retriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let index = self.index.clone();
        let query = query.to_string();
        let k = self.k;
        let hits = tokio::task::spawn_blocking(move || index.search(&query, k))
            .await
            .context("BM25 search task failed")??;
        Ok(hits.into_iter().map(|h| h.document).collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
