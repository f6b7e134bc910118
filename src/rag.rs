//! The question-answering chain: retrieval, optional expansion, low-recall
//! fallback, optional rerank, and answer synthesis.
//!
//! Everything expensive (HTTP clients, loaded indexes) is built once by
//! [`RagContext::init`] and [`build_retrievers`], then shared read-only by
//! every call.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{Config, RetrievalConfig};
use crate::corpus::patient::load_patient_articles;
use crate::corpus::research::load_research_papers;
use crate::llm::completion::{HttpLanguageModel, LanguageModel};
use crate::llm::cross_encoder::{rerank_documents, HttpCrossEncoder, Reranker};
use crate::llm::embeddings::{Embedder, HttpEmbedder};
use crate::llm::query_expand::generate_query_variations;
use crate::models::{Answer, Document};
use crate::search::bm25::Bm25Retriever;
use crate::search::hybrid::EnsembleRetriever;
use crate::search::vector::{VectorRetriever, VectorStore};
use crate::search::web::{BingSearch, WebSearch};
use crate::search::{dedup_by_signature, retrieve_combined, Retriever};

/// Immutable startup context: configuration plus the clients every chain shares.
pub struct RagContext {
    pub config: Config,
    pub http_client: reqwest::Client,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    pub web_search: Arc<dyn WebSearch>,
}

impl RagContext {
    /// Validate configuration and build the HTTP-backed clients. Missing
    /// credentials for a cloud LLM fail here.
    pub fn init(config: Config) -> Result<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        let embedder = Arc::new(HttpEmbedder::new(http_client.clone(), config.embedding.clone()));
        let llm = Arc::new(HttpLanguageModel::new(http_client.clone(), config.llm.clone()));
        let web_search = Arc::new(BingSearch::new(http_client.clone(), config.web_search.clone()));

        Ok(Self::with_components(config, http_client, embedder, llm, web_search))
    }

    pub fn with_components(
        config: Config,
        http_client: reqwest::Client,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        web_search: Arc<dyn WebSearch>,
    ) -> Self {
        Self {
            config,
            http_client,
            embedder,
            llm,
            web_search,
        }
    }
}

/// Build one hybrid retriever per corpus: research always, patient when
/// requested. Corpora and vector stores are loaded here; a missing vector
/// index directory is an error.
pub fn build_retrievers(ctx: &RagContext, include_patient_data: bool) -> Result<Vec<Arc<dyn Retriever>>> {
    let config = &ctx.config;
    let mut retrievers = Vec::new();

    let research_docs = load_research_papers(&config.research_csv)?;
    let research_store = VectorStore::open(&config.research_index_dir())?;
    tracing::info!(
        "Research corpus: {} documents, {} vectors",
        research_docs.len(),
        research_store.entry_count()
    );
    retrievers.push(hybrid_retriever(ctx, "research", research_docs, research_store)?);

    if include_patient_data {
        let patient_docs = load_patient_articles(&config.patient_json)?;
        let patient_store = VectorStore::open(&config.patient_index_dir())?;
        tracing::info!(
            "Patient corpus: {} documents, {} vectors",
            patient_docs.len(),
            patient_store.entry_count()
        );
        retrievers.push(hybrid_retriever(ctx, "patient", patient_docs, patient_store)?);
    }

    Ok(retrievers)
}

/// MMR vector retriever + BM25 over the raw documents, fused 0.7 / 0.3 by default.
pub fn hybrid_retriever(
    ctx: &RagContext,
    name: &str,
    documents: Vec<Document>,
    store: VectorStore,
) -> Result<Arc<dyn Retriever>> {
    let r = &ctx.config.retrieval;

    let vector: Arc<dyn Retriever> = Arc::new(VectorRetriever::new(
        format!("{name}-vector"),
        Arc::new(store),
        ctx.embedder.clone(),
        r.k,
        r.fetch_k,
        r.lambda_mult,
    ));
    let bm25: Arc<dyn Retriever> =
        Arc::new(Bm25Retriever::from_documents(format!("{name}-bm25"), documents, r.bm25_k)?);

    Ok(Arc::new(EnsembleRetriever::new(
        name,
        vec![vector, bm25],
        vec![r.vector_weight, r.bm25_weight],
    )?))
}

/// Assemble a chain over the given retrievers. Enabling rerank without a
/// configured reranker endpoint is an error.
pub fn create_rag_chain(
    ctx: &RagContext,
    retrievers: Vec<Arc<dyn Retriever>>,
    use_multiquery: bool,
    use_rerank: bool,
) -> Result<RagChain> {
    tracing::info!("Setting up RAG chain (multiquery: {use_multiquery}, rerank: {use_rerank})");

    let reranker: Option<Arc<dyn Reranker>> = if use_rerank {
        Some(Arc::new(HttpCrossEncoder::new(
            ctx.http_client.clone(),
            ctx.config.reranker.clone(),
        )?))
    } else {
        None
    };

    Ok(RagChain::new(
        ctx.llm.clone(),
        retrievers,
        reranker,
        ctx.web_search.clone(),
        use_multiquery,
        ctx.config.retrieval.clone(),
    ))
}

pub struct RagChain {
    llm: Arc<dyn LanguageModel>,
    retrievers: Vec<Arc<dyn Retriever>>,
    reranker: Option<Arc<dyn Reranker>>,
    web_search: Arc<dyn WebSearch>,
    use_multiquery: bool,
    retrieval: RetrievalConfig,
}

impl RagChain {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retrievers: Vec<Arc<dyn Retriever>>,
        reranker: Option<Arc<dyn Reranker>>,
        web_search: Arc<dyn WebSearch>,
        use_multiquery: bool,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            llm,
            retrievers,
            reranker,
            web_search,
            use_multiquery,
            retrieval,
        }
    }

    pub fn retriever_count(&self) -> usize {
        self.retrievers.len()
    }

    /// Full candidate list for a question, after expansion, fallback and
    /// rerank but before the context cut.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Document>> {
        tracing::info!("Retrieving documents for: {question}");

        let mut docs = if self.use_multiquery {
            let queries =
                generate_query_variations(self.llm.as_ref(), question, self.retrieval.query_variations)
                    .await?;
            tracing::info!("Generated variations: {queries:?}");

            let mut pooled = Vec::new();
            for query in &queries {
                pooled.extend(retrieve_combined(&self.retrievers, query).await?);
            }
            dedup_by_signature(pooled)
        } else {
            retrieve_combined(&self.retrievers, question).await?
        };
        tracing::info!("Local retrieval returned {} unique documents", docs.len());

        // Local hits are discarded, never mixed with web results.
        if docs.len() < self.retrieval.min_local_docs {
            tracing::warn!("Low recall, using web search fallback");
            docs = self.web_search.search(question).await;
            tracing::info!("Web fallback returned {} documents", docs.len());
        }

        if let Some(reranker) = &self.reranker {
            if !docs.is_empty() {
                let passages: Vec<String> = docs.iter().map(|d| d.content.clone()).collect();
                let scores = reranker.score(question, &passages).await?;
                docs = rerank_documents(docs, &scores);
                tracing::info!("Reranked {} documents", docs.len());
            }
        }

        Ok(docs)
    }

    /// Answer one question. On success the turn is appended to `history` as
    /// `"Q: ...\nA: ..."`; the returned sources are the documents that were
    /// placed in the LLM context.
    pub async fn call(&self, question: &str, history: &mut Vec<String>) -> Result<Answer> {
        let mut docs = self.retrieve(question).await?;
        docs.truncate(self.retrieval.context_docs);

        let context = format_docs(&docs);
        let prompt = build_prompt(&context, question);
        let answer = self.llm.complete(&prompt).await?;

        history.push(format!("Q: {question}\nA: {answer}"));

        Ok(Answer {
            answer,
            sources: docs,
        })
    }
}

/// Render documents as `[title - source]:\ncontent` blocks separated by a blank line.
pub fn format_docs(docs: &[Document]) -> String {
    docs.iter()
        .map(|d| {
            format!(
                "[{} - {}]:\n{}",
                d.title().unwrap_or("N/A"),
                d.source().unwrap_or("N/A"),
                d.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a PCOS education assistant. Use the following research and patient-friendly excerpts \
         to answer the question in clear, empathetic language.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Instructions:\n\
         - Explain in simple, patient-friendly terms\n\
         - Cite the source title or year when referencing specific findings\n\
         - If the information is not in the context, say so rather than making things up\n\
         - Break down complex medical terms\n\
         \n\
         Answer:"
    )
}
