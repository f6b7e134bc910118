//! # pcos-rag
//!
//! A question-answering assistant for polycystic ovary syndrome (PCOS) that
//! grounds every answer in retrieved research abstracts/full texts and
//! patient-education articles.
//!
//! ## Architecture
//!
//! Each question flows through a strictly sequential pipeline:
//!
//! ```text
//!                          ┌─────────────┐
//!                          │  Question    │
//!                          └──────┬───────┘
//!                                 │
//!                    ┌────────────┴────────────┐
//!                    ▼ (multiquery)            ▼ (default)
//!           ┌────────────────┐       ┌─────────────────┐
//!           │ Query Expansion│       │  Original Query  │
//!           │  (LLM: 3 alt)  │       │                  │
//!           └───────┬────────┘       └────────┬────────┘
//!                   │                         │
//!                   └────────────┬────────────┘
//!                                ▼
//!            ┌──────────────────────────────────────┐
//!            │ Combined retrieval, per query        │
//!            │  research: MMR vector ⊕ BM25 (0.7/0.3)│
//!            │  patient:  MMR vector ⊕ BM25 (0.7/0.3)│
//!            │  dedup by signature, cap 10          │
//!            └──────────────────┬───────────────────┘
//!                               │
//!                               ▼
//!                  ┌───────────────────────┐
//!                  │  < 2 documents?       │
//!                  │  replace with Bing    │
//!                  │  web results          │
//!                  └───────────┬───────────┘
//!                              │
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │ Cross-encoder rerank  │
//!                  │ (optional, full sort) │
//!                  └───────────┬───────────┘
//!                              │ top 5
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │  LLM answer synthesis │
//!                  │  + "Q: ..\nA: .." log │
//!                  └───────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for data paths, providers, and retrieval sizes
//! - [`models`] - Shared data types: `Document`, `Answer`, `SourceCitation`, request/response types
//! - [`corpus`] - Research CSV and patient JSON loaders, plus the passage splitter used for embedding
//! - [`search::vector`] - Persisted vector store with cosine similarity and MMR selection
//! - [`search::bm25`] - In-memory BM25 index powered by tantivy
//! - [`search::hybrid`] - Weighted reciprocal-rank fusion of vector and BM25 rankings
//! - [`search::web`] - Bing web search fallback for low-recall questions
//! - [`llm::completion`] - Anthropic, OpenAI-compatible and Ollama chat clients
//! - [`llm::embeddings`] - Batch embedding generation via Ollama or OpenAI-compatible APIs
//! - [`llm::query_expand`] - LLM-powered query expansion (3 paraphrases)
//! - [`llm::cross_encoder`] - Cross-encoder reranking via a `/v1/rerank` endpoint
//! - [`ingest`] - Builds the on-disk vector indexes from the corpora
//! - [`rag`] - Startup context, retriever construction, and the question-answering chain
//! - [`api`] - Axum HTTP handlers for asking, health, and config
//! - [`state`] - Shared application state for the server

pub mod api;
pub mod config;
pub mod corpus;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod rag;
pub mod search;
pub mod state;
