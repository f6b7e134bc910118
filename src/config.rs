use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the persisted vector stores live
    pub data_dir: PathBuf,
    /// Research papers CSV (title, year, abstract, fulltext)
    pub research_csv: PathBuf,
    /// Patient articles JSON (array of {text, source, title, id})
    pub patient_json: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Upper bound on a single question-answering call made through the API
    pub ask_timeout_secs: u64,
    /// Chain switches used by the server
    pub chain: ChainConfig,
    /// Answer/expansion model
    pub llm: LlmConfig,
    /// Embedding model shared by both corpora
    pub embedding: EmbeddingConfig,
    /// Cross-encoder reranker configuration
    pub reranker: RerankerConfig,
    /// Low-recall web search fallback
    pub web_search: WebSearchConfig,
    /// Retrieval sizes and fusion weights
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub include_patient_data: bool,
    pub use_multiquery: bool,
    pub use_rerank: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            include_patient_data: true,
            use_multiquery: true,
            use_rerank: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "anthropic", "openai" or "ollama"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for expansion and answer synthesis
    pub chat_model: String,
    /// API key (required for cloud providers)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Completion length cap (Anthropic requires one)
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            chat_model: "claude-3-haiku-20240307".to_string(),
            api_key: None,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama" or "openai"
    pub provider: String,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            api_key: None,
            dim: 384,
        }
    }
}

/// Configuration for the cross-encoder reranker sidecar (any server exposing `/v1/rerank`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Base URL for the reranker API (e.g. "http://127.0.0.1:8082").
    /// If None, a chain cannot be created with reranking enabled.
    pub base_url: Option<String>,
    /// Model name to send in the rerank request.
    pub model: Option<String>,
    /// Request timeout in seconds (capped at 30).
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: Some("cross-encoder/ms-marco-MiniLM-L-6-v2".to_string()),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    pub endpoint: String,
    /// Missing key disables the fallback (it then yields no documents).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub count: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.bing.microsoft.com/v7.0/search".to_string(),
            api_key: None,
            count: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Documents selected by MMR per vector retriever
    pub k: usize,
    /// Candidate pool size fed into MMR
    pub fetch_k: usize,
    /// MMR trade-off: 1.0 = pure relevance, 0.0 = pure diversity
    pub lambda_mult: f32,
    /// Documents returned by each BM25 retriever
    pub bm25_k: usize,
    pub vector_weight: f32,
    pub bm25_weight: f32,
    /// Documents placed in the answer prompt
    pub context_docs: usize,
    /// Below this many local documents the web fallback replaces them
    pub min_local_docs: usize,
    /// Number of LLM paraphrases requested during expansion
    pub query_variations: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            fetch_k: 20,
            lambda_mult: 0.5,
            bm25_k: 5,
            vector_weight: 0.7,
            bm25_weight: 0.3,
            context_docs: 5,
            min_local_docs: 2,
            query_variations: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            research_csv: PathBuf::from("pcos_papers_merged.csv"),
            patient_json: PathBuf::from("all_patient_articles_text_only.json"),
            bind_addr: "127.0.0.1:9000".to_string(),
            ask_timeout_secs: 120,
            chain: ChainConfig::default(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
            web_search: WebSearchConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("PCOS_RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("PCOS_RAG_RESEARCH_CSV") {
            config.research_csv = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("PCOS_RAG_PATIENT_JSON") {
            config.patient_json = PathBuf::from(path);
        }
        if let Ok(addr) = std::env::var("PCOS_RAG_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(val) = std::env::var("PCOS_RAG_ASK_TIMEOUT_SECS") {
            if let Ok(v) = val.parse() {
                config.ask_timeout_secs = v;
            }
        }
        if let Some(v) = env_flag("PCOS_RAG_INCLUDE_PATIENT") {
            config.chain.include_patient_data = v;
        }
        if let Some(v) = env_flag("PCOS_RAG_MULTIQUERY") {
            config.chain.use_multiquery = v;
        }
        if let Some(v) = env_flag("PCOS_RAG_RERANK") {
            config.chain.use_rerank = v;
        }

        // LLM config
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY").or_else(|_| std::env::var("ANTHROPIC_API_KEY")) {
            config.llm.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                config.llm.max_tokens = v;
            }
        }

        // Embedding config
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Ok(url) = std::env::var("EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Ok(key) = std::env::var("EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(key);
        }
        if let Ok(dim) = std::env::var("EMBEDDING_DIM") {
            if let Ok(d) = dim.parse() {
                config.embedding.dim = d;
            }
        }

        // Reranker config
        if let Ok(url) = std::env::var("RERANKER_BASE_URL") {
            config.reranker.base_url = Some(url);
        }
        if let Ok(model) = std::env::var("RERANKER_MODEL") {
            config.reranker.model = Some(model);
        }
        if let Ok(val) = std::env::var("RERANKER_TIMEOUT_SECS") {
            if let Ok(v) = val.parse::<u64>() {
                config.reranker.timeout_secs = v.min(30); // Cap at 30s
            }
        }

        // Web search fallback
        if let Ok(key) = std::env::var("BING_API_KEY") {
            if !key.trim().is_empty() {
                config.web_search.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("BING_ENDPOINT") {
            config.web_search.endpoint = url;
        }

        config
    }

    /// Startup checks. Anything reported here is a configuration error the
    /// process should not start with.
    pub fn validate(&self) -> Result<()> {
        match self.llm.provider.as_str() {
            "anthropic" | "openai" => {
                if self.llm.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                    anyhow::bail!(
                        "LLM provider '{}' requires an API key (set LLM_API_KEY or ANTHROPIC_API_KEY)",
                        self.llm.provider
                    );
                }
            }
            "ollama" => {}
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        }

        self.validate_embedding()?;

        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.lambda_mult) {
            anyhow::bail!("lambda_mult must be within 0.0..=1.0, got {}", r.lambda_mult);
        }
        if r.fetch_k < r.k {
            anyhow::bail!("fetch_k ({}) must be at least k ({})", r.fetch_k, r.k);
        }

        Ok(())
    }

    /// The subset of [`Config::validate`] that indexing depends on. Building
    /// the vector stores never calls the LLM, so no LLM key is required.
    pub fn validate_embedding(&self) -> Result<()> {
        match self.embedding.provider.as_str() {
            "ollama" | "openai" => Ok(()),
            other => anyhow::bail!("Unknown embedding provider: {other}"),
        }
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn research_index_dir(&self) -> PathBuf {
        self.vector_dir().join("research")
    }

    pub fn patient_index_dir(&self) -> PathBuf {
        self.vector_dir().join("patient")
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
