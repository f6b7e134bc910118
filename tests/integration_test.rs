//! Integration tests for the pcos-rag pipeline.
//!
//! These tests exercise indexing, hybrid retrieval, the HTTP provider
//! clients and the JSON API against in-process fakes; nothing leaves
//! the loopback interface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use pcos_rag::config::{
    Config, LlmConfig, RerankerConfig, RetrievalConfig, WebSearchConfig,
};
use pcos_rag::ingest::build_vector_index;
use pcos_rag::llm::completion::{HttpLanguageModel, LanguageModel};
use pcos_rag::llm::cross_encoder::{HttpCrossEncoder, Reranker};
use pcos_rag::llm::embeddings::Embedder;
use pcos_rag::models::Document;
use pcos_rag::rag::{build_retrievers, RagChain, RagContext};
use pcos_rag::search::web::{BingSearch, WebSearch};
use pcos_rag::search::{retrieve_combined, Retriever, COMBINED_LIMIT};
use pcos_rag::state::AppState;

const RESEARCH_CSV: &str = "\
title,year,abstract,fulltext,pmid
Insulin resistance in PCOS,2019.0,Insulin resistance is present in most women with PCOS.,,31000001
Metformin and ovulation,2021,Metformin improves ovulation in PCOS.,Full trial of metformin versus placebo for ovulation induction.,
Hirsutism scoring,nan,Hirsutism is scored with the Ferriman-Gallwey scale.,nan,
Empty row,2020,,,
";

const PATIENT_JSON: &str = r#"[
    {"text": "PCOS can cause irregular periods and excess hair (hirsutism).", "source": "NHS", "title": "PCOS overview", "id": 1},
    {"text": "A balanced diet and regular exercise help manage insulin levels.", "title": "Diet and PCOS", "id": "diet-1"},
    {"text": "   ", "title": "Blank"}
]"#;

/// Bag-of-keywords embedding, enough to make cosine similarity meaningful.
struct KeywordEmbedder;

const VOCAB: [&str; 6] = ["insulin", "metformin", "hirsutism", "diet", "ovulation", "pcos"];

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                VOCAB.iter().map(|w| lower.matches(w).count() as f32).collect()
            })
            .collect())
    }
}

/// Records prompts and answers from a script.
struct ScriptedLlm {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedLlm {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            delay,
        })
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.replies.lock().unwrap().pop().unwrap_or_default())
    }
}

struct NoWeb;

#[async_trait]
impl WebSearch for NoWeb {
    async fn search(&self, _query: &str) -> Vec<Document> {
        Vec::new()
    }
}

struct StaticRetriever(Vec<Document>);

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<Document>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Serve `app` on an ephemeral loopback port and return its base URL.
async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Write both corpora and their vector indexes under a temp dir.
async fn indexed_corpora(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.data_dir = dir.join("data");
    config.research_csv = dir.join("papers.csv");
    config.patient_json = dir.join("patient.json");
    std::fs::write(&config.research_csv, RESEARCH_CSV).unwrap();
    std::fs::write(&config.patient_json, PATIENT_JSON).unwrap();

    let research = pcos_rag::corpus::research::load_research_papers(&config.research_csv).unwrap();
    let patient = pcos_rag::corpus::patient::load_patient_articles(&config.patient_json).unwrap();
    build_vector_index(&KeywordEmbedder, &research, &config.research_index_dir())
        .await
        .unwrap();
    build_vector_index(&KeywordEmbedder, &patient, &config.patient_index_dir())
        .await
        .unwrap();

    config
}

fn context(config: Config, llm: Arc<ScriptedLlm>) -> RagContext {
    RagContext::with_components(
        config,
        reqwest::Client::new(),
        Arc::new(KeywordEmbedder),
        llm,
        Arc::new(NoWeb),
    )
}

#[tokio::test]
async fn test_corpora_index_and_hybrid_retrieval() {
    let dir = tempfile::tempdir().unwrap();
    let config = indexed_corpora(dir.path()).await;
    let ctx = context(config, ScriptedLlm::new(&[]));

    let retrievers = build_retrievers(&ctx, true).unwrap();
    assert_eq!(retrievers.len(), 2);
    assert_eq!(retrievers[0].name(), "research");
    assert_eq!(retrievers[1].name(), "patient");

    let docs = retrieve_combined(&retrievers, "metformin ovulation").await.unwrap();
    assert!(docs.len() <= COMBINED_LIMIT);
    assert_eq!(docs[0].title(), Some("Metformin and ovulation"));
    assert!(docs.iter().any(|d| d.source() == Some("NHS") || d.source() == Some("Patient")));

    // Each signature appears once.
    let mut signatures: Vec<_> = docs.iter().map(|d| d.signature()).collect();
    signatures.sort();
    signatures.dedup();
    assert_eq!(signatures.len(), docs.len());
}

#[tokio::test]
async fn test_research_only_when_patient_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let config = indexed_corpora(dir.path()).await;
    let ctx = context(config, ScriptedLlm::new(&[]));

    let retrievers = build_retrievers(&ctx, false).unwrap();
    assert_eq!(retrievers.len(), 1);

    let docs = retrieve_combined(&retrievers, "hirsutism").await.unwrap();
    assert!(docs.iter().all(|d| d.source() == Some("Research")));
}

#[tokio::test]
async fn test_chain_end_to_end_over_indexed_corpora() {
    let dir = tempfile::tempdir().unwrap();
    let config = indexed_corpora(dir.path()).await;
    let llm = ScriptedLlm::new(&["Insulin resistance is common in PCOS (2019)."]);
    let ctx = context(config, llm.clone());

    let retrievers = build_retrievers(&ctx, true).unwrap();
    let chain = pcos_rag::rag::create_rag_chain(&ctx, retrievers, false, false).unwrap();

    let mut history = Vec::new();
    let answer = chain.call("insulin resistance pcos", &mut history).await.unwrap();

    assert!(!answer.sources.is_empty());
    assert!(answer.sources.len() <= 5);
    assert_eq!(history.len(), 1);
    assert!(history[0].starts_with("Q: insulin resistance pcos\nA: Insulin resistance"));

    let prompts = llm.prompts.lock().unwrap();
    assert!(prompts[0].contains("[Insulin resistance in PCOS - Research]:"));
}

#[tokio::test]
async fn test_bing_results_become_documents() {
    async fn bing(
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Result<Json<Value>, StatusCode> {
        if headers.get("Ocp-Apim-Subscription-Key").and_then(|v| v.to_str().ok()) != Some("test-key") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        assert_eq!(params.get("count").map(String::as_str), Some("5"));
        assert_eq!(params.get("textFormat").map(String::as_str), Some("HTML"));
        Ok(Json(json!({
            "webPages": {"value": [
                {"name": "PCOS - NHS", "url": "https://www.nhs.uk/pcos", "snippet": "<b>PCOS</b> is common."},
                {"name": "PCOS - CDC", "url": "https://www.cdc.gov/pcos", "snippet": "Symptoms include..."}
            ]}
        })))
    }

    let base = spawn(Router::new().route("/search", get(bing))).await;
    let search = BingSearch::new(
        reqwest::Client::new(),
        WebSearchConfig {
            endpoint: format!("{base}/search"),
            api_key: Some("test-key".to_string()),
            count: 5,
        },
    );

    let docs = search.search("what is pcos").await;
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].content, "PCOS - NHS (https://www.nhs.uk/pcos): <b>PCOS</b> is common.");
    assert_eq!(docs[1].title(), Some("Web"));
    assert_eq!(docs[1].source(), Some("Bing"));
}

#[tokio::test]
async fn test_bing_error_status_yields_empty() {
    async fn failing() -> (StatusCode, &'static str) {
        (StatusCode::TOO_MANY_REQUESTS, "quota exceeded")
    }

    let base = spawn(Router::new().route("/search", get(failing))).await;
    let search = BingSearch::new(
        reqwest::Client::new(),
        WebSearchConfig {
            endpoint: format!("{base}/search"),
            api_key: Some("test-key".to_string()),
            count: 5,
        },
    );

    assert!(search.search("what is pcos").await.is_empty());
}

#[tokio::test]
async fn test_bing_non_json_body_yields_empty() {
    async fn html() -> (StatusCode, &'static str) {
        (StatusCode::OK, "<html><body>Service unavailable</body></html>")
    }

    let base = spawn(Router::new().route("/search", get(html))).await;
    let search = BingSearch::new(
        reqwest::Client::new(),
        WebSearchConfig {
            endpoint: format!("{base}/search"),
            api_key: Some("test-key".to_string()),
            count: 5,
        },
    );

    assert!(search.search("what is pcos").await.is_empty());
}

#[tokio::test]
async fn test_anthropic_client_sends_headers_and_reads_text() {
    async fn messages(headers: HeaderMap, Json(body): Json<Value>) -> Result<Json<Value>, StatusCode> {
        let key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
        let version = headers.get("anthropic-version").and_then(|v| v.to_str().ok());
        if key != Some("sk-test") || version != Some("2023-06-01") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
        Ok(Json(json!({
            "content": [{"type": "text", "text": format!("echo: {prompt}")}]
        })))
    }

    let base = spawn(Router::new().route("/v1/messages", post(messages))).await;
    let llm = HttpLanguageModel::new(
        reqwest::Client::new(),
        LlmConfig {
            base_url: base,
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        },
    );

    assert_eq!(llm.complete("hello").await.unwrap(), "echo: hello");
}

#[tokio::test]
async fn test_llm_error_status_is_propagated() {
    async fn overloaded() -> (StatusCode, &'static str) {
        (StatusCode::SERVICE_UNAVAILABLE, "overloaded")
    }

    let base = spawn(Router::new().route("/v1/messages", post(overloaded))).await;
    let llm = HttpLanguageModel::new(
        reqwest::Client::new(),
        LlmConfig {
            base_url: base,
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        },
    );

    let err = llm.complete("hello").await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_cross_encoder_maps_scores_to_input_order() {
    async fn rerank(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["top_n"], 3);
        // Results come back sorted by score, not input order.
        Json(json!({"results": [
            {"index": 1, "relevance_score": 4.0},
            {"index": 2, "relevance_score": 0.0},
            {"index": 0, "relevance_score": -4.0}
        ]}))
    }

    let base = spawn(Router::new().route("/v1/rerank", post(rerank))).await;
    let reranker = HttpCrossEncoder::new(
        reqwest::Client::new(),
        RerankerConfig {
            base_url: Some(base),
            ..RerankerConfig::default()
        },
    )
    .unwrap();

    let passages = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let scores = reranker.score("q", &passages).await.unwrap();
    assert_eq!(scores.len(), 3);
    assert!(scores[1] > scores[2] && scores[2] > scores[0]);
}

fn api_state(llm: Arc<ScriptedLlm>, config: Config) -> AppState {
    let docs = vec![
        Document::new("PCOS is a common hormonal condition.")
            .with_meta("title", "PCOS basics")
            .with_meta("year", "2020")
            .with_meta("source", "Research")
            .with_meta("pmid", "123"),
        Document::new("Symptoms include irregular periods.")
            .with_meta("title", "Symptoms")
            .with_meta("source", "NHS"),
    ];
    let retriever: Arc<dyn Retriever> = Arc::new(StaticRetriever(docs));
    let chain = RagChain::new(
        llm,
        vec![retriever],
        None,
        Arc::new(NoWeb),
        false,
        RetrievalConfig::default(),
    );
    AppState::new(config, chain)
}

#[tokio::test]
async fn test_api_ask_health_and_validation() {
    let state = api_state(ScriptedLlm::new(&["PCOS is common."]), Config::default());
    let base = spawn(pcos_rag::api::router(state)).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base}/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok", "retrievers": 1}));

    let resp = client
        .post(format!("{base}/api/ask"))
        .json(&json!({"question": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client
        .post(format!("{base}/api/ask"))
        .json(&json!({"question": "What is PCOS?", "history": ["Q: hi\nA: hello"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "PCOS is common.");
    assert_eq!(body["sources"].as_array().unwrap().len(), 2);
    assert_eq!(body["citations"][0]["link"], "https://pubmed.ncbi.nlm.nih.gov/123");
    assert_eq!(
        body["history"],
        json!(["Q: hi\nA: hello", "Q: What is PCOS?\nA: PCOS is common."])
    );
}

#[tokio::test]
async fn test_api_ask_times_out() {
    let mut config = Config::default();
    config.ask_timeout_secs = 0;
    let state = api_state(ScriptedLlm::slow(Duration::from_millis(200)), config);
    let base = spawn(pcos_rag::api::router(state)).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/ask"))
        .json(&json!({"question": "What is PCOS?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_api_config_hides_keys() {
    let mut config = Config::default();
    config.llm.api_key = Some("sk-secret".to_string());
    let state = api_state(ScriptedLlm::new(&[]), config);
    let base = spawn(pcos_rag::api::router(state)).await;

    let text = reqwest::get(format!("{base}/api/config"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(!text.contains("sk-secret"));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["has_llm_api_key"], true);
    assert_eq!(body["retrieval"]["k"], 5);
}
