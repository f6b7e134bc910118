use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::config::Config;
use crate::models::{AskRequest, AskResponse, SourceCitation};
use crate::state::AppState;

const MAX_QUESTION_LEN: usize = 2000;
const MAX_CITATIONS: usize = 5;

/// POST /api/ask - Answer one question:
///   1. Validate and truncate the question
///   2. Wait for the single chain permit
///   3. Run the chain under the configured timeout
///   4. Return answer, context sources, citations and the extended history
pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, String)> {
    let question = req.question.trim();
    if question.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Question is required".to_string()));
    }
    let question = truncate_to_char_boundary(question, MAX_QUESTION_LEN);
    let mut history = req.history.unwrap_or_default();

    let _permit = state
        .ask_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Assistant is shutting down".to_string(),
            )
        })?;

    let timeout = Duration::from_secs(state.config.ask_timeout_secs);
    let answer = match tokio::time::timeout(timeout, state.chain.call(question, &mut history)).await {
        Ok(Ok(answer)) => answer,
        Ok(Err(e)) => {
            tracing::error!("Ask failed: {e:#}");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to answer question: {e}"),
            ));
        }
        Err(_) => {
            tracing::warn!("Ask timed out after {}s", state.config.ask_timeout_secs);
            return Err((
                StatusCode::GATEWAY_TIMEOUT,
                format!("No answer within {}s", state.config.ask_timeout_secs),
            ));
        }
    };

    let citations = SourceCitation::from_documents(&answer.sources, MAX_CITATIONS);

    Ok(Json(AskResponse {
        answer: answer.answer,
        sources: answer.sources,
        citations,
        history,
    }))
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "retrievers": state.chain.retriever_count(),
    }))
}

/// GET /api/config - Effective configuration with API keys redacted
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = state.config.as_ref();
    Json(ConfigResponse {
        has_llm_api_key: config.llm.api_key.is_some(),
        has_web_search_key: config.web_search.api_key.is_some(),
        config: config.clone(),
    })
}

/// Config response. Key fields are skipped during serialization; only
/// their presence is reported.
#[derive(Serialize)]
pub struct ConfigResponse {
    #[serde(flatten)]
    pub config: Config,
    pub has_llm_api_key: bool,
    pub has_web_search_key: bool,
}

fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
