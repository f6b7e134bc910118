//! Live web search used when local recall is too low.
//!
//! Every failure here degrades to an empty result list: a missing key, a
//! transport error, a non-2xx status or an undecodable body are logged and
//! the pipeline carries on with whatever context it has.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::WebSearchConfig;
use crate::models::Document;

pub const WEB_TITLE: &str = "Web";
pub const WEB_SOURCE: &str = "Bing";

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Never fails; problems yield an empty list.
    async fn search(&self, query: &str) -> Vec<Document>;
}

/// Bing Web Search v7 client.
pub struct BingSearch {
    client: reqwest::Client,
    config: WebSearchConfig,
}

impl BingSearch {
    pub fn new(client: reqwest::Client, config: WebSearchConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Deserialize)]
struct BingResponse {
    #[serde(rename = "webPages", default)]
    web_pages: Option<BingWebPages>,
}

#[derive(Deserialize)]
struct BingWebPages {
    #[serde(default)]
    value: Vec<BingResult>,
}

#[derive(Deserialize)]
struct BingResult {
    #[serde(default)]
    name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl WebSearch for BingSearch {
    async fn search(&self, query: &str) -> Vec<Document> {
        tracing::info!("Triggering real-time web search fallback");

        let Some(api_key) = self.config.api_key.as_deref() else {
            tracing::warn!("BING_API_KEY not set; web fallback returns no results");
            return Vec::new();
        };

        let count = self.config.count.to_string();
        let resp = match self
            .client
            .get(&self.config.endpoint)
            .header("Ocp-Apim-Subscription-Key", api_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("textDecorations", "true"),
                ("textFormat", "HTML"),
            ])
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("Web search request failed: {e}");
                return Vec::new();
            }
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!("Web search failed with {status}: {body}");
            return Vec::new();
        }

        match resp.json::<BingResponse>().await {
            Ok(body) => snippets_to_documents(body),
            Err(e) => {
                tracing::warn!("Failed to parse web search response: {e}");
                Vec::new()
            }
        }
    }
}

fn snippets_to_documents(body: BingResponse) -> Vec<Document> {
    body.web_pages
        .map(|pages| pages.value)
        .unwrap_or_default()
        .into_iter()
        .map(|r| web_document(&r.name, &r.url, &r.snippet))
        .collect()
}

/// Wrap a web result as a pseudo-document so it flows through rerank and
/// prompt assembly like any corpus document.
pub fn web_document(name: &str, url: &str, snippet: &str) -> Document {
    Document::new(format!("{name} ({url}): {snippet}"))
        .with_meta("title", WEB_TITLE)
        .with_meta("source", WEB_SOURCE)
}
