//! Web search through the Serper.dev Google API.

use serde::{Deserialize, Serialize};

use crate::config::{SERPER_URL, Secrets};
use crate::error::{Error, Result};

/// Results requested per query unless the caller asks otherwise.
pub const DEFAULT_RESULTS: u32 = 10;

/// One organic search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchHit>,
}

pub struct SearchClient {
    secrets: Secrets,
    endpoint: String,
    num_results: u32,
    http: reqwest::Client,
}

impl SearchClient {
    pub fn new(secrets: &Secrets) -> Self {
        Self {
            secrets: secrets.clone(),
            endpoint: SERPER_URL.to_string(),
            num_results: DEFAULT_RESULTS,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_num_results(mut self, n: u32) -> Self {
        self.num_results = n;
        self
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let key = self.secrets.serper_key()?;

        let resp = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", key)
            .json(&serde_json::json!({ "q": query, "num": self.num_results }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("Serper error {status}: {body}")));
        }

        let parsed: SerperResponse = resp.json().await?;
        tracing::info!(query, hits = parsed.organic.len(), "Web search complete");
        Ok(parsed.organic)
    }
}

/// Render hits as the plain-text block handed back to the agent.
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, h)| {
            let mut entry = format!("{}. {}\n   {}\n   {}", i + 1, h.title, h.link, h.snippet);
            if let Some(date) = &h.date {
                entry.push_str(&format!("\n   ({date})"));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
