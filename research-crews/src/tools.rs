//! Tool definitions and execution for crew agents.
//!
//! Every tool returns a string that goes straight back to the model. Database
//! and notification tools answer with a JSON object carrying a `status` field
//! (`ok`, `saved`, `sent` or `error`); the caller branches on that field.
//! Only a missing secret escapes as an `Err`.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::Secrets;
use crate::error::{Error, Result};
use crate::llm::ToolDef;
use crate::notify::Notifier;
use crate::search::{self, SearchClient};
use crate::store::{RecordStore, ReportSubmission, SourceInput};

pub const WEB_SEARCH: &str = "web_search";
pub const SEND_NOTIFICATION: &str = "send_push_notification";
pub const SAVE_RESEARCH_RECORD: &str = "save_research_record";
pub const SAVE_REPORT: &str = "save_report";
pub const SAVE_RESEARCH_SOURCES: &str = "save_research_sources";

pub const ALL: &[&str] = &[
    WEB_SEARCH,
    SEND_NOTIFICATION,
    SAVE_RESEARCH_RECORD,
    SAVE_REPORT,
    SAVE_RESEARCH_SOURCES,
];

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
}

#[derive(Debug, Deserialize)]
struct NotificationInput {
    title: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct SourcesInput {
    research_id: i64,
    sources: Vec<SourceInput>,
}

/// Structured failure payload.
pub fn error_payload(message: impl std::fmt::Display) -> String {
    json!({ "status": "error", "message": message.to_string() }).to_string()
}

/// The services tools call into, built once per run.
pub struct Toolbox {
    notifier: Notifier,
    store: RecordStore,
    search: SearchClient,
}

impl Toolbox {
    pub fn new(secrets: &Secrets) -> Self {
        Self::from_parts(
            Notifier::new(secrets),
            RecordStore::new(secrets),
            SearchClient::new(secrets),
        )
    }

    pub fn from_parts(notifier: Notifier, store: RecordStore, search: SearchClient) -> Self {
        Self {
            notifier,
            store,
            search,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Execute a tool call from the LLM and return the result text.
    pub async fn execute(&self, tool_name: &str, input: &Value) -> Result<String> {
        tracing::info!(tool = tool_name, "Executing tool");
        let result = match tool_name {
            WEB_SEARCH => match parse::<SearchInput>(input) {
                Ok(i) => self
                    .search
                    .search(&i.query)
                    .await
                    .map(|hits| search::format_hits(&hits)),
                Err(msg) => return Ok(msg),
            },

            SEND_NOTIFICATION => match parse::<NotificationInput>(input) {
                Ok(i) => self
                    .notifier
                    .send(&i.title, &i.message)
                    .await
                    .map(|report| report.to_json().to_string()),
                Err(msg) => return Ok(msg),
            },

            SAVE_RESEARCH_RECORD => match parse::<ReportSubmission>(input) {
                Ok(sub) => self
                    .store
                    .save_record(&sub)
                    .await
                    .map(|saved| saved.to_json().to_string()),
                Err(msg) => return Ok(msg),
            },

            SAVE_REPORT => match parse::<ReportSubmission>(input) {
                Ok(mut sub) => {
                    sub.tags = None;
                    self.store
                        .save_record(&sub)
                        .await
                        .map(|saved| saved.to_report_json().to_string())
                }
                Err(msg) => return Ok(msg),
            },

            SAVE_RESEARCH_SOURCES => match parse::<SourcesInput>(input) {
                Ok(i) => self
                    .store
                    .save_sources(i.research_id, &i.sources)
                    .await
                    .map(|saved| saved.to_json().to_string()),
                Err(msg) => return Ok(msg),
            },

            _ => return Ok(error_payload(format!("Unknown tool: {tool_name}"))),
        };

        match result {
            Ok(out) => Ok(out),
            Err(e @ Error::Configuration(_)) => Err(e),
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "Tool failed");
                Ok(error_payload(e))
            }
        }
    }
}

fn parse<T: DeserializeOwned>(input: &Value) -> std::result::Result<T, String> {
    serde_json::from_value(input.clone()).map_err(|e| error_payload(format!("Invalid input: {e}")))
}

/// Definition for one tool, `None` if the name is unknown.
pub fn definition(name: &str) -> Option<ToolDef> {
    let (description, input_schema) = match name {
        WEB_SEARCH => (
            "Search the web with Google. Returns titles, links and snippets of the top results.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                }
            }),
        ),
        SEND_NOTIFICATION => (
            "Send a push notification to the user via Pushover. Use this to deliver the title and the complete report content. Long messages are split into numbered parts automatically.",
            json!({
                "type": "object",
                "required": ["title", "message"],
                "properties": {
                    "title": { "type": "string", "description": "The title of the message" },
                    "message": { "type": "string", "description": "The message to be sent to the user" }
                }
            }),
        ),
        SAVE_RESEARCH_RECORD => (
            "Save a research record (topic, English report, Chinese report, tags) to the research database. Returns the new record_id, which is needed to save sources.",
            json!({
                "type": "object",
                "required": ["topic", "report_en", "report_zh"],
                "properties": {
                    "topic": { "type": "string", "description": "The research topic" },
                    "report_en": { "type": "string", "description": "The English research report content" },
                    "report_zh": { "type": "string", "description": "The Chinese research report content" },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Categorical tags for this research"
                    }
                }
            }),
        ),
        SAVE_REPORT => (
            "Save a research report (topic, English report, Chinese report) to the research database.",
            json!({
                "type": "object",
                "required": ["topic", "report_en", "report_zh"],
                "properties": {
                    "topic": { "type": "string", "description": "The research topic" },
                    "report_en": { "type": "string", "description": "The English research report content" },
                    "report_zh": { "type": "string", "description": "The Chinese research report content" },
                    "word_count_en": { "type": "integer", "description": "Word count of English report" },
                    "word_count_zh": { "type": "integer", "description": "Character count of Chinese report" }
                }
            }),
        ),
        SAVE_RESEARCH_SOURCES => (
            "Save the sources (URLs and titles) consulted during research, linked to a research record by its ID.",
            json!({
                "type": "object",
                "required": ["research_id", "sources"],
                "properties": {
                    "research_id": {
                        "type": "integer",
                        "description": "The ID of the research record these sources belong to"
                    },
                    "sources": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["url"],
                            "properties": {
                                "url": { "type": "string", "description": "The URL of the source" },
                                "title": { "type": "string", "description": "The title of the source/page" }
                            }
                        }
                    }
                }
            }),
        ),
        _ => return None,
    };

    Some(ToolDef {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    })
}

/// Definitions for a list of tool names, skipping unknown ones.
pub fn definitions(names: &[String]) -> Vec<ToolDef> {
    names.iter().filter_map(|n| definition(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_toolbox(dir: &tempfile::TempDir) -> Toolbox {
        let path = dir.path().join("tools.db").to_string_lossy().to_string();
        Toolbox::new(&Secrets {
            turso_database_url: Some(path),
            turso_auth_token: Some("local".into()),
            ..Default::default()
        })
    }

    #[test]
    fn every_tool_has_a_definition() {
        for name in ALL {
            let def = definition(name).unwrap();
            assert_eq!(def.name, *name);
            assert_eq!(def.input_schema["type"], "object");
        }
        assert!(definition("shell").is_none());
        let names = vec!["web_search".to_string(), "nope".to_string()];
        assert_eq!(definitions(&names).len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_structured_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = local_toolbox(&dir).execute("shell", &json!({})).await.unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], "error");
    }

    #[tokio::test]
    async fn bad_input_is_structured_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = local_toolbox(&dir)
            .execute(SAVE_RESEARCH_SOURCES, &json!({"research_id": "x"}))
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], "error");
        assert!(v["message"].as_str().unwrap().starts_with("Invalid input"));
    }

    #[tokio::test]
    async fn database_failure_is_structured_error() {
        // Schema never applied: the insert fails with "no such table".
        let dir = tempfile::tempdir().unwrap();
        let out = local_toolbox(&dir)
            .execute(
                SAVE_RESEARCH_RECORD,
                &json!({"topic": "T", "report_en": "a", "report_zh": "b"}),
            )
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], "error");
        assert!(v["message"].as_str().unwrap().contains("no such table"));
    }

    #[tokio::test]
    async fn record_then_sources() {
        let dir = tempfile::tempdir().unwrap();
        let tools = local_toolbox(&dir);
        tools.store().ensure_schema().await.unwrap();

        let out = tools
            .execute(
                SAVE_RESEARCH_RECORD,
                &json!({
                    "topic": "T",
                    "report_en": "hello world",
                    "report_zh": "你好世界",
                    "tags": ["ai", "ai", "search"]
                }),
            )
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], "ok");
        assert_eq!(v["word_count_en"], 2);
        assert_eq!(v["word_count_zh"], 4);
        assert_eq!(v["tags"], json!(["ai", "search"]));
        let id = v["record_id"].as_i64().unwrap();

        let out = tools
            .execute(
                SAVE_RESEARCH_SOURCES,
                &json!({
                    "research_id": id,
                    "sources": [{"url": "https://a.com/x"}, {"url": "not a url"}]
                }),
            )
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], "saved");
        assert_eq!(v["sources_count"], 2);
        assert_eq!(v["sources"][0]["domain"], "a.com");
        assert_eq!(v["sources"][1]["domain"], "");
    }

    #[tokio::test]
    async fn save_report_uses_supplied_counts() {
        let dir = tempfile::tempdir().unwrap();
        let tools = local_toolbox(&dir);
        tools.store().ensure_schema().await.unwrap();
        let out = tools
            .execute(
                SAVE_REPORT,
                &json!({"topic": "T", "report_en": "a b", "report_zh": "中", "word_count_en": 10}),
            )
            .await
            .unwrap();
        let v: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["status"], "saved");
        assert!(v["id"].as_i64().is_some());
        assert_eq!(v["word_count_en"], 10);
        assert_eq!(v["word_count_zh"], 1);
    }

    #[tokio::test]
    async fn missing_secrets_propagate() {
        let tools = Toolbox::new(&Secrets::default());
        let err = tools
            .execute(SEND_NOTIFICATION, &json!({"title": "t", "message": "m"}))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        let err = tools
            .execute(SAVE_REPORT, &json!({"topic": "T", "report_en": "a", "report_zh": "b"}))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
