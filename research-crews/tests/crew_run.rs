//! Crew kickoff against a scripted Messages API stand-in.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use research_crews::config::Secrets;
use research_crews::crew::{self, CrewConfig};
use research_crews::llm::LlmClient;
use research_crews::tools::Toolbox;

#[derive(Default)]
struct Script {
    replies: VecDeque<Value>,
    /// Served once `replies` runs out.
    fallback: Option<Value>,
    requests: Vec<Value>,
}

type Shared = Arc<Mutex<Script>>;

async fn messages(State(script): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut script = script.lock().unwrap();
    script.requests.push(body);
    let reply = match script.replies.pop_front() {
        Some(reply) => reply,
        None => script
            .fallback
            .clone()
            .unwrap_or_else(|| text_reply("(script exhausted)")),
    };
    Json(reply)
}

fn text_reply(text: &str) -> Value {
    json!({
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 1, "output_tokens": 1}
    })
}

fn tool_reply(id: &str, name: &str, input: Value) -> Value {
    json!({
        "content": [{"type": "tool_use", "id": id, "name": name, "input": input}],
        "stop_reason": "tool_use"
    })
}

async fn start_api(replies: Vec<Value>) -> (String, Shared) {
    serve_script(Script {
        replies: replies.into(),
        ..Default::default()
    })
    .await
}

async fn serve_script(script: Script) -> (String, Shared) {
    let script: Shared = Arc::new(Mutex::new(script));
    let app = Router::new()
        .route("/v1/messages", post(messages))
        .with_state(script.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1/messages"), script)
}

const CREW: &str = r#"
name = "archivist"

[agents.recorder]
role = "Research Archivist"
goal = "Store the report on {topic}"
backstory = "You keep the research database tidy."
tools = ["save_report"]
max_iterations = 2

[agents.editor]
role = "Editor"
goal = "Summarise"
backstory = "You write one-line summaries."

[[tasks]]
name = "record_task"
agent = "recorder"
description = "Save a report about {topic}."
expected_output = "Confirmation with the record id."

[[tasks]]
name = "summary_task"
agent = "editor"
description = "Summarise what was stored."
expected_output = "One line."
output_file = "outputs/summary.md"
"#;

#[tokio::test]
async fn tasks_run_in_order_with_tools_and_context() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = Secrets {
        turso_database_url: Some(dir.path().join("crew.db").to_string_lossy().to_string()),
        turso_auth_token: Some("local".into()),
        ..Default::default()
    };
    let toolbox = Toolbox::new(&secrets);
    toolbox.store().ensure_schema().await.unwrap();

    let (url, script) = start_api(vec![
        tool_reply(
            "tu_1",
            "save_report",
            json!({"topic": "Rust", "report_en": "Rust is fast", "report_zh": "快"}),
        ),
        text_reply("Saved as record 1."),
        text_reply("Rust report stored."),
    ])
    .await;

    let config = CrewConfig::from_toml(CREW).unwrap();
    let inputs = crew::run_inputs(Some("Rust"), &chrono::Utc::now());
    let prepared = config.prepare(&inputs).unwrap();
    let llm = LlmClient::new("test-key".into()).with_api_url(&url);

    let output = crew::kickoff(&prepared, &llm, &toolbox, dir.path()).await.unwrap();

    assert_eq!(output.tasks.len(), 2);
    assert_eq!(output.tasks[0].raw, "Saved as record 1.");
    assert_eq!(output.final_output(), "Rust report stored.");

    let written = std::fs::read_to_string(dir.path().join("outputs/summary.md")).unwrap();
    assert_eq!(written, "Rust report stored.");

    let script = script.lock().unwrap();
    assert_eq!(script.requests.len(), 3);

    let first = &script.requests[0];
    assert!(first["system"].as_str().unwrap().starts_with("You are Research Archivist."));
    assert_eq!(first["tools"][0]["name"], "save_report");
    assert!(
        first["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("Save a report about Rust.")
    );

    // The tool result goes back as the next user turn.
    let second = &script.requests[1];
    let result = &second["messages"][2]["content"][0];
    assert_eq!(result["type"], "tool_result");
    assert_eq!(result["tool_use_id"], "tu_1");
    let payload: Value = serde_json::from_str(result["content"].as_str().unwrap()).unwrap();
    assert_eq!(payload["status"], "saved");
    assert_eq!(payload["word_count_en"], 3);

    // The editor has no tools and sees the recorder's answer as context.
    let third = &script.requests[2];
    assert!(third.get("tools").is_none());
    assert!(
        third["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("## record_task (recorder)\nSaved as record 1.")
    );
}

#[tokio::test]
async fn exhausted_tool_rounds_force_an_answer() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = Secrets {
        turso_database_url: Some(dir.path().join("crew.db").to_string_lossy().to_string()),
        turso_auth_token: Some("local".into()),
        ..Default::default()
    };
    let toolbox = Toolbox::new(&secrets);
    toolbox.store().ensure_schema().await.unwrap();

    let save = json!({"topic": "Rust", "report_en": "a", "report_zh": "b"});
    let (url, script) = start_api(vec![
        tool_reply("tu_1", "save_report", save.clone()),
        tool_reply("tu_2", "save_report", save),
        text_reply("Done."),
        text_reply("Summary."),
    ])
    .await;

    let prepared = CrewConfig::from_toml(CREW)
        .unwrap()
        .prepare(&crew::run_inputs(Some("Rust"), &chrono::Utc::now()))
        .unwrap();
    let llm = LlmClient::new("test-key".into()).with_api_url(&url);
    let output = crew::kickoff(&prepared, &llm, &toolbox, dir.path()).await.unwrap();
    assert_eq!(output.tasks[0].raw, "Done.");

    let script = script.lock().unwrap();
    // Two tool rounds (max_iterations = 2), then the forced answer.
    let third = &script.requests[2];
    let last_turn = third["messages"].as_array().unwrap().last().unwrap();
    let blocks = last_turn["content"].as_array().unwrap();
    assert_eq!(blocks[0]["type"], "tool_result");
    assert_eq!(blocks.last().unwrap()["type"], "text");
    assert_eq!(third["tool_choice"], json!({"type": "none"}));
    assert!(script.requests[0].get("tool_choice").is_none());
}

#[tokio::test]
async fn agent_that_never_stops_calling_tools_fails_its_task() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = Secrets {
        turso_database_url: Some(dir.path().join("crew.db").to_string_lossy().to_string()),
        turso_auth_token: Some("local".into()),
        ..Default::default()
    };
    let toolbox = Toolbox::new(&secrets);
    toolbox.store().ensure_schema().await.unwrap();

    let (url, script) = serve_script(Script {
        fallback: Some(tool_reply(
            "tu_x",
            "save_report",
            json!({"topic": "Rust", "report_en": "a", "report_zh": "b"}),
        )),
        ..Default::default()
    })
    .await;

    let prepared = CrewConfig::from_toml(CREW)
        .unwrap()
        .prepare(&crew::run_inputs(Some("Rust"), &chrono::Utc::now()))
        .unwrap();
    let llm = LlmClient::new("test-key".into()).with_api_url(&url);
    let err = crew::kickoff(&prepared, &llm, &toolbox, dir.path())
        .await
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("record_task"), "{message}");
    assert!(message.contains("kept calling tools"), "{message}");

    // Two tool rounds, then one forced request; the summary task never runs.
    let script = script.lock().unwrap();
    assert_eq!(script.requests.len(), 3);
    assert_eq!(script.requests[2]["tool_choice"]["type"], "none");
    assert!(!dir.path().join("outputs/summary.md").exists());
}

#[tokio::test]
async fn blank_final_answer_fails_its_task() {
    let dir = tempfile::tempdir().unwrap();
    let secrets = Secrets {
        turso_database_url: Some(dir.path().join("crew.db").to_string_lossy().to_string()),
        turso_auth_token: Some("local".into()),
        ..Default::default()
    };
    let toolbox = Toolbox::new(&secrets);
    toolbox.store().ensure_schema().await.unwrap();

    let save = json!({"topic": "Rust", "report_en": "a", "report_zh": "b"});
    let (url, _script) = start_api(vec![
        tool_reply("tu_1", "save_report", save.clone()),
        tool_reply("tu_2", "save_report", save),
        text_reply("  "),
    ])
    .await;

    let prepared = CrewConfig::from_toml(CREW)
        .unwrap()
        .prepare(&crew::run_inputs(Some("Rust"), &chrono::Utc::now()))
        .unwrap();
    let llm = LlmClient::new("test-key".into()).with_api_url(&url);
    let err = crew::kickoff(&prepared, &llm, &toolbox, dir.path())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("empty final answer"));
}

#[tokio::test]
async fn missing_database_secrets_abort_the_run() {
    let (url, _script) = start_api(vec![tool_reply(
        "tu_1",
        "save_report",
        json!({"topic": "Rust", "report_en": "a", "report_zh": "b"}),
    )])
    .await;

    let prepared = CrewConfig::from_toml(CREW)
        .unwrap()
        .prepare(&crew::run_inputs(Some("Rust"), &chrono::Utc::now()))
        .unwrap();
    let llm = LlmClient::new("test-key".into()).with_api_url(&url);
    let toolbox = Toolbox::new(&Secrets::default());
    let dir = tempfile::tempdir().unwrap();

    let err = crew::kickoff(&prepared, &llm, &toolbox, dir.path())
        .await
        .unwrap_err();
    let config_err = err
        .chain()
        .find_map(|e| e.downcast_ref::<research_crews::error::Error>())
        .unwrap();
    assert!(config_err.is_configuration());
}
