//! Remote libSQL (Turso) backend over the Hrana HTTP pipeline API.
//!
//! One connection is one Hrana stream. The server hands back a baton after
//! every pipeline request; sending it with the next request keeps statements
//! (and any open transaction) on the same stream. `close` ends the stream,
//! which also rolls back anything left uncommitted.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::value::{Row, Value};
use crate::error::{Error, Result};

pub struct RemoteConnection {
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
    baton: Option<String>,
}

#[derive(Debug, Serialize)]
struct PipelineRequest<'a> {
    baton: Option<&'a str>,
    requests: Vec<StreamRequest>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamRequest {
    Execute { stmt: Stmt },
    Close,
}

#[derive(Debug, Serialize)]
struct Stmt {
    sql: String,
    args: Vec<HranaValue>,
    want_rows: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HranaValue {
    Null,
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    baton: Option<String>,
    base_url: Option<String>,
    results: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: HranaError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResponse {
    Execute { result: StmtResult },
    Close,
}

#[derive(Debug, Deserialize)]
struct HranaError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StmtResult {
    #[serde(default)]
    rows: Vec<Vec<HranaValue>>,
    #[serde(default)]
    affected_row_count: u64,
}

impl From<&Value> for HranaValue {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => HranaValue::Null,
            Value::Integer(n) => HranaValue::Integer { value: n.to_string() },
            Value::Real(f) => HranaValue::Float { value: *f },
            Value::Text(s) => HranaValue::Text { value: s.clone() },
        }
    }
}

impl TryFrom<HranaValue> for Value {
    type Error = Error;

    fn try_from(v: HranaValue) -> Result<Self> {
        Ok(match v {
            HranaValue::Null => Value::Null,
            HranaValue::Integer { value } => Value::Integer(
                value
                    .parse()
                    .map_err(|_| Error::Persistence(format!("bad integer value: {value}")))?,
            ),
            HranaValue::Float { value } => Value::Real(value),
            HranaValue::Text { value } => Value::Text(value),
            HranaValue::Blob { .. } => {
                return Err(Error::Persistence("blob columns are not supported".into()));
            }
        })
    }
}

/// Map a database URL onto the HTTP base the pipeline endpoint hangs off.
pub fn http_base(url: &str) -> String {
    let url = url.trim_end_matches('/');
    match url.strip_prefix("libsql://") {
        Some(host) => format!("https://{host}"),
        None => url.to_string(),
    }
}

impl RemoteConnection {
    pub fn new(http: reqwest::Client, url: &str, auth_token: &str) -> Self {
        Self {
            http,
            base_url: http_base(url),
            auth_token: auth_token.to_string(),
            baton: None,
        }
    }

    async fn pipeline(&mut self, requests: Vec<StreamRequest>) -> anyhow::Result<Vec<StreamResult>> {
        let body = PipelineRequest {
            baton: self.baton.as_deref(),
            requests,
        };
        let resp = self
            .http
            .post(format!("{}/v2/pipeline", self.base_url))
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await
            .context("Failed to reach database")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Database HTTP error {status}: {body}");
        }

        let parsed: PipelineResponse = resp
            .json()
            .await
            .context("Failed to parse pipeline response")?;
        self.baton = parsed.baton;
        if let Some(base) = parsed.base_url {
            self.base_url = base.trim_end_matches('/').to_string();
        }
        Ok(parsed.results)
    }

    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<StmtResult> {
        let stmt = Stmt {
            sql: sql.to_string(),
            args: params.iter().map(HranaValue::from).collect(),
            want_rows: true,
        };
        let results = self
            .pipeline(vec![StreamRequest::Execute { stmt }])
            .await
            .map_err(|e| Error::Persistence(format!("{e:#}")))?;
        stmt_result(results)
    }

    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let result = self.run(sql, params).await?;
        result
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(Value::try_from).collect::<Result<Row>>())
            .collect()
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        Ok(self.run(sql, params).await?.affected_row_count)
    }

    pub async fn close(mut self) {
        if self.baton.is_none() {
            return;
        }
        if let Err(e) = self.pipeline(vec![StreamRequest::Close]).await {
            tracing::warn!(error = %e, "Failed to close database stream");
        }
    }
}

fn stmt_result(results: Vec<StreamResult>) -> Result<StmtResult> {
    match results.into_iter().next() {
        Some(StreamResult::Ok {
            response: StreamResponse::Execute { result },
        }) => Ok(result),
        Some(StreamResult::Ok { .. }) => {
            Err(Error::Persistence("unexpected pipeline response".into()))
        }
        Some(StreamResult::Error { error }) => Err(Error::Persistence(match error.code {
            Some(code) => format!("{} ({code})", error.message),
            None => error.message,
        })),
        None => Err(Error::Persistence("empty pipeline response".into())),
    }
}
