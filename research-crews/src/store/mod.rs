//! Research record persistence.
//!
//! Stores each research run (topic, English and Chinese reports, length
//! metrics) with its tags and consulted sources. Every call opens its own
//! connection and closes it before returning, whatever the outcome.
//!
//! The database URL picks the backend: `libsql://`, `https://` and `http://`
//! go to a remote libSQL server, anything else is a local SQLite file.

mod local;
mod remote;
pub mod schema;
mod value;

pub use value::{Row, Value};

use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use crate::config::{DatabaseCredentials, Secrets};
use crate::error::{Error, Result};
use crate::metrics;
use local::LocalConnection;
use remote::RemoteConnection;

/// An open database session.
pub enum Connection {
    Local(LocalConnection),
    Remote(RemoteConnection),
}

impl Connection {
    pub fn open(creds: &DatabaseCredentials, http: &reqwest::Client) -> Result<Self> {
        let url = creds.url.as_str();
        if url.starts_with("libsql://") || url.starts_with("https://") || url.starts_with("http://") {
            Ok(Connection::Remote(RemoteConnection::new(
                http.clone(),
                url,
                &creds.auth_token,
            )))
        } else {
            let path = url.strip_prefix("file:").unwrap_or(url);
            Ok(Connection::Local(LocalConnection::open(path)?))
        }
    }

    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        match self {
            Connection::Local(c) => c.query(sql, params),
            Connection::Remote(c) => c.query(sql, params).await,
        }
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        match self {
            Connection::Local(c) => c.execute(sql, params),
            Connection::Remote(c) => c.execute(sql, params).await,
        }
    }

    pub async fn close(self) {
        match self {
            Connection::Local(c) => c.close(),
            Connection::Remote(c) => c.close().await,
        }
    }
}

/// One research run to persist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSubmission {
    pub topic: String,
    pub report_en: String,
    pub report_zh: String,
    /// Computed from `report_en` when absent.
    #[serde(default)]
    pub word_count_en: Option<i64>,
    /// Computed from `report_zh` when absent.
    #[serde(default)]
    pub word_count_zh: Option<i64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl ReportSubmission {
    pub fn new(topic: &str, report_en: &str, report_zh: &str) -> Self {
        Self {
            topic: topic.to_string(),
            report_en: report_en.to_string(),
            report_zh: report_zh.to_string(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn counts(&self) -> (i64, i64) {
        (
            self.word_count_en
                .unwrap_or_else(|| metrics::word_count(&self.report_en)),
            self.word_count_zh
                .unwrap_or_else(|| metrics::non_whitespace_chars(&self.report_zh)),
        )
    }
}

/// A persisted research record.
#[derive(Debug, Clone, Serialize)]
pub struct SavedRecord {
    pub id: i64,
    pub topic: String,
    /// Tags actually stored; `None` when the submission had none.
    pub tags: Option<Vec<String>>,
    pub word_count_en: i64,
    pub word_count_zh: i64,
    pub created_timestamp: String,
}

impl SavedRecord {
    /// Result payload of the record-with-tags tool.
    pub fn to_json(&self) -> Json {
        json!({
            "status": "ok",
            "record_id": self.id,
            "topic": self.topic,
            "tags": self.tags,
            "word_count_en": self.word_count_en,
            "word_count_zh": self.word_count_zh,
            "created_timestamp": self.created_timestamp,
        })
    }

    /// Result payload of the plain report tool.
    pub fn to_report_json(&self) -> Json {
        json!({
            "status": "saved",
            "id": self.id,
            "topic": self.topic,
            "word_count_en": self.word_count_en,
            "word_count_zh": self.word_count_zh,
            "created_timestamp": self.created_timestamp,
        })
    }
}

/// A source consulted during research.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInput {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedSource {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub domain: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedSources {
    pub research_id: i64,
    pub sources: Vec<SavedSource>,
}

impl SavedSources {
    pub fn to_json(&self) -> Json {
        json!({
            "status": "saved",
            "research_id": self.research_id,
            "sources_count": self.sources.len(),
            "sources": self.sources,
        })
    }
}

/// Network location of a URL: host, plus the port when it is not the
/// scheme default. Empty when the URL does not parse or has no host.
pub fn extract_domain(raw: &str) -> String {
    let Ok(url) = url::Url::parse(raw) else {
        return String::new();
    };
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    }
}

/// Research record store.
pub struct RecordStore {
    secrets: Secrets,
    http: reqwest::Client,
}

impl RecordStore {
    pub fn new(secrets: &Secrets) -> Self {
        Self {
            secrets: secrets.clone(),
            http: reqwest::Client::new(),
        }
    }

    fn connect(&self) -> Result<Connection> {
        let creds = self.secrets.database()?;
        Connection::open(&creds, &self.http)
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.connect()?;
        let result = apply_schema(&mut conn).await;
        conn.close().await;
        result
    }

    /// Insert a record and its tags. A tag that fails to insert (for
    /// example a duplicate) is left out of the result; it does not fail the
    /// call.
    pub async fn save_record(&self, submission: &ReportSubmission) -> Result<SavedRecord> {
        let mut conn = self.connect()?;
        let result = insert_record(&mut conn, submission).await;
        conn.close().await;
        result
    }

    /// Insert sources for an existing record in one transaction.
    pub async fn save_sources(
        &self,
        research_id: i64,
        sources: &[SourceInput],
    ) -> Result<SavedSources> {
        let mut conn = self.connect()?;
        let result = insert_sources(&mut conn, research_id, sources).await;
        if result.is_err()
            && let Err(e) = conn.execute("ROLLBACK", &[]).await
        {
            tracing::warn!(research_id, error = %e, "Rollback failed");
        }
        conn.close().await;
        result
    }
}

async fn apply_schema(conn: &mut Connection) -> Result<()> {
    for stmt in schema::ALL {
        conn.execute(stmt, &[]).await?;
    }
    Ok(())
}

async fn insert_record(conn: &mut Connection, submission: &ReportSubmission) -> Result<SavedRecord> {
    let (word_count_en, word_count_zh) = submission.counts();

    let rows = conn
        .query(
            schema::INSERT_RECORD,
            &[
                submission.topic.as_str().into(),
                submission.report_en.as_str().into(),
                submission.report_zh.as_str().into(),
                word_count_en.into(),
                word_count_zh.into(),
            ],
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| Error::Persistence("insert returned no row".into()))?;
    let id = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Persistence("insert returned no id".into()))?;
    let created_timestamp = row
        .get(1)
        .and_then(Value::as_text)
        .unwrap_or_default()
        .to_string();

    tracing::info!(record_id = id, topic = %submission.topic, "Saved research record");

    let tags = match &submission.tags {
        Some(tags) => {
            let mut saved = Vec::with_capacity(tags.len());
            for tag in tags {
                match conn
                    .execute(schema::INSERT_TAG, &[id.into(), tag.as_str().into()])
                    .await
                {
                    Ok(_) => saved.push(tag.clone()),
                    Err(e) => {
                        tracing::warn!(record_id = id, tag = %tag, error = %e, "Skipping tag");
                    }
                }
            }
            Some(saved)
        }
        None => None,
    };

    Ok(SavedRecord {
        id,
        topic: submission.topic.clone(),
        tags,
        word_count_en,
        word_count_zh,
        created_timestamp,
    })
}

async fn insert_sources(
    conn: &mut Connection,
    research_id: i64,
    sources: &[SourceInput],
) -> Result<SavedSources> {
    conn.execute("BEGIN", &[]).await?;

    let mut saved = Vec::with_capacity(sources.len());
    for source in sources {
        let domain = extract_domain(&source.url);
        let rows = conn
            .query(
                schema::INSERT_SOURCE,
                &[
                    research_id.into(),
                    source.url.as_str().into(),
                    source.title.clone().into(),
                    domain.as_str().into(),
                ],
            )
            .await?;
        let id = rows
            .first()
            .and_then(|r| r.first())
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Persistence("insert returned no id".into()))?;
        saved.push(SavedSource {
            id,
            url: source.url.clone(),
            title: source.title.clone(),
            domain,
        });
    }

    conn.execute("COMMIT", &[]).await?;
    tracing::info!(research_id, count = saved.len(), "Saved research sources");

    Ok(SavedSources {
        research_id,
        sources: saved,
    })
}
