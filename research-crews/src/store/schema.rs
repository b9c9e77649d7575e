//! Table definitions for research records and their child rows.

pub const CREATE_RECORDS: &str = "CREATE TABLE IF NOT EXISTS research_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    report_en TEXT,
    report_zh TEXT,
    word_count_en INTEGER,
    word_count_zh INTEGER,
    created_timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

pub const CREATE_TAGS: &str = "CREATE TABLE IF NOT EXISTS research_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    research_id INTEGER NOT NULL REFERENCES research_records(id),
    tag TEXT NOT NULL,
    UNIQUE(research_id, tag)
)";

pub const CREATE_SOURCES: &str = "CREATE TABLE IF NOT EXISTS research_sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    research_id INTEGER NOT NULL REFERENCES research_records(id),
    url TEXT NOT NULL,
    title TEXT,
    domain TEXT
)";

pub const CREATE_INDEXES: &str =
    "CREATE INDEX IF NOT EXISTS idx_research_sources_research_id ON research_sources(research_id)";

/// Statements applied by `RecordStore::ensure_schema`, in order.
pub const ALL: &[&str] = &[CREATE_RECORDS, CREATE_TAGS, CREATE_SOURCES, CREATE_INDEXES];

pub const INSERT_RECORD: &str = "INSERT INTO research_records
    (topic, report_en, report_zh, word_count_en, word_count_zh)
    VALUES (?, ?, ?, ?, ?)
    RETURNING id, created_timestamp";

pub const INSERT_TAG: &str = "INSERT INTO research_tags (research_id, tag) VALUES (?, ?)";

pub const INSERT_SOURCE: &str = "INSERT INTO research_sources (research_id, url, title, domain)
    VALUES (?, ?, ?, ?)
    RETURNING id";
