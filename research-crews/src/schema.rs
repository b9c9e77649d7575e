//! Structured output of the research task.
//!
//! The researcher agent is asked to answer with a JSON object of this shape.
//! [`parse_output`] pulls that object out of the model's reply and checks the
//! constraints serde alone cannot express.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchDepth {
    Surface,
    Moderate,
    Comprehensive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

/// A source found during investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSource {
    pub url: String,
    pub title: String,
    /// Why the source is relevant and what it contributes.
    pub relevance: String,
    /// academic, news, blog, documentation, forum, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_information: Option<String>,
    /// 1 to 10.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutput {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_search_queries: Option<Vec<String>>,
    pub sources: Vec<ResearchSource>,
    pub summary: String,
    pub tags: Vec<String>,
    pub research_depth: ResearchDepth,
    pub confidence_level: ConfidenceLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limitations: Option<Vec<String>>,
}

pub const MIN_SOURCES: usize = 3;
pub const MIN_TAGS: usize = 3;
pub const MAX_TAGS: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("no JSON object found in output")]
    NoJson,
    #[error("invalid research output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid research output: {0}")]
    Validation(String),
}

impl ResearchOutput {
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.sources.len() < MIN_SOURCES {
            return Err(SchemaError::Validation(format!(
                "expected at least {MIN_SOURCES} sources, got {}",
                self.sources.len()
            )));
        }
        if !(MIN_TAGS..=MAX_TAGS).contains(&self.tags.len()) {
            return Err(SchemaError::Validation(format!(
                "expected {MIN_TAGS}-{MAX_TAGS} tags, got {}",
                self.tags.len()
            )));
        }
        for source in &self.sources {
            if let Some(score) = source.quality_score
                && !(1..=10).contains(&score)
            {
                return Err(SchemaError::Validation(format!(
                    "quality_score {score} for {} is outside 1-10",
                    source.url
                )));
            }
        }
        Ok(())
    }

    /// JSON Schema-ish description embedded in the task prompt.
    pub fn prompt_hint() -> &'static str {
        r#"Respond with ONLY a JSON object of this shape:
{
  "topic": string,
  "used_search_queries": [string] (optional),
  "sources": [{"url": string, "title": string, "relevance": string,
               "source_type": string (optional), "publication_date": string (optional),
               "key_information": string (optional), "quality_score": 1-10 (optional)}] (at least 3),
  "summary": string,
  "tags": [string] (3 to 7),
  "research_depth": "surface" | "moderate" | "comprehensive",
  "confidence_level": "low" | "medium" | "high",
  "limitations": [string] (optional)
}"#
    }
}

/// Slice out the outermost `{ ... }` of a model reply, which may wrap it in a
/// code fence or prose.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

pub fn parse_output(text: &str) -> Result<ResearchOutput, SchemaError> {
    let json = extract_json(text).ok_or(SchemaError::NoJson)?;
    let output: ResearchOutput = serde_json::from_str(json)?;
    output.validate()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tags: usize, sources: usize) -> String {
        let sources: Vec<String> = (0..sources)
            .map(|i| {
                format!(
                    r#"{{"url": "https://s{i}.com", "title": "S{i}", "relevance": "r", "quality_score": 7}}"#
                )
            })
            .collect();
        let tags: Vec<String> = (0..tags).map(|i| format!("\"t{i}\"")).collect();
        format!(
            r#"{{"topic": "LLMs", "sources": [{}], "summary": "s", "tags": [{}],
                "research_depth": "moderate", "confidence_level": "high"}}"#,
            sources.join(","),
            tags.join(",")
        )
    }

    #[test]
    fn parses_fenced_output() {
        let text = format!("Here you go:\n```json\n{}\n```", sample(3, 3));
        let out = parse_output(&text).unwrap();
        assert_eq!(out.topic, "LLMs");
        assert_eq!(out.research_depth, ResearchDepth::Moderate);
        assert_eq!(out.confidence_level, ConfidenceLevel::High);
        assert_eq!(out.sources[0].quality_score, Some(7));
    }

    #[test]
    fn too_few_sources() {
        let err = parse_output(&sample(3, 2)).unwrap_err();
        assert!(matches!(err, SchemaError::Validation(_)));
    }

    #[test]
    fn tag_bounds() {
        assert!(parse_output(&sample(2, 3)).is_err());
        assert!(parse_output(&sample(7, 3)).is_ok());
        assert!(parse_output(&sample(8, 3)).is_err());
    }

    #[test]
    fn quality_score_range() {
        let text = sample(3, 3).replacen("\"quality_score\": 7", "\"quality_score\": 0", 1);
        assert!(matches!(
            parse_output(&text).unwrap_err(),
            SchemaError::Validation(_)
        ));
    }

    #[test]
    fn unknown_depth_is_rejected() {
        let text = sample(3, 3).replace("moderate", "deep");
        assert!(matches!(parse_output(&text).unwrap_err(), SchemaError::Json(_)));
    }

    #[test]
    fn no_json() {
        assert!(matches!(parse_output("sorry").unwrap_err(), SchemaError::NoJson));
    }
}
