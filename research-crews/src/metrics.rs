//! Length metrics stored alongside each report body.

/// Number of whitespace-delimited tokens. Used for the English report.
pub fn word_count(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

/// Number of non-whitespace characters. Used for the Chinese report, where
/// words are not space separated.
pub fn non_whitespace_chars(text: &str) -> i64 {
    text.chars().filter(|c| !c.is_whitespace()).count() as i64
}
