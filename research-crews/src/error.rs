//! Error taxonomy shared by the tool wrappers.
//!
//! Only [`Error::Configuration`] is meant to escape a tool call. Transport and
//! persistence failures are caught at the tool boundary and reported inside
//! the JSON result instead.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required secret is missing. Raised before any I/O.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// HTTP request failed or returned a non-2xx status.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Database statement or connection failure.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl Error {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
