//! Process configuration.
//!
//! Secrets are read once at startup (CLI flags, falling back to environment
//! variables) and handed to each component by reference. Components never
//! look at the environment themselves, so a missing secret can be exercised
//! in tests by leaving a field as `None`.

use clap::Args;

use crate::error::{Error, Result};

/// Pushover message endpoint.
pub const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";
/// Serper Google search endpoint.
pub const SERPER_URL: &str = "https://google.serper.dev/search";

/// API keys and endpoints for the external services the tools talk to.
#[derive(Debug, Clone, Default, Args)]
pub struct Secrets {
    /// Pushover user key
    #[arg(long, env = "PUSHOVER_USER", hide_env_values = true)]
    pub pushover_user: Option<String>,

    /// Pushover application token
    #[arg(long, env = "PUSHOVER_TOKEN", hide_env_values = true)]
    pub pushover_token: Option<String>,

    /// Turso / libSQL database URL (libsql://, https:// or a local file path)
    #[arg(long, env = "TURSO_DATABASE_URL")]
    pub turso_database_url: Option<String>,

    /// Turso auth token
    #[arg(long, env = "TURSO_AUTH_TOKEN", hide_env_values = true)]
    pub turso_auth_token: Option<String>,

    /// Serper.dev API key for web search
    #[arg(long, env = "SERPER_API_KEY", hide_env_values = true)]
    pub serper_api_key: Option<String>,
}

/// Pushover credentials, present only when both halves are set.
#[derive(Debug, Clone)]
pub struct PushoverCredentials {
    pub user: String,
    pub token: String,
}

/// Database credentials, present only when both halves are set.
#[derive(Debug, Clone)]
pub struct DatabaseCredentials {
    pub url: String,
    pub auth_token: String,
}

/// Treat blank values the same as unset ones.
fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Secrets {
    pub fn pushover(&self) -> Result<PushoverCredentials> {
        match (present(&self.pushover_user), present(&self.pushover_token)) {
            (Some(user), Some(token)) => Ok(PushoverCredentials { user, token }),
            _ => Err(Error::Configuration(
                "PUSHOVER_USER or PUSHOVER_TOKEN not set".to_string(),
            )),
        }
    }

    pub fn database(&self) -> Result<DatabaseCredentials> {
        match (present(&self.turso_database_url), present(&self.turso_auth_token)) {
            (Some(url), Some(auth_token)) => Ok(DatabaseCredentials { url, auth_token }),
            _ => Err(Error::Configuration(
                "TURSO_DATABASE_URL and TURSO_AUTH_TOKEN must be set".to_string(),
            )),
        }
    }

    pub fn serper_key(&self) -> Result<String> {
        present(&self.serper_api_key)
            .ok_or_else(|| Error::Configuration("SERPER_API_KEY not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Secrets {
        Secrets {
            pushover_user: Some("u".into()),
            pushover_token: Some("t".into()),
            turso_database_url: Some("libsql://db.example.turso.io".into()),
            turso_auth_token: Some("jwt".into()),
            serper_api_key: Some("k".into()),
        }
    }

    #[test]
    fn complete_pairs_resolve() {
        let s = full();
        let p = s.pushover().unwrap();
        assert_eq!(p.user, "u");
        assert_eq!(p.token, "t");
        let d = s.database().unwrap();
        assert_eq!(d.url, "libsql://db.example.turso.io");
        assert_eq!(s.serper_key().unwrap(), "k");
    }

    #[test]
    fn missing_half_is_configuration_error() {
        let mut s = full();
        s.pushover_token = None;
        assert!(s.pushover().unwrap_err().is_configuration());

        let mut s = full();
        s.turso_database_url = None;
        assert!(s.database().unwrap_err().is_configuration());

        assert!(Secrets::default().serper_key().unwrap_err().is_configuration());
    }

    #[test]
    fn blank_counts_as_missing() {
        let mut s = full();
        s.turso_auth_token = Some("   ".into());
        assert!(s.database().is_err());
    }
}
