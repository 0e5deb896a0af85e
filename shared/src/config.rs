//! Configuration management for the RSVP function.
//!
//! Everything is read once at cold start and handed to the handler inside
//! its state; nothing reads the environment at request time.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Conventional credentials file looked up in the working directory.
pub const DEFAULT_CREDENTIALS_FILE: &str = "service_account_rsvp.json";
pub const DEFAULT_SPREADSHEET_NAME: &str = "RSVP Responses";
pub const DEFAULT_WORKSHEET_NAME: &str = "Responses";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Ways of obtaining Google credentials, in resolution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CredentialStrategy {
    /// Path from `GOOGLE_APPLICATION_CREDENTIALS`
    ExplicitFile,
    /// `service_account_rsvp.json` next to the binary's working directory
    DefaultFile,
    /// Platform identity: Secrets Manager via the function role, or GCE metadata
    Ambient,
}

impl CredentialStrategy {
    pub const ALL: [CredentialStrategy; 3] = [
        CredentialStrategy::ExplicitFile,
        CredentialStrategy::DefaultFile,
        CredentialStrategy::Ambient,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CredentialStrategy::ExplicitFile => "file",
            CredentialStrategy::DefaultFile => "default_file",
            CredentialStrategy::Ambient => "ambient",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.name() == value)
            .ok_or_else(|| Error::Config(format!("Unknown credential strategy '{}'", value)))
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit credentials file (`GOOGLE_APPLICATION_CREDENTIALS`)
    pub credentials_path: Option<PathBuf>,
    /// Conventional local credentials file
    pub default_credentials_path: PathBuf,
    /// Secrets Manager secret holding a credentials JSON document
    pub credentials_secret_arn: Option<String>,
    /// Enabled credential strategies, always in canonical order
    pub credential_strategies: Vec<CredentialStrategy>,
    /// Spreadsheet used by POST submissions that don't name one
    pub spreadsheet_id: Option<String>,
    /// Display name used for lookup by name
    pub spreadsheet_name: String,
    /// Fall back to lookup by name when lookup by ID fails
    pub spreadsheet_name_fallback: bool,
    /// Tab the rows are appended to
    pub worksheet_name: String,
    /// Shared key for POST submissions; `None` disables the check
    pub api_key: Option<String>,
    /// Accept query-string (JSONP) submissions
    pub accept_get: bool,
    /// Accept JSON body submissions
    pub accept_post: bool,
    /// Timeout applied to every outbound HTTP call
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_path: None,
            default_credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            credentials_secret_arn: None,
            credential_strategies: CredentialStrategy::ALL.to_vec(),
            spreadsheet_id: None,
            spreadsheet_name: DEFAULT_SPREADSHEET_NAME.to_string(),
            spreadsheet_name_fallback: true,
            worksheet_name: DEFAULT_WORKSHEET_NAME.to_string(),
            api_key: None,
            accept_get: true,
            accept_post: true,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let credential_strategies = match get("CREDENTIAL_STRATEGIES") {
            Some(list) => parse_strategies(&list)?,
            None => defaults.credential_strategies,
        };

        let http_timeout = match get("HTTP_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(secs.trim().parse().map_err(|_| {
                Error::Config(format!("HTTP_TIMEOUT_SECS must be an integer, got '{}'", secs))
            })?),
            None => defaults.http_timeout,
        };

        Ok(Self {
            credentials_path: get("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),
            default_credentials_path: get("DEFAULT_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.default_credentials_path),
            credentials_secret_arn: get("GOOGLE_CREDENTIALS_SECRET_ARN"),
            credential_strategies,
            spreadsheet_id: get("SPREADSHEET_ID"),
            spreadsheet_name: get("SPREADSHEET_NAME").unwrap_or(defaults.spreadsheet_name),
            spreadsheet_name_fallback: parse_flag(
                "SPREADSHEET_NAME_FALLBACK",
                get("SPREADSHEET_NAME_FALLBACK"),
                defaults.spreadsheet_name_fallback,
            )?,
            worksheet_name: get("WORKSHEET_NAME").unwrap_or(defaults.worksheet_name),
            api_key: get("RSVP_API_KEY"),
            accept_get: parse_flag("RSVP_ACCEPT_GET", get("RSVP_ACCEPT_GET"), defaults.accept_get)?,
            accept_post: parse_flag(
                "RSVP_ACCEPT_POST",
                get("RSVP_ACCEPT_POST"),
                defaults.accept_post,
            )?,
            http_timeout,
        })
    }
}

fn parse_flag(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_strategies(list: &str) -> Result<Vec<CredentialStrategy>> {
    let mut strategies = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(CredentialStrategy::parse)
        .collect::<Result<Vec<_>>>()?;

    // Priority is fixed; the variable only switches strategies on or off.
    strategies.sort();
    strategies.dedup();

    if strategies.is_empty() {
        return Err(Error::Config(
            "CREDENTIAL_STRATEGIES must name at least one strategy".to_string(),
        ));
    }
    Ok(strategies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.credentials_path, None);
        assert_eq!(config.default_credentials_path, PathBuf::from("service_account_rsvp.json"));
        assert_eq!(config.spreadsheet_name, "RSVP Responses");
        assert_eq!(config.worksheet_name, "Responses");
        assert!(config.spreadsheet_name_fallback);
        assert!(config.api_key.is_none());
        assert!(config.accept_get && config.accept_post);
        assert_eq!(config.credential_strategies, CredentialStrategy::ALL.to_vec());
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_reads_overrides() {
        let config = config_from(&[
            ("GOOGLE_APPLICATION_CREDENTIALS", "/secrets/key.json"),
            ("SPREADSHEET_NAME", "Wedding"),
            ("SPREADSHEET_NAME_FALLBACK", "false"),
            ("WORKSHEET_NAME", "Guests"),
            ("RSVP_API_KEY", "s3cret"),
            ("RSVP_ACCEPT_GET", "0"),
            ("HTTP_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.credentials_path, Some(PathBuf::from("/secrets/key.json")));
        assert_eq!(config.spreadsheet_name, "Wedding");
        assert!(!config.spreadsheet_name_fallback);
        assert_eq!(config.worksheet_name, "Guests");
        assert_eq!(config.api_key.as_deref(), Some("s3cret"));
        assert!(!config.accept_get);
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_api_key_disables_check() {
        let config = config_from(&[("RSVP_API_KEY", "   ")]).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_strategies_keep_canonical_order() {
        let config = config_from(&[("CREDENTIAL_STRATEGIES", "ambient, file")]).unwrap();
        assert_eq!(
            config.credential_strategies,
            vec![CredentialStrategy::ExplicitFile, CredentialStrategy::Ambient]
        );
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert!(config_from(&[("CREDENTIAL_STRATEGIES", "magic")]).is_err());
        assert!(config_from(&[("CREDENTIAL_STRATEGIES", " , ")]).is_err());
        assert!(config_from(&[("HTTP_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config_from(&[("SPREADSHEET_NAME_FALLBACK", "maybe")]).is_err());
    }
}
