use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;
use tracing::info;

use crate::resource::Role;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key} value '{value}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("missing value after {0}")]
    MissingArgument(String),

    #[error("unknown argument '{0}'")]
    UnknownArgument(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub session_file: PathBuf,
    pub token_key: String,
    pub role: Role,
    pub delete_timeout: Duration,
    pub debug: bool,
}

impl Config {
    /// `.env`, then the process environment, then command-line flags.
    pub fn load(args: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_sources(args, |key| env::var(key).ok())
    }

    fn from_sources(
        args: impl IntoIterator<Item = String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut role: Role = try_load(&lookup, "UNIDESK_ROLE", "admin")?;
        let mut debug = false;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--debug" {
                debug = true;
            } else if arg == "--role" {
                let value = args
                    .next()
                    .ok_or_else(|| ConfigError::MissingArgument(arg.clone()))?;
                role = parse("--role", &value)?;
            } else if let Some(value) = arg.strip_prefix("--role=") {
                role = parse("--role", value)?;
            } else {
                return Err(ConfigError::UnknownArgument(arg));
            }
        }

        let api_url: Url = try_load(&lookup, "UNIDESK_API_URL", "http://127.0.0.1:8000/api")?;
        if api_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                key: "UNIDESK_API_URL".into(),
                value: api_url.to_string(),
                reason: "not an http(s) base URL".into(),
            });
        }
        let secs: u64 = try_load(&lookup, "UNIDESK_DELETE_TIMEOUT_SECS", "10")?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                key: "UNIDESK_DELETE_TIMEOUT_SECS".into(),
                value: secs.to_string(),
                reason: "must be at least one second".into(),
            });
        }

        Ok(Self {
            api_url: api_url.as_str().trim_end_matches('/').to_string(),
            session_file: try_load(&lookup, "UNIDESK_SESSION_FILE", "session.json")?,
            token_key: try_load(&lookup, "UNIDESK_TOKEN_KEY", "token")?,
            role,
            delete_timeout: Duration::from_secs(secs),
            debug,
        })
    }
}

fn try_load<T: FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        });
    parse(key, &value)
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
