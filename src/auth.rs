use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot read session storage: {0}")]
    Io(#[from] io::Error),

    #[error("session storage is not a JSON object: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Where the bearer token lives. Implementations are read on every request
/// and must not hold the token in memory between calls.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Result<Option<String>, SessionError>;

    /// Called when the server rejected the token; the re-authentication hook.
    fn on_unauthorized(&self) {}
}

/// Persisted session storage: a JSON object holding the token under a well-known key.
/// Written by the sign-in flow, only ever read here.
#[derive(Debug, Clone)]
pub struct SessionFile {
    path: PathBuf,
    key: String,
}

impl SessionFile {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }
}

impl TokenSource for SessionFile {
    fn token(&self) -> Result<Option<String>, SessionError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let storage: Value = serde_json::from_str(&raw)?;
        Ok(storage
            .get(&self.key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }

    fn on_unauthorized(&self) {
        warn!(
            "Session in {} was rejected by the server; sign in again to refresh it",
            self.path.display()
        );
    }
}

/// Shared, read-only view of the current session handed to every controller.
#[derive(Clone)]
pub struct AuthContext {
    source: Arc<dyn TokenSource>,
}

impl AuthContext {
    pub fn new(source: impl TokenSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Fresh read of the token; a missing token fails before any request is
    /// made and fires the same hook as a rejected one.
    pub fn bearer(&self) -> Result<String, ApiError> {
        let err = match self.source.token() {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {
                debug!("No session token in storage");
                ApiError::Auth("no session token".into())
            }
            Err(e) => {
                warn!("Session storage unreadable: {}", e);
                ApiError::Auth(e.to_string())
            }
        };
        self.source.on_unauthorized();
        Err(err)
    }

    pub fn unauthorized(&self) {
        self.source.on_unauthorized();
    }
}

#[cfg(test)]
pub(crate) struct StaticToken(pub Option<&'static str>);

#[cfg(test)]
impl TokenSource for StaticToken {
    fn token(&self) -> Result<Option<String>, SessionError> {
        Ok(self.0.map(str::to_string))
    }
}

/// Counts re-authentication requests.
#[cfg(test)]
pub(crate) struct CountingToken {
    pub token: Option<&'static str>,
    pub hook_calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl TokenSource for Arc<CountingToken> {
    fn token(&self) -> Result<Option<String>, SessionError> {
        Ok(self.token.map(str::to_string))
    }

    fn on_unauthorized(&self) {
        self.hook_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}
