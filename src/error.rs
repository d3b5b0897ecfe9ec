use reqwest::StatusCode;
use thiserror::Error;

use crate::model::Envelope;

/// Every failure a resource operation can end in. Raw response shapes are
/// folded into one of these at the transport boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("not authenticated: {0}")]
    Auth(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {message}")]
    Validation {
        field: Option<String>,
        message: String,
        /// Every reason the server gave, in the order it gave them.
        fields: Vec<(String, Vec<String>)>,
    },

    #[error("record not found")]
    NotFound,

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Contract(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("request timed out".into())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl ApiError {
    /// Client-side required-field failure; raised before any request is sent.
    pub fn required(field: &str, label: &str) -> Self {
        ApiError::Validation {
            field: Some(field.to_string()),
            message: format!("{} is required.", label),
            fields: vec![(field.to_string(), vec![format!("{} is required.", label)])],
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    /// Text shown in the message footer.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => {
                "Could not reach the server. Press 'r' to try again.".to_string()
            }
            ApiError::Auth(_) => {
                "Your session has expired or is missing. Please sign in again, then press 'r'."
                    .to_string()
            }
            ApiError::Forbidden(reason) if !reason.trim().is_empty() => reason.clone(),
            ApiError::Forbidden(_) => "You are not allowed to do that.".to_string(),
            ApiError::Validation {
                message, fields, ..
            } => {
                let total: usize = fields.iter().map(|(_, reasons)| reasons.len()).sum();
                if total > 1 {
                    format!("{} (+{} more)", message, total - 1)
                } else {
                    message.clone()
                }
            }
            ApiError::NotFound => {
                "That record no longer exists. Press 'r' to refresh the list.".to_string()
            }
            ApiError::Server { status, .. } => {
                format!("The server failed ({}). Press 'r' to try again.", status)
            }
            ApiError::Contract(detail) => format!("Unexpected response from the server: {}", detail),
        }
    }
}

/// Map an HTTP status plus its decoded envelope to success or a typed error.
pub fn check(status: StatusCode, envelope: Envelope) -> Result<Envelope, ApiError> {
    match status {
        StatusCode::UNAUTHORIZED => {
            return Err(ApiError::Auth(
                envelope.reason().unwrap_or_else(|| "unauthorized".into()),
            ));
        }
        StatusCode::FORBIDDEN => {
            return Err(ApiError::Forbidden(envelope.reason().unwrap_or_default()));
        }
        StatusCode::NOT_FOUND => return Err(ApiError::NotFound),
        _ => {}
    }
    if status.is_server_error() {
        return Err(ApiError::Server {
            status: status.as_u16(),
            message: envelope.reason().unwrap_or_default(),
        });
    }

    let failed = !status.is_success() || envelope.success == Some(false);
    if !failed {
        return Ok(envelope);
    }

    let fields = envelope.field_errors();
    if let Some((field, message)) = fields
        .iter()
        .find_map(|(f, reasons)| reasons.first().map(|r| (f.clone(), r.clone())))
    {
        return Err(ApiError::Validation {
            field: Some(field),
            message,
            fields,
        });
    }
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        let message = envelope
            .reason()
            .unwrap_or_else(|| "The submitted data was rejected.".into());
        return Err(ApiError::Validation {
            field: None,
            message,
            fields: Vec::new(),
        });
    }
    // business rule rejections (400, 409, or 2xx with success=false)
    Err(ApiError::Forbidden(envelope.reason().unwrap_or_default()))
}
