//! Error type shared by the client, the session cache and the preview workflows.

use reqwest::StatusCode;

/// Everything that can go wrong between the terminal and the backend.
///
/// Calculator-level problems (bad timestamps, non-numeric meters, a missing
/// denomination) never show up here: they are absorbed by the preview itself.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// The backend answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Api {
        status: StatusCode,
        /// Readable message taken from the response `detail`.
        message: String,
    },

    /// The request never produced a response (connect, timeout, TLS...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Local session cache failure.
    #[error("session storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Input rejected before anything was sent.
    #[error("{0}")]
    Validation(String),

    #[error("no active session; run `casino-console login` first")]
    NotAuthenticated,

    /// The stored role may not run the requested command.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl ConsoleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP status for backend errors, `None` for everything else.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_carries_message_and_status() {
        let err = ConsoleError::Api {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "La fecha final debe ser mayor o igual a la fecha inicial".into(),
        };
        assert_eq!(
            err.to_string(),
            "La fecha final debe ser mayor o igual a la fecha inicial (HTTP 422 Unprocessable Entity)"
        );
        assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn validation_has_no_status() {
        let err = ConsoleError::validation("bad input");
        assert_eq!(err.to_string(), "bad input");
        assert!(err.status().is_none());
    }
}
