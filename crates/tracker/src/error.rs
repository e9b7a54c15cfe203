//! Error types for issue tracker operations.

use thiserror::Error;

/// Errors that can occur when talking to an issue tracker.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The item, label or comment does not exist (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request was rejected as invalid (HTTP 422), e.g. a label that
    /// already exists.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// API returned any other error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackerError {
    /// Whether this error means the target is already absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Build an error from a non-success status code and response body.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => Self::NotFound(message),
            422 => Self::Validation(message),
            _ => Self::Api { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_mapping() {
        assert!(TrackerError::from_status(404, "gone").is_not_found());
        assert!(matches!(
            TrackerError::from_status(422, "already_exists"),
            TrackerError::Validation(_)
        ));
        assert!(matches!(
            TrackerError::from_status(502, "bad gateway"),
            TrackerError::Api { status: 502, .. }
        ));
    }

    #[test]
    fn test_display() {
        let err = TrackerError::from_status(403, "rate limited");
        assert_eq!(err.to_string(), "API error: 403 - rate limited");
        assert!(!err.is_not_found());
    }
}
