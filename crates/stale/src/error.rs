//! Error types for the lifecycle engine.

use thiserror::Error;
use tracker::{ParseItemKindError, TrackerError};

/// Errors that can abort an engine call.
#[derive(Debug, Error)]
pub enum StaleError {
    /// Issue tracker call failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// An item kind other than `issues`/`pulls` was requested.
    #[error(transparent)]
    UnknownItemKind(#[from] ParseItemKindError),

    /// Configuration file could not be read.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StaleError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Tracker(e) if e.is_not_found())
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, StaleError>;

/// Treat a NotFound outcome as success.
///
/// Items, labels and comments can disappear between discovery and mutation;
/// that is not a failure of the run.
pub(crate) fn ignore_not_found(
    result: std::result::Result<(), TrackerError>,
) -> std::result::Result<(), TrackerError> {
    match result {
        Err(e) if e.is_not_found() => {
            tracing::debug!(error = %e, "Target already absent, ignoring");
            Ok(())
        }
        other => other,
    }
}
