//! Error types for the collective.
//!
//! Uses thiserror for ergonomic error definition. Rule violations are not
//! errors: the rules engine reports them as ordinary [`RuleResult`]s.
//!
//! [`RuleResult`]: crate::rules::RuleResult

use std::time::Duration;

use crate::intent::HandlerName;

/// Failure raised by a handler's own `invoke` implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// The handler could not produce output for this turn
    #[error("Processing failed: {reason}")]
    ProcessingFailed { reason: String },

    /// The backing capability (text generator, lookup, ...) is not available
    #[error("Backend unavailable: {reason}")]
    BackendUnavailable { reason: String },
}

impl HandlerError {
    /// Shorthand for a processing failure
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ProcessingFailed {
            reason: reason.into(),
        }
    }
}

/// What the dispatcher records when a handler produced no result.
///
/// These are absorbed by the synthesizer and never shown to the player.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerFailure {
    /// The handler did not finish within its time budget
    #[error("{handler} timed out after {after:?}")]
    TimedOut { handler: HandlerName, after: Duration },

    /// The handler returned an error
    #[error("{handler} failed: {source}")]
    Failed {
        handler: HandlerName,
        #[source]
        source: HandlerError,
    },

    /// No handler is registered under this name
    #[error("{handler} is not registered")]
    Unavailable { handler: HandlerName },

    /// The handler task panicked or was aborted
    #[error("{handler} task aborted: {reason}")]
    Panicked { handler: HandlerName, reason: String },
}

impl HandlerFailure {
    /// The handler this failure belongs to
    pub fn handler(&self) -> HandlerName {
        match self {
            HandlerFailure::TimedOut { handler, .. }
            | HandlerFailure::Failed { handler, .. }
            | HandlerFailure::Unavailable { handler }
            | HandlerFailure::Panicked { handler, .. } => *handler,
        }
    }
}

/// Faults in the pipeline driver itself.
///
/// The driver logs these to the session's event log; the caller turns them
/// into the fallback response.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The rules gate did not produce a verdict, so nothing downstream may run
    #[error("Rules gate failed: {0}")]
    RulesGate(#[source] HandlerFailure),

    /// A handler reported an effect the session cannot apply
    #[error("Invalid session effect: {reason}")]
    InvalidEffect { reason: String },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value of the wrong shape
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors from saving or loading a session.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Result type for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_display() {
        let failure = HandlerFailure::TimedOut {
            handler: HandlerName::SceneHandler,
            after: Duration::from_millis(50),
        };
        assert_eq!(failure.to_string(), "SceneHandler timed out after 50ms");
        assert_eq!(failure.handler(), HandlerName::SceneHandler);
    }

    #[test]
    fn test_gate_error_wraps_failure() {
        let err = PipelineError::RulesGate(HandlerFailure::Failed {
            handler: HandlerName::RuleOracle,
            source: HandlerError::failed("table missing"),
        });
        assert!(err.to_string().starts_with("Rules gate failed"));
        assert!(err.to_string().contains("table missing"));
    }
}
