//! Error types for run contexts.

use std::fmt;

use thiserror::Error;

use crate::process::StreamName;

/// Why a run context reached its finished phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited (normally or by signal).
    Exited,
    /// The process failed to launch or the transport reported an error.
    Errored,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited => write!(f, "exited"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Failure of an `output_contains` watch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum WatchError {
    #[error("child process {reason} before its output contained the requested content: {pattern}")]
    Unmet { pattern: String, reason: Termination },

    #[error("run context was dropped before its output contained the requested content")]
    Abandoned,
}

/// Usage errors from stream operations on a run context.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    #[error("invalid stream name: '{0}'. Valid names are 'stdin', 'stdout', or 'stderr'.")]
    InvalidName(String),

    #[error("{0} is closed")]
    Closed(StreamName),

    #[error("{0} is not available for this process")]
    Unavailable(StreamName),

    #[error("process is not attached to a pseudo-terminal")]
    NotATerminal,

    #[error("pty error: {0}")]
    Pty(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to deliver a termination signal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TerminateError {
    #[error("failed to send {signal} to child process: {source}")]
    Signal {
        signal: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("cannot deliver signals to this process on this platform")]
    Unsupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_unmet_message_names_reason_and_pattern() {
        let err = WatchError::Unmet {
            pattern: "ready".to_string(),
            reason: Termination::Errored,
        };
        assert_eq!(
            err.to_string(),
            "child process errored before its output contained the requested content: ready"
        );
    }

    #[test]
    fn test_invalid_stream_name_message() {
        let err = StreamError::InvalidName("stdio".to_string());
        assert_eq!(
            err.to_string(),
            "invalid stream name: 'stdio'. Valid names are 'stdin', 'stdout', or 'stderr'."
        );
    }

    #[test]
    fn test_closed_stream_message() {
        assert_eq!(StreamError::Closed(StreamName::Stdin).to_string(), "stdin is closed");
    }
}
