//! Output patterns and pending watch requests.

use std::fmt;

use regex::Regex;
use tokio::sync::oneshot;

use crate::error::{Termination, WatchError};

/// What `output_contains` waits for.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Plain substring.
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    pub fn is_found_in(&self, haystack: &str) -> bool {
        match self {
            Pattern::Literal(needle) => haystack.contains(needle.as_str()),
            Pattern::Regex(re) => re.is_match(haystack),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(needle) => write!(f, "{needle}"),
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Pattern::Literal(value.to_string())
    }
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        Pattern::Literal(value)
    }
}

impl From<Regex> for Pattern {
    fn from(value: Regex) -> Self {
        Pattern::Regex(value)
    }
}

impl From<&Regex> for Pattern {
    fn from(value: &Regex) -> Self {
        Pattern::Regex(value.clone())
    }
}

pub(crate) type WatchOutcome = Result<(), WatchError>;

/// A registered `output_contains` call waiting for its pattern.
///
/// Dropping one unsettled makes its future resolve to [`WatchError::Abandoned`].
#[derive(Debug)]
pub(crate) struct WatchRequest {
    pub pattern: Pattern,
    tx: oneshot::Sender<WatchOutcome>,
}

impl WatchRequest {
    pub(crate) fn new(pattern: Pattern) -> (Self, oneshot::Receiver<WatchOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { pattern, tx }, rx)
    }

    pub(crate) fn fulfill(self) {
        let _ = self.tx.send(Ok(()));
    }

    pub(crate) fn fail(self, reason: Termination) {
        let pattern = self.pattern.to_string();
        let _ = self.tx.send(Err(WatchError::Unmet { pattern, reason }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern_is_substring_search() {
        let pattern = Pattern::from("> ");
        assert!(pattern.is_found_in("Welcome\n> "));
        assert!(!pattern.is_found_in("Welcome\n>"));
    }

    #[test]
    fn test_regex_pattern_matches_anywhere() {
        let pattern = Pattern::from(Regex::new(r"listening on \d+").unwrap());
        assert!(pattern.is_found_in("server listening on 8080\n"));
        assert!(!pattern.is_found_in("server listening on port"));
    }

    #[test]
    fn test_pattern_display() {
        assert_eq!(Pattern::from("ready").to_string(), "ready");
        assert_eq!(Pattern::from(Regex::new(r"\d+").unwrap()).to_string(), r"/\d+/");
    }

    #[test]
    fn test_request_settles_its_receiver() {
        let (request, mut rx) = WatchRequest::new(Pattern::from("x"));
        request.fail(Termination::Exited);
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(WatchError::Unmet {
                pattern: "x".to_string(),
                reason: Termination::Exited
            })
        );
    }
}
