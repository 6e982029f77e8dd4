use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::parser::{DocumentParser, ParseOutcome, ParseRequest};

/// Parser double that records calls and replays a configurable outcome
pub struct StubParser {
    outcome: Mutex<Option<ParseOutcome>>,
    calls: AtomicUsize,
}

impl StubParser {
    pub fn returning(content: &str) -> Self {
        Self::with(Some(ParseOutcome::content(content)))
    }

    pub fn unsupported() -> Self {
        Self::with(Some(ParseOutcome::unsupported()))
    }

    /// Every call fails with a parser error
    pub fn failing() -> Self {
        Self::with(None)
    }

    fn with(outcome: Option<ParseOutcome>) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_content(&self, content: &str) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(ParseOutcome::content(content));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DocumentParser for StubParser {
    async fn parse(&self, _request: &ParseRequest) -> Result<ParseOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::Parser("parser unavailable (503)".to_string()))
    }
}
