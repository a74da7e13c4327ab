//! Values the engine hands out: stream items, states and tick outcomes.

use crate::error::FeedError;

/// One unit of delivered work: a document or a surfaced error.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem<T> {
    /// Filename the document came from. Empty for the mailbox and for
    /// failed polls.
    pub source: String,
    pub result: Result<T, FeedError>,
}

impl<T> StreamItem<T> {
    pub fn document(source: impl Into<String>, document: T) -> Self {
        Self {
            source: source.into(),
            result: Ok(document),
        }
    }

    pub fn failed(error: FeedError) -> Self {
        Self {
            source: String::new(),
            result: Err(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }

    pub fn document_ref(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&FeedError> {
        self.result.as_ref().err()
    }
}

/// Lifecycle of a sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for the next tick.
    Idle,
    /// A tick is in flight (polling or emitting).
    Polling,
    /// Cancelled or abandoned by its consumer. Final.
    Terminated,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Terminated)
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing new; no item emitted.
    NoNewData,
    /// `items` documents emitted; the cursor now points at `cursor`.
    Delivered { items: usize, cursor: String },
    /// One error item emitted; the cursor did not move.
    Failed(FeedError),
    /// Cancellation was observed, or the consumer went away.
    Cancelled,
}
