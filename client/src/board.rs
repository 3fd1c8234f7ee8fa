use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use timestore_common::message::StoredMessage;

use crate::wallet::ConnectionState;

/// Display state shared between the scheduler and user-action handlers.
///
/// Scheduled ticks and manual refreshes both write here. Whichever result is
/// applied last is what gets shown; the revision counter orders writes.
#[derive(Clone, Debug, Default)]
pub struct MessageBoard {
    inner: Arc<RwLock<BoardState>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardState {
    pub connection: ConnectionState,
    /// Unlocked messages from the most recent successful refresh.
    pub messages: Vec<StoredMessage>,
    /// Bumped on every applied refresh.
    pub revision: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Last error from a refresh or submission, cleared by the next success.
    pub last_error: Option<String>,
}

impl MessageBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connection(&self, state: ConnectionState) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .connection = state;
    }

    /// Replace the shown messages. Returns the new revision.
    pub fn apply(&self, messages: Vec<StoredMessage>) -> u64 {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.messages = messages;
        state.revision += 1;
        state.refreshed_at = Some(Utc::now());
        state.last_error = None;
        state.revision
    }

    pub fn report_error(&self, error: impl ToString) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .last_error = Some(error.to_string());
    }

    pub fn snapshot(&self) -> BoardState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
