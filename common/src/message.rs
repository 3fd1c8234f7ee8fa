use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned by the contract. Zero marks a placeholder.
pub type MessageId = u64;

/// Id the contract returns for entries that are not yet unlocked.
pub const PLACEHOLDER_ID: MessageId = 0;

/// Row format used when listing unlocked messages.
pub const UNLOCK_LABEL_FORMAT: &str = "%d %b %y, %H:%M";

/// One record as returned by `getMsgTimed()`.
///
/// Decoded once at the contract boundary; everything downstream works with
/// these typed values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    /// Unix seconds after which the contract reveals the text.
    pub unlock_time: u64,
    pub text: String,
}

impl StoredMessage {
    pub fn is_placeholder(&self) -> bool {
        self.id == PLACEHOLDER_ID
    }

    /// `None` when the timestamp is outside chrono's representable range.
    pub fn unlock_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.unlock_time)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Render the unlock time in the given zone, e.g. `14 Nov 23, 22:13`.
    pub fn unlock_label<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        match self.unlock_at() {
            Some(at) => at.with_timezone(tz).format(UNLOCK_LABEL_FORMAT).to_string(),
            None => self.unlock_time.to_string(),
        }
    }
}

/// Why user input could not become a [`SubmissionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestError {
    EmptyText,
    InvalidUnlockTime(i64),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "message text must not be empty"),
            Self::InvalidUnlockTime(ts) => write!(f, "unlock time {ts} is before the unix epoch"),
        }
    }
}

impl std::error::Error for RequestError {}

/// A message to store, built from user input at submit time.
///
/// Consumed by the submit call; never retained afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    text: String,
    unlock_at: u64,
}

impl SubmissionRequest {
    pub fn new(text: impl Into<String>, unlock_at: u64) -> Result<Self, RequestError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RequestError::EmptyText);
        }
        Ok(Self { text, unlock_at })
    }

    /// Build from a picked date/time, truncated to whole seconds.
    pub fn at(text: impl Into<String>, unlock_at: DateTime<Utc>) -> Result<Self, RequestError> {
        let secs = unlock_at.timestamp();
        let secs = u64::try_from(secs).map_err(|_| RequestError::InvalidUnlockTime(secs))?;
        Self::new(text, secs)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn unlock_at(&self) -> u64 {
        self.unlock_at
    }
}
