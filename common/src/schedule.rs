use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// When the next scheduled poll of the contract will run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSchedule {
    pub interval_minutes: u32,
    pub next_refresh_at: DateTime<Utc>,
}

impl RefreshSchedule {
    /// Schedule the poll following one that ran at `now`.
    pub fn after(now: DateTime<Utc>, interval_minutes: u32) -> Self {
        Self {
            interval_minutes,
            next_refresh_at: now + Duration::minutes(i64::from(interval_minutes)),
        }
    }

    /// Local wall-clock time of the next poll, `HH:MM`.
    #[cfg(feature = "std")]
    pub fn next_refresh_label(&self) -> String {
        self.next_refresh_at
            .with_timezone(&chrono::Local)
            .format("%H:%M")
            .to_string()
    }
}
