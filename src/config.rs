//! Link configuration

use std::time::Duration;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Globals
// —————————————————————————————————————————————————————————————————————————————————————————————————

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Config
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Recognized messages kept for diagnostics. 0 disables the history.
    pub history_capacity:        usize,
    /// Used by `await_message` when no timeout is given.
    pub default_timeout:         Duration,
    /// Go back to resynchronization whenever a message leaves the buffer empty,
    /// so bytes between messages are dropped instead of buffered.
    pub resync_between_messages: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            history_capacity:        DEFAULT_HISTORY_CAPACITY,
            default_timeout:         DEFAULT_TIMEOUT,
            resync_between_messages: false,
        }
    }
}

impl LinkConfig {
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_resync_between_messages(mut self, enabled: bool) -> Self {
        self.resync_between_messages = enabled;
        self
    }
}
