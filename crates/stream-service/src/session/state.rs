//! Session lifecycle states.

use serde::Serialize;
use std::fmt;

/// Lifecycle of a stream session.
///
/// ```text
/// Idle -> Retrieving -> Streaming -> Stopped
///              \            \
///               +-> Failed   +-> Failed
/// ```
///
/// `Stopped` is also reachable from `Idle` and `Retrieving` when a session
/// is stopped before audio flows. `Stopped` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Retrieving,
    Streaming,
    Stopped,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Retrieving => "retrieving",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Stopped | SessionStatus::Failed)
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::{Failed, Idle, Retrieving, Stopped, Streaming};
        matches!(
            (self, next),
            (Idle, Retrieving)
                | (Idle, Stopped)
                | (Retrieving, Streaming)
                | (Retrieving, Stopped)
                | (Retrieving, Failed)
                | (Streaming, Stopped)
                | (Streaming, Failed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
