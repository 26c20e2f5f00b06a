//! Stream sessions: one actor per client stream, plus the registry of
//! live sessions.

pub mod actor;
pub mod body;
pub mod registry;
pub mod state;

pub use actor::{
    SessionRequest, SessionSettings, SessionSnapshot, SessionSummary, StreamSession,
    StreamSessionHandle,
};
pub use body::SessionBody;
pub use registry::SessionRegistry;
pub use state::SessionStatus;
