//! Registry of live sessions.
//!
//! The only structure shared across sessions. Holds handles, never session
//! state. Entries are removed by a watcher task when the session task
//! returns its summary.

use crate::observability::metrics;
use crate::session::actor::{SessionSummary, StreamSessionHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Live sessions by id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, StreamSessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a spawned session and watches its task. The entry is
    /// removed and the outcome recorded when the task finishes.
    pub async fn track(
        self: &Arc<Self>,
        handle: StreamSessionHandle,
        task: JoinHandle<SessionSummary>,
    ) {
        let session_id = handle.session_id();
        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session_id, handle);
            metrics::set_active_sessions(sessions.len());
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = task.await;
            let remaining = {
                let mut sessions = registry.sessions.write().await;
                sessions.remove(&session_id);
                sessions.len()
            };
            metrics::set_active_sessions(remaining);

            match outcome {
                Ok(summary) => {
                    metrics::record_session_outcome(summary.status, summary.duration);
                    debug!(
                        target: "stream.session",
                        session_id = %session_id,
                        status = %summary.status,
                        stages_released = summary.stages_released,
                        timer_released = summary.timer_released,
                        "Session removed from registry"
                    );
                }
                Err(e) => {
                    warn!(
                        target: "stream.session",
                        session_id = %session_id,
                        error = %e,
                        "Session task ended abnormally"
                    );
                }
            }
        });
    }

    pub async fn get(&self, session_id: &Uuid) -> Option<StreamSessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Cancels every live session. Returns how many were signalled.
    pub async fn stop_all(&self) -> usize {
        let sessions = self.sessions.read().await;
        for handle in sessions.values() {
            handle.cancel();
        }
        sessions.len()
    }
}
