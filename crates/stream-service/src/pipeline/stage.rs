//! External pipeline stage abstraction.
//!
//! A stage is one external process in the data path (retrieval or
//! transcode). The session never touches a stage directly once it is
//! running: a monitor task owns it, forwards its progress events, observes
//! its exit, and kills it on request.

use crate::errors::StreamError;
use crate::quality::QualityProfile;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Readable end of a stage (its stdout).
pub type StageReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable end of a stage (its stdin).
pub type StageWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed stage as returned by a launcher.
pub type BoxedStage = Box<dyn PipelineStage>;

/// How long a monitor keeps forwarding events after the stage exits.
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Which stage of the pipeline this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Retrieval,
    Transcode,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Retrieval => "retrieval",
            StageKind::Transcode => "transcode",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Out-of-band signal emitted by a stage while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// Cumulative output size reported by the stage.
    Progress { total_bytes: u64 },
    /// The stage reported it finished its work.
    End,
    /// The stage reported a failure.
    Error { message: String },
}

/// Exit status of a stage. `code` is `None` when the process was killed by
/// a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageExit {
    pub code: Option<i32>,
}

impl StageExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// One running external stage.
#[async_trait::async_trait]
pub trait PipelineStage: Send {
    /// Takes the stage's output stream. Returns `None` after the first call.
    fn take_output(&mut self) -> Option<StageReader>;

    /// Takes the stage's input stream, if it has one.
    fn take_input(&mut self) -> Option<StageWriter>;

    /// Takes the stage's event stream, if it reports progress.
    fn take_events(&mut self) -> Option<mpsc::Receiver<StageEvent>>;

    /// Waits for the stage to exit. Must be cancel safe.
    async fn wait(&mut self) -> std::io::Result<StageExit>;

    /// Requests termination. Killing an exited stage is a no-op.
    async fn kill(&mut self);
}

/// Launches stages. Real and mock implementations sit behind this seam.
#[async_trait::async_trait]
pub trait PipelineLauncher: Send + Sync {
    /// Starts the retrieval stage for a media reference.
    async fn launch_retrieval(&self, reference: &str) -> Result<BoxedStage, StreamError>;

    /// Starts the transcode stage for a profile and seek offset (seconds).
    async fn launch_transcode(
        &self,
        seek_offset: f64,
        profile: &QualityProfile,
    ) -> Result<BoxedStage, StreamError>;

    /// Asks the retrieval tool for the media duration. Returns the raw
    /// duration text the tool printed.
    async fn probe_duration(&self, reference: &str) -> Result<String, StreamError>;
}

/// What a stage monitor reports back to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageReport {
    Event { kind: StageKind, event: StageEvent },
    Exited {
        kind: StageKind,
        exit: StageExit,
        killed: bool,
    },
}

/// Session-side handle to a monitored stage.
///
/// Dropping the handle without calling [`kill`](Self::kill) also kills the
/// stage.
#[derive(Debug)]
pub struct StageHandle {
    kind: StageKind,
    kill_tx: Option<oneshot::Sender<()>>,
}

impl StageHandle {
    /// Moves `stage` into a monitor task that reports to `reports`.
    pub fn spawn<E>(kind: StageKind, stage: BoxedStage, reports: mpsc::Sender<E>) -> Self
    where
        E: From<StageReport> + Send + 'static,
    {
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(monitor(kind, stage, kill_rx, reports));
        Self {
            kind,
            kill_tx: Some(kill_tx),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Asks the monitor to kill the stage. Idempotent.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            // Receiver is gone once the stage has exited on its own.
            let _ = tx.send(());
        }
    }
}

async fn monitor<E>(
    kind: StageKind,
    mut stage: BoxedStage,
    mut kill_rx: oneshot::Receiver<()>,
    reports: mpsc::Sender<E>,
) where
    E: From<StageReport> + Send + 'static,
{
    let mut events = stage.take_events();
    let mut killed = false;

    let exit = loop {
        tokio::select! {
            biased;

            _ = &mut kill_rx => {
                // Either an explicit kill or the handle was dropped.
                debug!(target: "stream.pipeline", stage = %kind, "Killing stage");
                killed = true;
                stage.kill().await;
                break stage.wait().await;
            }

            event = next_event(&mut events) => {
                match event {
                    Some(event) => forward(&reports, StageReport::Event { kind, event }).await,
                    None => events = None,
                }
            }

            exit = stage.wait() => break exit,
        }
    };

    let exit = match exit {
        Ok(exit) => exit,
        Err(e) => {
            warn!(target: "stream.pipeline", stage = %kind, error = %e, "Failed to wait for stage");
            StageExit { code: None }
        }
    };

    // Forward whatever the stage reported just before it exited.
    if let Some(mut rx) = events.take() {
        let drain = async {
            while let Some(event) = rx.recv().await {
                forward(&reports, StageReport::Event { kind, event }).await;
            }
        };
        let _ = tokio::time::timeout(EVENT_DRAIN_TIMEOUT, drain).await;
    }

    debug!(
        target: "stream.pipeline",
        stage = %kind,
        exit_code = ?exit.code,
        killed,
        "Stage exited"
    );

    forward(&reports, StageReport::Exited { kind, exit, killed }).await;
}

async fn next_event(events: &mut Option<mpsc::Receiver<StageEvent>>) -> Option<StageEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn forward<E: From<StageReport>>(reports: &mpsc::Sender<E>, report: StageReport) {
    // The session may already be gone; nothing left to tell.
    let _ = reports.send(E::from(report)).await;
}
