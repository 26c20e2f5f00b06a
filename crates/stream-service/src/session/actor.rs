//! Stream session actor.
//!
//! One session per `/stream` request. The session owns the retrieval and
//! transcode stages (through their monitor handles), the pump and relay
//! tasks that move bytes between them, the quality monitor timer, and its
//! connection analyzer.
//!
//! `start()` runs on the request task and returns the response body once
//! the first audio byte has arrived. After that the session is moved into
//! its own task (`spawn()`), where a `tokio::select!` loop handles stage
//! reports, monitor ticks, control messages and cancellation until the
//! session reaches a terminal state. Every exit path funnels through
//! `cleanup()`.

use crate::config::Config;
use crate::errors::StreamError;
use crate::observability::metrics;
use crate::pipeline::stage::{StageReader, StageWriter};
use crate::pipeline::{PipelineLauncher, StageEvent, StageExit, StageHandle, StageKind, StageReport};
use crate::quality::{AnalyzerSnapshot, ConnectionAnalyzer, QualityProfile, QualityProfileTable, Tier};
use crate::session::body::SessionBody;
use crate::session::state::SessionStatus;
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const MESSAGE_CHANNEL_CAPACITY: usize = 16;
const FIRST_CHUNK_SIZE: usize = 16 * 1024;
const RELAY_CHUNK_SIZE: usize = 16 * 1024;
/// How long a failed session waits for the client to drain buffered chunks
/// before its error item.
const ERROR_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-session tunables, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub startup_timeout: Duration,
    pub monitor_interval: Duration,
    pub quality_cooldown: Duration,
    pub speed_history_size: usize,
    pub relay_channel_capacity: usize,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            startup_timeout: config.retrieval_startup_timeout(),
            monitor_interval: config.monitor_interval(),
            quality_cooldown: config.quality_cooldown(),
            speed_history_size: config.speed_history_size,
            relay_channel_capacity: config.relay_channel_capacity,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        use crate::config::{
            DEFAULT_MONITOR_INTERVAL_SECONDS, DEFAULT_QUALITY_COOLDOWN_SECONDS,
            DEFAULT_RELAY_CHANNEL_CAPACITY, DEFAULT_RETRIEVAL_STARTUP_TIMEOUT_SECONDS,
            DEFAULT_SPEED_HISTORY_SIZE,
        };
        Self {
            startup_timeout: Duration::from_secs(DEFAULT_RETRIEVAL_STARTUP_TIMEOUT_SECONDS),
            monitor_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECONDS),
            quality_cooldown: Duration::from_secs(DEFAULT_QUALITY_COOLDOWN_SECONDS),
            speed_history_size: DEFAULT_SPEED_HISTORY_SIZE,
            relay_channel_capacity: DEFAULT_RELAY_CHANNEL_CAPACITY,
        }
    }
}

/// What the client asked for.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// The query as the client sent it.
    pub query: String,
    /// What the retrieval stage is asked to fetch.
    pub reference: String,
    pub tier: Tier,
}

/// Internal events delivered to the session loop.
#[derive(Debug)]
pub enum SessionEvent {
    Stage(StageReport),
    /// Transcode output reached end of stream and every chunk was handed
    /// to the response channel.
    RelayFinished,
    RelayFailed { error: String },
    /// The response channel rejected a chunk.
    ClientGone,
}

impl From<StageReport> for SessionEvent {
    fn from(report: StageReport) -> Self {
        SessionEvent::Stage(report)
    }
}

/// Messages sent to the session from its handles.
#[derive(Debug)]
pub enum SessionMessage {
    Snapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
    Stop {
        respond_to: oneshot::Sender<()>,
    },
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub query: String,
    pub status: SessionStatus,
    /// Tier the analyzer last moved the session to.
    pub active_tier: Tier,
    /// Tier the transcode stage is actually running at.
    pub negotiated_tier: Tier,
    pub negotiated_bitrate_kbps: u32,
    pub bytes_streamed: u64,
    pub elapsed_seconds: f64,
    pub monitor_active: bool,
    pub analyzer: AnalyzerSnapshot,
}

/// Returned by the session task when it finishes.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub bytes_streamed: u64,
    pub failure: Option<StreamError>,
    /// Both stage handles and the pump/relay tasks were released.
    pub stages_released: bool,
    pub timer_released: bool,
    pub duration: Duration,
}

/// Cloneable handle to a running session.
#[derive(Clone, Debug)]
pub struct StreamSessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    session_id: Uuid,
}

impl StreamSessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Get the session's current state.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, StreamError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Snapshot { respond_to: tx })
            .await
            .map_err(|e| StreamError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| StreamError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop the session gracefully and wait until cleanup has run.
    pub async fn stop(&self) -> Result<(), StreamError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Stop { respond_to: tx })
            .await
            .map_err(|e| StreamError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| StreamError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the session without waiting.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// One client stream.
pub struct StreamSession {
    id: Uuid,
    query: String,
    reference: String,
    seek_offset: f64,
    profiles: Arc<QualityProfileTable>,
    active: QualityProfile,
    negotiated: QualityProfile,
    launcher: Arc<dyn PipelineLauncher>,
    settings: SessionSettings,
    analyzer: ConnectionAnalyzer,
    status: SessionStatus,
    failure: Option<StreamError>,

    retrieval: Option<StageHandle>,
    transcode: Option<StageHandle>,
    pump_task: Option<JoinHandle<()>>,
    relay_task: Option<JoinHandle<()>>,
    body_tx: Option<mpsc::Sender<std::io::Result<Bytes>>>,
    monitor: Option<Interval>,

    created_at: Instant,
    started_at: Option<Instant>,
    bytes_streamed: u64,
    relay_done: bool,
    transcode_ended: bool,
    transcode_exit: Option<StageExit>,

    cancel_token: CancellationToken,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
}

impl StreamSession {
    pub fn new(
        request: SessionRequest,
        profiles: Arc<QualityProfileTable>,
        launcher: Arc<dyn PipelineLauncher>,
        settings: SessionSettings,
    ) -> Self {
        let negotiated = profiles.profile_for(request.tier).clone();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let analyzer =
            ConnectionAnalyzer::new(settings.speed_history_size, settings.quality_cooldown);

        Self {
            id: Uuid::new_v4(),
            query: request.query,
            reference: request.reference,
            seek_offset: 0.0,
            profiles,
            active: negotiated.clone(),
            negotiated,
            launcher,
            settings,
            analyzer,
            status: SessionStatus::Idle,
            failure: None,
            retrieval: None,
            transcode: None,
            pump_task: None,
            relay_task: None,
            body_tx: None,
            monitor: None,
            created_at: Instant::now(),
            started_at: None,
            bytes_streamed: 0,
            relay_done: false,
            transcode_ended: false,
            transcode_exit: None,
            cancel_token: CancellationToken::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn bytes_streamed(&self) -> u64 {
        self.bytes_streamed
    }

    pub fn active_profile(&self) -> &QualityProfile {
        &self.active
    }

    pub fn negotiated_profile(&self) -> &QualityProfile {
        &self.negotiated
    }

    pub fn failure(&self) -> Option<&StreamError> {
        self.failure.as_ref()
    }

    /// Launches retrieval, waits for its first byte, then wires up the
    /// transcode stage and returns the response body.
    ///
    /// On error the session is `Failed` and already cleaned up.
    pub async fn start(&mut self, seek_offset: f64) -> Result<SessionBody, StreamError> {
        if !self.transition(SessionStatus::Retrieving) {
            return Err(StreamError::Internal(format!(
                "session {} cannot start from {}",
                self.id, self.status
            )));
        }
        self.seek_offset = seek_offset;

        info!(
            target: "stream.session",
            session_id = %self.id,
            reference = %self.reference,
            seek_offset,
            tier = %self.negotiated.tier,
            "Starting retrieval"
        );

        match self.start_pipeline().await {
            Ok(body) => {
                metrics::record_session_started(self.negotiated.tier);
                Ok(body)
            }
            Err(err) => {
                self.fail(err.clone());
                Err(err)
            }
        }
    }

    async fn start_pipeline(&mut self) -> Result<SessionBody, StreamError> {
        let mut retrieval = self.launcher.launch_retrieval(&self.reference).await?;
        let mut retrieval_output = retrieval.take_output().ok_or_else(|| {
            StreamError::RetrievalLaunch("retrieval stage has no output".to_string())
        })?;
        self.retrieval = Some(StageHandle::spawn(
            StageKind::Retrieval,
            retrieval,
            self.events_tx.clone(),
        ));

        let first_chunk = self.read_first_chunk(&mut retrieval_output).await?;

        self.transition(SessionStatus::Streaming);
        self.started_at = Some(Instant::now());

        let mut transcode = self
            .launcher
            .launch_transcode(self.seek_offset, &self.negotiated)
            .await?;
        let transcode_input = transcode.take_input().ok_or_else(|| {
            StreamError::Transcode("transcode stage has no input".to_string())
        })?;
        let transcode_output = transcode.take_output().ok_or_else(|| {
            StreamError::Transcode("transcode stage has no output".to_string())
        })?;
        self.transcode = Some(StageHandle::spawn(
            StageKind::Transcode,
            transcode,
            self.events_tx.clone(),
        ));

        info!(
            target: "stream.session",
            session_id = %self.id,
            first_chunk_bytes = first_chunk.len(),
            bitrate_kbps = self.negotiated.bitrate_kbps,
            "Streaming started"
        );

        self.pump_task = Some(tokio::spawn(pump(
            self.id,
            first_chunk,
            retrieval_output,
            transcode_input,
        )));

        let (body_tx, body_rx) = mpsc::channel(self.settings.relay_channel_capacity);
        self.relay_task = Some(tokio::spawn(relay(
            transcode_output,
            body_tx.clone(),
            self.events_tx.clone(),
        )));
        self.body_tx = Some(body_tx);

        let period = self.settings.monitor_interval;
        let mut monitor = tokio::time::interval_at(Instant::now() + period, period);
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.monitor = Some(monitor);

        Ok(SessionBody::new(
            body_rx,
            self.cancel_token.clone().drop_guard(),
        ))
    }

    async fn read_first_chunk(&mut self, output: &mut StageReader) -> Result<Bytes, StreamError> {
        let limit = self.settings.startup_timeout;
        // One deadline covers both the first read and the exit wait.
        let deadline = Instant::now() + limit;
        let mut buf = BytesMut::with_capacity(FIRST_CHUNK_SIZE);

        match tokio::time::timeout_at(deadline, output.read_buf(&mut buf)).await {
            Ok(Ok(0)) => Err(self.await_retrieval_exit(deadline).await),
            Ok(Ok(_)) => Ok(buf.freeze()),
            Ok(Err(e)) => Err(StreamError::RetrievalExit {
                code: None,
                reason: format!("reading retrieval output: {e}"),
            }),
            Err(_) => {
                warn!(
                    target: "stream.session",
                    session_id = %self.id,
                    timeout_seconds = limit.as_secs(),
                    "Retrieval produced no output in time"
                );
                Err(StreamError::RetrievalExit {
                    code: None,
                    reason: format!("no output within {}s", limit.as_secs()),
                })
            }
        }
    }

    /// Retrieval closed its output before the first byte; find out how it
    /// exited.
    async fn await_retrieval_exit(&mut self, deadline: Instant) -> StreamError {
        let events = &mut self.events_rx;
        let wait = async move {
            while let Some(event) = events.recv().await {
                if let SessionEvent::Stage(StageReport::Exited {
                    kind: StageKind::Retrieval,
                    exit,
                    ..
                }) = event
                {
                    return Some(exit);
                }
            }
            None
        };

        match tokio::time::timeout_at(deadline, wait).await.ok().flatten() {
            Some(exit) if exit.success() => StreamError::RetrievalExit {
                code: exit.code,
                reason: "retrieval produced no audio".to_string(),
            },
            Some(exit) => StreamError::RetrievalExit {
                code: exit.code,
                reason: "retrieval exited before producing audio".to_string(),
            },
            None => StreamError::RetrievalExit {
                code: None,
                reason: "retrieval closed its output without exiting".to_string(),
            },
        }
    }

    /// Moves the session into its own task.
    pub fn spawn(self) -> (StreamSessionHandle, JoinHandle<SessionSummary>) {
        let (sender, receiver) = mpsc::channel(MESSAGE_CHANNEL_CAPACITY);
        let handle = StreamSessionHandle {
            sender,
            cancel_token: self.cancel_token.clone(),
            session_id: self.id,
        };
        let task = tokio::spawn(self.run(receiver));
        (handle, task)
    }

    #[instrument(skip_all, name = "stream.session", fields(session_id = %self.id))]
    async fn run(mut self, mut receiver: mpsc::Receiver<SessionMessage>) -> SessionSummary {
        debug!(target: "stream.session", status = %self.status, "Session loop started");
        let mut handles_open = true;

        while !self.status.is_terminal() {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(target: "stream.session", session_id = %self.id, "Session cancelled");
                    self.stop();
                }

                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event);
                }

                () = next_tick(&mut self.monitor) => {
                    self.on_monitor_tick();
                }

                msg = receiver.recv(), if handles_open => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => handles_open = false,
                    }
                }
            }
        }

        self.cleanup();
        let summary = self.summary();

        info!(
            target: "stream.session",
            session_id = %self.id,
            status = %summary.status,
            bytes_streamed = summary.bytes_streamed,
            "Session finished"
        );

        summary
    }

    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            SessionMessage::Stop { respond_to } => {
                info!(target: "stream.session", session_id = %self.id, "Stop requested");
                self.stop();
                let _ = respond_to.send(());
            }
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Stage(StageReport::Event {
                kind: StageKind::Transcode,
                event,
            }) => self.on_transcode_event(event),
            SessionEvent::Stage(StageReport::Event {
                kind: StageKind::Retrieval,
                event,
            }) => {
                debug!(target: "stream.session", session_id = %self.id, ?event, "Retrieval event");
            }
            SessionEvent::Stage(StageReport::Exited { kind, exit, killed }) => {
                self.on_stage_exit(kind, exit, killed);
            }
            SessionEvent::RelayFinished => {
                self.relay_done = true;
                self.finish_if_complete();
            }
            SessionEvent::RelayFailed { error } => {
                self.fail(StreamError::Transcode(format!(
                    "reading transcode output: {error}"
                )));
            }
            SessionEvent::ClientGone => {
                if self.cancel_token.is_cancelled() {
                    self.stop();
                } else {
                    self.fail(StreamError::StreamWrite(
                        "response channel closed".to_string(),
                    ));
                }
            }
        }
    }

    fn on_transcode_event(&mut self, event: StageEvent) {
        match event {
            StageEvent::Progress { total_bytes } => self.record_progress(total_bytes),
            StageEvent::End => {
                self.transcode_ended = true;
                debug!(target: "stream.session", session_id = %self.id, "Transcode reported end");
            }
            StageEvent::Error { message } => self.fail(StreamError::Transcode(message)),
        }
    }

    /// Raises `bytes_streamed` to `total_bytes`. Stale or duplicate values
    /// are ignored.
    pub fn record_progress(&mut self, total_bytes: u64) {
        if total_bytes > self.bytes_streamed {
            metrics::record_bytes_streamed(total_bytes - self.bytes_streamed);
            self.bytes_streamed = total_bytes;
        }
    }

    fn on_stage_exit(&mut self, kind: StageKind, exit: StageExit, killed: bool) {
        match kind {
            StageKind::Retrieval => {
                if !killed && !exit.success() {
                    self.fail(StreamError::RetrievalExit {
                        code: exit.code,
                        reason: "retrieval exited after streaming began".to_string(),
                    });
                } else {
                    debug!(
                        target: "stream.session",
                        session_id = %self.id,
                        exit_code = ?exit.code,
                        killed,
                        "Retrieval finished"
                    );
                }
            }
            StageKind::Transcode => {
                self.transcode_exit = Some(exit);
                if killed {
                    return;
                }
                if exit.success() {
                    self.finish_if_complete();
                } else {
                    self.fail(StreamError::Transcode(format!(
                        "transcoder exited with {:?}",
                        exit.code
                    )));
                }
            }
        }
    }

    fn finish_if_complete(&mut self) {
        let transcode_ok = self.transcode_exit.is_some_and(|exit| exit.success());
        if self.relay_done && transcode_ok {
            if !self.transcode_ended {
                debug!(
                    target: "stream.session",
                    session_id = %self.id,
                    "Transcode exited cleanly without an end marker"
                );
            }
            info!(target: "stream.session", session_id = %self.id, "Stream complete");
            self.stop();
        }
    }

    fn on_monitor_tick(&mut self) {
        if self.status != SessionStatus::Streaming {
            return;
        }
        let Some(started_at) = self.started_at else {
            return;
        };

        let average = self.analyzer.measure_speed(started_at, self.bytes_streamed);
        metrics::record_throughput(average);
        let changed = self.analyzer.commit_recommended_if_due();

        debug!(
            target: "stream.session",
            session_id = %self.id,
            bytes_streamed = self.bytes_streamed,
            average_kbps = average,
            recommended = %self.analyzer.recommended_tier(),
            current = %self.analyzer.current_tier(),
            "Quality monitor tick"
        );

        if changed {
            let tier = self.analyzer.current_tier();
            metrics::record_quality_recommendation(tier);
            if tier != self.active.tier {
                self.adjust_quality(tier);
            }
        }
    }

    /// Switches the active profile to `new_tier`.
    ///
    /// The transcode stage keeps running at the negotiated profile; only the
    /// session's notion of the appropriate tier changes. Same-tier calls are
    /// no-ops.
    pub fn adjust_quality(&mut self, new_tier: Tier) {
        if new_tier == self.active.tier {
            return;
        }
        let previous = self.active.tier;
        self.active = self.profiles.profile_for(new_tier).clone();

        info!(
            target: "stream.session",
            session_id = %self.id,
            from = %previous,
            to = %new_tier,
            negotiated = %self.negotiated.tier,
            "Quality adjusted; stream continues at negotiated bitrate"
        );
    }

    /// Graceful stop. Leaves `Failed` sessions as they are.
    pub fn stop(&mut self) {
        self.cleanup();
    }

    /// Releases the timer, both stages and the pump/relay tasks.
    ///
    /// Moves a live session to `Stopped`. Safe to call any number of times.
    pub fn cleanup(&mut self) {
        if !self.status.is_terminal() {
            self.transition(SessionStatus::Stopped);
        }

        if self.monitor.take().is_some() {
            debug!(target: "stream.session", session_id = %self.id, "Monitor timer cancelled");
        }

        for mut stage in [self.retrieval.take(), self.transcode.take()]
            .into_iter()
            .flatten()
        {
            debug!(target: "stream.session", session_id = %self.id, stage = %stage.kind(), "Releasing stage");
            stage.kill();
        }

        if let Some(task) = self.pump_task.take() {
            task.abort();
        }
        if let Some(task) = self.relay_task.take() {
            task.abort();
        }
        self.body_tx = None;

        self.cancel_token.cancel();
    }

    fn fail(&mut self, err: StreamError) {
        if self.status.is_terminal() {
            debug!(
                target: "stream.session",
                session_id = %self.id,
                error = %err,
                "Ignoring failure after session ended"
            );
            return;
        }
        if !self.transition(SessionStatus::Failed) {
            self.cleanup();
            return;
        }

        error!(
            target: "stream.session",
            session_id = %self.id,
            code = err.code(),
            error = %err,
            bytes_streamed = self.bytes_streamed,
            "Session failed"
        );
        metrics::record_pipeline_error(err.kind());

        let body_tx = self.body_tx.take();
        let message = err.to_string();
        self.failure = Some(err);
        self.cleanup();

        // Terminate the body with an error rather than a clean end. The relay
        // is aborted by now, so the error lands after the buffered chunks.
        if let Some(tx) = body_tx {
            let session_id = self.id;
            tokio::spawn(async move {
                let item = Err(std::io::Error::other(message));
                match tokio::time::timeout(ERROR_DELIVERY_TIMEOUT, tx.send(item)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => {
                        debug!(target: "stream.session", %session_id, "Client gone before error delivery");
                    }
                    Err(_) => {
                        warn!(target: "stream.session", %session_id, "Client stalled, error not delivered");
                    }
                }
            });
        }
    }

    fn transition(&mut self, next: SessionStatus) -> bool {
        if self.status.can_transition_to(next) {
            debug!(
                target: "stream.session",
                session_id = %self.id,
                from = %self.status,
                to = %next,
                "Session state change"
            );
            self.status = next;
            true
        } else {
            warn!(
                target: "stream.session",
                session_id = %self.id,
                from = %self.status,
                to = %next,
                "Rejected illegal state transition"
            );
            false
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            query: self.query.clone(),
            status: self.status,
            active_tier: self.active.tier,
            negotiated_tier: self.negotiated.tier,
            negotiated_bitrate_kbps: self.negotiated.bitrate_kbps,
            bytes_streamed: self.bytes_streamed,
            elapsed_seconds: self
                .started_at
                .map_or(0.0, |started| started.elapsed().as_secs_f64()),
            monitor_active: self.monitor.is_some(),
            analyzer: self.analyzer.snapshot(),
        }
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            status: self.status,
            bytes_streamed: self.bytes_streamed,
            failure: self.failure.clone(),
            stages_released: self.retrieval.is_none()
                && self.transcode.is_none()
                && self.pump_task.is_none()
                && self.relay_task.is_none(),
            timer_released: self.monitor.is_none(),
            duration: self.created_at.elapsed(),
        }
    }
}

async fn next_tick(monitor: &mut Option<Interval>) {
    match monitor {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Copies retrieval output into transcode input, starting with the chunk
/// already read during startup.
async fn pump(session_id: Uuid, first_chunk: Bytes, mut from: StageReader, mut to: StageWriter) {
    let result = async {
        to.write_all(&first_chunk).await?;
        let copied = tokio::io::copy(&mut from, &mut to).await?;
        to.shutdown().await?;
        Ok::<u64, std::io::Error>(copied + first_chunk.len() as u64)
    }
    .await;

    match result {
        Ok(bytes) => {
            debug!(target: "stream.pipeline", session_id = %session_id, bytes, "Retrieval output forwarded");
        }
        Err(e) => {
            debug!(target: "stream.pipeline", session_id = %session_id, error = %e, "Pump stopped");
        }
    }
}

/// Moves transcode output into the bounded response channel. Awaiting
/// channel capacity is what throttles a slow client.
async fn relay(
    output: StageReader,
    body_tx: mpsc::Sender<std::io::Result<Bytes>>,
    events: mpsc::Sender<SessionEvent>,
) {
    let mut chunks = ReaderStream::with_capacity(output, RELAY_CHUNK_SIZE);
    while let Some(chunk) = chunks.next().await {
        match chunk {
            Ok(chunk) => {
                if body_tx.send(Ok(chunk)).await.is_err() {
                    let _ = events.send(SessionEvent::ClientGone).await;
                    return;
                }
            }
            Err(e) => {
                let _ = events
                    .send(SessionEvent::RelayFailed {
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        }
    }
    let _ = events.send(SessionEvent::RelayFinished).await;
}
