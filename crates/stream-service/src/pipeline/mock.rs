//! In-memory pipeline for tests.
//!
//! The retrieval stage plays back scripted chunks and exits with a scripted
//! code. The transcode stage copies its input to its output unchanged and
//! reports cumulative progress, so byte counts seen by the session match
//! the bytes the client receives.

use crate::errors::StreamError;
use crate::pipeline::stage::{
    BoxedStage, PipelineLauncher, PipelineStage, StageEvent, StageExit, StageReader, StageWriter,
};
use crate::quality::QualityProfile;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const PIPE_CAPACITY: usize = 64 * 1024;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What the mock retrieval stage does.
#[derive(Debug, Clone)]
pub enum RetrievalScript {
    /// Write `chunks`, then either exit with `exit_code` or stay running
    /// until killed.
    Play {
        chunks: Vec<Vec<u8>>,
        exit_code: i32,
        hold_open: bool,
    },
    /// Produce nothing and stay running until killed.
    Silent,
    /// Close output immediately but stay running until killed.
    Hangup,
    /// Fail to launch.
    LaunchFailure,
}

impl RetrievalScript {
    pub fn chunks(chunks: Vec<Vec<u8>>, exit_code: i32) -> Self {
        RetrievalScript::Play {
            chunks,
            exit_code,
            hold_open: false,
        }
    }

    pub fn held_open(chunks: Vec<Vec<u8>>) -> Self {
        RetrievalScript::Play {
            chunks,
            exit_code: 0,
            hold_open: true,
        }
    }
}

/// What the mock transcode stage does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeScript {
    /// Copy input to output, exit with `exit_code` at end of input.
    Passthrough { exit_code: i32 },
    /// Copy input to output, then report an error event at end of input.
    ErrorAtEnd { message: String },
    /// Fail to launch.
    LaunchFailure,
}

/// Launch and kill counts shared by every stage of one launcher.
#[derive(Debug, Default)]
pub struct MockCounters {
    retrieval_launches: AtomicUsize,
    transcode_launches: AtomicUsize,
    retrieval_kills: AtomicUsize,
    transcode_kills: AtomicUsize,
}

impl MockCounters {
    pub fn retrieval_launches(&self) -> usize {
        self.retrieval_launches.load(Ordering::SeqCst)
    }

    pub fn transcode_launches(&self) -> usize {
        self.transcode_launches.load(Ordering::SeqCst)
    }

    pub fn retrieval_kills(&self) -> usize {
        self.retrieval_kills.load(Ordering::SeqCst)
    }

    pub fn transcode_kills(&self) -> usize {
        self.transcode_kills.load(Ordering::SeqCst)
    }
}

/// Mock launcher for unit and integration tests.
pub struct MockLauncher {
    retrieval: RetrievalScript,
    transcode: TranscodeScript,
    duration: Option<String>,
    counters: Arc<MockCounters>,
    last_transcode: Mutex<Option<(f64, QualityProfile)>>,
}

impl MockLauncher {
    /// Create a mock whose transcode stage passes bytes through and exits 0.
    pub fn new(retrieval: RetrievalScript) -> Self {
        Self {
            retrieval,
            transcode: TranscodeScript::Passthrough { exit_code: 0 },
            duration: None,
            counters: Arc::new(MockCounters::default()),
            last_transcode: Mutex::new(None),
        }
    }

    pub fn with_transcode(mut self, transcode: TranscodeScript) -> Self {
        self.transcode = transcode;
        self
    }

    /// Duration text returned by `probe_duration`. Without one, the probe
    /// fails as if the tool exited non-zero.
    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }

    /// Seek offset and profile of the most recent transcode launch.
    pub fn last_transcode(&self) -> Option<(f64, QualityProfile)> {
        self.last_transcode
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait::async_trait]
impl PipelineLauncher for MockLauncher {
    async fn launch_retrieval(&self, _reference: &str) -> Result<BoxedStage, StreamError> {
        let (chunks, exit_code, hold_open) = match &self.retrieval {
            RetrievalScript::LaunchFailure => {
                return Err(StreamError::RetrievalLaunch(
                    "mock retrieval launch failure".to_string(),
                ))
            }
            RetrievalScript::Silent | RetrievalScript::Hangup => (Vec::new(), 0, true),
            RetrievalScript::Play {
                chunks,
                exit_code,
                hold_open,
            } => (chunks.clone(), *exit_code, *hold_open),
        };

        self.counters
            .retrieval_launches
            .fetch_add(1, Ordering::SeqCst);

        let (stage, controls) = MockStage::new(Arc::clone(&self.counters), Role::Retrieval);
        let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);

        let hang_up = matches!(self.retrieval, RetrievalScript::Hangup);

        tokio::spawn(async move {
            let token = controls.kill_token.clone();
            if hang_up {
                drop(writer);
                token.cancelled().await;
                controls.exit(None);
                return;
            }
            let code = tokio::select! {
                () = token.cancelled() => None,
                code = async {
                    for chunk in &chunks {
                        if writer.write_all(chunk).await.is_err() {
                            break;
                        }
                    }
                    if hold_open {
                        token.cancelled().await;
                        None
                    } else {
                        Some(exit_code)
                    }
                } => code,
            };
            // Exit is observable before end of output, as with a real
            // process whose pipe is still being drained.
            controls.exit(code);
            drop(writer);
        });

        Ok(Box::new(stage.with_output(Box::new(reader))))
    }

    async fn launch_transcode(
        &self,
        seek_offset: f64,
        profile: &QualityProfile,
    ) -> Result<BoxedStage, StreamError> {
        if self.transcode == TranscodeScript::LaunchFailure {
            return Err(StreamError::Transcode(
                "mock transcode launch failure".to_string(),
            ));
        }

        self.counters
            .transcode_launches
            .fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_transcode.lock() {
            *last = Some((seek_offset, profile.clone()));
        }

        let (stage, controls) = MockStage::new(Arc::clone(&self.counters), Role::Transcode);
        let (input, mut input_rx) = tokio::io::duplex(PIPE_CAPACITY);
        let (mut output_tx, output) = tokio::io::duplex(PIPE_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let script = self.transcode.clone();

        tokio::spawn(async move {
            let token = controls.kill_token.clone();
            let code = tokio::select! {
                () = token.cancelled() => None,
                code = async {
                    let mut buf = vec![0u8; 8192];
                    let mut total: u64 = 0;
                    loop {
                        let n = match input_rx.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        let Some(chunk) = buf.get(..n) else { break };
                        if output_tx.write_all(chunk).await.is_err() {
                            break;
                        }
                        total += n as u64;
                        let _ = events_tx
                            .send(StageEvent::Progress { total_bytes: total })
                            .await;
                    }
                    match script {
                        TranscodeScript::ErrorAtEnd { message } => {
                            let _ = events_tx.send(StageEvent::Error { message }).await;
                            Some(1)
                        }
                        TranscodeScript::Passthrough { exit_code } => {
                            if exit_code == 0 {
                                let _ = events_tx.send(StageEvent::End).await;
                            }
                            Some(exit_code)
                        }
                        TranscodeScript::LaunchFailure => Some(1),
                    }
                } => code,
            };
            drop(output_tx);
            drop(events_tx);
            controls.exit(code);
        });

        Ok(Box::new(
            stage
                .with_output(Box::new(output))
                .with_input(Box::new(input))
                .with_events(events_rx),
        ))
    }

    async fn probe_duration(&self, _reference: &str) -> Result<String, StreamError> {
        self.duration
            .clone()
            .ok_or_else(|| StreamError::RetrievalExit {
                code: Some(1),
                reason: "mock duration unavailable".to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Retrieval,
    Transcode,
}

/// Script-side controls of a mock stage.
struct StageControls {
    kill_token: CancellationToken,
    exit_tx: watch::Sender<Option<StageExit>>,
}

impl StageControls {
    fn exit(&self, code: Option<i32>) {
        let _ = self.exit_tx.send(Some(StageExit { code }));
    }
}

struct MockStage {
    role: Role,
    counters: Arc<MockCounters>,
    output: Option<StageReader>,
    input: Option<StageWriter>,
    events: Option<mpsc::Receiver<StageEvent>>,
    exit_rx: watch::Receiver<Option<StageExit>>,
    kill_token: CancellationToken,
    killed: AtomicBool,
}

impl MockStage {
    fn new(counters: Arc<MockCounters>, role: Role) -> (Self, StageControls) {
        let (exit_tx, exit_rx) = watch::channel(None);
        let kill_token = CancellationToken::new();
        let stage = Self {
            role,
            counters,
            output: None,
            input: None,
            events: None,
            exit_rx,
            kill_token: kill_token.clone(),
            killed: AtomicBool::new(false),
        };
        (
            stage,
            StageControls {
                kill_token,
                exit_tx,
            },
        )
    }

    fn with_output(mut self, output: StageReader) -> Self {
        self.output = Some(output);
        self
    }

    fn with_input(mut self, input: StageWriter) -> Self {
        self.input = Some(input);
        self
    }

    fn with_events(mut self, events: mpsc::Receiver<StageEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }
}

#[async_trait::async_trait]
impl PipelineStage for MockStage {
    fn take_output(&mut self) -> Option<StageReader> {
        self.output.take()
    }

    fn take_input(&mut self) -> Option<StageWriter> {
        self.input.take()
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<StageEvent>> {
        self.events.take()
    }

    async fn wait(&mut self) -> std::io::Result<StageExit> {
        match self.exit_rx.wait_for(Option::is_some).await {
            Ok(exit) => Ok(exit.unwrap_or(StageExit { code: None })),
            Err(_) => Ok(StageExit { code: None }),
        }
    }

    async fn kill(&mut self) {
        if self.has_exited() || self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        let counter = match self.role {
            Role::Retrieval => &self.counters.retrieval_kills,
            Role::Transcode => &self.counters.transcode_kills,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.kill_token.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::quality::{QualityProfileTable, Tier};

    #[tokio::test]
    async fn test_launch_failure_scripts() {
        let launcher = MockLauncher::new(RetrievalScript::LaunchFailure)
            .with_transcode(TranscodeScript::LaunchFailure);
        let table = QualityProfileTable::standard();

        assert!(matches!(
            launcher.launch_retrieval("x").await,
            Err(StreamError::RetrievalLaunch(_))
        ));
        assert!(matches!(
            launcher
                .launch_transcode(0.0, table.profile_for(Tier::Low))
                .await,
            Err(StreamError::Transcode(_))
        ));
        assert_eq!(launcher.counters().retrieval_launches(), 0);
    }

    #[tokio::test]
    async fn test_retrieval_plays_chunks_and_exits() {
        let launcher = MockLauncher::new(RetrievalScript::chunks(
            vec![b"ab".to_vec(), b"cd".to_vec()],
            2,
        ));
        let mut stage = launcher.launch_retrieval("x").await.unwrap();
        let mut output = stage.take_output().unwrap();

        let mut buf = Vec::new();
        output.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"abcd");
        assert_eq!(stage.wait().await.unwrap(), StageExit { code: Some(2) });
    }

    #[tokio::test]
    async fn test_kill_after_exit_is_noop() {
        let launcher = MockLauncher::new(RetrievalScript::chunks(vec![], 0));
        let mut stage = launcher.launch_retrieval("x").await.unwrap();
        stage.wait().await.unwrap();

        stage.kill().await;
        assert_eq!(launcher.counters().retrieval_kills(), 0);
    }

    #[tokio::test]
    async fn test_transcode_records_launch_parameters() {
        let launcher = MockLauncher::new(RetrievalScript::Silent);
        let table = QualityProfileTable::standard();
        let _stage = launcher
            .launch_transcode(30.0, table.profile_for(Tier::High))
            .await
            .unwrap();

        let (seek, profile) = launcher.last_transcode().unwrap();
        assert_eq!(seek, 30.0);
        assert_eq!(profile.tier, Tier::High);
        assert_eq!(launcher.counters().transcode_launches(), 1);
    }

    #[tokio::test]
    async fn test_probe_duration() {
        let launcher = MockLauncher::new(RetrievalScript::Silent).with_duration("3:30");
        assert_eq!(launcher.probe_duration("x").await.unwrap(), "3:30");

        let launcher = MockLauncher::new(RetrievalScript::Silent);
        assert!(launcher.probe_duration("x").await.is_err());
    }
}
