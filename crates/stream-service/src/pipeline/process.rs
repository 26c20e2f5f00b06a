//! Subprocess-backed stages and the launcher that builds them.

use crate::config::Config;
use crate::errors::StreamError;
use crate::pipeline::commands::{self, RetrievalOptions};
use crate::pipeline::progress::parse_progress_line;
use crate::pipeline::stage::{
    BoxedStage, PipelineLauncher, PipelineStage, StageEvent, StageExit, StageKind, StageReader,
    StageWriter,
};
use crate::quality::QualityProfile;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Progress events buffered between the stderr reader and the monitor.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A running child process.
pub struct ProcessStage {
    kind: StageKind,
    child: Child,
    output: Option<StageReader>,
    input: Option<StageWriter>,
    events: Option<mpsc::Receiver<StageEvent>>,
}

impl ProcessStage {
    /// Spawns `program` with piped stdio.
    ///
    /// The transcode stage gets a piped stdin and has its stderr parsed as
    /// progress; the retrieval stage has its stderr logged.
    pub fn spawn(kind: StageKind, program: &str, args: &[String]) -> std::io::Result<Self> {
        let stdin = match kind {
            StageKind::Retrieval => Stdio::null(),
            StageKind::Transcode => Stdio::piped(),
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        debug!(
            target: "stream.pipeline",
            stage = %kind,
            program,
            pid = ?child.id(),
            "Spawned stage process"
        );

        let output = child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as StageReader);
        let input = child
            .stdin
            .take()
            .map(|stdin| Box::new(stdin) as StageWriter);

        let events = match (kind, child.stderr.take()) {
            (StageKind::Transcode, Some(stderr)) => {
                let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
                tokio::spawn(read_progress(stderr, tx));
                Some(rx)
            }
            (StageKind::Retrieval, Some(stderr)) => {
                tokio::spawn(log_stderr(kind, stderr));
                None
            }
            (_, None) => None,
        };

        Ok(Self {
            kind,
            child,
            output,
            input,
            events,
        })
    }
}

#[async_trait::async_trait]
impl PipelineStage for ProcessStage {
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
        let status = self.child.wait().await?;
        Ok(StageExit {
            code: status.code(),
        })
    }

    async fn kill(&mut self) {
        // Fails only when the process has already been reaped.
        if let Err(e) = self.child.start_kill() {
            debug!(target: "stream.pipeline", stage = %self.kind, error = %e, "Kill skipped");
        }
    }
}

async fn read_progress(stderr: ChildStderr, events: mpsc::Sender<StageEvent>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(event) = parse_progress_line(&line) {
                    if events.send(event).await.is_err() {
                        break;
                    }
                } else if !line.contains('=') && !line.trim().is_empty() {
                    // Decoder complaints are often recoverable; the exit code decides.
                    warn!(target: "stream.pipeline", line = line.trim(), "Transcoder stderr");
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(target: "stream.pipeline", error = %e, "Transcoder stderr closed");
                break;
            }
        }
    }
}

async fn log_stderr(kind: StageKind, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            warn!(target: "stream.pipeline", stage = %kind, line, "Stage stderr");
        }
    }
}

/// Launches the configured retrieval tool and transcoder as subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    retriever_bin: String,
    transcoder_bin: String,
    retrieval_options: RetrievalOptions,
}

impl ProcessLauncher {
    pub fn new(
        retriever_bin: impl Into<String>,
        transcoder_bin: impl Into<String>,
        retrieval_options: RetrievalOptions,
    ) -> Self {
        Self {
            retriever_bin: retriever_bin.into(),
            transcoder_bin: transcoder_bin.into(),
            retrieval_options,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.retriever_bin.clone(),
            config.transcoder_bin.clone(),
            RetrievalOptions {
                buffer_size: config.retriever_buffer_size.clone(),
                socket_timeout_seconds: config.retriever_socket_timeout_seconds,
            },
        )
    }
}

#[async_trait::async_trait]
impl PipelineLauncher for ProcessLauncher {
    async fn launch_retrieval(&self, reference: &str) -> Result<BoxedStage, StreamError> {
        let args = commands::retrieval_args(&self.retrieval_options, reference);
        let stage = ProcessStage::spawn(StageKind::Retrieval, &self.retriever_bin, &args)
            .map_err(|e| {
                StreamError::RetrievalLaunch(format!(
                    "Failed to spawn {}: {}",
                    self.retriever_bin, e
                ))
            })?;
        Ok(Box::new(stage))
    }

    async fn launch_transcode(
        &self,
        seek_offset: f64,
        profile: &QualityProfile,
    ) -> Result<BoxedStage, StreamError> {
        let args = commands::transcode_args(seek_offset, profile);
        let stage = ProcessStage::spawn(StageKind::Transcode, &self.transcoder_bin, &args)
            .map_err(|e| {
                StreamError::Transcode(format!("Failed to spawn {}: {}", self.transcoder_bin, e))
            })?;
        Ok(Box::new(stage))
    }

    async fn probe_duration(&self, reference: &str) -> Result<String, StreamError> {
        let output = Command::new(&self.retriever_bin)
            .args(commands::duration_args(reference))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                StreamError::RetrievalLaunch(format!(
                    "Failed to spawn {}: {}",
                    self.retriever_bin, e
                ))
            })?;

        if !output.status.success() {
            return Err(StreamError::RetrievalExit {
                code: output.status.code(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
