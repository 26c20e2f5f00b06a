//! The chained retrieval -> transcode data path.
//!
//! `stage` defines the process-boundary contract, `process` implements it
//! with real subprocesses and `mock` implements it in memory.

pub mod commands;
pub mod mock;
pub mod process;
pub mod progress;
pub mod stage;

pub use process::ProcessLauncher;
pub use stage::{
    BoxedStage, PipelineLauncher, PipelineStage, StageEvent, StageExit, StageHandle, StageKind,
    StageReport,
};
