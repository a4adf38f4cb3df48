//! Media provenance engine
//!
//! Binds a still image or an animated clip to a signed record of its content
//! digests, and later localizes tampering: image blocks that no longer match,
//! or the first video frame where the hash chain diverges.
//!
//! Container video (mp4, mov, webm, mkv, avi) needs the `gstreamer` feature.

pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod jobs;
pub mod logger;
pub mod pipeline;
pub mod repository;

pub use config::{HemlockConfig, HemlockConfigBuilder};
pub use engine::{ProtectOutcome, ProvenanceEngine};
pub use error::{HemlockError, HemlockResult};
pub use evidence::{
    FailureType, GridSize, MediaKind, ProvenanceId, ProvenanceRecord, ReportStatus, TamperReport,
    VerifyOutcome, VerifyRequest,
};
pub use jobs::{Job, JobId, JobManager, JobOutput, JobState};
pub use logger::{init_tracing, LogEntry, LogFilter, LogLevel, LOGGER};
