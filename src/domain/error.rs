// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Typed errors for the training and evaluation pipelines.
// The application and CLI layers convert these into anyhow
// errors with extra context; everything below them returns
// one of the enums here.

use std::path::PathBuf;
use thiserror::Error;

/// Missing or malformed configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{}': {source}", path.display())]
    Read {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("malformed config '{}': {source}", path.display())]
    Parse {
        path:   PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A weight file could not be loaded into a freshly built sub-model.
#[derive(Debug, Error)]
pub enum WeightLoadError {
    #[error("weight file '{}' does not exist", .0.display())]
    Missing(PathBuf),

    #[error("cannot decode weight file '{}': {reason}", path.display())]
    Record { path: PathBuf, reason: String },

    #[error("weight file '{}' does not fit the configured {part}: {reason}", path.display())]
    Incompatible {
        path:   PathBuf,
        part:   &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum CollectiveError {
    #[error("rank {rank} lost its connection to rank {peer}")]
    PeerDisconnected { rank: usize, peer: usize },

    #[error("rank {rank} received {found} values from rank {peer}, expected {expected}")]
    LengthMismatch {
        rank:     usize,
        peer:     usize,
        expected: usize,
        found:    usize,
    },

    #[error("invalid collective group: {0}")]
    InvalidGroup(String),
}

impl CollectiveError {
    /// True for errors that are a consequence of another worker failing.
    pub fn is_secondary(&self) -> bool {
        matches!(self, CollectiveError::PeerDisconnected { .. })
    }
}

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    WeightLoad(#[from] WeightLoadError),

    #[error(transparent)]
    Collective(#[from] CollectiveError),

    #[error("device transfer failed on rank {rank}: {reason}")]
    DeviceTransfer { rank: usize, reason: String },

    #[error("checkpoint write to '{}' failed: {reason}", path.display())]
    Checkpoint { path: PathBuf, reason: String },

    #[error("worker {rank} panicked")]
    WorkerPanicked { rank: usize },
}

impl TrainError {
    pub fn checkpoint(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TrainError::Checkpoint {
            path:   path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_secondary(&self) -> bool {
        matches!(self, TrainError::Collective(e) if e.is_secondary())
    }
}

/// Per-cover failures during evaluation. Recorded, never propagated.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("cannot read audio '{}': {reason}", path.display())]
    Audio { path: PathBuf, reason: String },

    #[error("audio '{}' is too short to fingerprint", .0.display())]
    EmptySignal(PathBuf),

    #[error("no frames of '{}' align with its original", .0.display())]
    NoAlignment(PathBuf),
}
