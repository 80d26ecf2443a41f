// ============================================================
// Layer 6 — Checkpoint Directory
// ============================================================
// Saves model weights with Burn's CompactRecorder and keeps the
// run's append-only text log.
//
// Layout of one training run:
//   models/params/checkpoints/
//     2026-1019-142501/     ← run directory, named by start time
//       log.txt             ← periodic and per-epoch lines
//       0.mpk               ← snapshot after epoch 0
//       1.mpk               ← snapshot after epoch 1
//       ...
//
// CompactRecorder:
//   - Serialises module records to MessagePack
//   - Replaces the file extension with `.mpk`
//   - Loading fails if the bytes don't decode into the record type
//
// Only the parent worker ever constructs a RunDirectory.

use chrono::{DateTime, FixedOffset};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::domain::error::TrainError;

/// Extension CompactRecorder gives every file it writes.
pub const RECORD_EXTENSION: &str = "mpk";

/// Where a recorder will actually read or write `path`.
pub fn record_path(path: &Path) -> PathBuf {
    path.with_extension(RECORD_EXTENSION)
}

/// Serialise any module's weights to `path` (extension replaced).
pub fn save_module<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<(), TrainError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TrainError::checkpoint(parent, e))?;
    }
    CompactRecorder::new()
        .record(module.clone().into_record(), path.to_path_buf())
        .map_err(|e| TrainError::checkpoint(record_path(path), e))?;
    tracing::debug!("Saved weights to '{}'", record_path(path).display());
    Ok(())
}

/// One training run's checkpoint directory.
pub struct RunDirectory {
    dir:      PathBuf,
    log_path: PathBuf,
}

impl RunDirectory {
    /// Create `<root>/<timestamp>/`. The root is created if missing;
    /// the run directory itself must not exist yet, so two runs
    /// started in the same second fail instead of interleaving logs.
    pub fn create(
        root:     &Path,
        started:  DateTime<FixedOffset>,
        log_file: &str,
    ) -> Result<Self, TrainError> {
        fs::create_dir_all(root).map_err(|e| TrainError::checkpoint(root, e))?;

        let dir = root.join(started.format("%Y-%m%d-%H%M%S").to_string());
        fs::create_dir(&dir).map_err(|e| TrainError::checkpoint(&dir, e))?;

        tracing::info!("Checkpoint directory: '{}'", dir.display());
        Ok(Self { log_path: dir.join(log_file), dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path (before extension) of the snapshot for `epoch`.
    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.dir.join(epoch.to_string())
    }

    pub fn save_epoch<B: Backend, M: Module<B>>(&self, module: &M, epoch: usize) -> Result<(), TrainError> {
        save_module::<B, M>(module, &self.epoch_path(epoch))
    }

    /// Append one line to the run log. `line` must carry its own
    /// trailing newline.
    pub fn append_log(&self, line: &str) -> Result<(), TrainError> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| TrainError::checkpoint(&self.log_path, e))?;
        f.write_all(line.as_bytes())
            .map_err(|e| TrainError::checkpoint(&self.log_path, e))
    }
}
