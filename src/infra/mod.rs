// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Filesystem concerns shared by the other layers:
//
//   config_store.rs — models/config.json load/save + validation
//   checkpoint.rs   — CompactRecorder saves, run directory, run log
//   progress.rs     — running epoch averages and the progress bar

/// Config file loading and validation
pub mod config_store;

/// Model checkpoint saving and the per-run log
pub mod checkpoint;

/// Training progress reporter
pub mod progress;
