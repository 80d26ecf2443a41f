// ============================================================
// Layer 7 — Cover Similarity
// ============================================================
// Audio fingerprinting for cover-song evaluation:
//
//   audio.rs    — WAV → mono signal at the analysis rate
//   chroma.rs   — per-frame 12-bin pitch-class profiles
//   qmax.rs     — OTI, cross-recurrence plot, Qmax score
//   distance.rs — QmaxDistance, the evaluator's CoverDistance

pub mod audio;

pub mod chroma;

pub mod qmax;

pub mod distance;
