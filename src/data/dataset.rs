// ============================================================
// Layer 4 — Transcription Dataset
// ============================================================
// In-memory samples behind burn's Dataset trait.

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::config::SampleShape;

/// One training window: a spectrogram slice with its conditioning
/// vector and the four aligned label grids.
///
/// Arrays are stored flat in row-major order:
///   spec                    [input_frames, n_bins]
///   sv                      [sv_dim]
///   onset / offset / mpe    [num_frame, num_note]
///   velocity                [num_frame, num_note], values in 0..num_velocity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSample {
    pub spec:     Vec<f32>,
    pub sv:       Vec<f32>,
    pub onset:    Vec<f32>,
    pub offset:   Vec<f32>,
    pub mpe:      Vec<f32>,
    pub velocity: Vec<u32>,
}

impl TranscriptionSample {
    /// Returns a description of the first array whose length or
    /// value range disagrees with `shape`.
    pub fn check_shape(&self, shape: &SampleShape) -> Result<(), String> {
        let expected = [
            ("spec",     self.spec.len(),     shape.spec_len()),
            ("sv",       self.sv.len(),       shape.sv_dim),
            ("onset",    self.onset.len(),    shape.label_len()),
            ("offset",   self.offset.len(),   shape.label_len()),
            ("mpe",      self.mpe.len(),      shape.label_len()),
            ("velocity", self.velocity.len(), shape.label_len()),
        ];
        for (name, found, want) in expected {
            if found != want {
                return Err(format!("{name} has {found} values, expected {want}"));
            }
        }
        if let Some(v) = self.velocity.iter().find(|&&v| v as usize >= shape.num_velocity) {
            return Err(format!(
                "velocity class {v} out of range 0..{}",
                shape.num_velocity
            ));
        }
        Ok(())
    }
}

/// Read-only, in-memory collection of samples. Shared across
/// workers behind an Arc; each worker reads its own shard indices.
#[derive(Debug)]
pub struct TranscriptionDataset {
    samples: Vec<TranscriptionSample>,
    shape:   SampleShape,
}

impl TranscriptionDataset {
    pub fn new(samples: Vec<TranscriptionSample>, shape: SampleShape) -> Self {
        Self { samples, shape }
    }

    pub fn shape(&self) -> SampleShape {
        self.shape
    }
}

impl Dataset<TranscriptionSample> for TranscriptionDataset {
    fn get(&self, index: usize) -> Option<TranscriptionSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
