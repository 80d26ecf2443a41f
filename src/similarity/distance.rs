// ============================================================
// Layer 7 — Qmax Cover Distance
// ============================================================
// CoverDistance implementation used by `spec2midi eval`:
// load both WAVs → chroma → OTI-aligned qmax distance.

use std::path::Path;

use ndarray::Array2;

use crate::domain::error::EvalError;
use crate::domain::traits::CoverDistance;
use crate::similarity::audio::load_mono;
use crate::similarity::chroma::{ChromaConfig, ChromaExtractor};
use crate::similarity::qmax::{qmax_distance, QmaxParams};

pub struct QmaxDistance {
    extractor: ChromaExtractor,
    params:    QmaxParams,
}

impl QmaxDistance {
    pub fn new(chroma: ChromaConfig, params: QmaxParams) -> Self {
        Self { extractor: ChromaExtractor::new(chroma), params }
    }

    fn chroma(&self, path: &Path) -> Result<Array2<f32>, EvalError> {
        let signal = load_mono(path, self.extractor.config().sample_rate)?;
        let chroma = self.extractor.extract(&signal);
        // The embedding needs at least one full window of frames.
        let min_frames = (self.params.embed_dim.max(1) - 1) * self.params.tau + 3;
        if chroma.nrows() < min_frames {
            return Err(EvalError::EmptySignal(path.to_path_buf()));
        }
        Ok(chroma)
    }
}

impl Default for QmaxDistance {
    fn default() -> Self {
        Self::new(ChromaConfig::default(), QmaxParams::default())
    }
}

impl CoverDistance for QmaxDistance {
    fn distance(&self, original: &Path, cover: &Path) -> Result<f64, EvalError> {
        let a = self.chroma(original)?;
        let b = self.chroma(cover)?;
        tracing::debug!(
            "Chroma frames: '{}' {}, '{}' {}",
            original.display(),
            a.nrows(),
            cover.display(),
            b.nrows()
        );
        qmax_distance(&a, &b, &self.params).ok_or_else(|| EvalError::NoAlignment(cover.to_path_buf()))
    }
}
