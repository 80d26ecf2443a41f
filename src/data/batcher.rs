// ============================================================
// Layer 4 — Transcription Batcher
// ============================================================
// Two stages:
//
//   TranscriptionBatcher  — burn Batcher: stacks samples into one
//                           flat host-side HostBatch (no device)
//   HostBatch::to_device  — uploads the six arrays as tensors to
//                           the worker's device
//
// Keeping collation on the host means the upload is a separate,
// fallible step in the training loop instead of a panic inside a
// data-loader thread.
//
// Shapes after upload:
//   spec      [batch, input_frames, n_bins]
//   sv        [batch, sv_dim]
//   onset     [batch, num_frame, num_note]
//   offset    [batch, num_frame, num_note]
//   mpe       [batch, num_frame, num_note]
//   velocity  [batch, num_frame, num_note]  (Int)

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};

use crate::data::dataset::{TranscriptionDataset, TranscriptionSample};
use crate::domain::config::SampleShape;
use crate::domain::error::TrainError;

/// A collated batch still in host memory.
#[derive(Debug, Clone)]
pub struct HostBatch {
    pub batch_size: usize,
    pub shape:      SampleShape,
    pub spec:       Vec<f32>,
    pub sv:         Vec<f32>,
    pub onset:      Vec<f32>,
    pub offset:     Vec<f32>,
    pub mpe:        Vec<f32>,
    pub velocity:   Vec<i64>,
}

/// The same batch as tensors on a compute device.
#[derive(Debug, Clone)]
pub struct TranscriptionBatch<B: Backend> {
    pub spec:     Tensor<B, 3>,
    pub sv:       Tensor<B, 2>,
    pub onset:    Tensor<B, 3>,
    pub offset:   Tensor<B, 3>,
    pub mpe:      Tensor<B, 3>,
    pub velocity: Tensor<B, 3, Int>,
}

impl HostBatch {
    /// Upload every array to `device`. Backends report an unusable
    /// device by panicking, so the panic is caught and turned into
    /// a DeviceTransfer error for this worker.
    pub fn to_device<B: Backend>(
        self,
        device: &B::Device,
        rank:   usize,
    ) -> Result<TranscriptionBatch<B>, TrainError> {
        let n  = self.batch_size;
        let sh = self.shape;

        catch_unwind(AssertUnwindSafe(|| {
            let labels = [n, sh.num_frame, sh.num_note];
            TranscriptionBatch {
                spec: Tensor::from_data(
                    TensorData::new(self.spec, [n, sh.input_frames, sh.n_bins]),
                    device,
                ),
                sv:       Tensor::from_data(TensorData::new(self.sv, [n, sh.sv_dim]), device),
                onset:    Tensor::from_data(TensorData::new(self.onset, labels), device),
                offset:   Tensor::from_data(TensorData::new(self.offset, labels), device),
                mpe:      Tensor::from_data(TensorData::new(self.mpe, labels), device),
                velocity: Tensor::from_data(TensorData::new(self.velocity, labels), device),
            }
        }))
        .map_err(|payload| TrainError::DeviceTransfer {
            rank,
            reason: panic_message(payload.as_ref()),
        })
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "backend panicked".to_string()
    }
}

// ─── TranscriptionBatcher ─────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct TranscriptionBatcher {
    shape: SampleShape,
}

impl TranscriptionBatcher {
    pub fn new(shape: SampleShape) -> Self {
        Self { shape }
    }
}

impl Batcher<TranscriptionSample, HostBatch> for TranscriptionBatcher {
    /// Concatenate each array across samples; the flat layout of a
    /// sample is already row-major, so stacking is an append.
    fn batch(&self, items: Vec<TranscriptionSample>) -> HostBatch {
        let n  = items.len();
        let sh = self.shape;

        let mut out = HostBatch {
            batch_size: n,
            shape:      sh,
            spec:       Vec::with_capacity(n * sh.spec_len()),
            sv:         Vec::with_capacity(n * sh.sv_dim),
            onset:      Vec::with_capacity(n * sh.label_len()),
            offset:     Vec::with_capacity(n * sh.label_len()),
            mpe:        Vec::with_capacity(n * sh.label_len()),
            velocity:   Vec::with_capacity(n * sh.label_len()),
        };

        for s in items {
            out.spec.extend(s.spec);
            out.sv.extend(s.sv);
            out.onset.extend(s.onset);
            out.offset.extend(s.offset);
            out.mpe.extend(s.mpe);
            out.velocity.extend(s.velocity.into_iter().map(i64::from));
        }
        out
    }
}

// ─── BatchIter ────────────────────────────────────────────────────────────────
/// Walks an index list in fixed-size chunks and collates each chunk.
/// The last batch may be short.
pub struct BatchIter {
    dataset:    Arc<TranscriptionDataset>,
    batcher:    TranscriptionBatcher,
    indices:    Vec<usize>,
    batch_size: usize,
    cursor:     usize,
}

impl BatchIter {
    pub fn new(
        dataset:    Arc<TranscriptionDataset>,
        batcher:    TranscriptionBatcher,
        indices:    Vec<usize>,
        batch_size: usize,
    ) -> Self {
        Self { dataset, batcher, indices, batch_size: batch_size.max(1), cursor: 0 }
    }
}

impl Iterator for BatchIter {
    type Item = HostBatch;

    fn next(&mut self) -> Option<HostBatch> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end   = (self.cursor + self.batch_size).min(self.indices.len());
        let items = self.indices[self.cursor..end]
            .iter()
            .filter_map(|&i| self.dataset.get(i))
            .collect::<Vec<_>>();
        self.cursor = end;
        Some(self.batcher.batch(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::fixtures;
    use crate::domain::config::fixtures::tiny_config;
    use burn::backend::NdArray;

    #[test]
    fn batch_iter_chunks_with_short_tail() {
        let shape   = tiny_config(std::path::Path::new("/tmp")).sample_shape();
        let dataset = Arc::new(fixtures::dataset(shape, 5));
        let iter    = BatchIter::new(dataset, TranscriptionBatcher::new(shape), vec![4, 0, 2, 1, 3], 2);
        let sizes: Vec<usize> = iter.map(|b| b.batch_size).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn upload_produces_configured_shapes() {
        let shape   = tiny_config(std::path::Path::new("/tmp")).sample_shape();
        let dataset = Arc::new(fixtures::dataset(shape, 3));
        let mut it  = BatchIter::new(dataset, TranscriptionBatcher::new(shape), vec![0, 1, 2], 3);
        let host    = it.next().unwrap();

        let device = Default::default();
        let batch  = host.to_device::<NdArray>(&device, 0).unwrap();
        assert_eq!(batch.spec.dims(), [3, shape.input_frames, shape.n_bins]);
        assert_eq!(batch.sv.dims(), [3, shape.sv_dim]);
        assert_eq!(batch.mpe.dims(), [3, shape.num_frame, shape.num_note]);
        assert_eq!(batch.velocity.dims(), [3, shape.num_frame, shape.num_note]);
    }

    #[test]
    fn upload_failure_becomes_device_transfer_error() {
        let shape = tiny_config(std::path::Path::new("/tmp")).sample_shape();
        let host  = HostBatch {
            batch_size: 1,
            shape,
            spec:     vec![0.0; 3],
            sv:       vec![],
            onset:    vec![],
            offset:   vec![],
            mpe:      vec![],
            velocity: vec![],
        };
        let device = Default::default();
        let err    = host.to_device::<NdArray>(&device, 2).unwrap_err();
        assert!(matches!(err, TrainError::DeviceTransfer { rank: 2, .. }));
    }
}
