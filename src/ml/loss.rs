// ============================================================
// Layer 5 — Multi-task Loss and Frame F1
// ============================================================
// loss = BCE(onset) + BCE(offset) + BCE(mpe) + CE(velocity)
//
//   - onset / offset / mpe are per-(frame, note) binary targets;
//     BCE is computed on logits in the stable form
//       max(x, 0) - x*t + ln(1 + e^-|x|)
//   - velocity is a class per (frame, note), scored with
//     cross-entropy over num_velocity logits
//
// The reported quality metric is the frame-level F1 of the mpe
// head at a 0.5 probability threshold (logit 0).

use burn::{
    nn::loss::CrossEntropyLossConfig,
    prelude::*,
    tensor::ElementConversion,
};

use crate::data::batcher::TranscriptionBatch;
use crate::ml::model::Spec2MidiOutput;

#[derive(Debug, Clone, Copy, Default)]
pub struct MultiTaskLoss;

impl MultiTaskLoss {
    /// Returns the scalar loss (still attached to the graph) and the
    /// F1 score as a plain number.
    pub fn compute<B: Backend>(
        &self,
        pred:  &Spec2MidiOutput<B>,
        label: &TranscriptionBatch<B>,
    ) -> (Tensor<B, 1>, f64) {
        let onset  = bce_with_logits(pred.onset.clone(), label.onset.clone());
        let offset = bce_with_logits(pred.offset.clone(), label.offset.clone());
        let mpe    = bce_with_logits(pred.mpe.clone(), label.mpe.clone());

        let [b, f, n, v] = pred.velocity.dims();
        let ce = CrossEntropyLossConfig::new().init(&pred.velocity.device());
        let velocity = ce.forward(
            pred.velocity.clone().reshape([b * f * n, v]),
            label.velocity.clone().reshape([b * f * n]),
        );

        let f1 = frame_f1(pred.mpe.clone(), label.mpe.clone());
        (onset + offset + mpe + velocity, f1)
    }
}

fn bce_with_logits<B: Backend, const D: usize>(logits: Tensor<B, D>, target: Tensor<B, D>) -> Tensor<B, 1> {
    let softplus = logits.clone().abs().neg().exp().log1p();
    (logits.clone().clamp_min(0.0) - logits * target + softplus).mean()
}

/// F1 of thresholded frame predictions. Defined as 1.0 when neither
/// prediction nor label has an active cell.
pub fn frame_f1<B: Backend, const D: usize>(logits: Tensor<B, D>, target: Tensor<B, D>) -> f64 {
    let pred   = logits.greater_elem(0.0).float();
    let target = target.greater_elem(0.5).float();

    let tp: f64 = (pred.clone() * target.clone()).sum().into_scalar().elem();
    let predicted: f64 = pred.sum().into_scalar().elem();
    let actual: f64 = target.sum().into_scalar().elem();

    if predicted + actual == 0.0 {
        return 1.0;
    }
    2.0 * tp / (predicted + actual)
}
