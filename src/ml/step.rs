// ============================================================
// Layer 5 — Per-step Trainer
// ============================================================
// One pass over a batch iterator, one optimizer step per batch:
//
//   1. upload the host batch to the worker's device
//   2. forward: onset / offset / mpe / velocity logits
//   3. multi-task loss + frame F1
//   4. backward → gradients (fresh every step, nothing accumulates)
//   5. all-reduce the gradients when a collective group is attached
//   6. Adam step
//   7. hand (step, loss, f1, model) to the worker's role; only the
//      parent records progress, saves and logs
//
// Steps are numbered from 1 within each epoch.

use burn::{
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{backend::AutodiffBackend, ElementConversion},
};

use crate::data::batcher::HostBatch;
use crate::domain::error::TrainError;
use crate::ml::collective::{sync_gradients, CollectiveHandle};
use crate::ml::loss::MultiTaskLoss;
use crate::ml::model::Spec2Midi;
use crate::ml::role::RunRole;

/// Everything a step needs besides the model, optimizer and role.
pub struct StepContext<'a, B: Backend> {
    pub device: &'a B::Device,
    pub rank:   usize,
    pub lr:     f64,
    pub sync:   Option<&'a CollectiveHandle>,
    pub loss:   MultiTaskLoss,
}

/// Local (unsynchronised) averages over one epoch on one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochStats {
    pub steps:     usize,
    pub mean_loss: f64,
    pub mean_f1:   f64,
}

pub fn train_epoch<B, O, R>(
    mut model: Spec2Midi<B>,
    optim:     &mut O,
    batches:   impl Iterator<Item = HostBatch>,
    ctx:       &StepContext<'_, B>,
    role:      &mut R,
) -> Result<(Spec2Midi<B>, EpochStats), TrainError>
where
    B: AutodiffBackend,
    O: Optimizer<Spec2Midi<B>, B>,
    R: RunRole<B>,
{
    let mut stats    = EpochStats::default();
    let mut loss_sum = 0.0f64;
    let mut f1_sum   = 0.0f64;

    for (i, host) in batches.enumerate() {
        let step  = i + 1;
        let batch = host.to_device::<B>(ctx.device, ctx.rank)?;

        let pred     = model.forward(batch.spec.clone(), batch.sv.clone());
        let (loss, f1) = ctx.loss.compute(&pred, &batch);
        let loss_val: f64 = loss.clone().into_scalar().elem();

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        let grads = match ctx.sync {
            Some(handle) => sync_gradients(&model, grads, handle)?,
            None => grads,
        };
        model = optim.step(ctx.lr, model, grads);

        role.on_step(step, loss_val, f1, &model)?;

        loss_sum    += loss_val;
        f1_sum      += f1;
        stats.steps  = step;
    }

    if stats.steps > 0 {
        stats.mean_loss = loss_sum / stats.steps as f64;
        stats.mean_f1   = f1_sum / stats.steps as f64;
    }
    tracing::debug!(
        "Rank {} finished {} steps: loss={:.4} f1={:.4}",
        ctx.rank, stats.steps, stats.mean_loss, stats.mean_f1
    );
    Ok((model, stats))
}
