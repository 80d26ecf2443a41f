// ============================================================
// Layer 5 — Distributed Trainer Orchestrator
// ============================================================
// Runs one training job on N workers, one per compute device.
//
//   Trainer::run
//     ├── CollectiveGroup::create(N)       (only when N > 1)
//     ├── spawn worker 0 .. N-1            (scoped OS threads)
//     │     setup:  model on device → join group → copy rank 0's
//     │             parameters → Adam → sampler
//     │     role:   ParentRole (rank 0 / sole worker) or WorkerRole
//     │     epochs: sampler.set_epoch(e) → train_epoch → on_epoch_end
//     │     leave group
//     └── join all workers, report the root-cause error if any
//
// Each worker owns its model replica, optimizer state and group
// handle. The dataset is shared read-only; workers read disjoint
// shards of it.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use burn::{
    data::dataset::Dataset,
    optim::{AdamConfig, Optimizer},
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::{BatchIter, TranscriptionBatcher};
use crate::data::dataset::TranscriptionDataset;
use crate::data::sampler::DistributedSampler;
use crate::domain::config::AppConfig;
use crate::domain::error::{ConfigError, TrainError};
use crate::ml::collective::{sync_parameters, CollectiveGroup, CollectiveHandle};
use crate::ml::factory::{ModelFactory, ModelMode, WeightSource};
use crate::ml::loss::MultiTaskLoss;
use crate::ml::model::Spec2Midi;
use crate::ml::role::{ParentRole, RoleKind, RunRole, WorkerRole};
use crate::ml::step::{train_epoch, EpochStats, StepContext};

/// What one worker did during the run.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub rank:   usize,
    pub role:   RoleKind,
    pub epochs: Vec<EpochStats>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub workers: Vec<WorkerReport>,
    /// Checkpoint directory created by the parent
    pub run_dir: Option<PathBuf>,
}

pub struct Trainer {
    config:       Arc<AppConfig>,
    dataset:      Arc<TranscriptionDataset>,
    n_workers:    usize,
    batch_size:   usize,
    n_epochs:     usize,
    multi_worker: bool,
}

impl Trainer {
    pub fn new(
        config:     Arc<AppConfig>,
        dataset:    Arc<TranscriptionDataset>,
        n_workers:  usize,
        batch_size: usize,
        n_epochs:   usize,
    ) -> Result<Self, TrainError> {
        config.validate()?;
        if n_workers == 0 {
            return Err(ConfigError::Invalid("worker count must be at least 1".into()).into());
        }
        if batch_size == 0 {
            return Err(ConfigError::Invalid("batch size must be at least 1".into()).into());
        }
        Ok(Self {
            config,
            dataset,
            n_workers,
            batch_size,
            n_epochs,
            multi_worker: n_workers > 1,
        })
    }

    pub fn is_multi_worker(&self) -> bool {
        self.multi_worker
    }

    /// The sole worker, or rank 0 of a group, is the parent.
    pub fn role_of(&self, rank: usize) -> RoleKind {
        if !self.multi_worker || rank == 0 {
            RoleKind::Parent
        } else {
            RoleKind::Worker
        }
    }

    fn weight_source(&self) -> WeightSource {
        if self.config.training.pretrained {
            WeightSource::defaults()
        } else {
            WeightSource::Fresh
        }
    }

    /// Train on every worker and wait for all of them.
    /// `device_for(rank)` picks the device each worker runs on.
    pub fn run<B, F>(&self, device_for: F) -> Result<RunSummary, TrainError>
    where
        B: AutodiffBackend,
        F: Fn(usize) -> B::Device,
    {
        let handles: Vec<Option<CollectiveHandle>> = if self.multi_worker {
            CollectiveGroup::create(self.n_workers)?.into_iter().map(Some).collect()
        } else {
            vec![None]
        };

        tracing::info!(
            "Starting {} worker(s): {} samples, batch size {}, {} epochs",
            handles.len(),
            self.dataset.len(),
            self.batch_size,
            self.n_epochs,
        );

        let joined: Vec<Result<(WorkerReport, Option<PathBuf>), TrainError>> = thread::scope(|s| {
            let workers: Vec<_> = handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    let device = device_for(rank);
                    s.spawn(move || self.run_worker::<B>(rank, device, handle))
                })
                .collect();

            workers
                .into_iter()
                .enumerate()
                .map(|(rank, w)| w.join().unwrap_or(Err(TrainError::WorkerPanicked { rank })))
                .collect()
        });

        let mut workers = Vec::with_capacity(joined.len());
        let mut run_dir = None;
        let mut errors  = Vec::new();
        for (rank, result) in joined.into_iter().enumerate() {
            match result {
                Ok((report, dir)) => {
                    run_dir = run_dir.or(dir);
                    workers.push(report);
                }
                Err(e) => {
                    tracing::error!("Worker {} failed: {}", rank, e);
                    errors.push(e);
                }
            }
        }

        if !errors.is_empty() {
            // Peers of a failed worker only see the disconnect; report the cause.
            let root = errors.iter().position(|e| !e.is_secondary()).unwrap_or(0);
            return Err(errors.swap_remove(root));
        }

        tracing::info!("Training complete");
        Ok(RunSummary { workers, run_dir })
    }

    fn run_worker<B: AutodiffBackend>(
        &self,
        rank:   usize,
        device: B::Device,
        handle: Option<CollectiveHandle>,
    ) -> Result<(WorkerReport, Option<PathBuf>), TrainError> {
        // ── Setup ─────────────────────────────────────────────────────────────
        let model = self.build_replica::<B>(&device, handle.as_ref())?;

        let mut optim = AdamConfig::new().init::<B, Spec2Midi<B>>();
        let world     = handle.as_ref().map_or(1, CollectiveHandle::world_size);
        let mut sampler = DistributedSampler::new(self.dataset.len(), world, rank, self.config.training.seed);
        let batcher   = TranscriptionBatcher::new(self.dataset.shape());

        let role = self.role_of(rank);
        let (epochs, run_dir) = {
            let ctx = StepContext {
                device: &device,
                rank,
                lr:     self.config.training.learning_rate,
                sync:   handle.as_ref(),
                loss:   MultiTaskLoss,
            };

            match role {
                RoleKind::Parent => {
                    let mut parent = ParentRole::create(&self.config)?;
                    let epochs = self.drive(model, &mut optim, &mut sampler, &batcher, &ctx, &mut parent)?;
                    (epochs, Some(parent.run_dir().to_path_buf()))
                }
                RoleKind::Worker => {
                    let epochs = self.drive(model, &mut optim, &mut sampler, &batcher, &ctx, &mut WorkerRole)?;
                    (epochs, None)
                }
            }
        };

        if let Some(h) = handle {
            h.leave()?;
        }

        Ok((WorkerReport { rank, role, epochs }, run_dir))
    }

    /// Build this worker's model and, in a group, make it identical
    /// to rank 0's before the first step.
    fn build_replica<B: AutodiffBackend>(
        &self,
        device: &B::Device,
        handle: Option<&CollectiveHandle>,
    ) -> Result<Spec2Midi<B>, TrainError> {
        let mode  = ModelMode::Transcription { sv_dim: self.config.model.sv_dim };
        let model = ModelFactory::new(&self.config).load::<B>(device, mode, &self.weight_source())?;

        match handle {
            Some(h) => {
                h.join()?;
                Ok(sync_parameters::<B, _>(model, h)?)
            }
            None => Ok(model),
        }
    }

    /// The epoch loop, identical for every role.
    fn drive<B, O, R>(
        &self,
        mut model: Spec2Midi<B>,
        optim:     &mut O,
        sampler:   &mut DistributedSampler,
        batcher:   &TranscriptionBatcher,
        ctx:       &StepContext<'_, B>,
        role:      &mut R,
    ) -> Result<Vec<EpochStats>, TrainError>
    where
        B: AutodiffBackend,
        O: Optimizer<Spec2Midi<B>, B>,
        R: RunRole<B>,
    {
        let n_iter = sampler.num_samples().div_ceil(self.batch_size);
        role.on_run_start(self.n_epochs, n_iter);

        let mut history = Vec::with_capacity(self.n_epochs);
        for epoch in 0..self.n_epochs {
            sampler.set_epoch(epoch);
            let batches = BatchIter::new(
                Arc::clone(&self.dataset),
                batcher.clone(),
                sampler.indices(),
                self.batch_size,
            );

            let (next, stats) = train_epoch(model, optim, batches, ctx, role)?;
            model = next;
            role.on_epoch_end(epoch, &model)?;
            history.push(stats);
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::fixtures;
    use crate::domain::config::fixtures::tiny_config;
    use crate::ml::collective::param_values;
    use burn::backend::{Autodiff, NdArray};
    use std::fs;

    type B = Autodiff<NdArray>;

    fn trainer(cfg: AppConfig, n_workers: usize, n_samples: usize, n_epochs: usize) -> Trainer {
        let shape   = cfg.sample_shape();
        let dataset = Arc::new(fixtures::dataset(shape, n_samples));
        Trainer::new(Arc::new(cfg), dataset, n_workers, 1, n_epochs).unwrap()
    }

    fn run_dirs(root: &std::path::Path) -> Vec<PathBuf> {
        fs::read_dir(root)
            .map(|rd| rd.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn exactly_one_parent_for_any_worker_count() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=8 {
            let t = trainer(tiny_config(dir.path()), n, 4, 1);
            let parents: Vec<usize> = (0..n).filter(|&r| t.role_of(r) == RoleKind::Parent).collect();
            assert_eq!(parents, vec![0]);
            assert_eq!(t.is_multi_worker(), n > 1);
        }
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let dir     = tempfile::tempdir().unwrap();
        let cfg     = tiny_config(dir.path());
        let dataset = Arc::new(fixtures::dataset(cfg.sample_shape(), 2));
        let err     = Trainer::new(Arc::new(cfg), dataset, 0, 1, 1).err().unwrap();
        assert!(matches!(err, TrainError::Config(_)));
    }

    #[test]
    fn single_worker_writes_one_snapshot_and_summary_per_epoch() {
        let dir     = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(dir.path());
        cfg.training.save_every = 0;
        let root    = cfg.training.checkpoint_dir.clone();

        let summary = trainer(cfg, 1, 3, 3).run::<B, _>(|_| Default::default()).unwrap();
        let run_dir = summary.run_dir.unwrap();
        assert_eq!(run_dirs(&root), vec![run_dir.clone()]);

        let log = fs::read_to_string(run_dir.join("log.txt")).unwrap();
        let summaries: Vec<&str> = log.lines().filter(|l| l.contains("finished")).collect();
        assert_eq!(summaries.len(), 3);
        assert!(summaries[2].contains("epoch 2 finished, loss: "));
        for epoch in 0..3 {
            assert!(run_dir.join(format!("{epoch}.mpk")).exists());
        }

        assert_eq!(summary.workers.len(), 1);
        assert_eq!(summary.workers[0].role, RoleKind::Parent);
        assert_eq!(summary.workers[0].epochs.len(), 3);
    }

    #[test]
    fn multi_worker_run_has_single_writer() {
        let dir     = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(dir.path());
        cfg.training.save_every = 2;
        let root    = cfg.training.checkpoint_dir.clone();

        // 4 samples over 2 workers: 2 steps per worker per epoch
        let summary = trainer(cfg, 2, 4, 2).run::<B, _>(|_| Default::default()).unwrap();

        assert_eq!(run_dirs(&root).len(), 1);
        let run_dir = summary.run_dir.unwrap();
        let log     = fs::read_to_string(run_dir.join("log.txt")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        // per epoch: one periodic line at step 2, one summary line
        assert_eq!(lines.len(), 4);
        assert_eq!(lines.iter().filter(|l| l.contains("finished")).count(), 2);
        assert!(lines[0].starts_with("2, loss: "));

        let entries = run_dirs(&run_dir);
        assert_eq!(entries.len(), 3, "log.txt + two epoch snapshots, got {entries:?}");

        let roles: Vec<RoleKind> = summary.workers.iter().map(|w| w.role).collect();
        assert_eq!(roles, vec![RoleKind::Parent, RoleKind::Worker]);
        for w in &summary.workers {
            assert_eq!(w.epochs.len(), 2);
            assert!(w.epochs.iter().all(|e| e.steps == 2));
        }
    }

    #[test]
    fn missing_pretrained_weights_abort_the_run() {
        let dir     = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(dir.path());
        cfg.training.pretrained = true;
        let root    = cfg.training.checkpoint_dir.clone();

        let err = trainer(cfg, 2, 4, 1).run::<B, _>(|_| Default::default()).unwrap_err();
        assert!(matches!(err, TrainError::WeightLoad(_)));
        assert!(run_dirs(&root).is_empty());
    }

    #[test]
    fn replicas_start_and_stay_identical() {
        let dir     = tempfile::tempdir().unwrap();
        let t       = trainer(tiny_config(dir.path()), 2, 2, 1);
        let handles = CollectiveGroup::create(2).unwrap();

        let (synced, stepped): (Vec<Vec<f32>>, Vec<Vec<f32>>) = thread::scope(|s| {
            let joins: Vec<_> = handles
                .into_iter()
                .enumerate()
                .map(|(rank, h)| {
                    let t = &t;
                    s.spawn(move || {
                        let device = Default::default();
                        let model  = t.build_replica::<B>(&device, Some(&h)).unwrap();
                        let synced = param_values::<B, _>(&model);

                        // each rank trains on a different sample
                        let mut optim = AdamConfig::new().init::<B, Spec2Midi<B>>();
                        let batcher   = TranscriptionBatcher::new(t.dataset.shape());
                        let batches   = BatchIter::new(Arc::clone(&t.dataset), batcher, vec![rank], 1);
                        let ctx = StepContext {
                            device: &device,
                            rank,
                            lr:     1e-3,
                            sync:   Some(&h),
                            loss:   MultiTaskLoss,
                        };
                        let (model, stats) = train_epoch(model, &mut optim, batches, &ctx, &mut WorkerRole).unwrap();
                        assert_eq!(stats.steps, 1);
                        let stepped = param_values::<B, _>(&model);

                        h.leave().unwrap();
                        (synced, stepped)
                    })
                })
                .collect();
            joins.into_iter().map(|j| j.join().unwrap()).unzip()
        });

        assert_eq!(synced[0], synced[1]);
        assert_eq!(stepped[0], stepped[1]);
        assert_ne!(synced[0], stepped[0]);
    }

    #[test]
    fn parent_checkpoint_failure_is_reported_as_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = tiny_config(dir.path());
        // a plain file where the checkpoint root should be
        fs::write(&cfg.training.checkpoint_dir, b"").unwrap();

        let err = trainer(cfg, 2, 4, 1).run::<B, _>(|_| Default::default()).unwrap_err();
        assert!(matches!(err, TrainError::Checkpoint { .. }), "got {err:?}");
    }

    #[test]
    fn failing_worker_is_reported_over_parent_disconnect() {
        let dir   = tempfile::tempdir().unwrap();
        let cfg   = tiny_config(dir.path());
        let shape = cfg.sample_shape();

        // Corrupt exactly the samples rank 1 draws in epoch 0; rank 0's
        // shard stays valid, so the parent only sees the disconnect.
        let mut sampler = DistributedSampler::new(4, 2, 1, cfg.training.seed);
        sampler.set_epoch(0);
        let mut samples: Vec<_> = (0..4).map(|i| fixtures::sample(&shape, i)).collect();
        for i in sampler.indices() {
            samples[i].spec.truncate(1);
        }
        let dataset = Arc::new(TranscriptionDataset::new(samples, shape));

        let t   = Trainer::new(Arc::new(cfg), dataset, 2, 1, 1).unwrap();
        let err = t.run::<B, _>(|_| Default::default()).unwrap_err();
        assert!(matches!(err, TrainError::DeviceTransfer { rank: 1, .. }), "got {err:?}");
        assert!(!err.is_secondary());
    }

    #[test]
    fn invalid_config_is_rejected_before_any_worker_starts() {
        let dir     = tempfile::tempdir().unwrap();
        let mut cfg = tiny_config(dir.path());
        cfg.training.utc_offset_hours = 99;
        let dataset = Arc::new(fixtures::dataset(cfg.sample_shape(), 2));
        let err     = Trainer::new(Arc::new(cfg), dataset, 2, 1, 1).err().unwrap();
        assert!(matches!(err, TrainError::Config(_)));
    }
}
