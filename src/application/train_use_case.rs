// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Runs the training pipeline in order:
//
//   Step 1: Load and validate models/config.json   (Layer 6 - infra)
//   Step 2: Apply command-line overrides
//   Step 3: Load training samples                  (Layer 4 - data)
//   Step 4: Build the orchestrator                 (Layer 5 - ml)
//   Step 5: Train on every worker                  (Layer 5 - ml)

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};

use crate::data::loader::SampleLoader;
use crate::domain::config::AppConfig;
use crate::infra::config_store::ConfigStore;
use crate::ml::backend::{device_for_rank, TrainBackend};
use crate::ml::orchestrator::{RunSummary, Trainer};

// ─── TrainRequest ─────────────────────────────────────────────────────────────
// Everything the `train` command can set. Optional fields override
// the config file's `training` section.
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub config_path:   PathBuf,
    pub data_dir:      PathBuf,
    pub workers:       usize,
    pub batch_size:    usize,
    pub epochs:        usize,
    pub learning_rate: Option<f64>,
    pub save_every:    Option<usize>,
    pub seed:          Option<u64>,
    pub fresh:         bool,
}

impl TrainRequest {
    fn apply_overrides(&self, config: &mut AppConfig) {
        let t = &mut config.training;
        if let Some(lr) = self.learning_rate {
            t.learning_rate = lr;
        }
        if let Some(every) = self.save_every {
            t.save_every = every;
        }
        if let Some(seed) = self.seed {
            t.seed = seed;
        }
        if self.fresh {
            t.pretrained = false;
        }
    }
}

pub struct TrainUseCase {
    request: TrainRequest,
}

impl TrainUseCase {
    pub fn new(request: TrainRequest) -> Self {
        Self { request }
    }

    pub fn execute(&self) -> Result<RunSummary> {
        let req = &self.request;

        // ── Step 1: Config ────────────────────────────────────────────────────
        let mut config = ConfigStore::new(&req.config_path)
            .load()
            .context("Failed to load model configuration")?;

        // ── Step 2: Overrides ─────────────────────────────────────────────────
        req.apply_overrides(&mut config);
        config.validate()?;

        // ── Step 3: Samples ───────────────────────────────────────────────────
        let dataset = SampleLoader::new(&req.data_dir)
            .load(config.sample_shape())
            .with_context(|| format!("Failed to load samples from '{}'", req.data_dir.display()))?;

        // ── Step 4: Orchestrator ──────────────────────────────────────────────
        let trainer = Trainer::new(
            Arc::new(config),
            Arc::new(dataset),
            req.workers,
            req.batch_size,
            req.epochs,
        )?;
        if trainer.is_multi_worker() {
            tracing::info!("Multi-worker mode: {} devices", req.workers);
        }

        // ── Step 5: Train ─────────────────────────────────────────────────────
        let workers = req.workers;
        let summary = trainer
            .run::<TrainBackend, _>(|rank| device_for_rank(rank, workers))
            .context("Training failed")?;
        Ok(summary)
    }
}
