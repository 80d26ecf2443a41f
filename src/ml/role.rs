// ============================================================
// Layer 5 — Worker Roles
// ============================================================
// Exactly one worker per run is the parent. Its role object owns
// everything that touches the filesystem:
//
//   ParentRole — run directory, log file, progress reporter,
//                periodic "current" weights and epoch snapshots
//   WorkerRole — nothing; every hook is a no-op
//
// The training loop is generic over RunRole, so a non-parent
// worker has no value through which it could write a file.

use chrono::{FixedOffset, Utc};
use std::path::{Path, PathBuf};

use burn::prelude::*;

use crate::domain::config::AppConfig;
use crate::domain::error::TrainError;
use crate::infra::checkpoint::{save_module, RunDirectory};
use crate::infra::progress::TrainProgress;

/// Which role a rank plays; see `Trainer::role_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Parent,
    Worker,
}

pub trait RunRole<B: Backend> {
    fn on_run_start(&mut self, _n_epochs: usize, _n_iter: usize) {}

    fn on_step<M: Module<B>>(
        &mut self,
        _step:  usize,
        _loss:  f64,
        _f1:    f64,
        _model: &M,
    ) -> Result<(), TrainError> {
        Ok(())
    }

    fn on_epoch_end<M: Module<B>>(&mut self, _epoch: usize, _model: &M) -> Result<(), TrainError> {
        Ok(())
    }
}

// ─── WorkerRole ───────────────────────────────────────────────────────────────
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerRole;

impl<B: Backend> RunRole<B> for WorkerRole {}

// ─── ParentRole ───────────────────────────────────────────────────────────────
pub struct ParentRole {
    run:             RunDirectory,
    progress:        TrainProgress,
    current_weights: PathBuf,
    save_every:      usize,
    tz:              FixedOffset,
}

impl ParentRole {
    /// Create the timestamped run directory and an idle reporter.
    pub fn create(config: &AppConfig) -> Result<Self, TrainError> {
        let t  = &config.training;
        let tz = t.timezone()?;
        let run = RunDirectory::create(&t.checkpoint_dir, Utc::now().with_timezone(&tz), &t.log_file)?;

        Ok(Self {
            run,
            progress:        TrainProgress::new(),
            current_weights: config.default.pc.clone(),
            save_every:      t.save_every,
            tz,
        })
    }

    pub fn run_dir(&self) -> &Path {
        self.run.path()
    }

    fn now(&self) -> String {
        Utc::now().with_timezone(&self.tz).format("%Y/%m/%d %H:%M").to_string()
    }
}

impl<B: Backend> RunRole<B> for ParentRole {
    fn on_run_start(&mut self, n_epochs: usize, n_iter: usize) {
        self.progress.start(n_epochs, n_iter);
    }

    fn on_step<M: Module<B>>(
        &mut self,
        step:  usize,
        loss:  f64,
        f1:    f64,
        model: &M,
    ) -> Result<(), TrainError> {
        self.progress.update([loss, f1]);

        if self.save_every > 0 && step % self.save_every == 0 {
            save_module::<B, M>(model, &self.current_weights)?;
            let [loss, f1] = self.progress.now_values();
            self.run.append_log(&format!("{step}, loss: {loss}, f1: {f1}\n"))?;
        }
        Ok(())
    }

    fn on_epoch_end<M: Module<B>>(&mut self, epoch: usize, model: &M) -> Result<(), TrainError> {
        let [loss, f1] = self.progress.now_values();
        self.run.save_epoch::<B, M>(model, epoch)?;
        self.run.append_log(&format!(
            "{}, epoch {epoch} finished, loss: {loss}, f1: {f1}\n",
            self.now()
        ))?;
        tracing::info!("Epoch {} finished: loss={:.4} f1={:.4}", epoch, loss, f1);
        Ok(())
    }
}
