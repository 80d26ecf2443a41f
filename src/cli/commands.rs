// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// The two subcommands, `train` and `eval`, and their flags.
// Eval flags keep their underscore spelling (`--dir_input`).

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainRequest;
use crate::infra::config_store::DEFAULT_CONFIG_PATH;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the transcription model on one or more devices
    Train(TrainArgs),

    /// Score covers against their originals with the qmax distance
    Eval(EvalArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Model configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory of JSON training samples
    #[arg(long, default_value = "data/train")]
    pub data_dir: PathBuf,

    /// Number of worker devices; more than one enables gradient all-reduce
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Samples per step on each worker
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Overrides training.learning_rate
    #[arg(long)]
    pub lr: Option<f64>,

    /// Overrides training.save_every (0 disables periodic saves)
    #[arg(long)]
    pub save_every: Option<usize>,

    /// Overrides training.seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Start from randomly initialised weights
    #[arg(long)]
    pub fresh: bool,
}

impl From<TrainArgs> for TrainRequest {
    fn from(a: TrainArgs) -> Self {
        TrainRequest {
            config_path:   a.config,
            data_dir:      a.data_dir,
            workers:       a.workers,
            batch_size:    a.batch_size,
            epochs:        a.epochs,
            learning_rate: a.lr,
            save_every:    a.save_every,
            seed:          a.seed,
            fresh:         a.fresh,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Directory containing cover WAV files
    #[arg(long = "dir_input", default_value = "eval/data/")]
    pub dir_input: PathBuf,

    /// Path to save the result
    #[arg(long = "path_result", default_value = "eval/qmax.txt")]
    pub path_result: PathBuf,

    /// Directory holding the original recordings as <id>.wav
    #[arg(long = "dir_original", default_value = "data/original/")]
    pub dir_original: PathBuf,
}
