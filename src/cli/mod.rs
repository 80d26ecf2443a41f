// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and prints results. All work is
// delegated to Layer 2 (application).
//
//   spec2midi train --config models/config.json --workers 2
//   spec2midi eval  --dir_input eval/data/ --path_result eval/qmax.txt

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvalArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "spec2midi",
    version = "0.1.0",
    about = "Train a spectrogram-to-MIDI transformer and evaluate cover similarity."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Eval(args)  => run_eval(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Training on samples in '{}'", args.data_dir.display());
    let summary = TrainUseCase::new(args.into()).execute()?;

    for w in &summary.workers {
        if let Some(last) = w.epochs.last() {
            println!(
                "Rank {} ({:?}): {} epochs, last epoch loss {:.4}, f1 {:.4}",
                w.rank, w.role, w.epochs.len(), last.mean_loss, last.mean_f1
            );
        }
    }

    match &summary.run_dir {
        Some(dir) => println!("Training complete. Checkpoints in '{}'.", dir.display()),
        None => println!("Training complete."),
    }
    Ok(())
}

fn run_eval(args: EvalArgs) -> Result<()> {
    use crate::application::eval_use_case::{CoverEvaluator, EvalOutcome};
    use crate::domain::traits::DirectoryResolver;
    use crate::similarity::distance::QmaxDistance;

    let evaluator = CoverEvaluator::new(DirectoryResolver::new(&args.dir_original), QmaxDistance::default());

    match evaluator.run(&args.dir_input, &args.path_result)? {
        EvalOutcome::NoCovers => println!("No covers found."),
        EvalOutcome::Evaluated { report, written } => {
            for cover in &report.missing {
                let stem = cover.file_stem().unwrap_or_default().to_string_lossy();
                println!("No original found for {stem}.");
            }
            if let (true, Some(avg)) = (written, report.average()) {
                println!("Average distance: {avg}");
            }
        }
    }
    Ok(())
}
