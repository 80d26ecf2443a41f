// ============================================================
// Layer 2 — EvalUseCase
// ============================================================
// Scores every cover in a directory against its original:
//
//   Step 1: List <dir_input>/*.wav, sorted by name
//   Step 2: Resolve each cover's original from its file stem
//             missing  → recorded, skipped
//   Step 3: Distance(original, cover)
//             failure  → recorded, skipped
//   Step 4: Write the report when at least one distance exists
//
// Nothing per-cover aborts the run. Only listing the input
// directory or writing the report can fail.

use std::{
    fmt::Write as _,
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::domain::traits::{CoverDistance, OriginalResolver};

// ─── CoverReport ──────────────────────────────────────────────────────────────
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CoverReport {
    /// (cover stem, distance) in input order
    pub distances: Vec<(String, f64)>,
    /// Covers whose original does not exist
    pub missing:   Vec<PathBuf>,
    /// Covers whose distance could not be computed, with the reason
    pub failed:    Vec<(PathBuf, String)>,
}

impl CoverReport {
    /// Mean over computed distances; `None` when there are none.
    pub fn average(&self) -> Option<f64> {
        if self.distances.is_empty() {
            return None;
        }
        let sum: f64 = self.distances.iter().map(|(_, d)| d).sum();
        Some(sum / self.distances.len() as f64)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(avg) = self.average() {
            let _ = writeln!(out, "Average distance: {avg}");
        }
        out.push('\n');
        out.push_str("Distance per cover:\n");
        for (name, d) in &self.distances {
            let _ = writeln!(out, "  {name}: {d}");
        }
        out.push('\n');
        if !self.missing.is_empty() {
            out.push_str("No original found for covers:\n");
            for cover in &self.missing {
                let _ = writeln!(out, "  {}", cover.display());
            }
        }
        if !self.failed.is_empty() {
            out.push_str("Failed to score covers:\n");
            for (cover, reason) in &self.failed {
                let _ = writeln!(out, "  {}: {reason}", cover.display());
            }
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create '{}'", parent.display()))?;
        }
        fs::write(path, self.render())
            .with_context(|| format!("Failed to write report '{}'", path.display()))
    }
}

/// What one evaluation run produced.
#[derive(Debug)]
pub enum EvalOutcome {
    NoCovers,
    /// `written` is false when no cover could be scored.
    Evaluated { report: CoverReport, written: bool },
}

// ─── CoverEvaluator ───────────────────────────────────────────────────────────
pub struct CoverEvaluator<R, D> {
    resolver: R,
    distance: D,
}

impl<R: OriginalResolver, D: CoverDistance> CoverEvaluator<R, D> {
    pub fn new(resolver: R, distance: D) -> Self {
        Self { resolver, distance }
    }

    /// `*.wav` files directly inside `dir`, sorted. A missing
    /// directory has no covers.
    pub fn list_covers(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Cannot read '{}'", dir.display())),
        };

        let mut covers = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "wav") {
                covers.push(path);
            }
        }
        covers.sort();
        Ok(covers)
    }

    pub fn evaluate(&self, covers: &[PathBuf]) -> CoverReport {
        let mut report = CoverReport::default();

        for cover in covers {
            let stem = cover
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let original = self.resolver.resolve(&stem);
            if !original.exists() {
                tracing::warn!("No original found for {}", stem);
                report.missing.push(cover.clone());
                continue;
            }

            match self.distance.distance(&original, cover) {
                Ok(d) => {
                    tracing::info!("{}: {}", stem, d);
                    report.distances.push((stem, d));
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", stem, e);
                    report.failed.push((cover.clone(), e.to_string()));
                }
            }
        }
        report
    }

    pub fn run(&self, dir_input: &Path, path_result: &Path) -> Result<EvalOutcome> {
        let covers = Self::list_covers(dir_input)?;
        if covers.is_empty() {
            return Ok(EvalOutcome::NoCovers);
        }
        tracing::info!("Scoring {} covers from '{}'", covers.len(), dir_input.display());

        let report  = self.evaluate(&covers);
        let written = !report.distances.is_empty();
        if written {
            report.write(path_result)?;
            tracing::info!("Report written to '{}'", path_result.display());
        }
        Ok(EvalOutcome::Evaluated { report, written })
    }
}
