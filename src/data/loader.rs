// ============================================================
// Layer 4 — Sample Loader
// ============================================================
// Reads pre-computed training windows from a directory.
//
// Each `*.json` file holds one serialized TranscriptionSample
// (spectrogram window, conditioning vector and labels). Files
// are read in sorted order so the dataset index of every window
// is stable between runs, which the sampler relies on for
// reproducible shuffles.

use anyhow::{bail, Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::data::dataset::{TranscriptionDataset, TranscriptionSample};
use crate::domain::config::SampleShape;

pub struct SampleLoader {
    dir: PathBuf,
}

impl SampleLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load and shape-check every sample file.
    /// A malformed file aborts the load; training on a silently
    /// truncated dataset would change the shard layout.
    pub fn load(&self, shape: SampleShape) -> Result<TranscriptionDataset> {
        let files = self.sample_files()?;
        if files.is_empty() {
            bail!("no sample files (*.json) found in '{}'", self.dir.display());
        }

        let mut samples = Vec::with_capacity(files.len());
        for path in &files {
            let sample = load_single_sample(path)?;
            sample
                .check_shape(&shape)
                .map_err(|e| anyhow::anyhow!("sample '{}': {e}", path.display()))?;
            samples.push(sample);
        }

        tracing::info!("Loaded {} samples from '{}'", samples.len(), self.dir.display());
        Ok(TranscriptionDataset::new(samples, shape))
    }

    fn sample_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn load_single_sample(path: &Path) -> Result<TranscriptionSample> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read sample '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Cannot parse sample '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::fixtures::sample;
    use crate::domain::config::fixtures::tiny_config;
    use burn::data::dataset::Dataset;

    #[test]
    fn loads_json_samples_in_sorted_order() {
        let dir   = tempfile::tempdir().unwrap();
        let shape = tiny_config(dir.path()).sample_shape();
        for (name, seed) in [("b.json", 1), ("a.json", 0)] {
            let json = serde_json::to_string(&sample(&shape, seed)).unwrap();
            fs::write(dir.path().join(name), json).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let ds = SampleLoader::new(dir.path()).load(shape).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0).unwrap().spec, sample(&shape, 0).spec);
    }

    #[test]
    fn rejects_mis_shaped_sample() {
        let dir   = tempfile::tempdir().unwrap();
        let shape = tiny_config(dir.path()).sample_shape();
        let mut s = sample(&shape, 0);
        s.sv.push(1.0);
        fs::write(dir.path().join("a.json"), serde_json::to_string(&s).unwrap()).unwrap();

        let err = SampleLoader::new(dir.path()).load(shape).unwrap_err();
        assert!(err.to_string().contains("sv has"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir   = tempfile::tempdir().unwrap();
        let shape = tiny_config(dir.path()).sample_shape();
        assert!(SampleLoader::new(dir.path()).load(shape).is_err());
    }
}
