// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Seams between the evaluator and its collaborators. The
// evaluator only sees these traits, so tests can swap in
// fixed distances and fake path layouts.

use std::path::{Path, PathBuf};

use crate::domain::error::EvalError;

// ─── OriginalResolver ─────────────────────────────────────────────────────────
/// Maps a cover's id (its file stem) to where the original recording
/// is expected to live. The path may not exist.
pub trait OriginalResolver {
    fn resolve(&self, cover_id: &str) -> PathBuf;
}

/// Originals stored flat in one directory as `<id>.wav`.
pub struct DirectoryResolver {
    dir: PathBuf,
}

impl DirectoryResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl OriginalResolver for DirectoryResolver {
    fn resolve(&self, cover_id: &str) -> PathBuf {
        self.dir.join(format!("{cover_id}.wav"))
    }
}

// ─── CoverDistance ────────────────────────────────────────────────────────────
/// Scalar dissimilarity between an original and a cover.
/// Lower means more similar.
pub trait CoverDistance {
    fn distance(&self, original: &Path, cover: &Path) -> Result<f64, EvalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_resolver_appends_wav() {
        let r = DirectoryResolver::new("data/original");
        assert_eq!(r.resolve("song_01"), PathBuf::from("data/original/song_01.wav"));
    }
}
