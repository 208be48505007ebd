//! Debug captures written to disk.
//!
//! When enabled, every captured region and every full-screen fallback is
//! saved as `<label>-<UTC timestamp>.png` so misreads can be inspected later.
//! Only the newest `max_files` PNGs are kept.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use image::{ImageFormat, RgbImage};

/// Writes PNG captures into a directory.
#[derive(Debug, Clone)]
pub struct DebugCaptures {
    directory: PathBuf,
    max_files: usize,
}

impl DebugCaptures {
    /// Create the directory (and parents) if needed.
    pub async fn create(directory: impl Into<PathBuf>) -> std::io::Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;
        tracing::info!(directory = %directory.display(), "Debug captures enabled");
        Ok(Self {
            directory,
            max_files: 0,
        })
    }

    /// Keep at most `max_files` captures; `0` keeps everything.
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path a capture taken now under `label` is written to.
    pub fn path_for(&self, label: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        self.directory.join(format!("{}-{}.png", label, stamp))
    }

    /// Save `image`; failures are logged, never returned.
    pub async fn save(&self, label: &str, image: &RgbImage) {
        let path = self.path_for(label);
        let image = image.clone();
        let target = path.clone();
        let directory = self.directory.clone();
        let max_files = self.max_files;

        let result = tokio::task::spawn_blocking(move || {
            image.save_with_format(&target, ImageFormat::Png)?;
            let pruned = if max_files > 0 {
                prune(&directory, max_files)
            } else {
                Ok(0)
            };
            Ok::<_, image::ImageError>(pruned)
        })
        .await;

        match result {
            Ok(Ok(pruned)) => {
                tracing::debug!(path = %path.display(), "Saved debug capture");
                match pruned {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Pruned old debug captures"),
                    Err(e) => tracing::warn!(error = %e, "Failed to prune debug captures"),
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to save debug capture")
            }
            Err(e) => tracing::warn!(error = %e, "Debug capture task failed"),
        }
    }
}

/// Delete the oldest PNGs in `directory` beyond `keep`; returns how many.
fn prune(directory: &Path, keep: usize) -> io::Result<usize> {
    let mut captures: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "png") {
            let modified = std::fs::metadata(&path)?.modified()?;
            captures.push((modified, path));
        }
    }

    if captures.len() <= keep {
        return Ok(0);
    }

    // Names embed the UTC stamp, which breaks ties within one mtime tick.
    captures.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| stamp_of(&a.1).cmp(&stamp_of(&b.1)))
    });

    let excess = captures.len() - keep;
    for (_, path) in &captures[..excess] {
        std::fs::remove_file(path)?;
    }
    Ok(excess)
}

/// The timestamp part of `<label>-<stamp>.png`.
fn stamp_of(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit_once('-').map(|(_, stamp)| stamp.to_string())
}
