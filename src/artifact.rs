use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::capability::{ArtifactRef, ArtifactStore};

const ARTIFACT_PREFIX: &str = "capture-";
const ARTIFACT_EXT: &str = "png";

/// Captures stored as PNG files in a scratch directory.
///
/// Names come from a monotonic counter, so two captures within the same
/// millisecond never collide. The directory is single-writer.
pub struct FsArtifactStore {
    dir: PathBuf,
    next_id: u64,
}

impl FsArtifactStore {
    /// Open (and create) the scratch directory, removing captures a previous
    /// run left behind.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create scratch dir {}", dir.display()))?;
        let purged = purge_leftovers(&dir)?;
        if purged > 0 {
            info!(
                "artifact: purged {purged} stale capture(s) from {}",
                dir.display()
            );
        }
        Ok(Self { dir, next_id: 1 })
    }
}

fn is_capture_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.starts_with(ARTIFACT_PREFIX) && path.extension().is_some_and(|e| e == ARTIFACT_EXT)
}

fn purge_leftovers(dir: &Path) -> Result<usize> {
    let mut purged = 0;
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_capture_file(&path) {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            purged += 1;
        }
    }
    Ok(purged)
}

impl ArtifactStore for FsArtifactStore {
    fn put(&mut self, png: &[u8]) -> Result<ArtifactRef> {
        let path = self
            .dir
            .join(format!("{ARTIFACT_PREFIX}{:06}.{ARTIFACT_EXT}", self.next_id));
        self.next_id += 1;
        fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(ArtifactRef { path })
    }

    fn delete(&mut self, artifact: &ArtifactRef) -> Result<()> {
        match fs::remove_file(&artifact.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", artifact.path.display())),
        }
    }
}

/// Every capture taken for one article.
///
/// Dropping the session deletes all recorded artifacts, so cleanup happens on
/// success, on assembly failure and on cancellation alike.
pub struct CaptureSession<'s, S: ArtifactStore> {
    store: &'s mut S,
    artifacts: Vec<ArtifactRef>,
}

impl<'s, S: ArtifactStore> CaptureSession<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self {
            store,
            artifacts: Vec::new(),
        }
    }

    /// Store one capture and take ownership of it.
    pub fn record(&mut self, png: &[u8]) -> Result<ArtifactRef> {
        let artifact = self.store.put(png)?;
        self.artifacts.push(artifact.clone());
        Ok(artifact)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl<S: ArtifactStore> Drop for CaptureSession<'_, S> {
    fn drop(&mut self) {
        let count = self.artifacts.len();
        for artifact in self.artifacts.drain(..) {
            if let Err(e) = self.store.delete(&artifact) {
                warn!("artifact: cleanup failed: {e:#}");
            }
        }
        debug!("artifact: released {count} capture(s)");
    }
}
