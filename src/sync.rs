//! Output folder housekeeping and the copy to the reading device.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::capability::SyncTarget;
use crate::error::ArchiveError;

/// A mounted e-reader: documents go to `<root>/<subdir>`.
#[derive(Debug, Clone)]
pub struct DeviceTarget {
    root: PathBuf,
    subdir: String,
}

impl DeviceTarget {
    pub fn new(root: impl Into<PathBuf>, subdir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            subdir: subdir.into(),
        }
    }
}

impl SyncTarget for DeviceTarget {
    fn is_present(&self) -> bool {
        self.root.is_dir()
    }

    fn destination(&self) -> PathBuf {
        self.root.join(&self.subdir)
    }

    fn copy(&self, source_dir: &Path, dest_dir: &Path) -> Result<usize> {
        fs::create_dir_all(dest_dir)
            .with_context(|| format!("failed to create {}", dest_dir.display()))?;
        let mut copied = 0;
        for path in files_in(source_dir)? {
            let Some(name) = path.file_name() else {
                continue;
            };
            let dest = dest_dir.join(name);
            fs::copy(&path, &dest).with_context(|| {
                format!("failed to copy {} to {}", path.display(), dest.display())
            })?;
            debug!("sync: {} -> {}", path.display(), dest.display());
            copied += 1;
        }
        Ok(copied)
    }
}

/// Regular files directly inside `dir`, sorted by name.
fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Create every directory the run writes to.
pub fn ensure_dirs<P: AsRef<Path>>(dirs: &[P]) -> Result<()> {
    for dir in dirs {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// Move what an earlier run left in `output_dir` into `previous_dir`, so only
/// this run's documents get synced. Returns the number of files moved.
pub fn rotate_output(output_dir: &Path, previous_dir: &Path) -> Result<usize> {
    ensure_dirs(&[output_dir, previous_dir])?;
    let files = files_in(output_dir)?;
    for path in &files {
        let Some(name) = path.file_name() else {
            continue;
        };
        let dest = previous_dir.join(name);
        move_file(path, &dest)
            .with_context(|| format!("failed to move {} to {}", path.display(), dest.display()))?;
    }
    if !files.is_empty() {
        info!(
            "sync: moved {} file(s) from {} to {}",
            files.len(),
            output_dir.display(),
            previous_dir.display()
        );
    }
    Ok(files.len())
}

fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // Different filesystems: fall back to copy + remove.
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

/// Copy every document in `output_dir` to `target`.
///
/// An absent target is reported as [`ArchiveError::SyncUnavailable`].
pub fn sync_output<T: SyncTarget>(target: &T, output_dir: &Path) -> Result<usize> {
    let dest = target.destination();
    if !target.is_present() {
        warn!("sync: {} is not mounted", dest.display());
        return Err(ArchiveError::SyncUnavailable { path: dest }.into());
    }
    let copied = target.copy(output_dir, &dest)?;
    info!("sync: copied {copied} file(s) to {}", dest.display());
    Ok(copied)
}
