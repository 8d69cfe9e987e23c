//! Artifact store that only tracks names. Shared by the unit and integration
//! test fakes.

use std::collections::HashSet;
use std::path::PathBuf;

use super::{ArtifactRef, ArtifactStore, Result};

#[derive(Default)]
pub struct MemoryStore {
    pub created: usize,
    pub live: HashSet<PathBuf>,
}

impl ArtifactStore for MemoryStore {
    fn put(&mut self, _png: &[u8]) -> Result<ArtifactRef> {
        self.created += 1;
        let path = PathBuf::from(format!("mem-{}.png", self.created));
        self.live.insert(path.clone());
        Ok(ArtifactRef { path })
    }

    fn delete(&mut self, artifact: &ArtifactRef) -> Result<()> {
        self.live.remove(&artifact.path);
        Ok(())
    }
}
