//! Ingestion checkpoint (§4.8 phases 2 and 6).
//!
//! An opaque serialized set of image ids at `<root>/.ingest_checkpoint`,
//! persisted atomically by writing to a temp file and renaming over the
//! real one — a crash mid-write never leaves a torn checkpoint.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Save a checkpoint at least this often (§4.8 phase 6).
pub const CHECKPOINT_INTERVAL: usize = 100;

pub struct Checkpoint {
    path: PathBuf,
    ids: HashSet<String>,
}

impl Checkpoint {
    pub fn checkpoint_path(root: &Path) -> PathBuf {
        root.join(".ingest_checkpoint")
    }

    /// Load the checkpoint set at `<root>/.ingest_checkpoint`, or an empty
    /// one if no checkpoint file exists yet.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::checkpoint_path(root);
        let ids = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashSet::new()
        };
        Ok(Self { path, ids })
    }

    pub fn contains(&self, image_id: &str) -> bool {
        self.ids.contains(image_id)
    }

    pub fn insert(&mut self, image_id: impl Into<String>) {
        self.ids.insert(image_id.into());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &HashSet<String> {
        &self.ids
    }

    /// Write-temp-then-rename: persist the current set atomically.
    pub fn persist(&self) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, serde_json::to_vec(&self.ids)?)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_after_batch_is_a_superset_of_the_previous_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = Checkpoint::load(dir.path()).unwrap();
        checkpoint.insert("img_a");
        checkpoint.insert("img_b");
        checkpoint.persist().unwrap();
        let after_batch_one: HashSet<String> = checkpoint.ids().clone();

        checkpoint.insert("img_c");
        checkpoint.persist().unwrap();
        let after_batch_two = checkpoint.ids();

        assert!(after_batch_one.is_subset(after_batch_two));
    }

    #[test]
    fn reloading_returns_the_persisted_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut checkpoint = Checkpoint::load(dir.path()).unwrap();
        checkpoint.insert("img_a");
        checkpoint.insert("img_b");
        checkpoint.persist().unwrap();

        let reloaded = Checkpoint::load(dir.path()).unwrap();
        assert!(reloaded.contains("img_a"));
        assert!(reloaded.contains("img_b"));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn missing_checkpoint_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::load(dir.path()).unwrap();
        assert!(checkpoint.is_empty());
    }
}
