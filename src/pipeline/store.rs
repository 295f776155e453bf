//! Artifact storage: idempotent, atomic persistence of retrieved documents.
//!
//! ## Why temp file + persist?
//!
//! A certificate interrupted mid-write (Ctrl-C between items, disk full)
//! must not leave a truncated PDF under the final name — the next run would
//! see the name, skip the key, and nobody would notice until the file is
//! opened months later. Writing into a `NamedTempFile` in the same
//! directory and renaming over the final name makes the write all-or-
//! nothing, and the temp file cleans itself up on every early exit path.

use crate::error::{EcFetchError, FetchFailure};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// What `store` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Artifact written by this call.
    Stored(PathBuf),
    /// An artifact with this name already existed; nothing was touched.
    AlreadyExists(PathBuf),
}

/// A directory of write-once artifacts.
///
/// Owned exclusively by the single worker for the duration of a run — no
/// locking, just the skip-if-exists check and the atomic rename.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) the artifact directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EcFetchError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| EcFetchError::StoreDir {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    /// Full path an artifact name maps to.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Whether an artifact with this name already exists.
    pub fn contains(&self, name: &str) -> bool {
        self.path_for(name).exists()
    }

    /// Persist `bytes` under `name`, unless `name` already exists.
    ///
    /// Existing artifacts are never overwritten by this pipeline; callers
    /// treat `AlreadyExists` as success, which is what makes re-running a
    /// batch safe.
    pub fn store(&self, name: &str, bytes: &[u8]) -> Result<StoreOutcome, FetchFailure> {
        let path = self.path_for(name);
        if path.exists() {
            debug!("artifact already present, skipping: {name}");
            return Ok(StoreOutcome::AlreadyExists(path));
        }

        write_atomic(&self.root, &path, bytes).map_err(|e| FetchFailure::Store {
            name: name.to_string(),
            detail: e.to_string(),
        })?;

        info!("stored artifact {name} ({} bytes)", bytes.len());
        Ok(StoreOutcome::Stored(path))
    }
}

fn write_atomic(root: &Path, dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    // Same directory as the destination so the rename cannot cross devices.
    let mut tmp = NamedTempFile::new_in(root)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn store_then_skip() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();

        let first = store.store("29_08_040_384_EC.pdf", b"%PDF-1.4 one").unwrap();
        assert!(matches!(first, StoreOutcome::Stored(_)));
        assert!(store.contains("29_08_040_384_EC.pdf"));

        // Second write with different bytes must not touch the file.
        let second = store.store("29_08_040_384_EC.pdf", b"%PDF-1.4 two").unwrap();
        assert!(matches!(second, StoreOutcome::AlreadyExists(_)));
        let on_disk = std::fs::read(store.path_for("29_08_040_384_EC.pdf")).unwrap();
        assert_eq!(on_disk, b"%PDF-1.4 one");
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        store.store("a_EC.pdf", b"%PDF-1.4").unwrap();
        store.store("b_EC.pdf", b"%PDF-1.4").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "only the two artifacts: {names:?}");
        assert!(names.iter().all(|n| n.ends_with("_EC.pdf")));
    }

    #[test]
    fn open_creates_nested_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("out").join("village");
        let store = ArtifactStore::open(&nested).unwrap();
        assert!(nested.is_dir());
        store.store("x_EC.pdf", b"%PDF").unwrap();
        assert!(nested.join("x_EC.pdf").is_file());
    }

    #[test]
    fn unwritable_root_is_a_store_failure() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        // Drop the directory out from under the store.
        drop(dir);
        let err = store.store("x_EC.pdf", b"%PDF").unwrap_err();
        assert!(matches!(err, FetchFailure::Store { .. }));
    }
}
