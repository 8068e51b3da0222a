//! Artifact references and storage
//!
//! The engine never holds captured image data itself; adapters hand frames to
//! an [`ArtifactStore`] and everything downstream carries opaque
//! [`ArtifactRef`] keys, resolvable by whatever store the caller wired in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Opaque reference to a stored capture artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    id: Uuid,
    label: String,
}

impl ArtifactRef {
    /// Create a fresh reference with a human-readable label
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.label, self.id)
    }
}

/// Error types for artifact storage
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no platform data directory available")]
    NoDataDir,
}

/// Sink for captured frames, external to the engine core
///
/// Implementations own durability and retrieval; the engine only needs the
/// returned reference.
pub trait ArtifactStore: Send + Sync {
    /// Persist one captured frame and return its reference
    fn store(&self, bytes: &[u8], label: &str) -> Result<ArtifactRef, ArtifactError>;
}

/// Filesystem store spooling JPEG frames under a root directory
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at the given directory, creating it if needed
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Create a store under the platform data directory
    pub fn in_data_dir() -> Result<Self, ArtifactError> {
        let base = dirs::data_dir().ok_or(ArtifactError::NoDataDir)?;
        Self::new(base.join("flowscribe").join("artifacts"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for FsArtifactStore {
    fn store(&self, bytes: &[u8], label: &str) -> Result<ArtifactRef, ArtifactError> {
        let artifact = ArtifactRef::new(label);
        let path = self.root.join(format!("{}.jpg", artifact.id()));
        std::fs::write(path, bytes)?;
        Ok(artifact)
    }
}

/// In-memory store used by tests and scripted captures
#[derive(Default)]
pub struct MemoryArtifactStore {
    frames: Mutex<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames held
    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve a stored frame by reference
    pub fn get(&self, artifact: &ArtifactRef) -> Option<Vec<u8>> {
        self.frames.lock().unwrap().get(&artifact.id()).cloned()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn store(&self, bytes: &[u8], label: &str) -> Result<ArtifactRef, ArtifactError> {
        let artifact = ArtifactRef::new(label);
        self.frames
            .lock()
            .unwrap()
            .insert(artifact.id(), bytes.to_vec());
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_are_unique() {
        let a = ArtifactRef::new("frame");
        let b = ArtifactRef::new("frame");
        assert_ne!(a, b);
        assert_eq!(a.label(), b.label());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryArtifactStore::new();
        let artifact = store.store(b"jpeg-bytes", "projects-list").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&artifact).unwrap(), b"jpeg-bytes");
        assert_eq!(artifact.label(), "projects-list");
    }

    #[test]
    fn test_fs_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("artifacts")).unwrap();

        let artifact = store.store(b"frame", "settings").unwrap();

        let path = store.root().join(format!("{}.jpg", artifact.id()));
        assert_eq!(std::fs::read(path).unwrap(), b"frame");
    }

    #[test]
    fn test_display_includes_label() {
        let artifact = ArtifactRef::new("create-modal");
        assert!(artifact.to_string().starts_with("create-modal#"));
    }
}
