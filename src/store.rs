use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle on the storage root shared by fetch, query and cleanup.
///
/// Parses hold the read side; cleanup and the final rename of a download hold
/// the write side, so a directory is never removed under an active parse.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Arc::new(RwLock::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write()
    }
}
