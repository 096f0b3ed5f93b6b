//! Local durable key/value storage
//!
//! The audit client owns three keys: the serialized pending queue, the
//! current authenticated user (read-only input), and the session id.
//! `FileStore` keeps one file per key under a directory; `MemoryStore`
//! is for tests and hosts without a writable disk.

use crate::error::{AuditError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Key holding the serialized pending queue
pub const PENDING_QUEUE_KEY: &str = "audit_pending_logs";

/// Key holding the current authenticated user as JSON
pub const CURRENT_USER_KEY: &str = "auth_user";

/// Key holding the session identifier
pub const SESSION_ID_KEY: &str = "session_id";

/// Trait for local durable storage
///
/// Operations are synchronous; callers that need read-modify-write
/// atomicity serialize access themselves.
pub trait DurableStore: Send + Sync {
    /// Read a value, `None` if the key was never written
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value of a key
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(AuditError::Storage(format!("Invalid storage key '{}'", key)))
    }
}

/// File-backed store: one JSON/text file per key
///
/// Atomic writes via temp file + rename to prevent torn blobs.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a new file store rooted at the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuditError::Storage(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension("tmp");

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            AuditError::Storage(format!(
                "Failed to create storage directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        std::fs::write(&tmp_path, value).map_err(|e| {
            AuditError::Storage(format!(
                "Failed to write {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, &path).map_err(|e| {
            AuditError::Storage(format!(
                "Failed to rename {} → {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::trace!(key, bytes = value.len(), "Storage key written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuditError::Storage(format!(
                "Failed to remove {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// In-memory store
///
/// Lost on drop. `fail_writes` simulates a full or read-only disk.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`remove` fail (or succeed again)
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuditError::Storage("storage quota exceeded".to_string()));
        }
        Ok(())
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire storage lock: {}", e)))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_writable()?;
        let mut values = self
            .values
            .write()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire storage lock: {}", e)))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        let mut values = self
            .values
            .write()
            .map_err(|e| AuditError::Storage(format!("Failed to acquire storage lock: {}", e)))?;
        values.remove(key);
        Ok(())
    }
}
