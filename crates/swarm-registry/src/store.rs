//! File-backed storage for the registry document: advisory cross-process
//! locking via `flock(2)`, atomic writes via write-to-tmp + rename.
//!
//! Grounded on the detached-process-registry retrieved example's use of
//! OS-level primitives for cross-process coordination, generalized here
//! from in-memory `DashMap` locking to a file lock since this registry
//! is a single JSON file shared by independent `swarm` invocations, not
//! a `DashMap` living in one process.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use swarm_core::error::{Error, Result};

use crate::document::RegistryDocument;

pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with an exclusive lock held on the registry file for the
    /// duration: read the current document, hand it to `f`, persist
    /// whatever state `f` leaves it in. This is the only sanctioned way
    /// to read-modify-write the registry — it makes check-then-act
    /// sequences (like "is this name free?") atomic across independent
    /// OS processes, not merely within one.
    pub fn with_locked<T>(&self, f: impl FnOnce(&mut RegistryDocument) -> Result<T>) -> Result<T> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.lock_path())?;
        flock_exclusive(&lock_file)?;

        let result = (|| {
            let mut doc = self.read_unlocked()?;
            let out = f(&mut doc)?;
            self.write_unlocked(&doc)?;
            Ok(out)
        })();

        flock_unlock(&lock_file);
        result
    }

    /// Read without acquiring the lock. Safe for callers that only need
    /// an eventually-consistent snapshot (list/inspect/status commands)
    /// and would rather not contend with a long-running writer.
    pub fn read_snapshot(&self) -> Result<RegistryDocument> {
        self.read_unlocked()
    }

    fn read_unlocked(&self) -> Result<RegistryDocument> {
        if !self.path.exists() {
            return Ok(RegistryDocument::default());
        }
        let mut raw = String::new();
        File::open(&self.path)?.read_to_string(&mut raw)?;
        if raw.trim().is_empty() {
            return Ok(RegistryDocument::default());
        }
        serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "registry file failed to parse");
            Error::Corrupt(format!("{}: {e}", self.path.display()))
        })
    }

    fn write_unlocked(&self, doc: &RegistryDocument) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            let raw = serde_json::to_string_pretty(doc)?;
            tmp.write_all(raw.as_bytes())?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }
}

fn flock_exclusive(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        tracing::warn!(error = %err, "failed to acquire registry lock");
        return Err(Error::Internal(format!("flock failed: {err}")));
    }
    Ok(())
}

fn flock_unlock(file: &File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("registry.json"));
        let doc = store.read_snapshot().unwrap();
        assert!(doc.agents.is_empty());
    }

    #[test]
    fn with_locked_persists_mutations_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("registry.json"));

        store
            .with_locked(|doc| {
                doc.agents.insert(
                    "abc".into(),
                    swarm_core::record::AgentRecord::new(
                        dir.path().to_path_buf(),
                        swarm_core::record::PromptLabel::Inline,
                        "sonnet",
                    ),
                );
                Ok(())
            })
            .unwrap();

        let doc = store.read_snapshot().unwrap();
        assert_eq!(doc.agents.len(), 1);
        assert!(doc.agents.contains_key("abc"));
        assert!(!dir.path().join("registry.json.tmp").exists());
    }

    #[test]
    fn corrupt_file_surfaces_as_corrupt_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = Store::new(path);
        assert!(matches!(store.read_snapshot(), Err(Error::Corrupt(_))));
    }
}
