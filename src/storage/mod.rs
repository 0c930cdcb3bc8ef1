//!
//! credential storage module
//! -------------------------
//! Persists the credential material of authenticated requests under each user's credential
//! directory. For every (client, credential id) two files are kept side by side:
//!
//! - `credential_<client>_<escaped id>`: the raw decrypted bytes, owner read/write only.
//! - `credential_<client>_<escaped id>_compressed`: one line `glidein_credentials=<base64(gzip)>`,
//!   the key=value form cloud glideins consume.
//!
//! Updates go through `atomic_write`: unchanged content is left alone, changed content is staged
//! in `.new`, the previous version is copied to `.old` when possible, and `.new` is renamed over
//! the target. Readers never need a lock. Writers to the same target are serialized by the
//! store's per-path lock table.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{CredResult, CredentialError};

mod paths;
mod io;

pub use io::{atomic_write, compress_credential, WriteOutcome};
pub use paths::{escape_param, is_str_safe};

pub const COMPRESSED_PREFIX: &[u8] = b"glidein_credentials=";

/// Maps a local username to the directory holding that user's credentials.
pub trait UserDirectoryResolver: Send + Sync {
    fn credential_dir(&self, username: &str) -> PathBuf;
}

/// Paths of one persisted credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFiles {
    pub raw: PathBuf,
    pub compressed: PathBuf,
}

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    replaced: AtomicU64,
    unchanged: AtomicU64,
    backup_failures: AtomicU64,
}

/// Snapshot of the store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub created: u64,
    pub replaced: u64,
    pub unchanged: u64,
    /// `.old` copies that could not be made; repeated failures mean no rollback copy exists.
    pub backup_failures: u64,
}

/// Thread-safe credential writer. Clones share counters and the lock table.
#[derive(Clone)]
pub struct CredentialStore {
    resolver: Arc<dyn UserDirectoryResolver>,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
    counters: Arc<Counters>,
}

impl CredentialStore {
    pub fn new(resolver: Arc<dyn UserDirectoryResolver>) -> Self {
        Self { resolver, locks: Arc::new(Mutex::new(HashMap::new())), counters: Arc::new(Counters::default()) }
    }

    pub fn credential_dir(&self, username: &str) -> PathBuf { self.resolver.credential_dir(username) }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            created: self.counters.created.load(Ordering::Relaxed),
            replaced: self.counters.replaced.load(Ordering::Relaxed),
            unchanged: self.counters.unchanged.load(Ordering::Relaxed),
            backup_failures: self.counters.backup_failures.load(Ordering::Relaxed),
        }
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks.lock().entry(path.to_path_buf()).or_default().clone()
    }

    /// Drop the table entry for `path` unless another writer still holds or waits on it.
    /// Clones are only handed out under the table lock, so the count cannot grow meanwhile.
    fn release_path_lock(&self, path: &Path, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
    }

    /// `atomic_write` under the per-path lock, with bookkeeping.
    pub fn write_file(&self, path: &Path, content: &[u8]) -> CredResult<WriteOutcome> {
        let lock = self.path_lock(path);
        let written = {
            let _guard = lock.lock();
            atomic_write(path, content)
        };
        self.release_path_lock(path, lock);
        let outcome = written?;
        match outcome {
            WriteOutcome::Created => { self.counters.created.fetch_add(1, Ordering::Relaxed); }
            WriteOutcome::Unchanged => { self.counters.unchanged.fetch_add(1, Ordering::Relaxed); }
            WriteOutcome::Replaced { backup_kept } => {
                self.counters.replaced.fetch_add(1, Ordering::Relaxed);
                if !backup_kept {
                    let n = self.counters.backup_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(target: "glidecred::store", "could not keep a backup copy of {} (backup failures so far: {})", path.display(), n);
                }
            }
        }
        Ok(outcome)
    }

    /// Write the raw and compressed credential files for `username`.
    pub fn persist_credential(&self, username: &str, cred_id: &str, data: &[u8], client_name: &str) -> CredResult<PersistedFiles> {
        if !is_str_safe(client_name) {
            return Err(CredentialError::malformed(format!("client name '{}' cannot be used in a file name", client_name)));
        }
        let dir = self.credential_dir(username);
        let raw = paths::credential_file(&dir, client_name, cred_id);
        let compressed = paths::compressed_sibling(&raw);
        debug!(target: "glidecred::store", "updating credential file {}", raw.display());

        self.write_file(&raw, data)?;
        let encoded = compress_credential(data).map_err(|e| CredentialError::io(&compressed, e))?;
        let mut line = Vec::with_capacity(COMPRESSED_PREFIX.len() + encoded.len());
        line.extend_from_slice(COMPRESSED_PREFIX);
        line.extend_from_slice(&encoded);
        self.write_file(&compressed, &line)?;
        Ok(PersistedFiles { raw, compressed })
    }
}
