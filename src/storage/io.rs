use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use base64::Engine;
use flate2::{write::GzEncoder, Compression};

use super::paths::with_suffix;
use crate::error::{CredResult, CredentialError};
use crate::tprintln;

/// What `atomic_write` did to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    /// Same bytes were already there; nothing touched.
    Unchanged,
    /// Content swapped in by rename. `backup_kept` is false when the `.old` copy failed.
    Replaced { backup_kept: bool },
}

/// gzip then base64. The gzip header carries no timestamp, so equal input gives equal output.
pub fn compress_credential(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    let gz = encoder.finish()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(gz).into_bytes())
}

/// Create `path` owner read/write only, truncating anything already there.
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut f = opts.open(path)?;
    f.write_all(content)?;
    f.sync_all()
}

/// Replace the content of `path` so that readers see either the old or the new bytes, never a
/// mix. Identical content is a no-op. Not synchronized against a second writer to the same path.
pub fn atomic_write(path: &Path, content: &[u8]) -> CredResult<WriteOutcome> {
    let existing = match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(CredentialError::io(path, e)),
    };

    let Some(existing) = existing else {
        write_private(path, content).map_err(|e| CredentialError::io(path, e))?;
        return Ok(WriteOutcome::Created);
    };
    if existing == content {
        return Ok(WriteOutcome::Unchanged);
    }

    let old = with_suffix(path, ".old");
    let new = with_suffix(path, ".new");
    let _ = fs::remove_file(&old);
    // a leftover .new from a crash may carry other permissions; start fresh
    let _ = fs::remove_file(&new);
    write_private(&new, content).map_err(|e| CredentialError::io(&new, e))?;

    let backup_kept = match fs::copy(path, &old) {
        Ok(_) => true,
        Err(e) => {
            tprintln!("backup copy {} -> {} failed: {}", path.display(), old.display(), e);
            false
        }
    };

    if let Err(e) = fs::rename(&new, path) {
        let _ = fs::remove_file(&new);
        return Err(CredentialError::io(path, e));
    }
    Ok(WriteOutcome::Replaced { backup_kept })
}
