//! File backups, fingerprints and atomic writes
//!
//! Backups live under `<output_dir>/backups/<batch_id>/`, mirroring the
//! relative path of the file they protect. Every write that replaces a file
//! goes through [`atomic_write`], so a reader never observes a half-written
//! file.

use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lowercase hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of a file's current content
pub fn file_sha256(path: &Path) -> io::Result<String> {
    Ok(sha256_hex(&std::fs::read(path)?))
}

/// Write `bytes` to `path` through a temp file in the same directory
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Backup directory for one surgery batch
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(output_dir: &Path, batch_id: &str) -> Self {
        Self {
            dir: output_dir.join("backups").join(batch_id),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `original` into the store under `key` and return the backup path
    pub fn backup(&self, original: &Path, key: &Path) -> io::Result<PathBuf> {
        let target = self.dir.join(key);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(original, &target)?;
        debug!("Backed up {} to {}", original.display(), target.display());
        Ok(target)
    }
}
