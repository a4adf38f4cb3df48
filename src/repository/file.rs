//! File-based provenance repository
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<id>/record.json     canonical record bytes
//! <root>/<id>/signature.bin   DER signature
//! <root>/LATEST               id of the most recent save
//! ```

use super::traits::{ProvenanceRepository, StoredProvenance};
use crate::error::{HemlockError, HemlockResult};
use crate::evidence::ProvenanceId;
use crate::logger::{LogLevel, LOGGER};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const RECORD_FILE: &str = "record.json";
const SIGNATURE_FILE: &str = "signature.bin";
const LATEST_FILE: &str = "LATEST";

pub struct FileProvenanceRepository {
    root: PathBuf,
}

impl FileProvenanceRepository {
    /// Create a repository rooted at `root`; the directory is created lazily
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, id: &ProvenanceId) -> PathBuf {
        self.entry_dir(id).join(RECORD_FILE)
    }

    pub fn signature_path(&self, id: &ProvenanceId) -> PathBuf {
        self.entry_dir(id).join(SIGNATURE_FILE)
    }

    fn entry_dir(&self, id: &ProvenanceId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_FILE)
    }

    /// Write both files into a private staging directory, then rename it
    /// into place so readers never observe half a pair.
    fn write_entry(&self, id: &ProvenanceId, record_bytes: &[u8], signature: &[u8]) -> HemlockResult<()> {
        let staging = self.root.join(format!(".staging-{}-{}", id, Uuid::new_v4()));
        fs::create_dir_all(&staging)?;

        let result = write_synced(&staging.join(RECORD_FILE), record_bytes)
            .and_then(|_| write_synced(&staging.join(SIGNATURE_FILE), signature))
            .and_then(|_| self.swap_in(&staging, &self.entry_dir(id)));

        if result.is_err() {
            let _ = fs::remove_dir_all(&staging);
        }
        result
    }

    fn swap_in(&self, staging: &Path, target: &Path) -> HemlockResult<()> {
        if target.exists() {
            let trash = self.root.join(format!(".trash-{}", Uuid::new_v4()));
            fs::rename(target, &trash)?;
            fs::rename(staging, target)?;
            fs::remove_dir_all(&trash)?;
        } else {
            fs::rename(staging, target)?;
        }
        Ok(())
    }

    fn write_latest(&self, id: &ProvenanceId) -> HemlockResult<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(id.to_string().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.latest_path())
            .map_err(|e| HemlockError::StorageSaveFailed(format!("LATEST pointer: {}", e.error)))?;
        Ok(())
    }
}

impl ProvenanceRepository for FileProvenanceRepository {
    fn save(&self, id: &ProvenanceId, record_bytes: &[u8], signature: &[u8]) -> HemlockResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            HemlockError::StorageSaveFailed(format!("{}: {}", self.root.display(), e))
        })?;

        self.write_entry(id, record_bytes, signature)
            .map_err(|e| HemlockError::StorageSaveFailed(format!("provenance {}: {}", id, e)))?;
        self.write_latest(id)?;

        LOGGER.log(
            LogLevel::Debug,
            &format!("Stored provenance {} ({} byte record)", id, record_bytes.len()),
            "repository::file",
        );
        Ok(())
    }

    fn load(&self, id: &ProvenanceId) -> HemlockResult<Option<StoredProvenance>> {
        let dir = self.entry_dir(id);
        if !dir.is_dir() {
            return Ok(None);
        }

        let record_bytes = read_part(&dir.join(RECORD_FILE))?;
        let signature = read_part(&dir.join(SIGNATURE_FILE))?;

        match (record_bytes, signature) {
            (Some(record_bytes), Some(signature)) => Ok(Some(StoredProvenance {
                id: *id,
                record_bytes,
                signature,
            })),
            (None, None) => Ok(None),
            _ => Err(HemlockError::StorageLoadFailed(format!(
                "provenance {} is missing its record or signature",
                id
            ))),
        }
    }

    fn latest(&self) -> HemlockResult<Option<ProvenanceId>> {
        match fs::read_to_string(self.latest_path()) {
            Ok(text) => Ok(Some(text.parse()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HemlockError::StorageLoadFailed(format!("LATEST pointer: {}", e))),
        }
    }

    fn delete(&self, id: &ProvenanceId) -> HemlockResult<bool> {
        let dir = self.entry_dir(id);
        if !dir.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir)?;

        if self.latest()? == Some(*id) {
            fs::remove_file(self.latest_path())?;
        }
        Ok(true)
    }

    fn list(&self) -> HemlockResult<Vec<ProvenanceId>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            // Staging and trash directories do not parse as ids
            if let Some(id) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> HemlockResult<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn read_part(path: &Path) -> HemlockResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HemlockError::StorageLoadFailed(format!("{}: {}", path.display(), e))),
    }
}
