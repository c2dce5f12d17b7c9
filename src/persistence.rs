//! Persistence Layer
//!
//! Byte-level key→record store: one file per key under the cache directory,
//! file name = percent-escaped canonical key, contents = codec envelope.
//! Writes go through a tmp file and rename into place so a torn write is
//! detectable and reads treat it as absence.
//!
//! Cache-path operations are best-effort: a failed save degrades the record
//! to memory-only, a failed read is a miss, a failed evict is ignored.
//! Migrations use the fallible `try_*` variants because their failures must
//! abort startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, warn};

use crate::codec::RecordCodec;
use crate::error::Result;
use crate::key;
use crate::record::Record;

/// Sidecar file holding the schema-version marker.
///
/// Contains a `.`, which [`key::file_name_for`] always escapes, so the name
/// can never collide with a key file.
const VERSION_MARKER_FILE: &str = "version.marker";

const TMP_SUFFIX: &str = ".tmp";

/// File-per-key disk store
pub struct DiskStore {
    directory: PathBuf,
    codec: Arc<dyn RecordCodec>,
}

impl DiskStore {
    /// Open (and create if missing) the store rooted at `directory`.
    pub async fn open(directory: impl Into<PathBuf>, codec: Arc<dyn RecordCodec>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).await?;
        Ok(Self { directory, codec })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, canonical: &str) -> PathBuf {
        self.directory.join(key::file_name_for(canonical))
    }

    fn tmp_path_for(&self, canonical: &str) -> PathBuf {
        self.directory
            .join(format!("{}{}", key::file_name_for(canonical), TMP_SUFFIX))
    }

    /// Best-effort save. I/O failures leave the record memory-only.
    pub async fn save(&self, canonical: &str, record: &Record) {
        if let Err(e) = self.try_save(canonical, record).await {
            warn!(key = canonical, error = %e, "disk save failed, record is memory-only");
        }
    }

    /// Fallible save: encode, write to a tmp file, rename into place.
    pub async fn try_save(&self, canonical: &str, record: &Record) -> Result<()> {
        let bytes = self.codec.encode(record)?;
        let tmp = self.tmp_path_for(canonical);
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, self.path_for(canonical)).await?;
        Ok(())
    }

    /// Read a record back, or nothing if missing, torn, or unreadable.
    pub async fn retrieve_record(&self, canonical: &str) -> Option<Record> {
        let bytes = fs::read(self.path_for(canonical)).await.ok()?;
        match self.codec.decode(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key = canonical, error = %e, "undecodable record treated as absent");
                None
            }
        }
    }

    /// Idempotent delete; errors ignored.
    pub async fn evict(&self, canonical: &str) {
        if let Err(e) = self.try_evict(canonical).await {
            debug!(key = canonical, error = %e, "disk evict failed");
        }
    }

    /// Fallible delete. Deleting an absent key is not an error.
    pub async fn try_evict(&self, canonical: &str) -> Result<()> {
        match fs::remove_file(self.path_for(canonical)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every record file. The schema-version marker survives.
    pub async fn evict_all(&self) {
        for canonical in self.all_keys().await {
            self.evict(&canonical).await;
        }
    }

    /// Snapshot of the stored canonical keys.
    ///
    /// Skips tmp files, the version marker, and anything else the file-name
    /// codec does not recognize. May be stale w.r.t. concurrent writes.
    pub async fn all_keys(&self) -> Vec<String> {
        self.entry_sizes()
            .await
            .into_iter()
            .map(|(canonical, _)| canonical)
            .collect()
    }

    /// Stored canonical keys with their file sizes in bytes.
    pub async fn entry_sizes(&self) -> Vec<(String, u64)> {
        let mut entries = Vec::new();
        let Ok(mut dir) = fs::read_dir(&self.directory).await else {
            return entries;
        };

        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else { continue };
                    let Some(canonical) = key::canonical_from_file_name(name) else {
                        continue;
                    };
                    let size = match entry.metadata().await {
                        Ok(meta) => meta.len(),
                        Err(_) => continue,
                    };
                    entries.push((canonical, size));
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }

        entries
    }

    /// Best-effort estimate of disk bytes in use, in megabytes.
    pub async fn stored_mb(&self) -> f64 {
        self.stored_bytes().await as f64 / (1024.0 * 1024.0)
    }

    /// Sum of record file lengths in bytes.
    pub async fn stored_bytes(&self) -> u64 {
        self.entry_sizes().await.iter().map(|(_, size)| size).sum()
    }

    // =========================================================================
    // Schema-version marker
    // =========================================================================

    /// Current schema version, 0 when no marker has been written yet.
    pub async fn schema_version(&self) -> u32 {
        let path = self.directory.join(VERSION_MARKER_FILE);
        match fs::read_to_string(&path).await {
            Ok(contents) => contents.trim().parse().unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Persist the schema-version marker.
    pub async fn set_schema_version(&self, version: u32) -> Result<()> {
        let path = self.directory.join(VERSION_MARKER_FILE);
        let tmp = self.directory.join(format!("{VERSION_MARKER_FILE}{TMP_SUFFIX}"));
        fs::write(&tmp, version.to_string()).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

impl std::fmt::Debug for DiskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStore")
            .field("directory", &self.directory)
            .field("codec", &self.codec.name())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
