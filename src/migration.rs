//! Schema Migrations
//!
//! An ordered list of `(version, action)` steps applied once at startup,
//! before the sweep and before any request may complete. The persisted
//! schema-version marker records how far previous runs got; only steps with
//! a higher version run, in ascending order, and the marker advances after
//! the last one.
//!
//! Unlike the cache path, migration I/O is NOT best-effort: any failing step
//! aborts with [`Error::MigrationFailed`] and the startup gate latches the
//! failure for every subsequent request.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::persistence::DiskStore;

/// What a migration step does to the stored records
#[derive(Debug, Clone)]
pub enum MigrationAction {
    /// Delete every record whose type tag matches one of the named tags
    DeleteMatchingTypeTag(Vec<String>),
    /// Rewrite records carrying one type tag under another
    RenameTypeTag { from: String, to: String },
}

/// A single versioned migration step
#[derive(Debug, Clone)]
pub struct Migration {
    version: u32,
    action: MigrationAction,
}

impl Migration {
    pub fn new(version: u32, action: MigrationAction) -> Self {
        Self { version, action }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn action(&self) -> &MigrationAction {
        &self.action
    }
}

/// Summary of a completed migration run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    /// Marker value before the run
    pub from_version: u32,
    /// Marker value after the run
    pub to_version: u32,
    /// Steps applied
    pub applied_steps: u32,
    /// Records deleted by delete actions
    pub deleted_records: u64,
    /// Records rewritten by rename actions
    pub rewritten_records: u64,
}

/// Applies pending schema migrations against the persistence layer
pub struct MigrationRunner {
    disk: Arc<DiskStore>,
    migrations: Vec<Migration>,
}

impl MigrationRunner {
    pub fn new(disk: Arc<DiskStore>, migrations: Vec<Migration>) -> Self {
        Self { disk, migrations }
    }

    /// Apply all steps newer than the persisted marker, then advance it.
    pub async fn run(&self) -> Result<MigrationReport> {
        let from_version = self.disk.schema_version().await;

        let mut pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| m.version > from_version)
            .collect();
        pending.sort_by_key(|m| m.version);

        let mut report = MigrationReport {
            from_version,
            to_version: from_version,
            ..Default::default()
        };

        if pending.is_empty() {
            debug!(version = from_version, "schema is current, no migrations to run");
            return Ok(report);
        }

        for migration in &pending {
            let (deleted, rewritten) =
                self.apply(migration)
                    .await
                    .map_err(|e| Error::MigrationFailed {
                        version: migration.version,
                        cause: e.to_string(),
                    })?;
            report.applied_steps += 1;
            report.deleted_records += deleted;
            report.rewritten_records += rewritten;
        }

        let to_version = pending.last().map(|m| m.version).unwrap_or(from_version);
        self.disk
            .set_schema_version(to_version)
            .await
            .map_err(|e| Error::MigrationFailed {
                version: to_version,
                cause: e.to_string(),
            })?;
        report.to_version = to_version;

        info!(
            from_version,
            to_version,
            steps = report.applied_steps,
            deleted = report.deleted_records,
            rewritten = report.rewritten_records,
            "schema migrations complete"
        );

        Ok(report)
    }

    /// Apply one step. Returns `(deleted, rewritten)` counts.
    async fn apply(&self, migration: &Migration) -> Result<(u64, u64)> {
        match &migration.action {
            MigrationAction::DeleteMatchingTypeTag(tags) => {
                if tags.is_empty() {
                    return Ok((0, 0));
                }

                let mut deleted = 0u64;
                for canonical in self.disk.all_keys().await {
                    // An unreadable record is indistinguishable from absence
                    let Some(record) = self.disk.retrieve_record(&canonical).await else {
                        continue;
                    };
                    if tags.iter().any(|tag| tag == record.type_tag()) {
                        self.disk.try_evict(&canonical).await?;
                        deleted += 1;
                    }
                }
                Ok((deleted, 0))
            }

            MigrationAction::RenameTypeTag { from, to } => {
                let mut rewritten = 0u64;
                for canonical in self.disk.all_keys().await {
                    let Some(mut record) = self.disk.retrieve_record(&canonical).await else {
                        continue;
                    };
                    if record.type_tag() == from {
                        record.set_type_tag(to.clone());
                        self.disk.try_save(&canonical, &record).await?;
                        rewritten += 1;
                    }
                }
                Ok((0, rewritten))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
