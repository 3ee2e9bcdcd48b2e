//! Durable type snapshot
//!
//! Persists everything the type database was built from (the raw engine
//! fragments plus the settings that shaped finalization) so the database can
//! be rebuilt at startup without a live engine connection.
//!
//! Safety:
//! - Graceful degradation: any read error or version mismatch is a cold start
//! - Atomic writes: tmp file + fsync, target moved to a backup while the new
//!   file is renamed into place, backup removed afterwards

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::settings::ScriptSettings;

/// Current snapshot schema version
///
/// Increment this on any incompatible change to [`SnapshotFile`] so stale
/// snapshots load as absent.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Location of the snapshot relative to the workspace root
pub const SNAPSHOT_RELATIVE_PATH: &str = ".vscode/angelscript/type-snapshot.json";

/// What a snapshot carries, independent of version and timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub workspace_root: String,
    pub debug_database_chunks: Vec<serde_json::Value>,
    pub script_settings: ScriptSettings,
    pub engine_supports_create_blueprint: bool,
}

/// On-disk document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFile {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: SnapshotPayload,
}

/// Reads and writes the snapshot of one workspace
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn for_workspace(workspace_root: &Path) -> Self {
        Self { path: workspace_root.join(SNAPSHOT_RELATIVE_PATH) }
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, or `None` when it is absent, unreadable or was
    /// written by a different schema version
    pub fn load(&self) -> Option<SnapshotPayload> {
        match self.try_load() {
            Ok(Some(file)) if file.version == SNAPSHOT_VERSION => {
                info!(
                    "Loaded type snapshot from {:?} ({} chunks, created {})",
                    self.path,
                    file.payload.debug_database_chunks.len(),
                    file.created_at.to_rfc3339()
                );
                Some(file.payload)
            }
            Ok(Some(file)) => {
                info!(
                    "Ignoring type snapshot version {} (expected {})",
                    file.version, SNAPSHOT_VERSION
                );
                None
            }
            Ok(None) => {
                debug!("No type snapshot at {:?}", self.path);
                None
            }
            Err(e) => {
                warn!("Failed to read type snapshot, starting cold: {:#}", e);
                None
            }
        }
    }

    fn try_load(&self) -> Result<Option<SnapshotFile>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)
            .with_context(|| format!("Failed to read snapshot {:?}", self.path))?;
        let file = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse snapshot {:?}", self.path))?;
        Ok(Some(file))
    }

    /// Writes `payload` stamped with the current version and time
    pub fn save(&self, payload: &SnapshotPayload) -> Result<()> {
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            payload: payload.clone(),
        };
        let data = serde_json::to_vec(&file).context("Failed to serialize snapshot")?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create snapshot directory {:?}", parent))?;
        }

        let temp_path = with_suffix(&self.path, "tmp");
        let backup_path = with_suffix(&self.path, "bak");

        {
            let mut temp = fs::File::create(&temp_path)
                .with_context(|| format!("Failed to create {:?}", temp_path))?;
            temp.write_all(&data)
                .with_context(|| format!("Failed to write {:?}", temp_path))?;
            temp.sync_all()
                .with_context(|| format!("Failed to sync {:?}", temp_path))?;
        }

        let had_target = self.path.exists();
        if had_target {
            fs::rename(&self.path, &backup_path)
                .with_context(|| format!("Failed to back up {:?}", self.path))?;
        }
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            if had_target {
                if let Err(restore) = fs::rename(&backup_path, &self.path) {
                    warn!("Failed to restore snapshot backup {:?}: {}", backup_path, restore);
                }
            }
            return Err(e).with_context(|| format!("Failed to replace {:?}", self.path));
        }
        if had_target {
            if let Err(e) = fs::remove_file(&backup_path) {
                debug!("Failed to remove snapshot backup {:?}: {}", backup_path, e);
            }
        }

        info!(
            "Saved type snapshot to {:?} ({} chunks)",
            self.path,
            payload.debug_database_chunks.len()
        );
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
