//! Warm restart support for syncd
//!
//! On a warm shutdown the identity table is written to a state file next to
//! the SDK's own warm-boot image. The next warm start loads it and checks
//! every entry against the SDK before accepting requests, so a handle the
//! client held before the restart resolves to the same native object after
//! it.
//!
//! There is no fallback: a missing file or an entry the SDK does not
//! recognise fails switch initialization.

use crate::error::{Result, SyncdError};
use crate::identity::{IdentityTable, TableSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sonic_sai::{ObjectType, RawSaiObjectId, VendorSai};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const STATE_VERSION: u32 = 1;

/// Persisted identity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedTable {
    /// Format version
    pub version: u32,
    /// When the state was written
    pub saved_at: DateTime<Utc>,
    /// Native id of the switch at shutdown
    pub switch_native: RawSaiObjectId,
    pub table: TableSnapshot,
}

/// Reads and writes the identity table state file.
#[derive(Debug, Clone)]
pub struct WarmRestartStore {
    state_file_path: PathBuf,
}

impl WarmRestartStore {
    pub fn new(state_file_path: impl Into<PathBuf>) -> Self {
        Self {
            state_file_path: state_file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.state_file_path
    }

    pub fn exists(&self) -> bool {
        self.state_file_path.exists()
    }

    /// Writes the table snapshot.
    pub fn save(&self, switch_native: RawSaiObjectId, table: TableSnapshot) -> Result<()> {
        if let Some(parent) = self.state_file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SyncdError::WarmRestart(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let state = PersistedTable {
            version: STATE_VERSION,
            saved_at: Utc::now(),
            switch_native,
            table,
        };
        let json = serde_json::to_string_pretty(&state).map_err(|e| {
            SyncdError::WarmRestart(format!("Failed to serialize identity table: {}", e))
        })?;
        fs::write(&self.state_file_path, json).map_err(|e| {
            SyncdError::WarmRestart(format!(
                "Failed to write state file {}: {}",
                self.state_file_path.display(),
                e
            ))
        })?;

        info!(
            path = %self.state_file_path.display(),
            entries = state.table.entries.len(),
            "identity table saved for warm restart"
        );
        Ok(())
    }

    /// Loads the table snapshot written by the previous run.
    pub fn load(&self) -> Result<PersistedTable> {
        let json = fs::read_to_string(&self.state_file_path).map_err(|e| {
            SyncdError::WarmRestart(format!(
                "Failed to read state file {}: {}",
                self.state_file_path.display(),
                e
            ))
        })?;
        let state: PersistedTable = serde_json::from_str(&json).map_err(|e| {
            SyncdError::WarmRestart(format!(
                "Corrupt state file {}: {}",
                self.state_file_path.display(),
                e
            ))
        })?;
        if state.version != STATE_VERSION {
            return Err(SyncdError::WarmRestart(format!(
                "Unsupported state file version {}",
                state.version
            )));
        }
        Ok(state)
    }

    /// Deletes the state file once it has been consumed.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.state_file_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncdError::Io(e)),
        }
    }
}

/// Outcome of reconciling a persisted table against the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub restored: usize,
}

/// Restores `persisted` into `table` after checking every entry against the SDK.
///
/// `switch_native` is the id the SDK returned for the re-created switch; it
/// must match the switch recorded at shutdown.
pub fn reconcile(
    table: &IdentityTable,
    sdk: &dyn VendorSai,
    persisted: &PersistedTable,
    switch_native: RawSaiObjectId,
) -> Result<ReconcileReport> {
    if persisted.switch_native != switch_native {
        return Err(SyncdError::WarmRestart(format!(
            "switch came back as 0x{:016x}, expected 0x{:016x}",
            switch_native, persisted.switch_native
        )));
    }

    for entry in &persisted.table.entries {
        let actual = sdk.object_type_query(entry.native);
        if actual != entry.object_type {
            warn!(
                handle = %entry.handle,
                expected = %entry.object_type,
                actual = %actual,
                "warm restart entry does not match SDK state"
            );
            return Err(SyncdError::WarmRestart(format!(
                "{} was {} before restart, SDK reports {}",
                entry.handle, entry.object_type, actual
            )));
        }
    }

    table.restore(&persisted.table)?;
    Ok(ReconcileReport {
        restored: persisted.table.entries.len(),
    })
}

/// Looks up the switch handle in a persisted table.
pub fn switch_entry(persisted: &PersistedTable) -> Option<&crate::identity::SnapshotEntry> {
    persisted
        .table
        .entries
        .iter()
        .find(|e| e.object_type == ObjectType::Switch && e.native == persisted.switch_native)
}
