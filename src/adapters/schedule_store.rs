//! Schedule store adapters.
//!
//! Implements [`ScheduleStore`] twice:
//!
//! - [`MemoryScheduleStore`]: plain `Vec`, for tests and simulation.
//! - [`JsonScheduleStore`]: a JSON array on disk, shared with the front
//!   end. The file is re-read on every query so external edits (new
//!   prescriptions, the daily reset to Active) are picked up, and
//!   rewritten atomically on every status change.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::app::ports::{ScheduleStore, StoreError};
use crate::scheduler::{DoseStatus, ScheduleEntry};

use super::utils::write_atomic;

/// Active → Dispensed for one entry. `Ok(false)` if it already was.
fn mark(entries: &mut [ScheduleEntry], prescription_id: i64, at: NaiveDateTime) -> Result<bool, StoreError> {
    let entry = entries
        .iter_mut()
        .find(|e| e.prescription_id == prescription_id)
        .ok_or(StoreError::NotFound)?;
    if entry.status == DoseStatus::Dispensed {
        return Ok(false);
    }
    entry.status = DoseStatus::Dispensed;
    entry.last_dispensed = Some(at);
    Ok(true)
}

fn active(entries: &[ScheduleEntry]) -> Vec<ScheduleEntry> {
    entries
        .iter()
        .filter(|e| e.status == DoseStatus::Active)
        .cloned()
        .collect()
}

// ───────────────────────────────────────────────────────────────
// In-memory
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemoryScheduleStore {
    entries: Vec<ScheduleEntry>,
}

impl MemoryScheduleStore {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn insert(&mut self, entry: ScheduleEntry) {
        self.entries.push(entry);
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn query_active(&mut self) -> Result<Vec<ScheduleEntry>, StoreError> {
        Ok(active(&self.entries))
    }

    fn mark_dispensed(&mut self, prescription_id: i64, at: NaiveDateTime) -> Result<(), StoreError> {
        mark(&mut self.entries, prescription_id, at).map(|_| ())
    }
}

// ───────────────────────────────────────────────────────────────
// JSON file
// ───────────────────────────────────────────────────────────────

pub struct JsonScheduleStore {
    path: PathBuf,
}

impl JsonScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("JsonScheduleStore: using {}", path.display());
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full schedule. A missing file is an empty schedule.
    pub fn load(&self) -> Result<Vec<ScheduleEntry>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("JsonScheduleStore: {} absent, empty schedule", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!("JsonScheduleStore: read {} failed: {}", self.path.display(), e);
                return Err(StoreError::IoError);
            }
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            warn!("JsonScheduleStore: {} is corrupted: {}", self.path.display(), e);
            StoreError::Corrupted
        })
    }

    /// Replace the whole schedule.
    pub fn save(&self, entries: &[ScheduleEntry]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|_| StoreError::IoError)?;
        write_atomic(&self.path, &bytes).map_err(|e| {
            warn!("JsonScheduleStore: write {} failed: {}", self.path.display(), e);
            StoreError::IoError
        })
    }
}

impl ScheduleStore for JsonScheduleStore {
    fn query_active(&mut self) -> Result<Vec<ScheduleEntry>, StoreError> {
        Ok(active(&self.load()?))
    }

    fn mark_dispensed(&mut self, prescription_id: i64, at: NaiveDateTime) -> Result<(), StoreError> {
        let mut entries = self.load()?;
        if mark(&mut entries, prescription_id, at)? {
            self.save(&entries)?;
        }
        Ok(())
    }
}
