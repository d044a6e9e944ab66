//! Schedule sources: the read-only view of the external schedule store.

use crate::error::Result;
use crate::schedule::MedicationSchedule;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Read-only access to medication schedules. Every call returns a fresh
/// snapshot; the store may change between calls.
pub trait ScheduleSource {
    fn list_schedules(&self) -> Result<Vec<MedicationSchedule>>;

    fn list_active_schedules(&self) -> Result<Vec<MedicationSchedule>> {
        let mut all = self.list_schedules()?;
        all.retain(|s| s.is_active);
        Ok(all)
    }
}

/// JSON schedule file, re-read on every call so external edits are picked
/// up on the next poll.
#[derive(Debug, Clone)]
pub struct JsonFileSchedules {
    path: PathBuf,
}

impl JsonFileSchedules {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScheduleSource for JsonFileSchedules {
    fn list_schedules(&self) -> Result<Vec<MedicationSchedule>> {
        let contents = medibox_config::load_schedules_json(&self.path)?;
        for r in &contents.rejected {
            tracing::error!(
                target: "ops",
                file = %self.path.display(),
                index = r.index,
                reason = %r.reason,
                "schedule record skipped"
            );
        }
        Ok(contents.records.iter().map(MedicationSchedule::from).collect())
    }
}

/// Schedules held in memory; the embedding application mutates them.
#[derive(Debug, Default)]
pub struct InMemorySchedules {
    schedules: RwLock<Vec<MedicationSchedule>>,
}

impl InMemorySchedules {
    pub fn new(schedules: Vec<MedicationSchedule>) -> Self {
        Self {
            schedules: RwLock::new(schedules),
        }
    }

    /// Insert, or overwrite the schedule with the same id.
    pub fn upsert(&self, schedule: MedicationSchedule) {
        let mut all = self.schedules.write().unwrap_or_else(PoisonError::into_inner);
        match all.iter_mut().find(|s| s.id == schedule.id) {
            Some(slot) => *slot = schedule,
            None => all.push(schedule),
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut all = self.schedules.write().unwrap_or_else(PoisonError::into_inner);
        let before = all.len();
        all.retain(|s| s.id != id);
        all.len() != before
    }
}

impl ScheduleSource for InMemorySchedules {
    fn list_schedules(&self) -> Result<Vec<MedicationSchedule>> {
        Ok(self
            .schedules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
