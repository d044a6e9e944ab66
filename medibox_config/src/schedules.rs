//! Medication-schedule file schema.
//!
//! The file is a JSON array of records owned by the external schedule store.
//! Records that fail to deserialize are reported individually so one bad
//! entry never hides the others.
//!
//! Example:
//! [
//!   { "_id": "a1", "user_id": "u7", "medication_name": "Metformin",
//!     "dosage": "500mg", "scheduled_times": ["8:00 AM", "20:00"],
//!     "frequency": "specific_days", "specific_days": [0, 2, 4],
//!     "is_active": true, "start_date": "2026-01-01" }
//! ]
use chrono::NaiveDate;
use eyre::WrapErr;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyRecord {
    #[default]
    Daily,
    #[serde(alias = "weekly")]
    SpecificDays,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScheduleRecord {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "user_id", default)]
    pub patient_id: String,
    #[serde(alias = "medication_name")]
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    /// "h:mm AM/PM" or "HH:MM"; parsed by the matcher, not here.
    #[serde(default)]
    pub scheduled_times: Vec<String>,
    #[serde(default)]
    pub frequency: FrequencyRecord,
    /// ISO weekdays, 0 = Monday .. 6 = Sunday. Only read for `specific_days`.
    #[serde(default)]
    pub specific_days: Vec<u8>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn default_active() -> bool {
    true
}

/// A record that could not be deserialized, by array position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleFileContents {
    pub records: Vec<ScheduleRecord>,
    pub rejected: Vec<RejectedRecord>,
}

pub fn parse_schedules_json(s: &str) -> eyre::Result<ScheduleFileContents> {
    let items: Vec<serde_json::Value> =
        serde_json::from_str(s).wrap_err("schedule file must be a JSON array")?;
    let mut out = ScheduleFileContents::default();
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<ScheduleRecord>(item) {
            Ok(rec) => out.records.push(rec),
            Err(e) => out.rejected.push(RejectedRecord {
                index,
                reason: e.to_string(),
            }),
        }
    }
    Ok(out)
}

pub fn load_schedules_json(path: &std::path::Path) -> eyre::Result<ScheduleFileContents> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("open schedule file {:?}: {}", path, e))?;
    parse_schedules_json(&text).wrap_err_with(|| format!("parse schedule file {path:?}"))
}
