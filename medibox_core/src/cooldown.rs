//! Per-schedule dispense cooldown.
//!
//! Same window semantics as [`crate::throttle`], keyed by schedule id. A
//! dispense takes time (advisory pause, publish), so callers that act on the
//! answer should go through [`DispenseCooldownTracker::try_begin`]: the claim
//! keeps a second caller (manual trigger racing the poll loop) out until the
//! dispense is committed or abandoned.
//!
//! Scheduled dispenses also record which occurrence (scheduled date and time)
//! they served. An occurrence is dispensed at most once, however long the
//! matching window stays open after the cooldown lapses.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, TimeDelta};

use crate::throttle::cooled_down;

/// Served occurrences older than this many hours are forgotten.
const OCCURRENCE_RETENTION_HOURS: i64 = 48;

#[derive(Debug, Default)]
struct State {
    last_dispensed: HashMap<String, Instant>,
    in_flight: HashSet<String>,
    served: HashMap<String, BTreeSet<NaiveDateTime>>,
}

impl State {
    fn admits(&self, schedule_id: &str, now: Instant, cooldown: Duration) -> bool {
        !self.in_flight.contains(schedule_id)
            && cooled_down(self.last_dispensed.get(schedule_id).copied(), now, cooldown)
    }

    fn served(&self, schedule_id: &str, occurrence: NaiveDateTime) -> bool {
        self.served
            .get(schedule_id)
            .is_some_and(|set| set.contains(&occurrence))
    }

    fn mark_served(&mut self, schedule_id: &str, occurrence: NaiveDateTime) {
        let set = self.served.entry(schedule_id.to_owned()).or_default();
        set.insert(occurrence);
        let horizon = occurrence - TimeDelta::hours(OCCURRENCE_RETENTION_HOURS);
        set.retain(|o| *o >= horizon);
    }
}

#[derive(Debug, Default)]
pub struct DispenseCooldownTracker {
    state: Mutex<State>,
}

impl DispenseCooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn can_dispense(&self, schedule_id: &str, now: Instant, cooldown: Duration) -> bool {
        self.state().admits(schedule_id, now, cooldown)
    }

    pub fn record_dispensed(&self, schedule_id: &str, now: Instant) {
        let mut st = self.state();
        st.in_flight.remove(schedule_id);
        st.last_dispensed.insert(schedule_id.to_owned(), now);
    }

    pub fn last_dispensed(&self, schedule_id: &str) -> Option<Instant> {
        self.state().last_dispensed.get(schedule_id).copied()
    }

    /// Whether `occurrence` of `schedule_id` has already been dispensed.
    pub fn occurrence_served(&self, schedule_id: &str, occurrence: NaiveDateTime) -> bool {
        self.state().served(schedule_id, occurrence)
    }

    /// Check and reserve in one step. `None` when the schedule is cooling
    /// down or another dispense of it is already in progress.
    pub fn try_begin(
        &self,
        schedule_id: &str,
        now: Instant,
        cooldown: Duration,
    ) -> Option<DispenseClaim<'_>> {
        self.try_begin_occurrence(schedule_id, None, now, cooldown)
    }

    /// [`try_begin`](Self::try_begin) for a scheduled occurrence. Also `None`
    /// when that occurrence was already served.
    pub fn try_begin_occurrence(
        &self,
        schedule_id: &str,
        occurrence: Option<NaiveDateTime>,
        now: Instant,
        cooldown: Duration,
    ) -> Option<DispenseClaim<'_>> {
        let mut st = self.state();
        if !st.admits(schedule_id, now, cooldown) {
            return None;
        }
        if occurrence.is_some_and(|o| st.served(schedule_id, o)) {
            return None;
        }
        st.in_flight.insert(schedule_id.to_owned());
        Some(DispenseClaim {
            tracker: self,
            schedule_id: schedule_id.to_owned(),
            occurrence,
            committed: false,
        })
    }
}

/// Reservation returned by [`DispenseCooldownTracker::try_begin`].
///
/// Dropping it without [`commit`](Self::commit) releases the reservation and
/// leaves the cooldown as it was.
#[must_use = "dropping the claim releases it without recording a dispense"]
#[derive(Debug)]
pub struct DispenseClaim<'a> {
    tracker: &'a DispenseCooldownTracker,
    schedule_id: String,
    occurrence: Option<NaiveDateTime>,
    committed: bool,
}

impl DispenseClaim<'_> {
    pub fn schedule_id(&self) -> &str {
        &self.schedule_id
    }

    pub fn commit(mut self, now: Instant) {
        let mut st = self.tracker.state();
        st.in_flight.remove(&self.schedule_id);
        st.last_dispensed.insert(self.schedule_id.clone(), now);
        if let Some(occurrence) = self.occurrence {
            st.mark_served(&self.schedule_id, occurrence);
        }
        drop(st);
        self.committed = true;
    }
}

impl Drop for DispenseClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.tracker.state().in_flight.remove(&self.schedule_id);
        }
    }
}
