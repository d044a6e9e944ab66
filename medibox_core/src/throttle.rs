//! Cooldown-window gate keyed by alert class (or any other identity).

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::alerts::AlertClass;

/// True when `now` is at least `cooldown` past `last`, or nothing fired yet.
///
/// A `now` earlier than `last` counts as zero elapsed time.
#[inline]
pub fn cooled_down(last: Option<Instant>, now: Instant, cooldown: Duration) -> bool {
    last.is_none_or(|l| now.saturating_duration_since(l) >= cooldown)
}

/// Remembers when each key last fired and admits at most one firing per
/// cooldown window.
///
/// Check and update happen under one lock, so two callers racing on the same
/// key inside a window get exactly one `true` between them.
#[derive(Debug)]
pub struct Throttle<K> {
    last_fired: Mutex<HashMap<K, Instant>>,
}

impl<K> Default for Throttle<K> {
    fn default() -> Self {
        Self {
            last_fired: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Hash + Eq> Throttle<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<K, Instant>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.last_fired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire `key` at `now` if its window has elapsed. Leaves state untouched
    /// when it returns `false`.
    pub fn try_fire<Q>(&self, key: &Q, now: Instant, cooldown: Duration) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
    {
        let mut map = self.map();
        if !cooled_down(map.get(key).copied(), now, cooldown) {
            return false;
        }
        match map.get_mut(key) {
            Some(slot) => *slot = now,
            None => {
                map.insert(key.to_owned(), now);
            }
        }
        true
    }

    pub fn last_fired<Q>(&self, key: &Q) -> Option<Instant>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map().get(key).copied()
    }
}

/// Per-class throttle used by the alert evaluator.
pub type AlertThrottle = Throttle<AlertClass>;
