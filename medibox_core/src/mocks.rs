//! Recording collaborators for tests and dry runs.

use medibox_traits::{AudioSink, BoxError, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::schedule::MedicationSchedule;
use crate::store::ScheduleSource;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport that records every publish; can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.published).clone()
    }

    /// Payloads published on `topic`, as text.
    pub fn published_on(&self, topic: &str) -> Vec<String> {
        lock(&self.published)
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn publish(&self, topic: &str, payload: &[u8]) -> std::result::Result<(), BoxError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Box::new(std::io::Error::other("recording transport set to fail")));
        }
        lock(&self.published).push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }
}

/// Audio sink that records `(category, key)` and returns a fixed result.
#[derive(Debug)]
pub struct RecordingAudio {
    played: Mutex<Vec<(String, String)>>,
    result: AtomicBool,
}

impl Default for RecordingAudio {
    fn default() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            result: AtomicBool::new(true),
        }
    }
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_result(&self, ok: bool) {
        self.result.store(ok, Ordering::SeqCst);
    }

    pub fn played(&self) -> Vec<(String, String)> {
        lock(&self.played).clone()
    }

    pub fn count(&self, category: &str, key: &str) -> usize {
        lock(&self.played)
            .iter()
            .filter(|(c, k)| c == category && k == key)
            .count()
    }
}

impl AudioSink for RecordingAudio {
    fn play_alert(&self, category: &str, key: &str) -> bool {
        lock(&self.played).push((category.to_owned(), key.to_owned()));
        self.result.load(Ordering::SeqCst)
    }
}

/// Schedule source that is always unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingSchedules;

impl ScheduleSource for FailingSchedules {
    fn list_schedules(&self) -> Result<Vec<MedicationSchedule>> {
        eyre::bail!("schedule store unavailable")
    }
}
