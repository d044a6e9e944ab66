//! Latest reading per channel.

use crate::alerts::{AlertClass, AlertEvaluator};
use crate::reading::{Channel, SensorReading};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Holds exactly one reading per channel, the most recent write. Entries are
/// overwritten, never removed.
///
/// When built with an evaluator, every `update` runs alert evaluation on the
/// new reading before returning.
#[derive(Debug, Default)]
pub struct TelemetryStore {
    latest: RwLock<HashMap<Channel, SensorReading>>,
    evaluator: Option<Arc<AlertEvaluator>>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evaluator(evaluator: Arc<AlertEvaluator>) -> Self {
        Self {
            latest: RwLock::default(),
            evaluator: Some(evaluator),
        }
    }

    /// Overwrite the channel's reading, then evaluate it. Returns the alert
    /// that fired, if any.
    pub fn update(&self, reading: SensorReading) -> Option<AlertClass> {
        let channel = reading.channel;
        let value = self.evaluator.as_ref().map(|_| reading.value.clone());
        self.latest
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel, reading);
        // Lock released: evaluation may block on the audio path.
        let (evaluator, value) = (self.evaluator.as_ref()?, value?);
        evaluator.evaluate(channel, &value)
    }

    pub fn get(&self, channel: Channel) -> Option<SensorReading> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .cloned()
    }

    /// Consistent copy of every channel seen so far.
    pub fn snapshot(&self) -> BTreeMap<Channel, SensorReading> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(c, r)| (*c, r.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.latest.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
