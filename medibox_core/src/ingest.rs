//! Inbound link events -> parser -> telemetry store.
//!
//! Messages are handled one at a time, end to end, in delivery order. Nothing
//! a single message does can stop the loop.

use crate::alerts::{AlertClass, AlertEvaluator};
use crate::error::ParseError;
use crate::parser;
use crate::reading::{Channel, SensorReading};
use crate::telemetry::TelemetryStore;
use crossbeam_channel as xch;
use medibox_traits::{AudioCue, Clock, InboundMessage, LinkEvent, SystemCue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Inbound topic -> channel routing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicMap {
    routes: HashMap<String, Channel>,
}

impl TopicMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, topic: impl Into<String>, channel: Channel) {
        self.routes.insert(topic.into(), channel);
    }

    pub fn channel_for(&self, topic: &str) -> Option<Channel> {
        self.routes.get(topic).copied()
    }

    /// Topics to subscribe to, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut t: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        t.sort_unstable();
        t
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored {
        channel: Channel,
        alert: Option<AlertClass>,
    },
    /// Payload did not parse; the previous reading is kept.
    Rejected { channel: Channel, error: ParseError },
    UnknownTopic,
}

/// Counters for one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub stored: u64,
    pub rejected: u64,
    pub unknown: u64,
    pub alerts: u64,
}

pub struct Ingestor {
    topics: TopicMap,
    store: Arc<TelemetryStore>,
    evaluator: Arc<AlertEvaluator>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ingestor")
            .field("topics", &self.topics.len())
            .finish_non_exhaustive()
    }
}

impl Ingestor {
    pub fn new(
        topics: TopicMap,
        store: Arc<TelemetryStore>,
        evaluator: Arc<AlertEvaluator>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            topics,
            store,
            evaluator,
            clock,
        }
    }

    pub fn topics(&self) -> &TopicMap {
        &self.topics
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn handle_message(&self, msg: &InboundMessage) -> IngestOutcome {
        let Some(channel) = self.topics.channel_for(&msg.topic) else {
            tracing::trace!(topic = %msg.topic, "no channel for topic");
            return IngestOutcome::UnknownTopic;
        };
        match parser::parse(channel, &msg.payload) {
            Ok(value) => {
                tracing::trace!(%channel, ?value, "reading");
                let reading = SensorReading::new(channel, value, self.clock.local_now());
                let alert = self.store.update(reading);
                IngestOutcome::Stored { channel, alert }
            }
            Err(error) => {
                tracing::warn!(%channel, topic = %msg.topic, %error, "payload rejected");
                IngestOutcome::Rejected { channel, error }
            }
        }
    }

    pub fn handle_event(&self, event: &LinkEvent) -> Option<IngestOutcome> {
        match event {
            LinkEvent::Connected => {
                tracing::info!("broker connected");
                self.evaluator.raise(AlertClass::BrokerConnected);
                None
            }
            LinkEvent::ConnectFailed(reason) => {
                tracing::error!(target: "ops", %reason, "broker connection failed");
                self.evaluator.play_now(AudioCue::System(SystemCue::Error));
                None
            }
            LinkEvent::Message(msg) => Some(self.handle_message(msg)),
        }
    }

    /// Drain `events` until every sender is gone.
    pub fn run(&self, events: &xch::Receiver<LinkEvent>) -> IngestStats {
        let mut stats = IngestStats::default();
        for event in events.iter() {
            match self.handle_event(&event) {
                Some(IngestOutcome::Stored { alert, .. }) => {
                    stats.stored += 1;
                    stats.alerts += u64::from(alert.is_some());
                }
                Some(IngestOutcome::Rejected { .. }) => stats.rejected += 1,
                Some(IngestOutcome::UnknownTopic) => stats.unknown += 1,
                None => {}
            }
        }
        tracing::debug!(?stats, "ingest loop finished");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioGate, PlaybackMode};
    use crate::config::{AlertCfg, Thresholds};
    use crate::mocks::RecordingAudio;
    use crate::reading::ReadingValue;
    use medibox_traits::clock::test_clock::TestClock;

    fn ingestor() -> (Ingestor, Arc<RecordingAudio>) {
        let audio = Arc::new(RecordingAudio::new());
        let clock = Arc::new(TestClock::new());
        let gate = Arc::new(AudioGate::new(audio.clone(), PlaybackMode::Inline));
        let evaluator = Arc::new(AlertEvaluator::new(
            Thresholds::default(),
            AlertCfg::default(),
            gate,
            clock.clone(),
        ));
        let store = Arc::new(TelemetryStore::with_evaluator(evaluator.clone()));
        let mut topics = TopicMap::new();
        topics.insert("health/bpm", Channel::HeartRate);
        topics.insert("tempgun/sensor/temp_object", Channel::Temperature);
        (Ingestor::new(topics, store, evaluator, clock), audio)
    }

    #[test]
    fn unknown_topic_is_ignored() {
        let (ing, _) = ingestor();
        let out = ing.handle_message(&InboundMessage::new("other/topic", "1"));
        assert_eq!(out, IngestOutcome::UnknownTopic);
        assert!(ing.store().is_empty());
    }

    #[test]
    fn connect_events_play_system_cues() {
        let (ing, audio) = ingestor();
        assert_eq!(ing.handle_event(&LinkEvent::Connected), None);
        ing.handle_event(&LinkEvent::Connected);
        ing.handle_event(&LinkEvent::ConnectFailed("refused".into()));
        ing.handle_event(&LinkEvent::ConnectFailed("refused".into()));
        assert_eq!(audio.count("system_status", "online"), 1);
        assert_eq!(audio.count("system_status", "error"), 2);
    }

    #[test]
    fn run_drains_until_disconnect() {
        let (ing, _) = ingestor();
        let (tx, rx) = xch::unbounded();
        for ev in [
            LinkEvent::Connected,
            LinkEvent::Message(InboundMessage::new("health/bpm", "72")),
            LinkEvent::Message(InboundMessage::new("health/bpm", "oops")),
            LinkEvent::Message(InboundMessage::new("nowhere", "1")),
            LinkEvent::Message(InboundMessage::new("health/bpm", "120")),
        ] {
            tx.send(ev).expect("send");
        }
        drop(tx);
        let stats = ing.run(&rx);
        assert_eq!(
            stats,
            IngestStats {
                stored: 2,
                rejected: 1,
                unknown: 1,
                alerts: 2,
            }
        );
        assert_eq!(
            ing.store().get(Channel::HeartRate).map(|r| r.value),
            Some(ReadingValue::Scalar(120.0))
        );
    }
}
