//! Threshold evaluation and the alert classes it raises.

use crate::audio::{AudioGate, PlayOutcome};
use crate::config::{AlertCfg, Thresholds};
use crate::reading::{Channel, ReadingValue};
use crate::throttle::AlertThrottle;
use medibox_traits::{AudioCue, Clock, HealthCue, SystemCue};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Independently throttled notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertClass {
    HighTemperature,
    LowTemperature,
    HighHeartRate,
    LowHeartRate,
    NormalHeartRate,
    AlcoholDetected,
    MotionDetected,
    BrokerConnected,
    Startup,
}

impl AlertClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::HighTemperature => "high_temperature",
            Self::LowTemperature => "low_temperature",
            Self::HighHeartRate => "high_heart_rate",
            Self::LowHeartRate => "low_heart_rate",
            Self::NormalHeartRate => "normal_heart_rate",
            Self::AlcoholDetected => "alcohol_detected",
            Self::MotionDetected => "motion_detected",
            Self::BrokerConnected => "broker_connected",
            Self::Startup => "startup",
        }
    }

    /// Cue played when the class fires.
    pub fn cue(self) -> AudioCue {
        match self {
            Self::HighTemperature => AudioCue::Health(HealthCue::HighTemp),
            Self::LowTemperature => AudioCue::Health(HealthCue::TempMeasure),
            Self::HighHeartRate => AudioCue::Health(HealthCue::HighBpm),
            // Low shares the normal cue; there is no dedicated low-bpm sound.
            Self::LowHeartRate | Self::NormalHeartRate => AudioCue::Health(HealthCue::NormalBpm),
            Self::AlcoholDetected => AudioCue::Health(HealthCue::AlcoholDetected),
            Self::MotionDetected => AudioCue::Motion,
            Self::BrokerConnected => AudioCue::System(SystemCue::Online),
            Self::Startup => AudioCue::System(SystemCue::SetupComplete),
        }
    }
}

impl fmt::Display for AlertClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Applies [`Thresholds`] to fresh readings and raises alerts through the
/// throttle. Holds no per-reading state.
pub struct AlertEvaluator {
    thresholds: Thresholds,
    cfg: AlertCfg,
    throttle: AlertThrottle,
    audio: Arc<AudioGate>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl fmt::Debug for AlertEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertEvaluator")
            .field("thresholds", &self.thresholds)
            .field("cfg", &self.cfg)
            .finish_non_exhaustive()
    }
}

impl AlertEvaluator {
    pub fn new(
        thresholds: Thresholds,
        cfg: AlertCfg,
        audio: Arc<AudioGate>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            thresholds,
            cfg,
            throttle: AlertThrottle::new(),
            audio,
            clock,
        }
    }

    /// Which class, if any, a value on `channel` falls into. Pure.
    ///
    /// Heart-rate bands are exclusive: `[high, ..)` high, `(0, low]` low,
    /// `(low, high)` normal. Non-positive rates are sensor noise.
    pub fn classify(&self, channel: Channel, value: &ReadingValue) -> Option<AlertClass> {
        let t = &self.thresholds;
        match (channel, value) {
            (Channel::Temperature, ReadingValue::Scalar(v)) => {
                if *v >= t.temp_high {
                    Some(AlertClass::HighTemperature)
                } else if *v <= t.temp_low {
                    Some(AlertClass::LowTemperature)
                } else {
                    None
                }
            }
            (Channel::HeartRate, ReadingValue::Scalar(v)) => {
                if *v >= t.bpm_high {
                    Some(AlertClass::HighHeartRate)
                } else if *v <= 0.0 {
                    None
                } else if *v <= t.bpm_low {
                    Some(AlertClass::LowHeartRate)
                } else {
                    Some(AlertClass::NormalHeartRate)
                }
            }
            (Channel::Alcohol, ReadingValue::Scalar(v)) if *v >= t.alcohol => {
                Some(AlertClass::AlcoholDetected)
            }
            (Channel::Gyro | Channel::Accel, ReadingValue::Vector(v))
                if v.magnitude() >= t.motion =>
            {
                Some(AlertClass::MotionDetected)
            }
            _ => None,
        }
    }

    /// Classify and raise. Returns the class only if it actually fired.
    pub fn evaluate(&self, channel: Channel, value: &ReadingValue) -> Option<AlertClass> {
        let class = self.classify(channel, value)?;
        self.raise(class).then_some(class)
    }

    /// Fire `class` through the throttle; on success request its cue.
    pub fn raise(&self, class: AlertClass) -> bool {
        if !self.throttle.try_fire(&class, self.clock.now(), self.cfg.cooldown) {
            tracing::debug!(alert = %class, "alert suppressed by cooldown");
            return false;
        }
        tracing::info!(alert = %class, "alert");
        self.audio.play(class.cue());
        true
    }

    /// Startup announcement: throttled "setup complete", a short gap, then
    /// "sensors active".
    pub fn announce_startup(&self) -> bool {
        if !self.raise(AlertClass::Startup) {
            return false;
        }
        self.clock.sleep(self.cfg.startup_gap);
        self.audio.play(AudioCue::System(SystemCue::SensorsActive));
        true
    }

    /// Unthrottled cue, for one-off conditions such as a refused connection.
    pub fn play_now(&self, cue: AudioCue) -> PlayOutcome {
        self.audio.play(cue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PlaybackMode;
    use crate::mocks::RecordingAudio;
    use crate::reading::Vector3;
    use medibox_traits::clock::test_clock::TestClock;
    use rstest::rstest;
    use std::time::Duration;

    fn evaluator() -> (AlertEvaluator, Arc<RecordingAudio>, Arc<TestClock>) {
        let audio = Arc::new(RecordingAudio::new());
        let clock = Arc::new(TestClock::new());
        let gate = Arc::new(AudioGate::new(audio.clone(), PlaybackMode::Inline));
        let ev = AlertEvaluator::new(
            Thresholds::default(),
            AlertCfg::default(),
            gate,
            clock.clone(),
        );
        (ev, audio, clock)
    }

    #[rstest]
    #[case(Channel::HeartRate, 100.0, Some(AlertClass::HighHeartRate))]
    #[case(Channel::HeartRate, 140.0, Some(AlertClass::HighHeartRate))]
    #[case(Channel::HeartRate, 99.9, Some(AlertClass::NormalHeartRate))]
    #[case(Channel::HeartRate, 60.0, Some(AlertClass::LowHeartRate))]
    #[case(Channel::HeartRate, 59.9, Some(AlertClass::LowHeartRate))]
    #[case(Channel::HeartRate, 60.1, Some(AlertClass::NormalHeartRate))]
    #[case(Channel::HeartRate, 0.0, None)]
    #[case(Channel::Temperature, 37.5, Some(AlertClass::HighTemperature))]
    #[case(Channel::Temperature, 37.4, None)]
    #[case(Channel::Temperature, 35.0, Some(AlertClass::LowTemperature))]
    #[case(Channel::Temperature, 35.1, None)]
    #[case(Channel::Alcohol, 0.1, Some(AlertClass::AlcoholDetected))]
    #[case(Channel::Alcohol, 0.09, None)]
    #[case(Channel::Distance, 1000.0, None)]
    fn threshold_boundaries(
        #[case] channel: Channel,
        #[case] v: f64,
        #[case] want: Option<AlertClass>,
    ) {
        let (ev, _, _) = evaluator();
        assert_eq!(ev.classify(channel, &ReadingValue::Scalar(v)), want);
    }

    #[test]
    fn motion_uses_vector_magnitude() {
        let (ev, _, _) = evaluator();
        let still = ReadingValue::Vector(Vector3 { x: 1.0, y: 1.0, z: 1.0 });
        let moving = ReadingValue::Vector(Vector3 { x: 3.0, y: 4.0, z: 0.0 });
        assert_eq!(ev.classify(Channel::Gyro, &still), None);
        assert_eq!(ev.classify(Channel::Accel, &moving), Some(AlertClass::MotionDetected));
        assert_eq!(ev.classify(Channel::Temperature, &moving), None);
    }

    #[test]
    fn low_and_normal_heart_rate_share_a_cue() {
        assert_eq!(AlertClass::LowHeartRate.cue(), AlertClass::NormalHeartRate.cue());
        assert_ne!(AlertClass::LowHeartRate, AlertClass::NormalHeartRate);
    }

    #[test]
    fn evaluate_plays_cue_once_per_window() {
        let (ev, audio, clock) = evaluator();
        let hot = ReadingValue::Scalar(38.0);
        assert_eq!(ev.evaluate(Channel::Temperature, &hot), Some(AlertClass::HighTemperature));
        clock.advance(Duration::from_secs(10));
        assert_eq!(ev.evaluate(Channel::Temperature, &hot), None);
        clock.advance(Duration::from_secs(20));
        assert_eq!(ev.evaluate(Channel::Temperature, &hot), Some(AlertClass::HighTemperature));
        assert_eq!(audio.count("health", "high_temp"), 2);
    }

    #[test]
    fn startup_plays_both_cues_then_is_throttled() {
        let (ev, audio, clock) = evaluator();
        let t0 = clock.now();
        assert!(ev.announce_startup());
        assert_eq!(clock.now() - t0, Duration::from_secs(2));
        assert!(!ev.announce_startup());
        assert_eq!(
            audio.played(),
            vec![
                ("system_status".to_string(), "setup_complete".to_string()),
                ("system_status".to_string(), "sensors_active".to_string()),
            ]
        );
    }
}
