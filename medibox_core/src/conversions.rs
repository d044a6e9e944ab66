//! `From` implementations bridging `medibox_config` types to `medibox_core` types.

use crate::actuator::Direction;
use crate::config::{ActuatorCfg, AlertCfg, SchedulerCfg, Thresholds};
use crate::ingest::TopicMap;
use crate::reading::Channel;
use crate::schedule::{Frequency, MedicationSchedule, MorningWindow};
use medibox_config::{Config, FrequencyRecord, ScheduleRecord, StepDirection};
use std::time::Duration;

// ── Thresholds ───────────────────────────────────────────────────────────────

impl From<&medibox_config::Thresholds> for Thresholds {
    fn from(c: &medibox_config::Thresholds) -> Self {
        Self {
            temp_high: c.temp_high,
            temp_low: c.temp_low,
            bpm_high: c.bpm_high,
            bpm_low: c.bpm_low,
            alcohol: c.alcohol,
            motion: c.motion,
        }
    }
}

// ── AlertCfg ─────────────────────────────────────────────────────────────────

impl From<&medibox_config::Alerts> for AlertCfg {
    fn from(c: &medibox_config::Alerts) -> Self {
        Self {
            cooldown: Duration::from_secs(c.cooldown_s),
            ..Self::default()
        }
    }
}

// ── SchedulerCfg ─────────────────────────────────────────────────────────────

impl From<&medibox_config::Dispense> for SchedulerCfg {
    fn from(c: &medibox_config::Dispense) -> Self {
        Self {
            poll_interval: Duration::from_secs(c.poll_interval_s),
            dispense_cooldown: Duration::from_secs(c.cooldown_s),
            tolerance_min: c.tolerance_min,
            advisory_pause: Duration::from_millis(c.advisory_pause_ms),
            morning: MorningWindow {
                start_hour: c.morning_start_hour,
                end_hour: c.morning_end_hour,
            },
        }
    }
}

// ── ActuatorCfg ──────────────────────────────────────────────────────────────

impl From<StepDirection> for Direction {
    fn from(d: StepDirection) -> Self {
        match d {
            StepDirection::Cw => Self::Cw,
            StepDirection::Ccw => Self::Ccw,
        }
    }
}

impl From<&Config> for ActuatorCfg {
    fn from(c: &Config) -> Self {
        Self {
            servo_topic: c.topics.servo.clone(),
            stepper_topic: c.topics.stepper.clone(),
            open_angle: c.servo.open_angle,
            close_angle: c.servo.close_angle,
            close_delay: Duration::from_secs(c.servo.close_delay_s),
            stepper_steps: c.stepper.steps,
            stepper_direction: c.stepper.direction.into(),
        }
    }
}

// ── TopicMap ─────────────────────────────────────────────────────────────────

impl From<&medibox_config::Topics> for TopicMap {
    fn from(t: &medibox_config::Topics) -> Self {
        let mut map = TopicMap::new();
        for (name, topic) in t.entries() {
            // Outbound command topics have no channel.
            if let Some(channel) = Channel::from_name(name) {
                map.insert(topic, channel);
            }
        }
        map
    }
}

// ── MedicationSchedule ───────────────────────────────────────────────────────

impl From<&ScheduleRecord> for MedicationSchedule {
    fn from(r: &ScheduleRecord) -> Self {
        Self {
            id: r.id.clone(),
            patient_id: r.patient_id.clone(),
            name: r.name.clone(),
            dosage: r.dosage.clone(),
            scheduled_times: r.scheduled_times.clone(),
            frequency: match r.frequency {
                FrequencyRecord::Daily => Frequency::Daily,
                FrequencyRecord::SpecificDays => {
                    Frequency::SpecificWeekdays(r.specific_days.iter().copied().collect())
                }
            },
            is_active: r.is_active,
            start_date: r.start_date,
            end_date: r.end_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topics_route_every_inbound_channel() {
        let map = TopicMap::from(&medibox_config::Topics::default());
        assert_eq!(map.len(), Channel::ALL.len());
        assert_eq!(map.channel_for("tempgun/sensor/temp_object"), Some(Channel::Temperature));
        assert_eq!(map.channel_for("health/bpm"), Some(Channel::HeartRate));
        assert_eq!(map.channel_for("actuators/servo"), None);
    }

    #[test]
    fn config_sections_convert() {
        let cfg = Config::default();
        let s = SchedulerCfg::from(&cfg.dispense);
        assert_eq!(s, SchedulerCfg::default());
        let a = ActuatorCfg::from(&cfg);
        assert_eq!(a, ActuatorCfg::default());
        assert_eq!(Thresholds::from(&cfg.thresholds), Thresholds::default());
        assert_eq!(AlertCfg::from(&cfg.alerts), AlertCfg::default());
    }
}
