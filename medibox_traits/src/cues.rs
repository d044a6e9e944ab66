//! Catalogue of audio cues understood by the audio renderer.
//!
//! Every cue is addressed as `(category, key)` on the wire of
//! [`AudioSink::play_alert`](crate::AudioSink::play_alert); `sound_name()` is
//! the file stem the renderer plays for it.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCategory {
    Health,
    Motion,
    Medication,
    SystemStatus,
    UserInteraction,
}

impl AudioCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Motion => "motion",
            Self::Medication => "medication",
            Self::SystemStatus => "system_status",
            Self::UserInteraction => "user_interaction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthCue {
    HighBpm,
    NormalBpm,
    HighTemp,
    TempMeasure,
    AlcoholDetected,
    AlcoholDisabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MedicationCue {
    TimeToTake,
    Dispensing,
    Complete,
    Confirmed,
    Delayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemCue {
    Online,
    SetupComplete,
    SensorsActive,
    Error,
    ScanStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserCue {
    Identified,
    TouchScreen,
    PressButton,
    DoNotMove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCue {
    Health(HealthCue),
    Motion,
    Medication(MedicationCue),
    System(SystemCue),
    User(UserCue),
}

impl AudioCue {
    pub const ALL: [AudioCue; 21] = [
        AudioCue::Health(HealthCue::HighBpm),
        AudioCue::Health(HealthCue::NormalBpm),
        AudioCue::Health(HealthCue::HighTemp),
        AudioCue::Health(HealthCue::TempMeasure),
        AudioCue::Health(HealthCue::AlcoholDetected),
        AudioCue::Health(HealthCue::AlcoholDisabled),
        AudioCue::Motion,
        AudioCue::Medication(MedicationCue::TimeToTake),
        AudioCue::Medication(MedicationCue::Dispensing),
        AudioCue::Medication(MedicationCue::Complete),
        AudioCue::Medication(MedicationCue::Confirmed),
        AudioCue::Medication(MedicationCue::Delayed),
        AudioCue::System(SystemCue::Online),
        AudioCue::System(SystemCue::SetupComplete),
        AudioCue::System(SystemCue::SensorsActive),
        AudioCue::System(SystemCue::Error),
        AudioCue::System(SystemCue::ScanStart),
        AudioCue::User(UserCue::Identified),
        AudioCue::User(UserCue::TouchScreen),
        AudioCue::User(UserCue::PressButton),
        AudioCue::User(UserCue::DoNotMove),
    ];

    pub fn category(self) -> AudioCategory {
        match self {
            Self::Health(_) => AudioCategory::Health,
            Self::Motion => AudioCategory::Motion,
            Self::Medication(_) => AudioCategory::Medication,
            Self::System(_) => AudioCategory::SystemStatus,
            Self::User(_) => AudioCategory::UserInteraction,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Health(h) => match h {
                HealthCue::HighBpm => "high_bpm",
                HealthCue::NormalBpm => "normal_bpm",
                HealthCue::HighTemp => "high_temp",
                HealthCue::TempMeasure => "temp_measure",
                HealthCue::AlcoholDetected => "alcohol_detected",
                HealthCue::AlcoholDisabled => "alcohol_disabled",
            },
            Self::Motion => "motion_detected",
            Self::Medication(m) => match m {
                MedicationCue::TimeToTake => "time_to_take",
                MedicationCue::Dispensing => "dispensing",
                MedicationCue::Complete => "complete",
                MedicationCue::Confirmed => "confirmed",
                MedicationCue::Delayed => "delayed",
            },
            Self::System(s) => match s {
                SystemCue::Online => "online",
                SystemCue::SetupComplete => "setup_complete",
                SystemCue::SensorsActive => "sensors_active",
                SystemCue::Error => "error",
                SystemCue::ScanStart => "scan_start",
            },
            Self::User(u) => match u {
                UserCue::Identified => "identified",
                UserCue::TouchScreen => "touch_screen",
                UserCue::PressButton => "press_button",
                UserCue::DoNotMove => "do_not_move",
            },
        }
    }

    /// Sound file stem played for this cue.
    pub fn sound_name(self) -> &'static str {
        match self {
            Self::Health(h) => match h {
                HealthCue::HighBpm => "warning_abnormal_heart_rate",
                HealthCue::NormalBpm => "pulse_detected",
                HealthCue::HighTemp => "warning_high_temperature",
                HealthCue::TempMeasure => "measuring_temperature",
                HealthCue::AlcoholDetected => "alcohol_detected_blocked",
                HealthCue::AlcoholDisabled => "alcohol_detected_disabled",
            },
            Self::Motion => "motion_detected",
            Self::Medication(m) => match m {
                MedicationCue::TimeToTake => "time_to_take_medicine",
                MedicationCue::Dispensing => "dispensing_medicine",
                MedicationCue::Complete => "dispensing_complete",
                MedicationCue::Confirmed => "dosage_confirmed",
                MedicationCue::Delayed => "medication_delayed",
            },
            Self::System(s) => match s {
                SystemCue::Online => "system_online",
                SystemCue::SetupComplete => "setup_complete",
                SystemCue::SensorsActive => "sensors_active",
                SystemCue::Error => "error_check_wiring",
                SystemCue::ScanStart => "initializing_health_scan",
            },
            Self::User(u) => match u {
                UserCue::Identified => "user_identified",
                UserCue::TouchScreen => "touch_screen_to_begin",
                UserCue::PressButton => "press_button_to_confirm",
                UserCue::DoNotMove => "do_not_move",
            },
        }
    }

    /// Look a cue up by its wire address.
    pub fn parse(category: &str, key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.category().as_str() == category && c.key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_cue_round_trips_through_its_address() {
        for cue in AudioCue::ALL {
            assert_eq!(AudioCue::parse(cue.category().as_str(), cue.key()), Some(cue));
        }
    }

    #[test]
    fn unknown_address_is_none() {
        assert_eq!(AudioCue::parse("health", "dance"), None);
        assert_eq!(AudioCue::parse("motion", "high_bpm"), None);
    }
}
