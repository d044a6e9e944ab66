use medibox_config::load_toml;
use rstest::rstest;

#[rstest]
#[case("[thresholds]\ntemp_low = 38.0\n", "temp_low must be < thresholds.temp_high")]
#[case("[thresholds]\nbpm_low = 0.0\n", "bpm_low must be in")]
#[case("[thresholds]\nmotion = 0.0\n", "motion must be > 0")]
#[case("[alerts]\ncooldown_s = 0\n", "alerts.cooldown_s must be >= 1")]
#[case("[dispense]\ncooldown_s = 0\n", "dispense.cooldown_s must be >= 1")]
#[case("[dispense]\npoll_interval_s = 0\n", "poll_interval_s must be >= 1")]
#[case("[dispense]\ntolerance_min = 721\n", "tolerance_min must be <= 720")]
#[case(
    "[dispense]\nmorning_start_hour = 12\nmorning_end_hour = 6\n",
    "morning window"
)]
#[case("[servo]\nopen_angle = 181\n", "servo angles must be in [0, 180]")]
#[case("[stepper]\nsteps = 0\n", "stepper.steps must be >= 1")]
#[case("[audio]\nretry_attempts = 0\n", "retry_attempts must be >= 1")]
#[case("[logging]\nrotation = \"weekly\"\n", "rotation must be one of")]
#[case("[broker]\nusername = \"pi\"\n", "must be set together")]
#[case("[topics]\nbpm = \"sensors/gyro\"\n", "topics.bpm duplicates topics.gyro")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "expected {needle:?} in {msg:?}");
}

#[test]
fn accepts_full_config() {
    let toml = r#"
[broker]
host = "localhost"
port = 1884
client_id = "bench"

[topics]
temp = "sensors/temp"

[thresholds]
temp_high = 38.0
temp_low = 34.5
bpm_high = 110
bpm_low = 55
alcohol = 0.2
motion = 4.0

[alerts]
cooldown_s = 10

[dispense]
cooldown_s = 600
poll_interval_s = 30
tolerance_min = 3
advisory_pause_ms = 0
morning_start_hour = 5
morning_end_hour = 11

[servo]
open_angle = 120
close_angle = 10
close_delay_s = 2

[stepper]
steps = 400
direction = "CCW"

[audio]
sounds_dir = "/opt/medibox/sounds"
player = "paplay"

[schedules]
file = "/var/lib/medibox/schedules.json"

[logging]
level = "debug"
rotation = "daily"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.thresholds.bpm_high, 110.0);
    assert_eq!(cfg.topics.temp, "sensors/temp");
    assert_eq!(cfg.topics.gyro, "sensors/gyro");
}

#[test]
fn unknown_direction_is_a_parse_error() {
    assert!(load_toml("[stepper]\ndirection = \"sideways\"\n").is_err());
}

#[test]
fn shipped_samples_are_valid() {
    let cfg = load_toml(include_str!("../../etc/medibox.toml")).expect("parse sample config");
    cfg.validate().expect("sample config validates");
    let schedules = medibox_config::parse_schedules_json(include_str!("../../etc/schedules.json"))
        .expect("parse sample schedules");
    assert!(schedules.rejected.is_empty());
    assert_eq!(schedules.records.len(), 2);
}
