#![no_main]
use libfuzzer_sys::fuzz_target;
use medibox_core::{MedicationSchedule, ScheduleMatcher};

fuzz_target!(|data: (&str, u32)| {
    let (text, minute) = data;
    let Ok(contents) = medibox_config::parse_schedules_json(text) else {
        return;
    };
    let Some(now) = chrono::NaiveDate::from_ymd_opt(2026, 3, 9)
        .and_then(|d| d.and_hms_opt((minute / 60) % 24, minute % 60, 0))
    else {
        return;
    };
    let matcher = ScheduleMatcher::default();
    for record in &contents.records {
        let _ = matcher.matching_times(&MedicationSchedule::from(record), now);
    }
});
