use medibox_core::schedule::{minute_gap, minute_offset};
use medibox_core::{AlertClass, AlertThrottle, DispenseCooldownTracker, TimeOfDay};
use proptest::prelude::*;
use std::time::{Duration, Instant};

proptest! {
    #[test]
    fn alert_throttle_fires_once_inside_window(
        cooldown_ms in 1u64..600_000,
        gap_frac in 0.0f64..1.0,
    ) {
        let cooldown = Duration::from_millis(cooldown_ms);
        // strictly less than the window
        let gap = Duration::from_millis(((cooldown_ms - 1) as f64 * gap_frac) as u64);
        let t = AlertThrottle::new();
        let t0 = Instant::now();
        let first = t.try_fire(&AlertClass::HighTemperature, t0, cooldown);
        let second = t.try_fire(&AlertClass::HighTemperature, t0 + gap, cooldown);
        prop_assert_eq!(u8::from(first) + u8::from(second), 1);
        prop_assert!(t.try_fire(&AlertClass::HighTemperature, t0 + cooldown, cooldown));
    }

    #[test]
    fn dispense_cooldown_permits_once_inside_window(
        cooldown_s in 1u64..3_600,
        gap_s in 0u64..3_600,
    ) {
        prop_assume!(gap_s < cooldown_s);
        let cooldown = Duration::from_secs(cooldown_s);
        let tracker = DispenseCooldownTracker::new();
        let t0 = Instant::now();
        let mut permitted = 0;
        for now in [t0, t0 + Duration::from_secs(gap_s)] {
            if tracker.can_dispense("s", now, cooldown) {
                tracker.record_dispensed("s", now);
                permitted += 1;
            }
        }
        prop_assert_eq!(permitted, 1);
    }

    #[test]
    fn minute_gap_is_symmetric_and_at_most_half_a_day(
        a in 0u8..24, am in 0u8..60, b in 0u8..24, bm in 0u8..60,
    ) {
        let x = TimeOfDay::from_hm(a, am).expect("in range");
        let y = TimeOfDay::from_hm(b, bm).expect("in range");
        let g = minute_gap(x, y);
        prop_assert_eq!(g, minute_gap(y, x));
        prop_assert!(g <= 720);
        prop_assert_eq!(g == 0, x == y);
    }

    #[test]
    fn signed_offset_agrees_with_gap(
        a in 0u8..24, am in 0u8..60, b in 0u8..24, bm in 0u8..60,
    ) {
        let now = TimeOfDay::from_hm(a, am).expect("in range");
        let t = TimeOfDay::from_hm(b, bm).expect("in range");
        let d = minute_offset(now, t);
        prop_assert!(d > -720 && d <= 720);
        prop_assert_eq!(d.unsigned_abs(), minute_gap(now, t));
    }

    #[test]
    fn twelve_hour_and_24_hour_forms_agree(h in 0u8..24, m in 0u8..60) {
        let (h12, suffix) = match h {
            0 => (12, "AM"),
            1..=11 => (h, "AM"),
            12 => (12, "PM"),
            _ => (h - 12, "PM"),
        };
        let a: TimeOfDay = format!("{h12}:{m:02} {suffix}").parse().expect("12h");
        let b: TimeOfDay = format!("{h:02}:{m:02}").parse().expect("24h");
        prop_assert_eq!(a, b);
    }
}
