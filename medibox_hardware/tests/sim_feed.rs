use crossbeam_channel as xch;
use medibox_config::Topics;
use medibox_hardware::SimulatedSensors;
use medibox_traits::LinkEvent;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[test]
fn feed_connects_then_covers_every_sensor_topic() {
    let topics = Topics::default();
    let (tx, rx) = xch::unbounded();
    let feed = SimulatedSensors::spawn(&topics, Duration::from_millis(20), Some(42), tx)
        .expect("spawn");

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).expect("first event"),
        LinkEvent::Connected
    );
    let expected: HashSet<&str> = [
        topics.gyro.as_str(),
        topics.accel.as_str(),
        topics.temp.as_str(),
        topics.distance.as_str(),
        topics.weight_value.as_str(),
        topics.weight_status.as_str(),
        topics.gyro_y.as_str(),
        topics.gyro_z.as_str(),
        topics.load.as_str(),
        topics.bpm.as_str(),
        topics.alcohol.as_str(),
    ]
    .into_iter()
    .collect();
    let mut seen = HashSet::new();
    let deadline = Instant::now() + Duration::from_secs(2);
    while seen.len() < expected.len() && Instant::now() < deadline {
        if let Ok(LinkEvent::Message(m)) = rx.recv_timeout(Duration::from_millis(100)) {
            assert!(expected.contains(m.topic.as_str()), "unexpected {}", m.topic);
            seen.insert(m.topic);
        }
    }
    assert_eq!(seen.len(), expected.len());
    drop(feed);
}

#[test]
fn drop_stops_promptly_even_with_long_period() {
    let (tx, rx) = xch::unbounded();
    let feed = SimulatedSensors::spawn(&Topics::default(), Duration::from_secs(3600), None, tx)
        .expect("spawn");
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(2)).expect("connected"),
        LinkEvent::Connected
    );
    let t0 = Instant::now();
    drop(feed);
    assert!(t0.elapsed() < Duration::from_secs(2));
}
