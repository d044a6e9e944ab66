//! Simulated link: a transport that logs commands and a sensor feed that
//! publishes plausible payloads on every inbound topic.
//!
//! The feed mixes encodings the way the device firmware does: JSON objects
//! for the 3-axis sensors, bare numbers elsewhere, plain text for the weight
//! status.

use crate::error::HwError;
use crossbeam_channel as xch;
use medibox_config::Topics;
use medibox_traits::{BoxError, InboundMessage, LinkEvent, Transport};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Transport that accepts every command while connected and only logs it.
#[derive(Debug)]
pub struct SimulatedTransport {
    connected: AtomicBool,
    published: AtomicU64,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(true),
            published: AtomicU64::new(0),
        }
    }
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Transport for SimulatedTransport {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BoxError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(Box::new(HwError::NotConnected));
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            topic,
            payload = %String::from_utf8_lossy(payload),
            "command (simulated)"
        );
        Ok(())
    }
}

const WEIGHT_STATES: [&str; 3] = ["stable", "measuring", "overload"];

fn axis3(rng: &mut impl Rng, xy: f64, z: (f64, f64)) -> String {
    serde_json::json!({
        "x": rng.gen_range(-xy..xy),
        "y": rng.gen_range(-xy..xy),
        "z": rng.gen_range(z.0..z.1),
    })
    .to_string()
}

/// One random payload for the named inbound channel, or `None` for names the
/// simulator does not produce.
pub fn sample_payload(name: &str, rng: &mut impl Rng) -> Option<String> {
    let p = match name {
        "gyro" => axis3(rng, 10.0, (-10.0, 10.0)),
        "accel" => axis3(rng, 2.0, (8.0, 12.0)),
        "temp" => format!("{:.2}", rng.gen_range(20.0..35.0)),
        "distance" => format!("{:.2}", rng.gen_range(5.0..200.0)),
        "weight_value" => format!("{:.2}", rng.gen_range(0.0..100.0)),
        "weight_status" => (*WEIGHT_STATES.choose(rng)?).to_owned(),
        "gyro_y" | "gyro_z" => format!("{:.3}", rng.gen_range(-10.0..10.0)),
        "load" => format!("{:.2}", rng.gen_range(0.0..50.0)),
        "bpm" => rng.gen_range(60..=100).to_string(),
        "alcohol" => format!("{:.2}", rng.gen_range(0.0..1000.0)),
        _ => return None,
    };
    Some(p)
}

/// Background thread publishing one payload per simulated topic every
/// `period`, as link events. Connects first, like a real link.
///
/// The thread stops when dropped or when the receiving side goes away.
pub struct SimulatedSensors {
    shutdown: Arc<AtomicBool>,
    wake: Option<xch::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl SimulatedSensors {
    pub fn spawn(
        topics: &Topics,
        period: Duration,
        seed: Option<u64>,
        events: xch::Sender<LinkEvent>,
    ) -> crate::error::Result<Self> {
        let feed: Vec<(&'static str, String)> = topics
            .entries()
            .into_iter()
            .map(|(name, topic)| (name, topic.to_owned()))
            .collect();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let (wake, woken) = xch::bounded::<()>(0);
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let join_handle = std::thread::Builder::new()
            .name("sim-sensors".into())
            .spawn(move || {
                if events.send(LinkEvent::Connected).is_err() {
                    return;
                }
                'feed: loop {
                    if shutdown_clone.load(Ordering::Relaxed) {
                        break;
                    }
                    for (name, topic) in &feed {
                        let Some(payload) = sample_payload(name, &mut rng) else {
                            continue;
                        };
                        let msg = InboundMessage::new(topic.as_str(), payload);
                        if events.send(LinkEvent::Message(msg)).is_err() {
                            tracing::debug!("sensor feed consumer gone, exiting thread");
                            break 'feed;
                        }
                    }
                    match woken.recv_timeout(period) {
                        Err(xch::RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
                tracing::trace!("sensor feed thread exiting cleanly");
            })?;

        Ok(Self {
            shutdown,
            wake: Some(wake),
            join_handle: Some(join_handle),
        })
    }
}

impl Drop for SimulatedSensors {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Disconnect wakes the thread out of its period wait.
        drop(self.wake.take());
        if let Some(handle) = self.join_handle.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "sensor feed thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("gyro")]
    #[case("accel")]
    fn vector_payloads_are_json_objects(#[case] name: &str) {
        let mut rng = StdRng::seed_from_u64(7);
        let p = sample_payload(name, &mut rng).expect("payload");
        let v: serde_json::Value = serde_json::from_str(&p).expect("json");
        for axis in ["x", "y", "z"] {
            assert!(v[axis].is_f64(), "{name} {axis}: {p}");
        }
    }

    #[test]
    fn scalar_payloads_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let bpm: u32 = sample_payload("bpm", &mut rng)
                .and_then(|p| p.parse().ok())
                .expect("bpm");
            assert!((60..=100).contains(&bpm));
            let t: f64 = sample_payload("temp", &mut rng)
                .and_then(|p| p.parse().ok())
                .expect("temp");
            assert!((20.0..=35.0).contains(&t));
        }
        let status = sample_payload("weight_status", &mut rng).expect("status");
        assert!(WEIGHT_STATES.contains(&status.as_str()));
        assert_eq!(sample_payload("servo", &mut rng), None);
    }

    #[test]
    fn disconnected_transport_refuses() {
        let t = SimulatedTransport::new();
        t.publish("actuators/servo", b"90").expect("connected");
        t.set_connected(false);
        let err = t.publish("actuators/servo", b"0").expect_err("down");
        assert!(matches!(
            err.downcast_ref::<HwError>(),
            Some(HwError::NotConnected)
        ));
        assert_eq!(t.published(), 1);
    }
}
