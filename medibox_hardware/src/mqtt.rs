//! Broker link over MQTT (rumqttc, blocking client).
//!
//! A pump thread drives the connection and turns its notifications into
//! [`LinkEvent`]s on a crossbeam channel: `Connected` on every successful
//! CONNACK (subscriptions are re-issued then), `ConnectFailed` on refusal or
//! connection error, `Message` per inbound publish. rumqttc reconnects on the
//! next poll after an error.

use crate::error::{HwError, Result};
use crossbeam_channel as xch;
use medibox_traits::{BoxError, InboundMessage, LinkEvent, Transport};
use rumqttc::{Client, ConnectReturnCode, Connection, Event, MqttOptions, Outgoing, Packet, QoS};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

const REQUEST_CAPACITY: usize = 64;
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

pub struct MqttLink {
    client: Client,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl MqttLink {
    pub fn connect(
        broker: &medibox_config::Broker,
        subscriptions: Vec<String>,
        events: xch::Sender<LinkEvent>,
    ) -> Result<Self> {
        let mut opts = MqttOptions::new(&broker.client_id, &broker.host, broker.port);
        opts.set_keep_alive(Duration::from_secs(broker.keep_alive_s));
        if let (Some(user), Some(pass)) = (&broker.username, &broker.password) {
            opts.set_credentials(user, pass);
        }
        let (client, connection) = Client::new(opts, REQUEST_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let pump = {
            let client = client.clone();
            let connected = Arc::clone(&connected);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("mqtt-pump".into())
                .spawn(move || pump(connection, &client, &subscriptions, &connected, &shutdown, &events))?
        };
        tracing::info!(host = %broker.host, port = broker.port, "mqtt link started");
        Ok(Self {
            client,
            connected,
            shutdown,
            pump: Some(pump),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

fn pump(
    mut connection: Connection,
    client: &Client,
    subscriptions: &[String],
    connected: &AtomicBool,
    shutdown: &AtomicBool,
    events: &xch::Sender<LinkEvent>,
) {
    for notification in connection.iter() {
        let event = match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected.store(true, Ordering::Release);
                    for topic in subscriptions {
                        if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                            tracing::warn!(topic = %topic, error = %e, "subscribe failed");
                        }
                    }
                    Some(LinkEvent::Connected)
                } else {
                    Some(LinkEvent::ConnectFailed(format!("{:?}", ack.code)))
                }
            }
            Ok(Event::Incoming(Packet::Publish(p))) => Some(LinkEvent::Message(
                InboundMessage::new(p.topic, p.payload.to_vec()),
            )),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.store(false, Ordering::Release);
                break;
            }
            Ok(_) => None,
            Err(e) => {
                if on_link_error(e.to_string(), connected, shutdown, events).is_break() {
                    break;
                }
                std::thread::sleep(RECONNECT_PAUSE);
                None
            }
        };
        if let Some(ev) = event {
            if events.send(ev).is_err() {
                tracing::debug!("link event consumer gone, stopping pump");
                break;
            }
        }
        if shutdown.load(Ordering::Acquire) {
            break;
        }
    }
    tracing::trace!("mqtt pump exiting");
}

/// Mark the link down and report the failure. Breaks when shutting down or
/// when nobody is listening for link events any more.
fn on_link_error(
    reason: String,
    connected: &AtomicBool,
    shutdown: &AtomicBool,
    events: &xch::Sender<LinkEvent>,
) -> ControlFlow<()> {
    connected.store(false, Ordering::Release);
    if shutdown.load(Ordering::Acquire) {
        return ControlFlow::Break(());
    }
    if events.send(LinkEvent::ConnectFailed(reason)).is_err() {
        tracing::debug!("link event consumer gone, stopping pump");
        return ControlFlow::Break(());
    }
    ControlFlow::Continue(())
}

impl Transport for MqttLink {
    fn publish(&self, topic: &str, payload: &[u8]) -> std::result::Result<(), BoxError> {
        if !self.is_connected() {
            return Err(Box::new(HwError::NotConnected));
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e| Box::new(HwError::Publish(e.to_string())) as BoxError)
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Err(e) = self.client.disconnect() {
            tracing::debug!(error = %e, "mqtt disconnect request failed");
        }
        if let Some(handle) = self.pump.take() {
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "mqtt pump panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_error_is_reported_while_someone_listens() {
        let (tx, rx) = xch::unbounded();
        let connected = AtomicBool::new(true);
        let shutdown = AtomicBool::new(false);
        let flow = on_link_error("refused".into(), &connected, &shutdown, &tx);
        assert!(flow.is_continue());
        assert!(!connected.load(Ordering::Acquire));
        assert!(matches!(rx.try_recv(), Ok(LinkEvent::ConnectFailed(r)) if r == "refused"));
    }

    #[test]
    fn link_error_stops_the_pump_once_the_consumer_is_gone() {
        let (tx, rx) = xch::unbounded::<LinkEvent>();
        drop(rx);
        let connected = AtomicBool::new(true);
        let shutdown = AtomicBool::new(false);
        assert!(on_link_error("reset".into(), &connected, &shutdown, &tx).is_break());
        assert!(!connected.load(Ordering::Acquire));
    }

    #[test]
    fn link_error_during_shutdown_stops_without_reporting() {
        let (tx, rx) = xch::unbounded();
        let connected = AtomicBool::new(true);
        let shutdown = AtomicBool::new(true);
        assert!(on_link_error("closed".into(), &connected, &shutdown, &tx).is_break());
        assert!(rx.try_recv().is_err());
    }
}
