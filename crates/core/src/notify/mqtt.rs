//! MQTT publisher backed by an in-process `rumqttc` client.

use std::time::Duration;

use async_trait::async_trait;
use rfidgate_storage::TagStatus;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Notifier;
use crate::error::NotifyError;

/// Requests buffered between the client handle and the event loop.
const CHANNEL_CAPACITY: usize = 16;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Broker connection and topic settings.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic: "RFID_LOGIN".to_string(),
            client_id: format!("rfidgate-{}", std::process::id()),
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Broker link as seen by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    /// First connection attempt still in flight.
    Connecting,
    Up,
    Down,
}

/// Publishes `"0"`/`"1"` at QoS 0 (at most once), not retained.
///
/// The event loop runs on a background task for the notifier's lifetime.
/// Publishing while the broker link is down fails immediately, and anything
/// still queued when the link drops is discarded, so a reconnect never
/// delivers stale statuses. Before the first connection attempt settles,
/// a publish waits for it; the workflow's timeout bounds that wait.
pub struct MqttNotifier {
    client: AsyncClient,
    topic: String,
    link: watch::Receiver<Link>,
    driver: JoinHandle<()>,
}

impl MqttNotifier {
    /// Create the client and start driving its event loop. Must be called
    /// from within a tokio runtime.
    pub fn spawn(settings: MqttSettings) -> Self {
        let mut options = MqttOptions::new(settings.client_id, settings.host.clone(), settings.port);
        options.set_keep_alive(settings.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, CHANNEL_CAPACITY);
        let (link_tx, link) = watch::channel(Link::Connecting);
        let driver = tokio::spawn(drive_event_loop(
            eventloop,
            link_tx,
            settings.host,
            settings.port,
        ));

        Self {
            client,
            topic: settings.topic,
            link,
            driver,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for MqttNotifier {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn drive_event_loop(
    mut eventloop: EventLoop,
    link: watch::Sender<Link>,
    host: String,
    port: u16,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker {}:{}", host, port);
                link.send_replace(Link::Up);
            }
            Ok(_) => {}
            Err(e) => {
                if link.send_replace(Link::Down) == Link::Down {
                    debug!("MQTT reconnect to {}:{} failed: {}", host, port, e);
                } else {
                    warn!("MQTT connection to {}:{} lost: {}", host, port, e);
                }
                // Statuses queued before the drop are stale by the next connect.
                eventloop.pending.clear();
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn publish(&self, status: TagStatus) -> Result<(), NotifyError> {
        let mut link = self.link.clone();
        let state = *link
            .wait_for(|state| *state != Link::Connecting)
            .await
            .map_err(|_| NotifyError::Client("MQTT event loop stopped".to_string()))?;

        if state == Link::Down {
            return Err(NotifyError::Client("not connected to MQTT broker".to_string()));
        }

        self.client
            .publish(self.topic.clone(), QoS::AtMostOnce, false, status.payload())
            .await
            .map_err(|e| NotifyError::Client(e.to_string()))
    }
}
