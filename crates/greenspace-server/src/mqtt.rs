//! MQTT ingress: feeds broker messages into the sensor pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use greenspace_control::SensorService;
use greenspace_store::Store;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, MqttConfig};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Split a broker address into host and port. Accepts an optional
/// `tcp://` or `mqtt://` scheme; the port defaults to 1883.
///
/// # Errors
///
/// Returns `Invalid` for an empty host or a malformed port.
pub fn parse_broker(broker: &str) -> Result<(String, u16), ConfigError> {
    let address = broker
        .strip_prefix("tcp://")
        .or_else(|| broker.strip_prefix("mqtt://"))
        .unwrap_or(broker)
        .trim_end_matches('/');

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("invalid MQTT broker port in {broker:?}")))?;
            (host, port)
        }
        None => (address, 1883),
    };
    if host.is_empty() {
        return Err(ConfigError::Invalid(format!("missing MQTT broker host in {broker:?}")));
    }
    Ok((host.to_string(), port))
}

/// Subscribes to the sensor topic and hands every message to the pipeline.
pub struct MqttIngress<S: Store> {
    options: MqttOptions,
    topic: String,
    sensors: Arc<SensorService<S>>,
    connected: Arc<AtomicBool>,
}

impl<S: Store> MqttIngress<S> {
    /// Create the ingress. `connected` tracks the broker connection.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the broker address can't be parsed.
    pub fn new(
        config: &MqttConfig,
        sensors: Arc<SensorService<S>>,
        connected: Arc<AtomicBool>,
    ) -> Result<Self, ConfigError> {
        let (host, port) = parse_broker(&config.broker)?;
        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }
        Ok(Self {
            options,
            topic: config.topic.clone(),
            sensors,
            connected,
        })
    }

    /// Poll the broker until `cancel` fires. Connection errors are logged
    /// and retried after a delay.
    pub async fn run(self, cancel: CancellationToken) {
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), 64);
        tracing::info!(topic = %self.topic, "MQTT ingress started");

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    self.connected.store(true, Ordering::SeqCst);
                    tracing::info!("Connected to MQTT broker");
                    // Subscriptions don't survive a clean-session reconnect.
                    if let Err(e) = client.try_subscribe(self.topic.as_str(), QoS::AtLeastOnce) {
                        tracing::error!(topic = %self.topic, error = %e, "Failed to subscribe");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.handle(&publish.topic, &publish.payload).await;
                }
                Ok(_) => {}
                Err(e) => {
                    self.connected.store(false, Ordering::SeqCst);
                    tracing::warn!(error = %e, retry_secs = RECONNECT_DELAY.as_secs(), "MQTT connection lost");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        if let Err(e) = client.try_disconnect() {
            tracing::debug!(error = %e, "MQTT disconnect failed");
        }
        tracing::info!("MQTT ingress stopped");
    }

    async fn handle(&self, topic: &str, payload: &[u8]) {
        match self.sensors.handle_raw_message(payload).await {
            Ok(data) => {
                tracing::debug!(topic, sensor_id = %data.sensor_id, "Ingested sensor message");
            }
            Err(e) => {
                tracing::warn!(topic, bytes = payload.len(), error = %e, "Rejected sensor message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_addresses() {
        assert_eq!(parse_broker("localhost:1883").unwrap(), ("localhost".to_string(), 1883));
        assert_eq!(parse_broker("tcp://broker:8883").unwrap(), ("broker".to_string(), 8883));
        assert_eq!(parse_broker("mqtt://broker/").unwrap(), ("broker".to_string(), 1883));
        assert!(parse_broker("broker:http").is_err());
        assert!(parse_broker("tcp://:1883").is_err());
    }
}
