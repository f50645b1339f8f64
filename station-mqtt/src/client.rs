// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Broker client wrapper around [`rumqttc`].
//!
//! [`MqttConnector`] opens one [`BrokerClient`] per worker lifetime. The
//! client carries a randomized id, a retained `offline` last will on the
//! status topic and, once started, a background task driving the rumqttc
//! event loop (keep-alives and transparent reconnects).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{mask_password, Configuration};
use crate::error::ConnectError;
use crate::topic::{status_topic, STATUS_OFFLINE};

const CLIENT_ID_PREFIX: &str = "weewx";
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Pending requests rumqttc buffers between the client handle and the event
/// loop. A full buffer makes [`Publish::publish`] wait, it never drops.
const REQUEST_CAPACITY: usize = 100;

/// Outcome of handing one message to the protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Success,
    Failure(String),
}

impl PublishStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PublishStatus::Success)
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStatus::Success => f.write_str("success"),
            PublishStatus::Failure(reason) => f.write_str(reason),
        }
    }
}

/// Fire-and-forget publishing.
///
/// Resolves once the message is accepted for sending, waiting for room if
/// the client's outgoing buffer is full. Broker acknowledgement is never
/// awaited.
#[async_trait]
pub trait Publish: Send {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, retain: bool) -> PublishStatus;
}

/// A connected broker session whose network loop can be started and stopped.
#[async_trait]
pub trait BrokerSession: Publish {
    async fn start_loop(&mut self);

    async fn stop_loop(&mut self);
}

/// Opens broker sessions for the publishing worker.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: BrokerSession + 'static;

    async fn connect(&self, config: &Configuration) -> Result<Self::Session, ConnectError>;
}

/// `weewx_` followed by 8 hex characters of a fresh random 128-bit value.
pub fn generate_client_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{CLIENT_ID_PREFIX}_{}", &random[..8])
}

/// Connects [`BrokerClient`]s with rumqttc.
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttConnector;

#[async_trait]
impl Connector for MqttConnector {
    type Session = BrokerClient;

    async fn connect(&self, config: &Configuration) -> Result<BrokerClient, ConnectError> {
        BrokerClient::connect(config).await
    }
}

/// Session options: keep-alive, retained `offline` last will on the status
/// topic and, when configured, credentials.
fn mqtt_options(config: &Configuration, client_id: &str) -> MqttOptions {
    let mut mqtt_opts = MqttOptions::new(client_id, &config.host, config.port);
    mqtt_opts.set_keep_alive(KEEP_ALIVE);
    mqtt_opts.set_last_will(LastWill::new(
        status_topic(config.topic_prefix.as_deref()),
        STATUS_OFFLINE,
        QoS::AtMostOnce,
        true,
    ));
    if let Some(credentials) = &config.credentials {
        mqtt_opts.set_credentials(&credentials.user, &credentials.password);
    }
    mqtt_opts
}

/// Connected rumqttc client plus its event loop.
pub struct BrokerClient {
    client_id: String,
    client: AsyncClient,
    /// Held here until [`BrokerSession::start_loop`] moves it into the driver task.
    eventloop: Option<EventLoop>,
    driver: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl BrokerClient {
    /// Connect to the configured broker and wait for its CONNACK.
    ///
    /// Fails on refusal, transport error or timeout. No retry happens here.
    pub async fn connect(config: &Configuration) -> Result<Self, ConnectError> {
        let client_id = generate_client_id();
        let log = config.log;
        log.success(format_args!("Creating MQTT client with id \"{client_id}\""));
        if let Some(credentials) = &config.credentials {
            log.success(format_args!(
                "Using MQTT credentials \"{}\" (password {})",
                credentials.user,
                mask_password(&credentials.password)
            ));
        }

        let (client, mut eventloop) =
            AsyncClient::new(mqtt_options(config, &client_id), REQUEST_CAPACITY);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => return Ok(()),
                    Ok(_) => {}
                    Err(source) => {
                        return Err(ConnectError::Connection {
                            host: config.host.clone(),
                            port: config.port,
                            source,
                        })
                    }
                }
            }
        };

        match tokio::time::timeout(CONNECT_TIMEOUT, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ConnectError::Timeout {
                    host: config.host.clone(),
                    port: config.port,
                })
            }
        }

        info!(
            "[{client_id}] Connected to MQTT broker {}:{}",
            config.host, config.port
        );

        Ok(Self {
            client_id,
            client,
            eventloop: Some(eventloop),
            driver: None,
        })
    }
}

#[async_trait]
impl Publish for BrokerClient {
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, retain: bool) -> PublishStatus {
        match self
            .client
            .publish(topic, QoS::AtMostOnce, retain, payload)
            .await
        {
            Ok(()) => PublishStatus::Success,
            Err(e) => PublishStatus::Failure(e.to_string()),
        }
    }
}

#[async_trait]
impl BrokerSession for BrokerClient {
    async fn start_loop(&mut self) {
        let Some(mut eventloop) = self.eventloop.take() else {
            return;
        };

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let client_id = self.client_id.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = eventloop.poll() => {
                        if let Err(e) = event {
                            warn!("[{client_id}] MQTT eventloop error (will reconnect): {e}");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
            // Dropping the event loop closes the socket without a DISCONNECT,
            // so the broker publishes the retained last will.
        });

        self.driver = Some((shutdown_tx, handle));
    }

    async fn stop_loop(&mut self) {
        if let Some((shutdown_tx, handle)) = self.driver.take() {
            let _ = shutdown_tx.send(());
            if let Err(e) = handle.await {
                warn!("[{}] MQTT eventloop task ended abnormally: {e}", self.client_id);
            }
        }
        self.eventloop = None;
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) {
        if let Some((_, handle)) = self.driver.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::{json, Map, Value};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::record::Record;
    use crate::units::StandardUnits;
    use crate::worker::RecordPublisher;

    /// Minimal broker: accepts one connection, answers the CONNECT with an
    /// accepted CONNACK and then swallows everything it is sent.
    async fn silent_broker() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            if socket.read(&mut buf).await.unwrap_or(0) == 0 {
                return;
            }
            socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });
        port
    }

    #[test]
    fn test_client_id_shape() {
        let id = generate_client_id();
        let (prefix, suffix) = id.split_once('_').unwrap();
        assert_eq!(prefix, "weewx");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_client_ids_differ() {
        assert_ne!(generate_client_id(), generate_client_id());
    }

    #[test]
    fn test_publish_status_display() {
        assert!(PublishStatus::Success.is_success());
        let failure = PublishStatus::Failure("request queue full".into());
        assert!(!failure.is_success());
        assert_eq!(failure.to_string(), "request queue full");
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        // Port 1 on loopback is not expected to run a broker.
        let config = Configuration::builder("127.0.0.1").port(1).build().unwrap();
        let err = match BrokerClient::connect(&config).await {
            Ok(_) => panic!("connect to a closed port succeeded"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("127.0.0.1:1"));
    }

    #[test]
    fn test_options_carry_prefixed_last_will() {
        let config = Configuration::builder("broker")
            .topic_prefix("home")
            .build()
            .unwrap();
        let opts = mqtt_options(&config, "weewx_0123abcd");

        let will = opts.last_will().unwrap();
        assert_eq!(will.topic, "home/connection_status");
        assert_eq!(&will.message[..], b"offline");
        assert!(will.retain);
        assert_eq!(opts.client_id(), "weewx_0123abcd");
        assert_eq!(opts.broker_address(), ("broker".to_string(), 1883));
        assert_eq!(opts.keep_alive(), KEEP_ALIVE);
        assert!(opts.credentials().is_none());
    }

    #[test]
    fn test_options_without_prefix_and_with_credentials() {
        let config = Configuration::builder("broker")
            .port(8883)
            .user("station")
            .password("s3cret")
            .build()
            .unwrap();
        let opts = mqtt_options(&config, "weewx_0123abcd");

        let will = opts.last_will().unwrap();
        assert_eq!(will.topic, "connection_status");
        assert_eq!(&will.message[..], b"offline");
        assert!(will.retain);
        assert_eq!(
            opts.credentials(),
            Some(("station".to_string(), "s3cret".to_string()))
        );
        assert_eq!(opts.broker_address(), ("broker".to_string(), 8883));
    }

    #[tokio::test]
    async fn test_large_record_is_fully_published() {
        let port = silent_broker().await;
        let config = Configuration::builder("127.0.0.1").port(port).build().unwrap();

        let mut client = BrokerClient::connect(&config).await.unwrap();
        client.start_loop().await;

        let mut fields = Map::new();
        for i in 0..150 {
            fields.insert(format!("extraField{i}"), json!(i));
        }
        fields.insert("usUnits".to_string(), json!(1));
        let record = Record::try_from(Value::Object(fields)).unwrap();

        let publisher = RecordPublisher::new(&config, Arc::new(StandardUnits));
        let report = publisher.process_record(&mut client, record).await;

        assert!(report.beacon_ok);
        assert_eq!(report.attempted, 151);
        assert_eq!(report.succeeded, 151);
        assert_eq!(report.failed, 0);

        client.stop_loop().await;
    }
}
