// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared MQTT broker connection.
//!
//! One [`MqttBroker`] serves every push-bound instance. Each bound
//! [`UpdateDispatcher`] registers its resolved addresses with the broker's
//! [`AddressRouter`]; the broker subscribes to an address when its first
//! listener appears and unsubscribes when the last one leaves. Address
//! changes requested by incoming messages are applied by one worker task
//! per broker, in the order the messages arrived.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use openwb_bridge::dispatch::UpdateDispatcher;
//! use openwb_bridge::event::EventBus;
//! use openwb_bridge::protocol::MqttBroker;
//! use openwb_bridge::state::NotifyPolicy;
//! use openwb_bridge::types::{DeviceInstance, DeviceKind, Transport};
//!
//! # async fn example() -> openwb_bridge::Result<()> {
//! let broker = MqttBroker::builder()
//!     .host("192.168.1.50")
//!     .credentials("user", "password")
//!     .build()
//!     .await?;
//!
//! let dispatcher = Arc::new(UpdateDispatcher::new(
//!     DeviceInstance::new(DeviceKind::ChargePoint, 4, "openWB"),
//!     Transport::Mqtt,
//!     NotifyPolicy::Always,
//!     EventBus::new(),
//! ));
//! broker.bind(&dispatcher).await?;
//!
//! broker.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, oneshot};

use crate::dispatch::{AddressDelta, AddressRouter, UpdateDispatcher};
use crate::error::ProtocolError;

const DEFAULT_CLIENT_PREFIX: &str = "openwb_bridge";

/// Requests that may queue before the event loop drains them.
const REQUEST_CAPACITY: usize = 64;

/// Connection settings of the shared broker session.
#[derive(Debug, Clone)]
pub struct MqttBrokerConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    client_prefix: String,
    keep_alive: Duration,
    connection_timeout: Duration,
}

impl MqttBrokerConfig {
    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns how long `build` waits for the broker to accept the session.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Session options with a fresh client id, so two bridges on one broker
    /// never take over each other's session.
    fn session_options(&self) -> MqttOptions {
        let client_id = format!("{}_{}", self.client_prefix, uuid::Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        if let Some((user, password)) = &self.credentials {
            options.set_credentials(user, password);
        }
        options
    }
}

impl Default for MqttBrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            client_prefix: DEFAULT_CLIENT_PREFIX.to_string(),
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

/// An MQTT broker connection shared by every push-bound instance.
///
/// `MqttBroker` is cheaply cloneable (via `Arc`).
#[derive(Clone)]
pub struct MqttBroker {
    inner: Arc<MqttBrokerInner>,
}

struct MqttBrokerInner {
    client: AsyncClient,
    router: Arc<AddressRouter>,
    config: MqttBrokerConfig,
    connected: AtomicBool,
    rebinds: mpsc::UnboundedSender<Rebind>,
}

type Rebind = (Arc<UpdateDispatcher>, AddressDelta);

impl MqttBroker {
    /// Starts configuring a broker session.
    #[must_use]
    pub fn builder() -> MqttBrokerBuilder {
        MqttBrokerBuilder::default()
    }

    /// Returns `true` while the broker session is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        self.inner.config.host()
    }

    /// Broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port()
    }

    /// Returns `true` if the session logs in with a user name.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.inner.config.credentials.is_some()
    }

    fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::Release);
    }

    /// Returns the router that maps addresses to dispatchers.
    #[must_use]
    pub fn router(&self) -> &Arc<AddressRouter> {
        &self.inner.router
    }

    /// Starts syncing a dispatcher and subscribes to its addresses.
    ///
    /// Addresses that already have a listener are not subscribed again; the
    /// broker delivers retained values only on the first subscription, so a
    /// second instance on a shared address receives the next update.
    ///
    /// Returns the number of new subscriptions.
    ///
    /// # Errors
    ///
    /// Returns error if a subscription request cannot be queued.
    pub async fn bind(&self, dispatcher: &Arc<UpdateDispatcher>) -> Result<usize, ProtocolError> {
        let mut subscribed = 0;
        for address in dispatcher.begin() {
            if self.inner.router.register(address.clone(), dispatcher) {
                self.subscribe(&address).await?;
                subscribed += 1;
            }
        }
        tracing::info!(
            instance = %dispatcher.instance(),
            subscribed,
            "Bound instance to MQTT broker"
        );
        Ok(subscribed)
    }

    /// Removes a dispatcher and unsubscribes from addresses nobody else
    /// listens on.
    pub async fn unbind(&self, dispatcher: &Arc<UpdateDispatcher>) {
        let orphaned = self.inner.router.remove(dispatcher);
        for address in &orphaned {
            self.unsubscribe(address).await;
        }
        tracing::debug!(
            instance = %dispatcher.instance(),
            unsubscribed = orphaned.len(),
            "Unbound instance from MQTT broker"
        );
    }

    /// Applies an address change requested by a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns error if a subscription request cannot be queued.
    pub async fn rebind(
        &self,
        dispatcher: &Arc<UpdateDispatcher>,
        delta: AddressDelta,
    ) -> Result<(), ProtocolError> {
        for address in &delta.removed {
            if self.inner.router.unregister(address, dispatcher) {
                self.unsubscribe(address).await;
            }
        }
        for address in delta.added {
            if self.inner.router.register(address.clone(), dispatcher) {
                self.subscribe(&address).await?;
            }
        }
        Ok(())
    }

    /// Publishes a write at QoS 1 without the retain flag.
    ///
    /// # Errors
    ///
    /// Returns error if the publish request cannot be queued.
    pub async fn publish(&self, topic: &str, payload: &str) -> Result<(), ProtocolError> {
        if !self.is_connected() {
            return Err(ProtocolError::ConnectionFailed(
                "MQTT broker is not connected".to_string(),
            ));
        }
        tracing::debug!(topic = %topic, payload = %payload, "Publishing MQTT write");
        self.inner
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(ProtocolError::Mqtt)
    }

    async fn subscribe(&self, address: &str) -> Result<(), ProtocolError> {
        self.inner
            .client
            .subscribe(address, QoS::AtLeastOnce)
            .await
            .map_err(ProtocolError::Mqtt)?;
        tracing::debug!(address = %address, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, address: &str) {
        if let Err(e) = self.inner.client.unsubscribe(address).await {
            tracing::warn!(address = %address, error = %e, "Failed to unsubscribe");
        } else {
            tracing::debug!(address = %address, "Unsubscribed");
        }
    }

    /// Routes an incoming message and queues any requested rebinds.
    ///
    /// Rebinds are not applied here: subscribing from inside the event loop
    /// would wait on the loop that has to drain the request.
    fn route_message(&self, topic: &str, payload: &str) {
        for rebind in self.inner.router.route(topic, payload) {
            if self.inner.rebinds.send(rebind).is_err() {
                tracing::error!(topic = %topic, "Rebind worker has stopped");
            }
        }
    }

    /// Creates the client and starts the rebind worker. The session opens
    /// once the returned event loop is polled.
    fn start(config: MqttBrokerConfig) -> (Self, EventLoop) {
        let (client, event_loop) = AsyncClient::new(config.session_options(), REQUEST_CAPACITY);
        let (rebinds, queue) = mpsc::unbounded_channel();
        let broker = Self {
            inner: Arc::new(MqttBrokerInner {
                client,
                router: Arc::new(AddressRouter::new()),
                config,
                connected: AtomicBool::new(false),
                rebinds,
            }),
        };
        tokio::spawn(apply_rebinds(queue, Arc::downgrade(&broker.inner)));
        (broker, event_loop)
    }

    /// Ends the broker session. Routed addresses are kept, so instances
    /// still bound must be unbound by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Mqtt`] if the request cannot be queued.
    pub async fn disconnect(&self) -> Result<(), ProtocolError> {
        self.inner.client.disconnect().await?;
        self.set_connected(false);
        tracing::info!(
            host = self.host(),
            routed = self.inner.router.address_count(),
            "Closed MQTT session"
        );
        Ok(())
    }
}

impl fmt::Debug for MqttBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttBroker")
            .field("address", &format_args!("{}:{}", self.host(), self.port()))
            .field("connected", &self.is_connected())
            .field("routed", &self.inner.router.address_count())
            .finish_non_exhaustive()
    }
}

/// Configures and opens an [`MqttBroker`] session.
///
/// Only the host is required.
///
/// ```no_run
/// use std::time::Duration;
///
/// use openwb_bridge::protocol::MqttBroker;
///
/// # async fn example() -> openwb_bridge::Result<()> {
/// let broker = MqttBroker::builder()
///     .host("openwb.local")
///     .credentials("openwb", "secret")
///     .client_prefix("garage")
///     .connection_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MqttBrokerBuilder {
    config: MqttBrokerConfig,
}

impl MqttBrokerBuilder {
    /// Broker host name or IP address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Broker port, 1883 unless set.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// User name and password for the session.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((user.into(), password.into()));
        self
    }

    /// Prefix of the generated client id.
    #[must_use]
    pub fn client_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.client_prefix = prefix.into();
        self
    }

    /// MQTT keep-alive, 30 seconds unless set.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    /// Time allowed for the broker to accept the session, 10 seconds unless
    /// set.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Opens the session and waits for the broker to accept it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidAddress`] without a host, and
    /// [`ProtocolError::ConnectionFailed`] if the broker does not accept the
    /// session in time.
    pub async fn build(self) -> Result<MqttBroker, ProtocolError> {
        let config = self.config;
        if config.host.trim().is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "no MQTT broker host configured".to_string(),
            ));
        }

        let (broker, event_loop) = MqttBroker::start(config);
        let client_id = event_loop.mqtt_options.client_id();

        let (accepted_tx, accepted_rx) = oneshot::channel();
        tokio::spawn(drive_event_loop(event_loop, broker.clone(), accepted_tx));

        let timeout = broker.inner.config.connection_timeout();
        match tokio::time::timeout(timeout, accepted_rx).await {
            Ok(Ok(())) => {
                broker.set_connected(true);
                tracing::info!(
                    host = broker.host(),
                    port = broker.port(),
                    client_id,
                    "Opened MQTT session"
                );
                Ok(broker)
            }
            Ok(Err(_)) => Err(ProtocolError::ConnectionFailed(format!(
                "{}:{} closed the session before accepting it",
                broker.host(),
                broker.port()
            ))),
            Err(_) => Err(ProtocolError::ConnectionFailed(format!(
                "{}:{} did not accept the session within {timeout:?}",
                broker.host(),
                broker.port()
            ))),
        }
    }
}

/// Applies queued rebinds one at a time until the broker is dropped.
async fn apply_rebinds(mut queue: mpsc::UnboundedReceiver<Rebind>, inner: Weak<MqttBrokerInner>) {
    while let Some((dispatcher, delta)) = queue.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let broker = MqttBroker { inner };
        if let Err(e) = broker.rebind(&dispatcher, delta).await {
            tracing::warn!(
                instance = %dispatcher.instance(),
                error = %e,
                "Failed to rebind addresses"
            );
        }
    }
    tracing::trace!("Rebind worker stopped");
}

/// Polls the session until it ends, routing every incoming publish.
async fn drive_event_loop(
    mut event_loop: EventLoop,
    broker: MqttBroker,
    accepted: oneshot::Sender<()>,
) {
    let mut accepted = Some(accepted);
    loop {
        let event = match event_loop.poll().await {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(host = broker.host(), error = %e, "MQTT session failed");
                break;
            }
        };
        let Event::Incoming(packet) = event else {
            continue;
        };
        match packet {
            Packet::ConnAck(ack) => {
                tracing::debug!(code = ?ack.code, "MQTT session accepted");
                broker.set_connected(true);
                if let Some(tx) = accepted.take() {
                    let _ = tx.send(());
                }
            }
            Packet::SubAck(ack) => {
                tracing::trace!(pkid = ack.pkid, "Subscription acknowledged");
            }
            Packet::Publish(message) => match std::str::from_utf8(&message.payload) {
                Ok(payload) => {
                    tracing::trace!(topic = %message.topic, payload, "Received");
                    broker.route_message(&message.topic, payload);
                }
                Err(e) => {
                    tracing::warn!(topic = %message.topic, error = %e, "Dropping non UTF-8 payload");
                }
            },
            Packet::Disconnect => {
                tracing::info!(host = broker.host(), "Broker closed the MQTT session");
                break;
            }
            _ => {}
        }
    }
    broker.set_connected(false);
}
