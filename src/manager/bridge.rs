// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The bridge that owns instances, their transports and background tasks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, watch};
use tokio::task::JoinHandle;

use crate::command::{CommandTranslator, OutboundWrite};
use crate::dispatch::{SyncState, UpdateDispatcher};
use crate::error::{Error, Result};
use crate::event::{BridgeEvent, EventBus};
#[cfg(feature = "mqtt")]
use crate::protocol::MqttBroker;
#[cfg(feature = "http")]
use crate::protocol::{ApiClient, ApiConfig, Poller};
use crate::state::EntityState;
use crate::types::{CommandValue, DeviceInstance, DeviceKind, Transport};

use super::instance_config::InstanceConfig;

/// The live transport of a connected instance.
#[derive(Clone)]
enum Sender {
    #[cfg(feature = "mqtt")]
    Broker(MqttBroker),
    #[cfg(feature = "http")]
    Api(ApiClient),
}

struct Link {
    sender: Sender,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for Link {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

struct ManagedInstance {
    config: InstanceConfig,
    dispatcher: Arc<UpdateDispatcher>,
    translator: CommandTranslator,
    link: Option<Link>,
}

impl ManagedInstance {
    fn new(config: InstanceConfig, events: EventBus) -> Self {
        let dispatcher = Arc::new(UpdateDispatcher::new(
            config.instance(),
            config.transport(),
            config.notify_policy(),
            events,
        ));
        Self {
            translator: CommandTranslator::new(config.wallbox_power()),
            config,
            dispatcher,
            link: None,
        }
    }
}

/// Coordinates every configured device instance.
///
/// The bridge owns one [`UpdateDispatcher`] per instance, binds it to its
/// transport on [`connect`](Self::connect), and turns host writes into
/// device writes. `Bridge` is cheaply cloneable (via `Arc`).
///
/// # Examples
///
/// ```no_run
/// use openwb_bridge::manager::{Bridge, InstanceConfig};
/// use openwb_bridge::protocol::MqttBroker;
/// use openwb_bridge::types::{ChargeMode, DeviceKind};
///
/// #[tokio::main]
/// async fn main() -> openwb_bridge::Result<()> {
///     let broker = MqttBroker::builder().host("192.168.1.50").build().await?;
///     let bridge = Bridge::with_broker(broker);
///
///     let cp = bridge
///         .add_instance(InstanceConfig::mqtt(DeviceKind::ChargePoint, 4).with_wallbox_power(11))
///         .await?;
///     bridge.connect(&cp).await?;
///
///     bridge.write(&cp, "chargemode_control", ChargeMode::PvCharging).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    instances: RwLock<HashMap<DeviceInstance, ManagedInstance>>,
    events: EventBus,
    #[cfg(feature = "mqtt")]
    broker: Option<MqttBroker>,
}

impl Bridge {
    /// Creates a bridge without a push transport.
    #[must_use]
    pub fn new() -> Self {
        Self::with_events(EventBus::new())
    }

    /// Creates a bridge without a push transport and a custom event bus
    /// capacity.
    #[must_use]
    pub fn with_capacity(event_capacity: usize) -> Self {
        Self::with_events(EventBus::with_capacity(event_capacity))
    }

    fn with_events(events: EventBus) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                instances: RwLock::new(HashMap::new()),
                events,
                #[cfg(feature = "mqtt")]
                broker: None,
            }),
        }
    }

    /// Creates a bridge whose push-bound instances share `broker`.
    #[cfg(feature = "mqtt")]
    #[must_use]
    pub fn with_broker(broker: MqttBroker) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                instances: RwLock::new(HashMap::new()),
                events: EventBus::new(),
                broker: Some(broker),
            }),
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribes to events of every instance.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the number of active event subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.events.subscriber_count()
    }

    // =========================================================================
    // Instance management
    // =========================================================================

    /// Registers an instance. It is not connected automatically.
    ///
    /// # Errors
    ///
    /// - [`Error::InstanceExists`] if an instance with the same title exists
    /// - [`Error::UnsupportedTransport`] for push-only kinds on the pull
    ///   transport
    pub async fn add_instance(&self, config: InstanceConfig) -> Result<DeviceInstance> {
        let instance = config.instance();
        if config.transport() == Transport::Http && instance.kind() == DeviceKind::Vehicle {
            return Err(Error::UnsupportedTransport {
                kind: instance.kind(),
                transport: Transport::Http,
            });
        }

        {
            let mut instances = self.inner.instances.write().await;
            if instances.contains_key(&instance) {
                return Err(Error::InstanceExists(instance.title()));
            }
            instances.insert(
                instance.clone(),
                ManagedInstance::new(config, self.inner.events.clone()),
            );
        }

        tracing::info!(instance = %instance, "Added instance");
        self.inner.events.publish(BridgeEvent::InstanceAdded {
            instance: instance.clone(),
        });
        Ok(instance)
    }

    /// Removes an instance, disconnecting it first.
    ///
    /// Returns `true` if the instance was found and removed.
    pub async fn remove_instance(&self, instance: &DeviceInstance) -> bool {
        if self.is_connected(instance).await {
            let _ = self.disconnect(instance).await;
        }
        let removed = self.inner.instances.write().await.remove(instance).is_some();
        if removed {
            tracing::info!(instance = %instance, "Removed instance");
            self.inner.events.publish(BridgeEvent::InstanceRemoved {
                instance: instance.clone(),
            });
        }
        removed
    }

    /// Returns every registered instance.
    pub async fn instances(&self) -> Vec<DeviceInstance> {
        let mut instances: Vec<_> = self.inner.instances.read().await.keys().cloned().collect();
        instances.sort_by_key(DeviceInstance::title);
        instances
    }

    /// Returns the number of registered instances.
    pub async fn instance_count(&self) -> usize {
        self.inner.instances.read().await.len()
    }

    /// Returns the configuration of an instance.
    pub async fn config(&self, instance: &DeviceInstance) -> Option<InstanceConfig> {
        self.inner
            .instances
            .read()
            .await
            .get(instance)
            .map(|m| m.config.clone())
    }

    /// Returns the dispatcher of an instance.
    pub async fn dispatcher(&self, instance: &DeviceInstance) -> Option<Arc<UpdateDispatcher>> {
        self.inner
            .instances
            .read()
            .await
            .get(instance)
            .map(|m| Arc::clone(&m.dispatcher))
    }

    async fn require(&self, instance: &DeviceInstance) -> Result<Arc<UpdateDispatcher>> {
        self.dispatcher(instance)
            .await
            .ok_or_else(|| Error::InstanceNotFound(instance.title()))
    }

    // =========================================================================
    // Connection management
    // =========================================================================

    /// Binds an instance to its transport and starts its background tasks.
    ///
    /// Push-bound instances subscribe to their addresses on the shared
    /// broker and get a liveness monitor. Pull-bound instances get a poller
    /// whose first fetch runs immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is not found, no transport is
    /// available for it, or binding fails.
    pub async fn connect(&self, instance: &DeviceInstance) -> Result<()> {
        let (config, dispatcher) = {
            let instances = self.inner.instances.read().await;
            let managed = instances
                .get(instance)
                .ok_or_else(|| Error::InstanceNotFound(instance.title()))?;
            if managed.link.is_some() {
                return Ok(());
            }
            (managed.config.clone(), Arc::clone(&managed.dispatcher))
        };

        let result = self.open_link(&config, &dispatcher).await;

        match result {
            Ok(link) => {
                let mut instances = self.inner.instances.write().await;
                let managed = instances
                    .get_mut(instance)
                    .ok_or_else(|| Error::InstanceNotFound(instance.title()))?;
                if managed.link.is_some() {
                    // Another connect won. Its routes are the same, so dropping
                    // this link only stops the duplicate tasks.
                    drop(instances);
                    drop(link);
                    tracing::debug!(instance = %instance, "Discarded concurrent connection");
                    return Ok(());
                }
                managed.link = Some(link);
                drop(instances);

                tracing::info!(instance = %instance, transport = %config.transport(), "Connected");
                self.inner
                    .events
                    .publish(BridgeEvent::connected(instance.clone()));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(instance = %instance, error = %e, "Connection failed");
                self.inner.events.publish(BridgeEvent::disconnected_with_error(
                    instance.clone(),
                    e.to_string(),
                ));
                Err(e)
            }
        }
    }

    async fn open_link(
        &self,
        config: &InstanceConfig,
        dispatcher: &Arc<UpdateDispatcher>,
    ) -> Result<Link> {
        match config.transport() {
            Transport::Mqtt => self.open_push(config, dispatcher).await,
            Transport::Http => self.open_pull(config, dispatcher),
        }
    }

    #[cfg(feature = "mqtt")]
    async fn open_push(
        &self,
        config: &InstanceConfig,
        dispatcher: &Arc<UpdateDispatcher>,
    ) -> Result<Link> {
        let broker = self.inner.broker.clone().ok_or(Error::NotConnected)?;
        broker.bind(dispatcher).await?;
        let monitor = super::liveness::spawn_liveness_monitor(
            Arc::downgrade(dispatcher),
            config.liveness_window(),
        );
        Ok(Link {
            sender: Sender::Broker(broker),
            tasks: vec![monitor],
        })
    }

    #[cfg(not(feature = "mqtt"))]
    #[allow(clippy::unused_async, clippy::unused_self)]
    async fn open_push(
        &self,
        _config: &InstanceConfig,
        _dispatcher: &Arc<UpdateDispatcher>,
    ) -> Result<Link> {
        Err(Error::NotConnected)
    }

    #[cfg(feature = "http")]
    #[allow(clippy::unused_self)]
    fn open_pull(&self, config: &InstanceConfig, dispatcher: &Arc<UpdateDispatcher>) -> Result<Link> {
        let mut api = ApiConfig::new(config.api_url().unwrap_or_default())
            .with_timeout(config.request_timeout());
        if let Some(token) = config.api_token() {
            api = api.with_token(token);
        }
        let client = api.into_client()?;
        let poller = Poller::new(
            client.clone(),
            Arc::clone(dispatcher),
            config.poll_interval(),
            config.failure_threshold(),
        )
        .ok_or(Error::UnsupportedTransport {
            kind: dispatcher.instance().kind(),
            transport: Transport::Http,
        })?;
        Ok(Link {
            sender: Sender::Api(client),
            tasks: vec![poller.spawn()],
        })
    }

    #[cfg(not(feature = "http"))]
    #[allow(clippy::unused_self)]
    fn open_pull(&self, _config: &InstanceConfig, _dispatcher: &Arc<UpdateDispatcher>) -> Result<Link> {
        Err(Error::NotConnected)
    }

    /// Stops an instance's transport and background tasks. Every entity
    /// becomes unknown; last values are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is not found.
    pub async fn disconnect(&self, instance: &DeviceInstance) -> Result<()> {
        let (link, dispatcher) = {
            let mut instances = self.inner.instances.write().await;
            let managed = instances
                .get_mut(instance)
                .ok_or_else(|| Error::InstanceNotFound(instance.title()))?;
            (managed.link.take(), Arc::clone(&managed.dispatcher))
        };

        let Some(link) = link else {
            return Ok(());
        };
        #[cfg(feature = "mqtt")]
        if let Sender::Broker(broker) = &link.sender {
            broker.unbind(&dispatcher).await;
        }
        drop(link);
        dispatcher.invalidate();

        tracing::info!(instance = %instance, "Disconnected");
        self.inner
            .events
            .publish(BridgeEvent::disconnected(instance.clone()));
        Ok(())
    }

    /// Returns `true` if the instance is bound to its transport.
    pub async fn is_connected(&self, instance: &DeviceInstance) -> bool {
        self.inner
            .instances
            .read()
            .await
            .get(instance)
            .is_some_and(|m| m.link.is_some())
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Returns the current state of one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance or the entity is unknown.
    pub async fn state(&self, instance: &DeviceInstance, key: &str) -> Result<EntityState> {
        Ok(self.require(instance).await?.store().get(key)?)
    }

    /// Returns the current state of every entity of an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is unknown.
    pub async fn snapshot(
        &self,
        instance: &DeviceInstance,
    ) -> Result<HashMap<&'static str, EntityState>> {
        Ok(self.require(instance).await?.store().snapshot())
    }

    /// Watches one entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance or the entity is unknown.
    pub async fn watch(
        &self,
        instance: &DeviceInstance,
        key: &str,
    ) -> Result<watch::Receiver<EntityState>> {
        Ok(self.require(instance).await?.store().subscribe(key)?)
    }

    /// Returns the sync state of an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is unknown.
    pub async fn sync_state(&self, instance: &DeviceInstance) -> Result<SyncState> {
        Ok(self.require(instance).await?.sync_state())
    }

    /// Watches the sync state of an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is unknown.
    pub async fn watch_sync(&self, instance: &DeviceInstance) -> Result<watch::Receiver<SyncState>> {
        Ok(self.require(instance).await?.watch_sync())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Writes a value to an entity.
    ///
    /// The write is sent once and not confirmed; the new value arrives
    /// through the regular update path. A pull API response that echoes the
    /// value is applied right away. For `connected_vehicle`, a configured
    /// vehicle name is accepted in place of its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is unknown or not connected, the
    /// write cannot be translated (see
    /// [`CommandTranslator::translate`]), or the transport rejects it.
    pub async fn write(
        &self,
        instance: &DeviceInstance,
        key: &str,
        value: impl Into<CommandValue>,
    ) -> Result<()> {
        let (dispatcher, translator, sender, value) = {
            let instances = self.inner.instances.read().await;
            let managed = instances
                .get(instance)
                .ok_or_else(|| Error::InstanceNotFound(instance.title()))?;
            let sender = managed.link.as_ref().map(|l| l.sender.clone());
            let value = resolve_vehicle(&managed.config, key, value.into());
            (
                Arc::clone(&managed.dispatcher),
                managed.translator,
                sender,
                value,
            )
        };

        let sender = sender.ok_or(Error::NotConnected)?;
        let write = translator.translate(&dispatcher, key, &value)?;
        send(&sender, &dispatcher, key, &write).await
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Bridge");
        debug.field("subscribers", &self.inner.events.subscriber_count());
        #[cfg(feature = "mqtt")]
        debug.field("broker", &self.inner.broker);
        debug.finish_non_exhaustive()
    }
}

fn resolve_vehicle(config: &InstanceConfig, key: &str, value: CommandValue) -> CommandValue {
    if key != "connected_vehicle" {
        return value;
    }
    let id = match &value {
        CommandValue::Choice(name) | CommandValue::Text(name) => config.vehicle_id(name),
        _ => None,
    };
    id.map_or(value, |id| CommandValue::Number(f64::from(id)))
}

#[allow(clippy::unused_async)]
async fn send(
    sender: &Sender,
    dispatcher: &UpdateDispatcher,
    key: &str,
    write: &OutboundWrite,
) -> Result<()> {
    match (sender, write) {
        #[cfg(feature = "mqtt")]
        (Sender::Broker(broker), OutboundWrite::Publish { topic, payload }) => {
            broker.publish(topic, payload).await?;
            Ok(())
        }
        #[cfg(feature = "http")]
        (Sender::Api(client), OutboundWrite::Submit { command, .. }) => {
            let response = client.submit(write).await?;
            if let Some(echoed) = crate::protocol::echoed_value(&response, command) {
                let descriptor = crate::catalog::descriptor(dispatcher.instance().kind(), key)?;
                // The write went through; a bad echo only costs the early update.
                if let Err(e) = dispatcher.apply_echo(descriptor, echoed) {
                    tracing::warn!(
                        instance = %dispatcher.instance(),
                        key,
                        error = %e,
                        "Ignoring undecodable echo of accepted write"
                    );
                }
            }
            Ok(())
        }
        _ => {
            tracing::error!(
                instance = %dispatcher.instance(),
                key,
                "Write does not match the bound transport"
            );
            Err(Error::NotConnected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::parse_vehicles;
    use crate::state::Availability;

    #[tokio::test]
    async fn add_and_remove() {
        let bridge = Bridge::new();
        let mut events = bridge.subscribe();

        let cp = bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::ChargePoint, 4))
            .await
            .unwrap();
        assert_eq!(bridge.instances().await, vec![cp.clone()]);
        assert!(matches!(
            events.recv().await.unwrap(),
            BridgeEvent::InstanceAdded { .. }
        ));

        assert!(bridge.remove_instance(&cp).await);
        assert!(!bridge.remove_instance(&cp).await);
        assert!(matches!(
            events.recv().await.unwrap(),
            BridgeEvent::InstanceRemoved { .. }
        ));
        assert_eq!(bridge.instance_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_instance_is_rejected() {
        let bridge = Bridge::new();
        bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::Counter, 0))
            .await
            .unwrap();
        let err = bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::Counter, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InstanceExists(title) if title == "openWB-counter-0"));

        bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::Counter, 0).with_prefix("other"))
            .await
            .unwrap();
        assert_eq!(bridge.instance_count().await, 2);
    }

    #[tokio::test]
    async fn vehicles_are_push_only() {
        let bridge = Bridge::new();
        let err = bridge
            .add_instance(InstanceConfig::http(DeviceKind::Vehicle, 1, "http://openwb/api"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedTransport { .. }));
    }

    #[tokio::test]
    async fn state_before_connect() {
        let bridge = Bridge::new();
        let bat = bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::Battery, 1))
            .await
            .unwrap();

        let soc = bridge.state(&bat, "soc").await.unwrap();
        assert_eq!(soc.availability(), Availability::Unknown);
        assert!(soc.value().is_none());
        assert_eq!(bridge.sync_state(&bat).await.unwrap(), SyncState::Uninitialized);
        assert!(matches!(
            bridge.state(&bat, "chargemode").await,
            Err(Error::Catalog(_))
        ));

        let unknown = DeviceInstance::new(DeviceKind::Battery, 9, "openWB");
        assert!(matches!(
            bridge.state(&unknown, "soc").await,
            Err(Error::InstanceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn write_requires_connection() {
        let bridge = Bridge::new();
        let cp = bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::ChargePoint, 4))
            .await
            .unwrap();
        let err = bridge.write(&cp, "manual_lock", true).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[cfg(feature = "mqtt")]
    #[tokio::test]
    async fn push_connect_without_broker_fails() {
        let bridge = Bridge::new();
        let mut events = bridge.subscribe();
        let cp = bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::ChargePoint, 4))
            .await
            .unwrap();
        let _ = events.recv().await;

        assert!(matches!(bridge.connect(&cp).await, Err(Error::NotConnected)));
        assert!(!bridge.is_connected(&cp).await);
        match events.recv().await.unwrap() {
            BridgeEvent::ConnectionChanged { connected, error, .. } => {
                assert!(!connected);
                assert!(error.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn vehicle_names_become_ids() {
        let config = InstanceConfig::mqtt(DeviceKind::ChargePoint, 4)
            .with_vehicles(parse_vehicles("0=Standard-Fahrzeug, 1=Van").unwrap());

        assert_eq!(
            resolve_vehicle(&config, "connected_vehicle", CommandValue::Choice("Van".into())),
            CommandValue::Number(1.0)
        );
        assert_eq!(
            resolve_vehicle(&config, "connected_vehicle", CommandValue::Choice("Bike".into())),
            CommandValue::Choice("Bike".into())
        );
        assert_eq!(
            resolve_vehicle(&config, "chargemode_control", CommandValue::Choice("Van".into())),
            CommandValue::Choice("Van".into())
        );
    }
}
