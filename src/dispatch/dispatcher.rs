// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-instance update dispatcher.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{AddressDelta, DispatchOutcome, SyncState};
use crate::catalog::{self, AddressParams, EntityDescriptor};
use crate::error::DecodeError;
use crate::event::{BridgeEvent, EventBus};
use crate::state::{Availability, EntityStateStore, NotifyPolicy};
use crate::types::{DeviceInstance, EntityValue, Transport};

/// Resolved push addresses of one instance.
#[derive(Debug)]
struct Bindings {
    params: AddressParams,
    routes: HashMap<String, Vec<&'static EntityDescriptor>>,
}

impl Bindings {
    fn rebuild(&mut self, instance: &DeviceInstance) {
        self.routes.clear();
        for descriptor in catalog::all_entities(instance.kind()) {
            let Some(source) = descriptor.push_source() else {
                continue;
            };
            match catalog::render(descriptor.key(), source.address, &self.params) {
                Ok(address) => self.routes.entry(address).or_default().push(descriptor),
                Err(e) => tracing::debug!(
                    instance = %instance,
                    key = descriptor.key(),
                    error = %e,
                    "Address not resolvable yet"
                ),
            }
        }
    }

    fn addresses(&self) -> BTreeSet<String> {
        self.routes.keys().cloned().collect()
    }
}

#[derive(Debug, Default)]
struct Liveness {
    last_seen: Option<Instant>,
    failures: u32,
}

/// Applies raw transport messages to one instance's entity states.
///
/// A message or fetched document may feed several entities. Each one is
/// decoded on its own, so a malformed value for one key never blocks its
/// siblings. Updates for the same key are applied in the order they are
/// handed to the dispatcher.
///
/// # Sync state
///
/// The dispatcher starts [`SyncState::Uninitialized`], moves to
/// [`SyncState::Syncing`] on [`begin`](Self::begin), and to
/// [`SyncState::Synced`] once every non-optional entity readable on its
/// transport has received a value.
#[derive(Debug)]
pub struct UpdateDispatcher {
    instance: DeviceInstance,
    transport: Transport,
    store: Arc<EntityStateStore>,
    events: EventBus,
    bindings: RwLock<Bindings>,
    sync: watch::Sender<SyncState>,
    received: Mutex<HashSet<&'static str>>,
    liveness: Mutex<Liveness>,
}

impl UpdateDispatcher {
    /// Creates a dispatcher with an empty state store.
    #[must_use]
    pub fn new(
        instance: DeviceInstance,
        transport: Transport,
        policy: NotifyPolicy,
        events: EventBus,
    ) -> Self {
        let params = AddressParams::new(instance.kind(), instance.prefix(), instance.id());
        Self {
            store: Arc::new(EntityStateStore::new(instance.clone(), policy)),
            instance,
            transport,
            events,
            bindings: RwLock::new(Bindings {
                params,
                routes: HashMap::new(),
            }),
            sync: watch::Sender::new(SyncState::Uninitialized),
            received: Mutex::new(HashSet::new()),
            liveness: Mutex::new(Liveness::default()),
        }
    }

    /// Returns the instance.
    #[must_use]
    pub fn instance(&self) -> &DeviceInstance {
        &self.instance
    }

    /// Returns the transport the instance is bound to.
    #[must_use]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Returns the instance's state store.
    #[must_use]
    pub fn store(&self) -> &Arc<EntityStateStore> {
        &self.store
    }

    /// Returns the current sync state.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        *self.sync.borrow()
    }

    /// Subscribes to sync state changes.
    #[must_use]
    pub fn watch_sync(&self) -> watch::Receiver<SyncState> {
        self.sync.subscribe()
    }

    /// Returns the current address parameters, including observed ones.
    #[must_use]
    pub fn params(&self) -> AddressParams {
        self.bindings.read().params.clone()
    }

    /// Returns the resolved push addresses.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.bindings.read().addresses().into_iter().collect()
    }

    /// Starts syncing. Returns the push addresses to subscribe to, which is
    /// empty for pull-bound instances.
    pub fn begin(&self) -> Vec<String> {
        let started = self.sync.send_if_modified(|sync| {
            if *sync == SyncState::Uninitialized {
                *sync = SyncState::Syncing;
                true
            } else {
                false
            }
        });
        if started {
            tracing::debug!(instance = %self.instance, "Syncing");
            self.publish_sync(SyncState::Syncing);
        }
        self.liveness.lock().last_seen = Some(Instant::now());

        if self.transport == Transport::Http {
            return Vec::new();
        }
        let mut bindings = self.bindings.write();
        bindings.rebuild(&self.instance);
        bindings.addresses().into_iter().collect()
    }

    /// Handles one push message.
    ///
    /// Every entity bound to `topic` is decoded independently. When a value
    /// that fills an address placeholder changes, the bindings are resolved
    /// again and the address changes are returned in
    /// [`DispatchOutcome::rebind`].
    pub fn handle_message(&self, topic: &str, payload: &str) -> DispatchOutcome {
        let Some(targets) = self.bindings.read().routes.get(topic).cloned() else {
            return DispatchOutcome::default();
        };

        let now = Instant::now();
        let mut outcome = DispatchOutcome::default();
        let mut updated = Vec::with_capacity(targets.len());
        for descriptor in targets {
            let Some(source) = descriptor.push_source() else {
                continue;
            };
            match source.rule.decode(payload) {
                Ok(Some(value)) => {
                    self.apply(descriptor.key(), value, now);
                    updated.push(descriptor.key());
                }
                Ok(None) => tracing::trace!(
                    instance = %self.instance,
                    key = descriptor.key(),
                    topic = %topic,
                    "No value in payload"
                ),
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        instance = %self.instance,
                        key = descriptor.key(),
                        topic = %topic,
                        error = %e,
                        "Ignoring malformed payload"
                    );
                }
            }
        }

        outcome.applied = updated.len();
        self.after_updates(&updated, now);
        outcome.rebind = self.refresh_parameters(&updated);
        outcome
    }

    /// Handles one fetched pull document, already scoped to the instance.
    ///
    /// Every entity with a field in the document is decoded independently.
    /// A successful fetch also resets the consecutive failure count.
    pub fn handle_document(&self, document: &Value) -> DispatchOutcome {
        self.liveness.lock().failures = 0;

        let now = Instant::now();
        let mut outcome = DispatchOutcome::default();
        let mut updated = Vec::new();
        for descriptor in catalog::all_entities(self.instance.kind()) {
            let Some(field) = descriptor.pull_source() else {
                continue;
            };
            let Some(raw) = document.get(field.field) else {
                continue;
            };
            match field.rule.decode_field(raw) {
                Ok(Some(value)) => {
                    self.apply(descriptor.key(), value, now);
                    updated.push(descriptor.key());
                }
                Ok(None) => {}
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        instance = %self.instance,
                        key = descriptor.key(),
                        field = field.field,
                        error = %e,
                        "Ignoring malformed field"
                    );
                }
            }
        }

        outcome.applied = updated.len();
        tracing::debug!(
            instance = %self.instance,
            applied = outcome.applied,
            failed = outcome.failed,
            "Applied fetched document"
        );
        self.after_updates(&updated, now);
        outcome
    }

    /// Applies the value a pull write echoed back.
    ///
    /// Returns `Ok(true)` if a value was stored.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] if the echo cannot be decoded.
    pub fn apply_echo(
        &self,
        descriptor: &'static EntityDescriptor,
        echoed: &Value,
    ) -> Result<bool, DecodeError> {
        let Some(field) = descriptor.pull_source() else {
            return Ok(false);
        };
        let scale = descriptor
            .pull_command()
            .map(|c| c.echo_scale)
            .filter(|s| (s - 1.0).abs() > f64::EPSILON);
        let raw = match (scale, echoed) {
            (Some(scale), Value::Number(n)) => n.as_f64().map_or_else(|| echoed.clone(), |f| Value::from(f * scale)),
            (Some(scale), Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_or_else(|_| echoed.clone(), |f| Value::from(f * scale)),
            _ => echoed.clone(),
        };

        let Some(value) = field.rule.decode_field(&raw)? else {
            return Ok(false);
        };
        let now = Instant::now();
        self.apply(descriptor.key(), value, now);
        self.after_updates(&[descriptor.key()], now);
        Ok(true)
    }

    /// Marks every available entity stale if the liveness entity has not
    /// been updated within `window`. Returns `true` if anything moved.
    ///
    /// Pull-bound instances are never marked stale this way.
    pub fn check_liveness(&self, now: Instant, window: Duration) -> bool {
        if self.transport != Transport::Mqtt {
            return false;
        }
        let Some(last_seen) = self.liveness.lock().last_seen else {
            return false;
        };
        if now.saturating_duration_since(last_seen) <= window {
            return false;
        }
        let keys = self.store.mark_stale();
        if keys.is_empty() {
            return false;
        }
        tracing::warn!(
            instance = %self.instance,
            window_secs = window.as_secs(),
            "No liveness update, marking entities stale"
        );
        self.publish_availability(Availability::Stale, keys);
        true
    }

    /// Counts a failed poll. Once `threshold` consecutive polls have failed,
    /// every entity becomes unknown. Returns `true` if anything moved.
    pub fn record_poll_failure(&self, threshold: u32) -> bool {
        let failures = {
            let mut liveness = self.liveness.lock();
            liveness.failures = liveness.failures.saturating_add(1);
            liveness.failures
        };
        if failures < threshold {
            return false;
        }
        let keys = self.store.mark_unknown();
        if keys.is_empty() {
            return false;
        }
        tracing::warn!(
            instance = %self.instance,
            failures,
            "Consecutive polls failed, marking entities unknown"
        );
        self.publish_availability(Availability::Unknown, keys);
        true
    }

    /// Returns the number of consecutive failed polls.
    #[must_use]
    pub fn poll_failures(&self) -> u32 {
        self.liveness.lock().failures
    }

    /// Marks every entity unknown, e.g. after the transport was closed.
    pub(crate) fn invalidate(&self) {
        let keys = self.store.mark_unknown();
        if !keys.is_empty() {
            self.publish_availability(Availability::Unknown, keys);
        }
    }

    fn apply(&self, key: &'static str, value: EntityValue, now: Instant) {
        match self.store.set(key, value, now) {
            Ok(Some(state)) => {
                self.events.publish(BridgeEvent::StateChanged {
                    instance: self.instance.clone(),
                    key,
                    state,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::error!(instance = %self.instance, error = %e, "Store rejected update"),
        }
    }

    fn after_updates(&self, updated: &[&'static str], now: Instant) {
        if updated.is_empty() {
            return;
        }

        if updated.contains(&catalog::liveness_key(self.instance.kind())) {
            self.liveness.lock().last_seen = Some(now);
            let restored = self.store.restore_stale();
            if !restored.is_empty() {
                tracing::info!(instance = %self.instance, "Liveness restored");
                self.publish_availability(Availability::Available, restored);
            }
        }

        let complete = {
            let mut received = self.received.lock();
            received.extend(updated.iter().copied());
            mandatory_keys(&self.instance, self.transport).all(|key| received.contains(key))
        };
        if complete {
            let synced = self.sync.send_if_modified(|sync| {
                if *sync == SyncState::Syncing {
                    *sync = SyncState::Synced;
                    true
                } else {
                    false
                }
            });
            if synced {
                tracing::info!(instance = %self.instance, "Synced");
                self.publish_sync(SyncState::Synced);
            }
        }
    }

    fn refresh_parameters(&self, updated: &[&'static str]) -> Option<AddressDelta> {
        if self.transport != Transport::Mqtt {
            return None;
        }
        let affected: Vec<_> = catalog::parameters(self.instance.kind())
            .iter()
            .filter(|binding| updated.contains(&binding.source))
            .collect();
        if affected.is_empty() {
            return None;
        }

        let mut bindings = self.bindings.write();
        let mut changed = Vec::new();
        for binding in affected {
            let value = self
                .store
                .value(binding.source)
                .and_then(|v| v.as_parameter());
            if bindings.params.get(binding.name) == value.as_deref() {
                continue;
            }
            tracing::debug!(
                instance = %self.instance,
                parameter = binding.name,
                value = ?value,
                "Address parameter changed"
            );
            match value {
                Some(v) => bindings.params.insert(binding.name, v),
                None => {
                    bindings.params.remove(binding.name);
                }
            }
            changed.push(binding.name);
        }
        if changed.is_empty() {
            return None;
        }

        let before = bindings.addresses();
        bindings.rebuild(&self.instance);
        let after = bindings.addresses();
        drop(bindings);
        self.forget_dependents(&changed);

        let delta = AddressDelta {
            added: after.difference(&before).cloned().collect(),
            removed: before.difference(&after).cloned().collect(),
        };
        (!delta.is_empty()).then_some(delta)
    }

    /// Clears entities read from an address built on one of `parameters`.
    /// Their values describe the previous target and must not feed a merge
    /// aimed at the new one.
    fn forget_dependents(&self, parameters: &[&'static str]) {
        for descriptor in catalog::all_entities(self.instance.kind()) {
            let Some(source) = descriptor.push_source() else {
                continue;
            };
            if !parameters.iter().any(|p| source.address.uses(p)) {
                continue;
            }
            match self.store.clear(descriptor.key()) {
                Ok(Some(state)) => {
                    tracing::debug!(
                        instance = %self.instance,
                        key = descriptor.key(),
                        "Cleared value of previous address target"
                    );
                    self.events.publish(BridgeEvent::StateChanged {
                        instance: self.instance.clone(),
                        key: descriptor.key(),
                        state,
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::error!(instance = %self.instance, error = %e, "Store rejected clear"),
            }
        }
    }

    fn publish_sync(&self, sync: SyncState) {
        self.events.publish(BridgeEvent::SyncChanged {
            instance: self.instance.clone(),
            sync,
        });
    }

    fn publish_availability(&self, availability: Availability, keys: Vec<&'static str>) {
        self.events.publish(BridgeEvent::AvailabilityChanged {
            instance: self.instance.clone(),
            availability,
            keys,
        });
    }
}

fn mandatory_keys(
    instance: &DeviceInstance,
    transport: Transport,
) -> impl Iterator<Item = &'static str> {
    catalog::all_entities(instance.kind())
        .iter()
        .filter(move |d| !d.is_optional() && d.is_readable(transport))
        .map(EntityDescriptor::key)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{Choice, DeviceKind};

    fn dispatcher(kind: DeviceKind, id: u32, transport: Transport) -> UpdateDispatcher {
        UpdateDispatcher::new(
            DeviceInstance::new(kind, id, "openWB"),
            transport,
            NotifyPolicy::Always,
            EventBus::new(),
        )
    }

    fn value(d: &UpdateDispatcher, key: &str) -> Option<EntityValue> {
        d.store().value(key)
    }

    #[tokio::test]
    async fn begin_subscribes_resolvable_addresses() {
        let d = dispatcher(DeviceKind::ChargePoint, 4, Transport::Mqtt);
        assert_eq!(d.sync_state(), SyncState::Uninitialized);

        let addresses = d.begin();
        assert_eq!(d.sync_state(), SyncState::Syncing);
        assert!(addresses.contains(&"openWB/chargepoint/4/get/power".to_string()));
        assert!(addresses.contains(&"openWB/chargepoint/4/get/connected_vehicle/config".to_string()));
        assert!(addresses.iter().all(|a| !a.contains('{')));
        assert!(!addresses.iter().any(|a| a.contains("vehicle/template")));
    }

    #[tokio::test]
    async fn pull_instances_subscribe_nothing() {
        let d = dispatcher(DeviceKind::Counter, 0, Transport::Http);
        assert!(d.begin().is_empty());
        assert_eq!(d.sync_state(), SyncState::Syncing);
    }

    #[tokio::test]
    async fn one_message_fans_out() {
        let d = dispatcher(DeviceKind::Controller, 0, Transport::Mqtt);
        d.begin();
        let payload = r#"{"timestamp": 1700000000, "grid": 1.5, "house-power": 0.75, "pv-all": -2.0,
            "charging-all": 0, "bat-all-power": 0.1, "bat-all-soc": 55.4}"#;
        let outcome = d.handle_message("openWB/system/lastlivevaluesJson", payload);
        assert_eq!(outcome.applied, 7);
        assert_eq!(outcome.failed, 0);
        assert_eq!(value(&d, "grid"), Some(EntityValue::Number(1500.0)));
        assert_eq!(value(&d, "battery_soc"), Some(EntityValue::Number(55.0)));
    }

    #[tokio::test]
    async fn sibling_failure_is_isolated() {
        let d = dispatcher(DeviceKind::ChargePoint, 4, Transport::Mqtt);
        d.begin();
        let outcome = d.handle_message(
            "openWB/chargepoint/4/get/connected_vehicle/soc",
            r#"{"soc": 64, "range_charged": 120, "timestamp": "later"}"#,
        );
        assert_eq!(outcome.failed, 1);
        assert_eq!(value(&d, "soc"), Some(EntityValue::Number(64.0)));
        assert_eq!(value(&d, "manual_soc"), Some(EntityValue::Number(64.0)));
        assert_eq!(value(&d, "range_charged"), Some(EntityValue::Number(120.0)));
        assert!(value(&d, "soc_timestamp").is_none());
    }

    #[tokio::test]
    async fn malformed_payload_keeps_previous_value() {
        let d = dispatcher(DeviceKind::ChargePoint, 4, Transport::Mqtt);
        d.begin();
        d.handle_message("openWB/chargepoint/4/get/power", "4200");
        let outcome = d.handle_message("openWB/chargepoint/4/get/power", "N/A");
        assert_eq!(outcome.failed, 1);
        assert_eq!(value(&d, "power"), Some(EntityValue::Number(4200.0)));
    }

    #[tokio::test]
    async fn missing_field_leaves_state_unknown() {
        let d = dispatcher(DeviceKind::ChargePoint, 4, Transport::Mqtt);
        d.begin();
        let outcome = d.handle_message("openWB/chargepoint/4/get/connected_vehicle/soc", "{}");
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.failed, 0);
        let state = d.store().get("soc").unwrap();
        assert_eq!(state.availability(), Availability::Unknown);
        assert!(state.value().is_none());
    }

    #[tokio::test]
    async fn same_key_last_write_wins() {
        let d = dispatcher(DeviceKind::Counter, 0, Transport::Mqtt);
        d.begin();
        d.handle_message("openWB/counter/0/get/power", "100");
        d.handle_message("openWB/counter/0/get/power", "-250");
        assert_eq!(value(&d, "power"), Some(EntityValue::Number(-250.0)));
    }

    #[tokio::test]
    async fn order_across_keys_does_not_matter() {
        let messages = [
            ("openWB/counter/0/get/power", "512"),
            ("openWB/counter/0/get/currents", "[1.0,2.0,3.0]"),
        ];
        let forward = dispatcher(DeviceKind::Counter, 0, Transport::Mqtt);
        let backward = dispatcher(DeviceKind::Counter, 0, Transport::Mqtt);
        forward.begin();
        backward.begin();
        for (topic, payload) in messages {
            forward.handle_message(topic, payload);
        }
        for (topic, payload) in messages.iter().rev() {
            backward.handle_message(topic, payload);
        }
        for key in ["power", "currents"] {
            assert_eq!(value(&forward, key), value(&backward, key));
        }
    }

    #[tokio::test]
    async fn template_id_rebinds_record_address() {
        let d = dispatcher(DeviceKind::ChargePoint, 4, Transport::Mqtt);
        d.begin();

        let outcome = d.handle_message(
            "openWB/chargepoint/4/get/connected_vehicle/config",
            r#"{"charge_template": 1, "chargemode": "pv"}"#,
        );
        let delta = outcome.rebind.unwrap();
        assert_eq!(delta.added, ["openWB/vehicle/template/charge_template/1"]);
        assert!(delta.removed.is_empty());
        assert_eq!(
            value(&d, "chargemode"),
            Some(EntityValue::Choice(Choice::Known("pv_charging")))
        );

        // Same template again: nothing to rebind.
        let outcome = d.handle_message(
            "openWB/chargepoint/4/get/connected_vehicle/config",
            r#"{"charge_template": 1, "chargemode": "instant"}"#,
        );
        assert!(outcome.rebind.is_none());

        let outcome = d.handle_message(
            "openWB/chargepoint/4/get/connected_vehicle/config",
            r#"{"charge_template": 2, "chargemode": "instant"}"#,
        );
        let delta = outcome.rebind.unwrap();
        assert_eq!(delta.added, ["openWB/vehicle/template/charge_template/2"]);
        assert_eq!(delta.removed, ["openWB/vehicle/template/charge_template/1"]);

        let outcome = d.handle_message(
            "openWB/vehicle/template/charge_template/2",
            r#"{"chargemode": {"selected": "eco_charging", "instant_charging": {"current": 10}}}"#,
        );
        assert!(outcome.applied >= 2);
        assert_eq!(value(&d, "instant_charging_current"), Some(EntityValue::Number(10.0)));
        assert!(matches!(value(&d, "charge_template_record"), Some(EntityValue::Record(_))));
    }

    #[tokio::test]
    async fn unbound_topics_are_ignored() {
        let d = dispatcher(DeviceKind::Counter, 0, Transport::Mqtt);
        d.begin();
        let outcome = d.handle_message("openWB/counter/1/get/power", "5");
        assert_eq!(outcome, DispatchOutcome::default());
    }

    #[tokio::test]
    async fn syncs_once_mandatory_keys_arrive() {
        let d = dispatcher(DeviceKind::Battery, 1, Transport::Mqtt);
        d.begin();
        let mut sync = d.watch_sync();
        let readings = [
            ("soc", "80"),
            ("power", "-1200"),
            ("imported", "1000"),
            ("exported", "2000"),
            ("daily_imported", "10"),
        ];
        for (key, payload) in readings {
            d.handle_message(&format!("openWB/bat/1/get/{key}"), payload);
        }
        assert_eq!(d.sync_state(), SyncState::Syncing);

        d.handle_message("openWB/bat/1/get/daily_exported", "20");
        d.handle_message("openWB/bat/1/get/fault_state", "0");
        assert_eq!(d.sync_state(), SyncState::Synced);
        assert!(sync.has_changed().unwrap());
        assert_eq!(*sync.borrow_and_update(), SyncState::Synced);
    }

    #[tokio::test]
    async fn pull_document_fans_out() {
        let d = dispatcher(DeviceKind::ChargePoint, 4, Transport::Http);
        d.begin();
        let outcome = d.handle_document(&json!({
            "power": 11000,
            "currents": "3.1,3.2,3.0",
            "plug_state": true,
            "unrelated": 1
        }));
        assert_eq!(outcome.applied, 3);
        assert_eq!(value(&d, "power"), Some(EntityValue::Number(11000.0)));
        assert_eq!(value(&d, "currents"), Some(EntityValue::List(vec![3.1, 3.2, 3.0])));
        assert_eq!(value(&d, "plug_state"), Some(EntityValue::Flag(true)));
    }

    #[tokio::test]
    async fn poll_failures_reach_threshold() {
        let d = dispatcher(DeviceKind::PvGenerator, 1, Transport::Http);
        d.begin();
        d.handle_document(&json!({"power": -3000}));
        assert!(!d.record_poll_failure(3));
        assert!(!d.record_poll_failure(3));
        assert!(d.record_poll_failure(3));
        let power = d.store().get("power").unwrap();
        assert_eq!(power.availability(), Availability::Unknown);
        assert_eq!(power.value(), Some(&EntityValue::Number(3000.0)));

        d.handle_document(&json!({"power": -10}));
        assert_eq!(d.poll_failures(), 0);
        assert!(d.store().get("power").unwrap().is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_marks_stale_and_liveness_restores() {
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let d = UpdateDispatcher::new(
            DeviceInstance::new(DeviceKind::Counter, 0, "openWB"),
            Transport::Mqtt,
            NotifyPolicy::Always,
            events,
        );
        d.begin();
        d.handle_message("openWB/counter/0/get/power", "100");
        d.handle_message("openWB/counter/0/get/imported", "100");

        let window = Duration::from_secs(60);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!d.check_liveness(Instant::now(), window));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(d.check_liveness(Instant::now(), window));
        assert_eq!(d.store().get("imported").unwrap().availability(), Availability::Stale);

        d.handle_message("openWB/counter/0/get/power", "120");
        assert!(d.store().get("imported").unwrap().is_available());

        let mut saw_stale = false;
        let mut saw_restore = false;
        while let Ok(event) = rx.try_recv() {
            if let BridgeEvent::AvailabilityChanged { availability, keys, .. } = event {
                match availability {
                    Availability::Stale => saw_stale = keys.contains(&"imported"),
                    Availability::Available => saw_restore = keys == ["imported"],
                    Availability::Unknown => {}
                }
            }
        }
        assert!(saw_stale);
        assert!(saw_restore);
    }

    #[tokio::test]
    async fn echo_is_scaled_before_decoding() {
        let d = dispatcher(DeviceKind::ChargePoint, 4, Transport::Http);
        let energy = catalog::descriptor(DeviceKind::ChargePoint, "instant_charging_energy_limit_control").unwrap();
        assert!(d.apply_echo(energy, &json!(10)).unwrap());
        assert_eq!(
            value(&d, "instant_charging_energy_limit_control"),
            Some(EntityValue::Number(10.0))
        );

        let lock = catalog::descriptor(DeviceKind::ChargePoint, "manual_lock").unwrap();
        assert!(d.apply_echo(lock, &json!(1)).unwrap());
        assert_eq!(value(&d, "manual_lock"), Some(EntityValue::Flag(true)));
    }
}
