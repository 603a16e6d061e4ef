// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-instance entity state store.

use std::collections::HashMap;

use tokio::sync::watch;
use tokio::time::Instant;

use super::{Availability, EntityState};
use crate::catalog;
use crate::error::CatalogError;
use crate::types::{DeviceInstance, EntityValue};

/// When a successful update notifies subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyPolicy {
    /// Every update notifies, even with an unchanged value.
    #[default]
    Always,
    /// Only updates that change the value or availability notify.
    OnChange,
}

/// The entity states of one device instance.
///
/// One slot exists per catalog entity of the instance's kind. Each slot is a
/// [`watch`] channel, so mutations of the same key are serialized by that
/// slot alone and unrelated keys never contend.
///
/// # Examples
///
/// ```
/// use openwb_bridge::state::{EntityStateStore, NotifyPolicy};
/// use openwb_bridge::types::{DeviceInstance, DeviceKind};
///
/// let store = EntityStateStore::new(
///     DeviceInstance::new(DeviceKind::Counter, 0, "openWB"),
///     NotifyPolicy::Always,
/// );
/// let power = store.get("power").unwrap();
/// assert!(power.value().is_none());
/// assert!(store.get("chargemode").is_err());
/// ```
#[derive(Debug)]
pub struct EntityStateStore {
    instance: DeviceInstance,
    policy: NotifyPolicy,
    slots: HashMap<&'static str, watch::Sender<EntityState>>,
}

impl EntityStateStore {
    /// Creates an empty store for every entity of the instance's kind.
    #[must_use]
    pub fn new(instance: DeviceInstance, policy: NotifyPolicy) -> Self {
        let slots = catalog::all_entities(instance.kind())
            .iter()
            .map(|d| (d.key(), watch::Sender::new(EntityState::default())))
            .collect();
        Self {
            instance,
            policy,
            slots,
        }
    }

    /// Returns the instance this store belongs to.
    #[must_use]
    pub fn instance(&self) -> &DeviceInstance {
        &self.instance
    }

    /// Returns the notification policy.
    #[must_use]
    pub fn policy(&self) -> NotifyPolicy {
        self.policy
    }

    fn slot(&self, key: &str) -> Result<&watch::Sender<EntityState>, CatalogError> {
        self.slots.get(key).ok_or_else(|| CatalogError::UnknownEntity {
            kind: self.instance.kind(),
            key: key.to_string(),
        })
    }

    /// Returns the current state of an entity.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownEntity`] if the kind has no such entity.
    pub fn get(&self, key: &str) -> Result<EntityState, CatalogError> {
        Ok(self.slot(key)?.borrow().clone())
    }

    /// Returns the current value of an entity, if any.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<EntityValue> {
        self.slots
            .get(key)
            .and_then(|slot| slot.borrow().value().cloned())
    }

    /// Subscribes to changes of an entity.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownEntity`] if the kind has no such entity.
    pub fn subscribe(&self, key: &str) -> Result<watch::Receiver<EntityState>, CatalogError> {
        Ok(self.slot(key)?.subscribe())
    }

    /// Stores a decoded value.
    ///
    /// Returns the new state if subscribers were notified under the
    /// store's policy.
    pub(crate) fn set(
        &self,
        key: &str,
        value: EntityValue,
        now: Instant,
    ) -> Result<Option<EntityState>, CatalogError> {
        let slot = self.slot(key)?;
        let policy = self.policy;
        let notified = slot.send_if_modified(|state| {
            let changed = state.update(value, now);
            policy == NotifyPolicy::Always || changed
        });
        Ok(notified.then(|| slot.borrow().clone()))
    }

    /// Forgets the value of one entity. Returns the new state if a value
    /// was dropped.
    pub(crate) fn clear(&self, key: &str) -> Result<Option<EntityState>, CatalogError> {
        let slot = self.slot(key)?;
        let cleared = slot.send_if_modified(EntityState::clear);
        Ok(cleared.then(|| slot.borrow().clone()))
    }

    fn transition_all(&self, from: Availability, to: Availability) -> Vec<&'static str> {
        let mut moved: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.send_if_modified(|state| state.transition(from, to)))
            .map(|(key, _)| *key)
            .collect();
        moved.sort_unstable();
        moved
    }

    /// Marks every available entity stale. Returns the keys that changed.
    pub(crate) fn mark_stale(&self) -> Vec<&'static str> {
        self.transition_all(Availability::Available, Availability::Stale)
    }

    /// Marks every stale entity available again. Returns the keys that changed.
    pub(crate) fn restore_stale(&self) -> Vec<&'static str> {
        self.transition_all(Availability::Stale, Availability::Available)
    }

    /// Marks every entity unknown, keeping the last values. Returns the keys
    /// that changed.
    pub(crate) fn mark_unknown(&self) -> Vec<&'static str> {
        let mut moved = self.transition_all(Availability::Available, Availability::Unknown);
        moved.extend(self.transition_all(Availability::Stale, Availability::Unknown));
        moved.sort_unstable();
        moved
    }

    /// Returns a copy of every entity state.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<&'static str, EntityState> {
        self.slots
            .iter()
            .map(|(key, slot)| (*key, slot.borrow().clone()))
            .collect()
    }
}
