// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Address routing for push messages.
//!
//! The [`AddressRouter`] maps concrete push addresses to the dispatchers
//! bound to them. Several instances may listen on the same address (for
//! example two entries sharing one charge template), and one dispatcher
//! usually listens on many addresses. Dispatchers are held weakly, so a
//! removed instance drops out on the next routing attempt.
//!
//! # Architecture
//!
//! ```text
//! Push message: openWB/chargepoint/4/get/power → 4200
//!                     ↓
//!             AddressRouter.route()
//!                     ↓
//!     Lookup "openWB/chargepoint/4/get/power"
//!                     ↓
//!        Weak<UpdateDispatcher>.upgrade()
//!                     ↓
//!     dispatcher.handle_message() → store, events
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::{AddressDelta, UpdateDispatcher};

/// Routes push messages to update dispatchers.
#[derive(Debug, Default)]
pub struct AddressRouter {
    routes: RwLock<HashMap<String, Vec<Weak<UpdateDispatcher>>>>,
}

fn same(weak: &Weak<UpdateDispatcher>, dispatcher: &Arc<UpdateDispatcher>) -> bool {
    std::ptr::eq(weak.as_ptr(), Arc::as_ptr(dispatcher))
}

impl AddressRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dispatcher as a listener of `address`.
    ///
    /// Returns `true` if the address had no listener before, i.e. the caller
    /// needs to subscribe to it.
    pub fn register(&self, address: impl Into<String>, dispatcher: &Arc<UpdateDispatcher>) -> bool {
        let address = address.into();
        let mut routes = self.routes.write();
        let listeners = routes.entry(address.clone()).or_default();
        listeners.retain(|w| w.strong_count() > 0);
        let first = listeners.is_empty();
        if !listeners.iter().any(|w| same(w, dispatcher)) {
            listeners.push(Arc::downgrade(dispatcher));
        }
        tracing::debug!(
            address = %address,
            instance = %dispatcher.instance(),
            first,
            "Registered address"
        );
        first
    }

    /// Removes a dispatcher as a listener of `address`.
    ///
    /// Returns `true` if the address has no listener left, i.e. the caller
    /// should unsubscribe from it.
    pub fn unregister(&self, address: &str, dispatcher: &Arc<UpdateDispatcher>) -> bool {
        let mut routes = self.routes.write();
        let Some(listeners) = routes.get_mut(address) else {
            return false;
        };
        listeners.retain(|w| w.strong_count() > 0 && !same(w, dispatcher));
        if listeners.is_empty() {
            routes.remove(address);
            tracing::debug!(address = %address, "Address has no listeners left");
            true
        } else {
            false
        }
    }

    /// Removes a dispatcher from every address. Returns the addresses left
    /// without listeners.
    pub fn remove(&self, dispatcher: &Arc<UpdateDispatcher>) -> Vec<String> {
        let mut routes = self.routes.write();
        let mut orphaned = Vec::new();
        routes.retain(|address, listeners| {
            listeners.retain(|w| w.strong_count() > 0 && !same(w, dispatcher));
            if listeners.is_empty() {
                orphaned.push(address.clone());
                false
            } else {
                true
            }
        });
        orphaned.sort_unstable();
        orphaned
    }

    /// Hands a message to every dispatcher listening on `topic`.
    ///
    /// Returns the address changes dispatchers requested as a result.
    pub fn route(&self, topic: &str, payload: &str) -> Vec<(Arc<UpdateDispatcher>, AddressDelta)> {
        let listeners: Vec<_> = {
            let routes = self.routes.read();
            match routes.get(topic) {
                Some(listeners) => listeners.iter().filter_map(Weak::upgrade).collect(),
                None => Vec::new(),
            }
        };

        if listeners.is_empty() {
            tracing::trace!(topic = %topic, "No listener for topic");
            return Vec::new();
        }

        listeners
            .into_iter()
            .filter_map(|dispatcher| {
                let outcome = dispatcher.handle_message(topic, payload);
                outcome.rebind.map(|delta| (dispatcher, delta))
            })
            .collect()
    }

    /// Returns every address with at least one listener.
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<_> = self.routes.read().keys().cloned().collect();
        addresses.sort_unstable();
        addresses
    }

    /// Returns the number of routed addresses.
    #[must_use]
    pub fn address_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Drops listeners whose dispatcher no longer exists.
    pub fn cleanup(&self) {
        self.routes.write().retain(|address, listeners| {
            listeners.retain(|w| w.strong_count() > 0);
            let alive = !listeners.is_empty();
            if !alive {
                tracing::debug!(address = %address, "Cleaning up dropped listeners");
            }
            alive
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::state::NotifyPolicy;
    use crate::types::{DeviceInstance, DeviceKind, EntityValue, Transport};

    fn dispatcher(prefix: &str) -> Arc<UpdateDispatcher> {
        Arc::new(UpdateDispatcher::new(
            DeviceInstance::new(DeviceKind::Counter, 0, prefix),
            Transport::Mqtt,
            NotifyPolicy::Always,
            EventBus::new(),
        ))
    }

    fn bind(router: &AddressRouter, d: &Arc<UpdateDispatcher>) {
        for address in d.begin() {
            router.register(address, d);
        }
    }

    #[test]
    fn first_and_last_listener() {
        let router = AddressRouter::new();
        let a = dispatcher("openWB");
        let b = dispatcher("openWB");

        assert!(router.register("openWB/counter/0/get/power", &a));
        assert!(!router.register("openWB/counter/0/get/power", &b));
        assert!(!router.register("openWB/counter/0/get/power", &a));

        assert!(!router.unregister("openWB/counter/0/get/power", &a));
        assert!(router.unregister("openWB/counter/0/get/power", &b));
        assert_eq!(router.address_count(), 0);
        assert!(!router.unregister("openWB/counter/0/get/power", &b));
    }

    #[tokio::test]
    async fn routes_to_every_listener() {
        let router = AddressRouter::new();
        let a = dispatcher("openWB");
        let b = dispatcher("openWB");
        let other = dispatcher("openWB-http");
        bind(&router, &a);
        bind(&router, &b);
        bind(&router, &other);

        router.route("openWB/counter/0/get/power", "-800");

        assert_eq!(a.store().value("power"), Some(EntityValue::Number(-800.0)));
        assert_eq!(b.store().value("power"), Some(EntityValue::Number(-800.0)));
        assert!(other.store().value("power").is_none());
    }

    #[tokio::test]
    async fn remove_reports_orphaned_addresses() {
        let router = AddressRouter::new();
        let a = dispatcher("openWB");
        let b = dispatcher("other");
        bind(&router, &a);
        bind(&router, &b);
        let total = router.address_count();

        let orphaned = router.remove(&a);
        assert!(orphaned.iter().all(|addr| addr.starts_with("openWB/")));
        assert_eq!(router.address_count(), total - orphaned.len());
        assert!(router.addresses().iter().all(|addr| addr.starts_with("other/")));
    }

    #[tokio::test]
    async fn dropped_dispatchers_are_cleaned_up() {
        let router = AddressRouter::new();
        let a = dispatcher("openWB");
        bind(&router, &a);
        assert!(router.address_count() > 0);

        drop(a);
        assert!(router.route("openWB/counter/0/get/power", "1").is_empty());
        router.cleanup();
        assert_eq!(router.address_count(), 0);
    }
}
