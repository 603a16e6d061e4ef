// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast channel shared by the bridge and every dispatcher.

use tokio::sync::broadcast;

use super::BridgeEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of [`BridgeEvent`]s to any number of host subscribers.
///
/// Clones share one channel, so every dispatcher of a bridge publishes into
/// the same stream. A subscriber that falls more than the capacity behind
/// receives `RecvError::Lagged` and skips ahead; entity values themselves
/// are never lost, since they remain readable from the state store.
///
/// # Examples
///
/// ```
/// use openwb_bridge::event::{BridgeEvent, EventBus};
/// use openwb_bridge::types::{DeviceInstance, DeviceKind};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.publish(BridgeEvent::InstanceAdded {
///     instance: DeviceInstance::new(DeviceKind::Counter, 0, "openWB"),
/// });
/// assert!(rx.try_recv().unwrap().is_lifecycle());
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to 256 events per subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns a receiver for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of live receivers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event and returns how many receivers got it.
    ///
    /// Publishing without subscribers is not an error.
    pub fn publish(&self, event: BridgeEvent) -> usize {
        let instance = event.instance().to_string();
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::trace!(instance, delivered, "Published bridge event");
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceInstance, DeviceKind};

    fn vehicle(id: u32) -> DeviceInstance {
        DeviceInstance::new(DeviceKind::Vehicle, id, "openWB")
    }

    #[test]
    fn publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(BridgeEvent::connected(vehicle(1))), 0);
    }

    #[tokio::test]
    async fn clones_share_one_stream() {
        let bus = EventBus::with_capacity(16);
        let dispatcher_side = bus.clone();
        let mut rx = bus.subscribe();
        let _other = bus.subscribe();

        assert_eq!(
            dispatcher_side.publish(BridgeEvent::InstanceAdded { instance: vehicle(2) }),
            2
        );
        let event = rx.recv().await.unwrap();
        assert!(event.is_lifecycle());
        assert_eq!(event.instance(), &vehicle(2));
    }

    #[tokio::test]
    async fn slow_subscriber_lags() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe();

        for id in 0..4 {
            bus.publish(BridgeEvent::connected(vehicle(id)));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().instance(), &vehicle(2));
    }
}
