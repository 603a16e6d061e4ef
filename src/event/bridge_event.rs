// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge event types.

use crate::dispatch::SyncState;
use crate::state::{Availability, EntityState};
use crate::types::DeviceInstance;

/// Events emitted by the bridge.
///
/// Every event names the device instance it concerns.
///
/// # Examples
///
/// ```
/// use openwb_bridge::event::BridgeEvent;
/// use openwb_bridge::types::{DeviceInstance, DeviceKind};
///
/// let instance = DeviceInstance::new(DeviceKind::PvGenerator, 1, "openWB");
/// let event = BridgeEvent::connected(instance.clone());
/// assert!(event.is_connection());
/// assert_eq!(event.instance(), &instance);
/// ```
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// An instance was added to the bridge.
    InstanceAdded {
        /// The added instance.
        instance: DeviceInstance,
    },

    /// An instance was removed from the bridge.
    InstanceRemoved {
        /// The removed instance.
        instance: DeviceInstance,
    },

    /// The transport of an instance connected or disconnected.
    ConnectionChanged {
        /// The instance.
        instance: DeviceInstance,
        /// Whether the transport is now connected.
        connected: bool,
        /// Error message if the disconnect was caused by an error.
        error: Option<String>,
    },

    /// An entity received a new value.
    StateChanged {
        /// The instance.
        instance: DeviceInstance,
        /// The entity key.
        key: &'static str,
        /// The new entity state.
        state: EntityState,
    },

    /// The sync state of an instance changed.
    SyncChanged {
        /// The instance.
        instance: DeviceInstance,
        /// The new sync state.
        sync: SyncState,
    },

    /// Entities of an instance changed availability without a new value.
    AvailabilityChanged {
        /// The instance.
        instance: DeviceInstance,
        /// The availability the entities moved to.
        availability: Availability,
        /// The entity keys that moved.
        keys: Vec<&'static str>,
    },
}

impl BridgeEvent {
    /// Returns the instance this event concerns.
    #[must_use]
    pub fn instance(&self) -> &DeviceInstance {
        match self {
            Self::InstanceAdded { instance }
            | Self::InstanceRemoved { instance }
            | Self::ConnectionChanged { instance, .. }
            | Self::StateChanged { instance, .. }
            | Self::SyncChanged { instance, .. }
            | Self::AvailabilityChanged { instance, .. } => instance,
        }
    }

    /// Returns `true` if this is a lifecycle event (added/removed).
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::InstanceAdded { .. } | Self::InstanceRemoved { .. })
    }

    /// Returns `true` if this is a connection event.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::ConnectionChanged { .. })
    }

    /// Returns `true` if this is a state change event.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(self, Self::StateChanged { .. })
    }

    /// Creates a connected event.
    #[must_use]
    pub fn connected(instance: DeviceInstance) -> Self {
        Self::ConnectionChanged {
            instance,
            connected: true,
            error: None,
        }
    }

    /// Creates a disconnected event.
    #[must_use]
    pub fn disconnected(instance: DeviceInstance) -> Self {
        Self::ConnectionChanged {
            instance,
            connected: false,
            error: None,
        }
    }

    /// Creates a disconnected event with an error.
    #[must_use]
    pub fn disconnected_with_error(instance: DeviceInstance, error: impl Into<String>) -> Self {
        Self::ConnectionChanged {
            instance,
            connected: false,
            error: Some(error.into()),
        }
    }
}
