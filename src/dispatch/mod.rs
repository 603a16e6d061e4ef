// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing of raw transport data into entity states.
//!
//! - [`UpdateDispatcher`] - decodes push messages and pull documents for one
//!   instance, tracks its sync state, liveness and indirect addresses
//! - [`AddressRouter`] - maps push addresses to the dispatchers bound to them
//!
//! # Examples
//!
//! ```
//! use openwb_bridge::dispatch::{SyncState, UpdateDispatcher};
//! use openwb_bridge::event::EventBus;
//! use openwb_bridge::state::NotifyPolicy;
//! use openwb_bridge::types::{DeviceInstance, DeviceKind, EntityValue, Transport};
//!
//! let dispatcher = UpdateDispatcher::new(
//!     DeviceInstance::new(DeviceKind::Counter, 0, "openWB"),
//!     Transport::Mqtt,
//!     NotifyPolicy::Always,
//!     EventBus::new(),
//! );
//! let topics = dispatcher.begin();
//! assert!(topics.contains(&"openWB/counter/0/get/power".to_string()));
//!
//! dispatcher.handle_message("openWB/counter/0/get/currents", "[1.5,1.4,1.6]");
//! assert_eq!(
//!     dispatcher.store().value("currents"),
//!     Some(EntityValue::List(vec![1.5, 1.4, 1.6]))
//! );
//! assert_eq!(dispatcher.sync_state(), SyncState::Syncing);
//! ```

mod dispatcher;
mod router;

use std::fmt;

pub use dispatcher::UpdateDispatcher;
pub use router::AddressRouter;

/// Progress of an instance towards a complete initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncState {
    /// Nothing has been requested yet.
    #[default]
    Uninitialized,
    /// Subscriptions or polls are active; mandatory values are outstanding.
    Syncing,
    /// Every mandatory entity has received a value.
    Synced,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
        })
    }
}

/// Push addresses gained and lost after an address parameter changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressDelta {
    /// Addresses to subscribe to.
    pub added: Vec<String>,
    /// Addresses no longer used by the instance.
    pub removed: Vec<String>,
}

impl AddressDelta {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Result of handling one message or document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Entities that received a value.
    pub applied: usize,
    /// Entities whose value could not be decoded.
    pub failed: usize,
    /// Address changes caused by the update.
    pub rebind: Option<AddressDelta>,
}
