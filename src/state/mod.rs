// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity state tracking.
//!
//! Each device instance owns an [`EntityStateStore`] with one
//! [`EntityState`] per catalog entity. Only the update dispatcher writes to
//! a store; hosts read snapshots or subscribe to per-key change streams.
//!
//! # Examples
//!
//! ```
//! use openwb_bridge::state::{Availability, EntityStateStore, NotifyPolicy};
//! use openwb_bridge::types::{DeviceInstance, DeviceKind};
//!
//! let store = EntityStateStore::new(
//!     DeviceInstance::new(DeviceKind::ChargePoint, 4, "openWB"),
//!     NotifyPolicy::default(),
//! );
//! let rx = store.subscribe("power").unwrap();
//! assert_eq!(rx.borrow().availability(), Availability::Unknown);
//! ```

mod entity_state;
mod store;

pub use entity_state::{Availability, EntityState};
pub use store::{EntityStateStore, NotifyPolicy};
