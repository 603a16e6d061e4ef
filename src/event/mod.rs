// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-facing notifications.
//!
//! The [`EventBus`] broadcasts [`BridgeEvent`]s: instance lifecycle,
//! transport connection changes, entity updates, sync progress and
//! availability changes. Per-entity streams are also available directly from
//! the state store; the bus is the single place to observe everything.

mod bridge_event;
mod event_bus;

pub use bridge_event::BridgeEvent;
pub use event_bus::EventBus;
