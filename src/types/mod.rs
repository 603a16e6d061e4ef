// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the bridge.
//!
//! # Types
//!
//! - [`DeviceKind`] - Charge point, counter, battery, PV generator, vehicle, controller
//! - [`DeviceInstance`] - One configured unit (kind, id, namespace prefix)
//! - [`EntityValue`] - A decoded, typed entity value
//! - [`CommandValue`] - The value of a host-issued write
//! - [`ChargeMode`] / [`LimitMode`] - Typed charging selections
//! - [`Transport`] - Push (MQTT) or pull (HTTP API)

mod charge_mode;
mod device_kind;
mod transport;
mod value;

pub use charge_mode::{ChargeMode, LimitMode};
pub use device_kind::{DeviceInstance, DeviceKind};
pub use transport::Transport;
pub use value::{Choice, CommandValue, EntityValue};

pub(crate) use value::format_number;
