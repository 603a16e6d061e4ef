// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Instance configuration and the bridge coordinating every instance.
//!
//! # Overview
//!
//! The [`Bridge`] is the entry point for hosts. It provides:
//!
//! - **Instance management**: add, remove, connect and disconnect instances
//! - **Shared push connection**: every push-bound instance uses one broker
//! - **Polling**: pull-bound instances are fetched on their own cadence
//! - **State tracking**: entity states can be queried or watched per key
//! - **Events**: lifecycle, connection, state and sync events on one bus
//!
//! # Examples
//!
//! ## Event subscription
//!
//! ```no_run
//! use openwb_bridge::event::BridgeEvent;
//! use openwb_bridge::manager::Bridge;
//!
//! # fn example() {
//! let bridge = Bridge::new();
//! let mut events = bridge.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             BridgeEvent::StateChanged { instance, key, state } => {
//!                 println!("{instance} {key}: {:?}", state.value());
//!             }
//!             BridgeEvent::SyncChanged { instance, sync } => {
//!                 println!("{instance} is {sync}");
//!             }
//!             _ => {}
//!         }
//!     }
//! });
//! # }
//! ```
//!
//! ## Watching one entity
//!
//! ```no_run
//! use openwb_bridge::manager::{Bridge, InstanceConfig};
//! use openwb_bridge::types::DeviceKind;
//!
//! # async fn example() -> openwb_bridge::Result<()> {
//! let bridge = Bridge::new();
//! let counter = bridge
//!     .add_instance(InstanceConfig::http(DeviceKind::Counter, 0, "http://openwb/simpleapi.php"))
//!     .await?;
//! bridge.connect(&counter).await?;
//!
//! let mut power = bridge.watch(&counter, "power").await?;
//! while power.changed().await.is_ok() {
//!     println!("grid power: {:?}", power.borrow().value());
//! }
//! # Ok(())
//! # }
//! ```

mod bridge;
mod instance_config;
mod liveness;

pub use bridge::Bridge;
pub use instance_config::{
    ConfigEntry, DEFAULT_DEVICE_ID, DEFAULT_PREFIX, InstanceConfig, parse_vehicles,
};
