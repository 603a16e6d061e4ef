// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `openwb_bridge` - entity resolution and state synchronization for openWB
//! wallbox controllers.
//!
//! The controller publishes its state on an MQTT broker or serves it through
//! the HTTP simple API. This library turns either source into a uniform set
//! of typed entities per configured device instance (charge points,
//! counters, batteries, PV generators, vehicles and the controller itself),
//! and turns host writes back into device writes.
//!
//! # Layers
//!
//! - [`catalog`]: static tables of every entity, its addresses and decoding
//! - [`decode`]: payload decoding rules
//! - [`state`]: per-instance entity state with change streams
//! - [`dispatch`]: fan-out of raw messages and fetched documents into states
//! - [`command`]: translation of writes, including record merges
//! - [`protocol`]: MQTT and HTTP bindings
//! - [`manager`]: instance configuration and the [`Bridge`]
//!
//! # Quick Start
//!
//! ## Push transport
//!
//! ```no_run
//! use openwb_bridge::{Bridge, InstanceConfig, MqttBroker};
//! use openwb_bridge::types::{DeviceKind, EntityValue};
//!
//! #[tokio::main]
//! async fn main() -> openwb_bridge::Result<()> {
//!     let broker = MqttBroker::builder().host("192.168.1.50").build().await?;
//!     let bridge = Bridge::with_broker(broker);
//!
//!     let cp = bridge
//!         .add_instance(InstanceConfig::mqtt(DeviceKind::ChargePoint, 4))
//!         .await?;
//!     bridge.connect(&cp).await?;
//!
//!     let mut sync = bridge.watch_sync(&cp).await?;
//!     sync.changed().await.ok();
//!
//!     if let Some(EntityValue::Number(watts)) = bridge.state(&cp, "power").await?.value() {
//!         println!("charging at {watts} W");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Pull transport
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use openwb_bridge::{Bridge, InstanceConfig};
//! use openwb_bridge::types::{ChargeMode, DeviceKind};
//!
//! #[tokio::main]
//! async fn main() -> openwb_bridge::Result<()> {
//!     let bridge = Bridge::new();
//!     let cp = bridge
//!         .add_instance(
//!             InstanceConfig::http(
//!                 DeviceKind::ChargePoint,
//!                 1,
//!                 "http://192.168.0.68/simpleAPI/web/simpleapi.php",
//!             )
//!             .with_poll_interval(Duration::from_secs(30)),
//!         )
//!         .await?;
//!     bridge.connect(&cp).await?;
//!
//!     bridge.write(&cp, "chargemode_control", ChargeMode::EcoCharging).await?;
//!     bridge.write(&cp, "instant_charging_current_control", 16.0).await?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod command;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod manager;
pub mod protocol;
pub mod state;
pub mod types;

pub use error::{
    CatalogError, CommandError, DecodeError, Error, ProtocolError, Result, ValueError,
};
pub use manager::{Bridge, ConfigEntry, InstanceConfig};
#[cfg(feature = "http")]
pub use protocol::{ApiClient, ApiConfig};
#[cfg(feature = "mqtt")]
pub use protocol::{MqttBroker, MqttBrokerBuilder, MqttBrokerConfig};
pub use state::{Availability, EntityState, NotifyPolicy};
pub use types::{DeviceInstance, DeviceKind, EntityValue, Transport};
