// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport bindings.
//!
//! - [`MqttBroker`]: push transport. A shared connection that subscribes to
//!   the addresses of every bound instance and publishes writes.
//! - [`ApiClient`] and [`Poller`]: pull transport. Periodic fetches from the
//!   simple API and form encoded writes.

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "mqtt")]
mod mqtt_broker;
#[cfg(feature = "http")]
mod poller;

#[cfg(feature = "http")]
pub(crate) use http::echoed_value;
#[cfg(feature = "http")]
pub use http::{ApiClient, ApiConfig};
#[cfg(feature = "mqtt")]
pub use mqtt_broker::{MqttBroker, MqttBrokerBuilder, MqttBrokerConfig};
#[cfg(feature = "http")]
pub use poller::Poller;
