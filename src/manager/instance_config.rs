// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Instance configuration for the bridge.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;
use crate::state::NotifyPolicy;
use crate::types::{DeviceInstance, DeviceKind, Transport};

/// Namespace prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "openWB";

/// Device id used when none is configured.
pub const DEFAULT_DEVICE_ID: u32 = 4;

/// Configuration for one device instance.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use openwb_bridge::manager::InstanceConfig;
/// use openwb_bridge::types::{DeviceKind, Transport};
///
/// // Push-bound charge point with the default prefix
/// let config = InstanceConfig::mqtt(DeviceKind::ChargePoint, 4).with_wallbox_power(11);
/// assert_eq!(config.instance().title(), "openWB-chargepoint-4");
///
/// // Pull-bound counter with a custom cadence
/// let config = InstanceConfig::http(DeviceKind::Counter, 0, "http://openwb/simpleapi.php")
///     .with_prefix("openWB-http")
///     .with_poll_interval(Duration::from_secs(30));
/// assert_eq!(config.transport(), Transport::Http);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceConfig {
    kind: DeviceKind,
    id: u32,
    prefix: String,
    transport: Transport,
    api_url: Option<String>,
    api_token: Option<String>,
    wallbox_power: u32,
    poll_interval: Duration,
    request_timeout: Duration,
    failure_threshold: u32,
    liveness_window: Duration,
    notify_policy: NotifyPolicy,
    vehicles: BTreeMap<u32, String>,
}

impl InstanceConfig {
    /// Default wallbox rating in kW.
    pub const DEFAULT_WALLBOX_POWER: u32 = 22;
    /// Default pull cadence.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
    /// Default pull request timeout.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default number of consecutive failed polls before entities become
    /// unknown.
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;
    /// Default window for push liveness updates.
    pub const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(60);

    fn new(kind: DeviceKind, id: u32, transport: Transport) -> Self {
        Self {
            kind,
            id,
            prefix: DEFAULT_PREFIX.to_string(),
            transport,
            api_url: None,
            api_token: None,
            wallbox_power: Self::DEFAULT_WALLBOX_POWER,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            failure_threshold: Self::DEFAULT_FAILURE_THRESHOLD,
            liveness_window: Self::DEFAULT_LIVENESS_WINDOW,
            notify_policy: NotifyPolicy::default(),
            vehicles: BTreeMap::new(),
        }
    }

    /// Creates a configuration for a push-bound instance.
    #[must_use]
    pub fn mqtt(kind: DeviceKind, id: u32) -> Self {
        Self::new(kind, id, Transport::Mqtt)
    }

    /// Creates a configuration for a pull-bound instance.
    #[must_use]
    pub fn http(kind: DeviceKind, id: u32, api_url: impl Into<String>) -> Self {
        let mut config = Self::new(kind, id, Transport::Http);
        config.api_url = Some(api_url.into());
        config
    }

    /// Sets the namespace prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the bearer token for the pull API.
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the wallbox rating in kW. Ratings below 22 kW cap the current
    /// controls at 16 A.
    #[must_use]
    pub fn with_wallbox_power(mut self, kw: u32) -> Self {
        self.wallbox_power = kw;
        self
    }

    /// Sets the pull cadence.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the pull request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets how many consecutive polls may fail before entities become
    /// unknown.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the push liveness window.
    #[must_use]
    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    /// Sets whether unchanged values notify subscribers.
    #[must_use]
    pub fn with_notify_policy(mut self, policy: NotifyPolicy) -> Self {
        self.notify_policy = policy;
        self
    }

    /// Sets the known vehicles, by id.
    #[must_use]
    pub fn with_vehicles(mut self, vehicles: BTreeMap<u32, String>) -> Self {
        self.vehicles = vehicles;
        self
    }

    /// Returns the device instance this configuration describes.
    #[must_use]
    pub fn instance(&self) -> DeviceInstance {
        DeviceInstance::new(self.kind, self.id, self.prefix.clone())
    }

    /// Returns the transport.
    #[must_use]
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Returns the pull API URL.
    #[must_use]
    pub fn api_url(&self) -> Option<&str> {
        self.api_url.as_deref()
    }

    /// Returns the pull API bearer token.
    #[must_use]
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    /// Returns the wallbox rating in kW.
    #[must_use]
    pub fn wallbox_power(&self) -> u32 {
        self.wallbox_power
    }

    /// Returns the pull cadence.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the pull request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the consecutive failure threshold.
    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Returns the push liveness window.
    #[must_use]
    pub fn liveness_window(&self) -> Duration {
        self.liveness_window
    }

    /// Returns the notify policy.
    #[must_use]
    pub fn notify_policy(&self) -> NotifyPolicy {
        self.notify_policy
    }

    /// Returns the known vehicles, by id.
    #[must_use]
    pub fn vehicles(&self) -> &BTreeMap<u32, String> {
        &self.vehicles
    }

    /// Looks up a vehicle id by its configured name.
    #[must_use]
    pub fn vehicle_id(&self, name: &str) -> Option<u32> {
        self.vehicles
            .iter()
            .find(|(_, n)| n.as_str() == name.trim())
            .map(|(id, _)| *id)
    }
}

/// Parses a vehicle list such as `"0=Standard-Fahrzeug, 1=Fahrzeug (1)"`.
///
/// # Errors
///
/// Returns [`ValueError::InvalidVehicleEntry`] for an entry without `=`, with
/// a non-numeric id or with an empty name.
///
/// # Examples
///
/// ```
/// use openwb_bridge::manager::parse_vehicles;
///
/// let vehicles = parse_vehicles("0=Standard-Fahrzeug, 1=Fahrzeug (1)").unwrap();
/// assert_eq!(vehicles[&1], "Fahrzeug (1)");
/// ```
pub fn parse_vehicles(list: &str) -> Result<BTreeMap<u32, String>, ValueError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || ValueError::InvalidVehicleEntry(entry.to_string());
            let (id, name) = entry.split_once('=').ok_or_else(invalid)?;
            let id = id.trim().parse::<u32>().map_err(|_| invalid())?;
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid());
            }
            Ok((id, name.to_string()))
        })
        .collect()
}

fn parse_wallbox_power(raw: &str) -> Result<u32, ValueError> {
    match raw.trim().trim_end_matches("kW").trim() {
        "11" => Ok(11),
        "22" => Ok(22),
        _ => Err(ValueError::InvalidWallboxPower(raw.to_string())),
    }
}

/// A persisted configuration entry as stored by the host.
///
/// Field names follow the stored entry. Convert to an [`InstanceConfig`]
/// with [`TryFrom`].
///
/// # Examples
///
/// ```
/// use openwb_bridge::manager::{ConfigEntry, InstanceConfig};
///
/// let entry: ConfigEntry = serde_json::from_str(r#"{
///     "communication_method": "HTTP API",
///     "api_prefix": "openWB",
///     "DEVICETYPE": "chargepoint",
///     "DEVICEID": 4,
///     "api_url": "http://192.168.0.68/simpleAPI/web/simpleapi.php",
///     "wallbox_power": "11",
///     "vehicles": "0=Standard-Fahrzeug, 1=Fahrzeug (1)"
/// }"#).unwrap();
///
/// let config = InstanceConfig::try_from(entry).unwrap();
/// assert_eq!(config.wallbox_power(), 11);
/// assert_eq!(config.vehicle_id("Fahrzeug (1)"), Some(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Transport name, `MQTT` or `HTTP API`.
    #[serde(default)]
    pub communication_method: Transport,
    /// Namespace prefix for push-bound entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqttroot: Option<String>,
    /// Namespace prefix for pull-bound entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_prefix: Option<String>,
    /// Device kind name.
    #[serde(rename = "DEVICETYPE")]
    pub device_type: String,
    /// Numeric device id.
    #[serde(rename = "DEVICEID", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<u32>,
    /// Pull API URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Pull API bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Wallbox rating, `11` or `22`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallbox_power: Option<String>,
    /// Vehicle list, `id=name` pairs separated by commas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicles: Option<String>,
}

impl TryFrom<ConfigEntry> for InstanceConfig {
    type Error = ValueError;

    fn try_from(entry: ConfigEntry) -> Result<Self, Self::Error> {
        let kind: DeviceKind = entry.device_type.parse()?;
        let id = entry.device_id.unwrap_or(if kind.has_device_id() {
            DEFAULT_DEVICE_ID
        } else {
            0
        });

        let (mut config, prefix) = match entry.communication_method {
            Transport::Mqtt => (Self::mqtt(kind, id), entry.mqttroot),
            Transport::Http => {
                let url = entry
                    .api_url
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ValueError::MissingField("api_url"))?;
                (Self::http(kind, id, url), entry.api_prefix)
            }
        };

        if let Some(prefix) = prefix.filter(|p| !p.trim().is_empty()) {
            config.prefix = prefix.trim().to_string();
        }
        config.api_token = entry.api_token.filter(|t| !t.trim().is_empty());
        if let Some(power) = entry.wallbox_power {
            config.wallbox_power = parse_wallbox_power(&power)?;
        }
        if let Some(vehicles) = entry.vehicles {
            config.vehicles = parse_vehicles(&vehicles)?;
        }
        Ok(config)
    }
}
