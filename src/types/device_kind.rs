// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device kinds and device instances.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// The kind of unit an instance represents.
///
/// # Examples
///
/// ```
/// use openwb_bridge::types::DeviceKind;
///
/// let kind: DeviceKind = "bat".parse().unwrap();
/// assert_eq!(kind, DeviceKind::Battery);
/// assert_eq!(kind.segment(), "bat");
/// assert_eq!(DeviceKind::Controller.segment(), "system");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// A charging port.
    #[serde(rename = "chargepoint")]
    ChargePoint,
    /// A power meter.
    #[serde(rename = "counter")]
    Counter,
    /// A home battery.
    #[serde(rename = "bat")]
    Battery,
    /// A solar generator.
    #[serde(rename = "pv")]
    PvGenerator,
    /// A vehicle known to the controller.
    #[serde(rename = "vehicle")]
    Vehicle,
    /// The central controller.
    #[serde(rename = "controller")]
    Controller,
}

impl DeviceKind {
    /// Every supported device kind.
    pub const ALL: [Self; 6] = [
        Self::ChargePoint,
        Self::Counter,
        Self::Battery,
        Self::PvGenerator,
        Self::Vehicle,
        Self::Controller,
    ];

    /// Returns the configuration name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChargePoint => "chargepoint",
            Self::Counter => "counter",
            Self::Battery => "bat",
            Self::PvGenerator => "pv",
            Self::Vehicle => "vehicle",
            Self::Controller => "controller",
        }
    }

    /// Returns the topic segment used by the push transport.
    #[must_use]
    pub const fn segment(&self) -> &'static str {
        match self {
            Self::Controller => "system",
            other => other.as_str(),
        }
    }

    /// Returns `true` when instances of this kind are addressed by a numeric id.
    #[must_use]
    pub const fn has_device_id(&self) -> bool {
        !matches!(self, Self::Controller)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chargepoint" => Ok(Self::ChargePoint),
            "counter" => Ok(Self::Counter),
            "bat" | "battery" => Ok(Self::Battery),
            "pv" => Ok(Self::PvGenerator),
            "vehicle" => Ok(Self::Vehicle),
            "controller" | "system" => Ok(Self::Controller),
            _ => Err(ValueError::InvalidDeviceKind(s.to_string())),
        }
    }
}

/// One monitored or controlled unit.
///
/// Identified by its kind, numeric id and namespace prefix. Immutable after
/// creation; two instances with equal fields address the same unit.
///
/// # Examples
///
/// ```
/// use openwb_bridge::types::{DeviceInstance, DeviceKind};
///
/// let cp = DeviceInstance::new(DeviceKind::ChargePoint, 4, "openWB");
/// assert_eq!(cp.title(), "openWB-chargepoint-4");
///
/// let controller = DeviceInstance::new(DeviceKind::Controller, 0, "openWB");
/// assert_eq!(controller.title(), "openWB-controller");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceInstance {
    kind: DeviceKind,
    id: u32,
    prefix: String,
}

impl DeviceInstance {
    /// Creates a new instance.
    #[must_use]
    pub fn new(kind: DeviceKind, id: u32, prefix: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            prefix: prefix.into(),
        }
    }

    /// Returns the device kind.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Returns the numeric device id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the namespace prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the entry title, unique per instance.
    #[must_use]
    pub fn title(&self) -> String {
        if self.kind.has_device_id() {
            format!("{}-{}-{}", self.prefix, self.kind, self.id)
        } else {
            format!("{}-{}", self.prefix, self.kind)
        }
    }
}

impl fmt::Display for DeviceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_segments() {
        assert_eq!(DeviceKind::ChargePoint.segment(), "chargepoint");
        assert_eq!(DeviceKind::PvGenerator.segment(), "pv");
        assert_eq!(DeviceKind::Controller.segment(), "system");
        assert_eq!(DeviceKind::Controller.as_str(), "controller");
    }

    #[test]
    fn kind_from_str() {
        assert_eq!("Counter".parse::<DeviceKind>().unwrap(), DeviceKind::Counter);
        assert_eq!("battery".parse::<DeviceKind>().unwrap(), DeviceKind::Battery);
        assert_eq!("system".parse::<DeviceKind>().unwrap(), DeviceKind::Controller);
        assert!("wallbox".parse::<DeviceKind>().is_err());
    }

    #[test]
    fn kind_serde_names() {
        let json = serde_json::to_string(&DeviceKind::PvGenerator).unwrap();
        assert_eq!(json, "\"pv\"");
        let kind: DeviceKind = serde_json::from_str("\"chargepoint\"").unwrap();
        assert_eq!(kind, DeviceKind::ChargePoint);
    }

    #[test]
    fn instances_with_different_prefixes_differ() {
        let a = DeviceInstance::new(DeviceKind::Counter, 0, "openWB");
        let b = DeviceInstance::new(DeviceKind::Counter, 0, "openWB-http");
        assert_ne!(a, b);
        assert_eq!(b.to_string(), "openWB-http-counter-0");
    }
}
