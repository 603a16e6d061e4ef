// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// How an instance talks to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Transport {
    /// Topic-based push over an MQTT broker.
    #[default]
    #[serde(rename = "MQTT")]
    Mqtt,
    /// Periodic fetches from the HTTP API.
    #[serde(rename = "HTTP API")]
    Http,
}

impl Transport {
    /// Returns the configuration name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mqtt => "MQTT",
            Self::Http => "HTTP API",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mqtt" => Ok(Self::Mqtt),
            "http api" | "http" => Ok(Self::Http),
            _ => Err(ValueError::InvalidTransport(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_configuration_names() {
        assert_eq!("MQTT".parse::<Transport>().unwrap(), Transport::Mqtt);
        assert_eq!("HTTP API".parse::<Transport>().unwrap(), Transport::Http);
        assert!("coap".parse::<Transport>().is_err());
    }

    #[test]
    fn serde_uses_configuration_names() {
        assert_eq!(serde_json::to_string(&Transport::Http).unwrap(), "\"HTTP API\"");
        let t: Transport = serde_json::from_str("\"MQTT\"").unwrap();
        assert_eq!(t, Transport::Mqtt);
    }
}
