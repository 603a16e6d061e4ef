// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Charging mode selections.

use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

/// The charging mode of a charge point.
///
/// # Examples
///
/// ```
/// use openwb_bridge::types::ChargeMode;
///
/// let mode: ChargeMode = "pv".parse().unwrap();
/// assert_eq!(mode, ChargeMode::PvCharging);
/// assert_eq!(mode.as_str(), "pv_charging");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChargeMode {
    /// Charge immediately at the configured current.
    InstantCharging,
    /// Reach a target state of charge by a deadline.
    ScheduledCharging,
    /// Charge from surplus solar power.
    PvCharging,
    /// Charge while the electricity price is below a limit.
    EcoCharging,
    /// Ready, but not charging.
    Standby,
    /// Charging disabled.
    Stop,
}

impl ChargeMode {
    /// Returns the canonical state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InstantCharging => "instant_charging",
            Self::ScheduledCharging => "scheduled_charging",
            Self::PvCharging => "pv_charging",
            Self::EcoCharging => "eco_charging",
            Self::Standby => "standby",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for ChargeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeMode {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "instant_charging" | "instant" => Ok(Self::InstantCharging),
            "scheduled_charging" | "target" => Ok(Self::ScheduledCharging),
            "pv_charging" | "pv" => Ok(Self::PvCharging),
            "eco_charging" | "eco" => Ok(Self::EcoCharging),
            "standby" => Ok(Self::Standby),
            "stop" => Ok(Self::Stop),
            _ => Err(ValueError::InvalidChargeMode(s.to_string())),
        }
    }
}

/// How instant charging is limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitMode {
    /// No limit.
    None,
    /// Stop at a state of charge.
    Soc,
    /// Stop after an amount of energy.
    Amount,
}

impl LimitMode {
    /// Returns the state name used in charge templates.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Soc => "soc",
            Self::Amount => "amount",
        }
    }
}

impl fmt::Display for LimitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LimitMode {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "soc" => Ok(Self::Soc),
            "amount" => Ok(Self::Amount),
            _ => Err(ValueError::InvalidLimitMode(s.to_string())),
        }
    }
}
