// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed entity values and write intents.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ChargeMode, LimitMode};

/// A decoded entity value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityValue {
    /// A numeric reading.
    Number(f64),
    /// Free text.
    Text(String),
    /// An ordered list of numbers, e.g. one value per phase.
    List(Vec<f64>),
    /// An on/off state.
    Flag(bool),
    /// One of a fixed set of named states.
    Choice(Choice),
    /// A point in time.
    Timestamp(DateTime<Utc>),
    /// A whole structured document.
    Record(serde_json::Value),
}

impl EntityValue {
    /// Returns the number, if this is a numeric value.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list, if this is a list value.
    #[must_use]
    pub fn as_list(&self) -> Option<&[f64]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the flag, if this is an on/off value.
    #[must_use]
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the choice, if this is an enumerated value.
    #[must_use]
    pub fn as_choice(&self) -> Option<&Choice> {
        match self {
            Self::Choice(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the timestamp, if this is a point in time.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the document, if this is a structured record.
    #[must_use]
    pub fn as_record(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Record(v) => Some(v),
            _ => None,
        }
    }

    /// Renders this value for substitution into an address template.
    ///
    /// Integral numbers render without a fractional part. Lists, records
    /// and unknown choices cannot address anything and yield `None`.
    #[must_use]
    pub fn as_parameter(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(format_number(*n)),
            Self::Text(s) if !s.is_empty() => Some(s.clone()),
            Self::Choice(Choice::Known(name)) => Some((*name).to_string()),
            _ => None,
        }
    }
}

/// An enumerated state.
///
/// Raw values outside the known set are kept as [`Choice::Unknown`] so that
/// newer firmware states do not fail decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Choice {
    /// A recognized state, by canonical name.
    Known(&'static str),
    /// An unrecognized raw value.
    Unknown(String),
}

impl Choice {
    /// Returns the canonical name, or `"unknown"`.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Known(name) => name,
            Self::Unknown(_) => "unknown",
        }
    }

    /// Returns `true` if the raw value was not recognized.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

/// The value of a host-issued write.
///
/// # Examples
///
/// ```
/// use openwb_bridge::types::{ChargeMode, CommandValue};
///
/// let current = CommandValue::from(16.0);
/// let mode = CommandValue::from(ChargeMode::PvCharging);
/// let lock = CommandValue::from(true);
/// assert_eq!(mode, CommandValue::Choice("pv_charging".to_string()));
/// # let _ = (current, lock);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    /// A numeric setting.
    Number(f64),
    /// A state name from a fixed set.
    Choice(String),
    /// Free text.
    Text(String),
    /// An on/off setting.
    Flag(bool),
}

impl CommandValue {
    /// Returns a short description of the value kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Choice(_) => "choice",
            Self::Text(_) => "text",
            Self::Flag(_) => "flag",
        }
    }
}

impl std::fmt::Display for CommandValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Choice(s) | Self::Text(s) => f.write_str(s),
            Self::Flag(b) => write!(f, "{b}"),
        }
    }
}

impl From<f64> for CommandValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u32> for CommandValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for CommandValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<ChargeMode> for CommandValue {
    fn from(value: ChargeMode) -> Self {
        Self::Choice(value.as_str().to_string())
    }
}

impl From<LimitMode> for CommandValue {
    fn from(value: LimitMode) -> Self {
        Self::Choice(value.as_str().to_string())
    }
}

/// Formats a number without a trailing `.0` when it is integral.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_rendering() {
        assert_eq!(EntityValue::Number(3.0).as_parameter().as_deref(), Some("3"));
        assert_eq!(EntityValue::Text("7".into()).as_parameter().as_deref(), Some("7"));
        assert_eq!(EntityValue::Text(String::new()).as_parameter(), None);
        assert_eq!(EntityValue::List(vec![1.0]).as_parameter(), None);
        assert_eq!(
            EntityValue::Choice(Choice::Unknown("x".into())).as_parameter(),
            None
        );
    }

    #[test]
    fn choice_names() {
        assert_eq!(Choice::Known("stop").name(), "stop");
        assert_eq!(Choice::Unknown("turbo".into()).name(), "unknown");
        assert!(Choice::Unknown("turbo".into()).is_unknown());
    }

    #[test]
    fn command_value_display() {
        assert_eq!(CommandValue::Number(16.0).to_string(), "16");
        assert_eq!(CommandValue::Number(2.5).to_string(), "2.5");
        assert_eq!(CommandValue::Flag(false).to_string(), "false");
        assert_eq!(CommandValue::from(LimitMode::Soc).to_string(), "soc");
    }

    #[test]
    fn accessors_reject_other_kinds() {
        let v = EntityValue::List(vec![3.1, 3.2, 3.0]);
        assert_eq!(v.as_list(), Some(&[3.1, 3.2, 3.0][..]));
        assert!(v.as_number().is_none());
        assert!(v.as_record().is_none());
    }
}
