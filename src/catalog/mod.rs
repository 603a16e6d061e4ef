// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Static entity catalog.
//!
//! Every observable or controllable attribute of a device kind is described
//! once, in a static table, for both transports. A descriptor names where the
//! value is read (a push topic template and/or a pull response field), how
//! the raw content is decoded, and, for writable entities, where and how a
//! new value is sent.
//!
//! Indirect targets are explicit: an address template may use placeholders
//! such as `{charge_template_id}`, and each kind lists the entity whose value
//! supplies every such parameter ([`ParameterBinding`]). Writes that must be
//! merged into a previously observed record name the entity holding that
//! record ([`WritePolicy::IndirectMerge`]).
//!
//! # Examples
//!
//! ```
//! use openwb_bridge::catalog::{self, AddressParams, Direction};
//! use openwb_bridge::types::{DeviceKind, Transport};
//!
//! let params = AddressParams::new(DeviceKind::ChargePoint, "openWB", 4);
//! let address = catalog::resolve(
//!     DeviceKind::ChargePoint,
//!     "power",
//!     Transport::Mqtt,
//!     Direction::Inbound,
//!     &params,
//! )
//! .unwrap();
//! assert_eq!(address.as_deref(), Some("openWB/chargepoint/4/get/power"));
//! ```

/// An address below `{prefix}/{segment}/{id}/`.
macro_rules! device_address {
    ($suffix:literal) => {
        $crate::catalog::AddressTemplate::new(concat!("{prefix}/{segment}/{id}/", $suffix))
    };
}

/// An address below `{prefix}/`.
macro_rules! root_address {
    ($suffix:literal) => {
        $crate::catalog::AddressTemplate::new(concat!("{prefix}/", $suffix))
    };
}

/// A read-only sensor published at a device address and served under the
/// same field name by the pull API.
macro_rules! reading {
    ($key:literal, $suffix:literal, $rule:expr) => {
        $crate::catalog::EntityDescriptor::new($key, $crate::catalog::Platform::Sensor)
            .push(device_address!($suffix), $rule)
            .pull($key, $rule)
    };
}

mod chargepoint;
mod meters;
mod system;
mod template;

pub use template::{AddressParams, AddressTemplate};

use serde_json::Value;

use crate::decode::DecodingRule;
use crate::error::CatalogError;
use crate::types::{DeviceKind, Transport};

// ============================================================================
// Descriptor types
// ============================================================================

/// How the host presents an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// A read-only value.
    Sensor,
    /// A read-only on/off state.
    BinarySensor,
    /// A choice from a fixed set.
    Select,
    /// A bounded number.
    Number,
    /// A lock.
    Lock,
}

/// A table from canonical state names to the values the device accepts.
pub type CommandTable = &'static [(&'static str, &'static str)];

/// How a written value is turned into a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Encoding {
    /// The number, truncated to an integer.
    Integer,
    /// The number multiplied by a factor, then truncated to an integer.
    Scaled(f64),
    /// A flag as one of two words.
    Flag {
        /// Payload for `true`.
        on: &'static str,
        /// Payload for `false`.
        off: &'static str,
    },
    /// A state name translated through a table.
    Choice(CommandTable),
    /// Text, verbatim.
    Text,
}

/// Whether an indirect write sends the changed field or the whole record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Only the new field value is sent; the address targets the field.
    Leaf,
    /// A copy of the record with the field replaced is sent.
    Record,
}

/// How a value reaches its outbound address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// The encoded value is sent as is.
    Direct,
    /// The value is spliced into a record observed on another entity.
    IndirectMerge {
        /// Key of the entity holding the base record.
        base: &'static str,
        /// Field path of the value inside the record.
        path: &'static [&'static str],
        /// What is sent.
        granularity: Granularity,
    },
}

/// Where a value is read from on the push transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inbound {
    /// Topic template.
    pub address: AddressTemplate,
    /// Decoding applied to the payload.
    pub rule: DecodingRule,
}

/// Where a value is read from in a pull response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PullField {
    /// Field name in the response document.
    pub field: &'static str,
    /// Decoding applied to the field value.
    pub rule: DecodingRule,
}

/// Where a written value goes on the push transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushCommand {
    /// Topic template.
    pub address: AddressTemplate,
    /// Payload encoding.
    pub encoding: Encoding,
    /// Direct or merged.
    pub policy: WritePolicy,
}

/// Where a written value goes on the pull transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PullCommand {
    /// Form field naming the command.
    pub command: &'static str,
    /// Value encoding.
    pub encoding: Encoding,
    /// Factor applied to the echoed value before it is decoded.
    pub echo_scale: f64,
}

/// Allowed range of a numeric write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Smallest accepted value.
    pub min: f64,
    /// Largest accepted value.
    pub max: f64,
    /// Whether the upper bound drops to the current limit of an 11 kW wallbox.
    pub limited_by_wallbox: bool,
}

/// Highest charging current of an 11 kW wallbox, in amperes.
pub const REDUCED_MAX_CURRENT: f64 = 16.0;

impl Bounds {
    /// Returns the upper bound for a wallbox of the given power rating.
    #[must_use]
    pub fn max_for(&self, wallbox_kw: u32) -> f64 {
        if self.limited_by_wallbox && wallbox_kw == 11 {
            self.max.min(REDUCED_MAX_CURRENT)
        } else {
            self.max
        }
    }
}

/// One entity of a device kind.
///
/// Descriptors are static and shared by every instance of the kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityDescriptor {
    key: &'static str,
    platform: Platform,
    push: Option<Inbound>,
    pull: Option<PullField>,
    push_command: Option<PushCommand>,
    pull_command: Option<PullCommand>,
    bounds: Option<Bounds>,
    optional: bool,
}

impl EntityDescriptor {
    /// Creates a descriptor with no sources and no commands.
    #[must_use]
    pub const fn new(key: &'static str, platform: Platform) -> Self {
        Self {
            key,
            platform,
            push: None,
            pull: None,
            push_command: None,
            pull_command: None,
            bounds: None,
            optional: false,
        }
    }

    /// Reads the value from a push topic.
    #[must_use]
    pub const fn push(self, address: AddressTemplate, rule: DecodingRule) -> Self {
        Self {
            push: Some(Inbound { address, rule }),
            ..self
        }
    }

    /// Reads the value from a pull response field.
    #[must_use]
    pub const fn pull(self, field: &'static str, rule: DecodingRule) -> Self {
        Self {
            pull: Some(PullField { field, rule }),
            ..self
        }
    }

    /// Publishes written values to `address`.
    #[must_use]
    pub const fn writes(self, address: AddressTemplate, encoding: Encoding) -> Self {
        self.merges(address, encoding, WritePolicy::Direct)
    }

    /// Publishes written values to `address` under `policy`.
    #[must_use]
    pub const fn merges(
        self,
        address: AddressTemplate,
        encoding: Encoding,
        policy: WritePolicy,
    ) -> Self {
        Self {
            push_command: Some(PushCommand {
                address,
                encoding,
                policy,
            }),
            ..self
        }
    }

    /// Submits written values as the pull API command `command`.
    #[must_use]
    pub const fn submits(self, command: &'static str, encoding: Encoding) -> Self {
        Self {
            pull_command: Some(PullCommand {
                command,
                encoding,
                echo_scale: 1.0,
            }),
            ..self
        }
    }

    /// Scales the echoed value of a pull command before decoding.
    #[must_use]
    pub const fn echo_scale(self, factor: f64) -> Self {
        let pull_command = match self.pull_command {
            Some(mut command) => {
                command.echo_scale = factor;
                Some(command)
            }
            None => None,
        };
        Self {
            pull_command,
            ..self
        }
    }

    /// Restricts numeric writes to `min..=max`.
    #[must_use]
    pub const fn bounds(self, min: f64, max: f64) -> Self {
        Self {
            bounds: Some(Bounds {
                min,
                max,
                limited_by_wallbox: false,
            }),
            ..self
        }
    }

    /// Restricts numeric writes to `min..=max`, capped for 11 kW wallboxes.
    #[must_use]
    pub const fn current_bounds(self, min: f64, max: f64) -> Self {
        Self {
            bounds: Some(Bounds {
                min,
                max,
                limited_by_wallbox: true,
            }),
            ..self
        }
    }

    /// Excludes this entity from the synced check.
    #[must_use]
    pub const fn optional(self) -> Self {
        Self {
            optional: true,
            ..self
        }
    }

    /// Returns the entity key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Returns the host platform.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Returns the push source.
    #[must_use]
    pub const fn push_source(&self) -> Option<&Inbound> {
        self.push.as_ref()
    }

    /// Returns the pull source.
    #[must_use]
    pub const fn pull_source(&self) -> Option<&PullField> {
        self.pull.as_ref()
    }

    /// Returns the push command.
    #[must_use]
    pub const fn push_command(&self) -> Option<&PushCommand> {
        self.push_command.as_ref()
    }

    /// Returns the pull command.
    #[must_use]
    pub const fn pull_command(&self) -> Option<&PullCommand> {
        self.pull_command.as_ref()
    }

    /// Returns the write bounds.
    #[must_use]
    pub const fn write_bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Returns `true` if the synced check ignores this entity.
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    /// Returns `true` if the entity is read on `transport`.
    #[must_use]
    pub const fn is_readable(&self, transport: Transport) -> bool {
        match transport {
            Transport::Mqtt => self.push.is_some(),
            Transport::Http => self.pull.is_some(),
        }
    }

    /// Returns `true` if the entity can be written on `transport`.
    #[must_use]
    pub const fn is_writable(&self, transport: Transport) -> bool {
        match transport {
            Transport::Mqtt => self.push_command.is_some(),
            Transport::Http => self.pull_command.is_some(),
        }
    }
}

/// Names the entity whose value fills an address placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterBinding {
    /// Placeholder name.
    pub name: &'static str,
    /// Key of the supplying entity.
    pub source: &'static str,
}

/// Everything the catalog knows about one device kind.
#[derive(Debug)]
pub struct KindCatalog {
    entities: &'static [EntityDescriptor],
    parameters: &'static [ParameterBinding],
    liveness: &'static str,
}

// ============================================================================
// Lookups
// ============================================================================

/// Returns the catalog of a device kind.
#[must_use]
pub fn catalog(kind: DeviceKind) -> &'static KindCatalog {
    match kind {
        DeviceKind::ChargePoint => &chargepoint::CATALOG,
        DeviceKind::Counter => &meters::COUNTER,
        DeviceKind::Battery => &meters::BATTERY,
        DeviceKind::PvGenerator => &meters::PV,
        DeviceKind::Vehicle => &system::VEHICLE,
        DeviceKind::Controller => &system::CONTROLLER,
    }
}

/// Returns every entity of a device kind.
#[must_use]
pub fn all_entities(kind: DeviceKind) -> &'static [EntityDescriptor] {
    catalog(kind).entities
}

/// Returns the placeholder bindings of a device kind.
#[must_use]
pub fn parameters(kind: DeviceKind) -> &'static [ParameterBinding] {
    catalog(kind).parameters
}

/// Returns the entity whose updates prove a push-bound instance alive.
#[must_use]
pub fn liveness_key(kind: DeviceKind) -> &'static str {
    catalog(kind).liveness
}

/// Looks up one entity.
///
/// # Errors
///
/// Returns [`CatalogError::UnknownEntity`] if the kind has no such entity.
pub fn descriptor(kind: DeviceKind, key: &str) -> Result<&'static EntityDescriptor, CatalogError> {
    all_entities(kind)
        .iter()
        .find(|d| d.key == key)
        .ok_or_else(|| CatalogError::UnknownEntity {
            kind,
            key: key.to_string(),
        })
}

/// Direction of a resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Where the value is read.
    Inbound,
    /// Where written values are sent.
    Outbound,
}

/// Resolves the concrete address of an entity.
///
/// On the push transport this renders the topic template; on the pull
/// transport it is the response field (inbound) or the command name
/// (outbound). Returns `Ok(None)` if the entity has no address in that
/// direction on that transport.
///
/// # Errors
///
/// Returns [`CatalogError::UnknownEntity`] for an unregistered key and
/// [`CatalogError::MissingParameter`] when a placeholder has no value yet.
pub fn resolve(
    kind: DeviceKind,
    key: &str,
    transport: Transport,
    direction: Direction,
    params: &AddressParams,
) -> Result<Option<String>, CatalogError> {
    let descriptor = descriptor(kind, key)?;
    let template = match (transport, direction) {
        (Transport::Mqtt, Direction::Inbound) => descriptor.push.map(|p| p.address),
        (Transport::Mqtt, Direction::Outbound) => descriptor.push_command.map(|c| c.address),
        (Transport::Http, Direction::Inbound) => {
            return Ok(descriptor.pull.map(|p| p.field.to_string()));
        }
        (Transport::Http, Direction::Outbound) => {
            return Ok(descriptor.pull_command.map(|c| c.command.to_string()));
        }
    };
    template.map(|t| render(descriptor.key, t, params)).transpose()
}

/// Renders `template` on behalf of entity `key`.
pub(crate) fn render(
    key: &str,
    template: AddressTemplate,
    params: &AddressParams,
) -> Result<String, CatalogError> {
    template
        .render(params)
        .map_err(|parameter| CatalogError::MissingParameter {
            key: key.to_string(),
            parameter: parameter.to_string(),
        })
}

// ============================================================================
// Pull queries
// ============================================================================

/// The fetch issued for one pull-bound instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullQuery {
    query: String,
    scope: Option<String>,
}

impl PullQuery {
    /// Returns the query appended to the API URL.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Returns the response key holding the instance document, if scoped.
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Selects the instance document from a response.
    #[must_use]
    pub fn select<'a>(&self, response: &'a Value) -> Option<&'a Value> {
        match &self.scope {
            Some(scope) => response.get(scope).filter(|v| !v.is_null()),
            None => Some(response),
        }
    }
}

/// Returns the fetch for an instance, or `None` for push-only kinds.
///
/// # Examples
///
/// ```
/// use openwb_bridge::catalog::pull_query;
/// use openwb_bridge::types::DeviceKind;
///
/// let q = pull_query(DeviceKind::Battery, 1).unwrap();
/// assert_eq!(q.query(), "?get_battery=1");
/// assert_eq!(q.scope(), Some("battery_1"));
/// assert!(pull_query(DeviceKind::Vehicle, 1).is_none());
/// ```
#[must_use]
pub fn pull_query(kind: DeviceKind, id: u32) -> Option<PullQuery> {
    let (query, scope) = match kind {
        DeviceKind::ChargePoint => (
            format!("?get_chargepoint_all={id}"),
            Some(format!("chargepoint_{id}")),
        ),
        DeviceKind::Counter => (format!("?get_counter={id}"), Some(format!("counter_{id}"))),
        DeviceKind::Battery => (format!("?get_battery={id}"), Some(format!("battery_{id}"))),
        DeviceKind::PvGenerator => (format!("?get_pv={id}"), Some(format!("pv_{id}"))),
        DeviceKind::Controller => ("?get_lastlivevaluesjson&raw=true".to_string(), None),
        DeviceKind::Vehicle => return None,
    };
    Some(PullQuery { query, scope })
}
