// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the bridge.
//!
//! Errors are grouped by layer: catalog resolution, payload decoding,
//! command translation, transport communication, and value validation.
//! Transient conditions (an indirect address not yet resolvable, a merge
//! target not yet observed, a failed poll) are distinguishable through
//! [`Error::is_transient`].

use thiserror::Error;

use crate::types::{DeviceKind, Transport};

/// Any failure surfaced by the bridge.
#[derive(Debug, Error)]
pub enum Error {
    /// A value supplied by the caller or the configuration was invalid.
    #[error("invalid value: {0}")]
    Value(#[from] ValueError),

    /// An entity or address could not be resolved.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A raw payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A write intent could not be translated.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// The transport failed.
    #[error("transport: {0}")]
    Protocol(#[from] ProtocolError),

    /// The device instance is not registered with the bridge.
    #[error("device instance not found: {0}")]
    InstanceNotFound(String),

    /// An instance with the same title is already registered.
    #[error("device instance already exists: {0}")]
    InstanceExists(String),

    /// The transport cannot serve this device kind.
    #[error("{kind} instances cannot use the {transport} transport")]
    UnsupportedTransport {
        /// The device kind.
        kind: DeviceKind,
        /// The configured transport.
        transport: Transport,
    },

    /// The instance has no active transport.
    #[error("device instance is not connected")]
    NotConnected,
}

impl Error {
    /// Returns `true` for conditions that resolve themselves once a later
    /// update arrives.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Catalog(CatalogError::MissingParameter { .. })
                | Self::Command(CommandError::RecordUnavailable { .. })
                | Self::Protocol(ProtocolError::FetchFailed { .. })
        )
    }
}

/// Rejected host or configuration values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Lower bound.
        min: f64,
        /// Upper bound, after any wallbox power limit.
        max: f64,
        /// The rejected value.
        actual: f64,
    },

    /// The value kind does not match what the entity accepts.
    #[error("entity {key} expects a {expected} value")]
    TypeMismatch {
        /// The entity key that was written.
        key: String,
        /// Human readable name of the accepted value kind.
        expected: &'static str,
    },

    /// An unknown device kind name.
    #[error("invalid device kind: {0}")]
    InvalidDeviceKind(String),

    /// An unknown charge mode name.
    #[error("invalid charge mode: {0}")]
    InvalidChargeMode(String),

    /// An unknown instant charging limit name.
    #[error("invalid charging limit: {0}")]
    InvalidLimitMode(String),

    /// An unknown communication method.
    #[error("invalid communication method: {0}")]
    InvalidTransport(String),

    /// A wallbox power rating other than 11 or 22 kW.
    #[error("invalid wallbox power: {0}")]
    InvalidWallboxPower(String),

    /// A malformed `id=name` vehicle list entry.
    #[error("invalid vehicle entry: {0}")]
    InvalidVehicleEntry(String),

    /// A configuration field is required but missing.
    #[error("missing configuration field: {0}")]
    MissingField(&'static str),
}

/// Errors raised by the address catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The entity key is not registered for this device kind.
    #[error("unknown entity {key} for device kind {kind}")]
    UnknownEntity {
        /// The device kind that was queried.
        kind: DeviceKind,
        /// The entity key that was not found.
        key: String,
    },

    /// A template placeholder has no value yet.
    #[error("address for {key} needs {parameter}, which has not been observed yet")]
    MissingParameter {
        /// The entity whose address could not be rendered.
        key: String,
        /// The name of the unresolved placeholder.
        parameter: String,
    },
}

/// Errors raised while decoding a payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload cannot be parsed under the declared rule.
    #[error("malformed payload for {rule} rule: {reason}")]
    MalformedPayload {
        /// Name of the decoding rule that rejected the payload.
        rule: &'static str,
        /// Description of the parsing failure.
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(rule: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            rule,
            reason: reason.into(),
        }
    }
}

/// Errors raised while translating a write intent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The entity has no outbound address on the selected transport.
    #[error("entity {key} is not writable")]
    NotWritable {
        /// The entity key that was written.
        key: String,
    },

    /// The structured record needed for a merge has not been observed.
    #[error("cannot write {key}: record {base} has not been received yet")]
    RecordUnavailable {
        /// The entity key that was written.
        key: String,
        /// The entity holding the base record.
        base: String,
    },

    /// The value is not one the device accepts as a command.
    #[error("value {value} is not accepted by {key}")]
    UnsupportedValue {
        /// The entity key that was written.
        key: String,
        /// The rejected value.
        value: String,
    },
}

/// Failures of the push or pull transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The HTTP client could not complete a write.
    #[cfg(feature = "http")]
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    /// A request could not be queued on the MQTT session.
    #[cfg(feature = "mqtt")]
    #[error("MQTT: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker or endpoint failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A broker host or API URL is missing or unusable.
    #[error("invalid endpoint: {0}")]
    InvalidAddress(String),

    /// The API rejected the bearer token.
    #[error("API token rejected")]
    AuthenticationFailed,

    /// A poll cycle did not produce a usable document.
    #[error("fetch {query} failed: {reason}")]
    FetchFailed {
        /// The query that was fetched.
        query: String,
        /// Description of the failure.
        reason: String,
    },
}

/// Result alias used across the bridge.
pub type Result<T> = std::result::Result<T, Error>;
