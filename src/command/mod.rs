// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Translation of host writes into device writes.
//!
//! A write names an entity and a [`CommandValue`]. The translator checks the
//! entity is writable on the instance's transport, validates the value,
//! encodes it, and produces an [`OutboundWrite`] for the transport to send.
//!
//! # Write policies
//!
//! | Policy | Push payload |
//! |--------|--------------|
//! | Direct | The encoded value |
//! | Indirect merge, leaf | The encoded value, sent to the field's own address |
//! | Indirect merge, record | A copy of the base record with the field replaced |
//!
//! Indirect merges need the base record to have been observed; until then the
//! write fails with [`CommandError::RecordUnavailable`] and nothing is sent.
//! The stored record is never modified by a write.
//!
//! Writes are fire-and-forget: the new value shows up through the normal
//! inbound path once the device applies it.
//!
//! # Examples
//!
//! ```
//! use openwb_bridge::command::{CommandTranslator, OutboundWrite};
//! use openwb_bridge::dispatch::UpdateDispatcher;
//! use openwb_bridge::event::EventBus;
//! use openwb_bridge::state::NotifyPolicy;
//! use openwb_bridge::types::{ChargeMode, DeviceInstance, DeviceKind, Transport};
//!
//! let dispatcher = UpdateDispatcher::new(
//!     DeviceInstance::new(DeviceKind::ChargePoint, 4, "openWB"),
//!     Transport::Mqtt,
//!     NotifyPolicy::Always,
//!     EventBus::new(),
//! );
//! let write = CommandTranslator::new(22)
//!     .translate(&dispatcher, "chargemode_control", &ChargeMode::PvCharging.into())
//!     .unwrap();
//! assert_eq!(
//!     write,
//!     OutboundWrite::Publish {
//!         topic: "openWB/simpleAPI/set/chargepoint/4/chargemode".to_string(),
//!         payload: "pv".to_string(),
//!     }
//! );
//! ```

use serde_json::Value;

use crate::catalog::{self, Encoding, EntityDescriptor, Granularity, WritePolicy};
use crate::dispatch::UpdateDispatcher;
use crate::error::{CommandError, Error, ValueError};
use crate::types::{CommandValue, Transport};

/// A device write ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundWrite {
    /// Publish on the push transport.
    Publish {
        /// Concrete topic.
        topic: String,
        /// Payload text.
        payload: String,
    },
    /// Submit to the pull API.
    Submit {
        /// Command name.
        command: &'static str,
        /// Encoded value.
        value: String,
        /// Charge point the command applies to.
        chargepoint: u32,
    },
}

impl OutboundWrite {
    /// Returns the form-encoded body of a pull API submission.
    ///
    /// # Examples
    ///
    /// ```
    /// use openwb_bridge::command::OutboundWrite;
    ///
    /// let write = OutboundWrite::Submit {
    ///     command: "chargecurrent",
    ///     value: "16".to_string(),
    ///     chargepoint: 4,
    /// };
    /// assert_eq!(write.form_body().as_deref(), Some("chargecurrent=16&chargepoint_nr=4"));
    /// ```
    #[must_use]
    pub fn form_body(&self) -> Option<String> {
        match self {
            Self::Submit {
                command,
                value,
                chargepoint,
            } => Some(format!(
                "{}={}&chargepoint_nr={chargepoint}",
                urlencoding::encode(command),
                urlencoding::encode(value)
            )),
            Self::Publish { .. } => None,
        }
    }
}

/// An encoded value, as payload text and as a JSON value for merging.
struct Encoded {
    text: String,
    json: Value,
}

/// Turns host writes into [`OutboundWrite`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTranslator {
    wallbox_power: u32,
}

impl CommandTranslator {
    /// Creates a translator for a wallbox rated `wallbox_power` kW.
    #[must_use]
    pub fn new(wallbox_power: u32) -> Self {
        Self { wallbox_power }
    }

    /// Returns the wallbox power rating in kW.
    #[must_use]
    pub fn wallbox_power(&self) -> u32 {
        self.wallbox_power
    }

    /// Translates a write of `value` to entity `key` of the dispatcher's
    /// instance.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::UnknownEntity`](crate::error::CatalogError::UnknownEntity) if the kind has no such entity
    /// - [`CommandError::NotWritable`] if the entity has no outbound address
    ///   on the instance's transport
    /// - [`ValueError::OutOfRange`] or [`ValueError::TypeMismatch`] for an
    ///   unacceptable value
    /// - [`CommandError::UnsupportedValue`] for a state the device does not
    ///   accept as a command
    /// - [`CommandError::RecordUnavailable`] if an indirect merge target has
    ///   not been observed yet
    /// - [`CatalogError::MissingParameter`](crate::error::CatalogError::MissingParameter) if the address depends on an
    ///   entity that has not been observed yet
    pub fn translate(
        &self,
        dispatcher: &UpdateDispatcher,
        key: &str,
        value: &CommandValue,
    ) -> Result<OutboundWrite, Error> {
        let instance = dispatcher.instance();
        let descriptor = catalog::descriptor(instance.kind(), key)?;
        self.check_bounds(descriptor, value)?;

        match dispatcher.transport() {
            Transport::Mqtt => {
                let command = descriptor.push_command().ok_or_else(|| not_writable(key))?;
                let encoded = encode(key, command.encoding, value)?;
                let payload = match command.policy {
                    WritePolicy::Direct => encoded.text,
                    WritePolicy::IndirectMerge {
                        base,
                        path,
                        granularity,
                    } => {
                        let record = dispatcher
                            .store()
                            .value(base)
                            .and_then(|v| v.as_record().cloned())
                            .ok_or_else(|| CommandError::RecordUnavailable {
                                key: key.to_string(),
                                base: base.to_string(),
                            })?;
                        match granularity {
                            Granularity::Leaf => encoded.text,
                            Granularity::Record => merge(key, base, record, path, encoded.json)?,
                        }
                    }
                };
                let topic = catalog::render(key, command.address, &dispatcher.params())?;
                tracing::debug!(
                    instance = %instance,
                    key,
                    topic = %topic,
                    payload = %payload,
                    "Translated write"
                );
                Ok(OutboundWrite::Publish { topic, payload })
            }
            Transport::Http => {
                let command = descriptor.pull_command().ok_or_else(|| not_writable(key))?;
                let encoded = encode(key, command.encoding, value)?;
                tracing::debug!(
                    instance = %instance,
                    key,
                    command = command.command,
                    value = %encoded.text,
                    "Translated write"
                );
                Ok(OutboundWrite::Submit {
                    command: command.command,
                    value: encoded.text,
                    chargepoint: instance.id(),
                })
            }
        }
    }

    fn check_bounds(&self, descriptor: &EntityDescriptor, value: &CommandValue) -> Result<(), ValueError> {
        let (Some(bounds), CommandValue::Number(n)) = (descriptor.write_bounds(), value) else {
            return Ok(());
        };
        let max = bounds.max_for(self.wallbox_power);
        if *n < bounds.min || *n > max {
            return Err(ValueError::OutOfRange {
                min: bounds.min,
                max,
                actual: *n,
            });
        }
        Ok(())
    }
}

impl Default for CommandTranslator {
    fn default() -> Self {
        Self::new(22)
    }
}

fn not_writable(key: &str) -> CommandError {
    CommandError::NotWritable {
        key: key.to_string(),
    }
}

fn mismatch(key: &str, expected: &'static str) -> ValueError {
    ValueError::TypeMismatch {
        key: key.to_string(),
        expected,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integer(n: f64) -> Encoded {
    let i = n.trunc() as i64;
    Encoded {
        text: i.to_string(),
        json: Value::from(i),
    }
}

fn encode(key: &str, encoding: Encoding, value: &CommandValue) -> Result<Encoded, Error> {
    match (encoding, value) {
        (Encoding::Integer, CommandValue::Number(n)) => Ok(integer(*n)),
        (Encoding::Scaled(factor), CommandValue::Number(n)) => Ok(integer(n * factor)),
        (Encoding::Integer | Encoding::Scaled(_), _) => Err(mismatch(key, "number").into()),
        (Encoding::Flag { on, off }, CommandValue::Flag(b)) => Ok(Encoded {
            text: (if *b { on } else { off }).to_string(),
            json: Value::Bool(*b),
        }),
        (Encoding::Flag { .. }, _) => Err(mismatch(key, "flag").into()),
        (Encoding::Choice(table), CommandValue::Choice(name) | CommandValue::Text(name)) => {
            let raw = table
                .iter()
                .find(|(canonical, raw)| {
                    canonical.eq_ignore_ascii_case(name) || raw.eq_ignore_ascii_case(name)
                })
                .map(|(_, raw)| *raw)
                .ok_or_else(|| CommandError::UnsupportedValue {
                    key: key.to_string(),
                    value: name.clone(),
                })?;
            Ok(Encoded {
                text: raw.to_string(),
                json: Value::String(raw.to_string()),
            })
        }
        (Encoding::Choice(_), _) => Err(mismatch(key, "choice").into()),
        (Encoding::Text, CommandValue::Text(s) | CommandValue::Choice(s)) => Ok(Encoded {
            text: s.clone(),
            json: Value::String(s.clone()),
        }),
        (Encoding::Text, _) => Err(mismatch(key, "text").into()),
    }
}

/// Sets `path` in a copy of `record` and serializes the copy.
fn merge(
    key: &str,
    base: &str,
    mut record: Value,
    path: &[&str],
    leaf: Value,
) -> Result<String, CommandError> {
    let unusable = || CommandError::RecordUnavailable {
        key: key.to_string(),
        base: base.to_string(),
    };
    let Some((last, parents)) = path.split_last() else {
        return Err(unusable());
    };
    let mut target = &mut record;
    for segment in parents {
        let object = target.as_object_mut().ok_or_else(unusable)?;
        target = object
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if target.is_null() {
            *target = Value::Object(serde_json::Map::new());
        }
    }
    target
        .as_object_mut()
        .ok_or_else(unusable)?
        .insert((*last).to_string(), leaf);
    Ok(record.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::CatalogError;
    use crate::event::EventBus;
    use crate::state::NotifyPolicy;
    use crate::types::{ChargeMode, DeviceInstance, DeviceKind, EntityValue, LimitMode};

    const CONFIG: &str = "openWB/chargepoint/4/get/connected_vehicle/config";
    const TEMPLATE: &str = "openWB/vehicle/template/charge_template/1";

    fn dispatcher(transport: Transport) -> UpdateDispatcher {
        let d = UpdateDispatcher::new(
            DeviceInstance::new(DeviceKind::ChargePoint, 4, "openWB"),
            transport,
            NotifyPolicy::Always,
            EventBus::new(),
        );
        d.begin();
        d
    }

    fn with_template(record: &Value) -> UpdateDispatcher {
        let d = dispatcher(Transport::Mqtt);
        d.handle_message(CONFIG, r#"{"charge_template": 1, "chargemode": "instant"}"#);
        d.handle_message(TEMPLATE, &record.to_string());
        d
    }

    fn translate(d: &UpdateDispatcher, key: &str, value: impl Into<CommandValue>) -> Result<OutboundWrite, Error> {
        CommandTranslator::new(22).translate(d, key, &value.into())
    }

    #[tokio::test]
    async fn record_merge_changes_only_the_target_field() {
        let record = json!({
            "id": 1,
            "name": "Standard",
            "chargemode": {
                "selected": "instant_charging",
                "pv_charging": {"min_current": 6, "feed_in_limit": false}
            }
        });
        let d = with_template(&record);

        let write = translate(&d, "template_chargemode", ChargeMode::PvCharging).unwrap();
        let OutboundWrite::Publish { topic, payload } = write else {
            panic!("expected a publish");
        };
        assert_eq!(topic, "openWB/set/vehicle/template/charge_template/1");

        let mut expected = record.clone();
        expected["chargemode"]["selected"] = json!("pv_charging");
        assert_eq!(serde_json::from_str::<Value>(&payload).unwrap(), expected);

        // The stored record is untouched.
        assert_eq!(d.store().value("charge_template_record"), Some(EntityValue::Record(record)));
    }

    #[tokio::test]
    async fn template_switch_waits_for_new_record() {
        let d = with_template(&json!({"id": 1, "name": "Template One", "chargemode": {"selected": "instant_charging"}}));

        let outcome = d.handle_message(CONFIG, r#"{"charge_template": 2, "chargemode": "instant"}"#);
        assert!(outcome.rebind.is_some());
        assert!(d.store().value("charge_template_record").is_none());

        let err = translate(&d, "template_chargemode", ChargeMode::PvCharging).unwrap_err();
        assert!(matches!(
            err,
            Error::Command(CommandError::RecordUnavailable { ref base, .. }) if base == "charge_template_record"
        ));
        let err = translate(&d, "instant_charging_limitation", LimitMode::Soc).unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::RecordUnavailable { .. })));

        d.handle_message(
            "openWB/vehicle/template/charge_template/2",
            r#"{"id": 2, "name": "Template Two"}"#,
        );
        let OutboundWrite::Publish { topic, payload } =
            translate(&d, "template_chargemode", ChargeMode::PvCharging).unwrap()
        else {
            panic!("expected a publish");
        };
        assert_eq!(topic, "openWB/set/vehicle/template/charge_template/2");
        assert_eq!(
            serde_json::from_str::<Value>(&payload).unwrap(),
            json!({"id": 2, "name": "Template Two", "chargemode": {"selected": "pv_charging"}})
        );
    }

    #[tokio::test]
    async fn leaf_merge_sends_only_the_value() {
        let d = with_template(&json!({"chargemode": {"instant_charging": {"limit": {"selected": "none"}}}}));
        let write = translate(&d, "instant_charging_limitation", LimitMode::Soc).unwrap();
        assert_eq!(
            write,
            OutboundWrite::Publish {
                topic: "openWB/set/vehicle/template/charge_template/1/chargemode/instant_charging/limit/selected"
                    .to_string(),
                payload: "soc".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn merge_without_record_is_rejected() {
        let d = dispatcher(Transport::Mqtt);
        for key in ["template_chargemode", "instant_charging_limitation"] {
            let value = CommandValue::Choice("soc".into());
            let value = if key == "template_chargemode" {
                CommandValue::from(ChargeMode::Stop)
            } else {
                value
            };
            let err = CommandTranslator::default().translate(&d, key, &value).unwrap_err();
            assert!(
                matches!(err, Error::Command(CommandError::RecordUnavailable { ref base, .. }) if base == "charge_template_record"),
                "{key}: {err}"
            );
            assert!(err.is_transient());
        }
    }

    #[tokio::test]
    async fn merge_creates_missing_branches() {
        let d = with_template(&json!({"name": "Bare"}));
        let OutboundWrite::Publish { payload, .. } =
            translate(&d, "template_chargemode", ChargeMode::EcoCharging).unwrap()
        else {
            panic!("expected a publish");
        };
        assert_eq!(
            serde_json::from_str::<Value>(&payload).unwrap(),
            json!({"name": "Bare", "chargemode": {"selected": "eco_charging"}})
        );
    }

    #[tokio::test]
    async fn read_only_entities_are_not_writable() {
        let d = dispatcher(Transport::Mqtt);
        let err = translate(&d, "power", 1.0).unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::NotWritable { .. })));

        let d = dispatcher(Transport::Http);
        let err = translate(&d, "template_chargemode", ChargeMode::Stop).unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::NotWritable { .. })));
    }

    #[tokio::test]
    async fn unknown_entity() {
        let d = dispatcher(Transport::Mqtt);
        let err = translate(&d, "turbo", true).unwrap_err();
        assert!(matches!(err, Error::Catalog(CatalogError::UnknownEntity { .. })));
    }

    #[tokio::test]
    async fn current_is_capped_for_small_wallboxes() {
        let d = dispatcher(Transport::Mqtt);
        let small = CommandTranslator::new(11);
        let err = small
            .translate(&d, "instant_charging_current_control", &CommandValue::Number(20.0))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Value(ValueError::OutOfRange { max, .. }) if (max - 16.0).abs() < f64::EPSILON
        ));

        let write = CommandTranslator::new(22)
            .translate(&d, "instant_charging_current_control", &CommandValue::Number(20.0))
            .unwrap();
        assert_eq!(
            write,
            OutboundWrite::Publish {
                topic: "openWB/simpleAPI/set/chargepoint/4/chargecurrent".to_string(),
                payload: "20".to_string(),
            }
        );

        let err = translate(&d, "instant_charging_current_control", 5.0).unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::OutOfRange { .. })));
    }

    #[tokio::test]
    async fn wrong_value_kind_is_rejected() {
        let d = dispatcher(Transport::Mqtt);
        let err = translate(&d, "manual_lock", 1.0).unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::TypeMismatch { expected: "flag", .. })));

        let err = translate(&d, "max_price_eco", true).unwrap_err();
        assert!(matches!(err, Error::Value(ValueError::TypeMismatch { expected: "number", .. })));
    }

    #[tokio::test]
    async fn standby_cannot_be_commanded() {
        let d = dispatcher(Transport::Mqtt);
        let err = translate(&d, "chargemode_control", ChargeMode::Standby).unwrap_err();
        assert!(matches!(err, Error::Command(CommandError::UnsupportedValue { .. })));
    }

    #[tokio::test]
    async fn vehicle_address_waits_for_connected_vehicle() {
        let d = dispatcher(Transport::Mqtt);
        let err = translate(&d, "manual_soc", 42.0).unwrap_err();
        assert!(matches!(
            err,
            Error::Catalog(CatalogError::MissingParameter { ref parameter, .. }) if parameter == "vehicle_id"
        ));

        d.handle_message(
            "openWB/chargepoint/4/get/connected_vehicle/info",
            r#"{"id": 2, "name": "Model 3"}"#,
        );
        let write = translate(&d, "manual_soc", 42.7).unwrap();
        assert_eq!(
            write,
            OutboundWrite::Publish {
                topic: "openWB/set/vehicle/2/soc_module/calculated_soc_state/manual_soc".to_string(),
                payload: "42".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn push_encodings() {
        let d = dispatcher(Transport::Mqtt);
        let payload = |key, value: CommandValue| match translate(&d, key, value).unwrap() {
            OutboundWrite::Publish { payload, .. } => payload,
            OutboundWrite::Submit { .. } => panic!("expected a publish"),
        };
        assert_eq!(payload("manual_lock", true.into()), "true");
        assert_eq!(payload("manual_lock", false.into()), "false");
        assert_eq!(payload("instant_charging_energy_limit_control", 12.5.into()), "12500");
        assert_eq!(payload("chargemode_control", ChargeMode::ScheduledCharging.into()), "target");
        assert_eq!(payload("chargemode_control", CommandValue::Choice("eco".into())), "eco");
        assert_eq!(payload("connected_vehicle", 3u32.into()), "3");
    }

    #[tokio::test]
    async fn pull_submissions() {
        let d = dispatcher(Transport::Http);
        let body = |key, value: CommandValue| translate(&d, key, value).unwrap().form_body().unwrap();
        assert_eq!(
            body("instant_charging_current_control", 16.0.into()),
            "chargecurrent=16&chargepoint_nr=4"
        );
        assert_eq!(
            body("chargemode_control", ChargeMode::PvCharging.into()),
            "set_chargemode=pv&chargepoint_nr=4"
        );
        assert_eq!(body("manual_lock", true.into()), "chargepoint_lock=1&chargepoint_nr=4");
        assert_eq!(
            body("instant_charging_energy_limit_control", 10.0.into()),
            "instant_charging_amount=10&chargepoint_nr=4"
        );
        assert_eq!(body("connected_vehicle", 1u32.into()), "vehicle=1&chargepoint_nr=4");
    }
}
