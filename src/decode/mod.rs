// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Payload decoding.
//!
//! Every payload shape the controller produces is described by a
//! [`DecodingRule`]. Decoding is pure: the same payload under the same rule
//! always yields the same value, and nothing is cached between calls.
//!
//! Empty payloads and a literal `null` decode to "absent" under every rule;
//! a push broker delivers an empty retained message when a topic is cleared.
//!
//! # Examples
//!
//! ```
//! use openwb_bridge::decode::{DecodingRule, FieldConversion};
//! use openwb_bridge::types::EntityValue;
//!
//! let currents = DecodingRule::NumericList.decode("[3.1,3.2,3.0]").unwrap();
//! assert_eq!(currents, Some(EntityValue::List(vec![3.1, 3.2, 3.0])));
//!
//! let soc = DecodingRule::JsonField { path: &["soc"], convert: FieldConversion::AsIs };
//! assert_eq!(soc.decode("{}").unwrap(), None);
//! ```

mod text;

use chrono::DateTime;
use serde_json::Value;

use crate::error::DecodeError;
use crate::types::{Choice, EntityValue};

pub use text::{MAX_STATUS_LEN, TextCleanup};

/// A lookup table from raw device values to canonical state names.
///
/// Several raw values may map to the same canonical name.
pub type EnumTable = &'static [(&'static str, &'static str)];

/// Scaling applied to a numeric reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericTransform {
    /// The value as delivered.
    Raw,
    /// The absolute value.
    Absolute,
    /// Rounded to a number of decimal places.
    Round(i32),
    /// Divided by a constant, optionally rounded.
    Divide {
        /// The divisor.
        by: f64,
        /// Decimal places kept, if rounding.
        decimals: Option<i32>,
    },
    /// Multiplied by a constant, optionally rounded.
    Multiply {
        /// The factor.
        by: f64,
        /// Decimal places kept, if rounding.
        decimals: Option<i32>,
    },
}

impl NumericTransform {
    /// Watt-hours to kilowatt-hours with three decimals.
    pub const WH_TO_KWH: Self = Self::Divide {
        by: 1000.0,
        decimals: Some(3),
    };

    /// Kilowatts to whole watts.
    pub const KW_TO_W: Self = Self::Multiply {
        by: 1000.0,
        decimals: Some(0),
    };

    /// Applies the transform.
    #[must_use]
    pub fn apply(self, n: f64) -> f64 {
        match self {
            Self::Raw => n,
            Self::Absolute => n.abs(),
            Self::Round(decimals) => round_to(n, Some(decimals)),
            Self::Divide { by, decimals } => round_to(n / by, decimals),
            Self::Multiply { by, decimals } => round_to(n * by, decimals),
        }
    }
}

fn round_to(n: f64, decimals: Option<i32>) -> f64 {
    match decimals {
        Some(d) => {
            let factor = 10f64.powi(d);
            (n * factor).round() / factor
        }
        None => n,
    }
}

/// How a value projected out of a JSON document is typed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldConversion {
    /// Typed after its JSON shape: numbers, strings, booleans, or a record
    /// for objects and arrays.
    AsIs,
    /// A number (or numeric string), transformed.
    Numeric(NumericTransform),
    /// A string, cleaned.
    Text(TextCleanup),
    /// A named state looked up in a table.
    Lookup(EnumTable),
    /// Seconds since the Unix epoch.
    Timestamp,
}

impl FieldConversion {
    fn convert(self, value: &Value) -> Result<Option<EntityValue>, DecodeError> {
        if value.is_null() {
            return Ok(None);
        }
        let converted = match self {
            Self::AsIs => match value {
                Value::Bool(b) => EntityValue::Flag(*b),
                Value::Number(n) => match n.as_f64() {
                    Some(f) => EntityValue::Number(f),
                    None => return Err(DecodeError::malformed("json", format!("{n} overflows"))),
                },
                Value::String(s) => EntityValue::Text(s.trim().to_string()),
                other => EntityValue::Record(other.clone()),
            },
            Self::Numeric(transform) => {
                let n = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => Some(parse_number(s.trim())?),
                    _ => None,
                };
                let n = n.ok_or_else(|| {
                    DecodeError::malformed("numeric", format!("{value} is not a number"))
                })?;
                EntityValue::Number(transform.apply(n))
            }
            Self::Text(cleanup) => EntityValue::Text(cleanup.apply(&scalar_text(value))),
            Self::Lookup(table) => EntityValue::Choice(lookup(table, &scalar_text(value))),
            Self::Timestamp => parse_epoch(&scalar_text(value))?,
        };
        Ok(Some(converted))
    }
}

/// Describes how a raw payload becomes a typed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodingRule {
    /// An integer or floating point reading.
    Numeric(NumericTransform),
    /// A string, cleaned.
    Text(TextCleanup),
    /// A comma separated list of numbers, optionally bracketed. Order is kept.
    NumericList,
    /// One field of a JSON document. An empty path keeps the whole document
    /// as a record; a missing path decodes to absent.
    JsonField {
        /// Field names from the root to the value.
        path: &'static [&'static str],
        /// Typing of the projected value.
        convert: FieldConversion,
    },
    /// A named state; unrecognized values become [`Choice::Unknown`].
    Lookup(EnumTable),
    /// An on/off state given as a number or as `true`/`on`/`false`/`off`.
    Flag,
    /// Seconds since the Unix epoch.
    Timestamp,
}

impl DecodingRule {
    /// A plain numeric reading.
    pub const NUMBER: Self = Self::Numeric(NumericTransform::Raw);

    /// A trimmed string.
    pub const TEXT: Self = Self::Text(TextCleanup::Trim);

    /// The whole JSON document, kept as a record.
    pub const RECORD: Self = Self::JsonField {
        path: &[],
        convert: FieldConversion::AsIs,
    };

    /// A field of a JSON document, typed after its JSON shape.
    #[must_use]
    pub const fn field(path: &'static [&'static str]) -> Self {
        Self::JsonField {
            path,
            convert: FieldConversion::AsIs,
        }
    }

    /// Returns the rule name used in error messages.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "numeric",
            Self::Text(_) => "text",
            Self::NumericList => "list",
            Self::JsonField { .. } => "json",
            Self::Lookup(_) => "lookup",
            Self::Flag => "flag",
            Self::Timestamp => "timestamp",
        }
    }

    /// Returns `true` if this rule keeps a whole structured document.
    #[must_use]
    pub const fn is_record(&self) -> bool {
        matches!(self, Self::JsonField { path: [], convert: FieldConversion::AsIs })
    }

    /// Decodes a raw push payload.
    ///
    /// Returns `Ok(None)` when the payload carries no value (empty, `null`,
    /// or a JSON path that is not present).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] when the payload cannot be
    /// parsed under this rule.
    pub fn decode(&self, raw: &str) -> Result<Option<EntityValue>, DecodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }

        match *self {
            Self::Numeric(transform) => {
                let n = parse_number(unquote(trimmed))?;
                Ok(Some(EntityValue::Number(transform.apply(n))))
            }
            Self::Text(cleanup) => Ok(Some(EntityValue::Text(cleanup.apply(trimmed)))),
            Self::NumericList => parse_list(unquote(trimmed)).map(|v| Some(EntityValue::List(v))),
            Self::JsonField { path, convert } => {
                let doc: Value = serde_json::from_str(trimmed)
                    .map_err(|e| DecodeError::malformed("json", e.to_string()))?;
                match project(&doc, path) {
                    Some(value) => convert.convert(value),
                    None => Ok(None),
                }
            }
            Self::Lookup(table) => Ok(Some(EntityValue::Choice(lookup(table, unquote(trimmed))))),
            Self::Flag => parse_flag(unquote(trimmed)).map(|b| Some(EntityValue::Flag(b))),
            Self::Timestamp => parse_epoch(unquote(trimmed)).map(Some),
        }
    }

    /// Decodes one field of a pull response.
    ///
    /// Strings are decoded like push payloads; other JSON values are decoded
    /// from their serialized form.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::MalformedPayload`] when the value cannot be
    /// parsed under this rule.
    pub fn decode_field(&self, value: &Value) -> Result<Option<EntityValue>, DecodeError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => self.decode(s),
            other => self.decode(&other.to_string()),
        }
    }
}

/// Decodes `raw` under `rule`.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedPayload`] when the payload cannot be
/// parsed under the rule.
pub fn decode(raw: &str, rule: &DecodingRule) -> Result<Option<EntityValue>, DecodeError> {
    rule.decode(raw)
}

fn unquote(s: &str) -> &str {
    s.trim_matches('"').trim()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn project<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = doc;
    for key in path {
        current = current.get(key)?;
    }
    (!current.is_null()).then_some(current)
}

fn parse_number(s: &str) -> Result<f64, DecodeError> {
    let n: f64 = s
        .parse()
        .map_err(|_| DecodeError::malformed("numeric", format!("{s} is not a number")))?;
    if n.is_finite() {
        Ok(n)
    } else {
        Err(DecodeError::malformed("numeric", format!("{s} is out of range")))
    }
}

fn parse_list(s: &str) -> Result<Vec<f64>, DecodeError> {
    let inner = s.trim_start_matches('[').trim_end_matches(']').trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|item| {
            parse_number(unquote(item))
                .map_err(|_| DecodeError::malformed("list", format!("{item} is not a number")))
        })
        .collect()
}

fn parse_flag(s: &str) -> Result<bool, DecodeError> {
    if let Ok(i) = s.parse::<i64>() {
        return Ok(i != 0);
    }
    match s.to_lowercase().as_str() {
        "true" | "on" => Ok(true),
        "false" | "off" => Ok(false),
        _ => Err(DecodeError::malformed("flag", format!("{s} is not an on/off state"))),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_epoch(s: &str) -> Result<EntityValue, DecodeError> {
    let secs = parse_number(unquote(s))
        .map_err(|_| DecodeError::malformed("timestamp", format!("{s} is not an epoch time")))?;
    let nanos = (secs.fract().abs() * 1e9) as u32;
    DateTime::from_timestamp(secs.trunc() as i64, nanos)
        .map(EntityValue::Timestamp)
        .ok_or_else(|| DecodeError::malformed("timestamp", format!("{s} is out of range")))
}

fn lookup(table: EnumTable, raw: &str) -> Choice {
    table
        .iter()
        .find(|(device, _)| device.eq_ignore_ascii_case(raw))
        .map_or_else(|| Choice::Unknown(raw.to_string()), |(_, name)| Choice::Known(*name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MODES: EnumTable = &[("instant", "instant_charging"), ("pv", "pv_charging")];

    #[test]
    fn numeric_plain_and_scaled() {
        assert_eq!(DecodingRule::NUMBER.decode("-1234.5").unwrap(), Some(EntityValue::Number(-1234.5)));
        let kwh = DecodingRule::Numeric(NumericTransform::WH_TO_KWH);
        assert_eq!(kwh.decode("12345.678").unwrap(), Some(EntityValue::Number(12.346)));
        let abs = DecodingRule::Numeric(NumericTransform::Absolute);
        assert_eq!(abs.decode("-4200").unwrap(), Some(EntityValue::Number(4200.0)));
        let rounded = DecodingRule::Numeric(NumericTransform::Round(2));
        assert_eq!(rounded.decode("15.996").unwrap(), Some(EntityValue::Number(16.0)));
        let watts = DecodingRule::Numeric(NumericTransform::KW_TO_W);
        assert_eq!(watts.decode("-1.2345").unwrap(), Some(EntityValue::Number(-1235.0)));
    }

    #[test]
    fn numeric_rejects_garbage() {
        let err = DecodingRule::NUMBER.decode("N/A").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload { rule: "numeric", .. }));
        assert!(DecodingRule::NUMBER.decode("inf").is_err());
        assert!(DecodingRule::NUMBER.decode("1e999").is_err());
    }

    #[test]
    fn empty_and_null_are_absent() {
        assert_eq!(DecodingRule::NUMBER.decode("").unwrap(), None);
        assert_eq!(DecodingRule::NumericList.decode(" null ").unwrap(), None);
        assert_eq!(DecodingRule::RECORD.decode("").unwrap(), None);
    }

    #[test]
    fn list_keeps_phase_order() {
        let rule = DecodingRule::NumericList;
        assert_eq!(rule.decode("3.1,3.2,3.0").unwrap(), Some(EntityValue::List(vec![3.1, 3.2, 3.0])));
        assert_eq!(
            rule.decode("[230.1, 229.8, 231.0]").unwrap(),
            Some(EntityValue::List(vec![230.1, 229.8, 231.0]))
        );
        assert_eq!(rule.decode("[]").unwrap(), Some(EntityValue::List(vec![])));
        assert!(rule.decode("1.0,abc,2.0").is_err());
    }

    #[test]
    fn json_field_missing_path_is_absent() {
        let rule = DecodingRule::field(&["soc"]);
        assert_eq!(rule.decode("{}").unwrap(), None);
        assert_eq!(rule.decode(r#"{"soc": null}"#).unwrap(), None);
        assert_eq!(rule.decode(r#"{"soc": 57}"#).unwrap(), Some(EntityValue::Number(57.0)));
    }

    #[test]
    fn json_field_nested_path() {
        let rule = DecodingRule::field(&["chargemode", "instant_charging", "current"]);
        let doc = r#"{"chargemode": {"instant_charging": {"current": 16}}}"#;
        assert_eq!(rule.decode(doc).unwrap(), Some(EntityValue::Number(16.0)));
        assert_eq!(rule.decode(r#"{"chargemode": 5}"#).unwrap(), None);
    }

    #[test]
    fn json_field_invalid_json_is_malformed() {
        let err = DecodingRule::field(&["id"]).decode("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload { rule: "json", .. }));
    }

    #[test]
    fn record_keeps_whole_document() {
        assert!(DecodingRule::RECORD.is_record());
        let value = DecodingRule::RECORD.decode(r#"{"name": "Standard", "id": 0}"#).unwrap();
        assert_eq!(value, Some(EntityValue::Record(json!({"name": "Standard", "id": 0}))));
    }

    #[test]
    fn field_conversions() {
        let scaled = DecodingRule::JsonField {
            path: &["max_price"],
            convert: FieldConversion::Numeric(NumericTransform::Multiply { by: 100_000.0, decimals: Some(4) }),
        };
        assert_eq!(scaled.decode(r#"{"max_price": 0.0003}"#).unwrap(), Some(EntityValue::Number(30.0)));

        let mode = DecodingRule::JsonField {
            path: &["chargemode"],
            convert: FieldConversion::Lookup(MODES),
        };
        assert_eq!(
            mode.decode(r#"{"chargemode": "pv"}"#).unwrap(),
            Some(EntityValue::Choice(Choice::Known("pv_charging")))
        );

        let when = DecodingRule::JsonField { path: &["timestamp"], convert: FieldConversion::Timestamp };
        let value = when.decode(r#"{"timestamp": 1700000000}"#).unwrap().unwrap();
        assert_eq!(value.as_timestamp().unwrap().timestamp(), 1_700_000_000);

        let text = DecodingRule::JsonField { path: &["name"], convert: FieldConversion::Text(TextCleanup::Trim) };
        assert_eq!(text.decode(r#"{"name": " Model 3 "}"#).unwrap(), Some(EntityValue::Text("Model 3".into())));
    }

    #[test]
    fn lookup_tolerates_new_states() {
        let rule = DecodingRule::Lookup(MODES);
        assert_eq!(rule.decode("\"instant\"").unwrap(), Some(EntityValue::Choice(Choice::Known("instant_charging"))));
        assert_eq!(
            rule.decode("turbo").unwrap(),
            Some(EntityValue::Choice(Choice::Unknown("turbo".into())))
        );
    }

    #[test]
    fn flag_forms() {
        let rule = DecodingRule::Flag;
        assert_eq!(rule.decode("1").unwrap(), Some(EntityValue::Flag(true)));
        assert_eq!(rule.decode("0").unwrap(), Some(EntityValue::Flag(false)));
        assert_eq!(rule.decode("true").unwrap(), Some(EntityValue::Flag(true)));
        assert_eq!(rule.decode("OFF").unwrap(), Some(EntityValue::Flag(false)));
        assert!(rule.decode("maybe").is_err());
    }

    #[test]
    fn timestamp_from_epoch() {
        let value = DecodingRule::Timestamp.decode("1700000000.5").unwrap().unwrap();
        let ts = value.as_timestamp().unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 500);
        assert!(DecodingRule::Timestamp.decode("yesterday").is_err());
    }

    #[test]
    fn decoding_is_idempotent() {
        let rules = [
            (DecodingRule::NUMBER, "42"),
            (DecodingRule::NumericList, "1,2,3"),
            (DecodingRule::field(&["a", "b"]), r#"{"a": {"b": "x"}}"#),
            (DecodingRule::Flag, "on"),
        ];
        for (rule, raw) in rules {
            assert_eq!(rule.decode(raw).unwrap(), rule.decode(raw).unwrap());
        }
    }

    #[test]
    fn pull_fields_decode_from_json_values() {
        assert_eq!(DecodingRule::NUMBER.decode_field(&json!(11.5)).unwrap(), Some(EntityValue::Number(11.5)));
        assert_eq!(
            DecodingRule::NumericList.decode_field(&json!("3.1,3.2,3.0")).unwrap(),
            Some(EntityValue::List(vec![3.1, 3.2, 3.0]))
        );
        assert_eq!(
            DecodingRule::NumericList.decode_field(&json!([1.0, 2.0, 3.0])).unwrap(),
            Some(EntityValue::List(vec![1.0, 2.0, 3.0]))
        );
        assert_eq!(DecodingRule::Flag.decode_field(&json!(true)).unwrap(), Some(EntityValue::Flag(true)));
        assert_eq!(DecodingRule::NUMBER.decode_field(&json!(null)).unwrap(), None);
    }
}
