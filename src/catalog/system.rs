// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vehicle and controller entities.

use super::{AddressTemplate, EntityDescriptor, KindCatalog, Platform};
use crate::decode::{DecodingRule, FieldConversion, NumericTransform, TextCleanup};

static VEHICLE_ENTITIES: &[EntityDescriptor] = &[
    EntityDescriptor::new("name", Platform::Sensor)
        .push(device_address!("name"), DecodingRule::Text(TextCleanup::Unquote))
        .optional(),
    EntityDescriptor::new("soc", Platform::Sensor)
        .push(device_address!("get/soc"), DecodingRule::NUMBER),
    EntityDescriptor::new("range", Platform::Sensor)
        .push(device_address!("get/range"), DecodingRule::NUMBER)
        .optional(),
    EntityDescriptor::new("soc_timestamp", Platform::Sensor)
        .push(device_address!("get/soc_timestamp"), DecodingRule::Timestamp)
        .optional(),
    EntityDescriptor::new("fault_str", Platform::Sensor)
        .push(
            device_address!("get/fault_str"),
            DecodingRule::Text(TextCleanup::Status),
        )
        .optional(),
    EntityDescriptor::new("fault_state", Platform::BinarySensor)
        .push(device_address!("get/fault_state"), DecodingRule::Flag),
];

const LIVE_VALUES: AddressTemplate = root_address!("system/lastlivevaluesJson");

const KW_TO_W: FieldConversion = FieldConversion::Numeric(NumericTransform::KW_TO_W);

/// A field of the live values document, pushed and pulled.
const fn live_value(
    key: &'static str,
    field: &'static [&'static str],
    convert: FieldConversion,
    pull: DecodingRule,
) -> EntityDescriptor {
    EntityDescriptor::new(key, Platform::Sensor)
        .push(LIVE_VALUES, DecodingRule::JsonField { path: field, convert })
        .pull(field[0], pull)
}

macro_rules! vehicle_name {
    ($n:literal) => {
        EntityDescriptor::new(concat!("vehicle_", $n, "_name"), Platform::Sensor)
            .push(
                AddressTemplate::new(concat!("{prefix}/vehicle/", $n, "/name")),
                DecodingRule::Text(TextCleanup::Unquote),
            )
            .optional()
    };
}

static CONTROLLER_ENTITIES: &[EntityDescriptor] = &[
    EntityDescriptor::new("ip_address", Platform::Sensor)
        .push(
            root_address!("system/ip_address"),
            DecodingRule::Text(TextCleanup::Unquote),
        )
        .optional(),
    EntityDescriptor::new("version", Platform::Sensor)
        .push(
            root_address!("system/version"),
            DecodingRule::Text(TextCleanup::Unquote),
        )
        .optional(),
    live_value(
        "live_timestamp",
        &["timestamp"],
        FieldConversion::Timestamp,
        DecodingRule::Timestamp,
    ),
    live_value("grid", &["grid"], KW_TO_W, DecodingRule::Numeric(NumericTransform::KW_TO_W)),
    live_value(
        "house_power",
        &["house-power"],
        KW_TO_W,
        DecodingRule::Numeric(NumericTransform::KW_TO_W),
    ),
    live_value(
        "pv_power",
        &["pv-all"],
        KW_TO_W,
        DecodingRule::Numeric(NumericTransform::KW_TO_W),
    ),
    live_value(
        "charging_power",
        &["charging-all"],
        KW_TO_W,
        DecodingRule::Numeric(NumericTransform::KW_TO_W),
    ),
    live_value(
        "battery_power",
        &["bat-all-power"],
        KW_TO_W,
        DecodingRule::Numeric(NumericTransform::KW_TO_W),
    ),
    live_value(
        "battery_soc",
        &["bat-all-soc"],
        FieldConversion::Numeric(NumericTransform::Round(0)),
        DecodingRule::Numeric(NumericTransform::Round(0)),
    ),
    vehicle_name!(0),
    vehicle_name!(1),
    vehicle_name!(2),
    vehicle_name!(3),
    vehicle_name!(4),
    vehicle_name!(5),
    vehicle_name!(6),
    vehicle_name!(7),
    vehicle_name!(8),
    vehicle_name!(9),
    vehicle_name!(10),
];

pub(super) static VEHICLE: KindCatalog = KindCatalog {
    entities: VEHICLE_ENTITIES,
    parameters: &[],
    liveness: "soc",
};

pub(super) static CONTROLLER: KindCatalog = KindCatalog {
    entities: CONTROLLER_ENTITIES,
    parameters: &[],
    liveness: "live_timestamp",
};
