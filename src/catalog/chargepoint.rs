// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Charge point entities.

use super::{
    CommandTable, Encoding, EntityDescriptor, Granularity, KindCatalog, ParameterBinding,
    Platform, WritePolicy,
};
use crate::decode::{DecodingRule, EnumTable, FieldConversion, NumericTransform, TextCleanup};

/// Charge modes as reported, to canonical names.
pub(crate) const CHARGEMODE_STATES: EnumTable = &[
    ("instant_charging", "instant_charging"),
    ("instant", "instant_charging"),
    ("scheduled_charging", "scheduled_charging"),
    ("target", "scheduled_charging"),
    ("pv_charging", "pv_charging"),
    ("pv", "pv_charging"),
    ("eco_charging", "eco_charging"),
    ("eco", "eco_charging"),
    ("standby", "standby"),
    ("stop", "stop"),
];

/// Charge modes accepted by the simple API.
pub(crate) const CHARGEMODE_COMMANDS: CommandTable = &[
    ("instant_charging", "instant"),
    ("pv_charging", "pv"),
    ("eco_charging", "eco"),
    ("scheduled_charging", "target"),
    ("stop", "stop"),
];

/// Charge modes as stored in a charge template.
const TEMPLATE_CHARGEMODES: CommandTable = &[
    ("instant_charging", "instant_charging"),
    ("scheduled_charging", "scheduled_charging"),
    ("pv_charging", "pv_charging"),
    ("eco_charging", "eco_charging"),
    ("standby", "standby"),
    ("stop", "stop"),
];

const LIMIT_STATES: EnumTable = &[("none", "none"), ("soc", "soc"), ("amount", "amount")];

const LIMIT_COMMANDS: CommandTable = &[("none", "none"), ("soc", "soc"), ("amount", "amount")];

const WH_TO_KWH: DecodingRule = DecodingRule::Numeric(NumericTransform::WH_TO_KWH);

const TEMPLATE_RECORD: &str = "charge_template_record";

const fn template_field(path: &'static [&'static str], convert: FieldConversion) -> DecodingRule {
    DecodingRule::JsonField { path, convert }
}

const NUMBER_FIELD: FieldConversion = FieldConversion::Numeric(NumericTransform::Raw);

const MAX_PRICE: FieldConversion = FieldConversion::Numeric(NumericTransform::Multiply {
    by: 100_000.0,
    decimals: Some(4),
});

static ENTITIES: &[EntityDescriptor] = &[
    // Meter readings
    reading!("currents", "get/currents", DecodingRule::NumericList),
    reading!("voltages", "get/voltages", DecodingRule::NumericList),
    reading!("power_factors", "get/power_factors", DecodingRule::NumericList).optional(),
    reading!("powers", "get/powers", DecodingRule::NumericList).optional(),
    reading!("power", "get/power", DecodingRule::NUMBER),
    EntityDescriptor::new("frequency", Platform::Sensor)
        .push(device_address!("get/frequency"), DecodingRule::NUMBER)
        .optional(),
    reading!(
        "evse_current",
        "get/evse_current",
        DecodingRule::Numeric(NumericTransform::Round(2))
    )
    .optional(),
    reading!("phases_in_use", "get/phases_in_use", DecodingRule::NUMBER),
    reading!("imported", "get/imported", WH_TO_KWH),
    reading!("exported", "get/exported", WH_TO_KWH),
    reading!("daily_imported", "get/daily_imported", WH_TO_KWH),
    reading!("daily_exported", "get/daily_exported", WH_TO_KWH),
    // Status
    reading!(
        "fault_str",
        "get/fault_str",
        DecodingRule::Text(TextCleanup::Status)
    )
    .optional(),
    reading!(
        "state_str",
        "get/state_str",
        DecodingRule::Text(TextCleanup::StatusWithUmlauts)
    )
    .optional(),
    reading!("rfid", "get/rfid", DecodingRule::TEXT).optional(),
    reading!("vehicle_id", "get/vehicle_id", DecodingRule::TEXT).optional(),
    EntityDescriptor::new("name", Platform::Sensor)
        .push(
            device_address!("config"),
            template_field(&["name"], FieldConversion::Text(TextCleanup::Trim)),
        )
        .pull("config_name", DecodingRule::TEXT)
        .optional(),
    // Connected vehicle
    EntityDescriptor::new("connected_vehicle_name", Platform::Sensor)
        .push(
            device_address!("get/connected_vehicle/info"),
            template_field(&["name"], FieldConversion::Text(TextCleanup::Unquote)),
        )
        .pull(
            "connected_vehicle_name",
            DecodingRule::Text(TextCleanup::Unquote),
        )
        .optional(),
    EntityDescriptor::new("charge_template", Platform::Sensor)
        .push(
            device_address!("get/connected_vehicle/config"),
            template_field(&["charge_template"], NUMBER_FIELD),
        )
        .pull("charge_template_name", DecodingRule::TEXT)
        .optional(),
    EntityDescriptor::new("chargemode", Platform::Sensor)
        .push(
            device_address!("get/connected_vehicle/config"),
            template_field(&["chargemode"], FieldConversion::Lookup(CHARGEMODE_STATES)),
        )
        .pull("chargemode", DecodingRule::Lookup(CHARGEMODE_STATES)),
    EntityDescriptor::new("soc", Platform::Sensor)
        .push(
            device_address!("get/connected_vehicle/soc"),
            template_field(&["soc"], NUMBER_FIELD),
        )
        .pull("soc", DecodingRule::NUMBER)
        .optional(),
    EntityDescriptor::new("soc_timestamp", Platform::Sensor)
        .push(
            device_address!("get/connected_vehicle/soc"),
            template_field(&["timestamp"], FieldConversion::Timestamp),
        )
        .pull("soc_timestamp", DecodingRule::Timestamp)
        .optional(),
    EntityDescriptor::new("range_charged", Platform::Sensor)
        .push(
            device_address!("get/connected_vehicle/soc"),
            template_field(&["range_charged"], NUMBER_FIELD),
        )
        .pull("range_charged", DecodingRule::NUMBER)
        .optional(),
    // Charge templates
    EntityDescriptor::new(TEMPLATE_RECORD, Platform::Sensor)
        .push(
            root_address!("vehicle/template/charge_template/{charge_template_id}"),
            DecodingRule::RECORD,
        )
        .optional(),
    EntityDescriptor::new("chargepoint_template", Platform::Sensor)
        .push(device_address!("set/charge_template"), DecodingRule::RECORD)
        .optional(),
    EntityDescriptor::new("instant_charging_current", Platform::Sensor)
        .push(
            root_address!("vehicle/template/charge_template/{charge_template_id}"),
            template_field(&["chargemode", "instant_charging", "current"], NUMBER_FIELD),
        )
        .pull("instant_charging_current", DecodingRule::NUMBER)
        .optional(),
    EntityDescriptor::new("pv_charging_min_current", Platform::Sensor)
        .push(
            root_address!("vehicle/template/charge_template/{charge_template_id}"),
            template_field(&["chargemode", "pv_charging", "min_current"], NUMBER_FIELD),
        )
        .pull("pv_charging_min_current", DecodingRule::NUMBER)
        .optional(),
    EntityDescriptor::new("price_based_charging_max_price", Platform::Sensor)
        .push(
            root_address!("vehicle/template/charge_template/{charge_template_id}"),
            template_field(&["chargemode", "eco_charging", "max_price"], MAX_PRICE),
        )
        .optional(),
    // Binary sensors
    EntityDescriptor::new("plug_state", Platform::BinarySensor)
        .push(device_address!("get/plug_state"), DecodingRule::Flag)
        .pull("plug_state", DecodingRule::Flag),
    EntityDescriptor::new("charge_state", Platform::BinarySensor)
        .push(device_address!("get/charge_state"), DecodingRule::Flag)
        .pull("charge_state", DecodingRule::Flag),
    EntityDescriptor::new("fault_state", Platform::BinarySensor)
        .push(device_address!("get/fault_state"), DecodingRule::Flag)
        .pull("fault_state", DecodingRule::Flag),
    // Selects
    EntityDescriptor::new("chargemode_control", Platform::Select)
        .push(
            device_address!("get/connected_vehicle/config"),
            template_field(&["chargemode"], FieldConversion::Lookup(CHARGEMODE_STATES)),
        )
        .pull("chargemode", DecodingRule::Lookup(CHARGEMODE_STATES))
        .writes(
            root_address!("simpleAPI/set/chargepoint/{id}/chargemode"),
            Encoding::Choice(CHARGEMODE_COMMANDS),
        )
        .submits("set_chargemode", Encoding::Choice(CHARGEMODE_COMMANDS))
        .optional(),
    EntityDescriptor::new("instant_charging_limitation", Platform::Select)
        .push(
            root_address!("vehicle/template/charge_template/{charge_template_id}"),
            template_field(
                &["chargemode", "instant_charging", "limit", "selected"],
                FieldConversion::Lookup(LIMIT_STATES),
            ),
        )
        .pull("instant_charging_limit", DecodingRule::Lookup(LIMIT_STATES))
        .merges(
            root_address!(
                "set/vehicle/template/charge_template/{charge_template_id}/chargemode/instant_charging/limit/selected"
            ),
            Encoding::Choice(LIMIT_COMMANDS),
            WritePolicy::IndirectMerge {
                base: TEMPLATE_RECORD,
                path: &["chargemode", "instant_charging", "limit", "selected"],
                granularity: Granularity::Leaf,
            },
        )
        .submits("instant_charging_limit", Encoding::Choice(LIMIT_COMMANDS))
        .optional(),
    EntityDescriptor::new("template_chargemode", Platform::Select)
        .push(
            root_address!("vehicle/template/charge_template/{charge_template_id}"),
            template_field(
                &["chargemode", "selected"],
                FieldConversion::Lookup(CHARGEMODE_STATES),
            ),
        )
        .merges(
            root_address!("set/vehicle/template/charge_template/{charge_template_id}"),
            Encoding::Choice(TEMPLATE_CHARGEMODES),
            WritePolicy::IndirectMerge {
                base: TEMPLATE_RECORD,
                path: &["chargemode", "selected"],
                granularity: Granularity::Record,
            },
        )
        .optional(),
    EntityDescriptor::new("connected_vehicle", Platform::Select)
        .push(
            device_address!("get/connected_vehicle/info"),
            template_field(&["id"], NUMBER_FIELD),
        )
        .pull("vehicle_id", DecodingRule::NUMBER)
        .writes(
            root_address!("set/chargepoint/{id}/config/ev"),
            Encoding::Integer,
        )
        .submits("vehicle", Encoding::Integer)
        .optional(),
    // Numbers
    EntityDescriptor::new("manual_soc", Platform::Number)
        .push(
            device_address!("get/connected_vehicle/soc"),
            template_field(&["soc"], NUMBER_FIELD),
        )
        .pull("soc", DecodingRule::NUMBER)
        .writes(
            root_address!("set/vehicle/{vehicle_id}/soc_module/calculated_soc_state/manual_soc"),
            Encoding::Integer,
        )
        .submits("manual_soc", Encoding::Integer)
        .bounds(0.0, 100.0)
        .optional(),
    EntityDescriptor::new("instant_charging_current_control", Platform::Number)
        .push(
            device_address!("set/charge_template"),
            template_field(&["chargemode", "instant_charging", "current"], NUMBER_FIELD),
        )
        .pull("instant_charging_current", DecodingRule::NUMBER)
        .writes(
            root_address!("simpleAPI/set/chargepoint/{id}/chargecurrent"),
            Encoding::Integer,
        )
        .submits("chargecurrent", Encoding::Integer)
        .current_bounds(6.0, 32.0)
        .optional(),
    EntityDescriptor::new("pv_charging_min_current_control", Platform::Number)
        .push(
            device_address!("set/charge_template"),
            template_field(&["chargemode", "pv_charging", "min_current"], NUMBER_FIELD),
        )
        .pull("pv_charging_min_current", DecodingRule::NUMBER)
        .writes(
            root_address!("simpleAPI/set/chargepoint/{id}/minimal_permanent_current"),
            Encoding::Integer,
        )
        .submits("minimal_permanent_current", Encoding::Integer)
        .current_bounds(0.0, 32.0)
        .optional(),
    EntityDescriptor::new("instant_charging_energy_limit_control", Platform::Number)
        .push(
            device_address!("set/charge_template"),
            template_field(
                &["chargemode", "instant_charging", "limit", "amount"],
                FieldConversion::Numeric(NumericTransform::Divide {
                    by: 1000.0,
                    decimals: None,
                }),
            ),
        )
        .pull(
            "instant_charging_amount",
            DecodingRule::Numeric(NumericTransform::Divide {
                by: 1000.0,
                decimals: None,
            }),
        )
        .writes(
            root_address!("simpleAPI/set/instant_charging_limit_amount"),
            Encoding::Scaled(1000.0),
        )
        .submits("instant_charging_amount", Encoding::Integer)
        .echo_scale(1000.0)
        .bounds(1.0, 50.0)
        .optional(),
    EntityDescriptor::new("instant_charging_soc_limit_control", Platform::Number)
        .push(
            device_address!("set/charge_template"),
            template_field(&["chargemode", "instant_charging", "limit", "soc"], NUMBER_FIELD),
        )
        .pull("instant_charging_soc", DecodingRule::NUMBER)
        .writes(
            root_address!("simpleAPI/set/instant_charging_limit_soc"),
            Encoding::Integer,
        )
        .submits("instant_charging_soc", Encoding::Integer)
        .bounds(5.0, 100.0)
        .optional(),
    EntityDescriptor::new("max_price_eco", Platform::Number)
        .push(
            device_address!("set/charge_template"),
            template_field(&["chargemode", "eco_charging", "max_price"], MAX_PRICE),
        )
        .pull("max_price_eco", DecodingRule::NUMBER)
        .writes(
            root_address!("simpleAPI/set/chargepoint/{id}/max_price_eco"),
            Encoding::Integer,
        )
        .submits("max_price_eco", Encoding::Integer)
        .bounds(0.0, 100.0)
        .optional(),
    // Lock
    EntityDescriptor::new("manual_lock", Platform::Lock)
        .push(device_address!("set/manual_lock"), DecodingRule::Flag)
        .pull("manual_lock", DecodingRule::Flag)
        .writes(
            root_address!("set/chargepoint/{id}/set/manual_lock"),
            Encoding::Flag {
                on: "true",
                off: "false",
            },
        )
        .submits("chargepoint_lock", Encoding::Flag { on: "1", off: "0" })
        .optional(),
];

static PARAMETERS: &[ParameterBinding] = &[
    ParameterBinding {
        name: "charge_template_id",
        source: "charge_template",
    },
    ParameterBinding {
        name: "vehicle_id",
        source: "connected_vehicle",
    },
];

pub(super) static CATALOG: KindCatalog = KindCatalog {
    entities: ENTITIES,
    parameters: PARAMETERS,
    liveness: "power",
};
