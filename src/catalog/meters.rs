// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Counter, battery and PV generator entities.

use super::{EntityDescriptor, KindCatalog, Platform};
use crate::decode::{DecodingRule, NumericTransform, TextCleanup};

const WH_TO_KWH: DecodingRule = DecodingRule::Numeric(NumericTransform::WH_TO_KWH);

const POWER: EntityDescriptor = reading!("power", "get/power", DecodingRule::NUMBER);
const IMPORTED: EntityDescriptor = reading!("imported", "get/imported", WH_TO_KWH);
const EXPORTED: EntityDescriptor = reading!("exported", "get/exported", WH_TO_KWH);
const DAILY_IMPORTED: EntityDescriptor = reading!("daily_imported", "get/daily_imported", WH_TO_KWH);
const DAILY_EXPORTED: EntityDescriptor = reading!("daily_exported", "get/daily_exported", WH_TO_KWH);
const CURRENTS: EntityDescriptor = reading!("currents", "get/currents", DecodingRule::NumericList);

const FAULT_STR: EntityDescriptor = reading!(
    "fault_str",
    "get/fault_str",
    DecodingRule::Text(TextCleanup::Status)
)
.optional();

const FAULT_STATE: EntityDescriptor = EntityDescriptor::new("fault_state", Platform::BinarySensor)
    .push(device_address!("get/fault_state"), DecodingRule::Flag)
    .pull("fault_state", DecodingRule::Flag);

static COUNTER_ENTITIES: &[EntityDescriptor] = &[
    reading!("voltages", "get/voltages", DecodingRule::NumericList),
    reading!("power_factors", "get/power_factors", DecodingRule::NumericList).optional(),
    reading!("powers", "get/powers", DecodingRule::NumericList).optional(),
    CURRENTS,
    reading!("frequency", "get/frequency", DecodingRule::NUMBER).optional(),
    POWER,
    FAULT_STR,
    IMPORTED,
    EXPORTED,
    DAILY_IMPORTED,
    DAILY_EXPORTED,
    FAULT_STATE,
];

static BATTERY_ENTITIES: &[EntityDescriptor] = &[
    reading!("soc", "get/soc", DecodingRule::NUMBER),
    POWER,
    FAULT_STR,
    IMPORTED,
    EXPORTED,
    DAILY_IMPORTED,
    DAILY_EXPORTED,
    FAULT_STATE,
];

static PV_ENTITIES: &[EntityDescriptor] = &[
    DAILY_EXPORTED,
    reading!("monthly_exported", "get/monthly_exported", WH_TO_KWH).optional(),
    reading!("yearly_exported", "get/yearly_exported", WH_TO_KWH).optional(),
    EXPORTED,
    reading!(
        "power",
        "get/power",
        DecodingRule::Numeric(NumericTransform::Absolute)
    ),
    CURRENTS.optional(),
    FAULT_STR,
    FAULT_STATE,
];

pub(super) static COUNTER: KindCatalog = KindCatalog {
    entities: COUNTER_ENTITIES,
    parameters: &[],
    liveness: "power",
};

pub(super) static BATTERY: KindCatalog = KindCatalog {
    entities: BATTERY_ENTITIES,
    parameters: &[],
    liveness: "power",
};

pub(super) static PV: KindCatalog = KindCatalog {
    entities: PV_ENTITIES,
    parameters: &[],
    liveness: "power",
};
