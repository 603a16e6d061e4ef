// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parameterized address templates.

use std::collections::BTreeMap;

use crate::types::DeviceKind;

/// A parameterized address.
///
/// Placeholders are written as `{name}`. The instance supplies `{prefix}`,
/// `{segment}` and `{id}`; other placeholders are filled from observed
/// entity values.
///
/// # Examples
///
/// ```
/// use openwb_bridge::catalog::{AddressParams, AddressTemplate};
/// use openwb_bridge::types::DeviceKind;
///
/// let template = AddressTemplate::new("{prefix}/{segment}/{id}/get/power");
/// let params = AddressParams::new(DeviceKind::ChargePoint, "openWB", 4);
/// assert_eq!(template.render(&params).unwrap(), "openWB/chargepoint/4/get/power");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressTemplate(&'static str);

impl AddressTemplate {
    /// Creates a template from a pattern.
    #[must_use]
    pub const fn new(pattern: &'static str) -> Self {
        Self(pattern)
    }

    /// Returns the raw pattern.
    #[must_use]
    pub const fn pattern(&self) -> &'static str {
        self.0
    }

    /// Iterates over the placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &'static str> {
        let mut rest = self.0;
        std::iter::from_fn(move || {
            let start = rest.find('{')?;
            let after = &rest[start + 1..];
            let end = after.find('}')?;
            rest = &after[end + 1..];
            Some(&after[..end])
        })
    }

    /// Returns `true` if the template contains `{name}`.
    #[must_use]
    pub fn uses(&self, name: &str) -> bool {
        self.placeholders().any(|p| p == name)
    }

    /// Renders the template.
    ///
    /// # Errors
    ///
    /// Returns the name of the first placeholder without a value.
    pub fn render(&self, params: &AddressParams) -> Result<String, &'static str> {
        let mut out = String::with_capacity(self.0.len() + 16);
        let mut rest = self.0;
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = &after[..end];
            out.push_str(params.get(name).ok_or(name)?);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl std::fmt::Display for AddressTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Values for template placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressParams {
    values: BTreeMap<&'static str, String>,
}

impl AddressParams {
    /// Creates the instance parameters `{prefix}`, `{segment}` and `{id}`.
    #[must_use]
    pub fn new(kind: DeviceKind, prefix: impl Into<String>, id: u32) -> Self {
        let mut values = BTreeMap::new();
        values.insert("prefix", prefix.into());
        values.insert("segment", kind.segment().to_string());
        values.insert("id", id.to_string());
        Self { values }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets a parameter, replacing any previous value.
    pub fn insert(&mut self, name: &'static str, value: impl Into<String>) {
        self.values.insert(name, value.into());
    }

    /// Removes a parameter.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(name)
    }

    /// Returns the value of a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_instance_placeholders() {
        let params = AddressParams::new(DeviceKind::Battery, "openWB", 2);
        let t = AddressTemplate::new("{prefix}/{segment}/{id}/get/soc");
        assert_eq!(t.render(&params).unwrap(), "openWB/bat/2/get/soc");
    }

    #[test]
    fn missing_parameter_is_named() {
        let params = AddressParams::new(DeviceKind::ChargePoint, "openWB", 4);
        let t = AddressTemplate::new("{prefix}/vehicle/template/charge_template/{charge_template_id}");
        assert_eq!(t.render(&params), Err("charge_template_id"));

        let params = params.with("charge_template_id", "3");
        assert_eq!(
            t.render(&params).unwrap(),
            "openWB/vehicle/template/charge_template/3"
        );
    }

    #[test]
    fn placeholders_in_order() {
        let t = AddressTemplate::new("{prefix}/set/vehicle/{vehicle_id}/soc_module/{id}");
        let names: Vec<_> = t.placeholders().collect();
        assert_eq!(names, ["prefix", "vehicle_id", "id"]);
        assert!(t.uses("vehicle_id"));
        assert!(!t.uses("segment"));
    }

    #[test]
    fn unterminated_brace_is_literal() {
        let params = AddressParams::new(DeviceKind::Counter, "p", 0);
        let t = AddressTemplate::new("{prefix}/odd{");
        assert_eq!(t.render(&params).unwrap(), "p/odd{");
    }

    #[test]
    fn controller_segment_is_system() {
        let params = AddressParams::new(DeviceKind::Controller, "openWB", 0);
        assert_eq!(params.get("segment"), Some("system"));
        assert_eq!(params.get("id"), Some("0"));
    }
}
