// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State of a single entity.

use std::fmt;

use tokio::time::Instant;

use crate::types::EntityValue;

/// Whether an entity's value can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Availability {
    /// A value has been received and the instance is alive.
    Available,
    /// A value was received, but the instance stopped reporting.
    Stale,
    /// No value has been received, or the transport has failed.
    #[default]
    Unknown,
}

impl Availability {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Stale => "stale",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The last known state of one entity of one instance.
///
/// Starts out [`Availability::Unknown`] with no value.
///
/// # Examples
///
/// ```
/// use openwb_bridge::state::{Availability, EntityState};
///
/// let state = EntityState::default();
/// assert_eq!(state.availability(), Availability::Unknown);
/// assert!(state.value().is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityState {
    value: Option<EntityValue>,
    updated_at: Option<Instant>,
    availability: Availability,
}

impl EntityState {
    /// Returns the last decoded value.
    #[must_use]
    pub fn value(&self) -> Option<&EntityValue> {
        self.value.as_ref()
    }

    /// Returns when the value was last set.
    #[must_use]
    pub fn updated_at(&self) -> Option<Instant> {
        self.updated_at
    }

    /// Returns the availability.
    #[must_use]
    pub fn availability(&self) -> Availability {
        self.availability
    }

    /// Returns `true` if the value is current.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.availability == Availability::Available
    }

    /// Stores a new value. Returns `true` if the value or availability
    /// differs from before.
    pub(crate) fn update(&mut self, value: EntityValue, now: Instant) -> bool {
        let changed =
            self.value.as_ref() != Some(&value) || self.availability != Availability::Available;
        self.value = Some(value);
        self.updated_at = Some(now);
        self.availability = Availability::Available;
        changed
    }

    /// Drops the value and returns to unknown. Returns `true` if anything
    /// was held.
    pub(crate) fn clear(&mut self) -> bool {
        let held = self.value.is_some() || self.availability != Availability::Unknown;
        *self = Self::default();
        held
    }

    /// Moves from `from` to `to`. Returns `true` if the state moved.
    pub(crate) fn transition(&mut self, from: Availability, to: Availability) -> bool {
        if self.availability == from {
            self.availability = to;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_marks_available() {
        let mut state = EntityState::default();
        let now = Instant::now();
        assert!(state.update(EntityValue::Number(1.0), now));
        assert!(state.is_available());
        assert_eq!(state.updated_at(), Some(now));
        assert!(!state.update(EntityValue::Number(1.0), now));
        assert!(state.update(EntityValue::Number(2.0), now));
    }

    #[test]
    fn transition_only_from_expected_state() {
        let mut state = EntityState::default();
        assert!(!state.transition(Availability::Available, Availability::Stale));
        state.update(EntityValue::Flag(true), Instant::now());
        assert!(state.transition(Availability::Available, Availability::Stale));
        assert_eq!(state.availability(), Availability::Stale);
        assert_eq!(state.value(), Some(&EntityValue::Flag(true)));
    }

    #[test]
    fn refresh_after_stale_counts_as_change() {
        let mut state = EntityState::default();
        let now = Instant::now();
        state.update(EntityValue::Number(5.0), now);
        state.transition(Availability::Available, Availability::Stale);
        assert!(state.update(EntityValue::Number(5.0), now));
    }
}
