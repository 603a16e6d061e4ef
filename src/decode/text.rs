// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Text clean-up applied to string payloads.

/// Longest status text kept, in characters.
pub const MAX_STATUS_LEN: usize = 255;

/// Escaped umlauts the controller leaves in status strings.
const UMLAUTS: [(&str, &str); 6] = [
    ("\\u00fc", "ü"),
    ("\\u00dc", "Ü"),
    ("\\u00f6", "ö"),
    ("\\u00d6", "Ö"),
    ("\\u00e4", "ä"),
    ("\\u00c4", "Ä"),
];

/// How a string payload is cleaned before it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCleanup {
    /// Surrounding whitespace removed.
    Trim,
    /// Every double quote removed.
    Unquote,
    /// Quotes and trailing dots stripped from both ends, length capped.
    Status,
    /// Like [`TextCleanup::Status`], with escaped umlauts restored.
    StatusWithUmlauts,
}

impl TextCleanup {
    /// Applies this clean-up to `raw`.
    #[must_use]
    pub fn apply(self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            Self::Trim => trimmed.to_string(),
            Self::Unquote => trimmed.replace('"', ""),
            Self::Status => status_text(trimmed),
            Self::StatusWithUmlauts => unescape_umlauts(&status_text(trimmed)),
        }
    }
}

fn status_text(raw: &str) -> String {
    raw.trim_matches('"')
        .trim_matches('.')
        .chars()
        .take(MAX_STATUS_LEN)
        .collect()
}

fn unescape_umlauts(text: &str) -> String {
    UMLAUTS
        .iter()
        .fold(text.to_string(), |acc, (escaped, plain)| acc.replace(escaped, plain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strips_quotes_and_dots() {
        assert_eq!(
            TextCleanup::Status.apply("\"Kein Fehler.\""),
            "Kein Fehler"
        );
        assert_eq!(TextCleanup::Status.apply("...ok..."), "ok");
    }

    #[test]
    fn status_is_capped() {
        let long = "x".repeat(400);
        assert_eq!(TextCleanup::Status.apply(&long).chars().count(), MAX_STATUS_LEN);
    }

    #[test]
    fn umlauts_are_restored() {
        assert_eq!(
            TextCleanup::StatusWithUmlauts.apply("\"Fahrzeug angesteckt, L\\u00e4dt.\""),
            "Fahrzeug angesteckt, Lädt"
        );
    }

    #[test]
    fn unquote_removes_inner_quotes() {
        assert_eq!(TextCleanup::Unquote.apply(" \"2.1.6\" "), "2.1.6");
    }
}
