//! The fixed category axes an entry can carry values for.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StatsError;

/// A category axis. The set is closed: anything else is rejected at the
/// boundary with a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    /// How the contact happened (visit, phone, mail, ...).
    Kontaktart,
    /// Attributes of the person (gender, age band, background, ...).
    Person,
    /// Topic of the contact.
    Thema,
    /// Hour window the contact fell into.
    Zeitfenster,
    /// Coarse time of day.
    Tageszeit,
    /// Duration band.
    Dauer,
    /// How the person was referred.
    Referenz,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Section::Kontaktart,
        Section::Person,
        Section::Thema,
        Section::Zeitfenster,
        Section::Tageszeit,
        Section::Dauer,
        Section::Referenz,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Kontaktart => "kontaktart",
            Section::Person => "person",
            Section::Thema => "thema",
            Section::Zeitfenster => "zeitfenster",
            Section::Tageszeit => "tageszeit",
            Section::Dauer => "dauer",
            Section::Referenz => "referenz",
        }
    }

    /// Parses a required `section` parameter, mapping absence and unknown
    /// names to a validation error.
    pub fn parse_required(raw: Option<&str>) -> Result<Section, StatsError> {
        match raw.map(str::trim) {
            None | Some("") => Err(StatsError::validation("section", "parameter is required")),
            Some(name) => name.parse(),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .iter()
            .copied()
            .find(|section| section.as_str() == s)
            .ok_or_else(|| StatsError::validation("section", format!("unknown section '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_every_name() {
        for section in Section::ALL {
            assert_eq!(section.as_str().parse::<Section>().unwrap(), section);
        }
    }

    #[test]
    fn test_unknown_section_is_validation_error() {
        let err = "wetter".parse::<Section>().unwrap_err();
        assert!(matches!(err, StatsError::Validation { .. }));
    }

    #[test]
    fn test_parse_required_rejects_missing() {
        assert!(Section::parse_required(None).is_err());
        assert!(Section::parse_required(Some("  ")).is_err());
        assert_eq!(
            Section::parse_required(Some("thema")).unwrap(),
            Section::Thema
        );
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Section::Zeitfenster).unwrap();
        assert_eq!(json, "\"zeitfenster\"");
        let back: Section = serde_json::from_str("\"referenz\"").unwrap();
        assert_eq!(back, Section::Referenz);
    }
}
