//! Filter algebra over entry values and its compiler to SQL predicates.
//!
//! A [`FilterSpec`] comes in three shapes, decided once when the raw JSON
//! is parsed and matched exhaustively afterwards:
//!
//! | Shape | Raw form | Semantics |
//! |-------|----------|-----------|
//! | flat | `{ "person": ["Mann", "Frau"], "thema": ["Arbeit"] }` | OR within a section, AND across sections |
//! | intersection | `{ "intersection": { "thema": ["Arbeit", "Bildung"] } }` | every listed value required |
//! | hierarchy | `{ "hierarchy": [{ "group": "g", "filters": { ... } }] }` | OR within a group (even across sections), AND across groups |
//!
//! # Compilation
//!
//! [`FilterSpec::compile`] produces a boolean SQL expression over an entry
//! id column plus the ordered bind parameters. Every condition is an
//! independent correlated `EXISTS` subquery against `entry_values`, so an
//! entry with several matching values is never counted twice and no
//! condition shares join state with a sibling. Aliases are allocated per
//! call; nothing is carried over between compilations.
//!
//! A spec with no effective condition (empty, or only empty value lists)
//! compiles to `1 = 1`, never to an always-false predicate.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::StatsError;
use crate::section::Section;

/// Values selected per section. Ordered so compilation is deterministic.
pub type SectionValues = BTreeMap<Section, Vec<String>>;

/// One OR-block of a hierarchical filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterGroup {
    pub group: String,
    pub filters: SectionValues,
}

/// Caller-supplied description of which entries qualify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum FilterSpec {
    Flat(SectionValues),
    Intersection(SectionValues),
    Hierarchy(Vec<FilterGroup>),
}

impl Default for FilterSpec {
    fn default() -> Self {
        FilterSpec::Flat(SectionValues::new())
    }
}

/// A compiled predicate ready to be spliced into a `WHERE` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFilter {
    /// Boolean SQL expression. Contains one `?` per entry in `params`.
    pub predicate: String,
    /// Bind parameters in placeholder order.
    pub params: Vec<String>,
}

const TRUE_PREDICATE: &str = "1 = 1";

impl CompiledFilter {
    pub fn unrestricted() -> Self {
        Self {
            predicate: TRUE_PREDICATE.to_string(),
            params: Vec::new(),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.params.is_empty() && self.predicate == TRUE_PREDICATE
    }

    /// Predicate requiring the entry to carry exactly `section = value`.
    pub fn require_value(entry_column: &str, section: Section, value: &str) -> Self {
        let alias = "rv";
        Self {
            predicate: exists_clause(
                entry_column,
                alias,
                &format!("{alias}.section = ? AND {alias}.value_text = ?"),
            ),
            params: vec![section.as_str().to_string(), value.to_string()],
        }
    }

    /// Conjoins two predicates, keeping parameter order aligned with the text.
    pub fn and(self, other: CompiledFilter) -> CompiledFilter {
        if self.is_unrestricted() {
            return other;
        }
        if other.is_unrestricted() {
            return self;
        }
        let mut params = self.params;
        params.extend(other.params);
        CompiledFilter {
            predicate: format!("{} AND {}", self.predicate, other.predicate),
            params,
        }
    }
}

impl FilterSpec {
    /// Parses the raw `filters` JSON.
    ///
    /// Shape detection looks at the top-level keys exactly once:
    /// `hierarchy` wins over `intersection`, anything else is flat. Within
    /// a valid shape, unknown sections and non-string values are dropped and
    /// a bare string is treated as a one-element list. Structural problems
    /// (invalid JSON, non-object root, non-array hierarchy) are returned as
    /// validation errors; callers that treat filters as optional decay
    /// them to [`FilterSpec::default`].
    pub fn parse(raw: &str) -> Result<FilterSpec, StatsError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(FilterSpec::default());
        }
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| StatsError::validation("filters", e.to_string()))?;
        FilterSpec::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<FilterSpec, StatsError> {
        let root = match value {
            Value::Null => return Ok(FilterSpec::default()),
            // An empty JSON array is what some clients send for "no filter".
            Value::Array(items) if items.is_empty() => return Ok(FilterSpec::default()),
            Value::Object(map) => map,
            _ => return Err(StatsError::validation("filters", "expected a JSON object")),
        };

        if let Some(hierarchy) = root.get("hierarchy") {
            let levels = hierarchy.as_array().ok_or_else(|| {
                StatsError::validation("filters.hierarchy", "expected an array of groups")
            })?;
            let groups = levels
                .iter()
                .enumerate()
                .filter_map(|(i, level)| {
                    let level = level.as_object()?;
                    let group = level
                        .get("group")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("group_{}", i));
                    let filters = level
                        .get("filters")
                        .and_then(Value::as_object)
                        .map(section_values)
                        .unwrap_or_default();
                    Some(FilterGroup { group, filters })
                })
                .collect();
            return Ok(FilterSpec::Hierarchy(groups));
        }

        if let Some(intersection) = root.get("intersection") {
            let map = intersection.as_object().ok_or_else(|| {
                StatsError::validation("filters.intersection", "expected an object")
            })?;
            return Ok(FilterSpec::Intersection(section_values(map)));
        }

        Ok(FilterSpec::Flat(section_values(root)))
    }

    /// True when the spec imposes no condition at all.
    pub fn is_unrestricted(&self) -> bool {
        self.conditions().is_empty()
    }

    /// Compiles to a predicate over `entry_column` (e.g. `se.id`).
    pub fn compile(&self, entry_column: &str) -> CompiledFilter {
        let conditions = self.conditions();
        if conditions.is_empty() {
            return CompiledFilter::unrestricted();
        }

        let prefix = match self {
            FilterSpec::Flat(_) => "f",
            FilterSpec::Intersection(_) => "i",
            FilterSpec::Hierarchy(_) => "g",
        };

        let mut clauses = Vec::with_capacity(conditions.len());
        let mut params = Vec::new();
        for (index, alternatives) in conditions.iter().enumerate() {
            let alias = format!("{}{}", prefix, index);
            let terms: Vec<String> = alternatives
                .iter()
                .map(|(section, values)| {
                    params.push(section.as_str().to_string());
                    params.extend(values.iter().map(|v| v.to_string()));
                    if values.len() == 1 {
                        format!("({alias}.section = ? AND {alias}.value_text = ?)")
                    } else {
                        format!(
                            "({alias}.section = ? AND {alias}.value_text IN ({}))",
                            placeholders(values.len())
                        )
                    }
                })
                .collect();
            clauses.push(exists_clause(entry_column, &alias, &terms.join(" OR ")));
        }

        CompiledFilter {
            predicate: clauses.join(" AND "),
            params,
        }
    }

    /// Evaluates the spec against one entry's values in memory.
    ///
    /// Same semantics as the compiled predicate; used to cross-check
    /// query results and by callers that already hold entries.
    pub fn matches(&self, entry: &SectionValues) -> bool {
        self.conditions().iter().all(|alternatives| {
            alternatives.iter().any(|(section, values)| {
                entry
                    .get(section)
                    .is_some_and(|held| held.iter().any(|h| values.contains(&h.as_str())))
            })
        })
    }

    /// Normalizes every shape into a conjunction of disjunctions: each
    /// outer item is one existence check, satisfied when any of its
    /// (section, values) alternatives matches a single value row.
    fn conditions(&self) -> Vec<Vec<(Section, Vec<&str>)>> {
        match self {
            FilterSpec::Flat(sections) => sections
                .iter()
                .filter(|(_, values)| !values.is_empty())
                .map(|(section, values)| vec![(*section, as_strs(values))])
                .collect(),
            FilterSpec::Intersection(sections) => sections
                .iter()
                .flat_map(|(section, values)| {
                    values
                        .iter()
                        .map(move |value| vec![(*section, vec![value.as_str()])])
                })
                .collect(),
            FilterSpec::Hierarchy(groups) => groups
                .iter()
                .map(|group| {
                    group
                        .filters
                        .iter()
                        .filter(|(_, values)| !values.is_empty())
                        .map(|(section, values)| (*section, as_strs(values)))
                        .collect::<Vec<_>>()
                })
                .filter(|alternatives| !alternatives.is_empty())
                .collect(),
        }
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn exists_clause(entry_column: &str, alias: &str, condition: &str) -> String {
    format!(
        "EXISTS (SELECT 1 FROM entry_values {alias} WHERE {alias}.entry_id = {entry_column} AND ({condition}))"
    )
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn section_values(map: &Map<String, Value>) -> SectionValues {
    let mut out = SectionValues::new();
    for (key, raw) in map {
        let Ok(section) = key.parse::<Section>() else {
            continue;
        };
        let values: Vec<String> = match raw {
            Value::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
            other => scalar_to_string(other).into_iter().collect(),
        };
        out.insert(section, values);
    }
    out
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pairs: &[(Section, &str)]) -> SectionValues {
        let mut out = SectionValues::new();
        for (section, value) in pairs {
            out.entry(*section).or_default().push(value.to_string());
        }
        out
    }

    #[test]
    fn test_parse_detects_shapes() {
        let flat = FilterSpec::parse(r#"{"person":["Mann","Frau"]}"#).unwrap();
        assert!(matches!(flat, FilterSpec::Flat(_)));

        let inter = FilterSpec::parse(r#"{"intersection":{"thema":["Arbeit"]}}"#).unwrap();
        assert!(matches!(inter, FilterSpec::Intersection(_)));

        let hier = FilterSpec::parse(
            r#"{"hierarchy":[{"group":"g1","filters":{"thema":["Arbeit"]}}]}"#,
        )
        .unwrap();
        match hier {
            FilterSpec::Hierarchy(groups) => {
                assert_eq!(groups.len(), 1);
                assert_eq!(groups[0].group, "g1");
            }
            other => panic!("expected hierarchy, got {:?}", other),
        }
    }

    #[test]
    fn test_hierarchy_key_wins_over_intersection() {
        let spec = FilterSpec::parse(
            r#"{"intersection":{"thema":["A"]},"hierarchy":[{"group":"g","filters":{"thema":["B"]}}]}"#,
        )
        .unwrap();
        assert!(matches!(spec, FilterSpec::Hierarchy(_)));
    }

    #[test]
    fn test_parse_empty_inputs_are_unrestricted() {
        for raw in ["", "  ", "{}", "[]", "null"] {
            let spec = FilterSpec::parse(raw).unwrap();
            assert!(spec.is_unrestricted(), "{:?} should be unrestricted", raw);
        }
    }

    #[test]
    fn test_parse_malformed_is_error() {
        assert!(FilterSpec::parse("{not json").is_err());
        assert!(FilterSpec::parse("42").is_err());
        assert!(FilterSpec::parse(r#"{"hierarchy":"nope"}"#).is_err());
    }

    #[test]
    fn test_parse_drops_unknown_sections_and_wraps_scalars() {
        let spec = FilterSpec::parse(r#"{"wetter":["Regen"],"thema":"Arbeit"}"#).unwrap();
        match spec {
            FilterSpec::Flat(map) => {
                assert_eq!(map.len(), 1);
                assert_eq!(map[&Section::Thema], vec!["Arbeit".to_string()]);
            }
            other => panic!("expected flat, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_empty_lists_are_skipped() {
        let spec = FilterSpec::parse(r#"{"thema":[],"person":[]}"#).unwrap();
        let compiled = spec.compile("se.id");
        assert!(compiled.is_unrestricted());
        assert_eq!(compiled.predicate, "1 = 1");
    }

    #[test]
    fn test_compile_flat_one_check_per_section() {
        let spec = FilterSpec::parse(r#"{"thema":["Arbeit","Bildung"],"person":["Mann"]}"#).unwrap();
        let compiled = spec.compile("se.id");
        assert_eq!(compiled.predicate.matches("EXISTS").count(), 2);
        // BTreeMap order: person before thema
        assert_eq!(
            compiled.params,
            vec!["person", "Mann", "thema", "Arbeit", "Bildung"]
        );
        assert_eq!(compiled.predicate.matches('?').count(), compiled.params.len());
        assert!(compiled.predicate.contains("f0.entry_id = se.id"));
        assert!(compiled.predicate.contains("f1.value_text IN (?, ?)"));
    }

    #[test]
    fn test_compile_intersection_one_check_per_value() {
        let spec = FilterSpec::parse(r#"{"intersection":{"thema":["Arbeit","Bildung"]}}"#).unwrap();
        let compiled = spec.compile("se.id");
        assert_eq!(compiled.predicate.matches("EXISTS").count(), 2);
        assert_eq!(compiled.params, vec!["thema", "Arbeit", "thema", "Bildung"]);
        assert!(!compiled.predicate.contains(" IN "));
    }

    #[test]
    fn test_compile_hierarchy_one_check_per_group() {
        let spec = FilterSpec::parse(
            r#"{"hierarchy":[
                {"group":"kontakt","filters":{"kontaktart":["Telefon"],"person":["Mann"]}},
                {"group":"leer","filters":{"thema":[]}},
                {"group":"thema","filters":{"thema":["Arbeit","Bildung"]}}
            ]}"#,
        )
        .unwrap();
        let compiled = spec.compile("se.id");
        assert_eq!(compiled.predicate.matches("EXISTS").count(), 2);
        assert!(compiled.predicate.contains(" OR "));
        assert!(compiled.predicate.contains("g0."));
        assert!(compiled.predicate.contains("g1."));
        assert!(!compiled.predicate.contains("g2."));
        assert_eq!(
            compiled.params,
            vec!["kontaktart", "Telefon", "person", "Mann", "thema", "Arbeit", "Bildung"]
        );
        assert_eq!(compiled.predicate.matches('?').count(), compiled.params.len());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let raw = r#"{"thema":["Arbeit"],"person":["Frau","Mann"],"dauer":["kurz"]}"#;
        let a = FilterSpec::parse(raw).unwrap().compile("se.id");
        let b = FilterSpec::parse(raw).unwrap().compile("se.id");
        assert_eq!(a, b);
    }

    #[test]
    fn test_and_keeps_param_order() {
        let spec = FilterSpec::parse(r#"{"person":["Mann"]}"#).unwrap();
        let combined = CompiledFilter::require_value("se.id", Section::Thema, "Arbeit")
            .and(spec.compile("se.id"));
        assert_eq!(combined.params, vec!["thema", "Arbeit", "person", "Mann"]);
        assert_eq!(combined.predicate.matches('?').count(), 4);

        let untouched = CompiledFilter::unrestricted().and(CompiledFilter::unrestricted());
        assert!(untouched.is_unrestricted());
    }

    #[test]
    fn test_matches_flat_or_within_and_across() {
        let spec = FilterSpec::parse(r#"{"thema":["Arbeit","Bildung"],"person":["Mann"]}"#).unwrap();
        assert!(spec.matches(&entry(&[(Section::Thema, "Bildung"), (Section::Person, "Mann")])));
        assert!(!spec.matches(&entry(&[(Section::Thema, "Bildung"), (Section::Person, "Frau")])));
        assert!(!spec.matches(&entry(&[(Section::Person, "Mann")])));
    }

    #[test]
    fn test_matches_intersection_requires_all() {
        let spec = FilterSpec::parse(r#"{"intersection":{"thema":["Arbeit","Bildung"]}}"#).unwrap();
        assert!(spec.matches(&entry(&[(Section::Thema, "Arbeit"), (Section::Thema, "Bildung")])));
        assert!(!spec.matches(&entry(&[(Section::Thema, "Arbeit")])));
    }

    #[test]
    fn test_matches_hierarchy_or_across_sections_in_group() {
        let spec = FilterSpec::parse(
            r#"{"hierarchy":[
                {"group":"a","filters":{"kontaktart":["Telefon"],"person":["Mann"]}},
                {"group":"b","filters":{"thema":["Arbeit"]}}
            ]}"#,
        )
        .unwrap();
        assert!(spec.matches(&entry(&[(Section::Person, "Mann"), (Section::Thema, "Arbeit")])));
        assert!(spec.matches(&entry(&[(Section::Kontaktart, "Telefon"), (Section::Thema, "Arbeit")])));
        assert!(!spec.matches(&entry(&[(Section::Person, "Mann")])));
    }

    #[test]
    fn test_unrestricted_matches_everything() {
        assert!(FilterSpec::default().matches(&SectionValues::new()));
    }
}
