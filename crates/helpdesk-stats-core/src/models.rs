//! Shared data types for entries, the taxonomy, and analytics results.
//!
//! Storage code builds these from rows; the HTTP and CLI layers serialize
//! them as-is.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StatsError;
use crate::filter::SectionValues;
use crate::option_id::OptionId;
use crate::section::Section;

/// Storage and wire format of entry timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, or a bare date
/// (midnight).
pub fn parse_timestamp(field: &str, raw: &str) -> Result<NaiveDateTime, StatsError> {
    let raw = raw.trim();
    for format in [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            StatsError::validation(field, format!("expected YYYY-MM-DD HH:MM:SS, got '{}'", raw))
        })
}

// ═══════════════════════════════════════════════════════════════════════
// Entries
// ═══════════════════════════════════════════════════════════════════════

/// One logged contact with its selected values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: i64,
    pub user_id: i64,
    /// `YYYY-MM-DD HH:MM:SS`
    pub created_at: String,
    pub remark: Option<String>,
    pub values: SectionValues,
}

/// Input for creating or replacing an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEntry {
    /// Explicit id, honoured when importing existing data.
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub values: SectionValues,
}

impl NewEntry {
    /// Validates ids and trims, drops empty, and dedups values while
    /// keeping first-seen order. A blank remark becomes `None`.
    pub fn normalized(mut self) -> Result<NewEntry, StatsError> {
        if self.user_id <= 0 {
            return Err(StatsError::validation("user_id", "must be a positive id"));
        }
        if matches!(self.id, Some(id) if id <= 0) {
            return Err(StatsError::validation("id", "must be a positive id"));
        }
        if let Some(raw) = &self.created_at {
            parse_timestamp("created_at", raw)?;
        }
        self.remark = self
            .remark
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let mut values = SectionValues::new();
        for (section, raw_values) in self.values {
            let mut cleaned: Vec<String> = Vec::new();
            for value in raw_values {
                let value = value.trim();
                if !value.is_empty() && !cleaned.iter().any(|v| v == value) {
                    cleaned.push(value.to_string());
                }
            }
            if !cleaned.is_empty() {
                values.insert(section, cleaned);
            }
        }
        self.values = values;
        Ok(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Taxonomy
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftAction {
    Create,
    Update,
    Delete,
}

impl DraftAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftAction::Create => "create",
            DraftAction::Update => "update",
            DraftAction::Delete => "delete",
        }
    }
}

impl fmt::Display for DraftAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DraftAction {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(DraftAction::Create),
            "update" => Ok(DraftAction::Update),
            "delete" => Ok(DraftAction::Delete),
            other => Err(StatsError::validation(
                "action",
                format!("unknown draft action '{}'", other),
            )),
        }
    }
}

/// A published option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionDefinition {
    pub id: i64,
    pub section: Section,
    pub label: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub keywords: Vec<String>,
    pub created_at: String,
}

/// A pending mutation against the published taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionDraft {
    pub id: i64,
    /// `None` for create-drafts.
    pub original_id: Option<i64>,
    pub section: Section,
    pub label: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub keywords: Vec<String>,
    pub action: DraftAction,
}

/// One row of the editor's merged view: the published option overlaid
/// with its draft, or a create-draft on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedOption {
    pub id: OptionId,
    pub section: Section,
    pub label: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub keywords: Vec<String>,
    pub draft_action: Option<DraftAction>,
    /// Row id of the pending draft, if any.
    pub draft_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishState {
    pub has_pending_changes: bool,
    pub last_published_at: Option<String>,
    pub last_published_by: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedView {
    pub options: Vec<MergedOption>,
    pub publish_state: PublishState,
}

/// Input for a create-draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOption {
    pub section: Section,
    pub label: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Partial update of an option. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionPatch {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

impl OptionPatch {
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.sort_order.is_none()
            && self.is_active.is_none()
            && self.keywords.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderItem {
    pub id: OptionId,
    pub sort_order: i64,
}

/// Trims keywords and drops blank ones, keeping order.
pub fn clean_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trims a label, rejecting blank ones.
pub fn clean_label(label: &str) -> Result<String, StatsError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(StatsError::validation("label", "must not be empty"));
    }
    Ok(label.to_string())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishStats {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResetStats {
    pub to_create: u64,
    pub to_update: u64,
    pub to_delete: u64,
}

/// One default option as shipped in the defaults file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DefaultOption {
    pub label: String,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// The authoritative default taxonomy used by reset-to-defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DefaultTaxonomy {
    pub sections: std::collections::BTreeMap<Section, Vec<DefaultOption>>,
}

impl DefaultTaxonomy {
    pub fn from_json(raw: &str) -> Result<Self, StatsError> {
        serde_json::from_str(raw)
            .map_err(|e| StatsError::validation("defaults", format!("invalid taxonomy JSON: {}", e)))
    }

    /// Flattens to `(section, label, sort_order, keywords)` with labels
    /// trimmed, keywords cleaned, and missing sort orders replaced by the
    /// position within the section. Later duplicates of a label are
    /// ignored.
    pub fn resolved(&self) -> Vec<(Section, String, i64, Vec<String>)> {
        let mut out: Vec<(Section, String, i64, Vec<String>)> = Vec::new();
        for (section, options) in &self.sections {
            for (position, option) in options.iter().enumerate() {
                let label = option.label.trim();
                if label.is_empty()
                    || out.iter().any(|(s, l, _, _)| s == section && l == label)
                {
                    continue;
                }
                out.push((
                    *section,
                    label.to_string(),
                    option.sort_order.unwrap_or(position as i64),
                    clean_keywords(&option.keywords),
                ));
            }
        }
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Analytics results
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountItem {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    pub label: String,
    pub data: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    pub section: Section,
    pub items: Vec<CountItem>,
    pub total: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeseriesResult {
    pub granularity: crate::bucket::Granularity,
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalsResult {
    pub granularity: crate::bucket::Granularity,
    pub labels: Vec<String>,
    pub data: Vec<i64>,
    pub total: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A caller-defined comparison period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
}

impl Period {
    /// Parses the JSON list of periods. Unlike filters, this is strict:
    /// every period needs `start`, `end`, and a non-empty `label`.
    pub fn parse_list(raw: &str) -> Result<Vec<Period>, StatsError> {
        let periods: Vec<Period> = serde_json::from_str(raw).map_err(|e| {
            StatsError::validation(
                "periods",
                format!("expected a list of {{start, end, label}}: {}", e),
            )
        })?;
        Period::validate_list(&periods)?;
        Ok(periods)
    }

    pub fn validate_list(periods: &[Period]) -> Result<(), StatsError> {
        if periods.is_empty() {
            return Err(StatsError::validation("periods", "at least one period is required"));
        }
        for period in periods {
            if period.label.trim().is_empty() {
                return Err(StatsError::validation("periods", "every period needs a label"));
            }
            if period.start > period.end {
                return Err(StatsError::validation(
                    "periods",
                    format!("period '{}' starts after it ends", period.label),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompareResult {
    pub section: Section,
    pub periods: Vec<String>,
    pub datasets: Vec<Dataset>,
    pub totals: Vec<i64>,
}

// ═══════════════════════════════════════════════════════════════════════
// Saved analytics state
// ═══════════════════════════════════════════════════════════════════════

pub const DEFAULT_MARKER_COLOR: &str = "#f59e0b";

/// A named list of comparison periods, stored for reuse with `compare`.
/// Several sets may be active at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodSet {
    pub id: i64,
    pub name: String,
    pub periods: Vec<Period>,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPeriodSet {
    pub name: String,
    pub periods: Vec<Period>,
    #[serde(default)]
    pub is_active: bool,
}

impl NewPeriodSet {
    pub fn normalized(self) -> Result<Self, StatsError> {
        Period::validate_list(&self.periods)?;
        Ok(NewPeriodSet {
            name: clean_name(&self.name)?,
            ..self
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSetPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub periods: Option<Vec<Period>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl PeriodSetPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.periods.is_none() && self.is_active.is_none()
    }

    /// `current` with the patch applied and validated.
    pub fn apply(&self, current: &PeriodSet) -> Result<PeriodSet, StatsError> {
        if self.is_empty() {
            return Err(StatsError::validation("body", "no changes given"));
        }
        let periods = match &self.periods {
            Some(periods) => {
                Period::validate_list(periods)?;
                periods.clone()
            }
            None => current.periods.clone(),
        };
        Ok(PeriodSet {
            id: current.id,
            name: match &self.name {
                Some(name) => clean_name(name)?,
                None => current.name.clone(),
            },
            periods,
            is_active: self.is_active.unwrap_or(current.is_active),
            created_at: current.created_at.clone(),
        })
    }
}

/// A labelled date or date span drawn over time-series charts, e.g. a
/// holiday or a campaign. `end_date` is absent for single-day markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartMarker {
    pub id: i64,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub color: String,
    pub is_active: bool,
    pub created_at: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChartMarker {
    pub name: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewChartMarker {
    /// Trims the name, fills in the default color, and checks the span.
    pub fn normalized(self) -> Result<Self, StatsError> {
        check_marker_span(self.start_date, self.end_date)?;
        Ok(NewChartMarker {
            name: clean_name(&self.name)?,
            color: Some(clean_color(self.color.as_deref())?),
            ..self
        })
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMarkerPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// `null` turns the marker into a single-day marker.
    #[serde(default, deserialize_with = "explicit_null")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ChartMarkerPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.color.is_none()
            && self.is_active.is_none()
    }

    pub fn apply(&self, current: &ChartMarker) -> Result<ChartMarker, StatsError> {
        if self.is_empty() {
            return Err(StatsError::validation("body", "no changes given"));
        }
        let start_date = self.start_date.unwrap_or(current.start_date);
        let end_date = self.end_date.unwrap_or(current.end_date);
        check_marker_span(start_date, end_date)?;
        Ok(ChartMarker {
            id: current.id,
            name: match &self.name {
                Some(name) => clean_name(name)?,
                None => current.name.clone(),
            },
            start_date,
            end_date,
            color: match &self.color {
                Some(color) => clean_color(Some(color))?,
                None => current.color.clone(),
            },
            is_active: self.is_active.unwrap_or(current.is_active),
            created_at: current.created_at.clone(),
        })
    }
}

fn clean_name(raw: &str) -> Result<String, StatsError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(StatsError::validation("name", "must not be empty"));
    }
    Ok(name.to_string())
}

/// Blank means the default color; anything else must be `#rgb` or `#rrggbb`.
fn clean_color(raw: Option<&str>) -> Result<String, StatsError> {
    let color = raw.map(str::trim).unwrap_or_default();
    if color.is_empty() {
        return Ok(DEFAULT_MARKER_COLOR.to_string());
    }
    let hex = color.strip_prefix('#').unwrap_or_default();
    if !matches!(hex.len(), 3 | 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StatsError::validation(
            "color",
            format!("expected #rgb or #rrggbb, got '{}'", color),
        ));
    }
    Ok(color.to_string())
}

fn check_marker_span(start: NaiveDate, end: Option<NaiveDate>) -> Result<(), StatsError> {
    match end {
        Some(end) if end < start => Err(StatsError::validation(
            "end_date",
            "must not be before start_date",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_normalization() {
        let mut values = SectionValues::new();
        values.insert(
            Section::Thema,
            vec![" Arbeit ".into(), "Arbeit".into(), "".into(), "Bildung".into()],
        );
        values.insert(Section::Person, vec!["  ".into()]);
        let entry = NewEntry {
            user_id: 1,
            remark: Some("   ".into()),
            values,
            ..Default::default()
        }
        .normalized()
        .unwrap();

        assert_eq!(entry.values.len(), 1);
        assert_eq!(entry.values[&Section::Thema], vec!["Arbeit", "Bildung"]);
        assert_eq!(entry.remark, None);
    }

    #[test]
    fn test_new_entry_rejects_bad_ids_and_timestamps() {
        let base = NewEntry {
            user_id: 1,
            ..Default::default()
        };
        assert!(NewEntry { user_id: 0, ..base.clone() }.normalized().is_err());
        assert!(NewEntry { id: Some(-4), ..base.clone() }.normalized().is_err());
        assert!(NewEntry {
            created_at: Some("yesterday".into()),
            ..base.clone()
        }
        .normalized()
        .is_err());
        assert!(base.normalized().is_ok());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("t", "2024-03-01 09:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("t", "2024-03-01T09:30:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("t", "2024-03-01").unwrap(),
            expected.date().and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_periods_are_strict() {
        assert!(Period::parse_list("[]").is_err());
        assert!(Period::parse_list("{\"start\":\"2024-01-01\"}").is_err());
        assert!(Period::parse_list(r#"[{"start":"2024-01-01","end":"2024-01-31"}]"#).is_err());
        assert!(
            Period::parse_list(r#"[{"start":"2024-02-01","end":"2024-01-31","label":"x"}]"#)
                .is_err()
        );
        let periods = Period::parse_list(
            r#"[{"start":"2024-01-01","end":"2024-01-31","label":"Januar"}]"#,
        )
        .unwrap();
        assert_eq!(periods[0].label, "Januar");
    }

    #[test]
    fn test_default_taxonomy_resolution() {
        let defaults = DefaultTaxonomy::from_json(
            r#"{"sections": {
                "thema": [
                    {"label": "Arbeit", "keywords": [" Job ", ""]},
                    {"label": "Bildung", "sort_order": 10},
                    {"label": "Arbeit"}
                ],
                "dauer": [{"label": " "}]
            }}"#,
        )
        .unwrap();
        let resolved = defaults.resolved();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0], (Section::Thema, "Arbeit".into(), 0, vec!["Job".into()]));
        assert_eq!(resolved[1].2, 10);
        assert!(DefaultTaxonomy::from_json(r#"{"sections": {"wetter": []}}"#).is_err());
    }

    #[test]
    fn test_draft_action_names() {
        for action in [DraftAction::Create, DraftAction::Update, DraftAction::Delete] {
            assert_eq!(action.as_str().parse::<DraftAction>().unwrap(), action);
        }
        assert!("purge".parse::<DraftAction>().is_err());
    }

    #[test]
    fn test_marker_normalization() {
        let marker: NewChartMarker = serde_json::from_str(
            r#"{"name": " Ferien ", "start_date": "2024-07-01", "end_date": "2024-08-15"}"#,
        )
        .unwrap();
        let marker = marker.normalized().unwrap();
        assert_eq!(marker.name, "Ferien");
        assert_eq!(marker.color.as_deref(), Some(DEFAULT_MARKER_COLOR));
        assert!(marker.is_active);

        let backwards: NewChartMarker = serde_json::from_str(
            r#"{"name": "x", "start_date": "2024-07-01", "end_date": "2024-06-30"}"#,
        )
        .unwrap();
        assert!(matches!(
            backwards.normalized(),
            Err(StatsError::Validation { field, .. }) if field == "end_date"
        ));

        let bad_color: NewChartMarker = serde_json::from_str(
            r#"{"name": "x", "start_date": "2024-07-01", "color": "orange"}"#,
        )
        .unwrap();
        assert!(bad_color.normalized().is_err());
    }

    #[test]
    fn test_marker_patch_tells_null_from_absent() {
        let current = ChartMarker {
            id: 1,
            name: "Ferien".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 8, 15),
            color: "#abc".into(),
            is_active: true,
            created_at: "2024-06-01 00:00:00".into(),
        };

        let absent: ChartMarkerPatch = serde_json::from_str(r#"{"name": "Sommer"}"#).unwrap();
        let patched = absent.apply(&current).unwrap();
        assert_eq!(patched.name, "Sommer");
        assert_eq!(patched.end_date, current.end_date);

        let cleared: ChartMarkerPatch = serde_json::from_str(r#"{"end_date": null}"#).unwrap();
        assert_eq!(cleared.apply(&current).unwrap().end_date, None);

        assert!(ChartMarkerPatch::default().apply(&current).is_err());
    }
}
