// src/normalize/mod.rs
//! Category normalizers: map a provider's raw record shape into the canonical
//! [`NormalizedRecord`].
//!
//! Every canonical field is looked up through an ordered alias list; the first
//! present, non-null value wins. Field policies:
//! - `location`: defaults to `"Unknown"` and marks the record as defaulted.
//! - `period`: required.
//! - `value`: required, unless the category defines a missing value as zero
//!   (then `0.0` + defaulted marker).
//! - `demographicSegment`: optional.
//!
//! A malformed record is dropped and counted. A whole response fails with
//! [`SchemaError`] only when a required field has no recognized alias in any
//! record, so a provider with a different vocabulary triggers fallback instead
//! of yielding an empty dataset.

pub mod categories;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::providers::RawProviderResponse;

pub use categories::{metric_for, normalize, spec_for, CategorySpec, MissingValue};

pub const DEFAULT_LOCATION: &str = "Unknown";

pub(crate) const LOCATION_ALIASES: &[&str] = &[
    "location",
    "locationdesc",
    "locationname",
    "state",
    "geography",
];
pub(crate) const PERIOD_ALIASES: &[&str] = &["period", "yearstart", "year", "time_period", "date"];
pub(crate) const SEGMENT_ALIASES: &[&str] = &[
    "demographicSegment",
    "stratification1",
    "demographic",
    "segment",
    "group",
];
/// Object keys that may wrap the record array.
const RECORD_CONTAINERS: &[&str] = &["data", "records", "results", "rows"];

/// Canonical record shape shared by every category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub location: String,
    /// Always finite.
    pub value: f64,
    pub category: String,
    pub period: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographic_segment: Option<String>,
    pub source_provider_id: String,
    /// True when any field came from a category default instead of the payload.
    #[serde(default)]
    pub was_defaulted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaulted_fields: Vec<String>,
}

impl NormalizedRecord {
    pub fn location_defaulted(&self) -> bool {
        self.defaulted_fields.iter().any(|f| f == "location")
    }
}

/// Output of one normalizer run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBatch {
    pub records: Vec<NormalizedRecord>,
    /// Records dropped as malformed.
    pub dropped: usize,
}

impl NormalizedBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keep only records matching the generic query filters
    /// (`location`, `period`, `segment`; case-insensitive).
    pub fn retain_matching(&mut self, params: &std::collections::BTreeMap<String, String>) {
        let want = |key: &str| params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let (loc, period, seg) = (want("location"), want("period"), want("segment"));
        self.records.retain(|r| {
            loc.map_or(true, |l| r.location.eq_ignore_ascii_case(l))
                && period.map_or(true, |p| r.period.eq_ignore_ascii_case(p))
                && seg.map_or(true, |s| {
                    r.demographic_segment
                        .as_deref()
                        .is_some_and(|rs| rs.eq_ignore_ascii_case(s))
                })
        });
    }
}

/// Result of resolving one canonical field on one record.
#[derive(Debug, PartialEq)]
enum Field<T> {
    Found(T),
    /// No alias key carried a usable value.
    Absent,
    /// An alias carried a value of the wrong type.
    Malformed,
}

/// Tracks, per required field, whether any record carried a recognized alias key.
#[derive(Default)]
struct Recognized {
    period: bool,
    value: bool,
}

/// Shared normalizer driven by a category spec.
pub fn normalize_with(
    spec: &CategorySpec,
    category: &str,
    raw: &RawProviderResponse,
) -> Result<NormalizedBatch, SchemaError> {
    let schema_err = |field: &str| SchemaError {
        category: category.to_string(),
        field: field.to_string(),
    };

    let items = record_items(&raw.payload).ok_or_else(|| schema_err("records"))?;

    let mut seen = Recognized::default();
    let mut out = NormalizedBatch {
        records: Vec::with_capacity(items.len()),
        dropped: 0,
    };

    for item in items {
        let Some(obj) = item.as_object() else {
            out.dropped += 1;
            continue;
        };
        seen.period |= has_any_alias(obj, PERIOD_ALIASES);
        seen.value |= has_any_alias(obj, spec.value_aliases);

        match normalize_record(spec, category, &raw.provider_id, obj) {
            Some(rec) => out.records.push(rec),
            None => out.dropped += 1,
        }
    }

    if !items.is_empty() {
        if !seen.period {
            return Err(schema_err("period"));
        }
        if !seen.value && spec.missing_value == MissingValue::Reject {
            return Err(schema_err(spec.metric));
        }
    }

    Ok(out)
}

fn normalize_record(
    spec: &CategorySpec,
    category: &str,
    provider_id: &str,
    obj: &Map<String, Value>,
) -> Option<NormalizedRecord> {
    let mut defaulted = Vec::new();

    let period = match text_field(obj, PERIOD_ALIASES) {
        Field::Found(p) => p,
        Field::Absent | Field::Malformed => return None,
    };

    let value = match number_field(obj, spec.value_aliases) {
        Field::Found(v) => v,
        Field::Absent if spec.missing_value == MissingValue::Zero => {
            defaulted.push(spec.metric.to_string());
            0.0
        }
        Field::Absent | Field::Malformed => return None,
    };

    let location = match text_field(obj, LOCATION_ALIASES) {
        Field::Found(l) => l,
        Field::Absent => {
            defaulted.push("location".to_string());
            DEFAULT_LOCATION.to_string()
        }
        Field::Malformed => return None,
    };

    let demographic_segment = match text_field(obj, SEGMENT_ALIASES) {
        Field::Found(s) => Some(s),
        Field::Absent | Field::Malformed => None,
    };

    Some(NormalizedRecord {
        location,
        value,
        category: category.to_string(),
        period,
        demographic_segment,
        source_provider_id: provider_id.to_string(),
        was_defaulted: !defaulted.is_empty(),
        defaulted_fields: defaulted,
    })
}

fn record_items(payload: &Value) -> Option<&[Value]> {
    match payload {
        Value::Array(items) => Some(items.as_slice()),
        Value::Object(obj) => {
            for key in RECORD_CONTAINERS {
                if let Some(Value::Array(items)) = obj.get(*key) {
                    return Some(items.as_slice());
                }
            }
            // A bare record.
            Some(std::slice::from_ref(payload))
        }
        _ => None,
    }
}

fn has_any_alias(obj: &Map<String, Value>, aliases: &[&str]) -> bool {
    aliases.iter().any(|a| obj.contains_key(*a))
}

fn text_field(obj: &Map<String, Value>, aliases: &[&str]) -> Field<String> {
    for alias in aliases {
        let text = match obj.get(*alias) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => collapse_ws(s),
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => return Field::Malformed,
        };
        if !text.is_empty() {
            return Field::Found(text);
        }
    }
    Field::Absent
}

fn number_field(obj: &Map<String, Value>, aliases: &[&str]) -> Field<f64> {
    for alias in aliases {
        let parsed = match obj.get(*alias) {
            None | Some(Value::Null) => continue,
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => {
                let t = s.trim().trim_end_matches('%').trim();
                if t.is_empty() {
                    continue;
                }
                match t.parse::<f64>() {
                    Ok(v) => Some(v),
                    Err(_) => return Field::Malformed,
                }
            }
            Some(_) => return Field::Malformed,
        };
        // NaN / infinities count as missing, never as zero.
        match parsed {
            Some(v) if v.is_finite() => return Field::Found(v),
            _ => continue,
        }
    }
    Field::Absent
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
