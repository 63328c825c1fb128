// src/normalize/categories.rs
//! Per-category normalizers. Each category declares its metric name, the
//! provider field names that may carry the metric (in preference order), and
//! whether a missing metric means zero.

use crate::error::SchemaError;
use crate::providers::RawProviderResponse;
use crate::registry::category_slug;

use super::{normalize_with, NormalizedBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValue {
    /// Drop the record.
    Reject,
    /// Treat as `0.0` and mark the record as defaulted.
    Zero,
}

#[derive(Debug, Clone, Copy)]
pub struct CategorySpec {
    /// Label used for the value field in discrepancy reports.
    pub metric: &'static str,
    pub value_aliases: &'static [&'static str],
    pub missing_value: MissingValue,
}

pub const CHRONIC_DISEASE: CategorySpec = CategorySpec {
    metric: "prevalence",
    value_aliases: &["prevalence", "data_value", "datavalue", "value"],
    missing_value: MissingValue::Reject,
};

pub const LGBTQ_HEALTH: CategorySpec = CategorySpec {
    metric: "lgbtqHealthcareAccess",
    value_aliases: &[
        "lgbtqHealthcareAccess",
        "healthcare_access_pct",
        "access_rate",
        "data_value",
        "value",
    ],
    missing_value: MissingValue::Reject,
};

pub const MENTAL_HEALTH: CategorySpec = CategorySpec {
    metric: "mentalHealthPrevalence",
    value_aliases: &[
        "mentalHealthPrevalence",
        "depression_rate",
        "data_value",
        "value",
    ],
    missing_value: MissingValue::Reject,
};

// Surveillance feeds omit rows for jurisdictions with no reported deaths.
pub const SUBSTANCE_USE: CategorySpec = CategorySpec {
    metric: "overdoseDeaths",
    value_aliases: &["overdoseDeaths", "overdose_deaths", "deaths", "data_value", "value"],
    missing_value: MissingValue::Zero,
};

pub const MATERNAL_HEALTH: CategorySpec = CategorySpec {
    metric: "maternalMortalityRate",
    value_aliases: &[
        "maternalMortalityRate",
        "maternal_mortality_rate",
        "mmr",
        "data_value",
        "value",
    ],
    missing_value: MissingValue::Reject,
};

pub const VACCINATION: CategorySpec = CategorySpec {
    metric: "vaccinationRate",
    value_aliases: &["vaccinationRate", "coverage_pct", "coverage", "data_value", "value"],
    missing_value: MissingValue::Reject,
};

/// Fallback for categories without a dedicated normalizer.
pub const GENERIC: CategorySpec = CategorySpec {
    metric: "value",
    value_aliases: &["value", "data_value", "datavalue"],
    missing_value: MissingValue::Reject,
};

pub fn spec_for(category: &str) -> &'static CategorySpec {
    match category_slug(category).as_str() {
        "chronic-disease" => &CHRONIC_DISEASE,
        "lgbtq-health" => &LGBTQ_HEALTH,
        "mental-health" => &MENTAL_HEALTH,
        "substance-use" => &SUBSTANCE_USE,
        "maternal-health" => &MATERNAL_HEALTH,
        "vaccination" => &VACCINATION,
        _ => &GENERIC,
    }
}

pub fn metric_for(category: &str) -> &'static str {
    spec_for(category).metric
}

pub fn normalize_chronic_disease(raw: &RawProviderResponse) -> Result<NormalizedBatch, SchemaError> {
    normalize_with(&CHRONIC_DISEASE, "chronic-disease", raw)
}

pub fn normalize_lgbtq_health(raw: &RawProviderResponse) -> Result<NormalizedBatch, SchemaError> {
    normalize_with(&LGBTQ_HEALTH, "lgbtq-health", raw)
}

pub fn normalize_mental_health(raw: &RawProviderResponse) -> Result<NormalizedBatch, SchemaError> {
    normalize_with(&MENTAL_HEALTH, "mental-health", raw)
}

pub fn normalize_substance_use(raw: &RawProviderResponse) -> Result<NormalizedBatch, SchemaError> {
    normalize_with(&SUBSTANCE_USE, "substance-use", raw)
}

pub fn normalize_maternal_health(raw: &RawProviderResponse) -> Result<NormalizedBatch, SchemaError> {
    normalize_with(&MATERNAL_HEALTH, "maternal-health", raw)
}

pub fn normalize_vaccination(raw: &RawProviderResponse) -> Result<NormalizedBatch, SchemaError> {
    normalize_with(&VACCINATION, "vaccination", raw)
}

/// Dispatch to the category's normalizer.
pub fn normalize(raw: &RawProviderResponse, category: &str) -> Result<NormalizedBatch, SchemaError> {
    let slug = category_slug(category);
    match slug.as_str() {
        "chronic-disease" => normalize_chronic_disease(raw),
        "lgbtq-health" => normalize_lgbtq_health(raw),
        "mental-health" => normalize_mental_health(raw),
        "substance-use" => normalize_substance_use(raw),
        "maternal-health" => normalize_maternal_health(raw),
        "vaccination" => normalize_vaccination(raw),
        _ => normalize_with(&GENERIC, &slug, raw),
    }
}
