//! Cache key types and the deterministic key builder

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::validation::{normalize_customer_id, parse_date};

/// Bytes of the SHA-256 digest kept in a key (32 hex chars)
const KEY_DIGEST_BYTES: usize = 16;

/// Identifier used when a key carries no scope parameters
const NO_PARAMS_IDENTIFIER: &str = "_all";

/// Scope parameter holding a visualization's subtype
pub const VISUALIZATION_SUBTYPE_PARAM: &str = "subtype";

/// Key construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid entity type: {0}")]
    InvalidEntityType(String),
}

/// Kind of Google Ads data a cache entry represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Account-level KPI summary
    #[serde(alias = "account-kpi")]
    AccountKpi,
    Campaign,
    #[serde(alias = "ad-group")]
    AdGroup,
    Keyword,
    Budget,
    #[serde(alias = "search-term")]
    SearchTerm,
    /// Chart-ready payloads; the subtype lives in the scope parameters
    Visualization,
}

impl EntityType {
    pub const ALL: [Self; 7] = [
        Self::AccountKpi,
        Self::Campaign,
        Self::AdGroup,
        Self::Keyword,
        Self::Budget,
        Self::SearchTerm,
        Self::Visualization,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccountKpi => "account_kpi",
            Self::Campaign => "campaign",
            Self::AdGroup => "ad_group",
            Self::Keyword => "keyword",
            Self::Budget => "budget",
            Self::SearchTerm => "search_term",
            Self::Visualization => "visualization",
        }
    }
}

impl FromStr for EntityType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == normalized)
            .ok_or_else(|| KeyError::InvalidEntityType(s.to_string()))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single canonicalized scope parameter value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ScopeValue {
    Text(String),
    Int(i64),
    Date(NaiveDate),
    /// Sorted, de-duplicated list
    List(Vec<String>),
}

impl ScopeValue {
    /// Build a list value; order and duplicates do not matter.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::List(items.into_iter().map(|s| s.as_ref().to_string()).collect())
    }

    /// Canonical form, or `None` if the value counts as omitted
    fn canonicalize(self, name: &str) -> Option<Self> {
        match self {
            Self::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                if name.ends_with("date")
                    && let Some(date) = parse_date(trimmed)
                {
                    return Some(Self::Date(date));
                }
                // Numeric ids arrive both as text and as integers
                if let Ok(int) = trimmed.parse::<i64>()
                    && int.to_string() == trimmed
                {
                    return Some(Self::Int(int));
                }
                Some(Self::Text(trimmed.to_string()))
            }
            Self::List(items) => {
                let mut items: Vec<String> = items
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if items.is_empty() {
                    return None;
                }
                items.sort();
                items.dedup();
                Some(Self::List(items))
            }
            other => Some(other),
        }
    }

    fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Text(n.to_string()), Self::Int),
            serde_json::Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(|v| match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<&str> for ScopeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScopeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ScopeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<NaiveDate> for ScopeValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<Vec<String>> for ScopeValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

impl From<Vec<&str>> for ScopeValue {
    fn from(value: Vec<&str>) -> Self {
        Self::list(value)
    }
}

/// Order-independent set of filter/segmentation parameters.
///
/// Parameter names are trimmed and lower-cased. Missing optional
/// parameters, empty strings and empty lists are never stored, so an
/// omitted parameter and an explicitly empty one yield the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ScopeParams(BTreeMap<String, ScopeValue>);

impl ScopeParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter, canonicalizing name and value
    pub fn insert(&mut self, name: &str, value: impl Into<ScopeValue>) {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return;
        }
        if let Some(value) = value.into().canonicalize(&name) {
            self.0.insert(name, value);
        } else {
            self.0.remove(&name);
        }
    }

    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<ScopeValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert only when `value` is present
    #[must_use]
    pub fn with_opt<V: Into<ScopeValue>>(mut self, name: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_date_range(self, start: NaiveDate, end: NaiveDate) -> Self {
        self.with("start_date", start).with("end_date", end)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScopeValue> {
        self.0.get(&name.trim().to_lowercase())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScopeValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Canonical JSON encoding: keys sorted, values normalized, no whitespace
    #[must_use]
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Rebuild parameters from their canonical JSON encoding
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| (k, ScopeValue::from_json(v)))
            .collect())
    }
}

impl<K, V> FromIterator<(K, V)> for ScopeParams
where
    K: AsRef<str>,
    V: Into<ScopeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name.as_ref(), value);
        }
        params
    }
}

/// Derive the storage key for a logical query scope.
///
/// Layout: `{entity}:{customer}:{digest}` where `digest` is the first 16 bytes
/// of SHA-256 over [`ScopeParams::canonical`], or `_all` without parameters.
#[must_use]
pub fn build_key(entity_type: EntityType, customer_id: &str, params: &ScopeParams) -> String {
    let customer = normalize_customer_id(customer_id);

    let identifier = if params.is_empty() {
        NO_PARAMS_IDENTIFIER.to_string()
    } else {
        let digest = Sha256::digest(params.canonical().as_bytes());
        hex::encode(&digest[..KEY_DIGEST_BYTES])
    };

    format!("{}:{customer}:{identifier}", entity_type.as_str())
}

/// Structured cache key: the derived string plus the scope it was built from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    entity_type: EntityType,
    customer_id: String,
    params: ScopeParams,
}

impl CacheKey {
    #[must_use]
    pub fn new(entity_type: EntityType, customer_id: &str, params: ScopeParams) -> Self {
        Self {
            key: build_key(entity_type, customer_id, &params),
            entity_type,
            customer_id: normalize_customer_id(customer_id),
            params,
        }
    }

    /// Key for a visualization payload of the given subtype
    #[must_use]
    pub fn visualization(customer_id: &str, subtype: &str, params: ScopeParams) -> Self {
        let params = params.with(VISUALIZATION_SUBTYPE_PARAM, subtype.to_lowercase());
        Self::new(EntityType::Visualization, customer_id, params)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Normalized (digits only) customer id
    #[must_use]
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    #[must_use]
    pub const fn params(&self) -> &ScopeParams {
        &self.params
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_formatted_customer_id_and_param_order_yield_same_key() {
        let a: ScopeParams = [("start_date", "2025-01-01"), ("end_date", "2025-01-07")]
            .into_iter()
            .collect();
        let b: ScopeParams = [("end_date", "2025-01-07"), ("start_date", "2025-01-01")]
            .into_iter()
            .collect();

        let campaign: EntityType = "campaign".parse().unwrap();
        assert_eq!(
            build_key(campaign, "123-456-7890", &a),
            build_key(campaign, "1234567890", &b)
        );
    }

    #[test]
    fn test_build_key_is_pure() {
        let params = ScopeParams::new().with_date_range(date(2025, 1, 1), date(2025, 1, 7));
        let first = build_key(EntityType::Keyword, "1234567890", &params);
        let second = build_key(EntityType::Keyword, "1234567890", &params);
        assert_eq!(first, second);
    }

    #[test]
    fn test_key_layout() {
        let params = ScopeParams::new().with("status", "ENABLED");
        let key = build_key(EntityType::AdGroup, "123-456-7890", &params);
        let parts: Vec<&str> = key.split(':').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ad_group");
        assert_eq!(parts[1], "1234567890");
        assert_eq!(parts[2].len(), KEY_DIGEST_BYTES * 2);
    }

    #[test]
    fn test_key_without_params() {
        let key = build_key(EntityType::Budget, "1234567890", &ScopeParams::new());
        assert_eq!(key, "budget:1234567890:_all");
    }

    #[test]
    fn test_date_formats_are_equivalent() {
        let typed = ScopeParams::new().with("start_date", date(2025, 1, 1));
        let dashed = ScopeParams::new().with("start_date", "2025-01-01");
        let slashed = ScopeParams::new().with("start_date", "2025/01/01");
        let compact = ScopeParams::new().with("start_date", "20250101");

        assert_eq!(typed, dashed);
        assert_eq!(typed, slashed);
        assert_eq!(typed, compact);
    }

    #[test]
    fn test_list_order_and_duplicates_ignored() {
        let a = ScopeParams::new().with("segmentation", vec!["device", "date", "device"]);
        let b = ScopeParams::new().with("segmentation", vec!["date", "device"]);
        assert_eq!(
            build_key(EntityType::AccountKpi, "1234567890", &a),
            build_key(EntityType::AccountKpi, "1234567890", &b)
        );
    }

    #[test]
    fn test_omitted_and_empty_params_are_identical() {
        let omitted = ScopeParams::new().with("status", "ENABLED");
        let explicit = ScopeParams::new()
            .with("status", "ENABLED")
            .with_opt::<&str>("campaign_id", None)
            .with("ad_group_id", "   ")
            .with("ids", Vec::<String>::new());

        assert_eq!(omitted, explicit);
        assert_eq!(
            build_key(EntityType::Keyword, "1234567890", &omitted),
            build_key(EntityType::Keyword, "1234567890", &explicit)
        );
    }

    #[test]
    fn test_param_names_are_case_insensitive() {
        let a = ScopeParams::new().with("Status", "ENABLED");
        let b = ScopeParams::new().with(" status ", "ENABLED");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_scopes_yield_different_keys() {
        let week = ScopeParams::new().with_date_range(date(2025, 1, 1), date(2025, 1, 7));
        let month = ScopeParams::new().with_date_range(date(2025, 1, 1), date(2025, 1, 31));

        let k1 = build_key(EntityType::Campaign, "1234567890", &week);
        let k2 = build_key(EntityType::Campaign, "1234567890", &month);
        let k3 = build_key(EntityType::Campaign, "2222222222", &week);
        let k4 = build_key(EntityType::Keyword, "1234567890", &week);

        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        assert_ne!(k1, k4);
    }

    #[test]
    fn test_numeric_text_and_int_values_share_a_key() {
        let text = ScopeParams::new().with("campaign_id", " 42 ");
        let int = ScopeParams::new().with("campaign_id", 42_i64);
        assert_eq!(text, int);
        assert_eq!(
            build_key(EntityType::AdGroup, "1234567890", &text),
            build_key(EntityType::AdGroup, "1234567890", &int)
        );
    }

    #[test]
    fn test_non_canonical_numbers_stay_text() {
        let padded = ScopeParams::new().with("campaign_id", "042");
        let plus = ScopeParams::new().with("campaign_id", "+42");
        assert_eq!(
            padded.get("campaign_id"),
            Some(&ScopeValue::Text("042".to_string()))
        );
        assert_ne!(padded, ScopeParams::new().with("campaign_id", 42_i64));
        assert_ne!(plus, ScopeParams::new().with("campaign_id", 42_i64));
    }

    #[test]
    fn test_canonical_encoding() {
        let params = ScopeParams::new()
            .with("status", "ENABLED")
            .with("segmentation", vec!["device", "date"])
            .with_date_range(date(2025, 1, 1), date(2025, 1, 7));

        assert_eq!(
            params.canonical(),
            r#"{"end_date":"2025-01-07","segmentation":["date","device"],"start_date":"2025-01-01","status":"ENABLED"}"#
        );
    }

    #[test]
    fn test_from_json_round_trip_preserves_key() {
        let params = ScopeParams::new()
            .with("segmentation", vec!["device"])
            .with("limit", 50_i64)
            .with_date_range(date(2025, 1, 1), date(2025, 1, 7));

        let restored = ScopeParams::from_json(&params.canonical()).unwrap();
        assert_eq!(restored.canonical(), params.canonical());
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!("campaign".parse::<EntityType>().unwrap(), EntityType::Campaign);
        assert_eq!(
            "account-kpi".parse::<EntityType>().unwrap(),
            EntityType::AccountKpi
        );
        assert_eq!(
            "SEARCH_TERM".parse::<EntityType>().unwrap(),
            EntityType::SearchTerm
        );
        assert_eq!(
            "unknown".parse::<EntityType>(),
            Err(KeyError::InvalidEntityType("unknown".to_string()))
        );
    }

    #[test]
    fn test_entity_type_round_trip_through_str() {
        for entity in EntityType::ALL {
            assert_eq!(entity.as_str().parse::<EntityType>().unwrap(), entity);
        }
    }

    #[test]
    fn test_cache_key_exposes_scope() {
        let key = CacheKey::new(
            EntityType::Campaign,
            "123-456-7890",
            ScopeParams::new().with("status", "PAUSED"),
        );

        assert_eq!(key.entity_type(), EntityType::Campaign);
        assert_eq!(key.customer_id(), "1234567890");
        assert!(key.as_str().starts_with("campaign:1234567890:"));
        assert_eq!(format!("{key}"), key.as_str());
    }

    #[test]
    fn test_visualization_subtype_is_part_of_key() {
        let params = ScopeParams::new().with_date_range(date(2025, 1, 1), date(2025, 1, 7));
        let series = CacheKey::visualization("1234567890", "time_series", params.clone());
        let pie = CacheKey::visualization("1234567890", "Breakdown", params);

        assert_ne!(series.as_str(), pie.as_str());
        assert_eq!(
            pie.params().get(VISUALIZATION_SUBTYPE_PARAM),
            Some(&ScopeValue::Text("breakdown".to_string()))
        );
    }
}
