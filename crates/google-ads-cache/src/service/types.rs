//! Request and record types exchanged with the Google Ads API

use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::ScopeParams;
use crate::validation::{DATE_FORMAT, validate_customer_id, validate_date, validate_date_range};

/// Validated, normalized Google Ads customer id (10 digits)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerId(String);

impl CustomerId {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        validate_customer_id(raw).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CustomerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CustomerId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CustomerId> for String {
    fn from(value: CustomerId) -> Self {
        value.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive reporting date range with `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, Error> {
        validate_date_range(start, end)?;
        Ok(Self { start, end })
    }

    /// Parse both bounds (`YYYY-MM-DD`, `YYYY/MM/DD` or `YYYYMMDD`)
    pub fn parse(start: &str, end: &str) -> Result<Self, Error> {
        Self::new(
            validate_date(start, "start_date")?,
            validate_date(end, "end_date")?,
        )
    }

    /// The `days` days ending with `end`, both bounds included
    #[must_use]
    pub fn last_days(end: NaiveDate, days: u64) -> Self {
        let start = end
            .checked_sub_days(Days::new(days.saturating_sub(1)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

/// Serving status shared by campaigns, ad groups, keywords and budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Enabled,
    Paused,
    Removed,
}

impl EntityStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Paused => "PAUSED",
            Self::Removed => "REMOVED",
        }
    }
}

impl FromStr for EntityStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ENABLED" => Ok(Self::Enabled),
            "PAUSED" => Ok(Self::Paused),
            "REMOVED" => Ok(Self::Removed),
            _ => Err(Error::InvalidInput(format!(
                "unknown status '{s}' (expected ENABLED, PAUSED or REMOVED)"
            ))),
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performance metrics common to every reporting row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub impressions: u64,
    pub clicks: u64,
    pub cost_micros: i64,
    pub conversions: f64,
    pub conversions_value: f64,
}

impl Metrics {
    /// Click-through rate, 0 without impressions
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ctr(&self) -> f64 {
        if self.impressions == 0 {
            0.0
        } else {
            self.clicks as f64 / self.impressions as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub customer_id: String,
    pub date_range: DateRange,
    pub currency_code: String,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub status: EntityStatus,
    pub budget_id: Option<String>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdGroup {
    pub id: String,
    pub campaign_id: String,
    pub name: String,
    pub status: EntityStatus,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: String,
    pub ad_group_id: String,
    pub text: String,
    pub match_type: String,
    pub status: EntityStatus,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    pub name: String,
    pub amount_micros: i64,
    pub delivery_method: String,
    pub status: EntityStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTerm {
    pub search_term: String,
    pub campaign_id: String,
    pub ad_group_id: String,
    pub metrics: Metrics,
}

/// New amount for one campaign budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetUpdate {
    pub budget_id: String,
    pub amount_micros: i64,
}

/// Filters for ad group listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdGroupFilter {
    pub campaign_id: Option<String>,
    pub status: Option<EntityStatus>,
}

impl AdGroupFilter {
    #[must_use]
    pub fn scope(&self) -> ScopeParams {
        ScopeParams::new()
            .with_opt("campaign_id", self.campaign_id.as_deref())
            .with_opt("status", self.status.map(|s| s.as_str()))
    }
}

/// Filters for keyword listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    pub ad_group_id: Option<String>,
    pub status: Option<EntityStatus>,
    pub date_range: Option<DateRange>,
}

impl KeywordFilter {
    #[must_use]
    pub fn scope(&self) -> ScopeParams {
        let params = ScopeParams::new()
            .with_opt("ad_group_id", self.ad_group_id.as_deref())
            .with_opt("status", self.status.map(|s| s.as_str()));
        match self.date_range {
            Some(range) => params.with_date_range(range.start(), range.end()),
            None => params,
        }
    }
}

/// Filters for budget listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BudgetFilter {
    pub status: Option<EntityStatus>,
    /// Restrict to these budgets; empty means all
    pub budget_ids: Vec<String>,
}

impl BudgetFilter {
    #[must_use]
    pub fn scope(&self) -> ScopeParams {
        ScopeParams::new()
            .with_opt("status", self.status.map(|s| s.as_str()))
            .with("budget_ids", self.budget_ids.clone())
    }
}

/// Filters for the search term report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchTermFilter {
    pub campaign_id: Option<String>,
    pub ad_group_id: Option<String>,
    pub date_range: Option<DateRange>,
}

impl SearchTermFilter {
    #[must_use]
    pub fn scope(&self) -> ScopeParams {
        let params = ScopeParams::new()
            .with_opt("campaign_id", self.campaign_id.as_deref())
            .with_opt("ad_group_id", self.ad_group_id.as_deref());
        match self.date_range {
            Some(range) => params.with_date_range(range.start(), range.end()),
            None => params,
        }
    }
}
