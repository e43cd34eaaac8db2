use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A calendar month, the planning granularity of the whole ledger.
/// Ordered chronologically; formatted as "YYYY-MM".
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        if !(1..=12).contains(&month) {
            return Err(format!("month must be between 1 and 12, got {month}"));
        }
        if !(1900..=9999).contains(&year) {
            return Err(format!("year out of range: {year}"));
        }
        Ok(Self { year, month })
    }

    /// Flat month index used for all month arithmetic.
    fn index(self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_index(index: i64) -> Self {
        Self {
            year: (index.div_euclid(12)) as i32,
            month: (index.rem_euclid(12) + 1) as u32,
        }
    }

    pub fn plus_months(self, months: u32) -> Self {
        Self::from_index(self.index() + months as i64)
    }

    /// Signed number of months from `self` to `other`.
    pub fn months_until(self, other: MonthKey) -> i64 {
        other.index() - self.index()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("invalid month '{s}', expected YYYY-MM");
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Where a budget row's amount comes from. Anything but `Manual` marks an
/// amount derived from another subsystem's schedule.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Manual,
    CreditCard,
    Goal,
    Debt,
    Investment,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::CreditCard => "credit_card",
            Self::Goal => "goal",
            Self::Debt => "debt",
            Self::Investment => "investment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "credit_card" => Some(Self::CreditCard),
            "goal" => Some(Self::Goal),
            "debt" => Some(Self::Debt),
            "investment" => Some(Self::Investment),
            _ => None,
        }
    }

    pub fn is_automatic(self) -> bool {
        !matches!(self, Self::Manual)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BreakdownItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub label: String,
    pub amount_cents: i64,
}

/// Optional decomposition of a budget's planned amount into labeled
/// sub-items. When enabled, the item sum must equal the planned amount.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetBreakdown {
    pub enabled: bool,
    pub items: Vec<BreakdownItem>,
}

impl BudgetBreakdown {
    pub fn total_cents(&self) -> i64 {
        self.items.iter().map(|item| item.amount_cents).sum()
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.items.is_empty()
    }
}

/// The planning record for one category in one month.
#[derive(Clone, Debug, Serialize)]
pub struct Budget {
    pub id: i64,
    pub owner_id: i64,
    pub category_id: i64,
    pub month: MonthKey,
    pub amount_planned_cents: i64,
    pub minimum_amount_planned_cents: i64,
    pub auto_contributions_cents: i64,
    pub amount_actual_cents: i64,
    pub source_type: Option<SourceType>,
    pub is_auto_generated: bool,
    pub is_projected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BudgetBreakdown>,
    pub created_ts_utc: i64,
    pub updated_ts_utc: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Category {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub source_type: Option<SourceType>,
}

impl Category {
    /// A category is automatic when its amounts come from a schedule, not a
    /// user's hand; such categories are never replication sources or targets.
    pub fn automatic_source(&self) -> Option<SourceType> {
        self.source_type.filter(|st| st.is_automatic())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Frequency {
    Monthly,
    Biweekly,
    Installments(u32),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub month: MonthKey,
    pub amount_cents: i64,
}

/// Recurring-contribution schedule recorded by the goal/debt/credit-card
/// subsystems and consumed read-only here.
#[derive(Clone, Debug, PartialEq)]
pub struct ContributionSchedule {
    pub frequency: Frequency,
    pub amount_cents: i64,
    pub start: MonthKey,
    pub end: Option<MonthKey>,
    /// Custom per-month plan; when present it overrides the frequency math
    /// entirely (exact entry for the month, else zero).
    pub plan_entries: Option<Vec<PlanEntry>>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Goal,
    Debt,
    CreditCard,
    Investment,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Debt => "debt",
            Self::CreditCard => "credit_card",
            Self::Investment => "investment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "goal" => Some(Self::Goal),
            "debt" => Some(Self::Debt),
            "credit_card" => Some(Self::CreditCard),
            "investment" => Some(Self::Investment),
            _ => None,
        }
    }

    pub fn source_type(self) -> SourceType {
        match self {
            Self::Goal => SourceType::Goal,
            Self::Debt => SourceType::Debt,
            Self::CreditCard => SourceType::CreditCard,
            Self::Investment => SourceType::Investment,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Active,
    Negotiating,
    Paused,
    Done,
}

impl SourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Negotiating => "negotiating",
            Self::Paused => "paused",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "negotiating" => Some(Self::Negotiating),
            "paused" => Some(Self::Paused),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// An automatic commitment bound to a category: a savings goal, a negotiated
/// debt, a credit card, or a recurring investment.
#[derive(Clone, Debug)]
pub struct AutoSource {
    pub id: i64,
    pub owner_id: i64,
    pub category_id: i64,
    pub kind: SourceKind,
    pub label: String,
    pub status: SourceStatus,
    pub include_in_plan: bool,
    pub is_negotiated: bool,
    pub schedule: ContributionSchedule,
}

impl AutoSource {
    /// Whether this source participates in the category's minimum floor.
    pub fn counts_toward_minimum(&self) -> bool {
        match self.kind {
            SourceKind::Goal | SourceKind::CreditCard | SourceKind::Investment => {
                self.include_in_plan && self.status == SourceStatus::Active
            }
            SourceKind::Debt => {
                self.is_negotiated
                    && self.include_in_plan
                    && matches!(self.status, SourceStatus::Active | SourceStatus::Negotiating)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MinimumSource {
    pub label: String,
    pub amount_cents: i64,
}

/// Result of the minimum budget calculation for one category-month.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MinimumBudget {
    pub minimum_cents: i64,
    pub sources: Vec<MinimumSource>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ReplicationOutcome {
    pub created: u32,
    pub overwritten: u32,
    pub skipped: u32,
    pub total: u32,
}

/// Formats integer cents as a plain decimal amount, e.g. 35000 -> "350.00".
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
