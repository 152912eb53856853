use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::date_math;
use crate::error::{Result, TrackerError};

/// How a card (or a single benefit) groups activity into years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearTrackingMode {
    /// January 1 to January 1.
    Calendar,
    /// Pinned to the card's fee-due month/day.
    Anniversary,
}

impl YearTrackingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Anniversary => "anniversary",
        }
    }
}

impl fmt::Display for YearTrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for YearTrackingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "calendar" => Ok(Self::Calendar),
            "anniversary" => Ok(Self::Anniversary),
            other => Err(format!("unknown year tracking mode '{other}'")),
        }
    }
}

/// How often a benefit resets within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Quarterly,
    Semiannual,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Semiannual => "semiannual",
            Self::Yearly => "yearly",
        }
    }

    /// Months covered by one window, or `None` when the cycle is not subdivided.
    pub fn months_per_window(self) -> Option<u32> {
        match self {
            Self::Monthly => Some(1),
            Self::Quarterly => Some(3),
            Self::Semiannual => Some(6),
            Self::Yearly => None,
        }
    }

    /// Windows in a full twelve-month cycle.
    pub fn windows_per_cycle(self) -> usize {
        match self.months_per_window() {
            Some(months) => (12 / months) as usize,
            None => 1,
        }
    }

    pub fn period_noun(self) -> &'static str {
        match self {
            Self::Monthly => "Month",
            Self::Quarterly => "Quarter",
            Self::Semiannual => "Half",
            Self::Yearly => "Year",
        }
    }

    /// Reads a stored frequency. Unknown values fall back to `Yearly`,
    /// which yields a single window spanning the whole cycle.
    pub fn from_stored(value: &str) -> Self {
        value.parse().unwrap_or_else(|err: String| {
            warn!(%err, "treating benefit as yearly");
            Self::Yearly
        })
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "semiannual" => Ok(Self::Semiannual),
            "yearly" => Ok(Self::Yearly),
            other => Err(format!("unknown frequency '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub name: String,
    pub annual_fee: f64,
    /// Only the month and day matter for anniversary cycles.
    pub fee_due_date: NaiveDate,
    pub year_tracking_mode: YearTrackingMode,
    /// `None` when the stored timestamp could not be parsed.
    pub created_at: Option<NaiveDate>,
}

/// Which accounting model a benefit uses, without its amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenefitType {
    Standard,
    Incremental,
    Cumulative,
}

impl BenefitType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Incremental => "incremental",
            Self::Cumulative => "cumulative",
        }
    }
}

impl fmt::Display for BenefitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BenefitType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "incremental" => Ok(Self::Incremental),
            "cumulative" => Ok(Self::Cumulative),
            other => Err(format!("unknown benefit type '{other}'")),
        }
    }
}

/// Accounting model of a benefit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BenefitKind {
    /// Used or not used; `used_at` marks when.
    Standard {
        value: f64,
        used_at: Option<NaiveDate>,
    },
    /// Redemptions accumulate toward `value` in each window.
    Incremental { value: f64 },
    /// Open-ended running total, optionally measured against `expected_value`.
    Cumulative { expected_value: Option<f64> },
}

impl BenefitKind {
    pub fn benefit_type(&self) -> BenefitType {
        match self {
            Self::Standard { .. } => BenefitType::Standard,
            Self::Incremental { .. } => BenefitType::Incremental,
            Self::Cumulative { .. } => BenefitType::Cumulative,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.benefit_type().as_str()
    }

    /// Builds a kind of `benefit_type` from these amounts. `used_at` only
    /// survives when the type stays standard.
    pub fn with_type(
        &self,
        benefit_type: BenefitType,
        value: f64,
        expected_value: Option<f64>,
    ) -> Self {
        match benefit_type {
            BenefitType::Standard => Self::Standard {
                value,
                used_at: if self.benefit_type() == BenefitType::Standard {
                    self.used_at()
                } else {
                    None
                },
            },
            BenefitType::Incremental => Self::Incremental { value },
            BenefitType::Cumulative => Self::Cumulative { expected_value },
        }
    }

    pub fn expected_value(&self) -> Option<f64> {
        match self {
            Self::Cumulative { expected_value } => *expected_value,
            _ => None,
        }
    }

    /// Flat per-window value; zero for cumulative benefits.
    pub fn flat_value(&self) -> f64 {
        match self {
            Self::Standard { value, .. } | Self::Incremental { value } => *value,
            Self::Cumulative { .. } => 0.0,
        }
    }

    pub fn used_at(&self) -> Option<NaiveDate> {
        match self {
            Self::Standard { used_at, .. } => *used_at,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benefit {
    pub id: i64,
    pub card_id: i64,
    pub name: String,
    pub frequency: Frequency,
    pub kind: BenefitKind,
    /// Per-window targets overriding the flat value, one per window.
    pub window_values: Option<Vec<f64>>,
    /// Overrides the card's year mode for this benefit only.
    pub window_tracking_mode: Option<YearTrackingMode>,
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub exclusions: Vec<WindowExclusion>,
}

impl Benefit {
    /// Checks configured amounts and the shape of `window_values`.
    pub fn validate(&self) -> Result<()> {
        let invalid = |v: f64| v < 0.0 || !v.is_finite();
        let bad_amount = match &self.kind {
            BenefitKind::Standard { value, .. } | BenefitKind::Incremental { value } => invalid(*value),
            BenefitKind::Cumulative { expected_value } => expected_value.is_some_and(invalid),
        };
        if bad_amount {
            return Err(TrackerError::InvalidAmount(format!(
                "benefit '{}' must have a finite value of zero or greater",
                self.name
            )));
        }

        let Some(values) = &self.window_values else {
            return Ok(());
        };
        if self.frequency.months_per_window().is_none() {
            return Err(TrackerError::InvalidWindowValues(
                "custom window values are only supported for monthly, quarterly, or semiannual benefits"
                    .to_string(),
            ));
        }
        let expected = self.frequency.windows_per_cycle();
        if values.len() != expected {
            return Err(TrackerError::InvalidWindowValues(format!(
                "expected {expected} values for a {} benefit, received {}",
                self.frequency,
                values.len()
            )));
        }
        if values.iter().any(|v| *v < 0.0 || !v.is_finite()) {
            return Err(TrackerError::InvalidWindowValues(
                "window values must be zero or greater".to_string(),
            ));
        }
        Ok(())
    }

    pub fn effective_mode(&self, card: &Card) -> YearTrackingMode {
        self.window_tracking_mode.unwrap_or(card.year_tracking_mode)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redemption {
    pub id: i64,
    pub benefit_id: i64,
    pub amount: f64,
    /// `None` when the stored date is malformed; such a redemption lands in no window.
    pub occurred_on: Option<NaiveDate>,
    pub label: String,
}

/// A user-deleted window instance. Matched by index, then exact range, then label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowExclusion {
    pub id: i64,
    pub benefit_id: i64,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub window_index: Option<u32>,
    pub window_label: Option<String>,
}

/// One annual-fee year, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
    pub mode: YearTrackingMode,
}

impl Cycle {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date_math::is_within_range(date, self.start, self.end)
    }
}

/// A sub-period of a cycle at benefit frequency, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub label: String,
    /// 1-based position within the parent cycle.
    pub index: u32,
}

impl Window {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date_math::is_within_range(date, self.start, self.end)
    }
}
