use serde::Serialize;

use crate::query::period::{DateRange, Period};

/// Summed activity over a time range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodAggregate {
    /// Rounded to 3 decimals.
    pub total_hours: f64,
    pub total_tasks: u64,
    /// Rounded to 2 decimals.
    pub total_amount: f64,
    /// Distinct local calendar dates among matched tasks, at least 1.
    pub unique_days: u32,
}

impl PeriodAggregate {
    /// The aggregate of no tasks.
    pub fn empty() -> Self {
        Self {
            total_hours: 0.0,
            total_tasks: 0,
            total_amount: 0.0,
            unique_days: 1,
        }
    }
}

impl Default for PeriodAggregate {
    fn default() -> Self {
        Self::empty()
    }
}

/// Productivity, target, trend and shortfall for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResult {
    /// Whole percent of the per-day target reached.
    pub productivity: f64,
    /// Per-day earnings target, rounded to 2 decimals.
    pub target: f64,
    /// Whole percent change against the prior period.
    pub trend: f64,
    /// Drop in earnings against the prior period; 0 unless `trend < 0`.
    pub shortfall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedMetrics {
    pub period: Period,
    pub range: DateRange,
    #[serde(flatten)]
    pub current: PeriodAggregate,
    pub days_in_period: u32,
    pub current_earnings_per_day: f64,
    #[serde(flatten)]
    pub trend: TrendResult,
    pub previous_period: f64,
    pub avg_tasks_per_day: f64,
    pub avg_hours_per_day: f64,
    pub avg_earnings_per_day: f64,
    pub days_considered: u32,
    /// Goal amount scaled to this period, when a goal covers today.
    pub goal_target: Option<f64>,
}

/// One point of a historical series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalPoint {
    pub label: String,
    pub range: DateRange,
    #[serde(flatten)]
    pub aggregate: PeriodAggregate,
}
