//! Trend and productivity evaluation. Pure functions over aggregates.

use super::types::{PeriodAggregate, TrendResult};
use crate::date_util::round_to;

/// Per-day target when there is neither a goal nor any history.
pub const FALLBACK_DAILY_TARGET: f64 = 100.0;
/// Multiplier applied to the historical daily average to get a target.
pub const HISTORICAL_TARGET_FACTOR: f64 = 1.1;

/// Average earnings per active day in `historical`.
pub fn avg_earnings_per_day(historical: &PeriodAggregate) -> f64 {
    historical.total_amount / historical.unique_days.max(1) as f64
}

/// Per-day target: the goal spread over the period, else 110% of the
/// historical daily average, else [`FALLBACK_DAILY_TARGET`].
pub fn daily_target(
    goal_target_for_period: f64,
    days_in_period: u32,
    historical: &PeriodAggregate,
) -> f64 {
    if goal_target_for_period > 0.0 {
        return goal_target_for_period / days_in_period.max(1) as f64;
    }
    let avg = avg_earnings_per_day(historical);
    if avg > 0.0 {
        avg * HISTORICAL_TARGET_FACTOR
    } else {
        FALLBACK_DAILY_TARGET
    }
}

pub fn evaluate(
    current: &PeriodAggregate,
    prior: &PeriodAggregate,
    historical: &PeriodAggregate,
    goal_target_for_period: f64,
    days_in_period: u32,
) -> TrendResult {
    let target = daily_target(goal_target_for_period, days_in_period, historical);
    let current_per_day = current.total_amount / days_in_period.max(1) as f64;

    let productivity = if target > 0.0 {
        (current_per_day / target * 100.0).round()
    } else {
        0.0
    };

    let trend = if prior.total_amount > 0.0 {
        // +0.0 folds a rounded -0.0 into 0
        ((current.total_amount - prior.total_amount) / prior.total_amount * 100.0).round() + 0.0
    } else {
        0.0
    };

    let shortfall = if trend < 0.0 {
        round_to((prior.total_amount - current.total_amount).abs(), 2)
    } else {
        0.0
    };

    TrendResult {
        productivity,
        target: round_to(target, 2),
        trend,
        shortfall,
    }
}
