pub mod trend;
pub mod types;

pub use types::*;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::StoreFailurePolicy;
use crate::date_util::{local_date, round_to};
use crate::error::{Error, Result};
use crate::goals::Goal;
use crate::query::period::{DateRange, Period};
use crate::storage::TaskStore;
use crate::tasks::Task;

/// Longest historical series a caller may request.
pub const MAX_SERIES_POINTS: u32 = 366;

/// Sum `tasks` into an aggregate, bucketing days in `tz`.
pub fn summarize(tasks: &[Task], tz: Tz) -> PeriodAggregate {
    let mut hours = 0.0;
    let mut amount = 0.0;
    let mut days = HashSet::new();
    for task in tasks {
        hours += task.total_hours;
        amount += task.amount;
        days.insert(local_date(task.date, tz));
    }
    PeriodAggregate {
        total_hours: round_to(hours, 3),
        total_tasks: tasks.len() as u64,
        total_amount: round_to(amount, 2),
        unique_days: (days.len() as u32).max(1),
    }
}

/// Aggregate `user_id`'s tasks inside `range`.
///
/// Under [`StoreFailurePolicy::Degrade`] an unreachable store yields
/// [`PeriodAggregate::empty`] and the failure is only logged.
pub async fn aggregate(
    store: &dyn TaskStore,
    user_id: &str,
    range: DateRange,
    tz: Tz,
    policy: StoreFailurePolicy,
) -> Result<PeriodAggregate> {
    log::debug!(
        "Aggregating {user_id} over {} .. {} ({:?})",
        range.start,
        range.end,
        range.bound
    );
    match store.tasks_in_range(user_id, range).await {
        Ok(tasks) => Ok(summarize(&tasks, tz)),
        Err(e) => match policy {
            StoreFailurePolicy::Degrade => {
                log::error!("Task store query failed for {user_id}, reporting zero activity: {e}");
                Ok(PeriodAggregate::empty())
            }
            StoreFailurePolicy::Raise => Err(match e {
                Error::Dependency(_) => e,
                other => Error::Dependency(other.to_string()),
            }),
        },
    }
}

/// Aggregate for the period containing `now`, with a half-open end.
pub async fn get_metrics(
    store: &dyn TaskStore,
    user_id: &str,
    period: Period,
    now: DateTime<Utc>,
    tz: Tz,
    policy: StoreFailurePolicy,
) -> Result<PeriodAggregate> {
    let current = period.resolve(now, tz);
    aggregate(store, user_id, current.range(), tz, policy).await
}

/// Current period aggregate plus trend, productivity and historical averages.
///
/// `goal` is the goal active on the reference date, if any; its daily target
/// scaled to the period drives the productivity target.
pub async fn get_detailed_metrics(
    store: &dyn TaskStore,
    user_id: &str,
    period: Period,
    now: DateTime<Utc>,
    tz: Tz,
    goal: Option<&Goal>,
    policy: StoreFailurePolicy,
) -> Result<DetailedMetrics> {
    let current_range = period.resolve(now, tz);
    let prior_range = period.previous(&current_range, tz);
    let history = period.history_window(&current_range, tz);
    let days_in_period = current_range.days();

    let current = aggregate(store, user_id, current_range.range(), tz, policy).await?;
    let prior = aggregate(store, user_id, prior_range.range(), tz, policy).await?;
    let historical = aggregate(store, user_id, history, tz, policy).await?;

    let goal_target = goal.map(|g| g.daily_target() * days_in_period as f64);
    let trend = trend::evaluate(
        &current,
        &prior,
        &historical,
        goal_target.unwrap_or(0.0),
        days_in_period,
    );

    let days_considered = historical.unique_days.max(1);
    let per_day = |v: f64| round_to(v / days_considered as f64, 2);

    Ok(DetailedMetrics {
        period,
        range: current_range.range(),
        current,
        days_in_period,
        current_earnings_per_day: round_to(current.total_amount / days_in_period as f64, 2),
        trend,
        previous_period: prior.total_amount,
        avg_tasks_per_day: per_day(historical.total_tasks as f64),
        avg_hours_per_day: per_day(historical.total_hours),
        avg_earnings_per_day: per_day(historical.total_amount),
        days_considered,
        goal_target: goal_target.map(|t| round_to(t, 2)),
    })
}

/// `periods_back` consecutive periods ending with the one containing `now`,
/// oldest first. Each point resolves its own boundaries.
pub async fn get_historical_series(
    store: &dyn TaskStore,
    user_id: &str,
    period: Period,
    periods_back: u32,
    now: DateTime<Utc>,
    tz: Tz,
    policy: StoreFailurePolicy,
) -> Result<Vec<HistoricalPoint>> {
    if periods_back == 0 || periods_back > MAX_SERIES_POINTS {
        return Err(Error::Validation(format!(
            "periods must be between 1 and {MAX_SERIES_POINTS}, got {periods_back}"
        )));
    }

    let current = period.resolve(now, tz);
    let mut points = Vec::with_capacity(periods_back as usize);
    for back in (0..periods_back).rev() {
        let resolved = period.resolve_local(period.shift_back(current.start_date, back), tz);
        let totals = aggregate(store, user_id, resolved.range(), tz, policy).await?;
        points.push(HistoricalPoint {
            label: resolved.label(),
            range: resolved.range(),
            aggregate: totals,
        });
    }
    Ok(points)
}
