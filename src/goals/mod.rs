//! Earnings goals and their progress.
//!
//! A goal is a target amount to earn over an inclusive span of local calendar
//! dates. Progress is derived on every read from the tasks dated inside the
//! span (in the owner's timezone) and is never stored.

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::StoreFailurePolicy;
use crate::date_util::{inclusive_day_count, round_to};
use crate::error::{Error, Result};
use crate::metrics::{aggregate, PeriodAggregate};
use crate::query::period::DateRange;
use crate::storage::TaskStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub target_amount: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Input for creating or replacing a goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub title: String,
    pub target_amount: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl NewGoal {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("goal title is required".into()));
        }
        if !self.target_amount.is_finite() || self.target_amount <= 0.0 {
            return Err(Error::Validation(format!(
                "targetAmount must be greater than 0, got {}",
                self.target_amount
            )));
        }
        if self.end_date < self.start_date {
            return Err(Error::Validation(format!(
                "endDate {} is before startDate {}",
                self.end_date, self.start_date
            )));
        }
        Ok(())
    }
}

impl Goal {
    /// Inclusive number of days in the span.
    pub fn days(&self) -> u32 {
        inclusive_day_count(self.start_date, self.end_date)
    }

    pub fn daily_target(&self) -> f64 {
        self.target_amount / self.days() as f64
    }

    /// `[startOfDay(startDate), endOfDay(endDate)]` in `tz`, as UTC instants.
    pub fn span(&self, tz: Tz) -> DateRange {
        DateRange::local_days(self.start_date, self.end_date, tz)
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub achieved: f64,
    pub remaining: f64,
    pub percent: f64,
    pub days: u32,
    pub daily_target: f64,
    pub hours_per_day: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalWithProgress {
    #[serde(flatten)]
    pub goal: Goal,
    pub progress: GoalProgress,
}

/// Progress of `goal` given the aggregate over exactly its span.
pub fn progress(goal: &Goal, span_total: &PeriodAggregate, hourly_rate: f64) -> GoalProgress {
    let achieved = span_total.total_amount;
    let target = goal.target_amount;
    let days = goal.days();
    let daily_target = target / days as f64;
    let hours_per_day = if hourly_rate > 0.0 {
        daily_target / hourly_rate
    } else {
        0.0
    };
    let percent = if target > 0.0 {
        (achieved / target * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    GoalProgress {
        achieved: round_to(achieved, 2),
        remaining: round_to((target - achieved).max(0.0), 2),
        percent: round_to(percent, 2),
        days,
        daily_target: round_to(daily_target, 2),
        hours_per_day: round_to(hours_per_day, 2),
    }
}

/// Aggregate the goal span in the owner's timezone and compute progress.
pub async fn compute_goal_progress(
    store: &dyn TaskStore,
    goal: &Goal,
    tz: Tz,
    hourly_rate: f64,
    policy: StoreFailurePolicy,
) -> Result<GoalProgress> {
    let span_total = aggregate(store, &goal.user_id, goal.span(tz), tz, policy).await?;
    Ok(progress(goal, &span_total, hourly_rate))
}

/// The most recently started goal whose span covers `date`.
pub fn active_goal(goals: &[Goal], date: NaiveDate) -> Option<&Goal> {
    goals
        .iter()
        .filter(|g| g.covers(date))
        .max_by_key(|g| g.start_date)
}
