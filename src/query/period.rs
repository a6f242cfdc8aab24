use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::date_util::{
    first_of_month, last_day_of_month, local_date, local_end_of_day, local_midnight,
    parse_timezone,
};
use crate::error::{Error, Result};

/// Days of history behind a daily period used as the comparison baseline.
pub const DAILY_HISTORY_DAYS: u32 = 30;
/// Weeks of history behind a weekly period.
pub const WEEKLY_HISTORY_WEEKS: u32 = 12;
/// Months of history behind a monthly period.
pub const MONTHLY_HISTORY_MONTHS: u32 = 6;

/// A recurring local-time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

/// Whether the final instant of a [`DateRange`] belongs to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndBound {
    /// `[start, end)`, used by live dashboards.
    Exclusive,
    /// `[start, end]`, used by summaries, history and goal progress.
    Inclusive,
}

/// An absolute UTC time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bound: EndBound,
}

impl DateRange {
    pub fn half_open(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end, bound: EndBound::Exclusive }
    }

    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end, bound: EndBound::Inclusive }
    }

    /// Closed range covering the local dates `first..=last` in `tz`.
    pub fn local_days(first: NaiveDate, last: NaiveDate, tz: Tz) -> Self {
        Self::closed(local_midnight(first, tz), local_end_of_day(last, tz))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        if instant < self.start {
            return false;
        }
        match self.bound {
            EndBound::Exclusive => instant < self.end,
            EndBound::Inclusive => instant <= self.end,
        }
    }
}

/// A period resolved against a reference instant and timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodRange {
    pub period: Period,
    /// First local date of the period.
    pub start_date: NaiveDate,
    /// First local date after the period.
    pub end_date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PeriodRange {
    /// Number of local calendar days covered.
    pub fn days(&self) -> u32 {
        (self.end_date - self.start_date).num_days().max(1) as u32
    }

    /// The half-open UTC range used for live queries.
    pub fn range(&self) -> DateRange {
        DateRange::half_open(self.start, self.end)
    }

    /// Human label: the start date, or `YYYY-MM` for months.
    pub fn label(&self) -> String {
        match self.period {
            Period::Monthly => self.start_date.format("%Y-%m").to_string(),
            Period::Daily | Period::Weekly => self.start_date.format("%Y-%m-%d").to_string(),
        }
    }
}

impl Period {
    /// Parse a period keyword (`daily`, `weekly`, `monthly`).
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(Period::Daily),
            "weekly" | "week" => Ok(Period::Weekly),
            "monthly" | "month" => Ok(Period::Monthly),
            other => Err(Error::Validation(format!(
                "unknown period: {other} (expected daily, weekly or monthly)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }

    /// First local date of the period containing `date`. Weeks start on Sunday.
    pub fn start_of(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Period::Daily => date,
            Period::Weekly => {
                date - Duration::days(date.weekday().num_days_from_sunday() as i64)
            }
            Period::Monthly => first_of_month(date),
        }
    }

    /// First local date after the period starting at `start`.
    fn end_of(&self, start: NaiveDate) -> NaiveDate {
        match self {
            Period::Daily => start + Duration::days(1),
            Period::Weekly => start + Duration::days(7),
            Period::Monthly => last_day_of_month(start.year(), start.month())
                .and_then(|d| d.succ_opt())
                .unwrap_or(start + Duration::days(31)),
        }
    }

    /// Start date of the period `n` steps before the one starting at `start`.
    pub fn shift_back(&self, start: NaiveDate, n: u32) -> NaiveDate {
        match self {
            Period::Daily => start - Duration::days(n as i64),
            Period::Weekly => start - Duration::days(7 * n as i64),
            Period::Monthly => start
                .checked_sub_months(Months::new(n))
                .unwrap_or(NaiveDate::MIN),
        }
    }

    /// Resolve the period containing `reference` in `tz` into UTC boundaries.
    pub fn resolve(&self, reference: DateTime<Utc>, tz: Tz) -> PeriodRange {
        self.resolve_local(local_date(reference, tz), tz)
    }

    /// Like [`Period::resolve`] but with a timezone name.
    pub fn resolve_in(&self, reference: DateTime<Utc>, timezone: &str) -> Result<PeriodRange> {
        let tz = parse_timezone(timezone)?;
        Ok(self.resolve(reference, tz))
    }

    /// Resolve the period containing the local date `date`.
    pub fn resolve_local(&self, date: NaiveDate, tz: Tz) -> PeriodRange {
        let start_date = self.start_of(date);
        let end_date = self.end_of(start_date);
        PeriodRange {
            period: *self,
            start_date,
            end_date,
            start: local_midnight(start_date, tz),
            end: local_midnight(end_date, tz),
        }
    }

    /// The period immediately before `current`.
    pub fn previous(&self, current: &PeriodRange, tz: Tz) -> PeriodRange {
        self.resolve_local(self.shift_back(current.start_date, 1), tz)
    }

    /// Closed baseline window ending right before `current` starts:
    /// 30 days, 12 weeks or 6 months.
    pub fn history_window(&self, current: &PeriodRange, tz: Tz) -> DateRange {
        let steps = match self {
            Period::Daily => DAILY_HISTORY_DAYS,
            Period::Weekly => WEEKLY_HISTORY_WEEKS,
            Period::Monthly => MONTHLY_HISTORY_MONTHS,
        };
        let first = self.shift_back(current.start_date, steps);
        DateRange::closed(
            local_midnight(first, tz),
            current.start - Duration::milliseconds(1),
        )
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
