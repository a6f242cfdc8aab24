//! Parse a pasted earnings notice into a task.
//!
//! Expected shape (exceeded line optional):
//!
//! ```text
//! You earned $25.79 for this task
//! Tasking time: 1 hour at $24.50 / hour
//! Exceeded time: 10 minutes 34 seconds at $7.35 / hour
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::Serialize;

use super::NewTask;
use crate::date_util::round_to;
use crate::error::{Error, Result};

static RE_TASKING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)Tasking time:\s*(?:(\d+)\s*hours?\s*)?(?:(\d+)\s*minutes?\s*)?(?:(\d+)\s*seconds?\s*)?at\s*\$(\d+(?:\.\d+)?)\s*/\s*hour",
    )
    .unwrap()
});
static RE_EXCEEDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)Exceeded time:\s*(?:(\d+)\s*hours?\s*)?(?:(\d+)\s*minutes?\s*)?(?:(\d+)\s*seconds?\s*)?at\s*\$(\d+(?:\.\d+)?)\s*/\s*hour",
    )
    .unwrap()
});

/// Hours and rates extracted from an earnings notice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEarnings {
    pub normal_hours: f64,
    pub normal_rate: f64,
    pub exceed_hours: f64,
    pub exceed_rate: f64,
}

impl ParsedEarnings {
    /// `normal * rate + exceed * exceedRate`, rounded to cents.
    pub fn amount(&self) -> f64 {
        round_to(
            self.normal_hours * self.normal_rate + self.exceed_hours * self.exceed_rate,
            2,
        )
    }

    pub fn into_new_task(self, date: DateTime<Utc>, text: &str) -> NewTask {
        NewTask {
            date,
            normal_hours: round_to(self.normal_hours, 3),
            exceed_hours: round_to(self.exceed_hours, 3),
            amount: self.amount(),
            description: Some(text.trim().to_string()),
        }
    }
}

pub fn parse_earnings_text(text: &str) -> Result<ParsedEarnings> {
    let tasking = RE_TASKING.captures(text).ok_or_else(|| {
        Error::Validation("invalid text format: no \"Tasking time: ... at $X / hour\" line".into())
    })?;
    let (normal_hours, normal_rate) = hours_and_rate(&tasking);
    let (exceed_hours, exceed_rate) = RE_EXCEEDED
        .captures(text)
        .map(|c| hours_and_rate(&c))
        .unwrap_or((0.0, 0.0));

    Ok(ParsedEarnings {
        normal_hours,
        normal_rate,
        exceed_hours,
        exceed_rate,
    })
}

fn hours_and_rate(caps: &Captures<'_>) -> (f64, f64) {
    let num = |i: usize| -> f64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    (num(1) + num(2) / 60.0 + num(3) / 3600.0, num(4))
}
