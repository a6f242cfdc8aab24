//! Task (time entry) model: one unit of billable work.

pub mod text;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A stored time entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub user_id: String,
    /// When the work occurred (UTC instant).
    pub date: DateTime<Utc>,
    pub normal_hours: f64,
    pub exceed_hours: f64,
    pub total_hours: f64,
    pub amount: f64,
    pub description: Option<String>,
}

/// Input for creating a task. Ownership is attached on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub date: DateTime<Utc>,
    pub normal_hours: f64,
    pub exceed_hours: f64,
    pub amount: f64,
    pub description: Option<String>,
}

impl NewTask {
    pub fn total_hours(&self) -> f64 {
        self.normal_hours + self.exceed_hours
    }

    pub fn validate(&self) -> Result<()> {
        check_non_negative("normalHours", self.normal_hours)?;
        check_non_negative("exceedHours", self.exceed_hours)?;
        check_non_negative("amount", self.amount)?;
        Ok(())
    }
}

/// Partial edit of a task; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub date: Option<DateTime<Utc>>,
    pub normal_hours: Option<f64>,
    pub exceed_hours: Option<f64>,
    pub amount: Option<f64>,
    pub description: Option<String>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self == &TaskUpdate::default()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(h) = self.normal_hours {
            check_non_negative("normalHours", h)?;
        }
        if let Some(h) = self.exceed_hours {
            check_non_negative("exceedHours", h)?;
        }
        if let Some(a) = self.amount {
            check_non_negative("amount", a)?;
        }
        Ok(())
    }

    /// Apply the edit to `task`, recomputing `total_hours`.
    pub fn apply(&self, task: &mut Task) {
        if let Some(date) = self.date {
            task.date = date;
        }
        if let Some(h) = self.normal_hours {
            task.normal_hours = h;
        }
        if let Some(h) = self.exceed_hours {
            task.exceed_hours = h;
        }
        if let Some(a) = self.amount {
            task.amount = a;
        }
        if let Some(ref d) = self.description {
            task.description = Some(d.clone());
        }
        task.total_hours = task.normal_hours + task.exceed_hours;
    }
}

fn check_non_negative(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Validation(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_task() -> NewTask {
        NewTask {
            date: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            normal_hours: 1.0,
            exceed_hours: 0.5,
            amount: 15.0,
            description: None,
        }
    }

    #[test]
    fn test_validate() {
        assert!(new_task().validate().is_ok());
        assert_eq!(new_task().total_hours(), 1.5);

        let mut t = new_task();
        t.amount = -1.0;
        assert!(matches!(t.validate(), Err(Error::Validation(_))));

        let mut t = new_task();
        t.normal_hours = f64::NAN;
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_update_apply_recomputes_total() {
        let mut task = Task {
            id: "t1".into(),
            user_id: "u1".into(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            normal_hours: 1.0,
            exceed_hours: 0.0,
            total_hours: 1.0,
            amount: 10.0,
            description: Some("old".into()),
        };
        let update = TaskUpdate {
            exceed_hours: Some(0.25),
            description: Some("new".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut task);
        assert_eq!(task.total_hours, 1.25);
        assert_eq!(task.amount, 10.0);
        assert_eq!(task.description.as_deref(), Some("new"));
        assert!(TaskUpdate::default().is_empty());
    }
}
