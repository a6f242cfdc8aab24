//! Bulk import and deletion of tasks from exported payment sheets.
//!
//! Base pay (`prepay`) and overtime rows for the same work item on the same
//! local day describe one piece of work and are merged into a single task.
//! Every other pay type becomes a task of its own. The whole file is
//! validated and planned before anything is written, and the write itself
//! is a single transaction.

pub mod parse;
pub mod row;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::{repository, Database};
use crate::tasks::NewTask;
use row::{CsvRow, CsvSheet, PayType, RowError, COL_ITEM_ID, COL_PAY_TYPE, COL_WORK_DATE};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub inserted_count: usize,
    pub skipped_rows: Vec<RowError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    pub deleted_count: usize,
}

/// Tasks to insert plus the rows that were rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPlan {
    pub tasks: Vec<NewTask>,
    pub skipped_rows: Vec<RowError>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    item_id: String,
    date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    hours: f64,
    payout: f64,
}

impl Bucket {
    fn add(&mut self, row: &CsvRow) {
        self.hours += row.duration_hours;
        self.payout += row.payout;
    }
}

/// Everything known about one work item on one day.
#[derive(Debug, Clone)]
struct MergeState {
    first_line: u64,
    work_date: DateTime<Utc>,
    project_name: String,
    status: String,
    base: Option<Bucket>,
    overtime: Option<Bucket>,
}

impl MergeState {
    fn new(row: &CsvRow) -> Self {
        Self {
            first_line: row.line,
            work_date: row.work_date,
            project_name: row.project_name.clone(),
            status: row.status.clone(),
            base: None,
            overtime: None,
        }
    }

    fn add(&mut self, row: &CsvRow) {
        let bucket = match row.pay_type {
            PayType::Prepay => &mut self.base,
            _ => &mut self.overtime,
        };
        bucket.get_or_insert_with(Bucket::default).add(row);
    }

    fn into_task(self, item_id: &str) -> Option<NewTask> {
        if self.base.is_none() && self.overtime.is_none() {
            return None;
        }
        let base = self.base.unwrap_or_default();
        let overtime = self.overtime.unwrap_or_default();
        Some(NewTask {
            date: self.work_date,
            normal_hours: base.hours,
            exceed_hours: overtime.hours,
            amount: base.payout + overtime.payout,
            description: Some(format!(
                "Task {item_id} - {} - {}",
                self.project_name, self.status
            )),
        })
    }
}

fn standalone_task(row: &CsvRow) -> NewTask {
    let hours = match row.pay_type {
        PayType::WorkedTime => row.duration_hours,
        _ => 0.0,
    };
    NewTask {
        date: row.work_date,
        normal_hours: hours,
        exceed_hours: 0.0,
        amount: row.payout,
        description: Some(format!(
            "{} - {} - {}",
            row.pay_type_label, row.project_name, row.item_id
        )),
    }
}

/// Turn a sheet into the tasks it describes, dating rows in `tz`.
pub fn plan_import(data: &str, tz: Tz) -> Result<ImportPlan> {
    let sheet = CsvSheet::parse(data)?;
    sheet.require_columns(&[COL_WORK_DATE, COL_ITEM_ID, COL_PAY_TYPE])?;
    let (rows, mut skipped_rows) = sheet.rows(tz);

    // (line, task) so that late rejections can still point at the file
    let mut tasks: Vec<(u64, NewTask)> = Vec::new();
    let mut groups: BTreeMap<GroupKey, MergeState> = BTreeMap::new();
    for row in &rows {
        if !row.pay_type.is_groupable() {
            tasks.push((row.line, standalone_task(row)));
            continue;
        }
        groups
            .entry(GroupKey {
                item_id: row.item_id.clone(),
                date: row.local_date,
            })
            .or_insert_with(|| MergeState::new(row))
            .add(row);
    }
    tasks.extend(groups.into_iter().filter_map(|(key, state)| {
        let line = state.first_line;
        state.into_task(&key.item_id).map(|t| (line, t))
    }));

    // Values that cannot be stored (e.g. negative payouts) are skipped here
    // so the bulk insert never fails halfway.
    let mut valid = Vec::with_capacity(tasks.len());
    for (line, task) in tasks {
        match task.validate() {
            Ok(()) => valid.push(task),
            Err(e) => skipped_rows.push(RowError {
                line,
                message: e.to_string(),
            }),
        }
    }
    skipped_rows.sort_by_key(|r| r.line);

    Ok(ImportPlan {
        tasks: valid,
        skipped_rows,
    })
}

/// Distinct item ids to purge. A sheet without any is an error.
pub fn plan_deletion(data: &str) -> Result<Vec<String>> {
    let sheet = CsvSheet::parse(data)?;
    sheet.require_columns(&[COL_ITEM_ID])?;
    let ids = sheet.item_ids();
    if ids.is_empty() {
        return Err(Error::Validation("no item ids found in CSV".into()));
    }
    Ok(ids)
}

/// Import a sheet for `user_id` in one transaction.
pub async fn import_csv(db: &Database, user_id: &str, data: &str, tz: Tz) -> Result<ImportReport> {
    let plan = plan_import(data, tz)?;
    for skipped in &plan.skipped_rows {
        log::warn!("Skipping CSV line {}: {}", skipped.line, skipped.message);
    }

    let inserted_count = if plan.tasks.is_empty() {
        0
    } else {
        let user = user_id.to_string();
        let tasks = plan.tasks;
        db.writer()
            .call(move |conn| repository::insert_tasks(conn, &user, &tasks))
            .await?
            .len()
    };
    log::info!(
        "Imported {inserted_count} task(s) for {user_id}, skipped {} row(s)",
        plan.skipped_rows.len()
    );

    Ok(ImportReport {
        inserted_count,
        skipped_rows: plan.skipped_rows,
    })
}

/// Delete every task of `user_id` whose description mentions an item id
/// from the sheet. Matching nothing is reported as not found.
pub async fn delete_from_csv(db: &Database, user_id: &str, data: &str) -> Result<DeleteReport> {
    let ids = plan_deletion(data)?;
    let id_count = ids.len();

    let user = user_id.to_string();
    let deleted_count = db
        .writer()
        .call(move |conn| repository::delete_tasks_matching_items(conn, &user, &ids))
        .await?;

    if deleted_count == 0 {
        return Err(Error::NotFound(format!(
            "no tasks match the {id_count} item id(s) in the CSV"
        )));
    }
    log::info!("Deleted {deleted_count} task(s) for {user_id} matching {id_count} item id(s)");
    Ok(DeleteReport { deleted_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::to_db_timestamp;
    use crate::query::TaskQuery;

    const HEADER: &str = "workDate,itemID,duration,payout,payType,projectName,status\n";

    fn sheet(rows: &[&str]) -> String {
        let mut s = HEADER.to_string();
        for r in rows {
            s.push_str(r);
            s.push('\n');
        }
        s
    }

    #[test]
    fn test_base_and_overtime_merge() {
        let data = sheet(&[
            "2024-01-01,X1,1h,$10.00,prepay,Alpha,approved",
            "2024-01-01,X1,30m,$5.00,overtime,Alpha,approved",
        ]);
        let plan = plan_import(&data, chrono_tz::UTC).unwrap();
        assert_eq!(plan.tasks.len(), 1);
        let t = &plan.tasks[0];
        assert_eq!(t.normal_hours, 1.0);
        assert_eq!(t.exceed_hours, 0.5);
        assert_eq!(t.total_hours(), 1.5);
        assert_eq!(t.amount, 15.0);
        assert_eq!(t.description.as_deref(), Some("Task X1 - Alpha - approved"));
        assert!(plan.skipped_rows.is_empty());
    }

    #[test]
    fn test_groups_split_by_item_and_day() {
        let data = sheet(&[
            "2024-01-01,X1,1h,$10,prepay,Alpha,ok",
            "2024-01-01,X1,1h,$10,prepay,Alpha,ok",
            "2024-01-02,X1,1h,$10,prepay,Alpha,ok",
            "2024-01-01,X2,1h,$10,overtimepay,Alpha,ok",
        ]);
        let plan = plan_import(&data, chrono_tz::UTC).unwrap();
        assert_eq!(plan.tasks.len(), 3);

        let x1_day1 = &plan.tasks[0];
        assert_eq!(x1_day1.normal_hours, 2.0);
        assert_eq!(x1_day1.amount, 20.0);

        // Overtime alone still yields a task, with no base hours
        let x2 = &plan.tasks[2];
        assert_eq!(x2.normal_hours, 0.0);
        assert_eq!(x2.exceed_hours, 1.0);
        assert_eq!(x2.amount, 10.0);
    }

    #[test]
    fn test_standalone_rows() {
        let data = sheet(&[
            "2024-01-01,R9,-,$25.00,missionReward,Beta,paid",
            "2024-01-01,H1,2h 15m,$45.00,hubstaffOperation,Gamma,paid",
        ]);
        let plan = plan_import(&data, chrono_tz::UTC).unwrap();
        assert_eq!(plan.tasks.len(), 2);

        let reward = &plan.tasks[0];
        assert_eq!(reward.normal_hours, 0.0);
        assert_eq!(reward.amount, 25.0);
        assert_eq!(reward.description.as_deref(), Some("missionReward - Beta - R9"));

        let worked = &plan.tasks[1];
        assert_eq!(worked.normal_hours, 2.25);
        assert_eq!(worked.exceed_hours, 0.0);
    }

    #[test]
    fn test_grouping_uses_local_day() {
        // 03:00Z and 06:00Z on Jan 2 are Jan 1 and Jan 2 in New York
        let data = sheet(&[
            "2024-01-02T03:00:00Z,X1,1h,$10,prepay,Alpha,ok",
            "2024-01-02T06:00:00Z,X1,1h,$10,overtime,Alpha,ok",
        ]);
        let plan = plan_import(&data, chrono_tz::America::New_York).unwrap();
        assert_eq!(plan.tasks.len(), 2);

        let utc = plan_import(&data, chrono_tz::UTC).unwrap();
        assert_eq!(utc.tasks.len(), 1);
        assert_eq!(
            to_db_timestamp(utc.tasks[0].date),
            "2024-01-02T03:00:00.000Z"
        );
    }

    #[test]
    fn test_bad_rows_are_skipped_not_fatal() {
        let data = sheet(&[
            "2024-01-01,X1,1h,$10,prepay,Alpha,ok",
            "not-a-date,X2,1h,$10,prepay,Alpha,ok",
            "2024-01-01,,1h,$10,prepay,Alpha,ok",
            "2024-01-01,X3,1h,-$10,payAdjustment,Alpha,ok",
        ]);
        let plan = plan_import(&data, chrono_tz::UTC).unwrap();
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.skipped_rows.len(), 3);
        assert_eq!(plan.skipped_rows[0].line, 3);
        assert_eq!(plan.skipped_rows[1].line, 4);
        assert_eq!(plan.skipped_rows[2].line, 5);
        assert!(plan.skipped_rows[2].message.contains("amount"));
    }

    #[test]
    fn test_structural_errors_are_fatal() {
        assert!(matches!(
            plan_import(HEADER, chrono_tz::UTC),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            plan_import("itemID,payout\nX1,$1\n", chrono_tz::UTC),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            plan_deletion("itemID,payout\n,$1\n"),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_import_then_delete() {
        let db = Database::open_memory().await.unwrap();
        let data = sheet(&[
            "2024-01-01,X1,1h,$10.00,prepay,Alpha,approved",
            "2024-01-01,X1,30m,$5.00,overtime,Alpha,approved",
            "2024-01-01,R9,-,$25.00,missionReward,Beta,paid",
        ]);

        let report = import_csv(&db, "u1", &data, chrono_tz::UTC).await.unwrap();
        assert_eq!(report.inserted_count, 2);
        assert!(report.skipped_rows.is_empty());
        assert_eq!(TaskQuery::new().user("u1").count(&db).await.unwrap(), 2);

        let report = delete_from_csv(&db, "u1", "itemID\nx1\n").await.unwrap();
        assert_eq!(report.deleted_count, 1);
        assert_eq!(TaskQuery::new().user("u1").count(&db).await.unwrap(), 1);

        let err = delete_from_csv(&db, "u1", "itemID\nX1\n").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
