use chrono::{DateTime, Utc};

use crate::date_util::to_db_timestamp;
use crate::error::{Error, Result};
use crate::query::period::{DateRange, EndBound};
use crate::storage::repository::{task_from_row, TASK_COLUMNS};
use crate::storage::Database;
use crate::tasks::Task;

/// Builder for task queries with optional filters.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    user_id: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<(DateTime<Utc>, EndBound)>,
    description_contains: Option<String>,
    limit: Option<u32>,
    order_desc: bool,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    /// Only tasks dated inside `range`, honoring its end bound.
    pub fn within(mut self, range: DateRange) -> Self {
        self.start = Some(range.start);
        self.end = Some((range.end, range.bound));
        self
    }

    /// Only tasks dated at or after `start`.
    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Only tasks dated at or before `end`.
    pub fn through(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some((end, EndBound::Inclusive));
        self
    }

    /// Case-insensitive substring match on the description.
    pub fn description_contains(mut self, needle: &str) -> Self {
        self.description_contains = Some(needle.to_string());
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn descending(mut self) -> Self {
        self.order_desc = true;
        self
    }

    /// Build and execute the query, returning tasks.
    pub async fn tasks(self, db: &Database) -> Result<Vec<Task>> {
        let builder = self;
        let tasks = db
            .reader()
            .call(move |conn| {
                let (sql, params) = builder.build_sql();
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(param_refs.as_slice(), task_from_row)?;
                rows.collect::<std::result::Result<Vec<Task>, rusqlite::Error>>()
            })
            .await?;
        Ok(tasks)
    }

    /// Build and execute the query, returning a count of matching tasks.
    pub async fn count(self, db: &Database) -> Result<u64> {
        let builder = self;
        let count = db
            .reader()
            .call(move |conn| {
                let (inner_sql, params) = builder.build_sql();
                let sql = format!("SELECT COUNT(*) FROM ({inner_sql})");
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
                Ok::<u64, rusqlite::Error>(count as u64)
            })
            .await?;
        Ok(count)
    }

    /// Build and execute the query, returning results as JSON.
    pub async fn to_json(self, db: &Database) -> Result<String> {
        let rows = self.tasks(db).await?;
        serde_json::to_string_pretty(&rows).map_err(|e| Error::Other(e.to_string()))
    }

    /// Build and execute the query, returning results as CSV.
    pub async fn to_csv(self, db: &Database) -> Result<String> {
        let rows = self.tasks(db).await?;
        tasks_to_csv(&rows)
    }

    fn build_sql(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut wheres = Vec::new();
        let mut param_idx = 1;

        if let Some(ref user_id) = self.user_id {
            wheres.push(format!("user_id = ?{param_idx}"));
            params.push(Box::new(user_id.clone()));
            param_idx += 1;
        }

        // Stored dates are fixed-width UTC strings, so text order is time order
        if let Some(start) = self.start {
            wheres.push(format!("date >= ?{param_idx}"));
            params.push(Box::new(to_db_timestamp(start)));
            param_idx += 1;
        }

        if let Some((end, bound)) = self.end {
            let op = match bound {
                EndBound::Exclusive => "<",
                EndBound::Inclusive => "<=",
            };
            wheres.push(format!("date {op} ?{param_idx}"));
            params.push(Box::new(to_db_timestamp(end)));
            param_idx += 1;
        }

        if let Some(ref needle) = self.description_contains {
            wheres.push(description_match_sql(param_idx));
            params.push(Box::new(needle.clone()));
            param_idx += 1;
        }

        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks");
        if !wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&wheres.join(" AND "));
        }

        let order_dir = if self.order_desc { "DESC" } else { "ASC" };
        sql.push_str(&format!(" ORDER BY date {order_dir}, id {order_dir}"));

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT ?{param_idx}"));
            params.push(Box::new(limit));
        }

        (sql, params)
    }
}

/// SQL condition: the description contains parameter `?{param_idx}`,
/// ignoring case.
pub(crate) fn description_match_sql(param_idx: usize) -> String {
    format!("description IS NOT NULL AND instr(lower(description), lower(?{param_idx})) > 0")
}

/// Render tasks as CSV with a header row.
fn tasks_to_csv(tasks: &[Task]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "id",
        "date",
        "normal_hours",
        "exceed_hours",
        "total_hours",
        "amount",
        "description",
    ])?;
    for task in tasks {
        wtr.write_record([
            task.id.clone(),
            to_db_timestamp(task.date),
            task.normal_hours.to_string(),
            task.exceed_hours.to_string(),
            task.total_hours.to_string(),
            task.amount.to_string(),
            task.description.clone().unwrap_or_default(),
        ])?;
    }
    let bytes = wtr.into_inner().map_err(|e| Error::Other(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::Other(e.to_string()))
}
