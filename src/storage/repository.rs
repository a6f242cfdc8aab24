use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::date_util::to_db_timestamp;
use crate::goals::{Goal, NewGoal};
use crate::profile::UserProfile;
use crate::query::builder::description_match_sql;
use crate::tasks::{NewTask, Task};

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

// ── Profiles ───────────────────────────────────────────────────────

pub fn upsert_profile(conn: &Connection, profile: &UserProfile) -> Result<(), rusqlite::Error> {
    conn.execute(
        &format!(
            "INSERT INTO user_profiles (user_id, username, timezone, hourly_rate, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, {NOW}, {NOW})
             ON CONFLICT(user_id) DO UPDATE SET
               username = excluded.username,
               timezone = excluded.timezone,
               hourly_rate = excluded.hourly_rate,
               updated_at = excluded.updated_at"
        ),
        params![
            profile.user_id,
            profile.username,
            profile.timezone,
            profile.hourly_rate
        ],
    )?;
    Ok(())
}

pub fn get_profile(conn: &Connection, user_id: &str) -> Result<Option<UserProfile>, rusqlite::Error> {
    conn.query_row(
        "SELECT user_id, username, timezone, hourly_rate FROM user_profiles WHERE user_id = ?1",
        params![user_id],
        profile_from_row,
    )
    .optional()
}

pub fn list_profiles(conn: &Connection) -> Result<Vec<UserProfile>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT user_id, username, timezone, hourly_rate FROM user_profiles ORDER BY user_id",
    )?;
    let rows = stmt.query_map([], profile_from_row)?;
    rows.collect()
}

fn profile_from_row(row: &Row<'_>) -> Result<UserProfile, rusqlite::Error> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        username: row.get(1)?,
        timezone: row.get(2)?,
        hourly_rate: row.get(3)?,
    })
}

// ── Tasks ──────────────────────────────────────────────────────────

/// Column list matching [`task_from_row`].
pub const TASK_COLUMNS: &str =
    "id, user_id, date, normal_hours, exceed_hours, total_hours, amount, description";

pub fn task_from_row(row: &Row<'_>) -> Result<Task, rusqlite::Error> {
    let date: String = row.get(2)?;
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: parse_stored_instant(2, &date)?,
        normal_hours: row.get(3)?,
        exceed_hours: row.get(4)?,
        total_hours: row.get(5)?,
        amount: row.get(6)?,
        description: row.get(7)?,
    })
}

/// Insert all `tasks` for `user_id` in one transaction. Returns the new ids
/// in input order. Nothing is written if any insert fails.
pub fn insert_tasks(
    conn: &mut Connection,
    user_id: &str,
    tasks: &[NewTask],
) -> Result<Vec<String>, rusqlite::Error> {
    let tx = conn.transaction()?;
    let mut ids = Vec::with_capacity(tasks.len());
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO tasks (id, user_id, date, normal_hours, exceed_hours, total_hours,
                                amount, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, {NOW}, {NOW})"
        ))?;
        for task in tasks {
            let id = uuid::Uuid::new_v4().to_string();
            stmt.execute(params![
                id,
                user_id,
                to_db_timestamp(task.date),
                task.normal_hours,
                task.exceed_hours,
                task.total_hours(),
                task.amount,
                task.description,
            ])?;
            ids.push(id);
        }
    }
    tx.commit()?;
    Ok(ids)
}

pub fn get_task(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Task>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        task_from_row,
    )
    .optional()
}

/// Overwrite the mutable fields of a stored task. Returns false if no task
/// with that id belongs to the owner.
pub fn update_task(conn: &Connection, task: &Task) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        &format!(
            "UPDATE tasks SET date = ?3, normal_hours = ?4, exceed_hours = ?5, total_hours = ?6,
                              amount = ?7, description = ?8, updated_at = {NOW}
             WHERE id = ?1 AND user_id = ?2"
        ),
        params![
            task.id,
            task.user_id,
            to_db_timestamp(task.date),
            task.normal_hours,
            task.exceed_hours,
            task.total_hours,
            task.amount,
            task.description,
        ],
    )?;
    Ok(n > 0)
}

pub fn delete_task(conn: &Connection, user_id: &str, id: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(n > 0)
}

/// Delete the given tasks of `user_id` in one transaction. Ids that do not
/// exist or belong to someone else are ignored.
pub fn delete_tasks_by_ids(
    conn: &mut Connection,
    user_id: &str,
    ids: &[String],
) -> Result<usize, rusqlite::Error> {
    let tx = conn.transaction()?;
    let mut deleted = 0;
    {
        let mut stmt = tx.prepare("DELETE FROM tasks WHERE id = ?1 AND user_id = ?2")?;
        for id in ids {
            deleted += stmt.execute(params![id, user_id])?;
        }
    }
    tx.commit()?;
    Ok(deleted)
}

/// Delete every task of `user_id` whose description contains any of
/// `item_ids` (case-insensitive). Runs in one transaction.
pub fn delete_tasks_matching_items(
    conn: &mut Connection,
    user_id: &str,
    item_ids: &[String],
) -> Result<usize, rusqlite::Error> {
    let tx = conn.transaction()?;
    let mut deleted = 0;
    {
        let mut stmt = tx.prepare(&format!(
            "DELETE FROM tasks WHERE user_id = ?1 AND {}",
            description_match_sql(2)
        ))?;
        for item_id in item_ids {
            deleted += stmt.execute(params![user_id, item_id])?;
        }
    }
    tx.commit()?;
    Ok(deleted)
}

// ── Goals ──────────────────────────────────────────────────────────

const GOAL_COLUMNS: &str = "id, user_id, title, target_amount, start_date, end_date";

fn goal_from_row(row: &Row<'_>) -> Result<Goal, rusqlite::Error> {
    let start: String = row.get(4)?;
    let end: String = row.get(5)?;
    Ok(Goal {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        target_amount: row.get(3)?,
        start_date: parse_stored_date(4, &start)?,
        end_date: parse_stored_date(5, &end)?,
    })
}

pub fn insert_goal(conn: &Connection, user_id: &str, goal: &NewGoal) -> Result<Goal, rusqlite::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        &format!(
            "INSERT INTO goals (id, user_id, title, target_amount, start_date, end_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, {NOW})"
        ),
        params![
            id,
            user_id,
            goal.title,
            goal.target_amount,
            goal.start_date.to_string(),
            goal.end_date.to_string(),
        ],
    )?;
    Ok(Goal {
        id,
        user_id: user_id.to_string(),
        title: goal.title.clone(),
        target_amount: goal.target_amount,
        start_date: goal.start_date,
        end_date: goal.end_date,
    })
}

pub fn get_goal(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Goal>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {GOAL_COLUMNS} FROM goals WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        goal_from_row,
    )
    .optional()
}

/// All goals of a user, most recently started first.
pub fn list_goals(conn: &Connection, user_id: &str) -> Result<Vec<Goal>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GOAL_COLUMNS} FROM goals WHERE user_id = ?1 ORDER BY start_date DESC, created_at DESC"
    ))?;
    let rows = stmt.query_map(params![user_id], goal_from_row)?;
    rows.collect()
}

pub fn update_goal(
    conn: &Connection,
    user_id: &str,
    id: &str,
    goal: &NewGoal,
) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "UPDATE goals SET title = ?3, target_amount = ?4, start_date = ?5, end_date = ?6
         WHERE id = ?1 AND user_id = ?2",
        params![
            id,
            user_id,
            goal.title,
            goal.target_amount,
            goal.start_date.to_string(),
            goal.end_date.to_string(),
        ],
    )?;
    Ok(n > 0)
}

pub fn delete_goal(conn: &Connection, user_id: &str, id: &str) -> Result<bool, rusqlite::Error> {
    let n = conn.execute(
        "DELETE FROM goals WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(n > 0)
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO app_config (key, value, updated_at) VALUES (?1, ?2, {NOW})"
        ),
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Stats ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct StoreStats {
    pub profiles: i64,
    pub tasks: i64,
    pub goals: i64,
    pub earliest_task: Option<String>,
    pub latest_task: Option<String>,
}

pub fn store_stats(conn: &Connection) -> Result<StoreStats, rusqlite::Error> {
    let count = |table: &str| -> Result<i64, rusqlite::Error> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
    };
    let (earliest_task, latest_task) =
        conn.query_row("SELECT MIN(date), MAX(date) FROM tasks", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
    Ok(StoreStats {
        profiles: count("user_profiles")?,
        tasks: count("tasks")?,
        goals: count("goals")?,
        earliest_task,
        latest_task,
    })
}

fn parse_stored_instant(idx: usize, s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_stored_date(idx: usize, s: &str) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
