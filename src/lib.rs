pub mod clock;
pub mod config;
pub mod date_util;
pub mod error;
pub mod goals;
pub mod ingest;
pub mod metrics;
pub mod profile;
pub mod query;
pub mod storage;
pub mod tasks;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, StoreFailurePolicy};
pub use error::{Error, ErrorKind, Result};
pub use goals::{Goal, GoalProgress, GoalWithProgress, NewGoal};
pub use ingest::{DeleteReport, ImportReport};
pub use metrics::{DetailedMetrics, HistoricalPoint, PeriodAggregate, TrendResult};
pub use profile::UserProfile;
pub use query::builder::TaskQuery;
pub use query::period::{DateRange, Period, PeriodRange};
pub use storage::Database;
pub use tasks::{NewTask, Task, TaskUpdate};

// Re-export repository types needed by the binary crate, but not the module itself
pub use storage::repository::StoreStats;

use date_util::{local_date, local_end_of_day, local_midnight};
use storage::repository;

/// Main entry point: earnings tracking for one store.
///
/// Every operation is scoped to a single user id and reads that user's
/// timezone from their profile before resolving any period.
pub struct EarnLog {
    db: Database,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl EarnLog {
    /// Wrap `db`, loading persisted settings and using the system clock.
    pub async fn open(db: Database) -> Result<Self> {
        let config = EngineConfig::load(&db).await?;
        Ok(Self::with_config(db, config, Arc::new(SystemClock)))
    }

    pub fn with_config(db: Database, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock, config }
    }

    /// Replace the source of "now".
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn settings(&self, user_id: &str) -> Result<(Tz, f64)> {
        profile::profile_settings(&self.db, user_id).await
    }

    /// The timezone periods are resolved in for `user_id`.
    pub async fn timezone(&self, user_id: &str) -> Result<Tz> {
        Ok(self.settings(user_id).await?.0)
    }

    // ── Profiles ─────────────────────────────────────────────────

    pub async fn set_profile(&self, profile: UserProfile) -> Result<UserProfile> {
        profile.validate()?;
        self.db
            .writer()
            .call({
                let profile = profile.clone();
                move |conn| repository::upsert_profile(conn, &profile)
            })
            .await?;
        Ok(profile)
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        use crate::profile::ProfileProvider;
        self.db.profile(user_id).await
    }

    pub async fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        Ok(self.db.reader().call(|conn| repository::list_profiles(conn)).await?)
    }

    // ── Tasks ────────────────────────────────────────────────────

    pub async fn add_task(&self, user_id: &str, task: NewTask) -> Result<Task> {
        task.validate()?;
        let user = user_id.to_string();
        let ids = self
            .db
            .writer()
            .call(move |conn| repository::insert_tasks(conn, &user, &[task]))
            .await?;
        let id = ids
            .into_iter()
            .next()
            .ok_or_else(|| Error::Other("insert returned no id".into()))?;
        self.task(user_id, &id).await
    }

    /// Create a task from a pasted earnings notice, dated now.
    pub async fn add_task_from_text(&self, user_id: &str, text: &str) -> Result<Task> {
        let parsed = tasks::text::parse_earnings_text(text)?;
        self.add_task(user_id, parsed.into_new_task(self.now(), text))
            .await
    }

    pub async fn task(&self, user_id: &str, id: &str) -> Result<Task> {
        let (user, task_id) = (user_id.to_string(), id.to_string());
        self.db
            .reader()
            .call(move |conn| repository::get_task(conn, &user, &task_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))
    }

    /// Query for a user's tasks, newest first, limited to the local dates
    /// `start..=end` in the user's timezone. Either bound may be open.
    pub async fn task_query(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TaskQuery> {
        let mut query = TaskQuery::new().user(user_id).descending();
        if let (Some(first), Some(last)) = (start, end) {
            if last < first {
                return Err(Error::Validation(format!(
                    "end date {last} is before start date {first}"
                )));
            }
        }
        if start.is_none() && end.is_none() {
            return Ok(query);
        }

        let (tz, _) = self.settings(user_id).await?;
        if let Some(first) = start {
            query = query.since(local_midnight(first, tz));
        }
        if let Some(last) = end {
            query = query.through(local_end_of_day(last, tz));
        }
        Ok(query)
    }

    /// Query for a user's tasks inside the current `period` (half-open),
    /// newest first.
    pub async fn period_task_query(&self, user_id: &str, period: Period) -> Result<TaskQuery> {
        let (tz, _) = self.settings(user_id).await?;
        let current = period.resolve(self.now(), tz);
        Ok(TaskQuery::new()
            .user(user_id)
            .within(current.range())
            .descending())
    }

    /// Tasks of a user, newest first, optionally limited to local dates.
    pub async fn list_tasks(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Task>> {
        self.task_query(user_id, start, end)
            .await?
            .tasks(&self.db)
            .await
    }

    /// Tasks inside the current `period` (half-open), newest first.
    pub async fn list_tasks_for_period(&self, user_id: &str, period: Period) -> Result<Vec<Task>> {
        self.period_task_query(user_id, period)
            .await?
            .tasks(&self.db)
            .await
    }

    pub async fn update_task(&self, user_id: &str, id: &str, update: TaskUpdate) -> Result<Task> {
        update.validate()?;
        let mut task = self.task(user_id, id).await?;
        if update.is_empty() {
            return Ok(task);
        }
        update.apply(&mut task);
        let updated = self
            .db
            .writer()
            .call({
                let task = task.clone();
                move |conn| repository::update_task(conn, &task)
            })
            .await?;
        if !updated {
            return Err(Error::NotFound(format!("task {id}")));
        }
        Ok(task)
    }

    pub async fn delete_task(&self, user_id: &str, id: &str) -> Result<()> {
        let (user, task_id) = (user_id.to_string(), id.to_string());
        let deleted = self
            .db
            .writer()
            .call(move |conn| repository::delete_task(conn, &user, &task_id))
            .await?;
        if !deleted {
            return Err(Error::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    /// Delete a set of tasks; returns how many existed and were removed.
    pub async fn delete_tasks(&self, user_id: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Err(Error::Validation("no task ids given".into()));
        }
        let user = user_id.to_string();
        let ids = ids.to_vec();
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::delete_tasks_by_ids(conn, &user, &ids))
            .await?)
    }

    // ── Goals ────────────────────────────────────────────────────

    pub async fn create_goal(&self, user_id: &str, goal: NewGoal) -> Result<Goal> {
        goal.validate()?;
        let user = user_id.to_string();
        Ok(self
            .db
            .writer()
            .call(move |conn| repository::insert_goal(conn, &user, &goal))
            .await?)
    }

    /// All goals of a user, most recently started first.
    pub async fn goals(&self, user_id: &str) -> Result<Vec<Goal>> {
        let user = user_id.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::list_goals(conn, &user))
            .await?)
    }

    async fn find_goal(&self, user_id: &str, id: &str) -> Result<Goal> {
        let (user, goal_id) = (user_id.to_string(), id.to_string());
        self.db
            .reader()
            .call(move |conn| repository::get_goal(conn, &user, &goal_id))
            .await?
            .ok_or_else(|| Error::NotFound(format!("goal {id}")))
    }

    /// A goal together with its progress.
    pub async fn goal(&self, user_id: &str, id: &str) -> Result<GoalWithProgress> {
        let goal = self.find_goal(user_id, id).await?;
        let progress = self.goal_progress(&goal).await?;
        Ok(GoalWithProgress { goal, progress })
    }

    pub async fn goals_with_progress(&self, user_id: &str) -> Result<Vec<GoalWithProgress>> {
        let mut out = Vec::new();
        for goal in self.goals(user_id).await? {
            let progress = self.goal_progress(&goal).await?;
            out.push(GoalWithProgress { goal, progress });
        }
        Ok(out)
    }

    /// Progress of `goal` for its owner, recomputed from tasks on every call.
    pub async fn goal_progress(&self, goal: &Goal) -> Result<GoalProgress> {
        let (tz, rate) = self.settings(&goal.user_id).await?;
        goals::compute_goal_progress(
            &self.db,
            goal,
            tz,
            rate,
            self.config.store_failure_policy,
        )
        .await
    }

    pub async fn update_goal(&self, user_id: &str, id: &str, goal: NewGoal) -> Result<Goal> {
        goal.validate()?;
        let (user, goal_id) = (user_id.to_string(), id.to_string());
        let updated = self
            .db
            .writer()
            .call({
                let goal = goal.clone();
                move |conn| repository::update_goal(conn, &user, &goal_id, &goal)
            })
            .await?;
        if !updated {
            return Err(Error::NotFound(format!("goal {id}")));
        }
        Ok(Goal {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: goal.title,
            target_amount: goal.target_amount,
            start_date: goal.start_date,
            end_date: goal.end_date,
        })
    }

    pub async fn delete_goal(&self, user_id: &str, id: &str) -> Result<()> {
        let (user, goal_id) = (user_id.to_string(), id.to_string());
        let deleted = self
            .db
            .writer()
            .call(move |conn| repository::delete_goal(conn, &user, &goal_id))
            .await?;
        if !deleted {
            return Err(Error::NotFound(format!("goal {id}")));
        }
        Ok(())
    }

    // ── Metrics ──────────────────────────────────────────────────

    pub async fn metrics(&self, user_id: &str, period: Period) -> Result<PeriodAggregate> {
        let (tz, _) = self.settings(user_id).await?;
        metrics::get_metrics(
            &self.db,
            user_id,
            period,
            self.now(),
            tz,
            self.config.store_failure_policy,
        )
        .await
    }

    pub async fn detailed_metrics(&self, user_id: &str, period: Period) -> Result<DetailedMetrics> {
        let (tz, _) = self.settings(user_id).await?;
        let now = self.now();

        let goals = match self.goals(user_id).await {
            Ok(goals) => goals,
            Err(e) if self.config.store_failure_policy == StoreFailurePolicy::Degrade => {
                log::error!("Could not load goals for {user_id}, using no goal target: {e}");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let active = goals::active_goal(&goals, local_date(now, tz));

        metrics::get_detailed_metrics(
            &self.db,
            user_id,
            period,
            now,
            tz,
            active,
            self.config.store_failure_policy,
        )
        .await
    }

    pub async fn historical_series(
        &self,
        user_id: &str,
        period: Period,
        periods_back: u32,
    ) -> Result<Vec<HistoricalPoint>> {
        let (tz, _) = self.settings(user_id).await?;
        metrics::get_historical_series(
            &self.db,
            user_id,
            period,
            periods_back,
            self.now(),
            tz,
            self.config.store_failure_policy,
        )
        .await
    }

    // ── CSV ──────────────────────────────────────────────────────

    pub async fn import_csv(&self, user_id: &str, data: &str) -> Result<ImportReport> {
        let (tz, _) = self.settings(user_id).await?;
        ingest::import_csv(&self.db, user_id, data, tz).await
    }

    pub async fn delete_from_csv(&self, user_id: &str, data: &str) -> Result<DeleteReport> {
        ingest::delete_from_csv(&self.db, user_id, data).await
    }

    // ── Status ───────────────────────────────────────────────────

    pub async fn stats(&self) -> Result<StoreStats> {
        Ok(self.db.reader().call(|conn| repository::store_stats(conn)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::from_db_timestamp;

    async fn engine(now: &str) -> EarnLog {
        let db = Database::open_memory().await.unwrap();
        EarnLog::open(db)
            .await
            .unwrap()
            .with_clock(Arc::new(FixedClock(from_db_timestamp(now).unwrap())))
    }

    async fn ny_user(el: &EarnLog) {
        let mut p = UserProfile::new("u1");
        p.timezone = "America/New_York".into();
        p.hourly_rate = 20.0;
        el.set_profile(p).await.unwrap();
    }

    fn new_task(date: &str, amount: f64) -> NewTask {
        NewTask {
            date: from_db_timestamp(date).unwrap(),
            normal_hours: 1.0,
            exceed_hours: 0.0,
            amount,
            description: Some("manual".into()),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_profile_validation() {
        let el = engine("2024-03-09T17:00:00Z").await;
        let mut p = UserProfile::new("u1");
        p.timezone = "Mars/Olympus".into();
        let err = el.set_profile(p).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(el.profile("u1").await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let el = engine("2024-03-09T17:00:00Z").await;
        let task = el
            .add_task("u1", new_task("2024-03-09T15:00:00Z", 12.0))
            .await
            .unwrap();
        assert_eq!(task.total_hours, 1.0);

        let edited = el
            .update_task(
                "u1",
                &task.id,
                TaskUpdate {
                    exceed_hours: Some(0.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.total_hours, 1.5);
        assert_eq!(el.task("u1", &task.id).await.unwrap(), edited);

        let err = el.task("u2", &task.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        el.delete_task("u1", &task.id).await.unwrap();
        assert_eq!(
            el.delete_task("u1", &task.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let bad = NewTask {
            amount: -1.0,
            ..new_task("2024-03-09T15:00:00Z", 0.0)
        };
        assert_eq!(
            el.add_task("u1", bad).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn test_list_tasks_by_local_dates() {
        let el = engine("2024-03-10T17:00:00Z").await;
        ny_user(&el).await;
        // 2024-03-09 23:30 local
        el.add_task("u1", new_task("2024-03-10T04:30:00Z", 10.0))
            .await
            .unwrap();
        // 2024-03-10 01:00 local
        el.add_task("u1", new_task("2024-03-10T06:00:00Z", 20.0))
            .await
            .unwrap();

        let ninth = el
            .list_tasks("u1", Some(date(2024, 3, 9)), Some(date(2024, 3, 9)))
            .await
            .unwrap();
        assert_eq!(ninth.len(), 1);
        assert_eq!(ninth[0].amount, 10.0);

        assert_eq!(el.list_tasks("u1", None, None).await.unwrap().len(), 2);

        let today = el.list_tasks_for_period("u1", Period::Daily).await.unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].amount, 20.0);

        let err = el
            .list_tasks("u1", Some(date(2024, 3, 9)), Some(date(2024, 3, 1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_list_tasks_with_one_open_bound() {
        let el = engine("2024-03-10T17:00:00Z").await;
        ny_user(&el).await;
        // 2024-03-09 23:30 local
        el.add_task("u1", new_task("2024-03-10T04:30:00Z", 10.0))
            .await
            .unwrap();
        // 2024-03-10 01:00 local
        el.add_task("u1", new_task("2024-03-10T06:00:00Z", 20.0))
            .await
            .unwrap();

        let from_tenth = el
            .list_tasks("u1", Some(date(2024, 3, 10)), None)
            .await
            .unwrap();
        assert_eq!(from_tenth.len(), 1);
        assert_eq!(from_tenth[0].amount, 20.0);

        let through_ninth = el
            .list_tasks("u1", None, Some(date(2024, 3, 9)))
            .await
            .unwrap();
        assert_eq!(through_ninth.len(), 1);
        assert_eq!(through_ninth[0].amount, 10.0);

        let query = el
            .task_query("u1", Some(date(2024, 3, 1)), None)
            .await
            .unwrap();
        assert_eq!(query.limit(1).count(el.db()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_metrics_scenario_in_new_york() {
        let el = engine("2024-03-09T17:00:00Z").await;
        ny_user(&el).await;
        el.add_task("u1", new_task("2024-03-10T04:30:00Z", 10.0))
            .await
            .unwrap();

        let daily = el.metrics("u1", Period::Daily).await.unwrap();
        assert_eq!(daily.total_tasks, 1);
        assert_eq!(daily.total_amount, 10.0);
    }

    #[tokio::test]
    async fn test_missing_profile_falls_back_to_utc() {
        let el = engine("2024-03-10T17:00:00Z").await;
        el.add_task("u1", new_task("2024-03-10T04:30:00Z", 10.0))
            .await
            .unwrap();
        // In UTC the task is on the 10th
        let daily = el.metrics("u1", Period::Daily).await.unwrap();
        assert_eq!(daily.total_tasks, 1);
    }

    #[tokio::test]
    async fn test_detailed_metrics_picks_active_goal() {
        let el = engine("2024-04-10T12:00:00Z").await;
        el.add_task("u1", new_task("2024-04-08T10:00:00Z", 150.0))
            .await
            .unwrap();
        el.create_goal(
            "u1",
            NewGoal {
                title: "Old".into(),
                target_amount: 10.0,
                start_date: date(2024, 3, 1),
                end_date: date(2024, 4, 30),
            },
        )
        .await
        .unwrap();
        el.create_goal(
            "u1",
            NewGoal {
                title: "April".into(),
                target_amount: 3000.0,
                start_date: date(2024, 4, 1),
                end_date: date(2024, 4, 30),
            },
        )
        .await
        .unwrap();

        let m = el.detailed_metrics("u1", Period::Weekly).await.unwrap();
        assert_eq!(m.goal_target, Some(700.0));
        assert_eq!(m.trend.target, 100.0);
        assert_eq!(m.trend.productivity, 21.0);
    }

    #[tokio::test]
    async fn test_goal_lifecycle_and_progress() {
        let el = engine("2024-04-10T12:00:00Z").await;
        ny_user(&el).await;
        let goal = el
            .create_goal(
                "u1",
                NewGoal {
                    title: "April".into(),
                    target_amount: 600.0,
                    start_date: date(2024, 4, 1),
                    end_date: date(2024, 4, 30),
                },
            )
            .await
            .unwrap();

        let empty = el.goal("u1", &goal.id).await.unwrap();
        assert_eq!(empty.progress.achieved, 0.0);
        assert_eq!(empty.progress.daily_target, 20.0);
        assert_eq!(empty.progress.hours_per_day, 1.0);

        el.add_task("u1", new_task("2024-04-05T15:00:00Z", 150.0))
            .await
            .unwrap();
        let with_task = el.goal("u1", &goal.id).await.unwrap();
        assert_eq!(with_task.progress.achieved, 150.0);
        assert_eq!(with_task.progress.percent, 25.0);
        assert_eq!(with_task.progress, el.goal_progress(&goal).await.unwrap());

        let mut edit = NewGoal {
            title: "April".into(),
            target_amount: 300.0,
            start_date: date(2024, 4, 1),
            end_date: date(2024, 4, 30),
        };
        let updated = el.update_goal("u1", &goal.id, edit.clone()).await.unwrap();
        assert_eq!(updated.target_amount, 300.0);
        assert_eq!(el.goals_with_progress("u1").await.unwrap()[0].progress.percent, 50.0);

        edit.target_amount = 0.0;
        assert_eq!(
            el.update_goal("u1", &goal.id, edit).await.unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            el.goal("u2", &goal.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        el.delete_goal("u1", &goal.id).await.unwrap();
        assert!(el.goals("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_task_from_text_uses_clock() {
        let el = engine("2024-05-01T10:00:00Z").await;
        let task = el
            .add_task_from_text("u1", "Tasking time: 2 hours at $20 / hour")
            .await
            .unwrap();
        assert_eq!(task.date, from_db_timestamp("2024-05-01T10:00:00Z").unwrap());
        assert_eq!(task.amount, 40.0);
        assert_eq!(task.normal_hours, 2.0);
    }

    #[tokio::test]
    async fn test_csv_round_trip_and_bulk_delete() {
        let el = engine("2024-01-01T12:00:00Z").await;
        let csv = "workDate,itemID,duration,payout,payType,projectName,status\n\
                   2024-01-01,X1,1h,$10.00,prepay,Alpha,ok\n\
                   2024-01-01,X1,30m,$5.00,overtime,Alpha,ok\n\
                   2024-01-01,R1,-,$3.00,missionReward,Alpha,paid\n";
        let report = el.import_csv("u1", csv).await.unwrap();
        assert_eq!(report.inserted_count, 2);

        let today = el.metrics("u1", Period::Daily).await.unwrap();
        assert_eq!(today.total_amount, 18.0);
        assert_eq!(today.total_hours, 1.5);

        let deleted = el.delete_from_csv("u1", "itemID\nR1\n").await.unwrap();
        assert_eq!(deleted.deleted_count, 1);

        let remaining: Vec<String> = el
            .list_tasks("u1", None, None)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(el.delete_tasks("u1", &remaining).await.unwrap(), 1);
        assert_eq!(el.stats().await.unwrap().tasks, 0);
    }
}
