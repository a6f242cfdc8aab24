use clap::{Parser, Subcommand};

use earnlog::date_util::{parse_date, parse_instant};
use earnlog::ingest::parse::format_payout;
use earnlog::{
    EarnLog, Goal, GoalWithProgress, NewGoal, NewTask, Period, Task, TaskUpdate, UserProfile,
};

#[derive(Parser)]
#[command(name = "earnlog", about = "Track billable work and earnings goals")]
struct Cli {
    /// Database path (default: ~/.earnlog/earnlog.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// User id to act as (default: the `default_user` config value)
    #[arg(long, short)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the user profile (timezone, hourly rate)
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Record and inspect tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Period metrics, trends and history
    Metrics {
        #[command(subcommand)]
        target: MetricsTarget,
    },
    /// Manage earnings goals
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },
    /// Import or purge tasks from an exported payment CSV
    Csv {
        #[command(subcommand)]
        action: CsvAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show store status
    Status,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create or update the profile
    Set {
        #[arg(long)]
        username: Option<String>,
        /// IANA timezone, e.g. America/New_York
        #[arg(long)]
        timezone: Option<String>,
        #[arg(long)]
        rate: Option<f64>,
    },
    /// Show the profile
    Show {
        #[arg(long)]
        json: bool,
    },
    /// List all profiles
    List,
}

#[derive(Subcommand)]
enum TaskAction {
    /// Add a task manually
    Add {
        /// Date (YYYY-MM-DD, local) or RFC3339 instant; default now
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "0")]
        hours: f64,
        #[arg(long, default_value = "0")]
        exceed: f64,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        description: Option<String>,
    },
    /// Add a task from a pasted earnings notice
    Parse {
        /// Notice text; read from stdin when omitted
        text: Option<String>,
    },
    /// List tasks
    List {
        /// First local date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last local date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Only the current daily, weekly or monthly period
        #[arg(long, conflicts_with_all = ["from", "to"])]
        period: Option<String>,
        /// Only tasks whose description contains this text (case-insensitive)
        #[arg(long)]
        search: Option<String>,
        /// Maximum results
        #[arg(long)]
        limit: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Output as CSV
        #[arg(long)]
        csv: bool,
        /// Count only (no output rows)
        #[arg(long)]
        count: bool,
    },
    /// Show one task
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Edit a task; omitted fields are unchanged
    Edit {
        id: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        hours: Option<f64>,
        #[arg(long)]
        exceed: Option<f64>,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete one or more tasks
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum MetricsTarget {
    /// Totals for the current period
    Show {
        /// daily, weekly or monthly
        #[arg(default_value = "daily")]
        period: String,
        #[arg(long)]
        json: bool,
    },
    /// Totals plus productivity, trend and averages
    Detailed {
        #[arg(default_value = "daily")]
        period: String,
        #[arg(long)]
        json: bool,
    },
    /// Per-period totals for charting, oldest first
    History {
        #[arg(default_value = "daily")]
        period: String,
        /// Number of periods, including the current one
        #[arg(long, default_value = "7")]
        periods: u32,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GoalAction {
    /// Create a goal
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        target: f64,
        /// First local date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// Last local date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
    },
    /// List goals with progress
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one goal with progress
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Edit a goal; omitted fields are unchanged
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        target: Option<f64>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Delete a goal
    Delete { id: String },
}

#[derive(Subcommand)]
enum CsvAction {
    /// Import tasks from a CSV file
    Import {
        file: std::path::PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Delete tasks whose description mentions an itemID in the CSV
    Delete { file: std::path::PathBuf },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<earnlog::Error>() {
            Some(err) => eprintln!("error [{}]: {err}", err.kind()),
            None => eprintln!("error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let db = match &cli.db {
        Some(path) => earnlog::Database::open_at(path).await?,
        None => earnlog::Database::open().await?,
    };

    // Config commands must work even when a stored value is invalid.
    let command = match cli.command {
        Commands::Config { action } => return handle_config(&db, action).await,
        other => other,
    };

    let el = EarnLog::open(db).await?;
    if let Commands::Status = command {
        return print_status(&el).await;
    }

    let user = resolve_user(&el, cli.user.as_deref())?;
    match command {
        Commands::User { action } => handle_user(&el, &user, action).await,
        Commands::Task { action } => handle_task(&el, &user, action).await,
        Commands::Metrics { target } => handle_metrics(&el, &user, target).await,
        Commands::Goal { action } => handle_goal(&el, &user, action).await,
        Commands::Csv { action } => handle_csv(&el, &user, action).await,
        Commands::Config { .. } | Commands::Status => Ok(()),
    }
}

fn resolve_user(el: &EarnLog, flag: Option<&str>) -> anyhow::Result<String> {
    flag.map(String::from)
        .or_else(|| el.config().default_user.clone())
        .ok_or_else(|| {
            earnlog::Error::Configuration(
                "no user given. Pass --user or run: earnlog config set default_user <ID>".into(),
            )
            .into()
        })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn handle_user(el: &EarnLog, user: &str, action: UserAction) -> anyhow::Result<()> {
    match action {
        UserAction::Set {
            username,
            timezone,
            rate,
        } => {
            let mut profile = match el.profile(user).await {
                Ok(p) => p,
                Err(earnlog::Error::NotFound(_)) => UserProfile::new(user),
                Err(e) => return Err(e.into()),
            };
            if username.is_some() {
                profile.username = username;
            }
            if let Some(tz) = timezone {
                profile.timezone = tz;
            }
            if let Some(rate) = rate {
                profile.hourly_rate = rate;
            }
            let saved = el.set_profile(profile).await?;
            println!(
                "Profile saved: {} ({}, {}/h)",
                saved.user_id,
                saved.timezone,
                format_payout(saved.hourly_rate)
            );
        }
        UserAction::Show { json } => {
            let profile = el.profile(user).await?;
            if json {
                print_json(&profile)?;
            } else {
                println!("User:      {}", profile.user_id);
                println!("Name:      {}", profile.username.as_deref().unwrap_or("-"));
                println!("Timezone:  {}", profile.timezone);
                println!("Rate:      {}/h", format_payout(profile.hourly_rate));
            }
        }
        UserAction::List => {
            let profiles = el.list_profiles().await?;
            if profiles.is_empty() {
                println!("No profiles.");
            }
            for p in profiles {
                println!("{} {} ({})", p.user_id, p.username.as_deref().unwrap_or(""), p.timezone);
            }
        }
    }
    Ok(())
}

async fn handle_task(el: &EarnLog, user: &str, action: TaskAction) -> anyhow::Result<()> {
    match action {
        TaskAction::Add {
            date,
            hours,
            exceed,
            amount,
            description,
        } => {
            let date = match date {
                Some(d) => parse_instant(&d, el.timezone(user).await?)?,
                None => el.now(),
            };
            let task = el
                .add_task(
                    user,
                    NewTask {
                        date,
                        normal_hours: hours,
                        exceed_hours: exceed,
                        amount,
                        description,
                    },
                )
                .await?;
            println!("Added task {}", task.id);
        }
        TaskAction::Parse { text } => {
            let text = match text {
                Some(t) => t,
                None => std::io::read_to_string(std::io::stdin())?,
            };
            let task = el.add_task_from_text(user, &text).await?;
            println!(
                "Added task {}: {:.3}h + {:.3}h exceeded, {}",
                task.id,
                task.normal_hours,
                task.exceed_hours,
                format_payout(task.amount)
            );
        }
        TaskAction::List {
            from,
            to,
            period,
            search,
            limit,
            json,
            csv,
            count,
        } => {
            let mut query = match period {
                Some(p) => el.period_task_query(user, Period::parse(&p)?).await?,
                None => {
                    let from = from.as_deref().map(parse_date).transpose()?;
                    let to = to.as_deref().map(parse_date).transpose()?;
                    el.task_query(user, from, to).await?
                }
            };
            if let Some(text) = search.as_deref() {
                query = query.description_contains(text);
            }
            if let Some(n) = limit {
                query = query.limit(n);
            }

            if count {
                println!("{}", query.count(el.db()).await?);
            } else if json {
                println!("{}", query.to_json(el.db()).await?);
            } else if csv {
                print!("{}", query.to_csv(el.db()).await?);
            } else {
                let tasks = query.tasks(el.db()).await?;
                if tasks.is_empty() {
                    println!("No tasks.");
                } else {
                    let tz = el.timezone(user).await?;
                    for task in &tasks {
                        print_task_line(task, tz);
                    }
                }
            }
        }
        TaskAction::Show { id, json } => {
            let task = el.task(user, &id).await?;
            if json {
                print_json(&task)?;
            } else {
                let tz = el.timezone(user).await?;
                println!("Task:        {}", task.id);
                println!("Date:        {}", task.date.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z"));
                println!("Hours:       {:.3} (+{:.3} exceeded)", task.normal_hours, task.exceed_hours);
                println!("Amount:      {}", format_payout(task.amount));
                println!("Description: {}", task.description.as_deref().unwrap_or("-"));
            }
        }
        TaskAction::Edit {
            id,
            date,
            hours,
            exceed,
            amount,
            description,
        } => {
            let date = match date {
                Some(d) => Some(parse_instant(&d, el.timezone(user).await?)?),
                None => None,
            };
            let update = TaskUpdate {
                date,
                normal_hours: hours,
                exceed_hours: exceed,
                amount,
                description,
            };
            let task = el.update_task(user, &id, update).await?;
            println!("Updated task {}", task.id);
        }
        TaskAction::Delete { ids } => {
            if let [id] = ids.as_slice() {
                el.delete_task(user, id).await?;
                println!("Deleted task {id}");
            } else {
                let n = el.delete_tasks(user, &ids).await?;
                println!("Deleted {n} of {} task(s)", ids.len());
            }
        }
    }
    Ok(())
}

fn print_task_line(task: &Task, tz: chrono_tz::Tz) {
    println!(
        "{} {} {:>7.3}h {:>10} {}",
        task.id,
        task.date.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        task.total_hours,
        format_payout(task.amount),
        task.description.as_deref().unwrap_or("")
    );
}

async fn handle_metrics(el: &EarnLog, user: &str, target: MetricsTarget) -> anyhow::Result<()> {
    match target {
        MetricsTarget::Show { period, json } => {
            let period = Period::parse(&period)?;
            let m = el.metrics(user, period).await?;
            if json {
                print_json(&m)?;
            } else {
                println!("Metrics: {user} ({period})");
                println!("  Tasks:       {}", m.total_tasks);
                println!("  Hours:       {:.3}", m.total_hours);
                println!("  Earnings:    {}", format_payout(m.total_amount));
                println!("  Active days: {}", m.unique_days);
            }
        }
        MetricsTarget::Detailed { period, json } => {
            let period = Period::parse(&period)?;
            let m = el.detailed_metrics(user, period).await?;
            if json {
                print_json(&m)?;
            } else {
                println!("Metrics: {user} ({period}, {} days)", m.days_in_period);
                println!("  Tasks:         {}", m.current.total_tasks);
                println!("  Hours:         {:.3}", m.current.total_hours);
                println!("  Earnings:      {}", format_payout(m.current.total_amount));
                println!("  Per day:       {}", format_payout(m.current_earnings_per_day));
                println!("  Target/day:    {}", format_payout(m.trend.target));
                if let Some(goal) = m.goal_target {
                    println!("  Goal/period:   {}", format_payout(goal));
                }
                println!("  Productivity:  {}%", m.trend.productivity);
                println!(
                    "  Trend:         {:+}% vs {}",
                    m.trend.trend,
                    format_payout(m.previous_period)
                );
                if m.trend.shortfall > 0.0 {
                    println!("  Shortfall:     {}", format_payout(m.trend.shortfall));
                }
                println!("  History ({} active days):", m.days_considered);
                println!("    Tasks/day:    {:.2}", m.avg_tasks_per_day);
                println!("    Hours/day:    {:.2}", m.avg_hours_per_day);
                println!("    Earnings/day: {}", format_payout(m.avg_earnings_per_day));
            }
        }
        MetricsTarget::History {
            period,
            periods,
            json,
        } => {
            let period = Period::parse(&period)?;
            let points = el.historical_series(user, period, periods).await?;
            if json {
                print_json(&points)?;
            } else {
                for p in &points {
                    println!(
                        "{:<10} {:>4} tasks {:>9.3}h {:>12}",
                        p.label,
                        p.aggregate.total_tasks,
                        p.aggregate.total_hours,
                        format_payout(p.aggregate.total_amount)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn handle_goal(el: &EarnLog, user: &str, action: GoalAction) -> anyhow::Result<()> {
    match action {
        GoalAction::Add {
            title,
            target,
            start,
            end,
        } => {
            let goal = el
                .create_goal(
                    user,
                    NewGoal {
                        title,
                        target_amount: target,
                        start_date: parse_date(&start)?,
                        end_date: parse_date(&end)?,
                    },
                )
                .await?;
            println!("Created goal {}", goal.id);
        }
        GoalAction::List { json } => {
            let goals = el.goals_with_progress(user).await?;
            if json {
                print_json(&goals)?;
            } else if goals.is_empty() {
                println!("No goals.");
            } else {
                for g in &goals {
                    print_goal(g);
                }
            }
        }
        GoalAction::Show { id, json } => {
            let g = el.goal(user, &id).await?;
            if json {
                print_json(&g)?;
            } else {
                print_goal(&g);
                println!("  Days:         {}", g.progress.days);
                println!("  Daily target: {}", format_payout(g.progress.daily_target));
                println!("  Hours/day:    {:.2}", g.progress.hours_per_day);
            }
        }
        GoalAction::Edit {
            id,
            title,
            target,
            start,
            end,
        } => {
            let current: Goal = el.goal(user, &id).await?.goal;
            let edit = NewGoal {
                title: title.unwrap_or(current.title),
                target_amount: target.unwrap_or(current.target_amount),
                start_date: match start {
                    Some(s) => parse_date(&s)?,
                    None => current.start_date,
                },
                end_date: match end {
                    Some(s) => parse_date(&s)?,
                    None => current.end_date,
                },
            };
            let goal = el.update_goal(user, &id, edit).await?;
            println!("Updated goal {}", goal.id);
        }
        GoalAction::Delete { id } => {
            el.delete_goal(user, &id).await?;
            println!("Deleted goal {id}");
        }
    }
    Ok(())
}

fn print_goal(g: &GoalWithProgress) {
    println!(
        "{} {} [{} .. {}] {} of {} ({:.2}%, {} left)",
        g.goal.id,
        g.goal.title,
        g.goal.start_date,
        g.goal.end_date,
        format_payout(g.progress.achieved),
        format_payout(g.goal.target_amount),
        g.progress.percent,
        format_payout(g.progress.remaining)
    );
}

async fn handle_csv(el: &EarnLog, user: &str, action: CsvAction) -> anyhow::Result<()> {
    match action {
        CsvAction::Import { file, json } => {
            let data = std::fs::read_to_string(&file)?;
            let report = el.import_csv(user, &data).await?;
            if json {
                print_json(&report)?;
            } else {
                println!("Imported {} task(s)", report.inserted_count);
                for skipped in &report.skipped_rows {
                    println!("  skipped line {}: {}", skipped.line, skipped.message);
                }
            }
        }
        CsvAction::Delete { file } => {
            let data = std::fs::read_to_string(&file)?;
            let report = el.delete_from_csv(user, &data).await?;
            println!("Deleted {} task(s)", report.deleted_count);
        }
    }
    Ok(())
}

async fn print_status(el: &EarnLog) -> anyhow::Result<()> {
    let stats = el.stats().await?;
    println!("Store Status");
    println!("  Profiles:  {}", stats.profiles);
    println!("  Tasks:     {}", stats.tasks);
    println!("  Goals:     {}", stats.goals);
    println!(
        "  Span:      {} .. {}",
        stats.earliest_task.as_deref().unwrap_or("-"),
        stats.latest_task.as_deref().unwrap_or("-")
    );
    println!(
        "  Default user: {}",
        el.config().default_user.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  Store failure policy: {}",
        el.config().store_failure_policy.as_str()
    );
    Ok(())
}

async fn handle_config(db: &earnlog::Database, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let val: Option<String> = db
                .reader()
                .call({
                    let key = key.clone();
                    move |conn| earnlog::storage::repository::get_config(conn, &key)
                })
                .await?;
            match val {
                Some(v) => println!("{key} = {v}"),
                None => println!("{key} is not set"),
            }
        }
        ConfigAction::Set { key, value } => {
            earnlog::config::validate_entry(&key, &value)?;
            db.writer()
                .call(move |conn| {
                    earnlog::storage::repository::set_config(conn, &key, &value)?;
                    Ok::<(), rusqlite::Error>(())
                })
                .await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items: Vec<(String, String)> = db
                .reader()
                .call(|conn| earnlog::storage::repository::list_config(conn))
                .await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}
