use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use engagement_early_warning::clock::{Clock, SystemClock};
use engagement_early_warning::config::{
    EngineConfig, RawSettings, DEFAULT_CACHE_TTL_SECS, DEFAULT_LOOKBACK_DAYS,
};
use engagement_early_warning::db;
use engagement_early_warning::error::EngineError;
use engagement_early_warning::evaluation::Evaluator;
use engagement_early_warning::follow::{FollowListManager, FollowPartition};
use engagement_early_warning::models::{RiskRow, RosterFilter};
use engagement_early_warning::report;
use engagement_early_warning::risk::MissingHomeworkService;

#[derive(Parser)]
#[command(name = "engagement-early-warning")]
#[command(
    about = "Missing-homework alerts and progress responsibility evaluation",
    long_about = None
)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    /// Deployment time zone as minutes east of UTC
    #[arg(
        long,
        env = "ENGAGEMENT_UTC_OFFSET_MINUTES",
        default_value_t = 0,
        allow_negative_numbers = true,
        global = true
    )]
    utc_offset_minutes: i32,
    #[arg(long, env = "ENGAGEMENT_MAX_ATTEMPTS", default_value_t = 3, global = true)]
    max_attempts: u32,
    #[arg(long, default_value_t = 200, global = true)]
    backoff_base_ms: u64,
    #[arg(long, default_value_t = 2000, global = true)]
    max_backoff_ms: u64,
    #[arg(long, default_value_t = 8, global = true)]
    fetch_concurrency: usize,
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL_SECS, global = true)]
    cache_ttl_secs: i64,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import homework submissions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List students with no valid submission in the lookback window
    MissingHomework {
        #[arg(long)]
        teacher: Option<String>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
        lookback_days: i64,
        /// Split output by this staff member's follow list
        #[arg(long)]
        user: Option<String>,
        /// Maximum rows printed across the followed and muted sections
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Seed a staff member's follow list with everyone currently at risk
    InitFollow {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
        lookback_days: i64,
    },
    Follow {
        #[arg(long)]
        user: String,
        #[arg(long)]
        student: String,
    },
    Unfollow {
        #[arg(long)]
        user: String,
        #[arg(long)]
        student: String,
    },
    /// Record a progress evaluation for a student in a support class
    Evaluate {
        #[arg(long)]
        student: String,
        #[arg(long)]
        support_class: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Replace the notes on an evaluation; omit --text to clear them
    Notes {
        #[arg(long)]
        evaluation: Uuid,
        #[arg(long)]
        text: Option<String>,
    },
    /// Show evaluation history for a student
    History {
        #[arg(long)]
        student: String,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown missing-homework report
    Report {
        #[arg(long)]
        teacher: Option<String>,
        #[arg(long)]
        class: Option<String>,
        #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
        lookback_days: i64,
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

struct Engine {
    missing_homework: MissingHomeworkService,
    follows: FollowListManager,
    evaluator: Evaluator,
}

impl Engine {
    fn new(store: Arc<db::PgStore>, config: &EngineConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            missing_homework: MissingHomeworkService::new(
                store.clone(),
                store.clone(),
                Arc::clone(&clock),
                config,
            ),
            follows: FollowListManager::new(store.clone(), config.retry),
            evaluator: Evaluator::new(store.clone(), store.clone(), store, clock, config),
        }
    }

    async fn partitioned(
        &self,
        filter: &RosterFilter,
        lookback_days: i64,
        user: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FollowPartition, EngineError> {
        self.follows
            .partitioned_risk(&self.missing_homework, filter, lookback_days, user, cancel)
            .await
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("engagement_early_warning=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("engagement_early_warning=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_rows(rows: &[RiskRow]) {
    for row in rows {
        println!(
            "- {} ({}, {}) {}",
            row.student_name,
            row.student_email,
            row.class_name,
            report::describe_gap(row)
        );
    }
}

/// Maps engine failures to what the operator sees. Missing data is an empty
/// result, everything else fails the command.
fn finish(result: Result<(), EngineError>) -> anyhow::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(EngineError::NotFound(what)) => {
            debug!("Nothing found: {}", what);
            println!("No data for this selection.");
            Ok(())
        }
        Err(err @ EngineError::SourceUnavailable(_)) => {
            Err(err).context("store unavailable after retries; try again shortly")
        }
        Err(err) => Err(err.into()),
    }
}

fn filter_from(teacher: Option<String>, class: Option<String>) -> RosterFilter {
    RosterFilter {
        teacher_id: teacher,
        class_id: class,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = EngineConfig::from_settings(RawSettings {
        utc_offset_minutes: cli.utc_offset_minutes,
        max_attempts: cli.max_attempts,
        backoff_base_ms: cli.backoff_base_ms,
        max_backoff_ms: cli.max_backoff_ms,
        fetch_concurrency: cli.fetch_concurrency,
        cache_ttl_secs: cli.cache_ttl_secs,
    })?;

    let database_url = cli
        .database_url
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = Arc::new(db::PgStore::new(pool.clone()));
    let engine = Engine::new(store, &config);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool, engine.missing_homework.today()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} submissions from {}.", csv.display());
        }
        Commands::MissingHomework {
            teacher,
            class,
            lookback_days,
            user,
            limit,
            json,
        } => {
            let filter = filter_from(teacher, class);
            let result = engine
                .partitioned(&filter, lookback_days, user.as_deref(), &cancel)
                .await;
            finish(result.and_then(|mut partition| {
                let muted_total = partition.muted.len();
                if let Some(limit) = limit {
                    partition.truncate(limit);
                }
                if json {
                    let body = serde_json::to_string_pretty(&partition)
                        .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
                    println!("{body}");
                    return Ok(());
                }

                if partition.followed.is_empty() && partition.muted.is_empty() {
                    println!("Every student submitted within the last {lookback_days} days.");
                    return Ok(());
                }

                println!("Students missing homework, most overdue first:");
                print_rows(&partition.followed);
                if user.is_some() && muted_total > 0 {
                    println!("Muted ({muted_total}):");
                    print_rows(&partition.muted);
                }
                Ok(())
            }))?;
        }
        Commands::InitFollow {
            user,
            lookback_days,
        } => {
            let result = engine
                .follows
                .ensure_default_follow(&user, &engine.missing_homework, lookback_days, &cancel)
                .await
                .map(|state| {
                    println!(
                        "{} follows {} students.",
                        user,
                        state.following_student_ids.len()
                    );
                });
            finish(result)?;
        }
        Commands::Follow { user, student } => {
            let result = engine.follows.follow(&user, &student).await.map(|state| {
                println!(
                    "{} now follows {} students.",
                    user,
                    state.following_student_ids.len()
                );
            });
            finish(result)?;
        }
        Commands::Unfollow { user, student } => {
            let result = engine.follows.unfollow(&user, &student).await.map(|state| {
                println!(
                    "{} now follows {} students.",
                    user,
                    state.following_student_ids.len()
                );
            });
            finish(result)?;
        }
        Commands::Evaluate {
            student,
            support_class,
            notes,
            json,
        } => {
            let result = engine
                .evaluator
                .evaluate(&student, &support_class, notes)
                .await
                .and_then(|stored| {
                    if json {
                        let body = serde_json::to_string_pretty(&stored)
                            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
                        println!("{body}");
                    } else {
                        print!("{}", report::build_evaluation_report(&student, &[stored]));
                    }
                    Ok(())
                });
            finish(result)?;
        }
        Commands::Notes { evaluation, text } => {
            let result = engine
                .evaluator
                .update_notes(evaluation, text.as_deref())
                .await
                .map(|()| println!("Notes updated for {evaluation}."));
            finish(result)?;
        }
        Commands::History { student, json } => {
            let result = engine.evaluator.history(&student).await.and_then(|history| {
                if json {
                    let body = serde_json::to_string_pretty(&history)
                        .map_err(|e| EngineError::InvalidInput(e.to_string()))?;
                    println!("{body}");
                } else {
                    print!("{}", report::build_evaluation_report(&student, &history));
                }
                Ok(())
            });
            finish(result)?;
        }
        Commands::Report {
            teacher,
            class,
            lookback_days,
            user,
            out,
        } => {
            let scope = teacher.clone().or_else(|| class.clone());
            let filter = filter_from(teacher, class);
            let today = engine.missing_homework.today();
            let result = engine
                .partitioned(&filter, lookback_days, user.as_deref(), &cancel)
                .await
                .map(|partition| {
                    report::build_missing_homework_report(
                        scope.as_deref(),
                        lookback_days,
                        today,
                        &partition,
                    )
                });
            match result {
                Ok(report) => {
                    std::fs::write(&out, report)?;
                    println!("Report written to {}.", out.display());
                }
                Err(err) => finish(Err(err))?,
            }
        }
    }

    Ok(())
}
