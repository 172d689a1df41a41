use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod error;
mod ledger;
#[cfg(test)]
mod memory;
mod models;
mod promotion;
mod ranking;
mod rules;
mod store;

use models::DateRange;
use store::{EventStore, PgStore};

#[derive(Parser)]
#[command(name = "points-ledger")]
#[command(about = "Student points ledger, ranking, and grade promotion for a hifz school roster", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Sum a student's points over a date range
    Summarize {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Leave bonus adjustments out of the total
        #[arg(long)]
        no_bonus: bool,
    },
    /// Leaderboards: top students by points and by absences
    Rank {
        /// Restrict the population to one teacher's students
        #[arg(long)]
        teacher: Option<Uuid>,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Move every eligible student up one grade
    Promote {
        #[arg(long, default_value = "cli")]
        by: String,
    },
    /// Reverse the most recent promotion batch
    Revert {
        #[arg(long, default_value = "cli")]
        by: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            store::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            store::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Summarize {
            student,
            from,
            to,
            no_bonus,
        } => {
            let store = PgStore::new(pool);
            let range = DateRange::new(from, to)?;
            let summary = ledger::summarize(&store, student, range, !no_bonus).await?;
            println!("Points for {student} ({from} to {to}):");
            println!("- attendance: {}", summary.attendance_points);
            println!("- recitation: {}", summary.recitation_points);
            println!("- tools:      {}", summary.tool_points);
            if no_bonus {
                println!("- bonus:      {} (excluded)", summary.bonus_points);
            } else {
                println!("- bonus:      {}", summary.bonus_points);
            }
            println!("total: {}", summary.total);
        }
        Commands::Rank {
            teacher,
            from,
            to,
            top,
        } => {
            let store = PgStore::new(pool);
            let range = DateRange::new(from, to)?;
            let population = store.list_students(teacher).await?;
            let boards = ranking::rank(&store, &population, range, top).await?;

            if boards.top_by_points.is_empty() {
                println!("No students in this population.");
                return Ok(());
            }

            println!("Top students by points:");
            for entry in &boards.top_by_points {
                println!("- {} ({}): {}", entry.student.full_name, entry.student.id, entry.total);
            }

            println!();
            println!("Top students by absences:");
            if boards.top_by_absences.is_empty() {
                println!("No absences in this window.");
            } else {
                for entry in &boards.top_by_absences {
                    println!(
                        "- {} ({}): {} absent",
                        entry.student.full_name, entry.student.id, entry.absent_count
                    );
                }
            }
        }
        Commands::Promote { by } => {
            let store = PgStore::new(pool);
            let outcome = promotion::promote(&store, &by).await?;
            print_batch_outcome("Promoted", &outcome);
        }
        Commands::Revert { by } => {
            let store = PgStore::new(pool);
            let outcome = promotion::revert(&store, &by).await?;
            print_batch_outcome("Downgraded", &outcome);
        }
    }

    Ok(())
}

fn print_batch_outcome(verb: &str, outcome: &promotion::PromotionOutcome) {
    println!(
        "{} {} of {} eligible students (audit {}).",
        verb, outcome.success_count, outcome.total_eligible, outcome.audit_id
    );
    for skipped in &outcome.skipped {
        println!(
            "- skipped {} ({}): {}",
            skipped.student.full_name, skipped.student.id, skipped.reason
        );
    }
    for error in &outcome.errors {
        println!(
            "- FAILED {} ({}): {}",
            error.student_name, error.student_id, error.message
        );
    }
}
