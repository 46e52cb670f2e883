// Carbon Ledger - Command Line
// Every subcommand prints JSON on stdout, except `export` which prints CSV

use anyhow::{Context, Result};
use carbon_ledger::checkin::parse_month;
use carbon_ledger::{telemetry, Config, DateRange, FootprintInput, Services};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "carbon-ledger")]
#[command(about = "Personal carbon-reduction ledger: log green behaviors, check in, view statistics")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CARBON_LEDGER_CONFIG", default_value = "carbon-ledger.toml")]
    config: PathBuf,

    /// SQLite database (overrides config file)
    #[arg(long, env = "CARBON_LEDGER_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,

    /// List the selectable behavior types
    Catalog,

    /// Record a behavior
    Log {
        #[arg(long)]
        user: String,
        #[arg(long = "type")]
        behavior_type: String,
        #[arg(long)]
        value: Decimal,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        remark: Option<String>,
    },

    /// Replace the contents of an existing record
    Update {
        #[arg(long)]
        user: String,
        #[arg(long)]
        id: String,
        #[arg(long = "type")]
        behavior_type: String,
        #[arg(long)]
        value: Decimal,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        remark: Option<String>,
    },

    Delete {
        #[arg(long)]
        user: String,
        #[arg(long)]
        id: String,
    },

    /// One-tap check-in for a count-class behavior
    Checkin {
        #[arg(long)]
        user: String,
        #[arg(long = "type")]
        behavior_type: String,
        #[arg(long)]
        remark: Option<String>,
    },

    List {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long)]
        size: Option<i64>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Totals plus per-behavior and per-day breakdowns
    Stats {
        #[arg(long)]
        user: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    Calendar {
        #[arg(long)]
        user: String,
        /// YYYY-MM
        #[arg(long)]
        month: String,
    },

    /// Write records as CSV to stdout
    Export {
        #[arg(long)]
        user: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Recompute the aggregate from records and compare with the stored row
    Verify {
        #[arg(long)]
        user: String,
    },
}

fn main() -> Result<()> {
    telemetry::init_tracing();

    let cli = Cli::parse();
    debug!(config = ?cli.config, "loading configuration");

    let mut config = Config::load(Some(cli.config.as_path()))?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    let services = Services::from_config(config)?;
    run(&services, cli.command)
}

fn run(services: &Services, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            info!(database = ?services.config.database_path, "schema ready");
            print_json(&serde_json::json!({
                "database": services.config.database_path,
                "behaviors": services.catalog.len(),
            }))
        }

        Command::Catalog => {
            let listing: Vec<_> = services
                .catalog
                .list_all()
                .into_iter()
                .map(|(_, summary)| summary)
                .collect();
            print_json(&listing)
        }

        Command::Log { user, behavior_type, value, date, remark } => {
            let input = input_for(behavior_type, value, date, remark);
            let record = services.ledger.create(&user, &input)?;
            print_json(&record)
        }

        Command::Update { user, id, behavior_type, value, date, remark } => {
            let input = input_for(behavior_type, value, date, remark);
            let record = services.ledger.update(&id, &user, &input)?;
            print_json(&record)
        }

        Command::Delete { user, id } => {
            services.ledger.delete(&id, &user)?;
            print_json(&serde_json::json!({ "deleted": id }))
        }

        Command::Checkin { user, behavior_type, remark } => {
            let record = services.checkin.checkin(&user, &behavior_type, remark)?;
            print_json(&record)
        }

        Command::List { user, page, size, from, to } => {
            let size = size.unwrap_or(services.config.default_page_size);
            let page = services
                .ledger
                .list(&user, page, size, &DateRange::new(from, to))?;
            print_json(&page)
        }

        Command::Stats { user, from, to } => {
            let range = DateRange::new(from, to);
            let totals = services.statistics.totals(&user, &range)?;
            let by_behavior = services.statistics.by_behavior_type(&user)?;
            let by_date = services.statistics.by_date(&user, &range)?;
            let checkin = services.checkin.checkin_stats(&user)?;
            let aggregate = services.ledger.aggregate(&user)?;

            print_json(&serde_json::json!({
                "aggregate": aggregate,
                "totals": totals,
                "by_behavior": by_behavior,
                "by_date": by_date,
                "checkin": checkin,
            }))
        }

        Command::Calendar { user, month } => {
            let first = parse_month(&month)
                .with_context(|| format!("Invalid month {:?}, expected YYYY-MM", month))?;
            let days = services.checkin.calendar_for_month(&user, first)?;
            print_json(&days)
        }

        Command::Export { user, from, to } => {
            let stdout = std::io::stdout();
            let written = services
                .statistics
                .export_csv(&user, &DateRange::new(from, to), stdout.lock())?;
            info!(user_id = %user, records = written, "export complete");
            Ok(())
        }

        Command::Verify { user } => {
            let report = services.ledger.verify_consistency(&user)?;
            print_json(&report)
        }
    }
}

fn input_for(
    behavior_type: String,
    value: Decimal,
    date: Option<NaiveDate>,
    remark: Option<String>,
) -> FootprintInput {
    let mut input = FootprintInput::new(
        behavior_type,
        value,
        date.unwrap_or_else(carbon_ledger::checkin::today),
    );
    input.remark = remark;
    input
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
