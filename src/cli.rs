use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use sitta::services::WindowingStrategy;

#[derive(Parser)]
#[command(name = "sitta")]
#[command(version)]
#[command(about = "Find birding hotspots likely to produce lifers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Same days of the year, plus or minus the day window
    DayWindow,
    /// The whole calendar month
    CalendarMonth,
}

impl From<StrategyArg> for WindowingStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::DayWindow => WindowingStrategy::DayWindow,
            StrategyArg::CalendarMonth => WindowingStrategy::CalendarMonth,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rank hotspots by the lifers they are likely to produce
    Recommend {
        /// eBird location id of a candidate hotspot (repeatable)
        #[arg(short, long = "location", required = true)]
        locations: Vec<String>,

        /// Day of the planned visit (YYYY-MM-DD), today if omitted
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// eBird life-list CSV download, or a .json file of
        /// [{"species_code": ..., "first_observed": ...}]
        #[arg(long)]
        life_list: PathBuf,

        #[arg(long, value_enum, default_value_t = StrategyArg::DayWindow)]
        strategy: StrategyArg,

        /// Prior years to search [env: HISTORICAL_YEARS]
        #[arg(long, allow_negative_numbers = true)]
        historical_years: Option<i32>,

        /// Days either side of the date [env: DAY_WINDOW]
        #[arg(long, allow_negative_numbers = true)]
        day_window: Option<i32>,

        /// Hotspots to list [env: MAX_RECOMMENDATIONS]
        #[arg(long)]
        max_results: Option<usize>,

        /// Also list hotspots with no likely lifers
        #[arg(long)]
        show_all: bool,
    },

    /// Build evaluation cases from observer histories in the database
    #[command(name = "make-e2e-eval-data")]
    MakeE2eEvalData {
        /// CSV file with an observer_id column
        #[arg(long)]
        observer_ids: PathBuf,

        /// Skip this many observers from the top of the file
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Use at most this many observers
        #[arg(long)]
        limit: Option<usize>,

        /// As-of date of every case (YYYY-MM-DD)
        #[arg(short, long)]
        date: NaiveDate,

        /// Where to write the cases
        #[arg(long)]
        eval_file: PathBuf,

        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        horizon_days: i64,

        #[arg(long, default_value_t = 1)]
        cases_per_observer: usize,
    },

    /// Score both strategies against saved evaluation cases
    #[command(name = "run-e2e-eval")]
    RunE2eEval {
        #[arg(long)]
        eval_file: PathBuf,

        /// Species judged per case [env: EVAL_TOP_K]
        #[arg(short)]
        k: Option<usize>,
    },

    /// Serve the HTTP API
    Serve,
}
