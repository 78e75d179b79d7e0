use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{AppError, AppResult};

/// Upper bound on the lookback, well past the start of digitised checklist records
pub const MAX_HISTORICAL_YEARS: i32 = 100;

/// Windows wider than this would overlap the same day in neighbouring years
pub const MAX_DAY_WINDOW: i32 = 182;

/// Parameters shared by every windowing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub historical_years: i32,
    pub day_window: i32,
}

/// How the dates comparable to a target date are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowingStrategy {
    /// The same month/day in each prior year, plus or minus `day_window` days
    DayWindow,
    /// Every day of the target's calendar month in each prior year
    CalendarMonth,
}

/// Calendar dates considered comparable to a target date
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoricalWindow {
    dates: BTreeSet<NaiveDate>,
}

impl HistoricalWindow {
    pub fn dates(&self) -> &BTreeSet<NaiveDate> {
        &self.dates
    }

    pub fn contains(&self, date: &NaiveDate) -> bool {
        self.dates.contains(date)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl WindowingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            WindowingStrategy::DayWindow => "day_window",
            WindowingStrategy::CalendarMonth => "calendar_month",
        }
    }

    /// Derives the historical window for `target_date`
    ///
    /// Only years before the target's year are included, so the window never
    /// reaches the target date itself.
    pub fn window(
        &self,
        target_date: NaiveDate,
        config: &WindowConfig,
    ) -> AppResult<HistoricalWindow> {
        validate(config)?;

        let mut dates = BTreeSet::new();
        for years_back in 1..=config.historical_years {
            let year = target_date.year() - years_back;
            match self {
                WindowingStrategy::DayWindow => {
                    let Some(anchor) = anchor_in_year(target_date, year) else {
                        continue;
                    };
                    let days = i64::from(config.day_window);
                    for offset in -days..=days {
                        if let Some(date) = anchor.checked_add_signed(Duration::days(offset)) {
                            dates.insert(date);
                        }
                    }
                }
                WindowingStrategy::CalendarMonth => {
                    let Some(first) = NaiveDate::from_ymd_opt(year, target_date.month(), 1) else {
                        continue;
                    };
                    dates.extend(
                        first
                            .iter_days()
                            .take_while(|d| d.month() == target_date.month()),
                    );
                }
            }
        }

        Ok(HistoricalWindow { dates })
    }
}

fn validate(config: &WindowConfig) -> AppResult<()> {
    if config.historical_years <= 0 {
        return Err(AppError::invalid_config(
            "historical_years",
            format!("must be positive, got {}", config.historical_years),
        ));
    }
    if config.historical_years > MAX_HISTORICAL_YEARS {
        return Err(AppError::invalid_config(
            "historical_years",
            format!(
                "must be at most {}, got {}",
                MAX_HISTORICAL_YEARS, config.historical_years
            ),
        ));
    }
    if config.day_window < 0 {
        return Err(AppError::invalid_config(
            "day_window",
            format!("must be non-negative, got {}", config.day_window),
        ));
    }
    if config.day_window > MAX_DAY_WINDOW {
        return Err(AppError::invalid_config(
            "day_window",
            format!("must be at most {}, got {}", MAX_DAY_WINDOW, config.day_window),
        ));
    }
    Ok(())
}

/// The target's month/day in another year; Feb 29 falls back to Feb 28
fn anchor_in_year(target: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, target.month(), target.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, target.month(), 28))
}
