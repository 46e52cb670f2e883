// 📊 Statistics Aggregator
// Read-only grouping over a user's records: totals, by behavior, by date

use crate::calculator::from_cents;
use crate::checkin::today;
use crate::db::{self, DateRange, Database};
use crate::error::{LedgerError, Result};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// Trailing window used when a caller gives no dates at all
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Totals {
    pub total_reduction: Decimal,
    pub total_points: i64,
    pub total_records: i64,
    /// The range actually summed (after defaulting)
    pub range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorTotals {
    pub behavior_type: String,
    pub behavior_name: String,
    pub count: i64,
    pub total_reduction: Decimal,
    pub total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub daily_reduction: Decimal,
    pub daily_points: i64,
}

pub struct StatisticsAggregator {
    db: Database,
    window_days: i64,
}

impl StatisticsAggregator {
    pub fn new(db: Database) -> Self {
        StatisticsAggregator {
            db,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    pub fn with_window_days(mut self, days: i64) -> Self {
        self.window_days = days.max(0);
        self
    }

    /// Fill in the trailing window when neither bound is given.
    ///
    /// `[today - window, today]`, both ends inclusive; a window reaching past
    /// the earliest representable date starts there instead.
    pub fn resolve_range(&self, range: &DateRange, today: NaiveDate) -> DateRange {
        if range.is_unbounded() {
            let start = Duration::try_days(self.window_days)
                .and_then(|window| today.checked_sub_signed(window))
                .unwrap_or(NaiveDate::MIN);
            DateRange::between(start, today)
        } else {
            *range
        }
    }

    pub fn totals(&self, user_id: &str, range: &DateRange) -> Result<Totals> {
        self.totals_on(user_id, range, today())
    }

    pub fn totals_on(&self, user_id: &str, range: &DateRange, today: NaiveDate) -> Result<Totals> {
        let range = self.resolve_range(range, today);
        let conn = self.db.connect()?;
        let sums = db::get_record_totals(&conn, user_id, &range)?;

        Ok(Totals {
            total_reduction: from_cents(sums.reduction_cents),
            total_points: sums.points,
            total_records: sums.records,
            range,
        })
    }

    /// All-time grouping, largest reduction first
    pub fn by_behavior_type(&self, user_id: &str) -> Result<Vec<BehaviorTotals>> {
        let conn = self.db.connect()?;
        let rows = db::get_behavior_totals(&conn, user_id)?;

        Ok(rows
            .into_iter()
            .map(|row| BehaviorTotals {
                behavior_type: row.behavior_type,
                behavior_name: row.behavior_name,
                count: row.count,
                total_reduction: from_cents(row.reduction_cents),
                total_points: row.points,
            })
            .collect())
    }

    pub fn by_date(&self, user_id: &str, range: &DateRange) -> Result<Vec<DailyTotals>> {
        self.by_date_on(user_id, range, today())
    }

    /// Oldest first, one entry per date with at least one record
    pub fn by_date_on(&self, user_id: &str, range: &DateRange, today: NaiveDate) -> Result<Vec<DailyTotals>> {
        let range = self.resolve_range(range, today);
        let conn = self.db.connect()?;
        let rows = db::get_daily_totals(&conn, user_id, &range)?;

        Ok(rows
            .into_iter()
            .map(|row| DailyTotals {
                date: row.date,
                daily_reduction: from_cents(row.reduction_cents),
                daily_points: row.points,
            })
            .collect())
    }

    /// Write the user's records in `range` as CSV, oldest first.
    /// An unbounded range exports everything.
    pub fn export_csv<W: Write>(&self, user_id: &str, range: &DateRange, writer: W) -> Result<usize> {
        let conn = self.db.connect()?;
        let records = db::get_footprints_chronological(&conn, user_id, range)?;

        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record([
            "record_id",
            "record_date",
            "behavior_type",
            "behavior_name",
            "data_value",
            "coefficient",
            "reduction_amount",
            "points_earned",
            "remark",
        ])?;

        for r in &records {
            wtr.write_record([
                r.id.clone(),
                r.record_date.to_string(),
                r.behavior_type.clone(),
                r.behavior_name.clone(),
                r.data_value.to_string(),
                r.coefficient.to_string(),
                r.reduction_amount.to_string(),
                r.points_earned.to_string(),
                r.remark.clone().unwrap_or_default(),
            ])?;
        }

        wtr.flush().map_err(|e| LedgerError::Export(e.into()))?;
        Ok(records.len())
    }
}
