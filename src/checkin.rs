// ✅ Check-in Engine
// One-tap daily check-in for count-class behaviors, plus streak and calendar views

use crate::catalog::UnitClass;
use crate::db::{self, DateRange, FootprintRecord};
use crate::error::{LedgerError, Result};
use crate::ledger::{FootprintInput, FootprintLedger};
use chrono::{Datelike, Local, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub record_count: i64,
    /// Distinct behavior codes logged that day, sorted
    pub behavior_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckinStats {
    pub streak: u32,
    /// All-time record count, any behavior
    pub total_checkins: i64,
    /// Days with a record this month / days in this month
    pub monthly_rate: f64,
}

/// The local calendar date used as "today"
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// First and last day of the month containing `date`
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_first.and_then(|d| d.pred_opt()).unwrap_or(first);
    (first, last)
}

/// Parse a `YYYY-MM` month into its first day
pub fn parse_month(month: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d").ok()
}

pub struct CheckinEngine {
    ledger: Arc<FootprintLedger>,
}

impl CheckinEngine {
    pub fn new(ledger: Arc<FootprintLedger>) -> Self {
        CheckinEngine { ledger }
    }

    pub fn checkin(&self, user_id: &str, behavior_type: &str, remark: Option<String>) -> Result<FootprintRecord> {
        self.checkin_on(user_id, behavior_type, remark, today())
    }

    /// Check in for `date` as "today".
    ///
    /// The existence check and the insert run under the user's write lock; the
    /// partial unique index on count-class records backs it up across processes.
    pub fn checkin_on(
        &self,
        user_id: &str,
        behavior_type: &str,
        remark: Option<String>,
        date: NaiveDate,
    ) -> Result<FootprintRecord> {
        let def = self
            .ledger
            .catalog()
            .lookup(behavior_type)
            .ok_or_else(|| LedgerError::InvalidBehaviorType(behavior_type.to_string()))?;

        if def.unit_class != UnitClass::Count {
            return Err(LedgerError::UnsupportedForCheckin(behavior_type.to_string()));
        }

        let already = || LedgerError::AlreadyCheckedInToday {
            behavior_type: behavior_type.to_string(),
            date,
        };

        self.ledger.with_user_lock(user_id, || -> Result<FootprintRecord> {
            let exists = {
                let conn = self.ledger.database().connect()?;
                db::exists_on_date(&conn, user_id, Some(behavior_type), date)?
            };
            if exists {
                info!(user_id, behavior_type, %date, "duplicate check-in rejected");
                return Err(already());
            }

            let input = FootprintInput {
                behavior_type: behavior_type.to_string(),
                data_value: Decimal::ONE,
                record_date: date,
                remark,
            };

            match self.ledger.create_locked(user_id, &input) {
                Ok(record) => {
                    info!(user_id, behavior_type, %date, record_id = %record.id, "checked in");
                    Ok(record)
                }
                Err(LedgerError::DuplicateCountRecord { .. }) => Err(already()),
                Err(e) => Err(e),
            }
        })
    }

    /// One entry per date in `[start, end]` that has at least one record
    pub fn calendar(&self, user_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<CalendarDay>> {
        let conn = self.ledger.database().connect()?;
        let rows = db::get_daily_totals(&conn, user_id, &DateRange::between(start, end))?;

        Ok(rows
            .into_iter()
            .map(|row| CalendarDay {
                date: row.date,
                record_count: row.count,
                behavior_types: row.behavior_types,
            })
            .collect())
    }

    /// Calendar for the whole month containing `month`
    pub fn calendar_for_month(&self, user_id: &str, month: NaiveDate) -> Result<Vec<CalendarDay>> {
        let (start, end) = month_bounds(month);
        self.calendar(user_id, start, end)
    }

    pub fn streak(&self, user_id: &str) -> Result<u32> {
        self.streak_on(user_id, today())
    }

    /// Consecutive days with any record, walking back from `today`
    pub fn streak_on(&self, user_id: &str, today: NaiveDate) -> Result<u32> {
        let conn = self.ledger.database().connect()?;
        let dates = db::recorded_dates_until(&conn, user_id, today)?;

        let mut streak: u32 = 0;
        let mut expected = Some(today);
        for date in dates {
            if Some(date) != expected {
                break;
            }
            streak += 1;
            expected = date.pred_opt();
        }

        debug!(user_id, %today, streak, "computed streak");
        Ok(streak)
    }

    pub fn checkin_stats(&self, user_id: &str) -> Result<CheckinStats> {
        self.checkin_stats_on(user_id, today())
    }

    pub fn checkin_stats_on(&self, user_id: &str, today: NaiveDate) -> Result<CheckinStats> {
        let streak = self.streak_on(user_id, today)?;

        let conn = self.ledger.database().connect()?;
        let total_checkins = db::get_record_totals(&conn, user_id, &DateRange::all())?.records;

        let (first, last) = month_bounds(today);
        let checked_days = db::get_record_totals(&conn, user_id, &DateRange::between(first, last))?.distinct_dates;
        let days_in_month = i64::from(last.day());
        let monthly_rate = checked_days as f64 / days_in_month as f64;

        Ok(CheckinStats {
            streak,
            total_checkins,
            monthly_rate,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
