use crate::calculator::{from_cents, to_cents};
use crate::catalog::UnitClass;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How long a writer waits on SQLite's file lock before reporting BUSY
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One logged low-carbon behavior.
/// Name, unit class and coefficient are snapshots taken when the record was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintRecord {
    /// Stable identity (UUID) - never changes
    pub id: String,
    pub user_id: String,
    pub behavior_type: String,
    pub behavior_name: String,
    pub unit_class: UnitClass,
    pub coefficient: Decimal,
    pub data_value: Decimal,
    /// kg CO2e, 2 decimal places
    pub reduction_amount: Decimal,
    pub points_earned: i64,
    pub record_date: NaiveDate,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Running per-user totals; always the sum over the user's records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAggregate {
    pub user_id: String,
    pub points: i64,
    pub total_reduction: Decimal,
}

impl UserAggregate {
    pub fn empty(user_id: &str) -> Self {
        UserAggregate {
            user_id: user_id.to_string(),
            points: 0,
            total_reduction: from_cents(0),
        }
    }
}

/// Inclusive date bounds; either side may be open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        DateRange { start, end }
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn all() -> Self {
        DateRange::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Event for audit trail (every ledger mutation writes one)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

// ============================================================================
// DATABASE HANDLE
// ============================================================================

/// Owns the database location. Every operation opens its own connection so
/// independent callers never queue behind a shared process-wide handle.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database file and install the schema
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let db = Database {
            path: path.as_ref().to_path_buf(),
        };
        let conn = db.connect()?;
        setup_database(&conn)?;
        Ok(db)
    }

    pub fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery and concurrent readers
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Users Table (aggregate only; identity lives elsewhere)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            points INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
            total_reduction_cents INTEGER NOT NULL DEFAULT 0 CHECK (total_reduction_cents >= 0),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Footprints Table
    // seq gives insertion order; record_id is the public identity
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS footprints (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id TEXT UNIQUE NOT NULL,
            user_id TEXT NOT NULL,
            behavior_type TEXT NOT NULL,
            behavior_name TEXT NOT NULL,
            unit_class TEXT NOT NULL,
            coefficient TEXT NOT NULL,
            data_value TEXT NOT NULL,
            reduction_cents INTEGER NOT NULL,
            points_earned INTEGER NOT NULL CHECK (points_earned >= 0),
            record_date TEXT NOT NULL,
            remark TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================

    // One count-class record per user, behavior and day
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_count_once_per_day
         ON footprints(user_id, behavior_type, record_date)
         WHERE unit_class = 'COUNT'",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_footprints_user_date ON footprints(user_id, record_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

fn decimal_at(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// JSON array of strings, as produced by `json_group_array`
fn string_list_at(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn unit_class_at(row: &Row, idx: usize) -> rusqlite::Result<UnitClass> {
    let text: String = row.get(idx)?;
    UnitClass::parse(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown unit class: {}", text).into(),
        )
    })
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const RECORD_COLUMNS: &str = "record_id, user_id, behavior_type, behavior_name, unit_class,
     coefficient, data_value, reduction_cents, points_earned, record_date, remark, created_at";

fn record_from_row(row: &Row) -> rusqlite::Result<FootprintRecord> {
    Ok(FootprintRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        behavior_type: row.get(2)?,
        behavior_name: row.get(3)?,
        unit_class: unit_class_at(row, 4)?,
        coefficient: decimal_at(row, 5)?,
        data_value: decimal_at(row, 6)?,
        reduction_amount: from_cents(row.get(7)?),
        points_earned: row.get(8)?,
        record_date: row.get(9)?,
        remark: row.get(10)?,
        created_at: timestamp_at(row, 11)?,
    })
}

// ============================================================================
// USER AGGREGATES
// ============================================================================

/// Create a zeroed aggregate row for a user seen for the first time
pub fn ensure_user(conn: &Connection, user_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (user_id, points, total_reduction_cents) VALUES (?1, 0, 0)",
        params![user_id],
    )?;
    Ok(())
}

pub fn get_aggregate(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<UserAggregate>> {
    conn.query_row(
        "SELECT user_id, points, total_reduction_cents FROM users WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(UserAggregate {
                user_id: row.get(0)?,
                points: row.get(1)?,
                total_reduction: from_cents(row.get(2)?),
            })
        },
    )
    .optional()
}

pub fn write_aggregate(conn: &Connection, aggregate: &UserAggregate) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users
         SET points = ?2, total_reduction_cents = ?3, updated_at = CURRENT_TIMESTAMP
         WHERE user_id = ?1",
        params![
            aggregate.user_id,
            aggregate.points,
            to_cents(aggregate.total_reduction)
        ],
    )?;
    Ok(())
}

// ============================================================================
// FOOTPRINT RECORDS
// ============================================================================

pub fn insert_footprint(conn: &Connection, record: &FootprintRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO footprints (
            record_id, user_id, behavior_type, behavior_name, unit_class,
            coefficient, data_value, reduction_cents, points_earned,
            record_date, remark, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.id,
            record.user_id,
            record.behavior_type,
            record.behavior_name,
            record.unit_class.as_str(),
            record.coefficient.to_string(),
            record.data_value.to_string(),
            to_cents(record.reduction_amount),
            record.points_earned,
            record.record_date,
            record.remark,
            format_timestamp(&record.created_at),
        ],
    )?;
    Ok(())
}

/// Full replace of the mutable fields; id, owner and created_at are untouched
pub fn replace_footprint(conn: &Connection, record: &FootprintRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE footprints
         SET behavior_type = ?2, behavior_name = ?3, unit_class = ?4,
             coefficient = ?5, data_value = ?6, reduction_cents = ?7,
             points_earned = ?8, record_date = ?9, remark = ?10
         WHERE record_id = ?1",
        params![
            record.id,
            record.behavior_type,
            record.behavior_name,
            record.unit_class.as_str(),
            record.coefficient.to_string(),
            record.data_value.to_string(),
            to_cents(record.reduction_amount),
            record.points_earned,
            record.record_date,
            record.remark,
        ],
    )
}

pub fn delete_footprint(conn: &Connection, record_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM footprints WHERE record_id = ?1", params![record_id])
}

pub fn get_footprint(conn: &Connection, record_id: &str) -> rusqlite::Result<Option<FootprintRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM footprints WHERE record_id = ?1", RECORD_COLUMNS),
        params![record_id],
        record_from_row,
    )
    .optional()
}

/// Newest first: record date, then creation time, then insertion order
pub fn list_footprints(
    conn: &Connection,
    user_id: &str,
    range: &DateRange,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<FootprintRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM footprints
         WHERE user_id = ?1
           AND (?2 IS NULL OR record_date >= ?2)
           AND (?3 IS NULL OR record_date <= ?3)
         ORDER BY record_date DESC, created_at DESC, seq DESC
         LIMIT ?4 OFFSET ?5",
        RECORD_COLUMNS
    ))?;

    let records = stmt
        .query_map(
            params![user_id, range.start, range.end, limit, offset],
            record_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// All records in range, oldest first (export order)
pub fn get_footprints_chronological(
    conn: &Connection,
    user_id: &str,
    range: &DateRange,
) -> rusqlite::Result<Vec<FootprintRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM footprints
         WHERE user_id = ?1
           AND (?2 IS NULL OR record_date >= ?2)
           AND (?3 IS NULL OR record_date <= ?3)
         ORDER BY record_date ASC, seq ASC",
        RECORD_COLUMNS
    ))?;

    let records = stmt
        .query_map(params![user_id, range.start, range.end], record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Does the user have a record on `date` (optionally of one behavior)?
pub fn exists_on_date(
    conn: &Connection,
    user_id: &str,
    behavior_type: Option<&str>,
    date: NaiveDate,
) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM footprints
         WHERE user_id = ?1 AND record_date = ?2 AND (?3 IS NULL OR behavior_type = ?3)",
        params![user_id, date, behavior_type],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Distinct dates with at least one record, on or before `until`, newest first
pub fn recorded_dates_until(
    conn: &Connection,
    user_id: &str,
    until: NaiveDate,
) -> rusqlite::Result<Vec<NaiveDate>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT record_date FROM footprints
         WHERE user_id = ?1 AND record_date <= ?2
         ORDER BY record_date DESC",
    )?;

    let dates = stmt
        .query_map(params![user_id, until], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(dates)
}

// ============================================================================
// AGGREGATE QUERIES
// ============================================================================

/// Count and sums over a user's records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordTotals {
    pub records: i64,
    pub reduction_cents: i64,
    pub points: i64,
    pub distinct_dates: i64,
}

pub fn get_record_totals(
    conn: &Connection,
    user_id: &str,
    range: &DateRange,
) -> rusqlite::Result<RecordTotals> {
    conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(reduction_cents), 0),
                COALESCE(SUM(points_earned), 0),
                COUNT(DISTINCT record_date)
         FROM footprints
         WHERE user_id = ?1
           AND (?2 IS NULL OR record_date >= ?2)
           AND (?3 IS NULL OR record_date <= ?3)",
        params![user_id, range.start, range.end],
        |row| {
            Ok(RecordTotals {
                records: row.get(0)?,
                reduction_cents: row.get(1)?,
                points: row.get(2)?,
                distinct_dates: row.get(3)?,
            })
        },
    )
}

/// Per-behavior grouping row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorTotalsRow {
    pub behavior_type: String,
    pub behavior_name: String,
    pub count: i64,
    pub reduction_cents: i64,
    pub points: i64,
}

/// Grouped by behavior code, largest reduction first.
/// The name is the most recent snapshot for that code.
pub fn get_behavior_totals(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<BehaviorTotalsRow>> {
    let mut stmt = conn.prepare(
        "SELECT f.behavior_type,
                (SELECT behavior_name FROM footprints n
                 WHERE n.user_id = f.user_id AND n.behavior_type = f.behavior_type
                 ORDER BY n.seq DESC LIMIT 1),
                COUNT(*),
                SUM(f.reduction_cents) AS total_cents,
                SUM(f.points_earned)
         FROM footprints f
         WHERE f.user_id = ?1
         GROUP BY f.behavior_type
         ORDER BY total_cents DESC, f.behavior_type ASC",
    )?;

    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(BehaviorTotalsRow {
                behavior_type: row.get(0)?,
                behavior_name: row.get(1)?,
                count: row.get(2)?,
                reduction_cents: row.get(3)?,
                points: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Per-date grouping row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyTotalsRow {
    pub date: NaiveDate,
    pub count: i64,
    pub behavior_types: Vec<String>,
    pub reduction_cents: i64,
    pub points: i64,
}

/// Grouped by record date, oldest first; dates without records are absent
pub fn get_daily_totals(
    conn: &Connection,
    user_id: &str,
    range: &DateRange,
) -> rusqlite::Result<Vec<DailyTotalsRow>> {
    let mut stmt = conn.prepare(
        "SELECT record_date,
                COUNT(*),
                json_group_array(DISTINCT behavior_type),
                SUM(reduction_cents),
                SUM(points_earned)
         FROM footprints
         WHERE user_id = ?1
           AND (?2 IS NULL OR record_date >= ?2)
           AND (?3 IS NULL OR record_date <= ?3)
         GROUP BY record_date
         ORDER BY record_date ASC",
    )?;

    let rows = stmt
        .query_map(params![user_id, range.start, range.end], |row| {
            let mut behavior_types = string_list_at(row, 2)?;
            behavior_types.sort();

            Ok(DailyTotalsRow {
                date: row.get(0)?,
                count: row.get(1)?,
                behavior_types,
                reduction_cents: row.get(3)?,
                points: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> rusqlite::Result<()> {
    let data_json = event.data.to_string();

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            format_timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> rusqlite::Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_at(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("ledger.db")).unwrap();
        (dir, db)
    }

    /// Helper function to create test records with all required fields
    fn create_test_record(user_id: &str, behavior_type: &str, unit_class: UnitClass, date: &str) -> FootprintRecord {
        FootprintRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            behavior_type: behavior_type.to_string(),
            behavior_name: behavior_type.to_lowercase(),
            unit_class,
            coefficient: dec!(0.5),
            data_value: dec!(1),
            reduction_amount: dec!(0.50),
            points_earned: 5,
            record_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            remark: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_round_trip() {
        let (_dir, db) = test_db();
        let conn = db.connect().unwrap();

        let mut record = create_test_record("alice", "BUS", UnitClass::Continuous, "2024-12-31");
        record.coefficient = dec!(0.089);
        record.data_value = dec!(10.5);
        record.reduction_amount = dec!(0.93);
        record.remark = Some("to work".to_string());

        insert_footprint(&conn, &record).unwrap();
        let loaded = get_footprint(&conn, &record.id).unwrap().unwrap();

        assert_eq!(loaded.data_value, dec!(10.5));
        assert_eq!(loaded.coefficient, dec!(0.089));
        assert_eq!(loaded.reduction_amount.to_string(), "0.93");
        assert_eq!(loaded.remark.as_deref(), Some("to work"));
        assert_eq!(loaded.record_date, record.record_date);
        assert_eq!(
            loaded.created_at.timestamp_micros(),
            record.created_at.timestamp_micros()
        );
    }

    #[test]
    fn test_count_unique_index() {
        let (_dir, db) = test_db();
        let conn = db.connect().unwrap();

        let first = create_test_record("alice", "VEGETARIAN", UnitClass::Count, "2024-12-31");
        let second = create_test_record("alice", "VEGETARIAN", UnitClass::Count, "2024-12-31");
        insert_footprint(&conn, &first).unwrap();

        let err = insert_footprint(&conn, &second).unwrap_err();
        assert!(crate::error::LedgerError::is_unique_violation(&err));

        // another user, another day: fine
        insert_footprint(&conn, &create_test_record("bob", "VEGETARIAN", UnitClass::Count, "2024-12-31")).unwrap();
        insert_footprint(&conn, &create_test_record("alice", "VEGETARIAN", UnitClass::Count, "2025-01-01")).unwrap();
    }

    #[test]
    fn test_continuous_records_may_repeat_per_day() {
        let (_dir, db) = test_db();
        let conn = db.connect().unwrap();

        insert_footprint(&conn, &create_test_record("alice", "BUS", UnitClass::Continuous, "2024-12-31")).unwrap();
        insert_footprint(&conn, &create_test_record("alice", "BUS", UnitClass::Continuous, "2024-12-31")).unwrap();

        let totals = get_record_totals(&conn, "alice", &DateRange::all()).unwrap();
        assert_eq!(totals.records, 2);
        assert_eq!(totals.distinct_dates, 1);
    }

    #[test]
    fn test_list_ordering_and_range() {
        let (_dir, db) = test_db();
        let conn = db.connect().unwrap();

        let old = create_test_record("alice", "BUS", UnitClass::Continuous, "2024-12-01");
        let new_a = create_test_record("alice", "BUS", UnitClass::Continuous, "2024-12-31");
        let mut new_b = create_test_record("alice", "WALK", UnitClass::Continuous, "2024-12-31");
        new_b.created_at = new_a.created_at;
        for r in [&old, &new_a, &new_b] {
            insert_footprint(&conn, r).unwrap();
        }

        let all = list_footprints(&conn, "alice", &DateRange::all(), 10, 0).unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        // same date and timestamp: later insertion first
        assert_eq!(ids, vec![new_b.id.as_str(), new_a.id.as_str(), old.id.as_str()]);

        let dec_range = DateRange::between(
            NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 30).unwrap(),
        );
        let in_range = list_footprints(&conn, "alice", &dec_range, 10, 0).unwrap();
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].id, old.id);

        assert!(list_footprints(&conn, "bob", &DateRange::all(), 10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_aggregate_row() {
        let (_dir, db) = test_db();
        let conn = db.connect().unwrap();

        assert!(get_aggregate(&conn, "alice").unwrap().is_none());
        ensure_user(&conn, "alice").unwrap();
        ensure_user(&conn, "alice").unwrap();
        assert_eq!(get_aggregate(&conn, "alice").unwrap().unwrap(), UserAggregate::empty("alice"));

        write_aggregate(
            &conn,
            &UserAggregate {
                user_id: "alice".to_string(),
                points: 13,
                total_reduction: dec!(1.39),
            },
        )
        .unwrap();
        let agg = get_aggregate(&conn, "alice").unwrap().unwrap();
        assert_eq!(agg.points, 13);
        assert_eq!(agg.total_reduction, dec!(1.39));
    }

    #[test]
    fn test_negative_aggregate_rejected_by_schema() {
        let (_dir, db) = test_db();
        let conn = db.connect().unwrap();
        ensure_user(&conn, "alice").unwrap();

        let result = write_aggregate(
            &conn,
            &UserAggregate {
                user_id: "alice".to_string(),
                points: -1,
                total_reduction: dec!(0),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_daily_totals_group_types() {
        let (_dir, db) = test_db();
        let conn = db.connect().unwrap();

        insert_footprint(&conn, &create_test_record("alice", "RECYCLE", UnitClass::Count, "2024-12-31")).unwrap();
        insert_footprint(&conn, &create_test_record("alice", "BUS", UnitClass::Continuous, "2024-12-31")).unwrap();
        insert_footprint(&conn, &create_test_record("alice", "BUS", UnitClass::Continuous, "2024-12-31")).unwrap();
        insert_footprint(&conn, &create_test_record("alice", "BUS", UnitClass::Continuous, "2024-12-29")).unwrap();

        let rows = get_daily_totals(&conn, "alice", &DateRange::all()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 12, 29).unwrap());
        assert_eq!(rows[1].count, 3);
        assert_eq!(rows[1].behavior_types, vec!["BUS".to_string(), "RECYCLE".to_string()]);
        assert_eq!(rows[1].reduction_cents, 150);
        assert_eq!(rows[1].points, 15);
    }

    #[test]
    fn test_daily_totals_keep_codes_with_commas() {
        let (_dir, db) = test_db();
        let conn = db.connect().unwrap();

        insert_footprint(&conn, &create_test_record("alice", "A,B", UnitClass::Count, "2025-01-02")).unwrap();
        insert_footprint(&conn, &create_test_record("alice", "C", UnitClass::Count, "2025-01-02")).unwrap();

        let rows = get_daily_totals(&conn, "alice", &DateRange::all()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].behavior_types, vec!["A,B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_event_log() {
        let (_dir, db) = test_db();
        let conn = db.connect().unwrap();

        let event = Event::new(
            "footprint_created",
            "footprint",
            "record_123",
            serde_json::json!({"points": 8}),
            "alice",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "footprint", "record_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "footprint_created");
        assert_eq!(events[0].actor, "alice");
        assert_eq!(events[0].data["points"], 8);
    }
}
