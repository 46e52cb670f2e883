// 📒 Footprint Ledger
// The only writer of user aggregates. Every record mutation and its aggregate
// delta commit in one SQLite transaction, under a per-user lock.

use crate::calculator::{from_cents, to_cents, Reduction, ReductionCalculator};
use crate::catalog::{BehaviorCatalog, BehaviorDefinition};
use crate::db::{self, DateRange, Database, Event, FootprintRecord, UserAggregate};
use crate::error::{LedgerError, Result};
use crate::validator::LedgerValidator;
use chrono::{NaiveDate, SubsecRound, Utc};
use dashmap::DashMap;
use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const DEFAULT_MAX_PAGE_SIZE: i64 = 100;

const ENTITY_TYPE: &str = "footprint";

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Caller-supplied fields of a record (create and full-replace update)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FootprintInput {
    pub behavior_type: String,
    pub data_value: Decimal,
    pub record_date: NaiveDate,
    #[serde(default)]
    pub remark: Option<String>,
}

impl FootprintInput {
    pub fn new(behavior_type: impl Into<String>, data_value: Decimal, record_date: NaiveDate) -> Self {
        FootprintInput {
            behavior_type: behavior_type.into(),
            data_value,
            record_date,
            remark: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: i64,
    pub page_num: i64,
    pub page_size: i64,
}

/// Stored aggregate vs. the sum over records
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub user_id: String,
    pub stored: UserAggregate,
    pub record_count: i64,
    pub recomputed_points: i64,
    pub recomputed_reduction: Decimal,
    pub consistent: bool,
}

/// Aggregate after a delta, and whether the zero floor kicked in
#[derive(Debug, Clone, PartialEq, Eq)]
struct AggregateChange {
    aggregate: UserAggregate,
    clamped: bool,
}

/// Apply a signed delta, flooring both totals at zero.
fn clamp_delta(current: &UserAggregate, delta_cents: i64, delta_points: i64) -> AggregateChange {
    let raw_cents = to_cents(current.total_reduction).saturating_add(delta_cents);
    let raw_points = current.points.saturating_add(delta_points);

    AggregateChange {
        aggregate: UserAggregate {
            user_id: current.user_id.clone(),
            points: raw_points.max(0),
            total_reduction: from_cents(raw_cents.max(0)),
        },
        clamped: raw_cents < 0 || raw_points < 0,
    }
}

// ============================================================================
// LEDGER
// ============================================================================

pub struct FootprintLedger {
    db: Database,
    validator: LedgerValidator,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    max_page_size: i64,
}

impl FootprintLedger {
    pub fn new(db: Database, catalog: Arc<BehaviorCatalog>) -> Self {
        FootprintLedger {
            db,
            validator: LedgerValidator::new(catalog),
            user_locks: DashMap::new(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(mut self, max_page_size: i64) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    pub fn catalog(&self) -> &BehaviorCatalog {
        self.validator.catalog()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run `f` while holding this user's write lock.
    ///
    /// Writers for the same user queue here; other users are unaffected.
    /// The entry is dropped again once no writer holds or waits on it, so the
    /// map only grows with the number of users writing at the same moment.
    pub(crate) fn with_user_lock<T>(&self, user_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self
            .user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            // guards no data, so a poisoned lock is still usable
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        drop(lock);
        // clones are only taken under the shard lock, so a count of 1 means no waiters
        self.user_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub fn create(&self, user_id: &str, input: &FootprintInput) -> Result<FootprintRecord> {
        self.with_user_lock(user_id, || self.create_locked(user_id, input))
    }

    /// Create without taking the user lock; the caller must already hold it.
    pub(crate) fn create_locked(&self, user_id: &str, input: &FootprintInput) -> Result<FootprintRecord> {
        let (def, reduction) = self.evaluate(input)?;

        let record = FootprintRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            behavior_type: def.code.clone(),
            behavior_name: def.display_name.clone(),
            unit_class: def.unit_class,
            coefficient: def.coefficient,
            data_value: input.data_value,
            reduction_amount: reduction.amount,
            points_earned: reduction.points,
            record_date: input.record_date,
            remark: input.remark.clone(),
            // storage keeps microseconds
            created_at: Utc::now().trunc_subsecs(6),
        };

        let mut conn = self.db.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        db::ensure_user(&tx, user_id)?;
        db::insert_footprint(&tx, &record).map_err(|e| duplicate_or_persistence(e, &record))?;
        let change = apply_delta(&tx, user_id, reduction.cents(), reduction.points)?;

        db::insert_event(
            &tx,
            &Event::new(
                "footprint_created",
                ENTITY_TYPE,
                &record.id,
                serde_json::json!({
                    "behavior_type": record.behavior_type,
                    "data_value": record.data_value,
                    "record_date": record.record_date,
                    "reduction_delta": record.reduction_amount,
                    "points_delta": record.points_earned,
                    "clamped": change.clamped,
                }),
                user_id,
            ),
        )?;

        tx.commit()?;

        info!(
            user_id,
            record_id = %record.id,
            behavior_type = %record.behavior_type,
            reduction = %record.reduction_amount,
            points = record.points_earned,
            "footprint created"
        );

        Ok(record)
    }

    /// Replace a record's mutable fields; the aggregate moves by the difference.
    pub fn update(&self, record_id: &str, user_id: &str, input: &FootprintInput) -> Result<FootprintRecord> {
        self.with_user_lock(user_id, || -> Result<FootprintRecord> {
            let mut conn = self.db.connect()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing = owned_record(&tx, record_id, user_id)?;
            let (def, reduction) = self.evaluate(input)?;

            let updated = FootprintRecord {
                behavior_type: def.code.clone(),
                behavior_name: def.display_name.clone(),
                unit_class: def.unit_class,
                coefficient: def.coefficient,
                data_value: input.data_value,
                reduction_amount: reduction.amount,
                points_earned: reduction.points,
                record_date: input.record_date,
                remark: input.remark.clone(),
                ..existing.clone()
            };

            db::replace_footprint(&tx, &updated).map_err(|e| duplicate_or_persistence(e, &updated))?;

            let delta_cents = reduction.cents() - to_cents(existing.reduction_amount);
            let delta_points = reduction.points - existing.points_earned;
            let change = apply_delta(&tx, user_id, delta_cents, delta_points)?;

            db::insert_event(
                &tx,
                &Event::new(
                    "footprint_updated",
                    ENTITY_TYPE,
                    record_id,
                    serde_json::json!({
                        "before": {
                            "behavior_type": existing.behavior_type,
                            "data_value": existing.data_value,
                            "record_date": existing.record_date,
                            "reduction_amount": existing.reduction_amount,
                            "points_earned": existing.points_earned,
                        },
                        "after": {
                            "behavior_type": updated.behavior_type,
                            "data_value": updated.data_value,
                            "record_date": updated.record_date,
                            "reduction_amount": updated.reduction_amount,
                            "points_earned": updated.points_earned,
                        },
                        "reduction_delta": from_cents(delta_cents),
                        "points_delta": delta_points,
                        "clamped": change.clamped,
                    }),
                    user_id,
                ),
            )?;

            tx.commit()?;

            info!(
                user_id,
                record_id,
                reduction_delta = %from_cents(delta_cents),
                points_delta = delta_points,
                "footprint updated"
            );

            Ok(updated)
        })
    }

    pub fn delete(&self, record_id: &str, user_id: &str) -> Result<()> {
        self.with_user_lock(user_id, || -> Result<()> {
            let mut conn = self.db.connect()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let existing = owned_record(&tx, record_id, user_id)?;
            db::delete_footprint(&tx, record_id)?;

            let change = apply_delta(
                &tx,
                user_id,
                -to_cents(existing.reduction_amount),
                -existing.points_earned,
            )?;

            db::insert_event(
                &tx,
                &Event::new(
                    "footprint_deleted",
                    ENTITY_TYPE,
                    record_id,
                    serde_json::json!({
                        "behavior_type": existing.behavior_type,
                        "record_date": existing.record_date,
                        "reduction_delta": -existing.reduction_amount,
                        "points_delta": -existing.points_earned,
                        "clamped": change.clamped,
                    }),
                    user_id,
                ),
            )?;

            tx.commit()?;

            info!(user_id, record_id, "footprint deleted");
            Ok(())
        })
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub fn get(&self, record_id: &str, user_id: &str) -> Result<FootprintRecord> {
        let conn = self.db.connect()?;
        owned_record(&conn, record_id, user_id)
    }

    /// Newest first. `page_num` is 1-based; `page_size` is clamped to the configured maximum.
    pub fn list(
        &self,
        user_id: &str,
        page_num: i64,
        page_size: i64,
        range: &DateRange,
    ) -> Result<Page<FootprintRecord>> {
        let page_num = page_num.max(1);
        let page_size = page_size.clamp(1, self.max_page_size);
        let offset = (page_num - 1).saturating_mul(page_size);

        let conn = self.db.connect()?;
        let total = db::get_record_totals(&conn, user_id, range)?.records;
        let records = db::list_footprints(&conn, user_id, range, page_size, offset)?;

        debug!(user_id, page_num, page_size, total, "listed footprints");

        Ok(Page {
            records,
            total,
            page_num,
            page_size,
        })
    }

    /// Current totals; users without any write yet have a zero aggregate.
    pub fn aggregate(&self, user_id: &str) -> Result<UserAggregate> {
        let conn = self.db.connect()?;
        Ok(db::get_aggregate(&conn, user_id)?.unwrap_or_else(|| UserAggregate::empty(user_id)))
    }

    /// Compare the stored aggregate with the sum over the user's records.
    pub fn verify_consistency(&self, user_id: &str) -> Result<ConsistencyReport> {
        let mut conn = self.db.connect()?;
        // one read transaction so both sides see the same snapshot
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

        let stored = db::get_aggregate(&tx, user_id)?.unwrap_or_else(|| UserAggregate::empty(user_id));
        let totals = db::get_record_totals(&tx, user_id, &DateRange::all())?;
        tx.commit()?;

        let recomputed_reduction = from_cents(totals.reduction_cents);
        let consistent =
            stored.points == totals.points && stored.total_reduction == recomputed_reduction;

        if !consistent {
            warn!(
                user_id,
                stored_points = stored.points,
                recomputed_points = totals.points,
                stored_reduction = %stored.total_reduction,
                recomputed_reduction = %recomputed_reduction,
                "aggregate does not match records"
            );
        }

        Ok(ConsistencyReport {
            user_id: user_id.to_string(),
            stored,
            record_count: totals.records,
            recomputed_points: totals.points,
            recomputed_reduction,
            consistent,
        })
    }

    /// Audit events for one of the caller's records, newest first
    pub fn history(&self, record_id: &str, user_id: &str) -> Result<Vec<Event>> {
        let conn = self.db.connect()?;
        let events: Vec<Event> = db::get_events_for_entity(&conn, ENTITY_TYPE, record_id)?
            .into_iter()
            .filter(|e| e.actor == user_id)
            .collect();

        if events.is_empty() {
            return Err(LedgerError::NotFoundOrForbidden);
        }
        Ok(events)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Validate and price an input against the catalog
    fn evaluate(&self, input: &FootprintInput) -> Result<(&BehaviorDefinition, Reduction)> {
        let def = self.validator.validate(&input.behavior_type, input.data_value)?;
        let reduction = ReductionCalculator::compute(input.data_value, def.coefficient).ok_or_else(|| {
            LedgerError::InvalidValue {
                behavior_type: input.behavior_type.clone(),
                value: input.data_value,
                reason: "quantity is too large",
            }
        })?;
        Ok((def, reduction))
    }
}

/// Fetch a record only if it belongs to `user_id`
fn owned_record(conn: &Connection, record_id: &str, user_id: &str) -> Result<FootprintRecord> {
    db::get_footprint(conn, record_id)?
        .filter(|r| r.user_id == user_id)
        .ok_or(LedgerError::NotFoundOrForbidden)
}

fn apply_delta(conn: &Connection, user_id: &str, delta_cents: i64, delta_points: i64) -> Result<AggregateChange> {
    let current = db::get_aggregate(conn, user_id)?.unwrap_or_else(|| UserAggregate::empty(user_id));
    let change = clamp_delta(&current, delta_cents, delta_points);

    if change.clamped {
        warn!(
            user_id,
            points = current.points,
            delta_points,
            total_reduction = %current.total_reduction,
            reduction_delta = %from_cents(delta_cents),
            "aggregate underflow clamped to zero"
        );
    }

    db::write_aggregate(conn, &change.aggregate)?;
    Ok(change)
}

fn duplicate_or_persistence(err: rusqlite::Error, record: &FootprintRecord) -> LedgerError {
    if LedgerError::is_unique_violation(&err) {
        LedgerError::DuplicateCountRecord {
            behavior_type: record.behavior_type.clone(),
            date: record.record_date,
        }
    } else {
        LedgerError::Persistence(err)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_ledger() -> (tempfile::TempDir, FootprintLedger) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("ledger.db")).unwrap();
        (dir, FootprintLedger::new(db, Arc::new(BehaviorCatalog::standard())))
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn assert_consistent(ledger: &FootprintLedger, user_id: &str) {
        let report = ledger.verify_consistency(user_id).unwrap();
        assert!(report.consistent, "aggregate drifted: {:?}", report);
    }

    #[test]
    fn test_clamp_delta() {
        let current = UserAggregate {
            user_id: "alice".to_string(),
            points: 3,
            total_reduction: dec!(0.30),
        };

        let change = clamp_delta(&current, 50, 5);
        assert!(!change.clamped);
        assert_eq!(change.aggregate.points, 8);
        assert_eq!(change.aggregate.total_reduction, dec!(0.80));

        let change = clamp_delta(&current, -89, -8);
        assert!(change.clamped);
        assert_eq!(change.aggregate.points, 0);
        assert_eq!(change.aggregate.total_reduction, dec!(0));
    }

    #[test]
    fn test_create_updates_aggregate() {
        let (_dir, ledger) = test_ledger();

        let record = ledger
            .create("alice", &FootprintInput { remark: Some("commute".into()), ..FootprintInput::new("BUS", dec!(10), day(1)) })
            .unwrap();

        assert_eq!(record.behavior_name, "Bus ride");
        assert_eq!(record.coefficient, dec!(0.089));
        assert_eq!(record.reduction_amount, dec!(0.89));
        assert_eq!(record.points_earned, 8);
        assert_eq!(record.remark.as_deref(), Some("commute"));

        let agg = ledger.aggregate("alice").unwrap();
        assert_eq!(agg.points, 8);
        assert_eq!(agg.total_reduction, dec!(0.89));
        assert_consistent(&ledger, "alice");
    }

    #[test]
    fn test_invalid_create_does_not_mutate() {
        let (_dir, ledger) = test_ledger();

        let err = ledger.create("alice", &FootprintInput::new("BUS", dec!(0), day(1))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidValue { .. }));

        let err = ledger.create("alice", &FootprintInput::new("JETPACK", dec!(1), day(1))).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidBehaviorType(_)));

        assert_eq!(ledger.aggregate("alice").unwrap(), UserAggregate::empty("alice"));
        assert_eq!(ledger.list("alice", 1, 10, &DateRange::all()).unwrap().total, 0);
    }

    #[test]
    fn test_update_applies_difference() {
        let (_dir, ledger) = test_ledger();

        let record = ledger.create("alice", &FootprintInput::new("BUS", dec!(5), day(1))).unwrap();
        assert_eq!(record.reduction_amount, dec!(0.45));
        assert_eq!(record.points_earned, 4);

        let updated = ledger
            .update(&record.id, "alice", &FootprintInput::new("BUS", dec!(10), day(2)))
            .unwrap();
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.created_at, record.created_at);
        assert_eq!(updated.reduction_amount, dec!(0.89));
        assert_eq!(updated.points_earned, 8);
        assert_eq!(updated.record_date, day(2));

        let agg = ledger.aggregate("alice").unwrap();
        assert_eq!(agg.points, 8);
        assert_eq!(agg.total_reduction, dec!(0.89));
        assert_consistent(&ledger, "alice");
    }

    #[test]
    fn test_update_can_change_behavior() {
        let (_dir, ledger) = test_ledger();

        let record = ledger.create("alice", &FootprintInput::new("SAVE_ELEC", dec!(2), day(1))).unwrap();
        let updated = ledger
            .update(&record.id, "alice", &FootprintInput::new("VEGETARIAN", dec!(1), day(1)))
            .unwrap();

        assert_eq!(updated.behavior_name, "Vegetarian meal");
        assert_eq!(updated.coefficient, dec!(0.5));
        assert_eq!(ledger.aggregate("alice").unwrap().points, 5);
        assert_consistent(&ledger, "alice");
    }

    #[test]
    fn test_foreign_record_is_not_found() {
        let (_dir, ledger) = test_ledger();
        let record = ledger.create("alice", &FootprintInput::new("BUS", dec!(10), day(1))).unwrap();

        let input = FootprintInput::new("BUS", dec!(100), day(1));
        assert!(matches!(
            ledger.update(&record.id, "mallory", &input),
            Err(LedgerError::NotFoundOrForbidden)
        ));
        assert!(matches!(
            ledger.delete(&record.id, "mallory"),
            Err(LedgerError::NotFoundOrForbidden)
        ));
        assert!(matches!(
            ledger.get(&record.id, "mallory"),
            Err(LedgerError::NotFoundOrForbidden)
        ));
        assert!(matches!(
            ledger.delete("no-such-record", "alice"),
            Err(LedgerError::NotFoundOrForbidden)
        ));

        assert_eq!(ledger.get(&record.id, "alice").unwrap().data_value, dec!(10));
        assert_eq!(ledger.aggregate("mallory").unwrap().points, 0);
    }

    #[test]
    fn test_invalid_update_leaves_record_untouched() {
        let (_dir, ledger) = test_ledger();
        let record = ledger.create("alice", &FootprintInput::new("RECYCLE", dec!(2), day(1))).unwrap();

        let err = ledger
            .update(&record.id, "alice", &FootprintInput::new("RECYCLE", dec!(2.5), day(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidValue { .. }));

        assert_eq!(ledger.get(&record.id, "alice").unwrap(), record);
        assert_consistent(&ledger, "alice");
    }

    #[test]
    fn test_delete_restores_aggregate() {
        let (_dir, ledger) = test_ledger();

        let keep = ledger.create("alice", &FootprintInput::new("SUBWAY", dec!(20), day(1))).unwrap();
        let before = ledger.aggregate("alice").unwrap();

        let record = ledger.create("alice", &FootprintInput::new("BUS", dec!(10), day(1))).unwrap();
        ledger.delete(&record.id, "alice").unwrap();

        assert_eq!(ledger.aggregate("alice").unwrap(), before);
        assert!(matches!(ledger.get(&record.id, "alice"), Err(LedgerError::NotFoundOrForbidden)));
        assert!(ledger.get(&keep.id, "alice").is_ok());
        assert_consistent(&ledger, "alice");
    }

    #[test]
    fn test_delete_clamps_drifted_aggregate() {
        let (_dir, ledger) = test_ledger();
        let record = ledger.create("alice", &FootprintInput::new("BUS", dec!(10), day(1))).unwrap();

        // simulate an aggregate that was reset out of band
        let conn = ledger.database().connect().unwrap();
        db::write_aggregate(&conn, &UserAggregate::empty("alice")).unwrap();

        ledger.delete(&record.id, "alice").unwrap();
        let agg = ledger.aggregate("alice").unwrap();
        assert_eq!(agg.points, 0);
        assert_eq!(agg.total_reduction, dec!(0));

        let events = ledger.history(&record.id, "alice").unwrap();
        assert_eq!(events[0].event_type, "footprint_deleted");
        assert_eq!(events[0].data["clamped"], true);
    }

    #[test]
    fn test_update_clamps_drifted_aggregate() {
        let (_dir, ledger) = test_ledger();
        let record = ledger.create("alice", &FootprintInput::new("BUS", dec!(10), day(1))).unwrap();

        let conn = ledger.database().connect().unwrap();
        db::write_aggregate(&conn, &UserAggregate::empty("alice")).unwrap();

        // 10 km → 5 km shrinks by (0.44, 4) against a zero aggregate
        ledger
            .update(&record.id, "alice", &FootprintInput::new("BUS", dec!(5), day(1)))
            .unwrap();
        let agg = ledger.aggregate("alice").unwrap();
        assert_eq!(agg.points, 0);
        assert_eq!(agg.total_reduction, dec!(0.00));

        let events = ledger.history(&record.id, "alice").unwrap();
        assert_eq!(events[0].event_type, "footprint_updated");
        assert_eq!(events[0].data["clamped"], true);
        assert_eq!(events[0].data["points_delta"], -4);
    }

    #[test]
    fn test_user_locks_released_after_writes() {
        let (_dir, ledger) = test_ledger();
        let record = ledger.create("alice", &FootprintInput::new("BUS", dec!(10), day(1))).unwrap();
        ledger.create("bob", &FootprintInput::new("WALK", dec!(2), day(1))).unwrap();
        ledger.delete(&record.id, "alice").unwrap();

        assert!(ledger.user_locks.is_empty());
    }

    #[test]
    fn test_input_json_is_camel_case() {
        let input: FootprintInput = serde_json::from_value(serde_json::json!({
            "behaviorType": "BUS",
            "dataValue": "12.5",
            "recordDate": "2026-03-01",
        }))
        .unwrap();
        assert_eq!(input, FootprintInput::new("BUS", dec!(12.5), day(1)));
    }

    #[test]
    fn test_count_behavior_once_per_day() {
        let (_dir, ledger) = test_ledger();

        ledger.create("alice", &FootprintInput::new("VEGETARIAN", dec!(1), day(1))).unwrap();
        let err = ledger
            .create("alice", &FootprintInput::new("VEGETARIAN", dec!(2), day(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateCountRecord { .. }));

        // moving another record onto the taken slot is rejected too
        let other = ledger.create("alice", &FootprintInput::new("VEGETARIAN", dec!(1), day(2))).unwrap();
        let err = ledger
            .update(&other.id, "alice", &FootprintInput::new("VEGETARIAN", dec!(1), day(1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateCountRecord { .. }));

        assert_eq!(ledger.aggregate("alice").unwrap().points, 10);
        assert_consistent(&ledger, "alice");
    }

    #[test]
    fn test_list_paging() {
        let (_dir, ledger) = test_ledger();
        for d in 1..=5 {
            ledger.create("alice", &FootprintInput::new("WALK", dec!(1), day(d))).unwrap();
        }
        ledger.create("bob", &FootprintInput::new("WALK", dec!(1), day(1))).unwrap();

        let page = ledger.list("alice", 1, 2, &DateRange::all()).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0].record_date, day(5));
        assert_eq!(page.records[1].record_date, day(4));

        let last = ledger.list("alice", 3, 2, &DateRange::all()).unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.records[0].record_date, day(1));

        // out-of-range page arguments are normalized
        let page = ledger.list("alice", 0, 0, &DateRange::all()).unwrap();
        assert_eq!(page.page_num, 1);
        assert_eq!(page.page_size, 1);

        let ranged = ledger.list("alice", 1, 10, &DateRange::between(day(2), day(3))).unwrap();
        assert_eq!(ranged.total, 2);
    }

    #[test]
    fn test_history_records_each_mutation() {
        let (_dir, ledger) = test_ledger();
        let record = ledger.create("alice", &FootprintInput::new("BUS", dec!(5), day(1))).unwrap();
        ledger
            .update(&record.id, "alice", &FootprintInput::new("BUS", dec!(10), day(1)))
            .unwrap();

        let events = ledger.history(&record.id, "alice").unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["footprint_updated", "footprint_created"]);
        assert_eq!(events[0].data["points_delta"], 4);

        assert!(matches!(
            ledger.history(&record.id, "mallory"),
            Err(LedgerError::NotFoundOrForbidden)
        ));
    }

    #[test]
    fn test_concurrent_writes_same_user() {
        let (_dir, ledger) = test_ledger();
        let seed: Vec<FootprintRecord> = (1..=4)
            .map(|d| ledger.create("alice", &FootprintInput::new("BUS", dec!(5), day(d))).unwrap())
            .collect();

        std::thread::scope(|s| {
            for d in 10..18 {
                let ledger = &ledger;
                s.spawn(move || {
                    ledger
                        .create("alice", &FootprintInput::new("SAVE_ELEC", dec!(1.5), day(d)))
                        .unwrap();
                });
            }
            for record in &seed[..2] {
                let ledger = &ledger;
                s.spawn(move || {
                    ledger
                        .update(&record.id, "alice", &FootprintInput::new("BUS", dec!(10), record.record_date))
                        .unwrap();
                });
            }
            for record in &seed[2..] {
                let ledger = &ledger;
                s.spawn(move || ledger.delete(&record.id, "alice").unwrap());
            }
            let ledger = &ledger;
            s.spawn(move || {
                ledger.create("bob", &FootprintInput::new("WALK", dec!(3), day(1))).unwrap();
            });
        });

        // 8 × (1.18, 11) + 2 × (0.89, 8)
        let agg = ledger.aggregate("alice").unwrap();
        assert_eq!(agg.points, 8 * 11 + 2 * 8);
        assert_eq!(agg.total_reduction, dec!(11.22));
        assert_consistent(&ledger, "alice");
        assert_consistent(&ledger, "bob");
    }
}
