// Carbon Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod catalog;     // Behavior catalog: codes, units, coefficients
pub mod validator;   // Input validation against the catalog
pub mod calculator;  // Reduction + points arithmetic
pub mod db;          // SQLite storage
pub mod ledger;      // Record CRUD + per-user aggregate
pub mod checkin;     // Daily check-in, streaks, calendar
pub mod statistics;  // Totals, grouping, CSV export
pub mod error;
pub mod config;
pub mod services;
pub mod telemetry;

// Re-export commonly used types
pub use catalog::{BehaviorCatalog, BehaviorDefinition, BehaviorSummary, UnitClass};
pub use validator::LedgerValidator;
pub use calculator::{Reduction, ReductionCalculator};
pub use db::{Database, DateRange, Event, FootprintRecord, UserAggregate};
pub use ledger::{ConsistencyReport, FootprintInput, FootprintLedger, Page};
pub use checkin::{CalendarDay, CheckinEngine, CheckinStats};
pub use statistics::{BehaviorTotals, DailyTotals, StatisticsAggregator, Totals};
pub use error::{LedgerError, Result};
pub use config::Config;
pub use services::Services;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
