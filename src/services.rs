// 🔌 Service wiring
// Builds the catalog, ledger, check-in engine and statistics from one Config

use crate::catalog::BehaviorCatalog;
use crate::checkin::CheckinEngine;
use crate::config::Config;
use crate::db::Database;
use crate::ledger::FootprintLedger;
use crate::statistics::StatisticsAggregator;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Everything a caller (CLI or HTTP handler) needs, cheap to clone
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub catalog: Arc<BehaviorCatalog>,
    pub ledger: Arc<FootprintLedger>,
    pub checkin: Arc<CheckinEngine>,
    pub statistics: Arc<StatisticsAggregator>,
}

impl Services {
    pub fn from_config(config: Config) -> Result<Self> {
        let catalog = Arc::new(config.load_catalog()?);

        let db = Database::open(&config.database_path)
            .with_context(|| format!("Failed to open database: {:?}", config.database_path))?;

        info!(
            database = ?config.database_path,
            behaviors = catalog.len(),
            "ledger ready"
        );

        let ledger = Arc::new(
            FootprintLedger::new(db.clone(), catalog.clone()).with_max_page_size(config.max_page_size),
        );
        let checkin = Arc::new(CheckinEngine::new(ledger.clone()));
        let statistics =
            Arc::new(StatisticsAggregator::new(db).with_window_days(config.stats_window_days));

        Ok(Services {
            config: Arc::new(config),
            catalog,
            ledger,
            checkin,
            statistics,
        })
    }
}
