// 📐 Ledger Validator
// Checks a proposed record against the catalog before anything is written

use crate::catalog::{BehaviorCatalog, BehaviorDefinition, UnitClass};
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Smallest quantity accepted for continuous behaviors
pub const MIN_CONTINUOUS_VALUE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Clone)]
pub struct LedgerValidator {
    catalog: Arc<BehaviorCatalog>,
}

impl LedgerValidator {
    pub fn new(catalog: Arc<BehaviorCatalog>) -> Self {
        LedgerValidator { catalog }
    }

    /// Resolve the behavior and check the quantity against its unit class.
    ///
    /// Returns the resolved definition so callers can snapshot name and
    /// coefficient without a second lookup.
    pub fn validate(&self, behavior_type: &str, data_value: Decimal) -> Result<&BehaviorDefinition> {
        let def = self
            .catalog
            .lookup(behavior_type)
            .ok_or_else(|| LedgerError::InvalidBehaviorType(behavior_type.to_string()))?;

        let invalid = |reason| LedgerError::InvalidValue {
            behavior_type: behavior_type.to_string(),
            value: data_value,
            reason,
        };

        match def.unit_class {
            UnitClass::Count => {
                if data_value < Decimal::ONE {
                    return Err(invalid("count must be at least 1"));
                }
                if !data_value.fract().is_zero() {
                    return Err(invalid("count must be a whole number"));
                }
            }
            UnitClass::Continuous => {
                if data_value < MIN_CONTINUOUS_VALUE {
                    return Err(invalid("quantity must be at least 0.01"));
                }
            }
        }

        Ok(def)
    }

    pub fn catalog(&self) -> &BehaviorCatalog {
        &self.catalog
    }
}
