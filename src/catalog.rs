// 🌱 Behavior Catalog - Coefficients as Data
// Static table of low-carbon behaviors: code → name, unit class, coefficient

use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// ============================================================================
// UNIT CLASS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitClass {
    /// Discrete occurrences: integer quantity ≥ 1, eligible for check-in
    Count,
    /// Measured quantity (km, kWh, ...): decimal ≥ 0.01
    Continuous,
}

impl UnitClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitClass::Count => "COUNT",
            UnitClass::Continuous => "CONTINUOUS",
        }
    }

    pub fn parse(s: &str) -> Option<UnitClass> {
        match s {
            "COUNT" => Some(UnitClass::Count),
            "CONTINUOUS" => Some(UnitClass::Continuous),
            _ => None,
        }
    }
}

// ============================================================================
// BEHAVIOR DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorDefinition {
    /// Stable code (e.g., "BUS")
    pub code: String,

    /// Human-readable name, snapshotted onto each record
    pub display_name: String,

    /// Unit label shown to users (km, kWh, times)
    pub unit: String,

    pub unit_class: UnitClass,

    /// kg CO2e reduced per unit
    pub coefficient: Decimal,

    #[serde(default)]
    pub description: String,

    /// Hidden behaviors still resolve through lookup but are not offered to clients
    #[serde(default = "default_listed")]
    pub listed: bool,
}

fn default_listed() -> bool {
    true
}

impl BehaviorDefinition {
    pub fn new(
        code: impl Into<String>,
        display_name: impl Into<String>,
        unit: impl Into<String>,
        unit_class: UnitClass,
        coefficient: Decimal,
    ) -> Self {
        BehaviorDefinition {
            code: code.into(),
            display_name: display_name.into(),
            unit: unit.into(),
            unit_class,
            coefficient,
            description: String::new(),
            listed: true,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.listed = false;
        self
    }
}

/// Client-facing entry returned by `list_all`
#[derive(Debug, Clone, Serialize)]
pub struct BehaviorSummary {
    pub code: String,
    pub name: String,
    pub unit: String,
    pub unit_class: UnitClass,
    pub coefficient: Decimal,
    pub description: String,
}

// ============================================================================
// BEHAVIOR CATALOG
// ============================================================================

/// Immutable lookup table, built once at startup and shared via `Arc`.
#[derive(Debug, Clone)]
pub struct BehaviorCatalog {
    definitions: Vec<BehaviorDefinition>,
    index: HashMap<String, usize>,
}

impl BehaviorCatalog {
    /// Build a catalog, rejecting duplicate codes and negative coefficients.
    pub fn from_definitions(definitions: Vec<BehaviorDefinition>) -> Result<Self> {
        let mut seen = HashMap::with_capacity(definitions.len());

        for (pos, def) in definitions.iter().enumerate() {
            if def.code.trim().is_empty() {
                bail!("behavior at position {} has an empty code", pos);
            }
            if def.coefficient < Decimal::ZERO {
                bail!("behavior {} has a negative coefficient", def.code);
            }
            if seen.insert(def.code.as_str(), pos).is_some() {
                bail!("duplicate behavior code: {}", def.code);
            }
        }

        Ok(Self::build(definitions))
    }

    fn build(definitions: Vec<BehaviorDefinition>) -> Self {
        let index = definitions
            .iter()
            .enumerate()
            .map(|(pos, def)| (def.code.clone(), pos))
            .collect();
        BehaviorCatalog { definitions, index }
    }

    /// Load catalog from JSON file (array of definitions)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read catalog file: {:?}", path.as_ref()))?;

        let definitions: Vec<BehaviorDefinition> =
            serde_json::from_str(&content).context("Failed to parse catalog JSON")?;

        Self::from_definitions(definitions)
            .map_err(|e| anyhow!("Invalid catalog {:?}: {}", path.as_ref(), e))
    }

    /// Built-in table of behaviors and their reduction coefficients
    pub fn standard() -> Self {
        let definitions = vec![
            // Transport (kg CO2e / km)
            BehaviorDefinition::new("BUS", "Bus ride", "km", UnitClass::Continuous, Decimal::new(89, 3))
                .with_description("Took the bus instead of driving"),
            BehaviorDefinition::new("SUBWAY", "Subway ride", "km", UnitClass::Continuous, Decimal::new(55, 3))
                .with_description("Took the subway instead of driving"),
            BehaviorDefinition::new("BIKE", "Cycling", "km", UnitClass::Continuous, Decimal::ZERO)
                .with_description("Rode a bicycle"),
            BehaviorDefinition::new("WALK", "Walking", "km", UnitClass::Continuous, Decimal::ZERO)
                .with_description("Walked"),
            BehaviorDefinition::new("CAR", "Car trip", "km", UnitClass::Continuous, Decimal::new(271, 3))
                .hidden(),
            BehaviorDefinition::new("ELECTRIC_CAR", "Electric vehicle trip", "km", UnitClass::Continuous, Decimal::new(15, 2))
                .with_description("Drove an electric vehicle"),
            // Energy (kg CO2e / kWh, / t)
            BehaviorDefinition::new("SAVE_ELEC", "Electricity saved", "kWh", UnitClass::Continuous, Decimal::new(785, 3))
                .with_description("Electricity consumption avoided"),
            BehaviorDefinition::new("SAVE_WATER", "Water saved", "t", UnitClass::Continuous, Decimal::new(194, 3))
                .with_description("Water consumption avoided"),
            // Food (kg CO2e / occurrence)
            BehaviorDefinition::new("VEGETARIAN", "Vegetarian meal", "times", UnitClass::Count, Decimal::new(5, 1))
                .with_description("Chose a vegetarian meal"),
            BehaviorDefinition::new("REDUCE_WASTE", "Food waste avoided", "times", UnitClass::Count, Decimal::new(3, 1))
                .with_description("Finished the plate, no food wasted"),
            // Other
            BehaviorDefinition::new("RECYCLE", "Waste sorting", "times", UnitClass::Count, Decimal::new(2, 1))
                .with_description("Sorted household waste for recycling"),
            BehaviorDefinition::new("REUSE_BAG", "Reusable bag", "times", UnitClass::Count, Decimal::new(1, 1))
                .with_description("Shopped with a reusable bag"),
        ];

        Self::build(definitions)
    }

    pub fn lookup(&self, code: &str) -> Option<&BehaviorDefinition> {
        self.index.get(code).map(|&pos| &self.definitions[pos])
    }

    /// Listed behaviors in table order, keyed by code
    pub fn list_all(&self) -> Vec<(String, BehaviorSummary)> {
        self.definitions
            .iter()
            .filter(|def| def.listed)
            .map(|def| {
                (
                    def.code.clone(),
                    BehaviorSummary {
                        code: def.code.clone(),
                        name: def.display_name.clone(),
                        unit: def.unit.clone(),
                        unit_class: def.unit_class,
                        coefficient: def.coefficient,
                        description: def.description.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for BehaviorCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// TESTS
// ============================================================================
