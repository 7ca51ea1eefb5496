//! Food-composition table.
//!
//! Records are read from a JSON array. Column names vary between exports
//! (`calories`, `energy_kcal`, `Energy_kJ`, `protein_g`, ...), so nutrient
//! values are resolved through alias rules rather than a fixed schema.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::ScanError;

const KJ_PER_KCAL: f64 = 4.184;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientProfile {
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub fiber: f64,
    pub sugar: f64,
}

impl NutrientProfile {
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            calories: self.calories * factor,
            protein: self.protein * factor,
            carbs: self.carbs * factor,
            fat: self.fat * factor,
            fiber: self.fiber * factor,
            sugar: self.sugar * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodRecord {
    pub item: String,
    #[serde(skip)]
    pub norm: String,
    pub restaurant: Option<String>,
    pub nutrients: NutrientProfile,
    pub source: Option<String>,
}

impl FoodRecord {
    pub fn new(item: impl Into<String>, nutrients: NutrientProfile) -> Self {
        let item = item.into();
        let norm = normalize_name(&item);
        Self {
            item,
            norm,
            restaurant: None,
            nutrients,
            source: None,
        }
    }

    pub fn with_restaurant(mut self, restaurant: impl Into<String>) -> Self {
        self.restaurant = Some(restaurant.into());
        self
    }
}

/// Immutable after load; shared by reference across requests.
#[derive(Debug, Clone, Default)]
pub struct FoodTable {
    records: Vec<FoodRecord>,
}

impl FoodTable {
    pub fn from_records(records: Vec<FoodRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: &Path) -> Result<Self, ScanError> {
        Self::load_json(path).map_err(|err| ScanError::FoodTable(format!("{:#}", err)))
    }

    /// A missing file yields an empty table: matching then degrades to
    /// pass-through rows instead of failing every scan.
    pub fn load_or_empty(path: Option<&Path>) -> Result<Self, ScanError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                warn!("food table not found at {}", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    fn load_json(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let table = Self::from_json_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!("loaded {} foods from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        let rows = value
            .as_array()
            .ok_or_else(|| anyhow!("food table must be a JSON array of records"))?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(object) = row.as_object() else {
                continue;
            };
            if let Some(record) = record_from_object(object) {
                records.push(record);
            }
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FoodRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[FoodRecord] {
        &self.records
    }

    /// Indices of the rows tagged with `restaurant` (case-insensitive).
    pub fn restaurant_rows(&self, restaurant: &str) -> Vec<usize> {
        let wanted = restaurant.trim().to_lowercase();
        if wanted.is_empty() {
            return Vec::new();
        }
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                record
                    .restaurant
                    .as_deref()
                    .map(|name| name.trim().to_lowercase() == wanted)
                    .unwrap_or(false)
            })
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Lowercase, keep `[a-z0-9 ]`, trim.
pub fn normalize_name(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || *ch == ' ')
        .collect::<String>()
        .trim()
        .to_string()
}

fn record_from_object(object: &Map<String, Value>) -> Option<FoodRecord> {
    let name = ["item", "food_name", "description", "name"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())?;

    let mut record = FoodRecord::new(name, resolve_nutrients(object));
    record.restaurant = string_field(object, "restaurant");
    record.source = string_field(object, "source");
    Some(record)
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    }
    .filter(|value| value.is_finite())
}

#[derive(Default)]
struct Resolved {
    calories: Option<f64>,
    protein: Option<f64>,
    carbs: Option<f64>,
    fat: Option<f64>,
    fiber: Option<f64>,
    sugar: Option<f64>,
}

fn resolve_nutrients(object: &Map<String, Value>) -> NutrientProfile {
    let mut resolved = Resolved::default();

    // Canonical column names win over aliases.
    for (key, slot) in [
        ("calories", &mut resolved.calories),
        ("protein", &mut resolved.protein),
        ("carbs", &mut resolved.carbs),
        ("fat", &mut resolved.fat),
        ("fiber", &mut resolved.fiber),
        ("sugar", &mut resolved.sugar),
    ] {
        *slot = object.get(key).and_then(numeric);
    }

    for (key, value) in object {
        let Some(amount) = numeric(value) else {
            continue;
        };
        let key = key.to_lowercase();
        if ["energy_kcal", "kcal", "calorie"].iter().any(|s| key.contains(s)) {
            resolved.calories.get_or_insert(amount);
        } else if key.contains("energy_kj") {
            resolved.calories.get_or_insert(amount / KJ_PER_KCAL);
        } else if key.contains("protein") && !key.contains("non") {
            resolved.protein.get_or_insert(amount);
        } else if key.contains("fiber") || key.contains("fibre") {
            resolved.fiber.get_or_insert(amount);
        } else if key.contains("sugar") {
            resolved.sugar.get_or_insert(amount);
        } else if (key.contains("carbohydrate") || key.contains("carb") || key == "cho")
            && !key.contains("fiber")
        {
            resolved.carbs.get_or_insert(amount);
        } else if key.contains("fat") && !key.contains("saturated") && !key.contains("trans") {
            resolved.fat.get_or_insert(amount);
        }
    }

    if resolved.carbs.is_none() {
        if let (Some(kcal), Some(protein), Some(fat)) =
            (resolved.calories, resolved.protein, resolved.fat)
        {
            let estimate = (kcal - protein * 4.0 - fat * 9.0) / 4.0;
            resolved.carbs = Some((estimate.max(0.0) * 1000.0).round() / 1000.0);
        }
    }

    NutrientProfile {
        calories: resolved.calories.unwrap_or(0.0),
        protein: resolved.protein.unwrap_or(0.0),
        carbs: resolved.carbs.unwrap_or(0.0),
        fat: resolved.fat.unwrap_or(0.0),
        fiber: resolved.fiber.unwrap_or(0.0),
        sugar: resolved.sugar.unwrap_or(0.0),
    }
}
