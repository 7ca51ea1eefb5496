use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;

pub mod audit;
pub mod classifier;
pub mod error;
pub mod food_db;
pub mod logging;
pub mod matching;
pub mod ocr;
mod paths;
pub mod pipeline;
mod resource;
pub mod settings;
#[cfg(test)]
mod test_util;

pub use audit::{FilterLog, Rejection};
pub use error::ScanError;
pub use food_db::{FoodRecord, FoodTable, NutrientProfile};
pub use pipeline::{map_items_from_image_bytes, Pipeline, ScanResult};
pub use settings::Settings;

/// Minimum score for `--lookup` and `--estimate`.
const LOOKUP_MIN_SCORE: u32 = 60;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub image_path: Option<String>,
    pub food_db: Option<String>,
    pub threshold: Option<u32>,
    pub settings_path: Option<String>,
    pub lookup: Option<String>,
    pub search: Option<String>,
    pub estimate: Vec<String>,
    pub pretty: bool,
}

/// Runs one CLI invocation and returns the JSON to print. `input` holds the
/// image bytes read from stdin when no `--image` is given.
pub fn run(config: Config, input: Option<Vec<u8>>) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let threshold = config.threshold.unwrap_or(settings.pipeline.auto_accept_score);

    let pipeline = match config.food_db.as_deref() {
        Some(path) => {
            let table = FoodTable::load(Path::new(path))?;
            Pipeline::with_table(settings, table)?
        }
        None => Pipeline::new(settings)?,
    };

    if let Some(name) = config.lookup.as_deref() {
        let found = pipeline.closest_food(name, LOOKUP_MIN_SCORE);
        return to_json(&found, config.pretty);
    }
    if let Some(query) = config.search.as_deref() {
        return to_json(&pipeline.search_foods(query), config.pretty);
    }
    if !config.estimate.is_empty() {
        let summary = pipeline.estimate_items(&config.estimate, LOOKUP_MIN_SCORE);
        return to_json(&summary, config.pretty);
    }

    let bytes = match config.image_path.as_deref() {
        Some(path) => fs::read(path).with_context(|| format!("failed to read image: {}", path))?,
        None => input.unwrap_or_default(),
    };
    if bytes.is_empty() {
        return Err(anyhow!("no image given (use --image or pipe bytes on stdin)"));
    }

    let result = map_items_from_image_bytes(&pipeline, &bytes, threshold)?;
    to_json(&result, config.pretty)
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(output)
}
