use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub pipeline: PipelineSettings,
    pub ocr: OcrSettings,
    pub matching: MatchingSettings,
    pub model: ModelSettings,
    pub vocabulary: Vocabulary,
    /// Directory that relative paths in the settings resolve against.
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub auto_accept_score: u32,
    pub min_acceptance_probability: f64,
    pub min_alpha_ratio: f64,
    pub min_word_confidence: f32,
    pub restaurant_scan_lines: usize,
    pub preview_chars: usize,
    pub price_column_min_count: usize,
    pub column_tolerance_px: u32,
    pub food_db: String,
    pub filter_log: String,
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub languages: String,
    pub binarize: bool,
    pub max_side: u32,
    pub primary: bool,
    pub fallback: bool,
}

#[derive(Debug, Clone)]
pub struct MatchingSettings {
    pub fuzzy_limit: usize,
    pub semantic_trigger_score: u32,
    pub semantic_top_k: usize,
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub model: String,
    pub embeddings: String,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub artifacts_dir: String,
    pub default_probability: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pub noise_words: Vec<String>,
    pub food_triggers: Vec<String>,
    pub spell_fixes: BTreeMap<String, String>,
    pub portions: Vec<PortionTrigger>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PortionTrigger {
    pub keyword: String,
    pub multiplier: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            auto_accept_score: 90,
            min_acceptance_probability: 0.75,
            min_alpha_ratio: 0.45,
            min_word_confidence: 8.0,
            restaurant_scan_lines: 8,
            preview_chars: 500,
            price_column_min_count: 1,
            column_tolerance_px: 0,
            food_db: "foods_data.json".to_string(),
            filter_log: "filtered_lines.log".to_string(),
        }
    }
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            languages: "eng".to_string(),
            binarize: true,
            max_side: 1600,
            primary: true,
            fallback: true,
        }
    }
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            fuzzy_limit: 6,
            semantic_trigger_score: 80,
            semantic_top_k: 5,
            model: String::new(),
            embeddings: String::new(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            artifacts_dir: "line_model_artifacts".to_string(),
            default_probability: 0.6,
        }
    }
}

impl Default for Settings {
    /// Built-in defaults, including the vocabulary tables shipped in
    /// `settings.toml`.
    fn default() -> Self {
        let mut settings = Self {
            pipeline: PipelineSettings::default(),
            ocr: OcrSettings::default(),
            matching: MatchingSettings::default(),
            model: ModelSettings::default(),
            vocabulary: Vocabulary::default(),
            base_dir: paths::base_dir(),
        };
        let builtin: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).expect("embedded settings.toml");
        settings.merge(builtin);
        settings
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    pipeline: Option<PipelineFile>,
    ocr: Option<OcrFile>,
    matching: Option<MatchingFile>,
    model: Option<ModelFile>,
    vocabulary: Option<VocabularyFile>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineFile {
    auto_accept_score: Option<u32>,
    min_acceptance_probability: Option<f64>,
    min_alpha_ratio: Option<f64>,
    min_word_confidence: Option<f32>,
    restaurant_scan_lines: Option<usize>,
    preview_chars: Option<usize>,
    price_column_min_count: Option<usize>,
    column_tolerance_px: Option<u32>,
    food_db: Option<String>,
    filter_log: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrFile {
    languages: Option<String>,
    binarize: Option<bool>,
    max_side: Option<u32>,
    primary: Option<bool>,
    fallback: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct MatchingFile {
    fuzzy_limit: Option<usize>,
    semantic_trigger_score: Option<u32>,
    semantic_top_k: Option<usize>,
    model: Option<String>,
    embeddings: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelFile {
    artifacts_dir: Option<String>,
    default_probability: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct VocabularyFile {
    noise_words: Option<Vec<String>>,
    food_triggers: Option<Vec<String>>,
    spell_fixes: Option<BTreeMap<String, String>>,
    portions: Option<Vec<PortionTrigger>>,
}

/// Loads settings from the default locations, then `extra_path` if given.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    load_settings_from(&paths::base_dir(), extra_path)
}

/// Same as [`load_settings`] with an explicit base directory. Later files
/// override earlier ones key by key.
pub fn load_settings_from(base_dir: &Path, extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings {
        base_dir: base_dir.to_path_buf(),
        ..Settings::default()
    };

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    let home_settings = if base_dir == paths::base_dir() {
        paths::settings_file()
    } else {
        base_dir.join("settings.toml")
    };
    ordered_paths.push(home_settings);
    ordered_paths.push(base_dir.join("settings.local.toml"));

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content).with_context(|| {
                format!("failed to parse settings: {}", path.display())
            })?;
        }
    }

    Ok(settings)
}

impl Settings {
    /// Merges a TOML document on top of the current values.
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    pub fn food_db_path(&self) -> Option<PathBuf> {
        paths::resolve_configured(&self.pipeline.food_db, &self.base_dir)
    }

    pub fn filter_log_path(&self) -> Option<PathBuf> {
        paths::resolve_configured(&self.pipeline.filter_log, &self.base_dir)
    }

    pub fn model_dir(&self) -> Option<PathBuf> {
        paths::resolve_configured(&self.model.artifacts_dir, &self.base_dir)
    }

    pub fn sentence_model_dir(&self) -> Option<PathBuf> {
        paths::resolve_configured(&self.matching.model, &self.base_dir)
    }

    pub fn embeddings_path(&self) -> Option<PathBuf> {
        paths::resolve_configured(&self.matching.embeddings, &self.base_dir)
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(pipeline) = incoming.pipeline {
            let target = &mut self.pipeline;
            if let Some(score) = pipeline.auto_accept_score {
                target.auto_accept_score = score.min(100);
            }
            if let Some(value) = pipeline.min_acceptance_probability {
                target.min_acceptance_probability = value.clamp(0.0, 1.0);
            }
            if let Some(value) = pipeline.min_alpha_ratio {
                target.min_alpha_ratio = value.clamp(0.0, 1.0);
            }
            if let Some(value) = pipeline.min_word_confidence {
                target.min_word_confidence = value;
            }
            if let Some(lines) = pipeline.restaurant_scan_lines {
                target.restaurant_scan_lines = lines;
            }
            if let Some(chars) = pipeline.preview_chars {
                if chars > 0 {
                    target.preview_chars = chars;
                }
            }
            if let Some(count) = pipeline.price_column_min_count {
                target.price_column_min_count = count.max(1);
            }
            if let Some(px) = pipeline.column_tolerance_px {
                target.column_tolerance_px = px;
            }
            if let Some(path) = pipeline.food_db {
                target.food_db = path;
            }
            if let Some(path) = pipeline.filter_log {
                target.filter_log = path;
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = ocr.languages {
                if !languages.trim().is_empty() {
                    self.ocr.languages = languages;
                }
            }
            if let Some(binarize) = ocr.binarize {
                self.ocr.binarize = binarize;
            }
            if let Some(max_side) = ocr.max_side {
                if max_side > 0 {
                    self.ocr.max_side = max_side;
                }
            }
            if let Some(primary) = ocr.primary {
                self.ocr.primary = primary;
            }
            if let Some(fallback) = ocr.fallback {
                self.ocr.fallback = fallback;
            }
        }
        if let Some(matching) = incoming.matching {
            if let Some(limit) = matching.fuzzy_limit {
                if limit > 0 {
                    self.matching.fuzzy_limit = limit;
                }
            }
            if let Some(score) = matching.semantic_trigger_score {
                self.matching.semantic_trigger_score = score.min(100);
            }
            if let Some(top_k) = matching.semantic_top_k {
                if top_k > 0 {
                    self.matching.semantic_top_k = top_k;
                }
            }
            if let Some(dir) = matching.model {
                self.matching.model = dir;
            }
            if let Some(path) = matching.embeddings {
                self.matching.embeddings = path;
            }
        }
        if let Some(model) = incoming.model {
            if let Some(dir) = model.artifacts_dir {
                self.model.artifacts_dir = dir;
            }
            if let Some(prob) = model.default_probability {
                self.model.default_probability = prob.clamp(0.0, 1.0);
            }
        }
        if let Some(vocabulary) = incoming.vocabulary {
            if let Some(words) = vocabulary.noise_words {
                self.vocabulary.noise_words = words;
            }
            if let Some(triggers) = vocabulary.food_triggers {
                self.vocabulary.food_triggers = triggers;
            }
            if let Some(fixes) = vocabulary.spell_fixes {
                for (key, value) in fixes {
                    self.vocabulary.spell_fixes.insert(key.to_lowercase(), value);
                }
            }
            if let Some(portions) = vocabulary.portions {
                self.vocabulary.portions = portions;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_settings_parse() {
        let parsed: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).expect("parse builtin");
        assert!(parsed.vocabulary.is_some());
    }

    #[test]
    fn defaults_carry_vocabulary() {
        let settings = Settings::default();
        assert_eq!(settings.pipeline.auto_accept_score, 90);
        assert!((settings.model.default_probability - 0.6).abs() < f64::EPSILON);
        assert!(settings.vocabulary.noise_words.iter().any(|w| w == "subtotal"));
        assert!(settings.vocabulary.food_triggers.iter().any(|w| w == "biryani"));
        assert_eq!(
            settings.vocabulary.spell_fixes.get("chkn").map(String::as_str),
            Some("chicken")
        );
        assert_eq!(settings.vocabulary.portions[0].keyword, "mini");
        assert!((settings.vocabulary.portions[0].multiplier - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn extra_file_overrides_and_extends() {
        let dir = tempdir().expect("tempdir");
        let extra = dir.path().join("extra.toml");
        fs::write(
            &extra,
            r#"
[pipeline]
auto_accept_score = 85

[vocabulary.spell_fixes]
panner = "paneer"
"#,
        )
        .expect("write extra");

        let settings = load_settings_from(dir.path(), Some(&extra)).expect("load");
        assert_eq!(settings.pipeline.auto_accept_score, 85);
        assert_eq!(
            settings.vocabulary.spell_fixes.get("panner").map(String::as_str),
            Some("paneer")
        );
        assert_eq!(
            settings.vocabulary.spell_fixes.get("biryoni").map(String::as_str),
            Some("biryani")
        );
    }

    #[test]
    fn missing_extra_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nope.toml");
        let err = load_settings_from(dir.path(), Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }

    #[test]
    fn relative_paths_resolve_against_base_dir() {
        let dir = tempdir().expect("tempdir");
        let settings = load_settings_from(dir.path(), None).expect("load");
        assert_eq!(
            settings.food_db_path(),
            Some(dir.path().join("foods_data.json"))
        );
        assert_eq!(settings.embeddings_path(), None);
    }
}
