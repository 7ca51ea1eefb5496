pub mod aggregate;
pub mod columns;
pub mod filter;
pub mod gate;
pub mod normalize;
pub mod quantity;
pub mod restaurant;
pub mod result;

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::audit::{FilterLog, RequestLog};
use crate::classifier::LineClassifier;
use crate::error::ScanError;
use crate::food_db::{FoodRecord, FoodTable};
use crate::matching::{Embedder, EstimateRequest, EstimateSummary, ItemMatcher, MatchCandidate, SemanticIndex, SentenceEncoder, WordVectors};
use crate::ocr::{shared_engines, EngineSet, ImagePreprocessor, RawLine};
use crate::resource::LazyResource;
use crate::settings::Settings;

pub use aggregate::{aggregate, AggregateSummary, NutrientTotals};
pub use columns::NumericColumns;
pub use filter::{CandidateLine, LineFilter};
pub use gate::ConfidenceGate;
pub use normalize::TextRules;
pub use quantity::{has_quantity_marker, parse_quantity, portion_multiplier};
pub use restaurant::detect_restaurant;
pub use result::{MappedItem, ResultRow, ScanResult};

/// The scan pipeline. Build once and share; `scan` takes `&self` and keeps
/// no per-request state.
pub struct Pipeline {
    settings: Settings,
    preprocessor: ImagePreprocessor,
    filter: LineFilter,
    matcher: ItemMatcher,
    filter_log: FilterLog,
    engines: Option<Arc<EngineSet>>,
    embedder: Option<Arc<dyn Embedder>>,
    semantic: LazyResource<SemanticIndex>,
    classifier: LazyResource<LineClassifier>,
}

impl Pipeline {
    /// Loads the food table named in `settings`.
    pub fn new(settings: Settings) -> Result<Self, ScanError> {
        let table = FoodTable::load_or_empty(settings.food_db_path().as_deref())?;
        Self::with_table(settings, table)
    }

    pub fn with_table(settings: Settings, table: FoodTable) -> Result<Self, ScanError> {
        let rules = TextRules::new(&settings.vocabulary)?;
        let filter = LineFilter::new(
            rules,
            settings.pipeline.min_alpha_ratio,
            settings.pipeline.min_word_confidence,
            settings.model.default_probability,
        );
        let matcher = ItemMatcher::new(Arc::new(table), &settings.matching);
        let filter_log = FilterLog::new(settings.filter_log_path());
        Ok(Self {
            preprocessor: ImagePreprocessor::from_settings(&settings.ocr),
            filter,
            matcher,
            filter_log,
            engines: None,
            embedder: None,
            semantic: LazyResource::new("semantic index"),
            classifier: LazyResource::new("line classifier"),
            settings,
        })
    }

    /// Replaces the process-wide engine set for this pipeline.
    pub fn with_engines(mut self, engines: EngineSet) -> Self {
        self.engines = Some(Arc::new(engines));
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self.semantic = LazyResource::new("semantic index");
        self
    }

    pub fn with_classifier(mut self, classifier: LineClassifier) -> Self {
        self.classifier = LazyResource::ready("line classifier", classifier);
        self
    }

    pub fn with_filter_log(mut self, filter_log: FilterLog) -> Self {
        self.filter_log = filter_log;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn table(&self) -> &FoodTable {
        self.matcher.table()
    }

    fn engines(&self) -> Arc<EngineSet> {
        match &self.engines {
            Some(engines) => Arc::clone(engines),
            None => shared_engines(&self.settings.ocr),
        }
    }

    /// The sentence model when configured, else word vectors.
    fn configured_embedder(&self) -> Result<Option<Arc<dyn Embedder>>, ScanError> {
        if let Some(dir) = self.settings.sentence_model_dir() {
            let encoder = SentenceEncoder::load_dir(&dir)
                .map_err(|err| ScanError::artifact(dir.display().to_string(), err))?;
            if let Some(encoder) = encoder {
                return Ok(Some(Arc::new(encoder)));
            }
        }
        let Some(path) = self.settings.embeddings_path() else {
            return Ok(None);
        };
        let vectors = WordVectors::load(&path).map_err(|err| ScanError::artifact(path.display().to_string(), err))?;
        Ok(Some(Arc::new(vectors)))
    }

    fn semantic_index(&self, log: &mut RequestLog<'_>) -> Option<Arc<SemanticIndex>> {
        let created = self.semantic.get_or_create(|| {
            let embedder = match &self.embedder {
                Some(embedder) => Arc::clone(embedder),
                None => match self.configured_embedder()? {
                    Some(embedder) => embedder,
                    None => return Ok(None),
                },
            };
            Ok(Some(SemanticIndex::build(embedder, self.matcher.table())))
        });
        match created {
            Ok(index) => index,
            Err(err) => {
                log.degraded(&err, "");
                None
            }
        }
    }

    fn line_classifier(&self) -> Result<Option<Arc<LineClassifier>>, ScanError> {
        self.classifier.get_or_create(|| match self.settings.model_dir() {
            Some(dir) => LineClassifier::load_dir(&dir),
            None => Ok(None),
        })
    }

    fn score_candidates(&self, candidates: &mut [CandidateLine], log: &mut RequestLog<'_>) {
        let classifier = self.line_classifier();
        for candidate in candidates.iter_mut() {
            candidate.acceptance_probability = match &classifier {
                Ok(Some(model)) => model.predict_proba(candidate),
                Ok(None) => self.settings.model.default_probability,
                Err(err) => {
                    log.reject(
                        "line_model_error",
                        &candidate.normalized_text,
                        Some(json!({ "error": err.to_string() })),
                    );
                    self.settings.model.default_probability
                }
            };
        }
    }

    /// Full scan of one uploaded image. Fails only when the bytes cannot be
    /// decoded.
    pub fn scan(&self, image_bytes: &[u8], confidence_threshold: u32) -> Result<ScanResult, ScanError> {
        let image = self.preprocessor.preprocess(image_bytes)?;
        let mut log = self.filter_log.request();
        let lines = self.engines().extract_lines(&image, &mut log);
        Ok(self.process(lines, confidence_threshold, log))
    }

    /// Everything after OCR, for callers that already have lines.
    pub fn scan_lines(&self, lines: Vec<RawLine>, confidence_threshold: u32) -> ScanResult {
        let log = self.filter_log.request();
        self.process(lines, confidence_threshold, log)
    }

    fn process(&self, lines: Vec<RawLine>, confidence_threshold: u32, mut log: RequestLog<'_>) -> ScanResult {
        let pipeline = &self.settings.pipeline;
        let detected_restaurant = detect_restaurant(&lines, self.filter.rules(), pipeline.restaurant_scan_lines);
        let restaurant_menu_count = detected_restaurant
            .as_deref()
            .map(|name| self.table().restaurant_rows(name).len())
            .unwrap_or(0);

        let columns = NumericColumns::detect(&lines, pipeline.price_column_min_count, pipeline.column_tolerance_px);
        let mut candidates = self.filter.filter(&lines, &columns, &mut log);
        self.score_candidates(&mut candidates, &mut log);

        let index = if candidates.is_empty() || self.table().is_empty() {
            None
        } else {
            self.semantic_index(&mut log)
        };
        let mapped_items = candidates
            .iter()
            .map(|candidate| self.map_candidate(candidate, detected_restaurant.as_deref(), index.as_deref()))
            .collect::<Vec<_>>();

        let gate = ConfidenceGate::new(confidence_threshold, pipeline.min_acceptance_probability);
        let rows = mapped_items.iter().map(|item| gate.decide(item)).collect::<Vec<_>>();
        let AggregateSummary { totals, insights } = aggregate(&rows);

        let ocr_text = lines
            .iter()
            .map(|line| line.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        let ocr_text_preview = result::preview(&ocr_text, pipeline.preview_chars);

        info!(
            "scan: {} ocr lines, {} candidates, {} accepted, restaurant={:?}",
            lines.len(),
            candidates.len(),
            rows.iter().filter(|row| row.accepted).count(),
            detected_restaurant
        );

        ScanResult {
            ocr_lines_count: lines.len(),
            candidate_lines_count: candidates.len(),
            detected_restaurant,
            restaurant_menu_count,
            mapped_items,
            rows,
            summary: totals,
            insights,
            ocr_text,
            ocr_text_preview,
            rejections: log.into_entries(),
        }
    }

    fn map_candidate(&self, candidate: &CandidateLine, restaurant: Option<&str>, index: Option<&SemanticIndex>) -> MappedItem {
        let explicit_quantity = has_quantity_marker(&candidate.normalized_text);
        let (quantity, extracted_text) = parse_quantity(&candidate.normalized_text);
        let portion = portion_multiplier(&candidate.normalized_text, &self.settings.vocabulary.portions);
        let candidates = self.matcher.match_item(&extracted_text, restaurant, index);
        let (best_match, best_score) = candidates
            .first()
            .map(|best| (Some(best.db_item.clone()), best.score))
            .unwrap_or((None, 0));
        MappedItem {
            raw_text: candidate.raw_text.clone(),
            extracted_text,
            quantity,
            explicit_quantity,
            portion_multiplier: portion,
            best_match,
            best_score,
            candidates,
            acceptance_probability: candidate.acceptance_probability,
        }
    }

    /// Best table entry for a free-form dish name.
    pub fn closest_food(&self, name: &str, min_score: u32) -> Option<MatchCandidate> {
        self.matcher.closest_food(name, min_score)
    }

    /// Nutrients for dish names given as text such as `"2x mini dosa"`.
    pub fn estimate_items<S: AsRef<str>>(&self, items: &[S], min_score: u32) -> EstimateSummary {
        let requests = items
            .iter()
            .map(|text| EstimateRequest::from_text(text.as_ref(), &self.settings.vocabulary.portions))
            .collect::<Vec<_>>();
        self.matcher.estimate_items(&requests, min_score)
    }

    pub fn search_foods(&self, query: &str) -> Vec<&FoodRecord> {
        self.matcher.search(query)
    }
}

/// Scans `image_bytes` with `pipeline`.
pub fn map_items_from_image_bytes(
    pipeline: &Pipeline,
    image_bytes: &[u8],
    confidence_threshold: u32,
) -> Result<ScanResult, ScanError> {
    pipeline.scan(image_bytes, confidence_threshold)
}
