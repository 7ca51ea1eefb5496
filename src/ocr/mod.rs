mod engine;
mod preprocess;

use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;
use tracing::info;

use crate::audit::RequestLog;
use crate::error::ScanError;
use crate::resource::LazyResource;
use crate::settings::OcrSettings;

pub use engine::{detect_engines, list_tesseract_languages, TesseractHocrEngine, TesseractTsvEngine};
pub use preprocess::{otsu_threshold, ImagePreprocessor};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub text: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    /// Engine confidence on a 0-100 scale; -1 when the engine gave none.
    pub confidence: f32,
}

impl Token {
    pub fn right(&self) -> u32 {
        self.left.saturating_add(self.width)
    }
}

/// One text line as read by an engine. Never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawLine {
    pub text: String,
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
    pub tokens: Vec<Token>,
    pub conf: f32,
}

impl RawLine {
    /// Builds a line from its tokens; box and text are derived from them.
    pub fn from_tokens(tokens: Vec<Token>) -> Option<Self> {
        let first = tokens.first()?;
        let mut left = first.left;
        let mut right = first.right();
        let mut top = first.top;
        let mut bottom = first.top.saturating_add(first.height);
        let mut conf_sum = 0.0f32;
        for token in &tokens {
            left = left.min(token.left);
            right = right.max(token.right());
            top = top.min(token.top);
            bottom = bottom.max(token.top.saturating_add(token.height));
            conf_sum += token.confidence.max(0.0);
        }
        let text = tokens
            .iter()
            .map(|token| token.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let conf = conf_sum / tokens.len() as f32;
        Some(Self {
            text,
            left,
            right,
            top,
            bottom,
            tokens,
            conf,
        })
    }

    pub fn max_token_confidence(&self) -> Option<f32> {
        self.tokens
            .iter()
            .map(|token| token.confidence)
            .fold(None, |acc, conf| Some(acc.map_or(conf, |best: f32| best.max(conf))))
    }

    /// The token that ends the line, i.e. the right-most one.
    pub fn last_token(&self) -> Option<&Token> {
        self.tokens.last()
    }
}

/// A text-line extractor. Implementations must return lines sorted by `top`.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    fn extract_lines(&self, image: &DynamicImage) -> anyhow::Result<Vec<RawLine>>;
}

/// The primary/fallback pair chosen at startup.
#[derive(Clone, Default)]
pub struct EngineSet {
    pub primary: Option<Arc<dyn OcrEngine>>,
    pub fallback: Option<Arc<dyn OcrEngine>>,
}

impl EngineSet {
    pub fn new(primary: Option<Arc<dyn OcrEngine>>, fallback: Option<Arc<dyn OcrEngine>>) -> Self {
        Self { primary, fallback }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.fallback.is_none()
    }

    /// Runs the primary engine and, only if that call fails, the fallback
    /// once. Never fails: unavailable or failing engines degrade to an empty
    /// line list, with the reason written to `log`.
    pub fn extract_lines(&self, image: &DynamicImage, log: &mut RequestLog<'_>) -> Vec<RawLine> {
        let mut chain = self.primary.iter().chain(self.fallback.iter());
        let Some(first) = chain.next() else {
            log.degraded(&ScanError::EngineUnavailable, "");
            return Vec::new();
        };

        for engine in std::iter::once(first).chain(chain) {
            match engine.extract_lines(image) {
                Ok(mut lines) => {
                    lines.sort_by_key(|line| line.top);
                    info!("ocr: {} returned {} lines", engine.name(), lines.len());
                    return lines;
                }
                Err(err) => {
                    let failure = ScanError::EngineCall {
                        engine: engine.name().to_string(),
                        message: format!("{:#}", err),
                    };
                    log.degraded(&failure, engine.name());
                }
            }
        }
        Vec::new()
    }
}

static SHARED_ENGINES: LazyResource<EngineSet> = LazyResource::new("ocr engines");

/// Process-wide engine set. Probing happens once, on first use, with the
/// settings of that first caller.
pub fn shared_engines(settings: &OcrSettings) -> Arc<EngineSet> {
    SHARED_ENGINES
        .get_or_create(|| Ok(Some(detect_engines(settings))))
        .ok()
        .flatten()
        .unwrap_or_default()
}
