mod parse;
mod tesseract;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use image::DynamicImage;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::ocr::{EngineSet, OcrEngine, RawLine};
use crate::settings::OcrSettings;

use tesseract::TesseractOutput;

pub use tesseract::list_tesseract_languages;

/// Tesseract with hOCR output and automatic page segmentation.
pub struct TesseractHocrEngine {
    languages: String,
}

/// Tesseract with TSV output, assuming a single uniform text block.
pub struct TesseractTsvEngine {
    languages: String,
}

impl TesseractHocrEngine {
    const PSM: u32 = 4;

    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            languages: languages.into(),
        }
    }
}

impl TesseractTsvEngine {
    const PSM: u32 = 6;

    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            languages: languages.into(),
        }
    }
}

impl OcrEngine for TesseractHocrEngine {
    fn name(&self) -> &str {
        "tesseract-hocr"
    }

    fn extract_lines(&self, image: &DynamicImage) -> Result<Vec<RawLine>> {
        let tmp = write_temp_png(image)?;
        let hocr = tesseract::run_tesseract(tmp.path(), &self.languages, Self::PSM, TesseractOutput::Hocr)?;
        Ok(parse::parse_hocr_lines(&hocr))
    }
}

impl OcrEngine for TesseractTsvEngine {
    fn name(&self) -> &str {
        "tesseract-tsv"
    }

    fn extract_lines(&self, image: &DynamicImage) -> Result<Vec<RawLine>> {
        let tmp = write_temp_png(image)?;
        let tsv = tesseract::run_tesseract(tmp.path(), &self.languages, Self::PSM, TesseractOutput::Tsv)?;
        Ok(parse::parse_tsv_lines(&tsv))
    }
}

fn write_temp_png(image: &DynamicImage) -> Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .with_context(|| "failed to create temp file for OCR")?;
    image
        .write_to(&mut tmp, image::ImageFormat::Png)
        .with_context(|| "failed to write temp image for OCR")?;
    tmp.flush()
        .with_context(|| "failed to flush temp image for OCR")?;
    Ok(tmp)
}

/// Probes the host once and builds the engine pair enabled in `settings`.
/// A missing tesseract binary leaves both slots empty.
pub fn detect_engines(settings: &OcrSettings) -> EngineSet {
    let version = match tesseract::tesseract_version() {
        Ok(version) => version,
        Err(err) => {
            warn!("no OCR engine available: {:#}", err);
            return EngineSet::default();
        }
    };
    let languages = match tesseract::normalize_ocr_languages(&settings.languages) {
        Ok(languages) => languages,
        Err(err) => {
            warn!("{:#}", err);
            return EngineSet::default();
        }
    };
    info!("using {} with languages {}", version, languages);

    let primary = settings
        .primary
        .then(|| Arc::new(TesseractHocrEngine::new(languages.clone())) as Arc<dyn OcrEngine>);
    let fallback = settings
        .fallback
        .then(|| Arc::new(TesseractTsvEngine::new(languages)) as Arc<dyn OcrEngine>);
    EngineSet::new(primary, fallback)
}
