use thiserror::Error;

/// Failures surfaced by the scan pipeline.
///
/// Only `Decode` aborts a request. The engine and artifact variants describe
/// degradations: they are recorded in the filter log and the pipeline keeps
/// going with whatever stage is still available.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScanError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("no OCR engine available (install tesseract)")]
    EngineUnavailable,

    #[error("OCR engine `{engine}` failed: {message}")]
    EngineCall { engine: String, message: String },

    #[error("failed to load {artifact}: {message}")]
    ArtifactLoad { artifact: String, message: String },

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("failed to load food table: {0}")]
    FoodTable(String),
}

impl ScanError {
    /// Reason tag used when the error is written to the filter log.
    pub fn reason_tag(&self) -> &'static str {
        match self {
            ScanError::Decode(_) => "decode_error",
            ScanError::EngineUnavailable => "no_ocr_engine",
            ScanError::EngineCall { .. } => "engine_failed",
            ScanError::ArtifactLoad { .. } => "artifact_load_failed",
            ScanError::Settings(_) => "settings_error",
            ScanError::FoodTable(_) => "food_table_error",
        }
    }

    /// Only unreadable input stops a request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::Decode(_))
    }

    pub(crate) fn artifact(artifact: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ScanError::ArtifactLoad {
            artifact: artifact.into(),
            message: format!("{:#}", err),
        }
    }
}
