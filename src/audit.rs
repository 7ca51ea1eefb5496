//! Audit trail for filtered lines and degraded stages.
//!
//! Every OCR line that does not become a candidate, and every stage that
//! falls back (engine failure, missing model), produces one [`Rejection`].
//! Entries are traced, appended to a JSONL file when one is configured, and
//! handed back to the caller with the scan result.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use crate::error::ScanError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub reason: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

#[derive(Serialize)]
struct LogEntry<'a> {
    ts: String,
    #[serde(flatten)]
    rejection: &'a Rejection,
}

/// Process-wide sink. Appends are serialised through a mutex so concurrent
/// requests never interleave within a line.
pub struct FilterLog {
    path: Option<PathBuf>,
    guard: Mutex<()>,
}

impl FilterLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            guard: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Starts the per-request view of this log.
    pub fn request(&self) -> RequestLog<'_> {
        RequestLog {
            sink: self,
            entries: Vec::new(),
        }
    }

    fn write(&self, rejection: &Rejection) {
        info!(
            target: "food_scan::filter",
            reason = %rejection.reason,
            text = %rejection.text,
            "line filtered"
        );
        let Some(path) = self.path.as_deref() else {
            return;
        };
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        let entry = LogEntry { ts, rejection };
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(err) => {
                warn!("failed to encode filter log entry: {}", err);
                return;
            }
        };
        let _lock = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(err) = result {
            warn!("failed to append filter log {}: {}", path.display(), err);
        }
    }
}

/// Rejections collected for one scan.
pub struct RequestLog<'a> {
    sink: &'a FilterLog,
    entries: Vec<Rejection>,
}

impl RequestLog<'_> {
    pub fn reject(&mut self, reason: &str, text: &str, extra: Option<Value>) {
        let rejection = Rejection {
            reason: reason.to_string(),
            text: text.to_string(),
            extra,
        };
        self.sink.write(&rejection);
        self.entries.push(rejection);
    }

    /// Records a non-fatal degradation against the input that triggered it.
    pub fn degraded(&mut self, err: &ScanError, text: &str) {
        warn!("{}", err);
        self.reject(
            err.reason_tag(),
            text,
            Some(serde_json::json!({ "error": err.to_string() })),
        );
    }

    pub fn entries(&self) -> &[Rejection] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Rejection> {
        self.entries
    }
}
