use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::process::Command;
use tracing::warn;

/// Output flavour requested from the tesseract CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TesseractOutput {
    Hocr,
    Tsv,
}

impl TesseractOutput {
    fn config_name(self) -> &'static str {
        match self {
            Self::Hocr => "hocr",
            Self::Tsv => "tsv",
        }
    }
}

pub(super) fn tesseract_version() -> Result<String> {
    let output = Command::new("tesseract")
        .arg("--version")
        .output()
        .with_context(|| "failed to run tesseract --version")?;
    if !output.status.success() {
        return Err(anyhow!("tesseract --version exited with {}", output.status));
    }
    // Older builds print the banner on stderr.
    let banner = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };
    Ok(banner.lines().next().unwrap_or("tesseract").trim().to_string())
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_language_listing(&stdout))
}

fn parse_language_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

pub(super) fn normalize_ocr_languages(requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }
    match list_tesseract_languages() {
        Ok(available) => select_languages(trimmed, &available),
        Err(_) => Ok(trimmed.to_string()),
    }
}

fn select_languages(requested: &str, available: &[String]) -> Result<String> {
    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in requested.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }
    Ok(chosen.join("+"))
}

pub(super) fn run_tesseract(
    path: &Path,
    languages: &str,
    psm: u32,
    output: TesseractOutput,
) -> Result<String> {
    let result = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg(output.config_name())
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&result.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_listing_skips_banner() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nhin\n\nosd\n";
        assert_eq!(parse_language_listing(listing), vec!["eng", "hin", "osd"]);
    }

    #[test]
    fn missing_languages_are_dropped() {
        let available = vec!["eng".to_string(), "hin".to_string()];
        assert_eq!(select_languages("eng+tam, hin", &available).expect("langs"), "eng+hin");
        assert!(select_languages("tam", &available).is_err());
    }
}
