use std::path::{Path, PathBuf};

const BASE_DIR_ENV: &str = "FOOD_SCAN_RUST_DIR";
const DEFAULT_BASE_DIR: &str = "~/.food-scan-rust";

pub(crate) fn base_dir() -> PathBuf {
    if let Some(dir) = base_dir_override() {
        return dir;
    }
    normalize_dir(DEFAULT_BASE_DIR).unwrap_or_else(|| PathBuf::from(".food-scan-rust"))
}

pub(crate) fn settings_file() -> PathBuf {
    base_dir().join("settings.toml")
}

/// Resolves a configured path: `~` expands to the home directory, relative
/// paths are taken against `base`, and an empty value means "not configured".
pub(crate) fn resolve_configured(value: &str, base: &Path) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = PathBuf::from(expand_home(trimmed));
    if expanded.is_absolute() {
        Some(normalize_path(expanded))
    } else {
        Some(normalize_path(base.join(expanded)))
    }
}

fn base_dir_override() -> Option<PathBuf> {
    std::env::var(BASE_DIR_ENV)
        .ok()
        .and_then(|value| normalize_dir(&value))
}

fn normalize_dir(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home(trimmed);
    Some(normalize_path(PathBuf::from(expanded)))
}

fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        normalized.push(component.as_os_str());
    }
    normalized
}

fn expand_home(value: &str) -> String {
    if value == "~" {
        return env_home().unwrap_or_else(|| value.to_string());
    }
    if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(home) = env_home() {
            let joined = Path::new(&home).join(stripped);
            return joined.to_string_lossy().to_string();
        }
    }
    value.to_string()
}

fn env_home() -> Option<String> {
    if let Ok(home) = std::env::var("HOME") {
        let home = home.trim();
        if !home.is_empty() {
            return Some(home.to_string());
        }
    }
    if let Ok(home) = std::env::var("USERPROFILE") {
        let home = home.trim();
        if !home.is_empty() {
            return Some(home.to_string());
        }
    }
    None
}
