use crate::error::{Result, SariError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// File constants
// ---------------------------------------------------------------------------

pub const DEFAULT_CONFIG_DIR: &str = "config";

pub const DATABASES_FILE: &str = "databases.yaml";
pub const USERS_FILE: &str = "users.yaml";
pub const SERVICES_FILE: &str = "services.yaml";
pub const CUSTOM_FILE: &str = "custom.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn region_dir(config_dir: &Path, region: &str) -> PathBuf {
    config_dir.join(region)
}

pub fn databases_path(config_dir: &Path, region: &str) -> PathBuf {
    region_dir(config_dir, region).join(DATABASES_FILE)
}

pub fn users_path(config_dir: &Path) -> PathBuf {
    config_dir.join(USERS_FILE)
}

pub fn services_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SERVICES_FILE)
}

pub fn custom_path(config_dir: &Path) -> PathBuf {
    config_dir.join(CUSTOM_FILE)
}

/// Regions are the top-level directories holding a `databases.yaml`,
/// sorted by name.
pub fn discover_regions(config_dir: &Path) -> Result<Vec<String>> {
    if !config_dir.is_dir() {
        return Err(SariError::ConfigDirNotFound(config_dir.display().to_string()));
    }
    let mut regions = Vec::new();
    for entry in std::fs::read_dir(config_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if entry.path().join(DATABASES_FILE).is_file() {
            regions.push(name);
        }
    }
    regions.sort();
    Ok(regions)
}

// ---------------------------------------------------------------------------
// Region validation
// ---------------------------------------------------------------------------

static REGION_RE: OnceLock<Regex> = OnceLock::new();

fn region_re() -> &'static Regex {
    REGION_RE.get_or_init(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-[0-9]+$").unwrap())
}

pub fn validate_region(region: &str) -> Result<()> {
    if !region_re().is_match(region) {
        return Err(SariError::InvalidSetting {
            name: "region".to_string(),
            reason: format!("'{region}' does not look like a cloud region"),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
