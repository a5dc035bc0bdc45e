use crate::error::{Result, SariError};
use crate::io;
use crate::paths;
use crate::period::GrantWindow;
use crate::pool::{DEFAULT_TASK_TIMEOUT, DEFAULT_WORKERS};
use crate::records::{self, DatabaseRecord, UserRecord};
use crate::schema::BUILTIN_GRANT_TYPES;
use crate::secrets::PasswordDefaults;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    /// File the finding is about, relative to the config directory.
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(file: &str, message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            file: file.to_string(),
            message: message.into(),
        }
    }

    fn error(file: &str, message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            file: file.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_DIR: &str = "SARI_CONFIG";
pub const ENV_PROXY: &str = "PROXY";
pub const ENV_OKTA_ORG: &str = "OKTA_ORG_NAME";
pub const ENV_OKTA_TOKEN: &str = "OKTA_API_TOKEN";
pub const ENV_OKTA_APP: &str = "OKTA_AWS_APP_ID";
pub const ENV_WORKERS: &str = "SARI_WORKERS";
pub const ENV_PROBE_TIMEOUT: &str = "SARI_PROBE_TIMEOUT";

/// Identity directory credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct DirectorySettings {
    pub organization: String,
    pub api_token: String,
    pub app_id: Option<String>,
}

impl std::fmt::Debug for DirectorySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySettings")
            .field("organization", &self.organization)
            .field("api_token", &"***")
            .field("app_id", &self.app_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_dir: PathBuf,
    /// SOCKS5 proxy URL for reachability probes.
    pub proxy: Option<String>,
    /// `None` when the directory stage is not configured.
    pub directory: Option<DirectorySettings>,
    pub workers: usize,
    pub probe_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config_dir = get(ENV_CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_CONFIG_DIR));

        let directory = match (get(ENV_OKTA_ORG), get(ENV_OKTA_TOKEN)) {
            (Some(organization), Some(api_token)) => Some(DirectorySettings {
                organization,
                api_token,
                app_id: get(ENV_OKTA_APP),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(SariError::MissingSetting(ENV_OKTA_TOKEN.to_string())),
            (None, Some(_)) => return Err(SariError::MissingSetting(ENV_OKTA_ORG.to_string())),
        };

        let workers = match get(ENV_WORKERS) {
            Some(raw) => parse_positive(ENV_WORKERS, &raw)? as usize,
            None => DEFAULT_WORKERS,
        };
        let probe_timeout = match get(ENV_PROBE_TIMEOUT) {
            Some(raw) => Duration::from_secs(parse_positive(ENV_PROBE_TIMEOUT, &raw)?),
            None => DEFAULT_TASK_TIMEOUT,
        };

        let proxy = get(ENV_PROXY);
        if let Some(url) = &proxy {
            if !url.starts_with("socks5://") && !url.starts_with("socks5h://") {
                return Err(SariError::InvalidSetting {
                    name: ENV_PROXY.to_string(),
                    reason: format!("only socks5:// proxies are supported, got '{url}'"),
                });
            }
        }

        Ok(Self {
            config_dir,
            proxy,
            directory,
            workers,
            probe_timeout,
        })
    }

    pub fn regions(&self) -> Result<Vec<String>> {
        paths::discover_regions(&self.config_dir)
    }

    pub fn load_custom(&self) -> Result<CustomConfig> {
        CustomConfig::load(&self.config_dir)
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(SariError::InvalidSetting {
            name: name.to_string(),
            reason: format!("expected a positive integer, got '{raw}'"),
        }),
    }
}

// ---------------------------------------------------------------------------
// CustomConfig
// ---------------------------------------------------------------------------

/// What to do with a live database that no `databases.yaml` mentions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnconfiguredPolicy {
    /// Report it and leave it out of the model.
    #[default]
    Warn,
    /// Adopt it with inferred credentials.
    AutoEnable,
}

/// The optional `custom.yaml`. The whole document is kept for the model;
/// only the keys below are interpreted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomConfig {
    /// Ordered regex → reference template.
    #[serde(default)]
    pub master_password_defaults: serde_yaml::Mapping,
    #[serde(default)]
    pub unconfigured_databases: UnconfiguredPolicy,
    #[serde(skip)]
    raw: serde_yaml::Value,
}

impl CustomConfig {
    pub fn load(config_dir: &Path) -> Result<Self> {
        let raw: Option<serde_yaml::Value> =
            io::read_optional_yaml(&paths::custom_path(config_dir))?;
        match raw {
            None | Some(serde_yaml::Value::Null) => Ok(Self::default()),
            Some(raw) => Self::from_value(raw),
        }
    }

    pub fn from_value(raw: serde_yaml::Value) -> Result<Self> {
        let mut custom: CustomConfig = serde_yaml::from_value(raw.clone())?;
        custom.raw = raw;
        Ok(custom)
    }

    pub fn raw(&self) -> &serde_yaml::Value {
        &self.raw
    }

    /// The configured table, or the built-in rule when none is given.
    pub fn password_defaults(&self) -> Result<PasswordDefaults> {
        if self.master_password_defaults.is_empty() {
            return Ok(PasswordDefaults::builtin());
        }
        let mut entries = Vec::with_capacity(self.master_password_defaults.len());
        for (pattern, template) in &self.master_password_defaults {
            match (pattern.as_str(), template.as_str()) {
                (Some(p), Some(t)) => entries.push((p, t)),
                _ => {
                    return Err(SariError::InvalidSetting {
                        name: "master_password_defaults".to_string(),
                        reason: "patterns and templates must be strings".to_string(),
                    })
                }
            }
        }
        PasswordDefaults::new(entries)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Load every configuration document and report structural problems
/// without contacting any external system.
pub fn validate(settings: &Settings) -> Result<Vec<ConfigWarning>> {
    let regions = settings.regions()?;
    let mut warnings = Vec::new();

    if regions.is_empty() {
        warnings.push(ConfigWarning::error(
            ".",
            "no region directory with a databases.yaml",
        ));
    }

    for region in &regions {
        let file = format!("{region}/{}", paths::DATABASES_FILE);
        if let Err(e) = paths::validate_region(region) {
            warnings.push(ConfigWarning::warning(&file, e.to_string()));
        }
        match records::load_databases(&settings.config_dir, region) {
            Ok(dbs) => validate_databases(&file, &dbs, &mut warnings),
            Err(e) => warnings.push(ConfigWarning::error(&file, e.to_string())),
        }
    }

    if let Err(e) = settings
        .load_custom()
        .and_then(|custom| custom.password_defaults())
    {
        warnings.push(ConfigWarning::error(paths::CUSTOM_FILE, e.to_string()));
    }

    if !paths::users_path(&settings.config_dir).exists() {
        warnings.push(ConfigWarning::error(paths::USERS_FILE, "file not found"));
    } else {
        match records::load_users(&settings.config_dir) {
            Ok(users) => validate_users(&users, regions.len(), &mut warnings),
            Err(e) => warnings.push(ConfigWarning::error(paths::USERS_FILE, e.to_string())),
        }
    }

    if let Err(e) = records::load_services(&settings.config_dir) {
        warnings.push(ConfigWarning::error(paths::SERVICES_FILE, e.to_string()));
    }

    Ok(warnings)
}

fn validate_databases(file: &str, dbs: &[DatabaseRecord], warnings: &mut Vec<ConfigWarning>) {
    let mut seen = HashSet::new();
    for db in dbs {
        if !seen.insert(db.id.as_str()) {
            warnings.push(ConfigWarning::error(file, format!("duplicate database '{}'", db.id)));
        }
        if let Err(e) = db.is_enabled() {
            warnings.push(ConfigWarning::error(file, format!("{}: {e}", db.id)));
        }
    }
}

fn validate_users(users: &[UserRecord], region_count: usize, warnings: &mut Vec<ConfigWarning>) {
    let file = paths::USERS_FILE;
    let known = |grant: &str| grant == "none" || BUILTIN_GRANT_TYPES.iter().any(|(g, _)| *g == grant);
    let mut seen = HashSet::new();
    for user in users {
        if !seen.insert(user.login.as_str()) {
            warnings.push(ConfigWarning::error(file, format!("duplicate login '{}'", user.login)));
        }
        if let Some(grant) = user.default_grant_type.as_deref().filter(|g| !known(g)) {
            warnings.push(ConfigWarning::error(
                file,
                format!("{}: unknown default_grant_type '{grant}'", user.login),
            ));
        }
        for perm in &user.permissions {
            if let Some(grant) = perm.grant_type.as_deref().filter(|g| !known(g)) {
                warnings.push(ConfigWarning::error(
                    file,
                    format!("{}: unknown grant_type '{grant}'", user.login),
                ));
            }
            if !perm.db.contains('/') && region_count != 1 {
                warnings.push(ConfigWarning::warning(
                    file,
                    format!(
                        "{}: '{}' has no region and {region_count} regions are configured",
                        user.login, perm.db
                    ),
                ));
            }
            if let Err(e) = GrantWindow::parse(
                perm.not_valid_before.as_deref(),
                perm.not_valid_after.as_deref(),
            ) {
                warnings.push(ConfigWarning::error(file, format!("{}: {e}", user.login)));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
