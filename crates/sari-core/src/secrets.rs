//! Master password resolution.
//!
//! A database's master password is either given in configuration or derived
//! from its identifier through an ordered table of regex → template rules.
//! The resulting reference is then resolved by prefix:
//!
//!   plain value              returned as-is, age unknown
//!   ssm:<name>               parameter store, age from last modification
//!   s3-prop:<bucket>/<key>[<property>]
//!                            property file in object storage, age from the
//!                            object's last modification

use crate::collab::{ParameterStore, PropertyStore, StoredValue};
use crate::error::{Result, SariError};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, OnceLock};

pub const SSM_PREFIX: &str = "ssm:";
pub const S3_PROP_PREFIX: &str = "s3-prop:";

// ---------------------------------------------------------------------------
// PasswordDefaults
// ---------------------------------------------------------------------------

/// Ordered identifier-pattern → reference-template rules. First match wins.
#[derive(Debug, Clone)]
pub struct PasswordDefaults {
    rules: Vec<(Regex, String)>,
}

impl PasswordDefaults {
    /// Patterns match from the start of the identifier. Templates may refer
    /// to captures as `$1`/`${1}` or `\1`.
    pub fn new<I, P, T>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (P, T)>,
        P: AsRef<str>,
        T: AsRef<str>,
    {
        let mut rules = Vec::new();
        for (pattern, template) in entries {
            let pattern = pattern.as_ref();
            let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
                SariError::InvalidPasswordPattern {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                }
            })?;
            rules.push((regex, normalize_template(template.as_ref())));
        }
        Ok(Self { rules })
    }

    /// `ssm:<identifier>.master_password` for any lowercase identifier.
    pub fn builtin() -> Self {
        let regex = Regex::new(r"^(?:([a-z][a-z0-9-]+))").unwrap();
        Self {
            rules: vec![(regex, "ssm:${1}.master_password".to_string())],
        }
    }

    pub fn infer(&self, identifier: &str) -> Option<String> {
        self.rules.iter().find_map(|(regex, template)| {
            regex.captures(identifier).map(|caps| {
                let mut reference = String::new();
                caps.expand(template, &mut reference);
                reference
            })
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn normalize_template(template: &str) -> String {
    static BACKREF: OnceLock<Regex> = OnceLock::new();
    let backref = BACKREF.get_or_init(|| Regex::new(r"\\(\d+)").unwrap());
    backref.replace_all(template, "$${${1}}").into_owned()
}

// ---------------------------------------------------------------------------
// SecretRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef {
    Plain(String),
    Parameter(String),
    Property {
        container: String,
        key: String,
        property: String,
    },
}

impl SecretRef {
    pub fn parse(raw: &str) -> Result<Self> {
        if let Some(name) = raw.strip_prefix(SSM_PREFIX) {
            return Ok(SecretRef::Parameter(name.to_string()));
        }
        if let Some(path) = raw.strip_prefix(S3_PROP_PREFIX) {
            static S3_PROP: OnceLock<Regex> = OnceLock::new();
            let re = S3_PROP.get_or_init(|| {
                Regex::new(r"^(?P<bucket>[^\s/]+)/(?P<key>\S+)\[(?P<property>\S+)\]")
                    .unwrap()
            });
            let caps = re
                .captures(path)
                .ok_or_else(|| SariError::InvalidSecretReference(path.to_string()))?;
            return Ok(SecretRef::Property {
                container: caps["bucket"].to_string(),
                key: caps["key"].to_string(),
                property: caps["property"].to_string(),
            });
        }
        Ok(SecretRef::Plain(raw.to_string()))
    }
}

// ---------------------------------------------------------------------------
// SecretResolver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    pub value: String,
    /// Whole days since the source last changed; `None` when unknown.
    pub age_days: Option<i64>,
}

pub struct SecretResolver {
    parameters: Arc<dyn ParameterStore>,
    properties: Arc<dyn PropertyStore>,
    defaults: PasswordDefaults,
}

impl SecretResolver {
    pub fn new(
        parameters: Arc<dyn ParameterStore>,
        properties: Arc<dyn PropertyStore>,
        defaults: PasswordDefaults,
    ) -> Self {
        Self {
            parameters,
            properties,
            defaults,
        }
    }

    /// Resolve the master password of `identifier`.
    ///
    /// `explicit` is the configured value or reference; when absent the
    /// defaults table derives one.
    pub fn resolve(
        &self,
        identifier: &str,
        explicit: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedSecret> {
        let reference = match explicit.filter(|s| !s.is_empty()) {
            Some(value) => value.to_string(),
            None => self
                .defaults
                .infer(identifier)
                .ok_or(SariError::UndefinedMasterPassword)?,
        };
        let stored = match SecretRef::parse(&reference)? {
            SecretRef::Plain(value) => {
                return Ok(ResolvedSecret {
                    value,
                    age_days: None,
                })
            }
            SecretRef::Parameter(name) => self.parameters.get_secret(&name)?,
            SecretRef::Property {
                container,
                key,
                property,
            } => self.properties.get_property(&container, &key, &property)?,
        };
        Ok(aged(stored, now))
    }
}

fn aged(stored: StoredValue, now: DateTime<Utc>) -> ResolvedSecret {
    ResolvedSecret {
        value: stored.value,
        age_days: stored.last_modified.map(|t| (now - t).num_days()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
