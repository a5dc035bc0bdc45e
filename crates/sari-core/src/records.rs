//! Records of the configuration documents.
//!
//! `<region>/databases.yaml`, `users.yaml` and `services.yaml` are lists of
//! records. Unknown fields are rejected so typos surface at load time.

use crate::error::{Result, SariError};
use crate::io;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Scalar helpers
// ---------------------------------------------------------------------------

/// A boolean written either as YAML bool, as 0/1 or as a word such as `yes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Flag {
    pub fn to_bool(&self) -> Result<bool> {
        match self {
            Flag::Bool(b) => Ok(*b),
            Flag::Int(1) => Ok(true),
            Flag::Int(0) => Ok(false),
            Flag::Int(other) => Err(SariError::InvalidFlag(other.to_string())),
            Flag::Text(s) => match s.to_ascii_lowercase().as_str() {
                "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
                "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
                _ => Err(SariError::InvalidFlag(s.clone())),
            },
        }
    }
}

/// One schema name or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbNames {
    One(String),
    Many(Vec<String>),
}

impl DbNames {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            DbNames::One(name) => vec![name],
            DbNames::Many(names) => names,
        }
    }
}

// ---------------------------------------------------------------------------
// databases.yaml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Flag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_password: Option<String>,
}

impl DatabaseRecord {
    /// Databases are enabled unless stated otherwise.
    pub fn is_enabled(&self) -> Result<bool> {
        self.enabled.as_ref().map_or(Ok(true), Flag::to_bool)
    }
}

pub fn load_databases(config_dir: &Path, region: &str) -> Result<Vec<DatabaseRecord>> {
    io::read_yaml(&paths::databases_path(config_dir, region))
}

// ---------------------------------------------------------------------------
// users.yaml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRecord {
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_grant_type: Option<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionRecord {
    /// Exact database reference or glob pattern.
    pub db: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_names: Option<DbNames>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_valid_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_valid_after: Option<String>,
}

pub fn load_users(config_dir: &Path) -> Result<Vec<UserRecord>> {
    io::read_yaml(&paths::users_path(config_dir))
}

// ---------------------------------------------------------------------------
// services.yaml
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesDocument {
    #[serde(default)]
    pub glue_connections: Vec<GlueConnectionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlueConnectionRecord {
    pub db: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_names: Option<DbNames>,
    #[serde(default)]
    pub physical_connection_requirements: ConnectionRequirements,
}

/// Overrides for where a Glue connection is placed. Each field defaults to
/// the target database's discovered placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group_id_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
}

pub fn load_services(config_dir: &Path) -> Result<Option<ServicesDocument>> {
    io::read_optional_yaml(&paths::services_path(config_dir))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_words_and_numbers() {
        for (raw, expected) in [("yes", true), ("On", true), ("0", false), ("n", false)] {
            assert_eq!(Flag::Text(raw.to_string()).to_bool().unwrap(), expected, "{raw}");
        }
        assert!(Flag::Int(1).to_bool().unwrap());
        assert!(!Flag::Bool(false).to_bool().unwrap());
    }

    #[test]
    fn bad_flag_rejected() {
        let err = Flag::Text("maybe".to_string()).to_bool().unwrap_err();
        assert!(matches!(err, SariError::InvalidFlag(v) if v == "maybe"));
        assert!(Flag::Int(2).to_bool().is_err());
    }

    #[test]
    fn database_records_parse() {
        let yaml = "- id: borders\n- id: foyles\n  enabled: no\n- id: whsmith\n  enabled: false\n  master_password: ssm:whsmith.pwd\n";
        let dbs: Vec<DatabaseRecord> = serde_yaml::from_str(yaml).unwrap();
        assert!(dbs[0].is_enabled().unwrap());
        assert!(!dbs[1].is_enabled().unwrap());
        assert!(!dbs[2].is_enabled().unwrap());
        assert_eq!(dbs[2].master_password.as_deref(), Some("ssm:whsmith.pwd"));
    }

    #[test]
    fn unknown_field_rejected() {
        let yaml = "- id: borders\n  enabld: true\n";
        assert!(serde_yaml::from_str::<Vec<DatabaseRecord>>(yaml).is_err());
    }

    #[test]
    fn user_records_parse_unquoted_timestamps() {
        let yaml = r#"
- login: leroy.trent@acme.com
  default_grant_type: none
  permissions:
    - db: eu-west-2/borders
      grant_type: crud
      db_names: [orders, stock]
      not_valid_before: 2020-05-26 10:22:00+01:00
    - db: "eu-west-2/*"
      db_names: stock
"#;
        let users: Vec<UserRecord> = serde_yaml::from_str(yaml).unwrap();
        let perms = &users[0].permissions;
        assert_eq!(perms[0].not_valid_before.as_deref(), Some("2020-05-26 10:22:00+01:00"));
        assert_eq!(
            perms[1].db_names.clone().unwrap().into_vec(),
            vec!["stock".to_string()]
        );
    }

    #[test]
    fn services_document_defaults() {
        let yaml = "glue_connections:\n  - db: eu-west-2/borders\n";
        let doc: ServicesDocument = serde_yaml::from_str(yaml).unwrap();
        let conn = &doc.glue_connections[0];
        assert_eq!(conn.physical_connection_requirements, ConnectionRequirements::default());
        assert!(conn.grant_type.is_none());
    }
}
