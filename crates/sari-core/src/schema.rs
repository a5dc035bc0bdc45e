//! Field names the gatherers agree on, and typed views over them.
//!
//! ```text
//! system.config_dir / system.proxy
//! cloud.account / cloud.regions / cloud.single_region
//! directory.organization
//! databases.<region>/<id>.{status, permissions, master_password, password_age,
//!                          db_name, master_username, endpoint, resource_id,
//!                          availability_zone, security_group_ids, primary_subnet}
//! users.<login>.{db_username, permissions, status, user_id, ssh_pubkey, saml_roles}
//! services.glue_connections.<region>/<id>
//! job.next_transition
//! grant_types.<name> = [privileges]
//! custom = custom.yaml
//! ```

use crate::collab::Endpoint;
use crate::config::{CustomConfig, Settings};
use crate::model::{Node, Tree, Value};
use crate::status::DbStatus;
use chrono::{DateTime, Utc};

pub const SYSTEM: &str = "system";
pub const CLOUD: &str = "cloud";
pub const DIRECTORY: &str = "directory";
pub const DATABASES: &str = "databases";
pub const USERS: &str = "users";
pub const SERVICES: &str = "services";
pub const GLUE_CONNECTIONS: &str = "glue_connections";
pub const JOB: &str = "job";
pub const GRANT_TYPES: &str = "grant_types";
pub const CUSTOM: &str = "custom";

pub const ACCOUNT: &str = "account";
pub const REGIONS: &str = "regions";
pub const SINGLE_REGION: &str = "single_region";
pub const NEXT_TRANSITION: &str = "next_transition";

pub const STATUS: &str = "status";
pub const PERMISSIONS: &str = "permissions";
pub const MASTER_PASSWORD: &str = "master_password";
pub const PASSWORD_AGE: &str = "password_age";
pub const DB_NAME: &str = "db_name";
pub const DB_NAMES: &str = "db_names";
pub const GRANT_TYPE: &str = "grant_type";
pub const MASTER_USERNAME: &str = "master_username";
pub const ENDPOINT: &str = "endpoint";
pub const ADDRESS: &str = "address";
pub const PORT: &str = "port";
pub const RESOURCE_ID: &str = "resource_id";
pub const AVAILABILITY_ZONE: &str = "availability_zone";
pub const SECURITY_GROUP_IDS: &str = "security_group_ids";
pub const PRIMARY_SUBNET: &str = "primary_subnet";

pub const DB_USERNAME: &str = "db_username";
pub const USER_ID: &str = "user_id";
pub const SSH_PUBKEY: &str = "ssh_pubkey";
pub const SAML_ROLES: &str = "saml_roles";

/// Grant types every deployment knows about.
pub const BUILTIN_GRANT_TYPES: &[(&str, &[&str])] = &[
    ("query", &["SELECT"]),
    ("crud", &["SELECT", "UPDATE", "INSERT", "DELETE"]),
];

pub const DEFAULT_GRANT_TYPE: &str = "query";
/// A grant of this type is no grant at all.
pub const NO_GRANT: &str = "none";

/// MySQL user names are at most 32 characters.
pub const MAX_DB_USERNAME_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// The model every run starts from.
pub fn seed(settings: &Settings, regions: &[String], custom: &CustomConfig) -> Tree {
    let single_region = match regions {
        [only] => Some(only.clone()),
        _ => None,
    };
    let grant_types: Tree = BUILTIN_GRANT_TYPES
        .iter()
        .map(|(name, privileges)| {
            let list: Vec<String> = privileges.iter().map(|p| p.to_string()).collect();
            (name.to_string(), Node::from(list))
        })
        .collect();
    let custom = match Node::from_yaml(custom.raw().clone()) {
        Node::Tree(tree) => tree,
        _ => Tree::new(),
    };

    Tree::new()
        .with(
            SYSTEM,
            Tree::new()
                .with("config_dir", settings.config_dir.display().to_string())
                .with("proxy", settings.proxy.clone()),
        )
        .with(
            CLOUD,
            Tree::new()
                .with(REGIONS, regions.to_vec())
                .with(SINGLE_REGION, single_region),
        )
        .with(
            DIRECTORY,
            Tree::new().with(
                "organization",
                settings.directory.as_ref().map(|d| d.organization.clone()),
            ),
        )
        .with(DATABASES, Tree::new())
        .with(USERS, Tree::new())
        .with(JOB, Tree::new().with(NEXT_TRANSITION, Value::Null))
        .with(GRANT_TYPES, grant_types)
        .with(CUSTOM, custom)
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

pub fn db_uid(region: &str, id: &str) -> String {
    format!("{region}/{id}")
}

pub fn databases(model: &Tree) -> Option<&Tree> {
    model.get_tree(DATABASES)
}

pub fn database<'a>(model: &'a Tree, uid: &str) -> Option<&'a Tree> {
    databases(model).and_then(|dbs| dbs.get_tree(uid))
}

/// Status of a database entry. Missing or unreadable means absent.
pub fn status_of(db: &Tree) -> DbStatus {
    db.get_str(STATUS)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DbStatus::Absent)
}

/// Identifiers of databases at least ENABLED, in model order.
pub fn enabled_databases(model: &Tree) -> Vec<String> {
    databases(model)
        .map(|dbs| {
            dbs.iter()
                .filter(|(_, node)| node.as_tree().is_some_and(|db| status_of(db).is_enabled()))
                .map(|(uid, _)| uid.clone())
                .collect()
        })
        .unwrap_or_default()
}

pub fn endpoint_of(db: &Tree) -> Option<Endpoint> {
    let endpoint = db.get_tree(ENDPOINT)?;
    let address = endpoint.get_str(ADDRESS)?.to_string();
    let port = u16::try_from(endpoint.get_int(PORT)?).ok()?;
    Some(Endpoint { address, port })
}

pub fn endpoint_tree(endpoint: &Endpoint) -> Tree {
    Tree::new()
        .with(ADDRESS, endpoint.address.as_str())
        .with(PORT, endpoint.port)
}

pub fn single_region(model: &Tree) -> Option<&str> {
    model.tree_at(&[CLOUD]).and_then(|c| c.get_str(SINGLE_REGION))
}

pub fn next_transition(model: &Tree) -> Option<DateTime<Utc>> {
    model.tree_at(&[JOB]).and_then(|j| j.get_time(NEXT_TRANSITION))
}

/// Logins in model order.
pub fn user_logins(model: &Tree) -> Vec<String> {
    model
        .get_tree(USERS)
        .map(|users| users.keys().cloned().collect())
        .unwrap_or_default()
}

/// `{databases: {uid: entry}}`
pub fn databases_delta(entries: Tree) -> Tree {
    Tree::new().with(DATABASES, entries)
}

/// `{users: {login: entry}}`
pub fn users_delta(entries: Tree) -> Tree {
    Tree::new().with(USERS, entries)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::from_lookup(|name| match name {
            "SARI_CONFIG" => Some("/etc/sari".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn seed_layout() {
        let seed = seed(&settings(), &["eu-west-2".to_string()], &CustomConfig::default());
        assert_eq!(single_region(&seed), Some("eu-west-2"));
        assert!(seed.path(&[JOB, NEXT_TRANSITION]).unwrap().is_null());
        assert_eq!(
            seed.tree_at(&[GRANT_TYPES]).unwrap().get_strings("crud"),
            vec!["SELECT", "UPDATE", "INSERT", "DELETE"]
        );
        assert!(databases(&seed).unwrap().is_empty());
        assert_eq!(
            seed.path(&[SYSTEM, "config_dir"]).and_then(Node::as_str),
            Some("/etc/sari")
        );
    }

    #[test]
    fn no_single_region_with_two() {
        let regions = vec!["eu-west-2".to_string(), "us-east-1".to_string()];
        let seed = seed(&settings(), &regions, &CustomConfig::default());
        assert_eq!(single_region(&seed), None);
        assert_eq!(seed.tree_at(&[CLOUD]).unwrap().get_strings(REGIONS), regions);
    }

    #[test]
    fn enabled_set_uses_status_rank() {
        let model = databases_delta(
            Tree::new()
                .with("eu/a", Tree::new().with(STATUS, "ENABLED"))
                .with("eu/b", Tree::new().with(STATUS, "DISABLED"))
                .with("eu/c", Tree::new().with(STATUS, "AUTO_ENABLED"))
                .with("eu/d", Tree::new().with(STATUS, "ACCESSIBLE"))
                .with("eu/e", Tree::new().with(STATUS, "ABSENT")),
        );
        assert_eq!(enabled_databases(&model), vec!["eu/a", "eu/c", "eu/d"]);
    }

    #[test]
    fn endpoint_roundtrip_through_tree() {
        let endpoint = Endpoint {
            address: "borders.example".to_string(),
            port: 3306,
        };
        let db = Tree::new().with(ENDPOINT, endpoint_tree(&endpoint));
        assert_eq!(endpoint_of(&db), Some(endpoint));
        assert_eq!(endpoint_of(&Tree::new()), None);
    }
}
