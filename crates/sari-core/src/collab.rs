//! External systems the engine observes.
//!
//! Every trait here is implemented outside this crate (cloud provider,
//! identity directory, SQL reachability). Implementations are shared across
//! worker threads, hence the `Send + Sync` bounds.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Cloud catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupRef {
    pub id: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRef {
    pub id: String,
    pub availability_zone: String,
    pub active: bool,
}

/// A managed database instance as reported by the cloud provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredDatabase {
    /// Instance identifier, unique within a region.
    pub id: String,
    pub db_name: Option<String>,
    pub master_username: Option<String>,
    pub endpoint: Option<Endpoint>,
    pub resource_id: Option<String>,
    pub availability_zone: Option<String>,
    pub security_groups: Vec<SecurityGroupRef>,
    pub subnets: Vec<SubnetRef>,
}

pub trait CatalogClient: Send + Sync {
    fn region(&self) -> &str;

    fn account_id(&self) -> Result<String>;

    /// Instances running the given engine (e.g. `mysql`).
    fn list_databases(&self, engine: &str) -> Result<Vec<DiscoveredDatabase>>;
}

// ---------------------------------------------------------------------------
// Secret stores
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub value: String,
    pub last_modified: Option<DateTime<Utc>>,
}

pub trait ParameterStore: Send + Sync {
    /// Decrypted value of a parameter.
    fn get_secret(&self, name: &str) -> Result<StoredValue>;
}

pub trait PropertyStore: Send + Sync {
    /// One property of a properties file held in object storage.
    fn get_property(&self, container: &str, key: &str, property: &str) -> Result<StoredValue>;
}

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub endpoint: Endpoint,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub message: String,
}

impl ProbeOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

pub trait Prober: Send + Sync {
    fn probe(&self, target: &ProbeTarget) -> ProbeOutcome;
}

// ---------------------------------------------------------------------------
// Identity directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub user_id: String,
    pub status: String,
    pub ssh_pubkey: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppAssignment {
    pub external_id: String,
    pub roles: Vec<String>,
}

pub trait DirectoryClient: Send + Sync {
    fn find_user_by_login(&self, login: &str) -> Result<Option<DirectoryUser>>;

    fn list_app_assignments(&self, app_id: &str) -> Result<Vec<AppAssignment>>;
}
