//! In-memory collaborators for unit tests.

use crate::collab::{
    AppAssignment, CatalogClient, DirectoryClient, DirectoryUser, DiscoveredDatabase, Endpoint,
    ParameterStore, ProbeOutcome, ProbeTarget, Prober, PropertyStore, StoredValue,
};
use crate::error::{Result, SariError};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

// ---------------------------------------------------------------------------
// Secret stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeStores {
    parameters: HashMap<String, StoredValue>,
    properties: HashMap<(String, String, String), StoredValue>,
}

impl FakeStores {
    pub fn with_parameter(
        mut self,
        name: &str,
        value: &str,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        self.parameters.insert(
            name.to_string(),
            StoredValue {
                value: value.to_string(),
                last_modified,
            },
        );
        self
    }

    pub fn with_property(
        mut self,
        container: &str,
        key: &str,
        property: &str,
        value: &str,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        self.properties.insert(
            (container.to_string(), key.to_string(), property.to_string()),
            StoredValue {
                value: value.to_string(),
                last_modified,
            },
        );
        self
    }
}

impl ParameterStore for FakeStores {
    fn get_secret(&self, name: &str) -> Result<StoredValue> {
        self.parameters
            .get(name)
            .cloned()
            .ok_or_else(|| SariError::Collaborator(format!("ParameterNotFound: {name}")))
    }
}

impl PropertyStore for FakeStores {
    fn get_property(&self, container: &str, key: &str, property: &str) -> Result<StoredValue> {
        self.properties
            .get(&(container.to_string(), key.to_string(), property.to_string()))
            .cloned()
            .ok_or_else(|| SariError::Collaborator(format!("NoSuchKey: {container}/{key}")))
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub struct FakeCatalog {
    region: String,
    account: String,
    databases: Vec<DiscoveredDatabase>,
}

impl FakeCatalog {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            account: "123456789012".to_string(),
            databases: Vec::new(),
        }
    }

    pub fn with_database(mut self, db: DiscoveredDatabase) -> Self {
        self.databases.push(db);
        self
    }
}

impl CatalogClient for FakeCatalog {
    fn region(&self) -> &str {
        &self.region
    }

    fn account_id(&self) -> Result<String> {
        Ok(self.account.clone())
    }

    fn list_databases(&self, _engine: &str) -> Result<Vec<DiscoveredDatabase>> {
        Ok(self.databases.clone())
    }
}

/// A live instance with an endpoint, one active security group and one
/// active subnet in `eu-west-2a`.
pub fn discovered(id: &str) -> DiscoveredDatabase {
    DiscoveredDatabase {
        id: id.to_string(),
        db_name: Some(id.to_string()),
        master_username: Some("root".to_string()),
        endpoint: Some(Endpoint {
            address: format!("{id}.cfxxae8cilce.eu-west-2.rds.amazonaws.com"),
            port: 3306,
        }),
        resource_id: Some(format!("db-{}", id.to_uppercase())),
        availability_zone: Some("eu-west-2a".to_string()),
        security_groups: vec![crate::collab::SecurityGroupRef {
            id: "sg-0a1b2c".to_string(),
            active: true,
        }],
        subnets: vec![crate::collab::SubnetRef {
            id: "subnet-123".to_string(),
            availability_zone: "eu-west-2a".to_string(),
            active: true,
        }],
    }
}

// ---------------------------------------------------------------------------
// Prober
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeProber {
    outcomes: HashMap<String, ProbeOutcome>,
    delays: HashMap<String, Duration>,
    probed: Mutex<Vec<ProbeTarget>>,
}

impl FakeProber {
    pub fn with_outcome(mut self, address: &str, outcome: ProbeOutcome) -> Self {
        self.outcomes.insert(address.to_string(), outcome);
        self
    }

    pub fn with_delay(mut self, address: &str, delay: Duration) -> Self {
        self.delays.insert(address.to_string(), delay);
        self
    }

    pub fn probed(&self) -> Vec<ProbeTarget> {
        self.probed.lock().unwrap().clone()
    }
}

impl Prober for FakeProber {
    fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        self.probed.lock().unwrap().push(target.clone());
        let address = target.endpoint.address.as_str();
        if let Some(delay) = self.delays.get(address) {
            std::thread::sleep(*delay);
        }
        self.outcomes
            .get(address)
            .cloned()
            .unwrap_or_else(|| ProbeOutcome::failed("ERROR: Can't connect to MySQL server"))
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDirectory {
    users: HashMap<String, DirectoryUser>,
    broken: HashSet<String>,
    assignments: Vec<AppAssignment>,
}

impl FakeDirectory {
    pub fn with_user(mut self, login: &str, status: &str, ssh_pubkey: Option<&str>) -> Self {
        self.users.insert(
            login.to_string(),
            DirectoryUser {
                user_id: format!("00u{}", login.len()),
                status: status.to_string(),
                ssh_pubkey: ssh_pubkey.map(str::to_string),
            },
        );
        self
    }

    /// Lookups for `login` fail with a collaborator error.
    pub fn with_failure(mut self, login: &str) -> Self {
        self.broken.insert(login.to_string());
        self
    }

    pub fn with_assignment(mut self, external_id: &str, roles: &[&str]) -> Self {
        self.assignments.push(AppAssignment {
            external_id: external_id.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        });
        self
    }
}

impl DirectoryClient for FakeDirectory {
    fn find_user_by_login(&self, login: &str) -> Result<Option<DirectoryUser>> {
        if self.broken.contains(login) {
            return Err(SariError::Collaborator("503 Service Unavailable".to_string()));
        }
        Ok(self.users.get(login).cloned())
    }

    fn list_app_assignments(&self, _app_id: &str) -> Result<Vec<AppAssignment>> {
        Ok(self.assignments.clone())
    }
}
