//! Gatherers: units that read the current model and return a delta plus
//! issues.
//!
//! Each gatherer declares the capabilities it needs from earlier stages and
//! the ones it provides, so the pipeline can reject a misordered stage list
//! before anything runs.

use crate::error::Result;
use crate::issue::Issue;
use crate::model::{Delta, Model};
use crate::pool::WorkerPool;
use chrono::{DateTime, Utc};
use std::fmt;

pub mod account;
pub mod catalog;
pub mod db_config;
pub mod directory;
pub mod reachability;
pub mod services;
pub mod users;

pub use account::AccountGatherer;
pub use catalog::CatalogGatherer;
pub use db_config::DatabaseConfigGatherer;
pub use directory::DirectoryGatherer;
pub use reachability::ReachabilityGatherer;
pub use services::ServiceConfigGatherer;
pub use users::UserConfigGatherer;

/// A part of the model a stage fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `cloud.account`
    Account,
    /// Database entries with ENABLED/DISABLED status and credentials.
    ConfiguredDatabases,
    /// Discovery metadata and ABSENT/AUTO_ENABLED statuses.
    DiscoveredDatabases,
    /// ACCESSIBLE statuses.
    Reachability,
    /// `users` with permissions, `job.next_transition`.
    Users,
    /// `services.glue_connections`
    Services,
    /// Directory status and keys on `users`.
    DirectoryUsers,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Account => "account",
            Capability::ConfiguredDatabases => "configured databases",
            Capability::DiscoveredDatabases => "discovered databases",
            Capability::Reachability => "reachability",
            Capability::Users => "users",
            Capability::Services => "services",
            Capability::DirectoryUsers => "directory users",
        };
        f.write_str(name)
    }
}

/// What one gatherer returns.
#[derive(Debug, Default)]
pub struct Gathered {
    pub delta: Delta,
    pub issues: Vec<Issue>,
}

impl Gathered {
    pub fn new(delta: Delta, issues: Vec<Issue>) -> Self {
        Self { delta, issues }
    }
}

/// Run-wide resources lent to each gatherer.
pub struct GatherContext<'a> {
    pub pool: &'a WorkerPool,
    /// Reference instant of the run; every grant window is evaluated
    /// against it.
    pub now: DateTime<Utc>,
}

pub trait Gatherer: Send + Sync {
    fn name(&self) -> &str;

    fn requires(&self) -> &[Capability] {
        &[]
    }

    fn produces(&self) -> &[Capability];

    /// Read `model` and return what to merge into it. Entity-scoped failures
    /// are returned as issues; an `Err` aborts the run.
    fn gather(&self, model: &Model, ctx: &GatherContext<'_>) -> Result<Gathered>;
}

/// `"  name ..... message"` with dots padding every name to `width`.
pub(crate) fn dot_leader(name: &str, width: usize) -> String {
    let dots = ".".repeat(2 + width.saturating_sub(name.chars().count()));
    format!("  {name} {dots}")
}
