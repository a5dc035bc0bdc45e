use super::{dot_leader, Capability, GatherContext, Gathered, Gatherer};
use crate::collab::{ProbeOutcome, ProbeTarget, Prober};
use crate::error::Result;
use crate::issue::{Issue, SubjectKind};
use crate::model::{Model, Tree};
use crate::pool::{TaskError, WorkerPool};
use crate::schema::{self, MASTER_PASSWORD, MASTER_USERNAME, STATUS};
use crate::status::DbStatus;
use std::sync::Arc;

/// Probes every enabled database that has an endpoint and promotes the
/// reachable ones to ACCESSIBLE.
pub struct ReachabilityGatherer {
    prober: Arc<dyn Prober>,
}

impl ReachabilityGatherer {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }
}

impl Gatherer for ReachabilityGatherer {
    fn name(&self) -> &str {
        "reachability"
    }

    fn requires(&self) -> &[Capability] {
        &[Capability::DiscoveredDatabases]
    }

    fn produces(&self) -> &[Capability] {
        &[Capability::Reachability]
    }

    fn gather(&self, model: &Model, ctx: &GatherContext<'_>) -> Result<Gathered> {
        let Some(databases) = schema::databases(model).filter(|dbs| !dbs.is_empty()) else {
            return Ok(Gathered::default());
        };

        let checks = self.check_all(databases, ctx.pool);

        tracing::info!("Checking access to database instances:");
        let width = databases.keys().map(|k| k.chars().count()).max().unwrap_or(0);
        let mut issues = Vec::new();
        let mut updates = Tree::new();
        for (uid, check) in checks {
            match check {
                Check::Probed(outcome) if outcome.ok => {
                    tracing::info!("{} {}", dot_leader(&uid, width), outcome.message);
                    updates.insert(
                        uid,
                        Tree::new().with(STATUS, DbStatus::Accessible.as_str()),
                    );
                }
                Check::Probed(outcome) => {
                    tracing::warn!("{} {}", dot_leader(&uid, width), outcome.message);
                    issues.push(Issue::error(SubjectKind::Db, uid, outcome.message));
                }
                Check::Skipped(status) => {
                    tracing::info!("{} {status}", dot_leader(&uid, width));
                }
            }
        }

        Ok(Gathered::new(schema::databases_delta(updates), issues))
    }
}

/// What happened to one database, reported in catalog order.
#[derive(Debug, Clone, PartialEq)]
enum Check {
    Probed(ProbeOutcome),
    /// Not enabled or no endpoint yet; the current status is the reason.
    Skipped(DbStatus),
}

impl ReachabilityGatherer {
    fn check_all(&self, databases: &Tree, pool: &WorkerPool) -> Vec<(String, Check)> {
        let mut order = Vec::new();
        let mut probes = Vec::new();
        for (uid, node) in databases.iter() {
            let Some(db) = node.as_tree() else { continue };
            let status = schema::status_of(db);
            match schema::endpoint_of(db).filter(|_| status.is_enabled()) {
                Some(endpoint) => {
                    probes.push(ProbeTarget {
                        endpoint,
                        username: db.get_str(MASTER_USERNAME).map(str::to_string),
                        password: db.get_str(MASTER_PASSWORD).map(str::to_string),
                    });
                    order.push((uid.clone(), None));
                }
                None => order.push((uid.clone(), Some(status))),
            }
        }

        let prober = Arc::clone(&self.prober);
        let mut results = pool
            .map(probes, move |target| prober.probe(&target))
            .into_iter();
        order
            .into_iter()
            .map(|(uid, skipped)| {
                let check = match skipped {
                    Some(status) => Check::Skipped(status),
                    None => Check::Probed(match results.next() {
                        Some(Ok(outcome)) => outcome,
                        Some(Err(e)) => ProbeOutcome::failed(e.to_string()),
                        None => ProbeOutcome::failed(TaskError::Closed.to_string()),
                    }),
                };
                (uid, check)
            })
            .collect()
    }
}
