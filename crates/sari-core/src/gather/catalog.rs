//! Reconciles configured databases of one region with the live catalog.
//!
//! | configured | live | outcome                                         |
//! |------------|------|-------------------------------------------------|
//! | ENABLED    | yes  | discovery metadata merged, status kept          |
//! | ENABLED    | no   | ERROR "Not found in AWS", status ABSENT         |
//! | DISABLED   | any  | untouched                                       |
//! | no         | yes  | per [`UnconfiguredPolicy`]                      |

use super::{Capability, GatherContext, Gathered, Gatherer};
use crate::collab::{CatalogClient, DiscoveredDatabase};
use crate::config::UnconfiguredPolicy;
use crate::error::Result;
use crate::issue::{Issue, SubjectKind};
use crate::model::{Model, Tree};
use crate::schema::{
    self, AVAILABILITY_ZONE, DB_NAME, ENDPOINT, MASTER_PASSWORD, MASTER_USERNAME, PASSWORD_AGE,
    PERMISSIONS, PRIMARY_SUBNET, RESOURCE_ID, SECURITY_GROUP_IDS, STATUS,
};
use crate::secrets::SecretResolver;
use crate::status::DbStatus;
use std::sync::Arc;

pub const ENGINE: &str = "mysql";

pub struct CatalogGatherer {
    catalog: Arc<dyn CatalogClient>,
    resolver: Arc<SecretResolver>,
    policy: UnconfiguredPolicy,
    name: String,
}

impl CatalogGatherer {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        resolver: Arc<SecretResolver>,
        policy: UnconfiguredPolicy,
    ) -> Self {
        let name = format!("catalog[{}]", catalog.region());
        Self {
            catalog,
            resolver,
            policy,
            name,
        }
    }

    fn adopt(&self, live: &DiscoveredDatabase, ctx: &GatherContext<'_>) -> Result<Tree> {
        let secret = self.resolver.resolve(&live.id, None, ctx.now)?;
        Ok(Tree::new()
            .with(STATUS, DbStatus::AutoEnabled.as_str())
            .with(PERMISSIONS, Tree::new())
            .with(MASTER_PASSWORD, secret.value)
            .with(PASSWORD_AGE, secret.age_days))
    }
}

impl Gatherer for CatalogGatherer {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> &[Capability] {
        &[Capability::ConfiguredDatabases]
    }

    fn produces(&self) -> &[Capability] {
        &[Capability::DiscoveredDatabases]
    }

    fn gather(&self, model: &Model, ctx: &GatherContext<'_>) -> Result<Gathered> {
        let region = self.catalog.region();
        let prefix = format!("{region}/");
        let configured = schema::databases(model).cloned().unwrap_or_default();

        // Every enabled database of this region starts out missing.
        let mut missing: Vec<String> = configured
            .iter()
            .filter(|(uid, node)| {
                uid.starts_with(&prefix)
                    && node
                        .as_tree()
                        .is_some_and(|db| schema::status_of(db) == DbStatus::Enabled)
            })
            .map(|(uid, _)| uid.clone())
            .collect();

        let live = self.catalog.list_databases(ENGINE)?;
        tracing::info!("Found {} {ENGINE} instance(s) in {region}", live.len());

        let mut issues = Vec::new();
        let mut databases = Tree::new();
        for db in &live {
            let uid = schema::db_uid(region, &db.id);
            let mut entry = match configured.get_tree(&uid) {
                None => match self.policy {
                    UnconfiguredPolicy::Warn => {
                        issues.push(Issue::warning(
                            SubjectKind::Db,
                            uid,
                            "Present in AWS but NOT configured",
                        ));
                        continue;
                    }
                    UnconfiguredPolicy::AutoEnable => match self.adopt(db, ctx) {
                        Ok(entry) => entry,
                        Err(e) => {
                            issues.push(Issue::warning(
                                SubjectKind::Db,
                                uid,
                                format!("Failed to auto-configure: {e}"),
                            ));
                            continue;
                        }
                    },
                },
                Some(cfg) if schema::status_of(cfg) == DbStatus::Enabled => {
                    missing.retain(|m| *m != uid);
                    Tree::new()
                }
                Some(_) => continue,
            };
            entry.merge(discovery_metadata(db))?;
            databases.insert(uid, entry);
        }

        for uid in missing {
            databases.insert(
                uid.clone(),
                Tree::new().with(STATUS, DbStatus::Absent.as_str()),
            );
            issues.push(Issue::error(SubjectKind::Db, uid, "Not found in AWS"));
        }

        Ok(Gathered::new(schema::databases_delta(databases), issues))
    }
}

/// Placement and connection details of a live instance.
fn discovery_metadata(db: &DiscoveredDatabase) -> Tree {
    let active_subnets: Vec<_> = db.subnets.iter().filter(|s| s.active).collect();
    // Without an instance zone, pick the first active subnet's zone.
    let availability_zone = db
        .availability_zone
        .clone()
        .or_else(|| active_subnets.first().map(|s| s.availability_zone.clone()));
    let primary_subnet = availability_zone.as_ref().and_then(|az| {
        active_subnets
            .iter()
            .find(|s| &s.availability_zone == az)
            .map(|s| s.id.clone())
    });
    let security_group_ids: Vec<String> = db
        .security_groups
        .iter()
        .filter(|sg| sg.active)
        .map(|sg| sg.id.clone())
        .collect();

    Tree::new()
        .with(DB_NAME, db.db_name.clone())
        .with(MASTER_USERNAME, db.master_username.clone())
        .with(ENDPOINT, db.endpoint.as_ref().map(schema::endpoint_tree))
        .with(RESOURCE_ID, db.resource_id.clone())
        .with(AVAILABILITY_ZONE, availability_zone)
        .with(SECURITY_GROUP_IDS, security_group_ids)
        .with(PRIMARY_SUBNET, primary_subnet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{SecurityGroupRef, SubnetRef};
    use crate::issue::IssueLevel;
    use crate::pool::WorkerPool;
    use crate::secrets::PasswordDefaults;
    use crate::testing::{discovered, ts, FakeCatalog, FakeStores};
    use std::time::Duration;

    fn configured() -> Model {
        Model::new(schema::databases_delta(
            Tree::new()
                .with(
                    "eu-west-2/borders",
                    Tree::new()
                        .with(STATUS, "ENABLED")
                        .with(MASTER_PASSWORD, "vigilant_swirles"),
                )
                .with("eu-west-2/foyles", Tree::new().with(STATUS, "DISABLED"))
                .with("eu-west-2/whsmith", Tree::new().with(STATUS, "ENABLED"))
                .with("us-east-1/strand", Tree::new().with(STATUS, "ENABLED")),
        ))
    }

    fn run(catalog: FakeCatalog, stores: FakeStores, policy: UnconfiguredPolicy) -> Gathered {
        let stores = Arc::new(stores);
        let resolver = Arc::new(SecretResolver::new(
            stores.clone(),
            stores,
            PasswordDefaults::builtin(),
        ));
        let gatherer = CatalogGatherer::new(Arc::new(catalog), resolver, policy);
        let pool = WorkerPool::new(1, Duration::from_secs(1)).unwrap();
        let ctx = GatherContext {
            pool: &pool,
            now: ts("2020-05-15T12:00:00Z"),
        };
        let out = gatherer.gather(&configured(), &ctx).unwrap();
        pool.shutdown();
        out
    }

    #[test]
    fn borders_foyles_whsmith() {
        let catalog = FakeCatalog::new("eu-west-2")
            .with_database(discovered("borders"))
            .with_database(discovered("foyles"));
        let out = run(catalog, FakeStores::default(), UnconfiguredPolicy::Warn);

        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].level, IssueLevel::Error);
        assert_eq!(out.issues[0].id, "eu-west-2/whsmith");
        assert_eq!(out.issues[0].message, "Not found in AWS");

        let mut model = configured();
        model.merge(out.delta).unwrap();
        let status = |uid: &str| schema::status_of(schema::database(&model, uid).unwrap());
        assert_eq!(status("eu-west-2/borders"), DbStatus::Enabled);
        assert_eq!(status("eu-west-2/foyles"), DbStatus::Disabled);
        assert_eq!(status("eu-west-2/whsmith"), DbStatus::Absent);

        let borders = schema::database(&model, "eu-west-2/borders").unwrap();
        assert_eq!(borders.get_str(MASTER_PASSWORD), Some("vigilant_swirles"));
        assert_eq!(borders.get_str(PRIMARY_SUBNET), Some("subnet-123"));
        assert_eq!(borders.get_strings(SECURITY_GROUP_IDS), vec!["sg-0a1b2c"]);
        assert_eq!(schema::endpoint_of(borders).unwrap().port, 3306);
    }

    #[test]
    fn other_regions_are_left_alone() {
        let out = run(
            FakeCatalog::new("eu-west-2").with_database(discovered("borders")),
            FakeStores::default(),
            UnconfiguredPolicy::Warn,
        );
        assert!(!out.issues.iter().any(|i| i.id.starts_with("us-east-1/")));
        assert!(out.delta.tree_at(&["databases", "us-east-1/strand"]).is_none());
    }

    #[test]
    fn unconfigured_instance_warns_once_and_is_excluded() {
        let catalog = FakeCatalog::new("eu-west-2")
            .with_database(discovered("borders"))
            .with_database(discovered("whsmith"))
            .with_database(discovered("waterstones"));
        let out = run(catalog, FakeStores::default(), UnconfiguredPolicy::Warn);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].level, IssueLevel::Warning);
        assert_eq!(out.issues[0].id, "eu-west-2/waterstones");
        assert!(out.delta.tree_at(&["databases", "eu-west-2/waterstones"]).is_none());
    }

    #[test]
    fn auto_enable_adopts_with_inferred_password() {
        let catalog = FakeCatalog::new("eu-west-2")
            .with_database(discovered("borders"))
            .with_database(discovered("whsmith"))
            .with_database(discovered("waterstones"));
        let stores = FakeStores::default().with_parameter(
            "waterstones.master_password",
            "pw",
            Some(ts("2020-05-14T12:00:00Z")),
        );
        let out = run(catalog, stores, UnconfiguredPolicy::AutoEnable);
        assert!(out.issues.is_empty());
        let adopted = out
            .delta
            .tree_at(&["databases", "eu-west-2/waterstones"])
            .unwrap();
        assert_eq!(adopted.get_str(STATUS), Some("AUTO_ENABLED"));
        assert_eq!(adopted.get_int(PASSWORD_AGE), Some(1));
        assert_eq!(adopted.get_str(DB_NAME), Some("waterstones"));
    }

    #[test]
    fn auto_enable_failure_is_a_warning() {
        let catalog = FakeCatalog::new("eu-west-2")
            .with_database(discovered("borders"))
            .with_database(discovered("whsmith"))
            .with_database(discovered("waterstones"));
        let out = run(catalog, FakeStores::default(), UnconfiguredPolicy::AutoEnable);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].level, IssueLevel::Warning);
        assert!(out.issues[0].message.starts_with("Failed to auto-configure: "));
    }

    #[test]
    fn zone_falls_back_to_first_active_subnet() {
        let db = DiscoveredDatabase {
            availability_zone: None,
            security_groups: vec![
                SecurityGroupRef {
                    id: "sg-old".to_string(),
                    active: false,
                },
                SecurityGroupRef {
                    id: "sg-new".to_string(),
                    active: true,
                },
            ],
            subnets: vec![
                SubnetRef {
                    id: "subnet-x".to_string(),
                    availability_zone: "eu-west-2c".to_string(),
                    active: false,
                },
                SubnetRef {
                    id: "subnet-b1".to_string(),
                    availability_zone: "eu-west-2b".to_string(),
                    active: true,
                },
                SubnetRef {
                    id: "subnet-b2".to_string(),
                    availability_zone: "eu-west-2b".to_string(),
                    active: true,
                },
            ],
            ..discovered("borders")
        };
        let meta = discovery_metadata(&db);
        assert_eq!(meta.get_str(AVAILABILITY_ZONE), Some("eu-west-2b"));
        assert_eq!(meta.get_str(PRIMARY_SUBNET), Some("subnet-b1"));
        assert_eq!(meta.get_strings(SECURITY_GROUP_IDS), vec!["sg-new"]);
    }
}
