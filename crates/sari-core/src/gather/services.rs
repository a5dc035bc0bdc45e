use super::{Capability, GatherContext, Gathered, Gatherer};
use crate::error::Result;
use crate::issue::{Issue, SubjectKind};
use crate::model::{Model, Tree};
use crate::records;
use crate::schema::{
    self, AVAILABILITY_ZONE, DB_NAME, DB_NAMES, DEFAULT_GRANT_TYPE, GLUE_CONNECTIONS, GRANT_TYPE,
    PRIMARY_SUBNET, SECURITY_GROUP_IDS, SERVICES,
};
use crate::wildcard;
use std::path::PathBuf;

/// Glue connections from the optional `services.yaml`.
pub struct ServiceConfigGatherer {
    config_dir: PathBuf,
}

impl ServiceConfigGatherer {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }
}

impl Gatherer for ServiceConfigGatherer {
    fn name(&self) -> &str {
        "services"
    }

    fn requires(&self) -> &[Capability] {
        &[Capability::DiscoveredDatabases]
    }

    fn produces(&self) -> &[Capability] {
        &[Capability::Services]
    }

    fn gather(&self, model: &Model, _ctx: &GatherContext<'_>) -> Result<Gathered> {
        let Some(document) = records::load_services(&self.config_dir)? else {
            return Ok(Gathered::default());
        };
        let enabled = schema::enabled_databases(model);
        let mut issues = Vec::new();
        let mut connections = Tree::new();

        for conn in document.glue_connections {
            let uids = match wildcard::expand(&conn.db, &enabled) {
                Ok(uids) if !uids.is_empty() => uids,
                Ok(_) => {
                    issues.push(Issue::error(
                        SubjectKind::Glue,
                        &conn.db,
                        format!("Not existing and enabled DB instance reference '{}'", conn.db),
                    ));
                    continue;
                }
                Err(e) => {
                    issues.push(Issue::error(SubjectKind::Glue, &conn.db, e.to_string()));
                    continue;
                }
            };
            let grant_type = conn.grant_type.as_deref().unwrap_or(DEFAULT_GRANT_TYPE);
            let db_names = conn.db_names.clone().map(|names| names.into_vec());
            let pcr = &conn.physical_connection_requirements;

            for uid in uids {
                let db = schema::database(model, &uid).cloned().unwrap_or_default();
                let requirements = Tree::new()
                    .with(
                        AVAILABILITY_ZONE,
                        pcr.availability_zone
                            .clone()
                            .or_else(|| db.get_str(AVAILABILITY_ZONE).map(str::to_string)),
                    )
                    .with(
                        "security_group_id_list",
                        pcr.security_group_id_list
                            .clone()
                            .unwrap_or_else(|| db.get_strings(SECURITY_GROUP_IDS)),
                    )
                    .with(
                        "subnet_id",
                        pcr.subnet_id
                            .clone()
                            .or_else(|| db.get_str(PRIMARY_SUBNET).map(str::to_string)),
                    );
                let names = db_names.clone().unwrap_or_else(|| {
                    db.get_str(DB_NAME)
                        .map(|n| vec![n.to_string()])
                        .unwrap_or_default()
                });
                connections.insert(
                    uid,
                    Tree::new()
                        .with(GRANT_TYPE, grant_type)
                        .with(DB_NAMES, names)
                        .with("physical_connection_requirements", requirements),
                );
            }
        }

        let delta = Tree::new().with(SERVICES, Tree::new().with(GLUE_CONNECTIONS, connections));
        Ok(Gathered::new(delta, issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use crate::pool::WorkerPool;
    use crate::schema::STATUS;
    use crate::testing::ts;
    use std::time::Duration;
    use tempfile::TempDir;

    fn model() -> Model {
        Model::new(schema::databases_delta(
            Tree::new()
                .with(
                    "eu-west-2/borders",
                    Tree::new()
                        .with(STATUS, "ACCESSIBLE")
                        .with(DB_NAME, "borders")
                        .with(AVAILABILITY_ZONE, "eu-west-2a")
                        .with(SECURITY_GROUP_IDS, vec!["sg-1".to_string()])
                        .with(PRIMARY_SUBNET, "subnet-a"),
                )
                .with("eu-west-2/foyles", Tree::new().with(STATUS, "DISABLED")),
        ))
    }

    fn run(yaml: Option<&str>) -> Gathered {
        let dir = TempDir::new().unwrap();
        if let Some(yaml) = yaml {
            std::fs::write(dir.path().join("services.yaml"), yaml).unwrap();
        }
        let pool = WorkerPool::new(1, Duration::from_secs(1)).unwrap();
        let ctx = GatherContext {
            pool: &pool,
            now: ts("2020-05-15T12:00:00Z"),
        };
        let out = ServiceConfigGatherer::new(dir.path().to_path_buf())
            .gather(&model(), &ctx)
            .unwrap();
        pool.shutdown();
        out
    }

    #[test]
    fn missing_file_is_a_no_op() {
        let out = run(None);
        assert!(out.delta.is_empty());
        assert!(out.issues.is_empty());
    }

    #[test]
    fn requirements_default_to_discovered_placement() {
        let out = run(Some("glue_connections:\n  - db: 'eu-west-2/*'\n"));
        assert!(out.issues.is_empty());
        let conn = out
            .delta
            .tree_at(&[SERVICES, GLUE_CONNECTIONS, "eu-west-2/borders"])
            .unwrap();
        assert_eq!(conn.get_str(GRANT_TYPE), Some("query"));
        assert_eq!(conn.get_strings(DB_NAMES), vec!["borders"]);
        let pcr = conn.get_tree("physical_connection_requirements").unwrap();
        assert_eq!(pcr.get_str(AVAILABILITY_ZONE), Some("eu-west-2a"));
        assert_eq!(pcr.get_strings("security_group_id_list"), vec!["sg-1"]);
        assert_eq!(pcr.get_str("subnet_id"), Some("subnet-a"));
    }

    #[test]
    fn explicit_requirements_win() {
        let out = run(Some(
            "glue_connections:\n  - db: eu-west-2/borders\n    grant_type: crud\n    db_names: orders\n    physical_connection_requirements:\n      subnet_id: subnet-z\n",
        ));
        let conn = out
            .delta
            .tree_at(&[SERVICES, GLUE_CONNECTIONS, "eu-west-2/borders"])
            .unwrap();
        assert_eq!(conn.get_str(GRANT_TYPE), Some("crud"));
        assert_eq!(conn.get_strings(DB_NAMES), vec!["orders"]);
        assert_eq!(
            conn.path(&["physical_connection_requirements", "subnet_id"])
                .and_then(Node::as_str),
            Some("subnet-z")
        );
    }

    #[test]
    fn disabled_target_is_a_glue_error() {
        let out = run(Some("glue_connections:\n  - db: eu-west-2/foyles\n"));
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].kind, SubjectKind::Glue);
        assert_eq!(out.issues[0].id, "eu-west-2/foyles");
    }
}
