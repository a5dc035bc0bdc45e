use super::{Capability, GatherContext, Gathered, Gatherer};
use crate::error::Result;
use crate::issue::{Issue, SubjectKind};
use crate::model::{Model, Tree};
use crate::records;
use crate::schema::{self, MASTER_PASSWORD, PASSWORD_AGE, PERMISSIONS, STATUS};
use crate::secrets::SecretResolver;
use crate::status::DbStatus;
use std::path::PathBuf;
use std::sync::Arc;

/// Loads `<region>/databases.yaml` and resolves the master password of every
/// enabled database.
pub struct DatabaseConfigGatherer {
    region: String,
    config_dir: PathBuf,
    resolver: Arc<SecretResolver>,
    name: String,
}

impl DatabaseConfigGatherer {
    pub fn new(region: impl Into<String>, config_dir: PathBuf, resolver: Arc<SecretResolver>) -> Self {
        let region = region.into();
        let name = format!("db-config[{region}]");
        Self {
            region,
            config_dir,
            resolver,
            name,
        }
    }
}

impl Gatherer for DatabaseConfigGatherer {
    fn name(&self) -> &str {
        &self.name
    }

    fn produces(&self) -> &[Capability] {
        &[Capability::ConfiguredDatabases]
    }

    fn gather(&self, _model: &Model, ctx: &GatherContext<'_>) -> Result<Gathered> {
        let records = records::load_databases(&self.config_dir, &self.region)?;
        let mut issues = Vec::new();
        let mut databases = Tree::new();

        for record in records {
            let uid = schema::db_uid(&self.region, &record.id);
            let enabled = match record.is_enabled() {
                Ok(enabled) => enabled,
                Err(e) => {
                    issues.push(Issue::error(SubjectKind::Db, uid, e.to_string()));
                    continue;
                }
            };
            if !enabled {
                databases.insert(uid, Tree::new().with(STATUS, DbStatus::Disabled.as_str()));
                continue;
            }
            match self
                .resolver
                .resolve(&record.id, record.master_password.as_deref(), ctx.now)
            {
                Ok(secret) => {
                    databases.insert(
                        uid,
                        Tree::new()
                            .with(STATUS, DbStatus::Enabled.as_str())
                            .with(PERMISSIONS, Tree::new())
                            .with(MASTER_PASSWORD, secret.value)
                            .with(PASSWORD_AGE, secret.age_days),
                    );
                }
                Err(e) => {
                    tracing::debug!(db = %uid, error = %e, "master password not resolved");
                    issues.push(Issue::error(SubjectKind::Db, uid, e.to_string()));
                }
            }
        }

        Ok(Gathered::new(schema::databases_delta(databases), issues))
    }
}
