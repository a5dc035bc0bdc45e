//! Users and their time-windowed database permissions.
//!
//! Every permission entry is resolved on its own:
//!
//! 1. a reference without a region gets the single configured region;
//! 2. the reference is expanded against the enabled databases;
//! 3. the grant window picks between the entry's grant type (active) and the
//!    user's default grant type (inactive or invalid window);
//! 4. a `none` grant is dropped.
//!
//! Future window bounds feed `job.next_transition`.

use super::{Capability, GatherContext, Gathered, Gatherer};
use crate::error::Result;
use crate::issue::{Issue, SubjectKind};
use crate::model::{Model, Tree};
use crate::period::{GrantWindow, TransitionTracker};
use crate::records::{self, PermissionRecord};
use crate::schema::{
    self, DATABASES, DB_NAME, DB_NAMES, DB_USERNAME, DEFAULT_GRANT_TYPE, GRANT_TYPE, JOB,
    MAX_DB_USERNAME_LENGTH, NEXT_TRANSITION, NO_GRANT, PERMISSIONS, USERS,
};
use crate::wildcard;
use std::path::PathBuf;

pub struct UserConfigGatherer {
    config_dir: PathBuf,
}

impl UserConfigGatherer {
    pub fn new(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }
}

/// One resolved grant on one database.
struct Grant {
    uid: String,
    grant_type: String,
    db_names: Vec<String>,
}

impl Gatherer for UserConfigGatherer {
    fn name(&self) -> &str {
        "users"
    }

    fn requires(&self) -> &[Capability] {
        &[Capability::DiscoveredDatabases]
    }

    fn produces(&self) -> &[Capability] {
        &[Capability::Users]
    }

    fn gather(&self, model: &Model, ctx: &GatherContext<'_>) -> Result<Gathered> {
        let users = records::load_users(&self.config_dir)?;
        let mut resolver = EntryResolver {
            model,
            enabled: schema::enabled_databases(model),
            single_region: schema::single_region(model),
            tracker: TransitionTracker::new(ctx.now, schema::next_transition(model)),
            issues: Vec::new(),
        };

        let mut user_entries = Tree::new();
        let mut db_entries = Tree::new();
        for user in users {
            let default_grant = user
                .default_grant_type
                .as_deref()
                .unwrap_or(DEFAULT_GRANT_TYPE);
            let mut permissions = Tree::new();

            for perm in &user.permissions {
                for grant in resolver.resolve(&user.login, default_grant, perm) {
                    db_entries
                        .subtree_mut(&grant.uid)?
                        .subtree_mut(PERMISSIONS)?
                        .insert(user.login.clone(), grant.grant_type.clone());
                    permissions.insert(
                        grant.uid,
                        Tree::new()
                            .with(GRANT_TYPE, grant.grant_type)
                            .with(DB_NAMES, grant.db_names),
                    );
                }
            }

            let db_username: String = user.login.chars().take(MAX_DB_USERNAME_LENGTH).collect();
            user_entries.insert(
                user.login,
                Tree::new()
                    .with(DB_USERNAME, db_username)
                    .with(PERMISSIONS, permissions),
            );
        }

        let mut delta = Tree::new()
            .with(USERS, user_entries)
            .with(DATABASES, db_entries);
        if let Some(next) = resolver.tracker.next_transition() {
            delta.insert(JOB, Tree::new().with(NEXT_TRANSITION, next));
        }
        Ok(Gathered::new(delta, resolver.issues))
    }
}

struct EntryResolver<'a> {
    model: &'a Model,
    enabled: Vec<String>,
    single_region: Option<&'a str>,
    tracker: TransitionTracker,
    issues: Vec<Issue>,
}

impl EntryResolver<'_> {
    /// Grants of one permission entry. Problems are recorded as issues
    /// against `login`; an entry that cannot be placed grants nothing.
    fn resolve(&mut self, login: &str, default_grant: &str, perm: &PermissionRecord) -> Vec<Grant> {
        let db_ref = match self.single_region {
            Some(region) if !perm.db.contains('/') => schema::db_uid(region, &perm.db),
            _ => perm.db.clone(),
        };
        let uids = match wildcard::expand(&db_ref, &self.enabled) {
            Ok(uids) if !uids.is_empty() => uids,
            Ok(_) => {
                self.issues.push(Issue::error(
                    SubjectKind::User,
                    login,
                    format!("Not existing and enabled DB instance reference '{db_ref}'"),
                ));
                return Vec::new();
            }
            Err(e) => {
                self.issues
                    .push(Issue::error(SubjectKind::User, login, e.to_string()));
                return Vec::new();
            }
        };

        let grant_type = match GrantWindow::parse(
            perm.not_valid_before.as_deref(),
            perm.not_valid_after.as_deref(),
        ) {
            Ok(window) if self.tracker.evaluate(&window) => {
                perm.grant_type.as_deref().unwrap_or(default_grant)
            }
            Ok(_) => default_grant,
            Err(e) => {
                self.issues
                    .push(Issue::error(SubjectKind::User, login, e.to_string()));
                default_grant
            }
        };
        if grant_type == NO_GRANT {
            return Vec::new();
        }

        let explicit_names = perm.db_names.clone().map(|names| names.into_vec());
        uids.into_iter()
            .map(|uid| {
                let db_names = explicit_names.clone().unwrap_or_else(|| {
                    schema::database(self.model, &uid)
                        .and_then(|db| db.get_str(DB_NAME))
                        .map(|name| vec![name.to_string()])
                        .unwrap_or_default()
                });
                Grant {
                    uid,
                    grant_type: grant_type.to_string(),
                    db_names,
                }
            })
            .collect()
    }
}
