use super::{dot_leader, Capability, GatherContext, Gathered, Gatherer};
use crate::collab::{DirectoryClient, DirectoryUser};
use crate::error::Result;
use crate::issue::{Issue, SubjectKind};
use crate::model::{Model, Tree};
use crate::schema::{self, SAML_ROLES, SSH_PUBKEY, STATUS, USER_ID};
use std::sync::Arc;

pub const ACTIVE: &str = "ACTIVE";
pub const ABSENT: &str = "ABSENT";
pub const MISSING_SSH_PUBKEY: &str = "MISSING_SSH_PUBKEY";

/// Looks every configured login up in the identity directory.
pub struct DirectoryGatherer {
    client: Arc<dyn DirectoryClient>,
    organization: String,
    app_id: Option<String>,
}

impl DirectoryGatherer {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        organization: impl Into<String>,
        app_id: Option<String>,
    ) -> Self {
        Self {
            client,
            organization: organization.into(),
            app_id,
        }
    }
}

/// Directory entry of one login, and the problem with it if any.
fn assess(found: Option<DirectoryUser>) -> (Tree, Option<String>) {
    match found {
        None => (
            Tree::new().with(STATUS, ABSENT),
            Some("Not found in the directory".to_string()),
        ),
        Some(user) if user.status != ACTIVE => {
            let message = format!("status={}", user.status);
            (Tree::new().with(STATUS, user.status), Some(message))
        }
        Some(DirectoryUser {
            user_id,
            ssh_pubkey: Some(key),
            status,
        }) if !key.trim().is_empty() => (
            Tree::new()
                .with(STATUS, status)
                .with(USER_ID, user_id)
                .with(SSH_PUBKEY, key),
            None,
        ),
        Some(_) => (
            Tree::new().with(STATUS, MISSING_SSH_PUBKEY),
            Some("Missing SSH PubKey".to_string()),
        ),
    }
}

impl Gatherer for DirectoryGatherer {
    fn name(&self) -> &str {
        "directory"
    }

    fn requires(&self) -> &[Capability] {
        &[Capability::Users]
    }

    fn produces(&self) -> &[Capability] {
        &[Capability::DirectoryUsers]
    }

    fn gather(&self, model: &Model, ctx: &GatherContext<'_>) -> Result<Gathered> {
        let logins = schema::user_logins(model);
        let client = Arc::clone(&self.client);
        let results = ctx
            .pool
            .map(logins.clone(), move |login| client.find_user_by_login(&login));

        tracing::info!("Checking {} directory users:", self.organization);
        let width = logins.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let mut issues = Vec::new();
        let mut users = Tree::new();
        for (login, result) in logins.into_iter().zip(results) {
            let (entry, problem) = match result {
                Ok(Ok(found)) => assess(found),
                Ok(Err(e)) => (Tree::new(), Some(e.to_string())),
                Err(e) => (Tree::new(), Some(e.to_string())),
            };
            let shown = entry.get_str(STATUS).unwrap_or("UNKNOWN").to_string();
            match problem {
                Some(message) => {
                    tracing::warn!("{} {shown} ({message})", dot_leader(&login, width));
                    issues.push(Issue::error(SubjectKind::User, &login, message));
                }
                None => tracing::info!("{} {shown}", dot_leader(&login, width)),
            }
            users.insert(login, entry);
        }

        if let Some(app_id) = &self.app_id {
            match self.client.list_app_assignments(app_id) {
                Ok(assignments) => {
                    for assignment in assignments {
                        if users.contains_key(&assignment.external_id) {
                            users
                                .subtree_mut(&assignment.external_id)?
                                .insert(SAML_ROLES, assignment.roles);
                        }
                    }
                }
                Err(e) => issues.push(Issue::error(SubjectKind::App, app_id, e.to_string())),
            }
        }

        Ok(Gathered::new(schema::users_delta(users), issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueLevel;
    use crate::pool::WorkerPool;
    use crate::schema::USERS;
    use crate::testing::{ts, FakeDirectory};
    use std::time::Duration;

    const KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIJ leroy";

    fn model() -> Model {
        let users = ["absent@acme.com", "broken@acme.com", "keyless@acme.com", "leroy.trent@acme.com", "suspended@acme.com"]
            .into_iter()
            .fold(Tree::new(), |t, login| t.with(login, Tree::new()));
        Model::new(schema::users_delta(users))
    }

    fn run(directory: FakeDirectory, app_id: Option<&str>) -> Gathered {
        let pool = WorkerPool::new(4, Duration::from_secs(5)).unwrap();
        let ctx = GatherContext {
            pool: &pool,
            now: ts("2020-05-15T12:00:00Z"),
        };
        let out = DirectoryGatherer::new(Arc::new(directory), "acme", app_id.map(str::to_string))
            .gather(&model(), &ctx)
            .unwrap();
        pool.shutdown();
        out
    }

    fn directory() -> FakeDirectory {
        FakeDirectory::default()
            .with_user("leroy.trent@acme.com", "ACTIVE", Some(KEY))
            .with_user("keyless@acme.com", "ACTIVE", None)
            .with_user("suspended@acme.com", "SUSPENDED", Some(KEY))
            .with_failure("broken@acme.com")
    }

    #[test]
    fn classifies_each_login() {
        let out = run(directory(), None);
        let users = out.delta.get_tree(USERS).unwrap();
        let status = |login: &str| users.tree_at(&[login]).and_then(|u| u.get_str(STATUS));

        assert_eq!(status("leroy.trent@acme.com"), Some("ACTIVE"));
        assert_eq!(
            users.tree_at(&["leroy.trent@acme.com"]).unwrap().get_str(SSH_PUBKEY),
            Some(KEY)
        );
        assert_eq!(status("keyless@acme.com"), Some(MISSING_SSH_PUBKEY));
        assert_eq!(status("suspended@acme.com"), Some("SUSPENDED"));
        assert_eq!(status("absent@acme.com"), Some(ABSENT));
        assert_eq!(status("broken@acme.com"), None);

        let messages: Vec<(&str, &str)> = out
            .issues
            .iter()
            .map(|i| (i.id.as_str(), i.message.as_str()))
            .collect();
        assert_eq!(
            messages,
            vec![
                ("absent@acme.com", "Not found in the directory"),
                ("broken@acme.com", "503 Service Unavailable"),
                ("keyless@acme.com", "Missing SSH PubKey"),
                ("suspended@acme.com", "status=SUSPENDED"),
            ]
        );
        assert!(out.issues.iter().all(|i| i.level == IssueLevel::Error));
    }

    #[test]
    fn app_assignments_add_saml_roles() {
        let directory = directory()
            .with_assignment("leroy.trent@acme.com", &["sari-dba"])
            .with_assignment("stranger@acme.com", &["admin"]);
        let out = run(directory, Some("0oa1"));
        let users = out.delta.get_tree(USERS).unwrap();
        assert_eq!(
            users.tree_at(&["leroy.trent@acme.com"]).unwrap().get_strings(SAML_ROLES),
            vec!["sari-dba"]
        );
        assert!(users.get("stranger@acme.com").is_none());
    }
}
