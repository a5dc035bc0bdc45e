use super::{Capability, GatherContext, Gathered, Gatherer};
use crate::collab::CatalogClient;
use crate::error::Result;
use crate::model::{Model, Tree};
use crate::schema::{ACCOUNT, CLOUD};
use std::sync::Arc;

/// Records the cloud account the run operates in.
pub struct AccountGatherer {
    catalog: Arc<dyn CatalogClient>,
}

impl AccountGatherer {
    pub fn new(catalog: Arc<dyn CatalogClient>) -> Self {
        Self { catalog }
    }
}

impl Gatherer for AccountGatherer {
    fn name(&self) -> &str {
        "account"
    }

    fn produces(&self) -> &[Capability] {
        &[Capability::Account]
    }

    fn gather(&self, _model: &Model, _ctx: &GatherContext<'_>) -> Result<Gathered> {
        let account = self.catalog.account_id()?;
        tracing::debug!(account = %account, "cloud account");
        let delta = Tree::new().with(CLOUD, Tree::new().with(ACCOUNT, account));
        Ok(Gathered::new(delta, Vec::new()))
    }
}
