//! The standard stage list for a configuration directory.

use crate::collab::{CatalogClient, DirectoryClient, ParameterStore, Prober, PropertyStore};
use crate::config::Settings;
use crate::error::{Result, SariError};
use crate::gather::{
    AccountGatherer, CatalogGatherer, DatabaseConfigGatherer, DirectoryGatherer,
    ReachabilityGatherer, ServiceConfigGatherer, UserConfigGatherer,
};
use crate::pipeline::Pipeline;
use crate::pool::WorkerPool;
use crate::schema;
use crate::secrets::SecretResolver;
use std::sync::Arc;

/// Factory for the external systems, one client per region where it
/// matters.
pub trait Collaborators {
    fn catalog(&self, region: &str) -> Result<Arc<dyn CatalogClient>>;

    fn parameter_store(&self, region: &str) -> Result<Arc<dyn ParameterStore>>;

    fn property_store(&self, region: &str) -> Result<Arc<dyn PropertyStore>>;

    fn prober(&self) -> Result<Arc<dyn Prober>>;

    /// `None` skips the directory stage.
    fn directory(&self) -> Result<Option<Arc<dyn DirectoryClient>>>;
}

/// Account, then per region configuration and catalog, then reachability,
/// users, services and finally the directory.
pub fn standard_pipeline(settings: &Settings, collab: &dyn Collaborators) -> Result<Pipeline> {
    let regions = settings.regions()?;
    let Some(home) = regions.first() else {
        return Err(SariError::InvalidSetting {
            name: "SARI_CONFIG".to_string(),
            reason: format!(
                "no region directory with a databases.yaml in {}",
                settings.config_dir.display()
            ),
        });
    };
    let custom = settings.load_custom()?;
    let defaults = custom.password_defaults()?;
    tracing::info!(
        "Building model for {} region(s): {}",
        regions.len(),
        regions.join(", ")
    );

    let seed = schema::seed(settings, &regions, &custom);
    let pool = WorkerPool::new(settings.workers, settings.probe_timeout)?;
    let mut pipeline = Pipeline::new(seed, pool).stage(AccountGatherer::new(collab.catalog(home)?));

    for region in &regions {
        let catalog = collab.catalog(region)?;
        let resolver = Arc::new(SecretResolver::new(
            collab.parameter_store(region)?,
            collab.property_store(region)?,
            defaults.clone(),
        ));
        pipeline.add(Box::new(DatabaseConfigGatherer::new(
            region.clone(),
            settings.config_dir.clone(),
            Arc::clone(&resolver),
        )));
        pipeline.add(Box::new(CatalogGatherer::new(
            catalog,
            resolver,
            custom.unconfigured_databases,
        )));
    }

    pipeline.add(Box::new(ReachabilityGatherer::new(collab.prober()?)));
    pipeline.add(Box::new(UserConfigGatherer::new(settings.config_dir.clone())));
    pipeline.add(Box::new(ServiceConfigGatherer::new(settings.config_dir.clone())));

    if let (Some(dir), Some(client)) = (&settings.directory, collab.directory()?) {
        pipeline.add(Box::new(DirectoryGatherer::new(
            client,
            dir.organization.clone(),
            dir.app_id.clone(),
        )));
    }

    pipeline.validate()?;
    Ok(pipeline)
}
