use crate::aws::AwsCli;
use crate::okta::OktaClient;
use crate::probe::{MysqlProber, Transport};
use sari_core::assemble::Collaborators;
use sari_core::collab::{CatalogClient, DirectoryClient, ParameterStore, Prober, PropertyStore};
use sari_core::config::Settings;
use sari_core::Result;
use std::sync::Arc;

/// Real AWS, Okta and MySQL collaborators.
pub struct LiveCollaborators<'a> {
    settings: &'a Settings,
}

impl<'a> LiveCollaborators<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }
}

impl Collaborators for LiveCollaborators<'_> {
    fn catalog(&self, region: &str) -> Result<Arc<dyn CatalogClient>> {
        let client: Arc<dyn CatalogClient> = Arc::new(AwsCli::new(region)?);
        Ok(client)
    }

    fn parameter_store(&self, region: &str) -> Result<Arc<dyn ParameterStore>> {
        let client: Arc<dyn ParameterStore> = Arc::new(AwsCli::new(region)?);
        Ok(client)
    }

    fn property_store(&self, region: &str) -> Result<Arc<dyn PropertyStore>> {
        let client: Arc<dyn PropertyStore> = Arc::new(AwsCli::new(region)?);
        Ok(client)
    }

    fn prober(&self) -> Result<Arc<dyn Prober>> {
        let transport = Transport::from_proxy_url(self.settings.proxy.as_deref())?;
        if let Transport::Socks5 { proxy } = &transport {
            tracing::info!("Probing databases through SOCKS5 proxy {proxy}");
        }
        let prober: Arc<dyn Prober> =
            Arc::new(MysqlProber::new(transport, self.settings.probe_timeout));
        Ok(prober)
    }

    fn directory(&self) -> Result<Option<Arc<dyn DirectoryClient>>> {
        match &self.settings.directory {
            Some(dir) => {
                let client: Arc<dyn DirectoryClient> =
                    Arc::new(OktaClient::new(&dir.organization, &dir.api_token)?);
                Ok(Some(client))
            }
            None => {
                tracing::warn!("OKTA_ORG_NAME and OKTA_API_TOKEN not set; skipping directory users");
                Ok(None)
            }
        }
    }
}
