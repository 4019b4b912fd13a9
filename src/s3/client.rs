use crate::config::{S3Credentials, ValidatedConfig};
use crate::error::Result;
use crate::provider::ProviderType;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Caches one S3 client per configured project.
pub struct S3ClientManager {
    clients: RwLock<HashMap<String, Arc<Client>>>,
}

impl S3ClientManager {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the client for a validated configuration, reading the
    /// credentials file on first use.
    pub async fn client_for(&self, config: &ValidatedConfig) -> Result<Arc<Client>> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&config.project_id) {
                return Ok(client.clone());
            }
        }

        let creds = S3Credentials::from_file(&config.credentials_file)?;
        let client = Arc::new(create_client(&creds));

        {
            let mut clients = self.clients.write().await;
            clients.insert(config.project_id.clone(), client.clone());
        }

        log::info!(
            "Created {} client for project {}",
            creds.provider.display_name(),
            config.project_id
        );
        Ok(client)
    }

    /// Drop a cached client, e.g. after the configuration changed.
    pub async fn remove_client(&self, project_id: &str) {
        let mut clients = self.clients.write().await;
        clients.remove(project_id);
    }

    /// Rebuild the project's client from the current credentials file.
    pub async fn reconfigure(&self, config: &ValidatedConfig) -> Result<Arc<Client>> {
        self.remove_client(&config.project_id).await;
        self.client_for(config).await
    }
}

impl Default for S3ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

fn create_client(creds: &S3Credentials) -> Client {
    let credentials = Credentials::new(
        &creds.access_key_id,
        &creds.secret_access_key,
        None, // session token
        None, // expiration
        "bucket-navigator",
    );

    let provider_type: ProviderType = creds.provider;
    let region_str = creds
        .region
        .clone()
        .unwrap_or_else(|| provider_type.default_region().to_string());

    let mut config_builder = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(region_str))
        .credentials_provider(credentials)
        .force_path_style(provider_type.force_path_style());

    // AWS S3 uses the default endpoint based on region
    let endpoint = creds.endpoint();
    if !endpoint.is_empty() {
        config_builder = config_builder.endpoint_url(endpoint);
    }

    Client::from_conf(config_builder.build())
}
