//! Provider-side credential check
//!
//! Run once when credentials are configured, never per query: parse them,
//! connect, and make one bounded listing call to prove they work.

use crate::credentials::{CredentialStore, Credentials};
use crate::error::{CredentialError, CredentialValidationError};
use crate::service::Connector;
use std::sync::Arc;
use tracing::{error, info};

pub struct CredentialValidator {
    connector: Arc<dyn Connector>,
}

impl CredentialValidator {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Validate credentials against the live service. No retries.
    pub async fn validate(&self, store: &dyn CredentialStore) -> Result<(), CredentialValidationError> {
        let result = self.try_validate(store).await;
        if let Err(e) = &result {
            error!("BigQuery credentials validation failed: {}", e);
        }
        result.map_err(CredentialValidationError)
    }

    async fn try_validate(&self, store: &dyn CredentialStore) -> Result<(), String> {
        let raw = store.credentials().map_err(|e| e.to_string())?;
        // Unlike queries, validation does not fall back to the key's project
        if raw.project_id.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Err(CredentialError::Missing.to_string());
        }
        let credentials = Credentials::parse(&raw).map_err(|e| e.to_string())?;
        let service = self
            .connector
            .connect(&credentials)
            .await
            .map_err(|e| e.to_string())?;

        service.list_datasets(1).await.map_err(|e| e.to_string())?;

        info!(
            "Successfully validated BigQuery credentials for project: {}",
            credentials.project_id
        );
        Ok(())
    }
}
