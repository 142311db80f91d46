//! Credential loading and parsing
//!
//! The host hands over a project id and a service-account key as opaque
//! JSON text. It is parsed once, here, into a typed record; nothing past
//! this module sees the raw blob.

use crate::config::CredentialsConfig;
use crate::error::CredentialError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Credentials as supplied by the host, before parsing
#[derive(Clone, Default, PartialEq)]
pub struct RawCredentials {
    pub project_id: Option<String>,
    pub service_account_key: Option<String>,
}

impl fmt::Debug for RawCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCredentials")
            .field("project_id", &self.project_id)
            .field(
                "service_account_key",
                &self.service_account_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl RawCredentials {
    #[cfg(test)]
    pub fn new(project_id: impl Into<String>, service_account_key: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            service_account_key: Some(service_account_key.into()),
        }
    }

    /// Build from a host-provided credential map
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            project_id: map.get("project_id").cloned(),
            service_account_key: map.get("service_account_key").cloned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        non_empty(&self.project_id).is_none() && non_empty(&self.service_account_key).is_none()
    }
}

/// Source of raw credentials
pub trait CredentialStore: Send + Sync {
    fn credentials(&self) -> Result<RawCredentials, CredentialError>;
}

impl CredentialStore for RawCredentials {
    fn credentials(&self) -> Result<RawCredentials, CredentialError> {
        Ok(self.clone())
    }
}

impl CredentialStore for CredentialsConfig {
    /// Key file takes precedence over the key env var
    fn credentials(&self) -> Result<RawCredentials, CredentialError> {
        let service_account_key = match &self.key_file {
            Some(path) => {
                debug!("Reading service account key from {:?}", path);
                Some(
                    std::fs::read_to_string(path)
                        .map_err(|e| CredentialError::Read(format!("{}: {}", path.display(), e)))?,
                )
            }
            None => std::env::var(&self.key_env).ok(),
        };

        Ok(RawCredentials {
            project_id: self.project_id.clone(),
            service_account_key,
        })
    }
}

/// Fields of a service-account key file that we rely on
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// Parsed, validated credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Project queries are billed to
    pub project_id: String,
    /// Service account identity (client email)
    pub identity: String,
    pub key: ServiceAccountKey,
}

impl Credentials {
    /// Parse raw credentials, rejecting anything malformed up front
    pub fn parse(raw: &RawCredentials) -> Result<Self, CredentialError> {
        let key_json = non_empty(&raw.service_account_key).ok_or(CredentialError::Missing)?;

        let key: ServiceAccountKey = serde_json::from_str(key_json)
            .map_err(|e| CredentialError::InvalidJson(e.to_string()))?;

        if let Some(kind) = &key.key_type {
            if kind != "service_account" {
                return Err(CredentialError::UnsupportedType(kind.clone()));
            }
        }
        if key.client_email.trim().is_empty() {
            return Err(CredentialError::MissingField("client_email"));
        }
        if key.private_key.trim().is_empty() {
            return Err(CredentialError::MissingField("private_key"));
        }

        let project_id = non_empty(&raw.project_id)
            .or_else(|| non_empty(&key.project_id))
            .ok_or(CredentialError::Missing)?
            .to_string();

        Ok(Self {
            project_id,
            identity: key.client_email.clone(),
            key,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
