//! Configuration management for querygate
//!
//! Handles loading and merging configuration from multiple sources:
//! 1. Compiled defaults
//! 2. System config (/etc/querygate/config.toml)
//! 3. User config (~/.querygate/config.toml)
//! 4. CLI-specified config file
//! 5. Environment variables

use crate::cost::CostPolicy;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub credentials: CredentialsConfig,
    pub policy: CostPolicy,
    pub audit: AuditConfig,
}

/// Query service connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// REST API base URL
    pub endpoint: String,
    /// Processing location (e.g. "US", "EU")
    pub location: Option<String>,
    /// Environment variable holding a ready-made OAuth access token. When
    /// set, it is used instead of exchanging the service-account key.
    pub access_token_env: Option<String>,
    /// HTTP request timeout in seconds
    pub timeout: u64,
    /// How long the service may hold a query request open, in milliseconds
    pub query_timeout_ms: u64,
    /// Result polls before giving up on an incomplete job
    pub max_polls: u32,
}

/// Where default credentials come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Project to bill queries to
    pub project_id: Option<String>,
    /// Service account key file
    pub key_file: Option<PathBuf>,
    /// Environment variable containing the key JSON
    pub key_env: String,
}

/// Audit log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Write audit records
    pub enabled: bool,
    /// JSONL log path, relative to the working directory unless absolute
    pub log_path: PathBuf,
    /// Redact credential-looking text from logged queries
    pub redact_secrets: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://bigquery.googleapis.com/bigquery/v2".to_string(),
            location: None,
            access_token_env: None,
            timeout: 60,
            query_timeout_ms: 10_000,
            max_polls: 30,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            key_file: None,
            key_env: "BIGQUERY_SERVICE_ACCOUNT_KEY".to_string(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: PathBuf::from("logs/query_logs.jsonl"),
            redact_secrets: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(cli_config: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Load system config
        let system_config = Path::new("/etc/querygate/config.toml");
        if system_config.exists() {
            debug!("Loading system config from {:?}", system_config);
            config.merge_from_file(system_config)?;
        }

        // Load user config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".querygate/config.toml");
            if user_config.exists() {
                debug!("Loading user config from {:?}", user_config);
                config.merge_from_file(&user_config)?;
            }
        }

        // Load CLI-specified config
        if let Some(path) = cli_config {
            debug!("Loading CLI config from {:?}", path);
            config.merge_from_file(path)?;
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Merge configuration from a file
    fn merge_from_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;

        let file_config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        self.merge(file_config);
        Ok(())
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        let service_default = ServiceConfig::default();
        if other.service.endpoint != service_default.endpoint {
            self.service.endpoint = other.service.endpoint;
        }
        if other.service.location.is_some() {
            self.service.location = other.service.location;
        }
        if other.service.access_token_env.is_some() {
            self.service.access_token_env = other.service.access_token_env;
        }
        if other.service.timeout != service_default.timeout {
            self.service.timeout = other.service.timeout;
        }
        if other.service.query_timeout_ms != service_default.query_timeout_ms {
            self.service.query_timeout_ms = other.service.query_timeout_ms;
        }
        if other.service.max_polls != service_default.max_polls {
            self.service.max_polls = other.service.max_polls;
        }

        if other.credentials.project_id.is_some() {
            self.credentials.project_id = other.credentials.project_id;
        }
        if other.credentials.key_file.is_some() {
            self.credentials.key_file = other.credentials.key_file;
        }
        if other.credentials.key_env != CredentialsConfig::default().key_env {
            self.credentials.key_env = other.credentials.key_env;
        }

        // Policy section
        let policy_default = CostPolicy::default();
        if other.policy.max_bytes_processed != policy_default.max_bytes_processed {
            self.policy.max_bytes_processed = other.policy.max_bytes_processed;
        }
        if other.policy.bytes_per_unit_cost != policy_default.bytes_per_unit_cost {
            self.policy.bytes_per_unit_cost = other.policy.bytes_per_unit_cost;
        }
        if other.policy.cost_warning_threshold != policy_default.cost_warning_threshold {
            self.policy.cost_warning_threshold = other.policy.cost_warning_threshold;
        }
        if other.policy.default_max_results != policy_default.default_max_results {
            self.policy.default_max_results = other.policy.default_max_results;
        }

        // Audit section
        let audit_default = AuditConfig::default();
        if other.audit.enabled != audit_default.enabled {
            self.audit.enabled = other.audit.enabled;
        }
        if other.audit.log_path != audit_default.log_path {
            self.audit.log_path = other.audit.log_path;
        }
        if other.audit.redact_secrets != audit_default.redact_secrets {
            self.audit.redact_secrets = other.audit.redact_secrets;
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("QUERYGATE_ENDPOINT") {
            self.service.endpoint = endpoint;
        }
        if let Some(location) = lookup("BIGQUERY_LOCATION") {
            self.service.location = Some(location);
        }
        if let Some(project) = lookup("BIGQUERY_PROJECT_ID") {
            self.credentials.project_id = Some(project);
        }
        if let Some(log) = lookup("QUERYGATE_AUDIT_LOG") {
            self.audit.log_path = PathBuf::from(log);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("service.endpoint".to_string()));
        }
        if self.policy.bytes_per_unit_cost == 0 {
            return Err(ConfigError::Invalid(
                "policy.bytes_per_unit_cost must be greater than zero".to_string(),
            ));
        }
        let threshold = self.policy.cost_warning_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "policy.cost_warning_threshold must be a non-negative number, got {}",
                threshold
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{BYTES_PER_UNIT_COST, MAX_BYTES_PROCESSED};
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.policy.max_bytes_processed, MAX_BYTES_PROCESSED);
        assert_eq!(config.policy.bytes_per_unit_cost, BYTES_PER_UNIT_COST);
        assert_eq!(config.policy.default_max_results, 100);
        assert_eq!(config.audit.log_path, PathBuf::from("logs/query_logs.jsonl"));
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_conversion_factor_rejected() {
        let mut config = Config::default();
        config.policy.bytes_per_unit_cost = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut config = Config::default();
        config.policy.cost_warning_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
            [service]
            location = "EU"
            max_polls = 5

            [credentials]
            project_id = "analytics"

            [policy]
            max_bytes_processed = 1073741824

            [audit]
            log_path = "/var/log/querygate.jsonl"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.location.as_deref(), Some("EU"));
        assert_eq!(config.service.max_polls, 5);
        assert_eq!(config.credentials.project_id.as_deref(), Some("analytics"));
        assert_eq!(config.policy.max_bytes_processed, 1073741824);
        assert_eq!(config.policy.bytes_per_unit_cost, BYTES_PER_UNIT_COST);
        assert_eq!(
            config.audit.log_path,
            PathBuf::from("/var/log/querygate.jsonl")
        );
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[service]\nendpoint = \"http://localhost:9050\"\n").unwrap();

        let mut config = Config::default();
        config.credentials.project_id = Some("from-earlier-layer".to_string());
        config.merge_from_file(&path).unwrap();

        assert_eq!(config.service.endpoint, "http://localhost:9050");
        assert_eq!(
            config.credentials.project_id.as_deref(),
            Some("from-earlier-layer")
        );
    }

    #[test]
    fn test_later_layer_keeps_stricter_policy() {
        let temp_dir = TempDir::new().unwrap();
        let user = temp_dir.path().join("user.toml");
        let cli = temp_dir.path().join("cli.toml");
        std::fs::write(
            &user,
            "[policy]\nmax_bytes_processed = 1073741824\n\n[audit]\nredact_secrets = true\n",
        )
        .unwrap();
        std::fs::write(&cli, "[service]\nlocation = \"EU\"\n").unwrap();

        let mut config = Config::default();
        config.merge_from_file(&user).unwrap();
        config.merge_from_file(&cli).unwrap();

        assert_eq!(config.policy.max_bytes_processed, 1073741824);
        assert_eq!(config.policy.bytes_per_unit_cost, BYTES_PER_UNIT_COST);
        assert!(config.audit.redact_secrets);
        assert_eq!(config.service.location.as_deref(), Some("EU"));
    }

    #[test]
    fn test_later_layer_overrides_policy_field() {
        let temp_dir = TempDir::new().unwrap();
        let user = temp_dir.path().join("user.toml");
        let cli = temp_dir.path().join("cli.toml");
        std::fs::write(&user, "[policy]\nmax_bytes_processed = 1073741824\n").unwrap();
        std::fs::write(&cli, "[policy]\ndefault_max_results = 10\n").unwrap();

        let mut config = Config::default();
        config.merge_from_file(&user).unwrap();
        config.merge_from_file(&cli).unwrap();

        assert_eq!(config.policy.max_bytes_processed, 1073741824);
        assert_eq!(config.policy.default_max_results, 10);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("QUERYGATE_ENDPOINT", "http://localhost:9050"),
            ("QUERYGATE_AUDIT_LOG", "/tmp/querygate/audit.jsonl"),
            ("BIGQUERY_PROJECT_ID", "analytics"),
            ("BIGQUERY_LOCATION", "EU"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.credentials.project_id = Some("from-file".to_string());
        config.apply_overrides_from(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.service.endpoint, "http://localhost:9050");
        assert_eq!(
            config.audit.log_path,
            PathBuf::from("/tmp/querygate/audit.jsonl")
        );
        assert_eq!(config.credentials.project_id.as_deref(), Some("analytics"));
        assert_eq!(config.service.location.as_deref(), Some("EU"));
    }

    #[test]
    fn test_no_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides_from(|_| None);
        assert_eq!(config.service, ServiceConfig::default());
        assert_eq!(config.audit, AuditConfig::default());
    }

    #[test]
    fn test_unparseable_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[service\n").unwrap();

        let mut config = Config::default();
        assert!(matches!(
            config.merge_from_file(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
