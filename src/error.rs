//! Error types for querygate

use thiserror::Error;

/// Errors that end a gateway invocation.
///
/// The `Display` text of each variant is exactly what the caller sees.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Error: No SQL query provided")]
    MissingQuery,

    #[error("Error: {0}")]
    InvalidInput(String),

    #[error("Error: invalid credentials: {0}")]
    Credential(#[from] CredentialError),

    #[error(
        "Query would process {bytes} bytes, which exceeds the maximum limit of {limit} bytes ({}). Please refine your query to process less data.",
        crate::cost::gib_label(.limit)
    )]
    CostLimitExceeded { bytes: u64, limit: u64 },

    #[error("BigQuery syntax error: {0}")]
    Syntax(String),

    #[error("Error executing query: {0}")]
    Execution(String),
}

impl GatewayError {
    /// Whether this failure is accounted for in the audit log
    pub fn is_audited(&self) -> bool {
        matches!(
            self,
            GatewayError::CostLimitExceeded { .. }
                | GatewayError::Syntax(_)
                | GatewayError::Execution(_)
        )
    }
}

/// Errors raised by a query service backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("{0}")]
    Syntax(String),

    #[error("{0}")]
    Execution(String),
}

impl From<ServiceError> for GatewayError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Syntax(detail) => GatewayError::Syntax(detail),
            ServiceError::Execution(detail) => GatewayError::Execution(detail),
        }
    }
}

/// Credential loading and parsing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    #[error("Project ID and Service Account Key are required")]
    Missing,

    #[error("Invalid service account key: Not valid JSON ({0})")]
    InvalidJson(String),

    #[error("Unsupported credential type: {0}")]
    UnsupportedType(String),

    #[error("Service account key is missing field: {0}")]
    MissingField(&'static str),

    #[error("Failed to read service account key: {0}")]
    Read(String),

    #[error("Access token not found in {0}")]
    MissingAccessToken(String),

    #[error("Service account private key is not a usable RSA key: {0}")]
    InvalidPrivateKey(String),

    #[error("Failed to obtain access token: {0}")]
    TokenExchange(String),
}

/// Provider-side credential validation failure
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Credential validation failed: {0}")]
pub struct CredentialValidationError(pub String);

/// Audit log write failures. Never surfaced to the caller.
#[derive(Error, Debug)]
pub enum AuditWriteError {
    #[error("Failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write audit record: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}
