//! Query service interface
//!
//! The gateway talks to the warehouse only through these traits, so the
//! REST client and the test fakes are interchangeable.

use crate::credentials::Credentials;
use crate::error::{CredentialError, ServiceError};
use crate::rows::Row;
use async_trait::async_trait;

/// Outcome of a dry run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DryRunStats {
    pub bytes_processed: u64,
}

/// Outcome of an executed query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub rows: Vec<Row>,
    /// Field names in schema order
    pub schema: Vec<String>,
    pub job_id: String,
    pub bytes_processed: u64,
    /// Rows in the full result, which may exceed `rows.len()`
    pub total_rows: u64,
}

/// A remote query service
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Estimate bytes scanned without running the query
    async fn dry_run(&self, query: &str) -> Result<DryRunStats, ServiceError>;

    /// Run the query, returning at most `row_limit` rows
    async fn execute(&self, query: &str, row_limit: u64) -> Result<QueryOutcome, ServiceError>;

    /// List up to `max_results` dataset ids; used as an authenticated no-op
    async fn list_datasets(&self, max_results: u32) -> Result<Vec<String>, ServiceError>;
}

/// Builds an authenticated service handle from parsed credentials
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn QueryService>, CredentialError>;
}
