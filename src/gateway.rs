//! Query gateway
//!
//! Runs one query through validate → dry run → policy gate → execute →
//! normalize → audit, and reports the outcome as an ordered list of
//! output messages. Nothing past this boundary sees an error: every
//! failure becomes a single text message.

use crate::audit::{AuditRecord, AuditSink};
use crate::cost::{CostEstimate, CostPolicy};
use crate::credentials::{CredentialStore, Credentials};
use crate::error::GatewayError;
use crate::service::{Connector, QueryOutcome, QueryService};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A message returned to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputMessage {
    Text { text: String },
    Json { payload: Value },
}

impl OutputMessage {
    pub fn text(text: impl Into<String>) -> Self {
        OutputMessage::Text { text: text.into() }
    }

    pub fn json(payload: Value) -> Self {
        OutputMessage::Json { payload }
    }
}

/// A validated query request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub row_limit: u64,
}

impl QueryRequest {
    pub fn new(
        query: Option<&str>,
        row_limit: Option<i64>,
        default_limit: u64,
    ) -> Result<Self, GatewayError> {
        let query = query
            .filter(|q| !q.trim().is_empty())
            .ok_or(GatewayError::MissingQuery)?;

        let row_limit = match row_limit {
            None => default_limit,
            Some(n) => u64::try_from(n).map_err(|_| {
                GatewayError::InvalidInput(format!(
                    "max_results must be a non-negative integer, got {}",
                    n
                ))
            })?,
        };

        Ok(Self {
            query: query.to_string(),
            row_limit,
        })
    }
}

pub struct QueryGateway {
    connector: Arc<dyn Connector>,
    audit: Arc<dyn AuditSink>,
    policy: CostPolicy,
}

impl QueryGateway {
    pub fn new(connector: Arc<dyn Connector>, audit: Arc<dyn AuditSink>, policy: CostPolicy) -> Self {
        Self {
            connector,
            audit,
            policy,
        }
    }

    #[cfg(test)]
    pub fn policy(&self) -> &CostPolicy {
        &self.policy
    }

    /// Run one query and return the messages to emit, in order
    pub async fn run(
        &self,
        query: Option<&str>,
        row_limit: Option<i64>,
        store: &dyn CredentialStore,
    ) -> Vec<OutputMessage> {
        let request = match QueryRequest::new(query, row_limit, self.policy.default_max_results) {
            Ok(request) => request,
            Err(err) => {
                warn!("Rejected query request: {}", err);
                return vec![OutputMessage::text(err.to_string())];
            }
        };

        let service = match self.resolve_service(store).await {
            Ok(service) => service,
            Err(err) => {
                error!("Credential setup failed: {}", err);
                return vec![OutputMessage::text(err.to_string())];
            }
        };

        let mut estimate = CostEstimate::zero();
        match self.pipeline(service.as_ref(), &request, &mut estimate).await {
            Ok((warning, payload)) => {
                self.record(&request, &estimate, None);

                let mut messages = Vec::with_capacity(2);
                if let Some(warning) = warning {
                    messages.push(OutputMessage::text(warning));
                }
                messages.push(OutputMessage::json(payload));
                messages
            }
            Err(err) => {
                error!("Query failed: {}", err);
                let message = err.to_string();
                if err.is_audited() {
                    self.record(&request, &estimate, Some(message.clone()));
                }
                vec![OutputMessage::text(message)]
            }
        }
    }

    async fn resolve_service(
        &self,
        store: &dyn CredentialStore,
    ) -> Result<Box<dyn QueryService>, GatewayError> {
        let raw = store.credentials()?;
        let credentials = Credentials::parse(&raw)?;
        Ok(self.connector.connect(&credentials).await?)
    }

    /// Everything from the dry run to the response payload.
    ///
    /// `estimate` is filled in as soon as the dry run returns so the audit
    /// record on the failure path carries it; it stays zero if the dry run
    /// itself fails.
    async fn pipeline(
        &self,
        service: &dyn QueryService,
        request: &QueryRequest,
        estimate: &mut CostEstimate,
    ) -> Result<(Option<String>, Value), GatewayError> {
        info!("Estimating cost for query: {}", request.query);
        let stats = service.dry_run(&request.query).await?;
        *estimate = self.policy.estimate(stats.bytes_processed);

        info!(
            "Query cost estimate: {} bytes (~${:.2})",
            estimate.bytes_processed, estimate.estimated_cost_usd
        );

        if estimate.exceeds_limit {
            return Err(GatewayError::CostLimitExceeded {
                bytes: estimate.bytes_processed,
                limit: self.policy.max_bytes_processed,
            });
        }

        let warning = estimate.cost_warning.then(|| estimate.warning_message());
        if let Some(warning) = &warning {
            warn!("{}", warning);
        }

        info!("Executing query with row limit {}", request.row_limit);
        let outcome = service.execute(&request.query, request.row_limit).await?;

        Ok((warning, build_response(outcome, estimate)))
    }

    /// Audit failures are logged and otherwise ignored
    fn record(&self, request: &QueryRequest, estimate: &CostEstimate, error: Option<String>) {
        let record = AuditRecord::new(&request.query, estimate, error);
        if let Err(e) = self.audit.write(&record) {
            warn!("Failed to write to query log file: {}", e);
        }
    }
}

fn build_response(outcome: QueryOutcome, estimate: &CostEstimate) -> Value {
    let results: Vec<Value> = outcome
        .rows
        .into_iter()
        .map(|row| Value::Object(row.normalize().to_json()))
        .collect();

    json!({
        "results": results,
        "metadata": {
            "total_rows": outcome.total_rows,
            "schema": outcome.schema,
            "query_job_id": outcome.job_id,
            "bytes_processed": outcome.bytes_processed,
            "estimated_cost_usd": estimate.estimated_cost_usd,
        }
    })
}
