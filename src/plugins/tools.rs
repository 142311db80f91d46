//! Tools exposed to the host
//!
//! `bigquery_query` runs the cost-gated gateway; `minimal_tool` is a
//! liveness check that always answers the same text.

use super::protocol::{ParameterDef, PluginRequest, PluginResponse, ToolDefinition};
use crate::cost::DEFAULT_ROW_LIMIT;
use crate::credentials::{CredentialStore, RawCredentials};
use crate::error::GatewayError;
use crate::gateway::{OutputMessage, QueryGateway};
use crate::provider::CredentialValidator;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const QUERY_TOOL: &str = "bigquery_query";
pub const MINIMAL_TOOL: &str = "minimal_tool";

/// Tool dispatch over a configured gateway
pub struct Toolbox {
    gateway: QueryGateway,
    validator: CredentialValidator,
    /// Used when a request arrives without credentials
    default_credentials: Arc<dyn CredentialStore>,
}

impl Toolbox {
    pub fn new(
        gateway: QueryGateway,
        validator: CredentialValidator,
        default_credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            gateway,
            validator,
            default_credentials,
        }
    }

    /// Get all tool definitions
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: QUERY_TOOL.to_string(),
                description: "Execute a SQL query against BigQuery after a cost-estimating dry run"
                    .to_string(),
                parameters: vec![
                    ParameterDef {
                        name: "query".to_string(),
                        param_type: "string".to_string(),
                        description: "Standard SQL query to execute".to_string(),
                        required: true,
                        default: None,
                    },
                    ParameterDef {
                        name: "max_results".to_string(),
                        param_type: "number".to_string(),
                        description: "Maximum number of rows to return".to_string(),
                        required: false,
                        default: Some(serde_json::json!(DEFAULT_ROW_LIMIT)),
                    },
                ],
            },
            ToolDefinition {
                name: MINIMAL_TOOL.to_string(),
                description: "Respond with a fixed message".to_string(),
                parameters: vec![],
            },
        ]
    }

    /// Execute a tool
    pub async fn execute(&self, request: &PluginRequest) -> PluginResponse {
        debug!("Executing tool '{}' for request {}", request.tool, request.id);
        match request.tool.as_str() {
            QUERY_TOOL => self.run_query(request).await,
            MINIMAL_TOOL => PluginResponse::success(
                &request.id,
                vec![OutputMessage::text("Minimal tool executed!")],
            ),
            _ => PluginResponse::error(&request.id, &format!("Unknown tool: {}", request.tool)),
        }
    }

    async fn run_query(&self, request: &PluginRequest) -> PluginResponse {
        let row_limit = match request.get_integer("max_results") {
            Ok(limit) => limit,
            Err(e) => {
                return PluginResponse::success(
                    &request.id,
                    vec![OutputMessage::text(GatewayError::InvalidInput(e).to_string())],
                )
            }
        };

        let request_credentials = RawCredentials::from_map(&request.credentials);
        let store: &dyn CredentialStore = if request_credentials.is_empty() {
            self.default_credentials.as_ref()
        } else {
            &request_credentials
        };

        let messages = self
            .gateway
            .run(request.get_string("query"), row_limit, store)
            .await;
        PluginResponse::success(&request.id, messages)
    }

    /// Validate provider credentials
    pub async fn validate_credentials(
        &self,
        id: &str,
        credentials: &HashMap<String, String>,
    ) -> PluginResponse {
        let raw = RawCredentials::from_map(credentials);
        let store: &dyn CredentialStore = if raw.is_empty() {
            self.default_credentials.as_ref()
        } else {
            &raw
        };

        match self.validator.validate(store).await {
            Ok(()) => PluginResponse::success(id, vec![OutputMessage::text("Credentials are valid")]),
            Err(e) => PluginResponse::error(id, &e.to_string()),
        }
    }
}
