//! Plugin protocol definitions
//!
//! Defines the line-delimited JSON envelope exchanged with the host daemon.
//! Every inbound line carries a `type`; every handled request produces one
//! response line with the same `id`.

use crate::gateway::OutputMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Tool definition advertised to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (e.g., "bigquery_query")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Parameter definitions
    pub parameters: Vec<ParameterDef>,
}

/// Parameter definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name
    pub name: String,
    /// Parameter type (string, number, boolean, array, object)
    #[serde(rename = "type")]
    pub param_type: String,
    /// Description
    pub description: String,
    /// Whether parameter is required
    #[serde(default)]
    pub required: bool,
    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Inbound message from the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Invoke a tool
    Invoke(PluginRequest),
    /// Check provider credentials
    ValidateCredentials {
        id: String,
        #[serde(default)]
        credentials: HashMap<String, String>,
    },
    /// Stop serving
    Shutdown,
}

/// Tool invocation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Request ID for correlation
    pub id: String,
    /// Tool name to invoke
    pub tool: String,
    /// Parameters passed to the tool
    #[serde(default)]
    pub params: HashMap<String, Value>,
    /// Provider credentials (project_id, service_account_key)
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

/// Response to one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Request ID this responds to
    pub id: String,
    /// Whether the request was dispatched
    pub success: bool,
    /// Messages produced by the tool, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<OutputMessage>,
    /// Error message (if failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginResponse {
    /// Create a success response
    pub fn success(id: &str, messages: Vec<OutputMessage>) -> Self {
        Self {
            id: id.to_string(),
            success: true,
            messages,
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: &str, message: &str) -> Self {
        Self {
            id: id.to_string(),
            success: false,
            messages: vec![],
            error: Some(message.to_string()),
        }
    }
}

impl PluginRequest {
    /// Create a new request
    #[cfg(test)]
    pub fn new(tool: &str, params: HashMap<String, Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool: tool.to_string(),
            params,
            credentials: HashMap::new(),
        }
    }

    /// Attach provider credentials
    #[cfg(test)]
    pub fn with_credentials(mut self, project_id: &str, service_account_key: &str) -> Self {
        self.credentials
            .insert("project_id".to_string(), project_id.to_string());
        self.credentials.insert(
            "service_account_key".to_string(),
            service_account_key.to_string(),
        );
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_str())
    }

    /// Get an integer parameter. Whole floats and numeric strings are accepted.
    pub fn get_integer(&self, name: &str) -> Result<Option<i64>, String> {
        match self.params.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(Some)
                .ok_or_else(|| format!("{} must be an integer, got {}", name, n)),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| format!("{} must be an integer, got {:?}", name, s)),
            Some(other) => Err(format!("{} must be an integer, got {}", name, other)),
        }
    }
}
