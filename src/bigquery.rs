//! BigQuery REST backend
//!
//! Implements [`QueryService`] over the v2 `jobs.query` /
//! `jobs.getQueryResults` endpoints. Cells come back as strings in the
//! `{"f": [{"v": ...}]}` layout and are decoded here using the schema.

use crate::auth;
use crate::config::ServiceConfig;
use crate::credentials::Credentials;
use crate::error::{CredentialError, ServiceError};
use crate::rows::{FieldValue, Row};
use crate::service::{Connector, DryRunStats, QueryOutcome, QueryService};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, ServiceError>;

/// Response of `jobs.query` and `jobs.getQueryResults`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    total_rows: Option<Value>,
    #[serde(default)]
    total_bytes_processed: Option<Value>,
    #[serde(default)]
    job_complete: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<SchemaField>,
}

#[derive(Debug, Clone, Deserialize)]
struct SchemaField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    fields: Vec<SchemaField>,
}

impl SchemaField {
    fn is_repeated(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("REPEATED"))
    }
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct DatasetList {
    #[serde(default)]
    datasets: Vec<DatasetEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetEntry {
    dataset_reference: DatasetReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Authenticated client bound to one project
pub struct BigQueryClient {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    location: Option<String>,
    access_token: String,
    query_timeout_ms: u64,
    max_polls: u32,
}

impl BigQueryClient {
    pub fn new(
        http: reqwest::Client,
        config: &ServiceConfig,
        project_id: &str,
        access_token: &str,
    ) -> Self {
        Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            location: config.location.clone(),
            access_token: access_token.to_string(),
            query_timeout_ms: config.query_timeout_ms,
            max_polls: config.max_polls,
        }
    }

    fn project_url(&self) -> String {
        format!("{}/projects/{}", self.endpoint, self.project_id)
    }

    fn query_body(&self, query: &str, dry_run: bool, max_results: Option<u64>) -> Value {
        let mut body = json!({
            "query": query,
            "useLegacySql": false,
            "dryRun": dry_run,
            "timeoutMs": self.query_timeout_ms,
            "formatOptions": { "useInt64Timestamp": true },
        });
        if let Some(max) = max_results {
            body["maxResults"] = json!(max);
        }
        if let Some(location) = &self.location {
            body["location"] = json!(location);
        }
        body
    }

    /// Send a request and decode the JSON body, classifying failures
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ServiceError::Execution(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::Execution(format!("Failed to parse response: {}", e)))
    }

    /// Poll `getQueryResults` until the job reports completion
    async fn wait_for_results(&self, job: &JobReference, row_limit: u64) -> Result<QueryResponse> {
        let url = format!("{}/queries/{}", self.project_url(), job.job_id);
        let mut params = vec![
            ("maxResults", row_limit.to_string()),
            ("timeoutMs", self.query_timeout_ms.to_string()),
            ("formatOptions.useInt64Timestamp", "true".to_string()),
        ];
        if let Some(location) = job.location.as_ref().or(self.location.as_ref()) {
            params.push(("location", location.clone()));
        }

        for attempt in 1..=self.max_polls {
            debug!("Polling results for job {} (attempt {})", job.job_id, attempt);
            let response: QueryResponse = self.send(self.http.get(&url).query(&params)).await?;
            if response.job_complete.unwrap_or(true) {
                return Ok(response);
            }
        }

        Err(ServiceError::Execution(format!(
            "Job {} did not complete after {} polls",
            job.job_id, self.max_polls
        )))
    }
}

#[async_trait]
impl QueryService for BigQueryClient {
    async fn dry_run(&self, query: &str) -> Result<DryRunStats> {
        let url = format!("{}/queries", self.project_url());
        let body = self.query_body(query, true, None);
        let response: QueryResponse = self.send(self.http.post(&url).json(&body)).await?;

        Ok(DryRunStats {
            bytes_processed: parse_count(&response.total_bytes_processed),
        })
    }

    async fn execute(&self, query: &str, row_limit: u64) -> Result<QueryOutcome> {
        let url = format!("{}/queries", self.project_url());
        let body = self.query_body(query, false, Some(row_limit));
        let mut response: QueryResponse = self.send(self.http.post(&url).json(&body)).await?;

        let job = response
            .job_reference
            .clone()
            .ok_or_else(|| ServiceError::Execution("Response has no job reference".to_string()))?;

        if !response.job_complete.unwrap_or(true) {
            let initial_bytes = response.total_bytes_processed.take();
            response = self.wait_for_results(&job, row_limit).await?;
            if response.total_bytes_processed.is_none() {
                response.total_bytes_processed = initial_bytes;
            }
        }

        let fields = response.schema.map(|s| s.fields).unwrap_or_default();
        let mut rows: Vec<Row> = response
            .rows
            .iter()
            .map(|row| decode_row(&fields, row))
            .collect();
        if rows.len() as u64 > row_limit {
            warn!("Service returned {} rows, truncating to {}", rows.len(), row_limit);
            rows.truncate(row_limit as usize);
        }

        Ok(QueryOutcome {
            schema: fields.iter().map(|f| f.name.clone()).collect(),
            job_id: job.job_id,
            bytes_processed: parse_count(&response.total_bytes_processed),
            total_rows: parse_count(&response.total_rows),
            rows,
        })
    }

    async fn list_datasets(&self, max_results: u32) -> Result<Vec<String>> {
        let url = format!("{}/datasets", self.project_url());
        let list: DatasetList = self
            .send(self.http.get(&url).query(&[("maxResults", max_results)]))
            .await?;

        Ok(list
            .datasets
            .into_iter()
            .map(|d| d.dataset_reference.dataset_id)
            .collect())
    }
}

/// Connects to BigQuery, exchanging the service-account key for a token
pub struct BigQueryConnector {
    config: ServiceConfig,
    http: reqwest::Client,
}

impl BigQueryConnector {
    pub fn new(config: ServiceConfig) -> std::result::Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self { config, http })
    }

    /// Token from the configured override variable, if one is configured
    fn token_override(&self) -> std::result::Result<Option<String>, CredentialError> {
        let Some(var) = &self.config.access_token_env else {
            return Ok(None);
        };
        std::env::var(var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(Some)
            .ok_or_else(|| CredentialError::MissingAccessToken(var.clone()))
    }
}

#[async_trait]
impl Connector for BigQueryConnector {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> std::result::Result<Box<dyn QueryService>, CredentialError> {
        debug!(
            "Connecting to project {} as {} (key id {})",
            credentials.project_id,
            credentials.identity,
            credentials.key.private_key_id.as_deref().unwrap_or("unknown")
        );

        let token = match self.token_override()? {
            Some(token) => {
                warn!("Using access token override instead of the service account key");
                token
            }
            None => auth::fetch_access_token(&self.http, &credentials.key).await?,
        };

        Ok(Box::new(BigQueryClient::new(
            self.http.clone(),
            &self.config,
            &credentials.project_id,
            &token,
        )))
    }
}

/// A 400 is the service rejecting the query text itself
fn classify_failure(status: StatusCode, body: &str) -> ServiceError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    if status == StatusCode::BAD_REQUEST {
        ServiceError::Syntax(message)
    } else {
        ServiceError::Execution(format!("{} {}", status.as_u16(), message))
    }
}

/// int64 values arrive as JSON strings
fn parse_count(value: &Option<Value>) -> u64 {
    match value {
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

fn decode_row(fields: &[SchemaField], row: &TableRow) -> Row {
    Row::new(
        fields
            .iter()
            .zip(row.f.iter())
            .map(|(field, cell)| (field.name.clone(), decode_cell(field, &cell.v)))
            .collect(),
    )
}

fn decode_cell(field: &SchemaField, value: &Value) -> FieldValue {
    if field.is_repeated() {
        if let Value::Array(items) = value {
            return FieldValue::Array(
                items
                    .iter()
                    .map(|item| decode_single(field, item.get("v").unwrap_or(&Value::Null)))
                    .collect(),
            );
        }
    }
    decode_single(field, value)
}

fn decode_single(field: &SchemaField, value: &Value) -> FieldValue {
    if value.is_null() {
        return FieldValue::Null;
    }

    let field_type = field.field_type.to_ascii_uppercase();
    if field_type == "RECORD" || field_type == "STRUCT" {
        return match value.get("f").and_then(Value::as_array) {
            Some(cells) => FieldValue::Record(
                field
                    .fields
                    .iter()
                    .zip(cells)
                    .map(|(sub, cell)| {
                        (
                            sub.name.clone(),
                            decode_cell(sub, cell.get("v").unwrap_or(&Value::Null)),
                        )
                    })
                    .collect(),
            ),
            None => FieldValue::String(value.to_string()),
        };
    }

    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    decode_scalar(&field_type, text)
}

fn decode_scalar(field_type: &str, text: String) -> FieldValue {
    match field_type {
        "INTEGER" | "INT64" => match text.parse::<i64>() {
            Ok(i) => FieldValue::Int(i),
            Err(_) => FieldValue::String(text),
        },
        "FLOAT" | "FLOAT64" => match text.parse::<f64>() {
            Ok(f) => FieldValue::Float(f),
            Err(_) => FieldValue::String(text),
        },
        "BOOLEAN" | "BOOL" => match text.as_str() {
            "true" => FieldValue::Bool(true),
            "false" => FieldValue::Bool(false),
            _ => FieldValue::String(text),
        },
        "NUMERIC" | "BIGNUMERIC" | "DECIMAL" | "BIGDECIMAL" => FieldValue::Numeric(text),
        "TIMESTAMP" => match parse_timestamp(&text) {
            Some(ts) => FieldValue::Timestamp(ts),
            None => FieldValue::String(text),
        },
        "DATE" => match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
            Ok(d) => FieldValue::Date(d),
            Err(_) => FieldValue::String(text),
        },
        "TIME" => match NaiveTime::parse_from_str(&text, "%H:%M:%S%.f") {
            Ok(t) => FieldValue::Time(t),
            Err(_) => FieldValue::String(text),
        },
        "DATETIME" => match NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f") {
            Ok(dt) => FieldValue::DateTime(dt),
            Err(_) => FieldValue::String(text),
        },
        "BYTES" => match BASE64.decode(text.as_bytes()) {
            Ok(bytes) => FieldValue::Bytes(bytes),
            Err(_) => FieldValue::String(text),
        },
        _ => FieldValue::String(text),
    }
}

/// Microseconds since the epoch, or float seconds from older responses
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(micros) = text.parse::<i64>() {
        return DateTime::from_timestamp_micros(micros);
    }
    let seconds = text.parse::<f64>().ok()?;
    DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
}
