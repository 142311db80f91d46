//! In-memory fakes shared by unit tests

use crate::audit::{AuditRecord, AuditSink};
use crate::credentials::{Credentials, RawCredentials};
use crate::error::{AuditWriteError, CredentialError, ServiceError};
use crate::rows::{FieldValue, Row};
use crate::service::{Connector, DryRunStats, QueryOutcome, QueryService};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Canned responses plus a log of the calls made against them
pub struct Script {
    pub dry_run: Result<u64, ServiceError>,
    pub execute: Result<QueryOutcome, ServiceError>,
    pub list_datasets: Result<Vec<String>, ServiceError>,
    pub calls: Mutex<Vec<String>>,
}

impl Script {
    pub fn new(dry_run_bytes: u64, execute: Result<QueryOutcome, ServiceError>) -> Arc<Self> {
        Arc::new(Self {
            dry_run: Ok(dry_run_bytes),
            execute,
            list_datasets: Ok(vec!["sales".to_string()]),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_dry_run(err: ServiceError) -> Arc<Self> {
        Arc::new(Self {
            dry_run: Err(err),
            execute: Ok(outcome(0)),
            list_datasets: Ok(vec![]),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_listing(err: ServiceError) -> Arc<Self> {
        Arc::new(Self {
            dry_run: Ok(0),
            execute: Ok(outcome(0)),
            list_datasets: Err(err),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn execute_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("execute"))
            .count()
    }
}

pub struct ScriptedService(Arc<Script>);

#[async_trait]
impl QueryService for ScriptedService {
    async fn dry_run(&self, _query: &str) -> Result<DryRunStats, ServiceError> {
        self.0.calls.lock().unwrap().push("dry_run".to_string());
        self.0
            .dry_run
            .clone()
            .map(|bytes_processed| DryRunStats { bytes_processed })
    }

    async fn execute(&self, _query: &str, row_limit: u64) -> Result<QueryOutcome, ServiceError> {
        self.0
            .calls
            .lock()
            .unwrap()
            .push(format!("execute:{}", row_limit));
        self.0.execute.clone()
    }

    async fn list_datasets(&self, max_results: u32) -> Result<Vec<String>, ServiceError> {
        self.0
            .calls
            .lock()
            .unwrap()
            .push(format!("list_datasets:{}", max_results));
        self.0.list_datasets.clone()
    }
}

pub struct ScriptedConnector(pub Arc<Script>);

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _credentials: &Credentials,
    ) -> Result<Box<dyn QueryService>, CredentialError> {
        Ok(Box::new(ScriptedService(Arc::clone(&self.0))))
    }
}

/// Audit sink that keeps records in memory, or always fails
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<AuditRecord>>,
    pub fail: bool,
}

impl MemorySink {
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl AuditSink for MemorySink {
    fn write(&self, record: &AuditRecord) -> Result<(), AuditWriteError> {
        if self.fail {
            return Err(AuditWriteError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub fn valid_credentials() -> RawCredentials {
    RawCredentials::new("demo", crate::credentials::tests::sample_key())
}

/// A two-row result reporting `bytes_processed`
pub fn outcome(bytes_processed: u64) -> QueryOutcome {
    QueryOutcome {
        rows: vec![
            Row::new(vec![
                ("id".to_string(), FieldValue::Int(1)),
                (
                    "day".to_string(),
                    FieldValue::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
                ),
            ]),
            Row::new(vec![
                ("id".to_string(), FieldValue::Int(2)),
                ("day".to_string(), FieldValue::Null),
            ]),
        ],
        schema: vec!["id".to_string(), "day".to_string()],
        job_id: "job_test".to_string(),
        bytes_processed,
        total_rows: 2,
    }
}

/// Toolbox wired to a scripted service, defaulting to valid credentials
pub fn toolbox(script: &Arc<Script>, sink: &Arc<MemorySink>) -> crate::plugins::Toolbox {
    let connector: Arc<dyn Connector> = Arc::new(ScriptedConnector(Arc::clone(script)));
    crate::plugins::Toolbox::new(
        crate::gateway::QueryGateway::new(
            Arc::clone(&connector),
            Arc::clone(sink) as Arc<dyn AuditSink>,
            crate::cost::CostPolicy::default(),
        ),
        crate::provider::CredentialValidator::new(connector),
        Arc::new(valid_credentials()),
    )
}
