//! Host-facing serve loop
//!
//! Reads one JSON envelope per line and writes one JSON response per line.
//! Logging goes to stderr; stdout carries protocol traffic only.

use super::protocol::{HostMessage, PluginResponse};
use super::tools::Toolbox;
use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

pub struct PluginHost {
    toolbox: Toolbox,
}

impl PluginHost {
    pub fn new(toolbox: Toolbox) -> Self {
        Self { toolbox }
    }

    /// Serve requests until shutdown or end of input.
    ///
    /// Returns the number of responses written.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut handled = 0;

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<HostMessage>(line) {
                Ok(HostMessage::Shutdown) => {
                    info!("Shutdown requested by host");
                    break;
                }
                Ok(HostMessage::Invoke(request)) => self.toolbox.execute(&request).await,
                Ok(HostMessage::ValidateCredentials { id, credentials }) => {
                    self.toolbox.validate_credentials(&id, &credentials).await
                }
                Err(e) => {
                    warn!("Failed to parse host message: {}", e);
                    PluginResponse::error(&salvage_id(line), &format!("Invalid request: {}", e))
                }
            };

            let mut json = serde_json::to_string(&response)?;
            json.push('\n');
            writer.write_all(json.as_bytes()).await?;
            writer.flush().await?;

            debug!("Responded to request {}", response.id);
            handled += 1;
        }

        Ok(handled)
    }
}

/// Best-effort id from a line that failed to parse as a full envelope
fn salvage_id(line: &str) -> String {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}
