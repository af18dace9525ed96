// Printer device seam: status/control API consumed by the orchestrator
use async_trait::async_trait;
use thiserror::Error;

use crate::PrinterStatus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Unexpected response: {0}")]
    Parse(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl DeviceError {
    /// Timeouts, connection failures and 5xx responses may clear on the next poll.
    pub fn is_transient(&self) -> bool {
        match self {
            DeviceError::Timeout(_) | DeviceError::Connection(_) => true,
            DeviceError::Http { status, .. } => *status >= 500,
            DeviceError::Parse(_) | DeviceError::NotFound(_) => false,
        }
    }
}

/// Status and control interface of the printer host.
///
/// Every call is bounded by a timeout in the implementation and none retries
/// internally; retry cadence belongs to the caller.
#[async_trait]
pub trait PrinterDevice: Send + Sync {
    /// Lightweight reachability probe. Never errors: any failure is `false`.
    async fn check_connectivity(&self) -> bool;

    async fn query_print_state(&self) -> Result<PrinterStatus, DeviceError>;

    /// Current layer of the active print, `None` when the host does not report one.
    async fn query_current_layer(&self) -> Result<Option<u32>, DeviceError>;

    /// Filename of the active job. `NotFound` when nothing is loaded.
    async fn active_filename(&self) -> Result<String, DeviceError>;

    async fn download_gcode(&self, filename: &str) -> Result<String, DeviceError>;

    /// Submit a G-code script. `true` only for a well-formed result envelope.
    async fn send_command(&self, command: &str) -> bool;

    /// Resolve the active filename, then download it.
    async fn fetch_active_gcode_text(&self) -> Result<(String, String), DeviceError> {
        let filename = self.active_filename().await?;
        let text = self.download_gcode(&filename).await?;
        Ok((filename, text))
    }
}
