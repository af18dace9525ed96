//! Moonraker HTTP client implementing [`PrinterDevice`].

pub mod models;

use async_trait::async_trait;
use printwatch_shared::{DeviceError, PrinterDevice, PrinterStatus};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::config::PrinterConfig;
use models::{PrintStats, PrintStatsStatus, QueryEnvelope, WebhooksStatus};

const USER_AGENT: &str = concat!("printwatch/", env!("CARGO_PKG_VERSION"));

pub struct MoonrakerClient {
    http_client: Client,
    base_url: Url,
    probe_timeout: Duration,
    download_timeout: Duration,
}

impl MoonrakerClient {
    pub fn new(config: &PrinterConfig) -> Result<Self, DeviceError> {
        let trimmed = config.url.trim().trim_end_matches('/');
        let base_url = Url::parse(trimmed)
            .map_err(|e| DeviceError::Parse(format!("Invalid printer URL '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(DeviceError::Parse(format!("Printer URL '{}' cannot be a base", config.url)));
        }

        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| DeviceError::Connection(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            download_timeout: Duration::from_millis(config.download_timeout_ms),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, DeviceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DeviceError::Parse(format!("Printer URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn objects_query(&self, object: &str) -> Result<Url, DeviceError> {
        let mut url = self.endpoint(["printer", "objects", "query"])?;
        url.set_query(Some(object));
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, timeout: Option<Duration>) -> Result<T, DeviceError> {
        let mut request = self.http_client.get(url.clone());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceError::Http { status: status.as_u16(), body });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| DeviceError::Parse(format!("{}: {}", url.path(), e)))
    }

    async fn print_stats(&self) -> Result<PrintStats, DeviceError> {
        let url = self.objects_query("print_stats")?;
        let envelope: QueryEnvelope<PrintStatsStatus> = self.get_json(url, None).await?;
        Ok(envelope.result.status.print_stats)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> DeviceError {
    if e.is_timeout() {
        DeviceError::Timeout(e.to_string())
    } else if e.is_decode() {
        DeviceError::Parse(e.to_string())
    } else {
        DeviceError::Connection(e.to_string())
    }
}

#[async_trait]
impl PrinterDevice for MoonrakerClient {
    async fn check_connectivity(&self) -> bool {
        let url = match self.objects_query("webhooks") {
            Ok(url) => url,
            Err(_) => return false,
        };
        match self.get_json::<QueryEnvelope<WebhooksStatus>>(url, Some(self.probe_timeout)).await {
            Ok(envelope) => {
                tracing::trace!(state = ?envelope.result.status.webhooks.state, "Connectivity probe ok");
                true
            }
            Err(e) => {
                tracing::debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }

    async fn query_print_state(&self) -> Result<PrinterStatus, DeviceError> {
        let stats = self.print_stats().await?;
        let state = stats
            .state
            .ok_or_else(|| DeviceError::Parse("print_stats.state missing".to_string()))?;
        Ok(PrinterStatus::from_print_stats(&state))
    }

    async fn query_current_layer(&self) -> Result<Option<u32>, DeviceError> {
        let stats = self.print_stats().await?;
        Ok(stats.info.and_then(|info| info.current_layer))
    }

    async fn active_filename(&self) -> Result<String, DeviceError> {
        let stats = self.print_stats().await?;
        match stats.filename {
            Some(name) if !name.trim().is_empty() => Ok(name),
            _ => Err(DeviceError::NotFound("no active print file".to_string())),
        }
    }

    async fn download_gcode(&self, filename: &str) -> Result<String, DeviceError> {
        let segments = ["server", "files", "gcodes"]
            .into_iter()
            .chain(filename.split('/').filter(|s| !s.is_empty()));
        let url = self.endpoint(segments)?;
        tracing::debug!(%filename, "Downloading G-code");

        let response = self
            .http_client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(DeviceError::NotFound(filename.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceError::Http { status: status.as_u16(), body });
        }
        response.text().await.map_err(map_reqwest_error)
    }

    async fn send_command(&self, command: &str) -> bool {
        let mut url = match self.endpoint(["printer", "gcode", "script"]) {
            Ok(url) => url,
            Err(_) => return false,
        };
        url.query_pairs_mut().append_pair("script", command);

        let response = match self.http_client.post(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%command, "Failed to send G-code: {}", e);
                return false;
            }
        };
        match response.json::<Value>().await {
            Ok(body) if body.get("result").is_some() => true,
            Ok(body) => {
                tracing::warn!(%command, response = %body, "G-code rejected");
                false
            }
            Err(e) => {
                tracing::warn!(%command, "Unreadable G-code response: {}", e);
                false
            }
        }
    }
}
