//! # Acquisition Configuration
//!
//! This module defines the configuration for the printer connection, the
//! database, the capture hardware and the acquisition loops.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [printer]
//! url = "http://192.168.2.170"
//! probe_timeout_ms = 2000
//!
//! [database]
//! url = "sqlite://printwatch.db"
//!
//! [camera]
//! backend = "rpicam"
//! width = 1920
//! height = 1080
//! exposure_us = 20000
//!
//! [light]
//! backend = "sysfs"
//! chip = 0
//! channel = 0
//!
//! [acquisition]
//! status_interval_ms = 100
//! status_error_policy = "preserve_job"
//! printer_name = "SovolSv06"
//! ```
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.

// src/config.rs - Single configuration file
use printwatch_shared::StatusErrorPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the printer, database, camera, light and loops.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub light: LightConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// Moonraker connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterConfig {
    #[serde(default = "default_printer_url")]
    pub url: String,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            url: default_printer_url(),
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            download_timeout_ms: default_download_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraBackend {
    Rpicam,
    Simulated,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_backend")]
    pub backend: CameraBackend,
    /// Still-capture binary, looked up on `PATH` when not absolute.
    #[serde(default = "default_camera_command")]
    pub command: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub exposure_us: Option<u32>,
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: default_camera_backend(),
            command: default_camera_command(),
            width: default_width(),
            height: default_height(),
            exposure_us: None,
            capture_timeout_ms: default_capture_timeout_ms(),
            settle_ms: default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LightBackend {
    Sysfs,
    Simulated,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LightConfig {
    #[serde(default = "default_light_backend")]
    pub backend: LightBackend,
    #[serde(default = "default_pwm_root")]
    pub sysfs_root: PathBuf,
    #[serde(default)]
    pub chip: u32,
    #[serde(default)]
    pub channel: u32,
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: u32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            backend: default_light_backend(),
            sysfs_root: default_pwm_root(),
            chip: 0,
            channel: 0,
            frequency_hz: default_frequency_hz(),
        }
    }
}

/// What to do when resolving job metadata fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataRetryPolicy {
    /// Any failure is final for the job.
    #[default]
    Never,
    /// Transient device/database failures are retried on the next status tick.
    OnTransient,
}

/// Loop cadences and per-job behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquisitionConfig {
    #[serde(default = "default_availability_interval_ms")]
    pub availability_interval_ms: u64,
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    #[serde(default = "default_capture_interval_ms")]
    pub capture_interval_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default)]
    pub status_error_policy: StatusErrorPolicy,
    #[serde(default)]
    pub metadata_retry: MetadataRetryPolicy,
    #[serde(default = "default_slicer_profile")]
    pub slicer_profile: String,
    #[serde(default = "default_printer_name")]
    pub printer_name: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            availability_interval_ms: default_availability_interval_ms(),
            status_interval_ms: default_status_interval_ms(),
            capture_interval_ms: default_capture_interval_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            status_error_policy: StatusErrorPolicy::default(),
            metadata_retry: MetadataRetryPolicy::default(),
            slicer_profile: default_slicer_profile(),
            printer_name: default_printer_name(),
        }
    }
}

impl AcquisitionConfig {
    pub fn availability_interval(&self) -> Duration {
        Duration::from_millis(self.availability_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.printer.url.starts_with("http://") || self.printer.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!("printer.url must be an http(s) URL, got '{}'", self.printer.url)));
        }
        let acq = &self.acquisition;
        for (name, value) in [
            ("availability_interval_ms", acq.availability_interval_ms),
            ("status_interval_ms", acq.status_interval_ms),
            ("capture_interval_ms", acq.capture_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("acquisition.{} must be > 0", name)));
            }
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid("camera resolution must be non-zero".to_string()));
        }
        if self.light.frequency_hz == 0 {
            return Err(ConfigError::Invalid("light.frequency_hz must be > 0".to_string()));
        }
        Ok(())
    }
}

fn default_printer_url() -> String { "http://localhost:7125".to_string() }
fn default_probe_timeout_ms() -> u64 { 2000 }
fn default_request_timeout_ms() -> u64 { 5000 }
fn default_download_timeout_ms() -> u64 { 30_000 }
fn default_database_url() -> String { "sqlite://printwatch.db".to_string() }
fn default_max_connections() -> u32 { 4 }
fn default_acquire_timeout_ms() -> u64 { 5000 }
fn default_camera_backend() -> CameraBackend { CameraBackend::Rpicam }
fn default_camera_command() -> String { "rpicam-still".to_string() }
fn default_width() -> u32 { 1920 }
fn default_height() -> u32 { 1080 }
fn default_capture_timeout_ms() -> u64 { 10_000 }
fn default_settle_ms() -> u64 { 1000 }
fn default_light_backend() -> LightBackend { LightBackend::Sysfs }
fn default_pwm_root() -> PathBuf { PathBuf::from("/sys/class/pwm") }
fn default_frequency_hz() -> u32 { 1000 }
fn default_availability_interval_ms() -> u64 { 1000 }
fn default_status_interval_ms() -> u64 { 100 }
fn default_capture_interval_ms() -> u64 { 1000 }
fn default_shutdown_timeout_ms() -> u64 { 2000 }
fn default_slicer_profile() -> String { "default".to_string() }
fn default_printer_name() -> String { "SovolSv06".to_string() }

pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                config.validate()?;
                Ok(config)
            }
            Err(e) => {
                tracing::error!("Failed to parse config TOML: {}", e);
                Err(ConfigError::Toml(e))
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path.display(), e);
            Err(ConfigError::Io(e))
        }
    }
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_config_or_default(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!("Config file '{}' not found, using defaults", path.display());
        return Ok(Config::default());
    }
    load_config(path)
}
