// src/hardware/camera.rs - Raspberry Pi camera driven through rpicam-still
use async_trait::async_trait;
use printwatch_shared::{HardwareError, ImageSource};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{sleep, timeout, Duration};

use crate::config::CameraConfig;

/// Still camera backed by the libcamera `rpicam-still` tool.
///
/// Every capture spawns one subprocess writing a JPEG to stdout. `start` only
/// checks that the tool runs; there is no long-lived camera handle to hold.
pub struct RpiCamCamera {
    command: String,
    width: u32,
    height: u32,
    exposure_us: Option<u32>,
    capture_timeout: Duration,
    settle: Duration,
    started: bool,
}

impl RpiCamCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            command: config.command.clone(),
            width: config.width,
            height: config.height,
            exposure_us: None,
            capture_timeout: Duration::from_millis(config.capture_timeout_ms),
            settle: Duration::from_millis(config.settle_ms),
            started: false,
        }
    }

    fn capture_args(&self) -> Vec<String> {
        let mut args = vec![
            "--nopreview".to_string(),
            "--immediate".to_string(),
            "-t".to_string(),
            "1".to_string(),
            "--width".to_string(),
            self.width.to_string(),
            "--height".to_string(),
            self.height.to_string(),
            "--encoding".to_string(),
            "jpg".to_string(),
        ];
        if let Some(us) = self.exposure_us {
            args.push("--shutter".to_string());
            args.push(us.to_string());
        }
        args.push("-o".to_string());
        args.push("-".to_string());
        args
    }
}

#[async_trait]
impl ImageSource for RpiCamCamera {
    async fn start(&mut self) -> Result<(), HardwareError> {
        if self.started {
            return Ok(());
        }
        let probe = Command::new(&self.command)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = timeout(self.capture_timeout, probe)
            .await
            .map_err(|_| HardwareError::Timeout(self.capture_timeout.as_millis() as u64))??;
        if !output.status.success() {
            return Err(HardwareError::CommandFailed(format!(
                "{} --version exited with {:?}",
                self.command,
                output.status.code()
            )));
        }
        tracing::info!(
            command = %self.command,
            width = self.width,
            height = self.height,
            "Camera started"
        );
        self.started = true;
        sleep(self.settle).await;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HardwareError> {
        if self.started {
            self.started = false;
            tracing::info!("Camera stopped");
        }
        Ok(())
    }

    async fn set_exposure(&mut self, microseconds: u32) -> Result<(), HardwareError> {
        self.exposure_us = Some(microseconds);
        tracing::debug!(exposure_us = microseconds, "Exposure set");
        sleep(self.settle).await;
        Ok(())
    }

    async fn capture(&mut self) -> Result<Vec<u8>, HardwareError> {
        if !self.started {
            return Err(HardwareError::NotReady);
        }
        let child = Command::new(&self.command)
            .args(self.capture_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = timeout(self.capture_timeout, child)
            .await
            .map_err(|_| HardwareError::Timeout(self.capture_timeout.as_millis() as u64))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HardwareError::CommandFailed(format!(
                "{} exited with {:?}: {}",
                self.command,
                output.status.code(),
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(HardwareError::CommandFailed(format!("{} produced no image data", self.command)));
        }
        Ok(output.stdout)
    }

    fn is_started(&self) -> bool {
        self.started
    }
}
