// src/hardware/pwm.rs - LED brightness through the Linux PWM sysfs interface
use async_trait::async_trait;
use printwatch_shared::hardware_traits::clamp_brightness;
use printwatch_shared::{HardwareError, IndicatorLight};
use std::path::{Path, PathBuf};
use tokio::time::{sleep, Duration};

use crate::config::LightConfig;

const EXPORT_POLL_ATTEMPTS: u32 = 20;
const EXPORT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One PWM channel under `<root>/pwmchip<N>/pwm<M>`.
pub struct SysfsPwmLight {
    chip_dir: PathBuf,
    channel: u32,
    period_ns: u64,
    is_setup: bool,
    brightness: f32,
}

impl SysfsPwmLight {
    pub fn new(config: &LightConfig) -> Self {
        Self {
            chip_dir: config.sysfs_root.join(format!("pwmchip{}", config.chip)),
            channel: config.channel,
            period_ns: 1_000_000_000 / u64::from(config.frequency_hz.max(1)),
            is_setup: false,
            brightness: 0.0,
        }
    }

    fn channel_dir(&self) -> PathBuf {
        self.chip_dir.join(format!("pwm{}", self.channel))
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }

    async fn write_attr(path: &Path, value: impl ToString) -> Result<(), HardwareError> {
        tokio::fs::write(path, value.to_string()).await.map_err(|e| {
            tracing::error!("Failed to write '{}': {}", path.display(), e);
            HardwareError::Io(e)
        })
    }

    async fn setup(&mut self) -> Result<(), HardwareError> {
        let channel_dir = self.channel_dir();
        if !tokio::fs::try_exists(&channel_dir).await? {
            Self::write_attr(&self.chip_dir.join("export"), self.channel).await?;
            // udev may need a moment to create the channel and fix permissions
            let mut attempts = 0;
            while !tokio::fs::try_exists(&channel_dir).await? {
                attempts += 1;
                if attempts >= EXPORT_POLL_ATTEMPTS {
                    return Err(HardwareError::Busy(format!("{} did not appear after export", channel_dir.display())));
                }
                sleep(EXPORT_POLL_INTERVAL).await;
            }
        }
        Self::write_attr(&channel_dir.join("period"), self.period_ns).await?;
        Self::write_attr(&channel_dir.join("duty_cycle"), 0).await?;
        Self::write_attr(&channel_dir.join("enable"), 1).await?;
        self.is_setup = true;
        tracing::info!(
            channel = %channel_dir.display(),
            period_ns = self.period_ns,
            "PWM light ready"
        );
        Ok(())
    }
}

#[async_trait]
impl IndicatorLight for SysfsPwmLight {
    async fn set_brightness(&mut self, percent: f32) -> Result<(), HardwareError> {
        if !self.is_setup {
            self.setup().await?;
        }
        let percent = clamp_brightness(percent);
        let duty = (self.period_ns as f64 * f64::from(percent) / 100.0).round() as u64;
        Self::write_attr(&self.channel_dir().join("duty_cycle"), duty).await?;
        self.brightness = percent;
        tracing::debug!(percent, duty_ns = duty, "Light brightness set");
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), HardwareError> {
        if !self.is_setup {
            return Ok(());
        }
        self.is_setup = false;
        self.brightness = 0.0;
        Self::write_attr(&self.channel_dir().join("enable"), 0).await?;
        Self::write_attr(&self.chip_dir.join("unexport"), self.channel).await?;
        tracing::info!("PWM light released");
        Ok(())
    }

    fn brightness(&self) -> f32 {
        self.brightness
    }

    fn is_claimed(&self) -> bool {
        self.is_setup
    }
}
