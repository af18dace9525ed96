// Trait-based interfaces for the capture hardware (shared)
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Camera not started")]
    NotReady,
    #[error("Device busy: {0}")]
    Busy(String),
    #[error("Capture timed out after {0} ms")]
    Timeout(u64),
    #[error("Capture command failed: {0}")]
    CommandFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Single-shot image source.
#[async_trait]
pub trait ImageSource: Send {
    /// Configure resolution and enter capture mode. No-op when already started.
    async fn start(&mut self) -> Result<(), HardwareError>;

    /// Leave capture mode. No-op when already stopped.
    async fn stop(&mut self) -> Result<(), HardwareError>;

    /// Apply an exposure time. Returns after the settle delay, so the next
    /// capture already uses the new exposure.
    async fn set_exposure(&mut self, microseconds: u32) -> Result<(), HardwareError>;

    /// Capture one freshly encoded frame. `NotReady` when not started.
    async fn capture(&mut self) -> Result<Vec<u8>, HardwareError>;

    fn is_started(&self) -> bool;
}

/// PWM-driven illumination.
#[async_trait]
pub trait IndicatorLight: Send {
    /// Set brightness in percent. Out-of-range values are clamped to 0..=100.
    /// Performs setup on first use.
    async fn set_brightness(&mut self, percent: f32) -> Result<(), HardwareError>;

    async fn on(&mut self) -> Result<(), HardwareError> {
        self.set_brightness(100.0).await
    }

    async fn off(&mut self) -> Result<(), HardwareError> {
        self.set_brightness(0.0).await
    }

    /// Release the PWM resource. Safe to call more than once.
    async fn cleanup(&mut self) -> Result<(), HardwareError>;

    /// Whether the output has been claimed. An unclaimed light needs neither
    /// switching off nor releasing.
    fn is_claimed(&self) -> bool {
        true
    }

    /// Last brightness applied, in percent.
    fn brightness(&self) -> f32;
}

/// Clamp a requested brightness into 0..=100. NaN counts as off.
pub fn clamp_brightness(percent: f32) -> f32 {
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_brightness() {
        assert_eq!(clamp_brightness(-5.0), 0.0);
        assert_eq!(clamp_brightness(42.5), 42.5);
        assert_eq!(clamp_brightness(150.0), 100.0);
        assert_eq!(clamp_brightness(f32::NAN), 0.0);
    }
}
