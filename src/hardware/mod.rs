// src/hardware/mod.rs - Capture hardware: camera plus light, owned together
pub mod camera;
pub mod pwm;
pub mod sim;

use printwatch_shared::{HardwareError, ImageSource, IndicatorLight};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::{CameraBackend, CameraConfig, LightBackend, LightConfig};
use camera::RpiCamCamera;
use pwm::SysfsPwmLight;
use sim::{SimulatedCamera, SimulatedLight};

/// Largest frame the simulated camera renders.
const SIM_MAX_WIDTH: u32 = 320;
const SIM_MAX_HEIGHT: u32 = 240;

/// Camera and light behind one lock: the capture loop holds it per iteration
/// and the release sequence takes it once at shutdown.
pub struct HardwareRig {
    pub camera: Box<dyn ImageSource>,
    pub light: Box<dyn IndicatorLight>,
}

pub type SharedRig = Arc<Mutex<HardwareRig>>;

impl HardwareRig {
    pub fn new(camera: Box<dyn ImageSource>, light: Box<dyn IndicatorLight>) -> Self {
        Self { camera, light }
    }

    /// Build from config. `simulate` forces both simulated backends.
    pub fn from_config(camera: &CameraConfig, light: &LightConfig, simulate: bool) -> Self {
        let camera: Box<dyn ImageSource> = match (simulate, camera.backend) {
            (false, CameraBackend::Rpicam) => Box::new(RpiCamCamera::new(camera)),
            _ => Box::new(SimulatedCamera::new(
                camera.width.min(SIM_MAX_WIDTH),
                camera.height.min(SIM_MAX_HEIGHT),
            )),
        };
        let light: Box<dyn IndicatorLight> = match (simulate, light.backend) {
            (false, LightBackend::Sysfs) => Box::new(SysfsPwmLight::new(light)),
            _ => Box::new(SimulatedLight::new()),
        };
        Self::new(camera, light)
    }

    pub fn into_shared(self) -> SharedRig {
        Arc::new(Mutex::new(self))
    }

    /// Start the camera and apply an exposure, if one is configured.
    pub async fn warm_up(&mut self, exposure_us: Option<u32>) -> Result<(), HardwareError> {
        self.camera.start().await?;
        if let Some(us) = exposure_us {
            self.camera.set_exposure(us).await?;
        }
        Ok(())
    }

    /// Single calibration frame: apply the exposure, light at 100 %, capture
    /// once, then release everything whether or not the capture worked.
    pub async fn capture_still(&mut self, exposure_us: Option<u32>) -> Result<Vec<u8>, HardwareError> {
        let captured = async {
            self.warm_up(exposure_us).await?;
            self.light.on().await?;
            self.camera.capture().await
        }
        .await;
        let released = self.release().await;
        let image = captured?;
        released?;
        tracing::info!(bytes = image.len(), ?exposure_us, "Still frame captured");
        Ok(image)
    }

    /// Stop the camera, switch the light off, release the light. Each step
    /// runs even if an earlier one failed; the first error is returned. A
    /// light that was never claimed is left alone.
    pub async fn release(&mut self) -> Result<(), HardwareError> {
        let stopped = self.camera.stop().await;
        if let Err(e) = &stopped {
            tracing::error!("Failed to stop camera: {}", e);
        }
        if !self.light.is_claimed() {
            tracing::debug!("Light never claimed, nothing to release");
            return stopped;
        }
        let off = self.light.off().await;
        if let Err(e) = &off {
            tracing::error!("Failed to switch light off: {}", e);
        }
        let cleaned = self.light.cleanup().await;
        if let Err(e) = &cleaned {
            tracing::error!("Failed to release light: {}", e);
        }
        stopped.and(off).and(cleaned)
    }
}
