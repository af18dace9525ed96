// src/hardware/sim.rs - Stand-in camera and light for runs without the Pi hardware
use async_trait::async_trait;
use printwatch_shared::hardware_traits::clamp_brightness;
use printwatch_shared::{HardwareError, ImageSource, IndicatorLight};

/// Emits binary PPM frames with a diagonal gradient that shifts every frame.
#[derive(Debug)]
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    started: bool,
    exposure_us: Option<u32>,
    frame: u32,
}

impl SimulatedCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1), started: false, exposure_us: None, frame: 0 }
    }

    pub fn frames_captured(&self) -> u32 {
        self.frame
    }

    fn render(&self) -> Vec<u8> {
        let header = format!("P6\n{} {}\n255\n", self.width, self.height);
        let mut image = Vec::with_capacity(header.len() + (self.width * self.height * 3) as usize);
        image.extend_from_slice(header.as_bytes());
        // longer exposure, brighter frame
        let gain = self.exposure_us.map_or(1.0, |us| (us as f32 / 20_000.0).clamp(0.25, 2.0));
        for y in 0..self.height {
            for x in 0..self.width {
                let v = ((x + y + self.frame * 8) % 256) as f32;
                let v = (v * gain).min(255.0) as u8;
                image.extend_from_slice(&[v, v / 2, 255 - v]);
            }
        }
        image
    }
}

#[async_trait]
impl ImageSource for SimulatedCamera {
    async fn start(&mut self) -> Result<(), HardwareError> {
        if !self.started {
            self.started = true;
            tracing::info!(width = self.width, height = self.height, "Simulated camera started");
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HardwareError> {
        if self.started {
            self.started = false;
            tracing::info!("Simulated camera stopped");
        }
        Ok(())
    }

    async fn set_exposure(&mut self, microseconds: u32) -> Result<(), HardwareError> {
        self.exposure_us = Some(microseconds);
        Ok(())
    }

    async fn capture(&mut self) -> Result<Vec<u8>, HardwareError> {
        if !self.started {
            return Err(HardwareError::NotReady);
        }
        let image = self.render();
        self.frame = self.frame.wrapping_add(1);
        Ok(image)
    }

    fn is_started(&self) -> bool {
        self.started
    }
}

#[derive(Debug, Default)]
pub struct SimulatedLight {
    brightness: f32,
    is_setup: bool,
}

impl SimulatedLight {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndicatorLight for SimulatedLight {
    async fn set_brightness(&mut self, percent: f32) -> Result<(), HardwareError> {
        if !self.is_setup {
            self.is_setup = true;
            tracing::info!("Simulated light ready");
        }
        self.brightness = clamp_brightness(percent);
        tracing::debug!(percent = self.brightness, "Simulated light brightness");
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), HardwareError> {
        if self.is_setup {
            self.is_setup = false;
            self.brightness = 0.0;
            tracing::info!("Simulated light released");
        }
        Ok(())
    }

    fn brightness(&self) -> f32 {
        self.brightness
    }
}
