#![allow(dead_code)]

use async_trait::async_trait;
use printwatch_shared::{
    CapturedFrame, DeviceError, HardwareError, ImageSource, IndicatorLight, PartDescriptor, PersistenceError,
    PersistenceGateway, PrinterDevice, PrinterStatus, SlicerSettings,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const GCODE: &str = "\
G28
; sparse_infill_density = 20%
; sparse_infill_pattern = gyroid
; first_layer_bed_temperature = 65
; nozzle_temperature = 215
; layer_height = 0.16
; line_width = 100%
";

struct DeviceState {
    online: bool,
    status: Result<PrinterStatus, DeviceError>,
    layer: Option<u32>,
    filename: Option<String>,
    gcode: String,
    download_delay: Duration,
    connectivity_failures_left: u32,
}

/// Printer whose answers are set directly by the test.
pub struct ScriptedDevice {
    state: Mutex<DeviceState>,
    pub downloads: AtomicU64,
    pub filename_queries: AtomicU64,
    pub probes: AtomicU64,
}

impl ScriptedDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DeviceState {
                online: true,
                status: Ok(PrinterStatus::Idle),
                layer: None,
                filename: Some("bracket_v2_0.16mm_PETG.gcode".to_string()),
                gcode: GCODE.to_string(),
                download_delay: Duration::ZERO,
                connectivity_failures_left: 0,
            }),
            downloads: AtomicU64::new(0),
            filename_queries: AtomicU64::new(0),
            probes: AtomicU64::new(0),
        })
    }

    pub fn set_status(&self, status: PrinterStatus) {
        self.state.lock().unwrap().status = Ok(status);
    }

    pub fn fail_status(&self, error: DeviceError) {
        self.state.lock().unwrap().status = Err(error);
    }

    pub fn set_layer(&self, layer: Option<u32>) {
        self.state.lock().unwrap().layer = layer;
    }

    pub fn set_filename(&self, filename: Option<&str>) {
        self.state.lock().unwrap().filename = filename.map(str::to_string);
    }

    pub fn set_online(&self, online: bool) {
        self.state.lock().unwrap().online = online;
    }

    /// Make every G-code download take `delay` before answering.
    pub fn delay_downloads(&self, delay: Duration) {
        self.state.lock().unwrap().download_delay = delay;
    }

    /// Fail the next `n` connectivity probes, then follow `online`.
    pub fn fail_probes(&self, n: u32) {
        self.state.lock().unwrap().connectivity_failures_left = n;
    }
}

#[async_trait]
impl PrinterDevice for ScriptedDevice {
    async fn check_connectivity(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.connectivity_failures_left > 0 {
            state.connectivity_failures_left -= 1;
            return false;
        }
        state.online
    }

    async fn query_print_state(&self) -> Result<PrinterStatus, DeviceError> {
        self.state.lock().unwrap().status.clone()
    }

    async fn query_current_layer(&self) -> Result<Option<u32>, DeviceError> {
        Ok(self.state.lock().unwrap().layer)
    }

    async fn active_filename(&self) -> Result<String, DeviceError> {
        self.filename_queries.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .unwrap()
            .filename
            .clone()
            .ok_or_else(|| DeviceError::NotFound("no active print file".to_string()))
    }

    async fn download_gcode(&self, _filename: &str) -> Result<String, DeviceError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.lock().unwrap().download_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.lock().unwrap().gcode.clone())
    }

    async fn send_command(&self, _command: &str) -> bool {
        true
    }
}

/// Gateway that keeps every call in memory.
#[derive(Default)]
pub struct RecordingGateway {
    pub frames: Mutex<Vec<CapturedFrame>>,
    pub settings: Mutex<Vec<SlicerSettings>>,
    pub parts: Mutex<Vec<PartDescriptor>>,
    pub fail_images: AtomicBool,
    pub settings_failures_left: AtomicU64,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn settings_calls(&self) -> usize {
        self.settings.lock().unwrap().len()
    }

    pub fn part_calls(&self) -> usize {
        self.parts.lock().unwrap().len()
    }
}

#[async_trait]
impl PersistenceGateway for RecordingGateway {
    async fn insert_image(&self, frame: &CapturedFrame) -> Result<i64, PersistenceError> {
        if self.fail_images.load(Ordering::SeqCst) {
            return Err(PersistenceError::Database("disk I/O error".to_string()));
        }
        let mut frames = self.frames.lock().unwrap();
        frames.push(frame.clone());
        Ok(frames.len() as i64)
    }

    async fn find_or_create_slicer_settings(&self, settings: &SlicerSettings) -> Result<i64, PersistenceError> {
        let mut calls = self.settings.lock().unwrap();
        calls.push(settings.clone());
        let left = self.settings_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.settings_failures_left.store(left - 1, Ordering::SeqCst);
            return Err(PersistenceError::Database("database is locked".to_string()));
        }
        Ok(100 + calls.len() as i64)
    }

    async fn find_or_create_part(&self, part: &PartDescriptor) -> Result<i64, PersistenceError> {
        let mut calls = self.parts.lock().unwrap();
        calls.push(part.clone());
        Ok(200 + calls.len() as i64)
    }
}

/// Shared view of what the fake hardware did, kept after the rig is moved.
#[derive(Clone, Default)]
pub struct HardwareLog {
    pub events: Arc<Mutex<Vec<String>>>,
    pub light_level: Arc<Mutex<f32>>,
    pub fail_capture: Arc<AtomicBool>,
}

impl HardwareLog {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn light_level(&self) -> f32 {
        *self.light_level.lock().unwrap()
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

pub struct FakeCamera {
    log: HardwareLog,
    started: bool,
}

#[async_trait]
impl ImageSource for FakeCamera {
    async fn start(&mut self) -> Result<(), HardwareError> {
        self.log.push("camera.start");
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), HardwareError> {
        self.log.push("camera.stop");
        self.started = false;
        Ok(())
    }

    async fn set_exposure(&mut self, microseconds: u32) -> Result<(), HardwareError> {
        self.log.push(format!("camera.exposure:{}", microseconds));
        Ok(())
    }

    async fn capture(&mut self) -> Result<Vec<u8>, HardwareError> {
        if !self.started {
            return Err(HardwareError::NotReady);
        }
        if self.log.fail_capture.load(Ordering::SeqCst) {
            self.log.push("camera.capture_failed");
            return Err(HardwareError::CommandFailed("sensor timeout".to_string()));
        }
        self.log.push("camera.capture");
        Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
    }

    fn is_started(&self) -> bool {
        self.started
    }
}

pub struct FakeLight {
    log: HardwareLog,
}

#[async_trait]
impl IndicatorLight for FakeLight {
    async fn set_brightness(&mut self, percent: f32) -> Result<(), HardwareError> {
        let percent = percent.clamp(0.0, 100.0);
        *self.log.light_level.lock().unwrap() = percent;
        self.log.push(format!("light:{}", percent));
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), HardwareError> {
        self.log.push("light.cleanup");
        Ok(())
    }

    fn brightness(&self) -> f32 {
        self.log.light_level()
    }
}

pub fn fake_rig() -> (printwatch::HardwareRig, HardwareLog) {
    let log = HardwareLog::default();
    let rig = printwatch::HardwareRig::new(
        Box::new(FakeCamera { log: log.clone(), started: false }),
        Box::new(FakeLight { log: log.clone() }),
    );
    (rig, log)
}
