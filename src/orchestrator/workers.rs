// src/orchestrator/workers.rs - The three acquisition loops
//
// Each worker exposes `tick()` for one iteration and `run()` for the
// interval-driven loop around it.
use chrono::Utc;
use printwatch_shared::{
    derive_part_name, extract_slicing_parameters, CapturedFrame, JobTracker, JobTransition, PartDescriptor,
    PersistenceGateway, PrinterDevice, PrinterStatus, Resolution, SlicerSettings, StatusErrorPolicy,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::snapshot::{AcquisitionSnapshot, AcquisitionStats};
use super::MetadataError;
use crate::config::MetadataRetryPolicy;
use crate::hardware::{HardwareRig, SharedRig};

pub struct AvailabilityWorker {
    device: Arc<dyn PrinterDevice>,
    online_tx: watch::Sender<bool>,
    stats: Arc<AcquisitionStats>,
}

impl AvailabilityWorker {
    pub fn new(device: Arc<dyn PrinterDevice>, online_tx: watch::Sender<bool>, stats: Arc<AcquisitionStats>) -> Self {
        Self { device, online_tx, stats }
    }

    /// Probe once and publish the result. Returns the new `online` value.
    pub async fn tick(&self) -> bool {
        let online = self.device.check_connectivity().await;
        self.stats.record_probe();
        let changed = self.online_tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            self.stats.record_online_transition();
            if online {
                tracing::info!("Printer is online");
            } else {
                tracing::warn!("Printer went offline");
            }
        }
        online
    }

    pub async fn run(self, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Availability loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

/// Per-job settings handed to the status worker.
#[derive(Debug, Clone)]
pub struct StatusPolicy {
    pub on_error: StatusErrorPolicy,
    pub metadata_retry: MetadataRetryPolicy,
    pub slicer_profile: String,
    pub printer_name: String,
    /// Longest a status tick waits on a metadata lookup before moving on.
    pub resolve_budget: Duration,
}

type Lookup = Option<Result<(String, i64), MetadataError>>;

/// Everything a metadata lookup needs, detached from the worker so it can run
/// in its own task.
struct MetadataLookup {
    device: Arc<dyn PrinterDevice>,
    gateway: Arc<dyn PersistenceGateway>,
    slicer_profile: String,
    printer_name: String,
}

impl MetadataLookup {
    async fn slicer_settings(&self) -> Result<(String, i64), MetadataError> {
        let (filename, text) = self.device.fetch_active_gcode_text().await?;
        let params = extract_slicing_parameters(&text);
        if params.is_empty() {
            tracing::warn!(%filename, "No slicing parameters found in G-code");
        }
        let settings = SlicerSettings::from_parameters(&params, &self.slicer_profile, &self.printer_name)?;
        let id = self.gateway.find_or_create_slicer_settings(&settings).await?;
        Ok((filename, id))
    }

    async fn part(&self) -> Result<(String, i64), MetadataError> {
        let filename = self.device.active_filename().await?;
        let part = PartDescriptor::named(derive_part_name(&filename));
        let id = self.gateway.find_or_create_part(&part).await?;
        Ok((filename, id))
    }
}

/// Lookups in flight for one job. Settings and part run concurrently and are
/// gated independently.
struct MetadataTask {
    job_id: u64,
    handle: JoinHandle<(Lookup, Lookup)>,
}

/// Sole owner of the [`JobTracker`]. Publishes a snapshot after every tick.
pub struct StatusWorker {
    device: Arc<dyn PrinterDevice>,
    gateway: Arc<dyn PersistenceGateway>,
    online_rx: watch::Receiver<bool>,
    snapshot_tx: watch::Sender<AcquisitionSnapshot>,
    tracker: JobTracker,
    policy: StatusPolicy,
    metadata_task: Option<MetadataTask>,
    stats: Arc<AcquisitionStats>,
}

impl StatusWorker {
    pub fn new(
        device: Arc<dyn PrinterDevice>,
        gateway: Arc<dyn PersistenceGateway>,
        online_rx: watch::Receiver<bool>,
        snapshot_tx: watch::Sender<AcquisitionSnapshot>,
        policy: StatusPolicy,
        stats: Arc<AcquisitionStats>,
    ) -> Self {
        Self {
            device,
            gateway,
            online_rx,
            snapshot_tx,
            tracker: JobTracker::new(),
            policy,
            metadata_task: None,
            stats,
        }
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub async fn tick(&mut self) -> AcquisitionSnapshot {
        let online = *self.online_rx.borrow();
        let status = if !online {
            self.tracker.observe_failure(self.policy.on_error);
            PrinterStatus::Offline
        } else {
            self.stats.record_status_poll();
            match self.device.query_print_state().await {
                Ok(status) => {
                    if let JobTransition::Started(_) = self.tracker.observe(status) {
                        self.stats.record_job_started();
                    }
                    if status.is_printing() {
                        self.refresh_layer().await;
                        self.resolve_metadata().await;
                    }
                    status
                }
                Err(e) => {
                    self.stats.record_status_error();
                    tracing::warn!("Status query failed: {}", e);
                    self.tracker.observe_failure(self.policy.on_error);
                    PrinterStatus::Unknown
                }
            }
        };
        self.drop_stale_lookups();

        let snapshot = AcquisitionSnapshot::from_tracker(status, &self.tracker);
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot.clone();
                true
            }
        });
        snapshot
    }

    async fn refresh_layer(&mut self) {
        match self.device.query_current_layer().await {
            Ok(layer) => {
                if self.tracker.update_layer(layer) {
                    tracing::debug!(?layer, "Layer advanced");
                }
            }
            Err(e) => tracing::warn!("Layer query failed: {}", e),
        }
    }

    /// Start lookups for whatever metadata is still pending, then wait on
    /// them for at most `resolve_budget`. Unfinished lookups are picked up
    /// again on a later tick.
    async fn resolve_metadata(&mut self) {
        let Some(job_id) = self.tracker.job().map(|job| job.job_id) else {
            return;
        };
        if self.metadata_task.is_none() {
            let want_settings = self.tracker.slicer_settings_pending();
            let want_part = self.tracker.part_pending();
            if !want_settings && !want_part {
                return;
            }
            self.metadata_task = Some(self.spawn_lookups(job_id, want_settings, want_part));
        }
        let Some(task) = self.metadata_task.as_mut() else {
            return;
        };
        let joined = match tokio::time::timeout(self.policy.resolve_budget, &mut task.handle).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::debug!(job_id, "Metadata lookup still running");
                return;
            }
        };
        let job_id = task.job_id;
        self.metadata_task = None;

        let (settings, part) = match joined {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Metadata lookup task failed: {}", e);
                self.stats.record_metadata_failure();
                if self.tracker.slicer_settings_pending() {
                    self.tracker.resolve_slicer_settings(job_id, Resolution::Failed);
                }
                if self.tracker.part_pending() {
                    self.tracker.resolve_part(job_id, Resolution::Failed);
                }
                return;
            }
        };

        if let Some(result) = settings {
            let resolution = self.settle("slicer settings", result.map(|(_, id)| id));
            if let Resolution::Resolved(id) = resolution {
                self.stats.record_settings_resolved();
                tracing::info!(job_id, slicer_settings_id = id, "Slicer settings resolved");
            }
            self.tracker.resolve_slicer_settings(job_id, resolution);
        }
        if let Some(result) = part {
            if let Ok((filename, _)) = &result {
                self.tracker.set_filename(filename);
            }
            let resolution = self.settle("part", result.map(|(_, id)| id));
            if let Resolution::Resolved(id) = resolution {
                self.stats.record_part_resolved();
                tracing::info!(job_id, part_id = id, "Part resolved");
            }
            self.tracker.resolve_part(job_id, resolution);
        }
    }

    fn spawn_lookups(&self, job_id: u64, want_settings: bool, want_part: bool) -> MetadataTask {
        let lookup = MetadataLookup {
            device: self.device.clone(),
            gateway: self.gateway.clone(),
            slicer_profile: self.policy.slicer_profile.clone(),
            printer_name: self.policy.printer_name.clone(),
        };
        let handle = tokio::spawn(async move {
            tokio::join!(
                async {
                    if want_settings { Some(lookup.slicer_settings().await) } else { None }
                },
                async {
                    if want_part { Some(lookup.part().await) } else { None }
                },
            )
        });
        MetadataTask { job_id, handle }
    }

    /// Abort lookups that belong to a job which is no longer live.
    fn drop_stale_lookups(&mut self) {
        let live = self.tracker.job().map(|job| job.job_id);
        if let Some(task) = self.metadata_task.take_if(|task| Some(task.job_id) != live) {
            tracing::debug!(job_id = task.job_id, "Job ended, abandoning metadata lookup");
            task.handle.abort();
        }
    }

    fn settle(&self, what: &str, result: Result<i64, MetadataError>) -> Resolution {
        match result {
            Ok(id) => Resolution::Resolved(id),
            Err(e) => {
                self.stats.record_metadata_failure();
                let retry = self.policy.metadata_retry == MetadataRetryPolicy::OnTransient && e.is_transient();
                if retry {
                    tracing::warn!("Resolving {} failed, retrying next poll: {}", what, e);
                    Resolution::Pending
                } else {
                    tracing::error!("Resolving {} failed for this job: {}", what, e);
                    Resolution::Failed
                }
            }
        }
    }

    pub async fn run(mut self, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Status loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

impl Drop for StatusWorker {
    fn drop(&mut self) {
        if let Some(task) = self.metadata_task.take() {
            task.handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Gate closed; nothing captured.
    Idle,
    Uploaded(i64),
    Failed,
}

pub struct CaptureWorker {
    rig: SharedRig,
    gateway: Arc<dyn PersistenceGateway>,
    online_rx: watch::Receiver<bool>,
    snapshot_rx: watch::Receiver<AcquisitionSnapshot>,
    light_on: bool,
    stats: Arc<AcquisitionStats>,
}

impl CaptureWorker {
    pub fn new(
        rig: SharedRig,
        gateway: Arc<dyn PersistenceGateway>,
        online_rx: watch::Receiver<bool>,
        snapshot_rx: watch::Receiver<AcquisitionSnapshot>,
        stats: Arc<AcquisitionStats>,
    ) -> Self {
        Self { rig, gateway, online_rx, snapshot_rx, light_on: false, stats }
    }

    pub fn light_on(&self) -> bool {
        self.light_on
    }

    async fn force_light_off(&mut self, rig: &mut HardwareRig) {
        if let Err(e) = rig.light.off().await {
            tracing::error!("Failed to switch light off: {}", e);
        }
        self.light_on = false;
    }

    pub async fn tick(&mut self) -> CaptureOutcome {
        let online = *self.online_rx.borrow();
        let snapshot = self.snapshot_rx.borrow().clone();
        let rig_handle = self.rig.clone();
        let mut rig = rig_handle.lock().await;

        if !snapshot.capture_allowed(online) {
            if self.light_on {
                tracing::debug!("Capture gate closed, light off");
                self.force_light_off(&mut rig).await;
            }
            return CaptureOutcome::Idle;
        }

        if !self.light_on {
            if let Err(e) = rig.light.on().await {
                tracing::error!("Failed to switch light on: {}", e);
                self.stats.record_capture_failure();
                self.force_light_off(&mut rig).await;
                return CaptureOutcome::Failed;
            }
            self.light_on = true;
        }

        if !rig.camera.is_started() {
            tracing::info!("Camera not started, starting it");
            if let Err(e) = rig.camera.start().await {
                tracing::error!("Failed to start camera: {}", e);
                self.stats.record_capture_failure();
                self.force_light_off(&mut rig).await;
                return CaptureOutcome::Failed;
            }
        }

        let image = match rig.camera.capture().await {
            Ok(image) => image,
            Err(e) => {
                tracing::error!("Capture failed: {}", e);
                self.stats.record_capture_failure();
                self.force_light_off(&mut rig).await;
                return CaptureOutcome::Failed;
            }
        };
        self.stats.record_frame_captured();
        drop(rig);

        let frame = CapturedFrame {
            image,
            timestamp: Utc::now(),
            slicer_settings_id: snapshot.slicer_settings_id(),
            part_id: snapshot.part_id(),
            label: None,
            layer: snapshot.layer,
        };
        match self.gateway.insert_image(&frame).await {
            Ok(id) => {
                self.stats.record_frame_uploaded();
                tracing::debug!(id, layer = frame.layer, bytes = frame.image.len(), "Frame uploaded");
                CaptureOutcome::Uploaded(id)
            }
            Err(e) => {
                tracing::error!("Frame upload failed: {}", e);
                self.stats.record_upload_failure();
                let mut rig = rig_handle.lock().await;
                self.force_light_off(&mut rig).await;
                CaptureOutcome::Failed
            }
        }
    }

    pub async fn run(mut self, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Capture loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
