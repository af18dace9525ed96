//! # Acquisition Orchestrator
//!
//! Runs the three acquisition loops against a printer, a persistence gateway
//! and the capture hardware:
//!
//! - **availability**: probes the printer and publishes `online`
//! - **status**: polls print state and layer, owns the job state machine and
//!   resolves per-job metadata in a side task, publishing an
//!   [`AcquisitionSnapshot`]
//! - **capture**: while the snapshot allows it, lights the part, captures a
//!   frame and stores it
//!
//! Each loop has a single writer for the state it publishes; readers only see
//! whole snapshots through `watch` channels. Shutdown is a broadcast every loop
//! selects on. After the loops are joined (or aborted once the shutdown timeout
//! passes) the camera is stopped, the light switched off and then released.

pub mod snapshot;
pub mod workers;

use printwatch_shared::{DeviceError, HardwareError, PersistenceError, PersistenceGateway, PrinterDevice};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;

use crate::config::AcquisitionConfig;
use crate::hardware::{HardwareRig, SharedRig};
pub use snapshot::{AcquisitionSnapshot, AcquisitionStats, RunSummary};
pub use workers::{AvailabilityWorker, CaptureOutcome, CaptureWorker, StatusPolicy, StatusWorker};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl MetadataError {
    pub fn is_transient(&self) -> bool {
        match self {
            MetadataError::Device(e) => e.is_transient(),
            MetadataError::Persistence(e) => e.is_transient(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0} loop panicked")]
    LoopPanicked(&'static str),
    #[error("Hardware release failed: {0}")]
    Release(#[from] HardwareError),
}

pub struct AcquisitionOrchestrator {
    device: Arc<dyn PrinterDevice>,
    gateway: Arc<dyn PersistenceGateway>,
    rig: SharedRig,
    config: AcquisitionConfig,
    exposure_us: Option<u32>,
    stats: Arc<AcquisitionStats>,
    online_tx: watch::Sender<bool>,
    snapshot_tx: watch::Sender<AcquisitionSnapshot>,
    shutdown_tx: broadcast::Sender<()>,
}

impl AcquisitionOrchestrator {
    pub fn new(
        device: Arc<dyn PrinterDevice>,
        gateway: Arc<dyn PersistenceGateway>,
        rig: HardwareRig,
        config: AcquisitionConfig,
    ) -> Self {
        let (online_tx, _) = watch::channel(false);
        let (snapshot_tx, _) = watch::channel(AcquisitionSnapshot::default());
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            device,
            gateway,
            rig: rig.into_shared(),
            config,
            exposure_us: None,
            stats: Arc::new(AcquisitionStats::new()),
            online_tx,
            snapshot_tx,
            shutdown_tx,
        }
    }

    /// Exposure applied to the camera when the run starts.
    pub fn with_exposure(mut self, exposure_us: Option<u32>) -> Self {
        self.exposure_us = exposure_us;
        self
    }

    pub fn stats(&self) -> Arc<AcquisitionStats> {
        self.stats.clone()
    }

    pub fn watch_online(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<AcquisitionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Run until `signal` resolves, then shut down and release the hardware.
    pub async fn run_until<S>(self, signal: S) -> Result<RunSummary, OrchestratorError>
    where
        S: Future<Output = ()>,
    {
        {
            let mut rig = self.rig.lock().await;
            if let Err(e) = rig.warm_up(self.exposure_us).await {
                tracing::error!("Camera warm-up failed, capture will retry: {}", e);
            }
        }

        let availability = AvailabilityWorker::new(self.device.clone(), self.online_tx.clone(), self.stats.clone());
        let status = StatusWorker::new(
            self.device.clone(),
            self.gateway.clone(),
            self.online_tx.subscribe(),
            self.snapshot_tx.clone(),
            StatusPolicy {
                on_error: self.config.status_error_policy,
                metadata_retry: self.config.metadata_retry,
                slicer_profile: self.config.slicer_profile.clone(),
                printer_name: self.config.printer_name.clone(),
                resolve_budget: self.config.status_interval(),
            },
            self.stats.clone(),
        );
        let capture = CaptureWorker::new(
            self.rig.clone(),
            self.gateway.clone(),
            self.online_tx.subscribe(),
            self.snapshot_tx.subscribe(),
            self.stats.clone(),
        );

        let mut tasks = JoinSet::new();
        let names = [
            (
                tasks.spawn(availability.run(self.config.availability_interval(), self.shutdown_tx.subscribe())).id(),
                "Availability",
            ),
            (tasks.spawn(status.run(self.config.status_interval(), self.shutdown_tx.subscribe())).id(), "Status"),
            (tasks.spawn(capture.run(self.config.capture_interval(), self.shutdown_tx.subscribe())).id(), "Capture"),
        ];
        let name_of = |id: tokio::task::Id| {
            names.iter().find(|(task, _)| *task == id).map_or("Unknown", |(_, name)| *name)
        };
        tracing::info!(
            availability_ms = self.config.availability_interval_ms,
            status_ms = self.config.status_interval_ms,
            capture_ms = self.config.capture_interval_ms,
            "Acquisition loops started"
        );

        let mut failure = None;
        tokio::select! {
            _ = signal => tracing::info!("Shutdown requested"),
            Some(joined) = tasks.join_next_with_id() => {
                let id = match &joined {
                    Ok((id, _)) => *id,
                    Err(e) => e.id(),
                };
                tracing::error!("{} loop exited unexpectedly, shutting down", name_of(id));
                failure = Some(OrchestratorError::LoopPanicked(name_of(id)));
            }
        }

        let _ = self.shutdown_tx.send(());
        let shutdown_timeout = self.config.shutdown_timeout();
        let drained = tokio::time::timeout(shutdown_timeout, async {
            while let Some(joined) = tasks.join_next_with_id().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!("{} loop panicked", name_of(e.id()));
                        failure.get_or_insert(OrchestratorError::LoopPanicked(name_of(e.id())));
                    }
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(timeout_ms = shutdown_timeout.as_millis() as u64, "Loops did not stop in time, aborting");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        let released = self.rig.lock().await.release().await;
        let summary = self.stats.summary();
        tracing::info!("Acquisition stopped: {}", summary);

        if let Some(e) = failure {
            return Err(e);
        }
        released?;
        Ok(summary)
    }
}
