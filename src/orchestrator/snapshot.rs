// src/orchestrator/snapshot.rs - State published by the status loop, plus run counters
use printwatch_shared::{JobTracker, PrinterStatus, Resolution};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Immutable view of the status loop's state after one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionSnapshot {
    pub status: PrinterStatus,
    pub job_id: Option<u64>,
    /// Layer from the latest poll, 0 when none was reported.
    pub layer: u32,
    pub slicer_settings: Resolution,
    pub part: Resolution,
}

impl AcquisitionSnapshot {
    pub fn from_tracker(status: PrinterStatus, tracker: &JobTracker) -> Self {
        match tracker.job() {
            Some(job) => Self {
                status,
                job_id: Some(job.job_id),
                layer: job.reported_layer,
                slicer_settings: job.slicer_settings,
                part: job.part,
            },
            None => Self { status, ..Self::default() },
        }
    }

    pub fn slicer_settings_id(&self) -> Option<i64> {
        self.slicer_settings.id()
    }

    pub fn part_id(&self) -> Option<i64> {
        self.part.id()
    }

    /// True once either metadata lookup has failed for this job.
    pub fn metadata_failed(&self) -> bool {
        self.slicer_settings == Resolution::Failed || self.part == Resolution::Failed
    }

    /// Frames are taken only while online, printing, past layer 0, and with
    /// both metadata ids resolved or still being resolved.
    pub fn capture_allowed(&self, online: bool) -> bool {
        online && self.status.is_printing() && self.layer > 0 && !self.metadata_failed()
    }
}

#[derive(Debug, Default)]
pub struct AcquisitionStats {
    probes: AtomicU64,
    online_transitions: AtomicU64,
    status_polls: AtomicU64,
    status_errors: AtomicU64,
    jobs_started: AtomicU64,
    settings_resolved: AtomicU64,
    parts_resolved: AtomicU64,
    metadata_failures: AtomicU64,
    frames_captured: AtomicU64,
    frames_uploaded: AtomicU64,
    capture_failures: AtomicU64,
    upload_failures: AtomicU64,
}

macro_rules! counter {
    ($($record:ident => $field:ident),* $(,)?) => {
        impl AcquisitionStats {
            $(
                pub fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    record_probe => probes,
    record_online_transition => online_transitions,
    record_status_poll => status_polls,
    record_status_error => status_errors,
    record_job_started => jobs_started,
    record_settings_resolved => settings_resolved,
    record_part_resolved => parts_resolved,
    record_metadata_failure => metadata_failures,
    record_frame_captured => frames_captured,
    record_frame_uploaded => frames_uploaded,
    record_capture_failure => capture_failures,
    record_upload_failure => upload_failures,
}

impl AcquisitionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> RunSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RunSummary {
            probes: load(&self.probes),
            online_transitions: load(&self.online_transitions),
            status_polls: load(&self.status_polls),
            status_errors: load(&self.status_errors),
            jobs_started: load(&self.jobs_started),
            settings_resolved: load(&self.settings_resolved),
            parts_resolved: load(&self.parts_resolved),
            metadata_failures: load(&self.metadata_failures),
            frames_captured: load(&self.frames_captured),
            frames_uploaded: load(&self.frames_uploaded),
            capture_failures: load(&self.capture_failures),
            upload_failures: load(&self.upload_failures),
        }
    }
}

/// Counter values at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub probes: u64,
    pub online_transitions: u64,
    pub status_polls: u64,
    pub status_errors: u64,
    pub jobs_started: u64,
    pub settings_resolved: u64,
    pub parts_resolved: u64,
    pub metadata_failures: u64,
    pub frames_captured: u64,
    pub frames_uploaded: u64,
    pub capture_failures: u64,
    pub upload_failures: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "jobs={} frames={}/{} (captured/uploaded) capture_failures={} upload_failures={} \
             settings={} parts={} metadata_failures={} polls={} status_errors={} probes={}",
            self.jobs_started,
            self.frames_captured,
            self.frames_uploaded,
            self.capture_failures,
            self.upload_failures,
            self.settings_resolved,
            self.parts_resolved,
            self.metadata_failures,
            self.status_polls,
            self.status_errors,
            self.probes,
        )
    }
}
