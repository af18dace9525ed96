//! Per-job state machine driven by polled printer status.
//!
//! A job is one continuous `Printing` interval as seen by polling. The tracker
//! owns at most one live [`PrintJobContext`] and records, per job, whether the
//! slicer settings and the part have been resolved to database ids. Each is
//! attempted at most once per job unless the caller leaves it `Pending`.
//!
//! ```text
//! NoJob --Printing--> MetadataPending --both settled--> MetadataResolved
//!   ^                       |                                 |
//!   +-----not Printing------+---------------------------------+
//! ```

use serde::{Deserialize, Serialize};

use crate::PrinterStatus;

/// What a failed status query means for the live job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusErrorPolicy {
    /// Treat the failure as a blip; keep the job and its resolved ids.
    #[default]
    PreserveJob,
    /// Treat the failure as the end of the job.
    EndJob,
}

/// Outcome of resolving one piece of job metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    Pending,
    Resolved(i64),
    /// Attempted and failed; not retried within this job.
    Failed,
}

impl Resolution {
    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending)
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Resolution::Resolved(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    NoJob,
    MetadataPending,
    MetadataResolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTransition {
    Unchanged,
    Started(u64),
    Ended(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJobContext {
    pub job_id: u64,
    /// Highest layer reported during the job.
    pub current_layer: u32,
    /// Layer from the latest poll; a missing value is stored as 0.
    pub reported_layer: u32,
    pub slicer_settings: Resolution,
    pub part: Resolution,
    pub filename: Option<String>,
}

impl PrintJobContext {
    fn new(job_id: u64) -> Self {
        Self {
            job_id,
            current_layer: 0,
            reported_layer: 0,
            slicer_settings: Resolution::Pending,
            part: Resolution::Pending,
            filename: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct JobTracker {
    live: Option<PrintJobContext>,
    jobs_started: u64,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a successfully polled status.
    pub fn observe(&mut self, status: PrinterStatus) -> JobTransition {
        if status.is_printing() {
            if self.live.is_some() {
                return JobTransition::Unchanged;
            }
            self.jobs_started += 1;
            let job_id = self.jobs_started;
            self.live = Some(PrintJobContext::new(job_id));
            tracing::info!(job_id, "Print job started");
            JobTransition::Started(job_id)
        } else {
            self.end_job(status)
        }
    }

    /// Feed a failed status query (or an offline printer).
    pub fn observe_failure(&mut self, policy: StatusErrorPolicy) -> JobTransition {
        match policy {
            StatusErrorPolicy::PreserveJob => JobTransition::Unchanged,
            StatusErrorPolicy::EndJob => self.end_job(PrinterStatus::Unknown),
        }
    }

    fn end_job(&mut self, status: PrinterStatus) -> JobTransition {
        match self.live.take() {
            Some(job) => {
                tracing::info!(job_id = job.job_id, %status, last_layer = job.current_layer, "Print job ended");
                JobTransition::Ended(job.job_id)
            }
            None => JobTransition::Unchanged,
        }
    }

    /// Record the layer from the latest poll, `None` as 0. The high-water
    /// mark only moves forward; the reported layer always follows the poll.
    /// Returns true when the high-water mark advanced.
    pub fn update_layer(&mut self, layer: Option<u32>) -> bool {
        let Some(job) = self.live.as_mut() else {
            return false;
        };
        let layer = layer.unwrap_or(0);
        job.reported_layer = layer;
        if layer > job.current_layer {
            job.current_layer = layer;
            true
        } else {
            if layer < job.current_layer {
                tracing::debug!(job_id = job.job_id, reported = layer, highest = job.current_layer, "Layer below high-water mark");
            }
            false
        }
    }

    pub fn set_filename(&mut self, filename: &str) {
        if let Some(job) = self.live.as_mut() {
            job.filename = Some(filename.to_string());
        }
    }

    pub fn resolve_slicer_settings(&mut self, job_id: u64, resolution: Resolution) -> bool {
        match self.live.as_mut() {
            Some(job) if job.job_id == job_id => {
                job.slicer_settings = resolution;
                true
            }
            _ => false,
        }
    }

    pub fn resolve_part(&mut self, job_id: u64, resolution: Resolution) -> bool {
        match self.live.as_mut() {
            Some(job) if job.job_id == job_id => {
                job.part = resolution;
                true
            }
            _ => false,
        }
    }

    pub fn job(&self) -> Option<&PrintJobContext> {
        self.live.as_ref()
    }

    pub fn slicer_settings_pending(&self) -> bool {
        self.live.as_ref().is_some_and(|job| job.slicer_settings.is_pending())
    }

    pub fn part_pending(&self) -> bool {
        self.live.as_ref().is_some_and(|job| job.part.is_pending())
    }

    pub fn phase(&self) -> JobPhase {
        match &self.live {
            None => JobPhase::NoJob,
            Some(job) if job.slicer_settings.is_pending() || job.part.is_pending() => JobPhase::MetadataPending,
            Some(_) => JobPhase::MetadataResolved,
        }
    }

    pub fn jobs_started(&self) -> u64 {
        self.jobs_started
    }
}
