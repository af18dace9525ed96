// printwatch_shared: shared traits and types for the acquisition host and the simulator

pub mod device;
pub mod gcode_utils;
pub mod hardware_traits;
pub mod persistence;
pub mod print_job;

pub use device::{DeviceError, PrinterDevice};
pub use gcode_utils::{derive_part_name, extract_slicing_parameters, SlicingParameterSet, SLICING_PARAMETERS};
pub use hardware_traits::{HardwareError, ImageSource, IndicatorLight};
pub use persistence::{CapturedFrame, PartDescriptor, PersistenceError, PersistenceGateway, SlicerSettings};
pub use print_job::{JobPhase, JobTracker, JobTransition, PrintJobContext, Resolution, StatusErrorPolicy};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Printer state as observed by polling. Recomputed on every poll, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterStatus {
    /// Not yet polled, or the last query failed.
    #[default]
    Unknown,
    /// Connectivity probe failed.
    Offline,
    /// Reachable, but reporting a state we do not classify.
    Online,
    Printing,
    Paused,
    Idle,
    Finished,
    Error,
}

impl PrinterStatus {
    /// Map a Moonraker `print_stats.state` string.
    pub fn from_print_stats(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "printing" => PrinterStatus::Printing,
            "paused" => PrinterStatus::Paused,
            "standby" | "cancelled" => PrinterStatus::Idle,
            "complete" => PrinterStatus::Finished,
            "error" => PrinterStatus::Error,
            _ => PrinterStatus::Online,
        }
    }

    pub fn is_printing(&self) -> bool {
        matches!(self, PrinterStatus::Printing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrinterStatus::Unknown => "unknown",
            PrinterStatus::Offline => "offline",
            PrinterStatus::Online => "online",
            PrinterStatus::Printing => "printing",
            PrinterStatus::Paused => "paused",
            PrinterStatus::Idle => "idle",
            PrinterStatus::Finished => "finished",
            PrinterStatus::Error => "error",
        }
    }
}

impl fmt::Display for PrinterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
