//! Shared G-code utilities: slicer parameter extraction and part-name derivation.
//!
//! Slicers (OrcaSlicer, PrusaSlicer, ...) append their configuration to the
//! end of the file as comment lines:
//!
//! ```text
//! ; sparse_infill_density = 15%
//! ; nozzle_temperature = 220,220
//! ```
//!
//! Only a fixed set of parameters is of interest. Values are returned as raw
//! strings; unit stripping and numeric parsing belong to the caller.

use std::collections::HashMap;

/// Parameter names extracted from slicer comment lines.
pub const SLICING_PARAMETERS: [&str; 12] = [
    "sparse_infill_density",
    "sparse_infill_pattern",
    "sparse_infill_speed",
    "first_layer_bed_temperature",
    "nozzle_temperature_initial_layer",
    "nozzle_temperature",
    "travel_speed",
    "retraction_length",
    "first_layer_height",
    "layer_height",
    "line_width",
    "filament_flow_ratio",
];

/// Delimiter that marks the start of slicer-generated filename suffixes.
pub const PART_NAME_DELIMITER: &str = "_0";

pub type SlicingParameterSet = HashMap<String, String>;

/// Scan G-code text for the known slicing parameters.
///
/// Never fails: parameters that do not appear are absent from the result.
/// A repeated parameter keeps its last value. The scan stops as soon as all
/// parameters have been seen once.
pub fn extract_slicing_parameters(content: &str) -> SlicingParameterSet {
    let mut params = SlicingParameterSet::new();

    for raw in content.lines() {
        let line = raw.trim();
        let Some(comment) = line.strip_prefix(';') else {
            continue;
        };
        let comment = comment.trim_start_matches(';').trim_start().to_lowercase();

        for name in SLICING_PARAMETERS {
            if let Some(value) = match_parameter(&comment, name) {
                params.insert(name.to_string(), value);
                break;
            }
        }

        if params.len() == SLICING_PARAMETERS.len() {
            break;
        }
    }

    params
}

// `name` must be followed by optional spaces and '='; this keeps
// `nozzle_temperature` from matching `nozzle_temperature_initial_layer`.
fn match_parameter(comment: &str, name: &str) -> Option<String> {
    let rest = comment.strip_prefix(name)?;
    let value = rest.trim_start().strip_prefix('=')?;
    let value = value.split(',').next().unwrap_or_default().trim();
    Some(value.to_string())
}

/// Derive a part name from a slicer output filename.
///
/// `"part_v1_0.2mm_PLA.gcode"` becomes `"part_v1"`. Any directory prefix
/// (`"jobs/part_v1_0.2mm.gcode"`) is dropped first. Names without the
/// delimiter (or where it is the very first thing) are returned as-is.
pub fn derive_part_name(filename: &str) -> String {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    match base.split_once(PART_NAME_DELIMITER) {
        Some((name, _)) if !name.is_empty() => name.to_string(),
        _ => {
            tracing::warn!(filename, "No part-name delimiter in filename, using the file name");
            base.to_string()
        }
    }
}
