//! Records handed to the persistence gateway and the gateway seam itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gcode_utils::SlicingParameterSet;

/// Placeholder stored for part url/image when nothing better is known.
pub const NOT_DOCUMENTED: &str = "not_documented";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Invalid parameter '{name}': {value:?}")]
    InvalidParameter { name: String, value: String },
}

impl PersistenceError {
    /// Database failures may clear on retry; malformed parameters never do.
    pub fn is_transient(&self) -> bool {
        matches!(self, PersistenceError::Database(_))
    }
}

/// Typed slicer-settings row. Parameters missing from the G-code stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicerSettings {
    pub slicer_profile: String,
    pub sparse_infill_density: Option<i64>,
    pub sparse_infill_pattern: Option<String>,
    pub sparse_infill_speed: Option<i64>,
    pub first_layer_bed_temperature: Option<i64>,
    pub bed_temperature_other_layers: Option<i64>,
    pub first_layer_nozzle_temperature: Option<i64>,
    pub nozzle_temperature_other_layers: Option<i64>,
    pub travel_speed: Option<i64>,
    pub first_layer_height: Option<f64>,
    pub layer_height_other_layers: Option<f64>,
    pub line_width: Option<f64>,
    pub retraction_length: Option<f64>,
    pub filament_flow_ratio: Option<f64>,
    pub printer_name: String,
}

impl SlicerSettings {
    /// Build a typed row from raw extracted parameters.
    ///
    /// Percent suffixes are stripped from density and line width. The bed
    /// temperature for later layers is taken from the first-layer value, since
    /// slicers only emit one.
    pub fn from_parameters(
        params: &SlicingParameterSet,
        slicer_profile: &str,
        printer_name: &str,
    ) -> Result<Self, PersistenceError> {
        let first_layer_bed_temperature = int_param(params, "first_layer_bed_temperature")?;
        Ok(Self {
            slicer_profile: slicer_profile.to_string(),
            sparse_infill_density: int_param(params, "sparse_infill_density")?,
            sparse_infill_pattern: params.get("sparse_infill_pattern").cloned(),
            sparse_infill_speed: int_param(params, "sparse_infill_speed")?,
            first_layer_bed_temperature,
            bed_temperature_other_layers: first_layer_bed_temperature,
            first_layer_nozzle_temperature: int_param(params, "nozzle_temperature_initial_layer")?,
            nozzle_temperature_other_layers: int_param(params, "nozzle_temperature")?,
            travel_speed: int_param(params, "travel_speed")?,
            first_layer_height: float_param(params, "first_layer_height")?,
            layer_height_other_layers: float_param(params, "layer_height")?,
            line_width: float_param(params, "line_width")?,
            retraction_length: float_param(params, "retraction_length")?,
            filament_flow_ratio: float_param(params, "filament_flow_ratio")?,
            printer_name: printer_name.to_string(),
        })
    }

    /// Number of slicer parameters that were present.
    pub fn known_parameter_count(&self) -> usize {
        [
            self.sparse_infill_density.is_some(),
            self.sparse_infill_pattern.is_some(),
            self.sparse_infill_speed.is_some(),
            self.first_layer_bed_temperature.is_some(),
            self.first_layer_nozzle_temperature.is_some(),
            self.nozzle_temperature_other_layers.is_some(),
            self.travel_speed.is_some(),
            self.first_layer_height.is_some(),
            self.layer_height_other_layers.is_some(),
            self.line_width.is_some(),
            self.retraction_length.is_some(),
            self.filament_flow_ratio.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

fn raw_number<'a>(params: &'a SlicingParameterSet, name: &str) -> Option<&'a str> {
    params.get(name).map(|v| v.trim().trim_end_matches('%').trim())
}

fn invalid(name: &str, value: &str) -> PersistenceError {
    PersistenceError::InvalidParameter { name: name.to_string(), value: value.to_string() }
}

fn int_param(params: &SlicingParameterSet, name: &str) -> Result<Option<i64>, PersistenceError> {
    let Some(raw) = raw_number(params, name) else {
        return Ok(None);
    };
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(Some(value));
    }
    // "220.0" style integers
    match raw.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && value.is_finite() => Ok(Some(value as i64)),
        _ => Err(invalid(name, raw)),
    }
}

fn float_param(params: &SlicingParameterSet, name: &str) -> Result<Option<f64>, PersistenceError> {
    match raw_number(params, name) {
        None => Ok(None),
        Some(raw) => raw.parse::<f64>().map(Some).map_err(|_| invalid(name, raw)),
    }
}

/// Part row descriptor. `url`/`image` fall back to the `not_documented` convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescriptor {
    pub name: String,
    pub url: Option<String>,
    pub image: Option<Vec<u8>>,
}

impl PartDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), url: None, image: None }
    }

    pub fn url_or_default(&self) -> &str {
        self.url.as_deref().unwrap_or(NOT_DOCUMENTED)
    }

    pub fn image_or_default(&self) -> &[u8] {
        self.image.as_deref().unwrap_or(NOT_DOCUMENTED.as_bytes())
    }
}

/// One captured image plus the job context at capture time.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub image: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub slicer_settings_id: Option<i64>,
    pub part_id: Option<i64>,
    /// Always `None` when captured; labelling happens downstream.
    pub label: Option<i64>,
    pub layer: u32,
}

/// Relational store for frames and job metadata.
///
/// Implementations must tolerate overlapping calls from the same process.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn insert_image(&self, frame: &CapturedFrame) -> Result<i64, PersistenceError>;

    /// Return the id of an identical settings row, inserting one if none exists.
    async fn find_or_create_slicer_settings(&self, settings: &SlicerSettings) -> Result<i64, PersistenceError>;

    /// Return the id of the part matching name, url and image, inserting one if none exists.
    async fn find_or_create_part(&self, part: &PartDescriptor) -> Result<i64, PersistenceError>;
}
