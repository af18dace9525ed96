//! Tables written by the gateway. Created on connect when missing.

pub const CREATE_SLICER_SETTINGS: &str = r#"
CREATE TABLE IF NOT EXISTS slicer_settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slicer_profile TEXT NOT NULL,
    sparse_infill_density INTEGER,
    sparse_infill_pattern TEXT,
    sparse_infill_speed INTEGER,
    first_layer_bed_temperature INTEGER,
    bed_temperature_other_layers INTEGER,
    first_layer_nozzle_temperature INTEGER,
    nozzle_temperature_other_layers INTEGER,
    travel_speed INTEGER,
    first_layer_height REAL,
    layer_height_other_layers REAL,
    line_width REAL,
    retraction_length REAL,
    filament_flow_ratio REAL,
    printer_name TEXT NOT NULL
)
"#;

pub const CREATE_PARTS: &str = r#"
CREATE TABLE IF NOT EXISTS parts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    general_image BLOB NOT NULL
)
"#;

pub const CREATE_IMAGE_DATA: &str = r#"
CREATE TABLE IF NOT EXISTS image_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    image BLOB NOT NULL,
    timestamp TEXT NOT NULL,
    slicer_settings_id INTEGER REFERENCES slicer_settings(id),
    parts_id INTEGER REFERENCES parts(id),
    label INTEGER,
    layer INTEGER NOT NULL
)
"#;

pub const ALL: [&str; 3] = [CREATE_SLICER_SETTINGS, CREATE_PARTS, CREATE_IMAGE_DATA];

/// Settings columns in bind order, excluding `id`.
pub const SLICER_SETTINGS_COLUMNS: [&str; 15] = [
    "slicer_profile",
    "sparse_infill_density",
    "sparse_infill_pattern",
    "sparse_infill_speed",
    "first_layer_bed_temperature",
    "bed_temperature_other_layers",
    "first_layer_nozzle_temperature",
    "nozzle_temperature_other_layers",
    "travel_speed",
    "first_layer_height",
    "layer_height_other_layers",
    "line_width",
    "retraction_length",
    "filament_flow_ratio",
    "printer_name",
];

/// `SELECT id` matching every settings column, NULL-safe (`IS ?`).
pub fn select_slicer_settings_sql() -> String {
    let predicate = SLICER_SETTINGS_COLUMNS
        .iter()
        .map(|c| format!("{} IS ?", c))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("SELECT id FROM slicer_settings WHERE {} ORDER BY id LIMIT 1", predicate)
}

pub fn insert_slicer_settings_sql() -> String {
    let placeholders = vec!["?"; SLICER_SETTINGS_COLUMNS.len()].join(", ");
    format!(
        "INSERT INTO slicer_settings ({}) VALUES ({})",
        SLICER_SETTINGS_COLUMNS.join(", "),
        placeholders
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_sql_has_one_placeholder_per_column() {
        assert_eq!(select_slicer_settings_sql().matches('?').count(), 15);
        assert_eq!(insert_slicer_settings_sql().matches('?').count(), 15);
        assert!(select_slicer_settings_sql().contains("sparse_infill_pattern IS ?"));
    }
}
