use printwatch_shared::gcode_utils::{derive_part_name, extract_slicing_parameters, SLICING_PARAMETERS};

const ORCA_FOOTER: &str = "\
G1 X10 Y10 E0.5
; CONFIG_BLOCK_START
; sparse_infill_density = 15%
; sparse_infill_pattern = grid
; sparse_infill_speed = 100
; first_layer_bed_temperature = 60
; nozzle_temperature_initial_layer = 225
; nozzle_temperature = 220
; travel_speed = 300
; retraction_length = 0.8
; first_layer_height = 0.25
; layer_height = 0.2
; line_width = 105%
; filament_flow_ratio = 0.98
; CONFIG_BLOCK_END
";

#[test]
fn test_extracts_all_twelve_parameters() {
    let params = extract_slicing_parameters(ORCA_FOOTER);
    assert_eq!(params.len(), SLICING_PARAMETERS.len());
    assert_eq!(params["sparse_infill_density"], "15%");
    assert_eq!(params["sparse_infill_pattern"], "grid");
    assert_eq!(params["nozzle_temperature_initial_layer"], "225");
    assert_eq!(params["nozzle_temperature"], "220");
    assert_eq!(params["first_layer_height"], "0.25");
    assert_eq!(params["layer_height"], "0.2");
    assert_eq!(params["line_width"], "105%");
}

#[test]
fn test_comma_truncates_value() {
    let params = extract_slicing_parameters("; sparse_infill_density = 15%,extra\n");
    assert_eq!(params.get("sparse_infill_density").map(String::as_str), Some("15%"));
}

#[test]
fn test_no_comment_lines_gives_empty_mapping() {
    let params = extract_slicing_parameters("G28\nG1 X0 Y0 Z0.2\nM104 S220\n");
    assert!(params.is_empty());
    assert!(extract_slicing_parameters("").is_empty());
}

#[test]
fn test_matching_is_case_insensitive_and_values_lowercased() {
    let params = extract_slicing_parameters(";   Sparse_Infill_Pattern = Gyroid\n");
    assert_eq!(params["sparse_infill_pattern"], "gyroid");
}

#[test]
fn test_last_occurrence_wins() {
    let text = "; travel_speed = 250\nG1 X1\n; travel_speed = 300\n";
    let params = extract_slicing_parameters(text);
    assert_eq!(params["travel_speed"], "300");
}

#[test]
fn test_non_comment_assignments_are_ignored() {
    let text = "travel_speed = 250\nG1 X1 ; travel_speed = 400\n";
    assert!(extract_slicing_parameters(text).is_empty());
}

#[test]
fn test_scan_stops_once_everything_is_found() {
    let text = format!("{ORCA_FOOTER}; travel_speed = 999\n");
    let params = extract_slicing_parameters(&text);
    assert_eq!(params["travel_speed"], "300");
}

#[test]
fn test_partial_set_returns_subset() {
    let params = extract_slicing_parameters("; layer_height = 0.12\n; unrelated = 1\n");
    assert_eq!(params.len(), 1);
    assert_eq!(params["layer_height"], "0.12");
}

#[test]
fn test_part_name_examples() {
    assert_eq!(derive_part_name("part_v1_0.2mm_PLA.gcode"), "part_v1");
    assert_eq!(derive_part_name("nounderscore.gcode"), "nounderscore.gcode");
    assert_eq!(
        derive_part_name("Kamerahalterung_Pizero v4_0.2mm_PLA_Generic Klipper Printer_22m13s.gcode"),
        "Kamerahalterung_Pizero v4"
    );
}
