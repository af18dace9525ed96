// Benchmark for slicing-parameter extraction over realistic G-code files
// Run with: cargo bench

use criterion::{criterion_group, criterion_main, Criterion};
use printwatch_shared::{extract_slicing_parameters, SlicerSettings, SLICING_PARAMETERS};
use std::hint::black_box;

const FOOTER: &str = "\
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

fn sliced_file(moves: usize) -> String {
    let mut gcode = String::new();
    for i in 0..moves {
        if i % 500 == 0 {
            gcode.push_str(&format!(";LAYER_CHANGE\n;Z:{:.2}\n", i as f64 * 0.0004));
        }
        gcode.push_str(&format!("G1 X{} Y{} E{:.5} F1500\n", i % 220, (i * 7) % 220, i as f64 * 0.001));
    }
    gcode.push_str(FOOTER);
    gcode
}

fn bench_extract_parameters(c: &mut Criterion) {
    let gcode = sliced_file(100_000);
    c.bench_function("extract parameters from 100k-move file", |b| {
        b.iter(|| {
            let params = extract_slicing_parameters(black_box(&gcode));
            assert_eq!(params.len(), SLICING_PARAMETERS.len());
        });
    });
}

fn bench_typed_settings(c: &mut Criterion) {
    let params = extract_slicing_parameters(FOOTER);
    c.bench_function("build typed slicer settings", |b| {
        b.iter(|| SlicerSettings::from_parameters(black_box(&params), "default", "SovolSv06").unwrap());
    });
}

criterion_group!(benches, bench_extract_parameters, bench_typed_settings);
criterion_main!(benches);
