use printwatch::config::{AcquisitionConfig, CameraConfig, DatabaseConfig, LightConfig, PrinterConfig};
use printwatch::{AcquisitionOrchestrator, HardwareRig, MoonrakerClient, SqliteGateway};
use printwatch_simulator::{SimulatedPrinter, SAMPLE_GCODE};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::test]
async fn test_simulated_print_is_recorded() {
    let printer = SimulatedPrinter::new();
    printer.start_print("Kamerahalterung_Pizero v4_0.2mm_PLA.gcode", SAMPLE_GCODE, 10);
    printer.set_layer(Some(2));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(printwatch_simulator::serve(listener, printer.clone()));

    let device = MoonrakerClient::new(&PrinterConfig { url: format!("http://{}", addr), ..PrinterConfig::default() })
        .unwrap();
    let gateway = Arc::new(
        SqliteGateway::connect(&DatabaseConfig { url: "sqlite::memory:".to_string(), ..DatabaseConfig::default() })
            .await
            .unwrap(),
    );
    let rig = HardwareRig::from_config(&CameraConfig::default(), &LightConfig::default(), true);
    let acquisition = AcquisitionConfig {
        availability_interval_ms: 20,
        status_interval_ms: 20,
        capture_interval_ms: 50,
        ..AcquisitionConfig::default()
    };

    let orchestrator = AcquisitionOrchestrator::new(Arc::new(device), gateway.clone(), rig, acquisition);
    let summary = orchestrator.run_until(tokio::time::sleep(Duration::from_millis(800))).await.unwrap();

    assert_eq!(summary.jobs_started, 1);
    assert_eq!(summary.settings_resolved, 1);
    assert_eq!(summary.parts_resolved, 1);
    assert!(summary.frames_uploaded > 0, "{summary:?}");

    let (density, pattern, line_width, bed_other): (Option<i64>, Option<String>, Option<f64>, Option<i64>) =
        sqlx::query_as(
            "SELECT sparse_infill_density, sparse_infill_pattern, line_width, bed_temperature_other_layers FROM slicer_settings",
        )
        .fetch_one(gateway.pool())
        .await
        .unwrap();
    assert_eq!(density, Some(15));
    assert_eq!(pattern.as_deref(), Some("grid"));
    assert_eq!(line_width, Some(105.0));
    assert_eq!(bed_other, Some(60));

    let part: String = sqlx::query_scalar("SELECT name FROM parts").fetch_one(gateway.pool()).await.unwrap();
    assert_eq!(part, "Kamerahalterung_Pizero v4");

    let (frames, linked): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(slicer_settings_id) FROM image_data WHERE layer = 2 AND label IS NULL",
    )
    .fetch_one(gateway.pool())
    .await
    .unwrap();
    assert_eq!(frames as u64, summary.frames_uploaded);
    assert!(linked >= 1);
}
