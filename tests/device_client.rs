use printwatch::config::PrinterConfig;
use printwatch::MoonrakerClient;
use printwatch_shared::{DeviceError, PrinterDevice, PrinterStatus};
use printwatch_simulator::{SimulatedPrinter, SAMPLE_GCODE};
use tokio::net::TcpListener;

async fn spawn_simulator() -> (SimulatedPrinter, MoonrakerClient) {
    let printer = SimulatedPrinter::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(printwatch_simulator::serve(listener, printer.clone()));
    let config = PrinterConfig {
        url: format!("http://{}/", addr),
        probe_timeout_ms: 1000,
        request_timeout_ms: 2000,
        download_timeout_ms: 2000,
    };
    (printer, MoonrakerClient::new(&config).unwrap())
}

#[tokio::test]
async fn test_connectivity_follows_simulator() {
    let (printer, client) = spawn_simulator().await;
    assert!(client.check_connectivity().await);
    printer.set_online(false);
    assert!(!client.check_connectivity().await);
    printer.set_online(true);
    assert!(client.check_connectivity().await);
}

#[tokio::test]
async fn test_connectivity_false_when_nothing_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let config = PrinterConfig { url: format!("http://{}", addr), probe_timeout_ms: 500, ..PrinterConfig::default() };
    let client = MoonrakerClient::new(&config).unwrap();
    assert!(!client.check_connectivity().await);
    let err = client.query_print_state().await.unwrap_err();
    assert!(err.is_transient(), "{err:?}");
}

#[tokio::test]
async fn test_print_state_and_layer() {
    let (printer, client) = spawn_simulator().await;
    assert_eq!(client.query_print_state().await.unwrap(), PrinterStatus::Idle);
    assert_eq!(client.query_current_layer().await.unwrap(), None);

    printer.start_print("cube_0.2mm_PLA.gcode", SAMPLE_GCODE, 50);
    assert_eq!(client.query_print_state().await.unwrap(), PrinterStatus::Printing);
    assert_eq!(client.query_current_layer().await.unwrap(), Some(0));
    printer.set_layer(Some(12));
    assert_eq!(client.query_current_layer().await.unwrap(), Some(12));

    printer.set_state("complete");
    assert_eq!(client.query_print_state().await.unwrap(), PrinterStatus::Finished);
    printer.set_state("startup");
    assert_eq!(client.query_print_state().await.unwrap(), PrinterStatus::Online);
}

#[tokio::test]
async fn test_offline_status_query_is_http_error() {
    let (printer, client) = spawn_simulator().await;
    printer.set_online(false);
    match client.query_print_state().await {
        Err(DeviceError::Http { status, .. }) => assert_eq!(status, 503),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_active_gcode_fetch() {
    let (printer, client) = spawn_simulator().await;
    assert!(matches!(client.active_filename().await, Err(DeviceError::NotFound(_))));
    assert!(matches!(client.fetch_active_gcode_text().await, Err(DeviceError::NotFound(_))));

    printer.start_print("cube_0.2mm_PLA.gcode", SAMPLE_GCODE, 50);
    let (filename, text) = client.fetch_active_gcode_text().await.unwrap();
    assert_eq!(filename, "cube_0.2mm_PLA.gcode");
    assert_eq!(text, SAMPLE_GCODE);
}

#[tokio::test]
async fn test_download_encodes_nested_names() {
    let (printer, client) = spawn_simulator().await;
    printer.add_file("jobs/Kamerahalterung v4_0.2mm.gcode", "; layer_height = 0.2\n");
    let text = client.download_gcode("jobs/Kamerahalterung v4_0.2mm.gcode").await.unwrap();
    assert_eq!(text, "; layer_height = 0.2\n");

    let missing = client.download_gcode("nope.gcode").await.unwrap_err();
    assert_eq!(missing, DeviceError::NotFound("nope.gcode".to_string()));
}

#[tokio::test]
async fn test_send_command() {
    let (printer, client) = spawn_simulator().await;
    assert!(client.send_command("SET_PIN PIN=caselight VALUE=1").await);
    assert!(!client.send_command("   ").await);
    assert_eq!(printer.commands(), vec!["SET_PIN PIN=caselight VALUE=1".to_string()]);

    printer.set_online(false);
    assert!(!client.send_command("G28").await);
}
