//! Fake Moonraker host for bench runs and integration tests.
//!
//! Serves the subset of the Moonraker HTTP API the acquisition host uses:
//! object queries for `webhooks` and `print_stats`, G-code file downloads and
//! G-code script submission. State is shared behind a [`SimulatedPrinter`]
//! handle so tests can flip the printer between states directly, while the
//! binary drives it with a [`PrintScript`].

use axum::{
    extract::{Path, Query, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Sliced-file footer served when no G-code file is given.
pub const SAMPLE_GCODE: &str = "\
; generated by printwatch-sim
G28
G1 Z0.25 F3000
G1 X20 Y20 E1.2 F1500
; EXECUTABLE_BLOCK_END
; CONFIG_BLOCK_START
; filament_flow_ratio = 0.98
; first_layer_bed_temperature = 60
; first_layer_height = 0.25
; layer_height = 0.2
; line_width = 105%
; nozzle_temperature = 220
; nozzle_temperature_initial_layer = 225
; retraction_length = 0.8
; sparse_infill_density = 15%
; sparse_infill_pattern = grid
; sparse_infill_speed = 100
; travel_speed = 300
; CONFIG_BLOCK_END
";

#[derive(Debug, Clone)]
struct SimState {
    online: bool,
    state: String,
    filename: String,
    current_layer: Option<u32>,
    total_layers: Option<u32>,
    files: HashMap<String, String>,
    commands: Vec<String>,
    status_queries: u64,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            online: true,
            state: "standby".to_string(),
            filename: String::new(),
            current_layer: None,
            total_layers: None,
            files: HashMap::new(),
            commands: Vec::new(),
            status_queries: 0,
        }
    }
}

/// Cloneable handle to the simulated printer state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPrinter {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the raw `print_stats.state` string (`standby`, `printing`, `complete`, ...).
    pub fn set_state(&self, state: &str) {
        self.lock().state = state.to_string();
    }

    pub fn set_layer(&self, layer: Option<u32>) {
        self.lock().current_layer = layer;
    }

    pub fn set_total_layers(&self, total: Option<u32>) {
        self.lock().total_layers = total;
    }

    /// Select the active file. An empty name means nothing is loaded.
    pub fn set_filename(&self, filename: &str) {
        self.lock().filename = filename.to_string();
    }

    pub fn add_file(&self, filename: &str, text: &str) {
        self.lock().files.insert(filename.to_string(), text.to_string());
    }

    /// While offline every endpoint answers 503.
    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// Scripts received through `/printer/gcode/script`, oldest first.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn status_queries(&self) -> u64 {
        self.lock().status_queries
    }

    /// Start a print of `filename` at layer 0.
    pub fn start_print(&self, filename: &str, text: &str, total_layers: u32) {
        let mut state = self.lock();
        state.files.insert(filename.to_string(), text.to_string());
        state.filename = filename.to_string();
        state.state = "printing".to_string();
        state.current_layer = Some(0);
        state.total_layers = Some(total_layers);
    }
}

pub fn router(printer: SimulatedPrinter) -> Router {
    Router::new()
        .route("/printer/objects/query", get(query_objects))
        .route("/server/files/gcodes/{*path}", get(download_file))
        .route("/printer/gcode/script", post(run_script))
        .with_state(printer)
}

/// Serve the fake API on an already-bound listener until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener, printer: SimulatedPrinter) -> std::io::Result<()> {
    axum::serve(listener, router(printer)).await
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": {"code": 503, "message": "Klippy host not connected"}})),
    )
        .into_response()
}

async fn query_objects(State(printer): State<SimulatedPrinter>, RawQuery(query): RawQuery) -> Response {
    let mut state = printer.lock();
    if !state.online {
        return unavailable();
    }
    let mut status = Map::new();
    let requested = query.unwrap_or_default();
    for object in requested.split('&').map(|p| p.split('=').next().unwrap_or_default()) {
        match object {
            "webhooks" => {
                status.insert(
                    "webhooks".to_string(),
                    json!({"state": "ready", "state_message": "Printer is ready"}),
                );
            }
            "print_stats" => {
                state.status_queries += 1;
                status.insert(
                    "print_stats".to_string(),
                    json!({
                        "filename": state.filename,
                        "state": state.state,
                        "info": {
                            "current_layer": state.current_layer,
                            "total_layer": state.total_layers,
                        },
                    }),
                );
            }
            _ => {}
        }
    }
    Json(json!({"result": {"eventtime": 0.0, "status": Value::Object(status)}})).into_response()
}

async fn download_file(State(printer): State<SimulatedPrinter>, Path(path): Path<String>) -> Response {
    let state = printer.lock();
    if !state.online {
        return unavailable();
    }
    match state.files.get(&path) {
        Some(text) => text.clone().into_response(),
        None => {
            tracing::debug!(%path, "Requested unknown G-code file");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": {"code": 404, "message": format!("File {} does not exist", path)}})),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScriptParams {
    #[serde(default)]
    script: String,
}

async fn run_script(State(printer): State<SimulatedPrinter>, Query(params): Query<ScriptParams>) -> Response {
    let mut state = printer.lock();
    if !state.online {
        return unavailable();
    }
    if params.script.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"code": 400, "message": "No script provided"}})),
        )
            .into_response();
    }
    tracing::info!(script = %params.script, "G-code script received");
    state.commands.push(params.script);
    Json(json!({"result": "ok"})).into_response()
}

/// Repeating print cycle: idle, a heat-up phase at layer 0, then one layer
/// per `layer_time`, then `complete` before idling again.
#[derive(Debug, Clone)]
pub struct PrintScript {
    pub filename: String,
    pub gcode: String,
    pub idle: Duration,
    pub layers: u32,
    pub layer_time: Duration,
}

impl PrintScript {
    pub async fn run(self, printer: SimulatedPrinter) {
        loop {
            printer.set_state("standby");
            printer.set_layer(None);
            tracing::info!(idle_secs = self.idle.as_secs_f32(), "Printer idle");
            tokio::time::sleep(self.idle).await;

            printer.start_print(&self.filename, &self.gcode, self.layers);
            tracing::info!(filename = %self.filename, layers = self.layers, "Print started");
            tokio::time::sleep(self.layer_time).await;
            for layer in 1..=self.layers {
                printer.set_layer(Some(layer));
                tracing::debug!(layer, "Layer change");
                tokio::time::sleep(self.layer_time).await;
            }

            printer.set_state("complete");
            tracing::info!(filename = %self.filename, "Print complete");
            tokio::time::sleep(self.idle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_print_stats_reflects_state() {
        let printer = SimulatedPrinter::new();
        printer.start_print("cube_0.2mm.gcode", SAMPLE_GCODE, 10);
        printer.set_layer(Some(3));
        let (status, body) = get_json(router(printer.clone()), "/printer/objects/query?print_stats").await;
        assert_eq!(status, StatusCode::OK);
        let stats = &body["result"]["status"]["print_stats"];
        assert_eq!(stats["state"], "printing");
        assert_eq!(stats["filename"], "cube_0.2mm.gcode");
        assert_eq!(stats["info"]["current_layer"], 3);
        assert!(body["result"]["status"].get("webhooks").is_none());
        assert_eq!(printer.status_queries(), 1);
    }

    #[tokio::test]
    async fn test_offline_answers_503() {
        let printer = SimulatedPrinter::new();
        printer.set_online(false);
        let (status, _) = get_json(router(printer), "/printer/objects/query?webhooks").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_download_nested_file() {
        let printer = SimulatedPrinter::new();
        printer.add_file("sub dir/part.gcode", "G28\n");
        let response = router(printer)
            .oneshot(
                Request::builder()
                    .uri("/server/files/gcodes/sub%20dir/part.gcode")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"G28\n");
    }

    #[tokio::test]
    async fn test_script_is_recorded() {
        let printer = SimulatedPrinter::new();
        let response = router(printer.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/printer/gcode/script?script=G28%20X")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(printer.commands(), vec!["G28 X".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_cycles_through_layers() {
        let printer = SimulatedPrinter::new();
        let script = PrintScript {
            filename: "cube_0.2mm.gcode".to_string(),
            gcode: SAMPLE_GCODE.to_string(),
            idle: Duration::from_secs(5),
            layers: 2,
            layer_time: Duration::from_secs(10),
        };
        let task = tokio::spawn(script.run(printer.clone()));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(printer.lock().state, "printing");
        assert_eq!(printer.lock().current_layer, Some(0));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(printer.lock().current_layer, Some(1));
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(printer.lock().state, "complete");
        task.abort();
    }
}
