// printwatch-sim: stand-alone fake Moonraker host
use clap::Parser;
use printwatch_simulator::{router, PrintScript, SimulatedPrinter, SAMPLE_GCODE};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "printwatch-sim", about = "Fake Moonraker printer host with a scripted print job")]
struct Args {
    /// Address to serve the API on
    #[arg(long, default_value = "127.0.0.1:7125")]
    bind: String,
    /// G-code file served as the active print (built-in sample when omitted)
    #[arg(long)]
    gcode: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    idle_secs: u64,
    #[arg(long, default_value_t = 20)]
    layers: u32,
    #[arg(long, default_value_t = 5)]
    layer_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let (filename, gcode) = match &args.gcode {
        Some(path) => {
            let text = tokio::fs::read_to_string(path).await.map_err(|e| {
                tracing::error!("Failed to read G-code file '{}': {}", path.display(), e);
                e
            })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "sim_print_0.2mm_PLA.gcode".to_string());
            (name, text)
        }
        None => ("sim_cube_0.2mm_PLA.gcode".to_string(), SAMPLE_GCODE.to_string()),
    };

    let printer = SimulatedPrinter::new();
    let script = PrintScript {
        filename,
        gcode,
        idle: Duration::from_secs(args.idle_secs),
        layers: args.layers,
        layer_time: Duration::from_secs(args.layer_secs),
    };
    let script_task = tokio::spawn(script.run(printer.clone()));

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    tracing::info!("Simulated Moonraker listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(printer))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down simulator");
        })
        .await?;

    script_task.abort();
    Ok(())
}
