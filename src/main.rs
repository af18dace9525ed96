// src/main.rs - printwatch acquisition host
use clap::Parser;
use printwatch::{load_config_or_default, AcquisitionOrchestrator, HardwareRig, MoonrakerClient, SqliteGateway};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "printwatch", version, about = "Capture print images and slicer metadata from a Moonraker printer")]
struct Args {
    /// Configuration file; defaults are used when it does not exist
    #[arg(long, default_value = "printwatch.toml")]
    config: PathBuf,
    /// Moonraker base URL, overrides `printer.url`
    #[arg(long, env = "PRINTER_URL")]
    printer_url: Option<String>,
    /// Database URL, overrides `database.url`
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Use the simulated camera and light
    #[arg(long)]
    simulate_hardware: bool,
    /// Capture one frame with the light at 100 % into this file and exit
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::info!("Starting printwatch {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", args.config.display());

    let mut config = load_config_or_default(&args.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", args.config.display(), e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    if let Some(url) = args.printer_url {
        config.printer.url = url;
    }
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    config.validate()?;

    if args.simulate_hardware {
        tracing::info!("Using simulated camera and light");
    }

    if let Some(path) = args.snapshot {
        let mut rig = HardwareRig::from_config(&config.camera, &config.light, args.simulate_hardware);
        let image = rig.capture_still(config.camera.exposure_us).await.map_err(|e| {
            tracing::error!("Calibration capture failed: {}", e);
            Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
        })?;
        tokio::fs::write(&path, &image).await?;
        tracing::info!("Wrote {} bytes to {}", image.len(), path.display());
        return Ok(());
    }

    tracing::info!("Printer: {} ({})", config.acquisition.printer_name, config.printer.url);
    tracing::info!("Database: {}", config.database.url);

    let device = MoonrakerClient::new(&config.printer).map_err(|e| {
        tracing::error!("Failed to create printer client: {}", e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    let gateway = SqliteGateway::connect(&config.database).await.map_err(|e| {
        tracing::error!("Failed to open database: {}", e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;
    let gateway = Arc::new(gateway);

    let rig = HardwareRig::from_config(&config.camera, &config.light, args.simulate_hardware);

    let orchestrator = AcquisitionOrchestrator::new(Arc::new(device), gateway.clone(), rig, config.acquisition.clone())
        .with_exposure(config.camera.exposure_us);

    let result = orchestrator
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await;
    gateway.close().await;

    let summary = result?;
    tracing::info!(
        frames_uploaded = summary.frames_uploaded,
        jobs = summary.jobs_started,
        "printwatch stopped"
    );
    Ok(())
}
