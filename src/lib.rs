// printwatch: acquisition host for print-monitoring image datasets
pub mod config;
pub mod device;
pub mod hardware;
pub mod orchestrator;
pub mod persistence;

pub use config::{load_config, load_config_or_default, Config, ConfigError};
pub use device::MoonrakerClient;
pub use hardware::HardwareRig;
pub use orchestrator::{AcquisitionOrchestrator, OrchestratorError, RunSummary};
pub use persistence::SqliteGateway;
