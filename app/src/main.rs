use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use nlq_core::config::ClientConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn run_app(
    config: &ClientConfig,
    run_tui: impl FnOnce(&ClientConfig) -> Result<(), nlq_tui::TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        api_url = config.api_base(),
        download_dir = %config.download_dir.display(),
        "launching client"
    );
    run_tui(config)?;
    Ok(())
}

fn open_log_file(path: &Path) -> io::Result<File> {
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn init_logging(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let log_file = open_log_file(config.log_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .try_init()
        .map_err(|error| -> Box<dyn std::error::Error> { error })?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let config = ClientConfig::load()?;
    init_logging(&config)?;
    run_app(&config, nlq_tui::run)
}
