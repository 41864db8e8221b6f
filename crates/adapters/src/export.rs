use std::fs;
use std::path::{Path, PathBuf};

use nlq_core::chart::ChartImage;
use nlq_core::query_workflow::CSV_DOWNLOAD_FILE_NAME;
use thiserror::Error;
use tracing::info;

pub const CHART_IMAGE_FILE_NAME: &str = "chart.png";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create download directory at {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write export file at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub fn save_csv_download(dir: &Path, payload: &[u8]) -> Result<PathBuf, ExportError> {
    save_file(dir, CSV_DOWNLOAD_FILE_NAME, payload)
}

pub fn save_chart_image(dir: &Path, image: &ChartImage) -> Result<PathBuf, ExportError> {
    save_file(dir, CHART_IMAGE_FILE_NAME, image.bytes())
}

fn save_file(dir: &Path, file_name: &str, payload: &[u8]) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.display().to_string(),
        source,
    })?;

    let path = dir.join(file_name);
    fs::write(&path, payload).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), bytes = payload.len(), "saved download");
    Ok(path)
}
