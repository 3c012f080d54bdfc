use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod json_exporter;

use crate::config::OutputConfig;
use crate::product::ProductRecord;

/// Intermediate results file holding the last scraped record
pub struct ResultsFile {
    path: PathBuf,
}

/// Export statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStats {
    pub file_path: String,
    pub file_size_bytes: u64,
    pub export_duration_ms: u64,
}

impl ResultsFile {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            path: config.results_path.clone(),
        }
    }

    /// Use an explicit path instead of the configured one
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `record`
    pub async fn write(&self, record: &ProductRecord) -> Result<ExportStats> {
        let start_time = std::time::Instant::now();

        let file_size_bytes = json_exporter::write_record(record, &self.path).await?;

        let stats = ExportStats {
            file_path: self.path.display().to_string(),
            file_size_bytes,
            export_duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Record for {} written in {}ms",
            record.url, stats.export_duration_ms
        );
        Ok(stats)
    }

    pub async fn read(&self) -> Result<ProductRecord> {
        json_exporter::read_record(&self.path).await
    }
}
