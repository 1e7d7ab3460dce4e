use super::UsageTelemetry;
use crate::error::TelemetryError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Destination for usage records
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: &UsageTelemetry) -> Result<(), TelemetryError>;
}

/// Appends one JSON object per line
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UsageSink for JsonlSink {
    async fn record(&self, record: &UsageTelemetry) -> Result<(), TelemetryError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps records in memory
#[cfg(test)]
#[derive(Default)]
pub struct MemorySink {
    records: std::sync::Mutex<Vec<UsageTelemetry>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn records(&self) -> Vec<UsageTelemetry> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl UsageSink for MemorySink {
    async fn record(&self, record: &UsageTelemetry) -> Result<(), TelemetryError> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }
}
