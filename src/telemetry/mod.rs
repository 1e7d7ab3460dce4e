//! Usage telemetry: one record per successful generation, pushed through a
//! bounded queue so a slow sink never stalls the caller.

mod sink;

#[cfg(test)]
pub use sink::MemorySink;
pub use sink::{JsonlSink, UsageSink};

use crate::config::Config;
use crate::provider::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTelemetry {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub command_name: String,
    pub model_used: String,
    pub provider_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub currency: String,
}

impl UsageTelemetry {
    pub fn build(
        config: &Config,
        command_name: &str,
        provider: &str,
        model_id: &str,
        usage: TokenUsage,
    ) -> Self {
        let (total_cost, currency) = match config.cost(model_id) {
            Some(cost) => (
                round6(
                    usage.input_tokens as f64 / 1_000_000.0 * cost.input
                        + usage.output_tokens as f64 / 1_000_000.0 * cost.output,
                ),
                cost.currency,
            ),
            None => {
                debug!("No cost entry for model {}, recording zero cost", model_id);
                (0.0, "USD".to_string())
            }
        };

        Self {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: config.telemetry.user_id.clone(),
            command_name: command_name.to_string(),
            model_used: model_id.to_string(),
            provider_name: provider.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
            total_cost,
            currency,
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

/// Sending half of the telemetry queue; cheap to clone
#[derive(Debug, Clone)]
pub struct TelemetryQueue {
    tx: mpsc::Sender<UsageTelemetry>,
}

impl TelemetryQueue {
    /// Start the background writer draining into `sink`
    pub fn spawn(sink: Arc<dyn UsageSink>, capacity: usize) -> (Self, TelemetryWorker) {
        let (tx, mut rx) = mpsc::channel::<UsageTelemetry>(capacity.max(1));

        let handle = tokio::spawn(async move {
            let mut written = 0usize;
            while let Some(record) = rx.recv().await {
                match sink.record(&record).await {
                    Ok(()) => written += 1,
                    Err(e) => warn!("Failed to record usage telemetry: {}", e),
                }
            }
            written
        });

        (Self { tx }, TelemetryWorker { handle })
    }

    /// Enqueue without waiting; the record is dropped if the queue is full
    pub fn emit(&self, record: UsageTelemetry) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(record)) => {
                debug!("Telemetry queue full, dropping record {}", record.request_id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                debug!("Telemetry queue closed, dropping record {}", record.request_id);
                false
            }
        }
    }
}

pub struct TelemetryWorker {
    handle: JoinHandle<usize>,
}

impl TelemetryWorker {
    /// Best-effort flush: waits up to `timeout` for queued records once every
    /// `TelemetryQueue` clone has been dropped. Returns how many were written.
    pub async fn shutdown(self, timeout: Duration) -> usize {
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(written)) => written,
            Ok(Err(e)) => {
                warn!("Telemetry writer panicked: {}", e);
                0
            }
            Err(_) => {
                warn!("Telemetry flush timed out after {:?}", timeout);
                0
            }
        }
    }
}
