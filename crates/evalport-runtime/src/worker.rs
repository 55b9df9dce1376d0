use anyhow::{Context, Result};
use evalport_core::MetricValues;
use tokio::sync::mpsc;
use tracing::info;

use crate::{BatchJob, MetricsUpdater, Timings, UpdateAck};

/// Owns an evaluation graph and applies batches to it one at a time.
pub struct UpdateWorker {
    pub id: u32,
    pub inbox: mpsc::Receiver<BatchJob>,
    pub model: Box<dyn MetricsUpdater>,
}

impl UpdateWorker {
    /// Stops at the first failed batch. Once the inbox closes, returns the
    /// final metric values.
    pub async fn run(mut self) -> Result<MetricValues> {
        info!(worker_id = self.id, "update worker started");
        let mut batches = 0u64;
        while let Some(job) = self.inbox.recv().await {
            let batch_size = job.examples.len();
            let t0 = std::time::Instant::now();
            self.model.update_batch(&job.examples).with_context(|| {
                format!(
                    "worker {} failed to apply a batch of {batch_size} examples",
                    self.id
                )
            })?;
            let update_us = t0.elapsed().as_micros() as u64;
            batches += 1;

            for (submitted_at, ack) in job.acks {
                let _ = ack.send(UpdateAck {
                    batch_size,
                    timings: Timings {
                        queued_us: job.created_at.duration_since(submitted_at).as_micros() as u64,
                        update_us,
                    },
                });
            }
        }

        let values = self.model.metric_values()?;
        info!(
            worker_id = self.id,
            batches,
            metrics = values.len(),
            "update worker finished"
        );
        Ok(values)
    }
}
