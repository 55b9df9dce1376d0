use anyhow::Result;
use evalport_core::Example;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Duration, Instant};
use tracing::debug;

use crate::{EvalRequest, UpdateAck};

#[derive(Clone, Debug)]
pub struct BatchPolicy {
    /// Flush once at least this many examples are pending.
    pub max_batch: usize,
    pub max_delay: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_batch: 100,
            max_delay: Duration::from_millis(5),
        }
    }
}

/// Examples merged from one or more requests, ready for a single metrics update.
#[derive(Debug)]
pub struct BatchJob {
    pub examples: Vec<Example>,
    pub acks: Vec<(std::time::Instant, oneshot::Sender<UpdateAck>)>,
    pub created_at: std::time::Instant,
}

pub struct Batcher {
    policy: BatchPolicy,
    rx: mpsc::Receiver<EvalRequest>,
    worker_tx: mpsc::Sender<BatchJob>,
}

impl Batcher {
    pub fn new(
        policy: BatchPolicy,
        rx: mpsc::Receiver<EvalRequest>,
        worker_tx: mpsc::Sender<BatchJob>,
    ) -> Self {
        Self {
            policy,
            rx,
            worker_tx,
        }
    }

    /// Runs until every request sender is dropped, then flushes what is left.
    pub async fn run(mut self) -> Result<()> {
        let mut pending: Vec<EvalRequest> = Vec::new();
        let mut pending_examples = 0usize;
        let mut first_seen: Option<Instant> = None;

        loop {
            tokio::select! {
                maybe_req = self.rx.recv() => {
                    match maybe_req {
                        None => break,
                        Some(req) => {
                            if pending.is_empty() { first_seen = Some(Instant::now()); }
                            pending_examples += req.examples.len();
                            pending.push(req);
                            if pending_examples >= self.policy.max_batch {
                                self.flush(&mut pending).await?;
                                pending_examples = 0;
                                first_seen = None;
                            }
                        }
                    }
                }
                _ = async {
                    if let Some(t0) = first_seen {
                        sleep(self.policy.max_delay.saturating_sub(t0.elapsed())).await;
                    }
                }, if first_seen.is_some() => {
                    self.flush(&mut pending).await?;
                    pending_examples = 0;
                    first_seen = None;
                }
            }
        }

        self.flush(&mut pending).await
    }

    async fn flush(&self, pending: &mut Vec<EvalRequest>) -> Result<()> {
        let reqs = std::mem::take(pending);
        if reqs.is_empty() {
            return Ok(());
        }

        let mut examples = Vec::new();
        let mut acks = Vec::new();
        for req in reqs {
            examples.extend(req.examples);
            if let Some(tx) = req.ack_tx {
                acks.push((req.submitted_at, tx));
            }
        }

        debug!(batch = examples.len(), acks = acks.len(), "dispatching batch");
        let job = BatchJob {
            examples,
            acks,
            created_at: std::time::Instant::now(),
        };

        self.worker_tx
            .send(job)
            .await
            .map_err(|e| anyhow::anyhow!("update worker is gone: {e}"))
    }
}
