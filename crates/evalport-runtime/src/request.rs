use evalport_core::Example;
use tokio::sync::oneshot;

#[derive(Debug)]
pub struct EvalRequest {
    pub examples: Vec<Example>,
    pub submitted_at: std::time::Instant,
    pub ack_tx: Option<oneshot::Sender<UpdateAck>>,
}

impl EvalRequest {
    pub fn new(examples: Vec<Example>) -> Self {
        Self {
            examples,
            submitted_at: std::time::Instant::now(),
            ack_tx: None,
        }
    }

    /// A request whose receiver resolves once its examples have been applied.
    /// The receiver errors if the batch holding them failed.
    pub fn with_ack(examples: Vec<Example>) -> (Self, oneshot::Receiver<UpdateAck>) {
        let (tx, rx) = oneshot::channel();
        let mut req = Self::new(examples);
        req.ack_tx = Some(tx);
        (req, rx)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UpdateAck {
    /// Examples in the batch this request was merged into.
    pub batch_size: usize,
    pub timings: Timings,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Timings {
    pub queued_us: u64,
    pub update_us: u64,
}
