use evalport_core::{EngineError, SlotId, SparseTensor, Tensor, TensorValue};

/// The values fed to one accumulation step, addressed by slot.
pub struct FeedView<'a> {
    slots: &'a [SlotId],
    values: &'a [TensorValue],
}

impl<'a> FeedView<'a> {
    pub(crate) fn new(slots: &'a [SlotId], values: &'a [TensorValue]) -> Self {
        Self { slots, values }
    }

    pub fn get(&self, slot: SlotId) -> Result<&'a TensorValue, EngineError> {
        self.slots
            .iter()
            .position(|s| *s == slot)
            .map(|i| &self.values[i])
            .ok_or_else(|| EngineError::Runtime(format!("slot {} was not fed", slot.0)))
    }

    pub fn dense(&self, slot: SlotId) -> Result<&'a Tensor, EngineError> {
        self.get(slot)?.as_dense().ok_or_else(|| {
            EngineError::Type(format!("slot {} holds a sparse value, expected dense", slot.0))
        })
    }

    pub fn sparse(&self, slot: SlotId) -> Result<&'a SparseTensor, EngineError> {
        self.get(slot)?.as_sparse().ok_or_else(|| {
            EngineError::Type(format!("slot {} holds a dense value, expected sparse", slot.0))
        })
    }
}

/// What one batch adds to a metric's accumulator variables.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Contribution {
    pub total: f64,
    pub count: f64,
}

/// A metric with its own accumulator variables.
///
/// Updates are split in two: `contribution` reads the feed and may fail,
/// `accumulate` folds an accepted contribution in and cannot.
pub trait MetricOp: Send {
    fn name(&self) -> &str;

    fn contribution(&self, feed: &FeedView<'_>) -> Result<Contribution, EngineError>;

    fn accumulate(&mut self, contribution: Contribution);

    fn value(&self) -> f64;

    fn reset(&mut self);
}

/// Counts batch rows fed into a slot.
pub struct ExampleCount {
    name: String,
    slot: SlotId,
    count: f64,
}

impl ExampleCount {
    pub fn new(name: impl Into<String>, slot: SlotId) -> Self {
        Self {
            name: name.into(),
            slot,
            count: 0.0,
        }
    }
}

impl MetricOp for ExampleCount {
    fn name(&self) -> &str {
        &self.name
    }

    fn contribution(&self, feed: &FeedView<'_>) -> Result<Contribution, EngineError> {
        Ok(Contribution {
            total: 0.0,
            count: feed.get(self.slot)?.rows() as f64,
        })
    }

    fn accumulate(&mut self, contribution: Contribution) {
        self.count += contribution.count;
    }

    fn value(&self) -> f64 {
        self.count
    }

    fn reset(&mut self) {
        self.count = 0.0;
    }
}

/// Running mean over every element of a dense slot. Zero until something is fed.
pub struct Mean {
    name: String,
    slot: SlotId,
    total: f64,
    count: f64,
}

impl Mean {
    pub fn new(name: impl Into<String>, slot: SlotId) -> Self {
        Self {
            name: name.into(),
            slot,
            total: 0.0,
            count: 0.0,
        }
    }
}

impl MetricOp for Mean {
    fn name(&self) -> &str {
        &self.name
    }

    fn contribution(&self, feed: &FeedView<'_>) -> Result<Contribution, EngineError> {
        let values = feed.dense(self.slot)?.to_f64_lossy();
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(EngineError::Value(format!(
                "{}: non-finite input {bad}",
                self.name
            )));
        }
        Ok(Contribution {
            total: values.iter().sum(),
            count: values.len() as f64,
        })
    }

    fn accumulate(&mut self, contribution: Contribution) {
        self.total += contribution.total;
        self.count += contribution.count;
    }

    fn value(&self) -> f64 {
        if self.count == 0.0 {
            0.0
        } else {
            self.total / self.count
        }
    }

    fn reset(&mut self) {
        self.total = 0.0;
        self.count = 0.0;
    }
}

pub struct MeanSquaredError {
    name: String,
    predictions: SlotId,
    labels: SlotId,
    total: f64,
    count: f64,
}

impl MeanSquaredError {
    pub fn new(name: impl Into<String>, predictions: SlotId, labels: SlotId) -> Self {
        Self {
            name: name.into(),
            predictions,
            labels,
            total: 0.0,
            count: 0.0,
        }
    }
}

impl MetricOp for MeanSquaredError {
    fn name(&self) -> &str {
        &self.name
    }

    fn contribution(&self, feed: &FeedView<'_>) -> Result<Contribution, EngineError> {
        let predictions = feed.dense(self.predictions)?.to_f64_lossy();
        let labels = feed.dense(self.labels)?.to_f64_lossy();
        if predictions.len() != labels.len() {
            return Err(EngineError::Value(format!(
                "{}: {} predictions for {} labels",
                self.name,
                predictions.len(),
                labels.len()
            )));
        }
        Ok(Contribution {
            total: predictions
                .iter()
                .zip(&labels)
                .map(|(p, l)| (p - l) * (p - l))
                .sum(),
            count: predictions.len() as f64,
        })
    }

    fn accumulate(&mut self, contribution: Contribution) {
        self.total += contribution.total;
        self.count += contribution.count;
    }

    fn value(&self) -> f64 {
        if self.count == 0.0 {
            0.0
        } else {
            self.total / self.count
        }
    }

    fn reset(&mut self) {
        self.total = 0.0;
        self.count = 0.0;
    }
}

/// Total number of stored values in a sparse slot.
pub struct SparseValueCount {
    name: String,
    slot: SlotId,
    total: f64,
}

impl SparseValueCount {
    pub fn new(name: impl Into<String>, slot: SlotId) -> Self {
        Self {
            name: name.into(),
            slot,
            total: 0.0,
        }
    }
}

impl MetricOp for SparseValueCount {
    fn name(&self) -> &str {
        &self.name
    }

    fn contribution(&self, feed: &FeedView<'_>) -> Result<Contribution, EngineError> {
        let nnz = feed.sparse(self.slot)?.nnz() as f64;
        Ok(Contribution {
            total: nnz,
            count: nnz,
        })
    }

    fn accumulate(&mut self, contribution: Contribution) {
        self.total += contribution.total;
    }

    fn value(&self) -> f64 {
        self.total
    }

    fn reset(&mut self) {
        self.total = 0.0;
    }
}
