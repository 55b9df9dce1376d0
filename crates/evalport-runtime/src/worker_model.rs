use evalport_core::{Example, MetricValues, MetricsEngine};

use crate::{EvalGraphError, ModelAgnosticGraph};

/// Object-safe view of an evaluation graph for the update worker.
/// Kept synchronous; the worker task calls it directly.
pub trait MetricsUpdater: Send {
    fn update_batch(&mut self, examples: &[Example]) -> Result<(), EvalGraphError>;

    fn metric_values(&self) -> Result<MetricValues, EvalGraphError>;
}

impl<E: MetricsEngine> MetricsUpdater for ModelAgnosticGraph<E> {
    fn update_batch(&mut self, examples: &[Example]) -> Result<(), EvalGraphError> {
        self.update_metrics(examples)
    }

    fn metric_values(&self) -> Result<MetricValues, EvalGraphError> {
        ModelAgnosticGraph::metric_values(self)
    }
}
