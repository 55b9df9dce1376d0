use std::collections::BTreeMap;

use crate::{EngineError, FplNodes, InputSpec, TensorValue};

/// Handle to an input slot owned by an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub usize);

pub type MetricValues = BTreeMap<String, f64>;

/// The metrics-graph engine an evaluation graph is built on.
///
/// The engine owns slots, metric variables and the accumulation step. Metric
/// callbacks are opaque to callers of this trait; the engine decides what a
/// callback is and how it attaches to the slots it is handed.
pub trait MetricsEngine: Send + 'static {
    type Callback: Clone + Send + Sync;

    fn name(&self) -> &'static str;

    fn create_placeholder(&mut self, spec: InputSpec) -> Result<SlotId, EngineError>;

    fn register_add_metrics_callbacks(
        &mut self,
        callbacks: &[Self::Callback],
        nodes: &FplNodes,
    ) -> Result<(), EngineError>;

    /// Runs the accumulation step. `feed[i]` is the value for `slots[i]`.
    fn run_update(&mut self, slots: &[SlotId], feed: &[TensorValue]) -> Result<(), EngineError>;

    fn metric_values(&self) -> Result<MetricValues, EngineError>;

    fn reset_metric_variables(&mut self) -> Result<(), EngineError>;

    /// Human-readable dump of the update ops, metric variables and the slots
    /// being fed. Only used for diagnostics.
    fn describe_update(&self, slots: &[SlotId]) -> String;
}
