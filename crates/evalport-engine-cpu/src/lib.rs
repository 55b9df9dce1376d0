pub mod callbacks;
mod metrics;

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use evalport_core::{
    EngineError, FplNodes, InputSpec, MetricValues, MetricsEngine, SlotId, TensorValue,
};
use tracing::debug;

pub use metrics::*;

/// A metric callback: given the graph's slots, returns the metric ops to attach.
pub type Callback =
    Arc<dyn Fn(&FplNodes) -> Result<Vec<Box<dyn MetricOp>>, EngineError> + Send + Sync>;

/// In-memory metrics engine. Slots are typed placeholders; the accumulation
/// step validates every fed value against its slot before any metric sees it.
pub struct CpuEngine {
    placeholders: Vec<InputSpec>,
    ops: Vec<Box<dyn MetricOp>>,
    updates: u64,
}

impl CpuEngine {
    pub fn new() -> Self {
        Self {
            placeholders: Vec::new(),
            ops: Vec::new(),
            updates: 0,
        }
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    pub fn placeholder_spec(&self, slot: SlotId) -> Option<&InputSpec> {
        self.placeholders.get(slot.0)
    }

    /// Number of accumulation steps that ran to completion.
    pub fn update_count(&self) -> u64 {
        self.updates
    }
}

impl Default for CpuEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsEngine for CpuEngine {
    type Callback = Callback;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn create_placeholder(&mut self, spec: InputSpec) -> Result<SlotId, EngineError> {
        self.placeholders.push(spec);
        Ok(SlotId(self.placeholders.len() - 1))
    }

    fn register_add_metrics_callbacks(
        &mut self,
        callbacks: &[Self::Callback],
        nodes: &FplNodes,
    ) -> Result<(), EngineError> {
        let mut names: BTreeSet<String> = self.ops.iter().map(|op| op.name().to_string()).collect();
        let mut added = Vec::new();
        for callback in callbacks {
            for op in callback(nodes)? {
                if !names.insert(op.name().to_string()) {
                    return Err(EngineError::Runtime(format!(
                        "metric `{}` registered twice",
                        op.name()
                    )));
                }
                added.push(op);
            }
        }
        debug!(engine = self.name(), metrics = added.len(), "registered metric ops");
        self.ops.extend(added);
        Ok(())
    }

    fn run_update(&mut self, slots: &[SlotId], feed: &[TensorValue]) -> Result<(), EngineError> {
        if slots.len() != feed.len() {
            return Err(EngineError::Runtime(format!(
                "expected {} fed values, got {}",
                slots.len(),
                feed.len()
            )));
        }
        for (slot, value) in slots.iter().zip(feed) {
            check_feed(self.placeholder_spec(*slot), *slot, value)?;
        }

        // Every op must accept the batch before any accumulator moves.
        let view = FeedView::new(slots, feed);
        let contributions = self
            .ops
            .iter()
            .map(|op| op.contribution(&view))
            .collect::<Result<Vec<_>, _>>()?;
        for (op, contribution) in self.ops.iter_mut().zip(contributions) {
            op.accumulate(contribution);
        }
        self.updates += 1;
        Ok(())
    }

    fn metric_values(&self) -> Result<MetricValues, EngineError> {
        Ok(self
            .ops
            .iter()
            .map(|op| (op.name().to_string(), op.value()))
            .collect())
    }

    fn reset_metric_variables(&mut self) -> Result<(), EngineError> {
        for op in &mut self.ops {
            op.reset();
        }
        Ok(())
    }

    fn describe_update(&self, slots: &[SlotId]) -> String {
        let mut out = String::new();
        let ops: Vec<&str> = self.ops.iter().map(|op| op.name()).collect();
        let _ = writeln!(out, "update ops: {ops:?}");
        for op in &self.ops {
            let _ = writeln!(out, "metric variable {} = {}", op.name(), op.value());
        }
        for slot in slots {
            match self.placeholder_spec(*slot) {
                Some(spec) => {
                    let _ = writeln!(out, "slot {}: {:?} {}", slot.0, spec.kind, spec.dtype);
                }
                None => {
                    let _ = writeln!(out, "slot {}: unknown", slot.0);
                }
            }
        }
        out
    }
}

fn check_feed(spec: Option<&InputSpec>, slot: SlotId, value: &TensorValue) -> Result<(), EngineError> {
    let Some(spec) = spec else {
        return Err(EngineError::Runtime(format!("unknown slot {}", slot.0)));
    };
    if spec.kind != value.kind() {
        return Err(EngineError::Type(format!(
            "slot {} expects a {:?} value, got {:?}",
            slot.0,
            spec.kind,
            value.kind()
        )));
    }
    if spec.dtype != value.dtype() {
        return Err(EngineError::Type(format!(
            "slot {} expects dtype {}, got {}",
            slot.0,
            spec.dtype,
            value.dtype()
        )));
    }
    Ok(())
}
