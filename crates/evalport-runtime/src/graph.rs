use evalport_core::{
    node_value, wrap_node, Bucket, Example, FeedDescriptor, FeedError, FeedKey, FplNodes,
    MetricValues, MetricsEngine, SlotId, TensorValue,
};
use tracing::{debug, info, Level};

use crate::{ConstructionError, EvalGraphError, FeedDiagnostics};

/// The input slots of a constructed graph.
///
/// `slots[i]` was created for `keys[i]`; both follow the canonical order of the
/// descriptor the layer was built from. `nodes` holds the same slots keyed by
/// bucket and key, wrapped under the node suffix, for metric callbacks.
#[derive(Debug, Default)]
pub struct InputLayer {
    slots: Vec<SlotId>,
    keys: Vec<(Bucket, FeedKey)>,
    nodes: FplNodes,
}

impl InputLayer {
    pub fn slots(&self) -> &[SlotId] {
        &self.slots
    }

    pub fn keys(&self) -> &[(Bucket, FeedKey)] {
        &self.keys
    }

    pub fn nodes(&self) -> &FplNodes {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Creates one placeholder per descriptor entry, in canonical order.
pub fn build_input_layer<E: MetricsEngine>(
    engine: &mut E,
    descriptor: &FeedDescriptor,
) -> Result<InputLayer, ConstructionError> {
    let mut layer = InputLayer::default();
    for (bucket, key, spec) in descriptor.canonical() {
        let slot = engine.create_placeholder(*spec)?;
        layer
            .nodes
            .bucket_mut(bucket)
            .insert(key.clone(), wrap_node(slot));
        layer.slots.push(slot);
        layer.keys.push((bucket, key));
    }
    Ok(layer)
}

/// Merges a batch into one value per descriptor entry, in canonical order.
///
/// The descriptor must be the one the input layer was built from; otherwise
/// values land in the wrong slots.
pub fn build_feed_values(
    descriptor: &FeedDescriptor,
    examples: &[Example],
) -> Result<Vec<TensorValue>, FeedError> {
    let mut feed = Vec::with_capacity(descriptor.len());
    for (bucket, key, spec) in descriptor.canonical() {
        let mut parts = Vec::with_capacity(examples.len());
        for (index, example) in examples.iter().enumerate() {
            let node = example
                .get(bucket, &key)
                .ok_or_else(|| FeedError::MissingKey {
                    index,
                    bucket,
                    key: key.clone(),
                })?;
            let value = node_value(node).ok_or_else(|| FeedError::MissingNode {
                index,
                bucket,
                key: key.clone(),
            })?;
            if value.kind() != spec.kind {
                return Err(FeedError::KindMismatch {
                    index,
                    bucket,
                    key: key.clone(),
                    expected: spec.kind,
                    got: value.kind(),
                });
            }
            parts.push(value);
        }
        let merged = TensorValue::merge(&parts).map_err(|source| FeedError::Merge {
            bucket,
            key: key.clone(),
            source,
        })?;
        feed.push(merged);
    }
    Ok(feed)
}

enum Construction {
    Pending,
    Built(InputLayer),
    Failed,
}

/// An evaluation graph fed with (features, predictions, labels) tuples rather
/// than a model's own inputs.
///
/// The input layer is built once, either from a descriptor given up front or
/// from the first example ever fed. Updates take `&mut self`: callers sharing
/// a graph across tasks must hold a lock for the whole update.
pub struct ModelAgnosticGraph<E: MetricsEngine> {
    engine: E,
    callbacks: Vec<E::Callback>,
    descriptor: Option<FeedDescriptor>,
    state: Construction,
}

impl<E: MetricsEngine> ModelAgnosticGraph<E> {
    pub fn new(engine: E, callbacks: Vec<E::Callback>, descriptor: FeedDescriptor) -> Self {
        Self {
            engine,
            callbacks,
            descriptor: Some(descriptor),
            state: Construction::Pending,
        }
    }

    /// A graph whose feed structure is taken from the first example it is fed.
    pub fn discovering(engine: E, callbacks: Vec<E::Callback>) -> Self {
        Self {
            engine,
            callbacks,
            descriptor: None,
            state: Construction::Pending,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn descriptor(&self) -> Option<&FeedDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn is_constructed(&self) -> bool {
        matches!(self.state, Construction::Built(_))
    }

    pub fn input_layer(&self) -> Option<&InputLayer> {
        match &self.state {
            Construction::Built(layer) => Some(layer),
            _ => None,
        }
    }

    /// Builds the input layer and registers the metric callbacks, once.
    /// Later calls return the layer built the first time.
    pub fn construct(&mut self) -> Result<&InputLayer, EvalGraphError> {
        if matches!(self.state, Construction::Pending) {
            if self.descriptor.is_none() {
                return Err(ConstructionError::NoDescriptor.into());
            }
            match self.construct_graph() {
                Ok(layer) => self.state = Construction::Built(layer),
                Err(err) => {
                    self.state = Construction::Failed;
                    return Err(err.into());
                }
            }
        }
        match &self.state {
            Construction::Built(layer) => Ok(layer),
            _ => Err(ConstructionError::Poisoned.into()),
        }
    }

    fn construct_graph(&mut self) -> Result<InputLayer, ConstructionError> {
        let descriptor = self
            .descriptor
            .as_ref()
            .ok_or(ConstructionError::NoDescriptor)?;
        let layer = build_input_layer(&mut self.engine, descriptor)?;
        self.engine
            .register_add_metrics_callbacks(&self.callbacks, &layer.nodes)?;
        info!(
            engine = self.engine.name(),
            inputs = layer.len(),
            callbacks = self.callbacks.len(),
            "constructed model agnostic evaluation graph"
        );
        Ok(layer)
    }

    /// Merged feed for `examples`, in slot order.
    pub fn feed_values(&self, examples: &[Example]) -> Result<Vec<TensorValue>, EvalGraphError> {
        let descriptor = self
            .descriptor
            .as_ref()
            .ok_or(ConstructionError::NoDescriptor)?;
        Ok(build_feed_values(descriptor, examples)?)
    }

    /// Runs one accumulation step over `examples`, constructing the graph
    /// first if needed. An empty batch does nothing.
    pub fn update_metrics(&mut self, examples: &[Example]) -> Result<(), EvalGraphError> {
        let Some(first) = examples.first() else {
            return Ok(());
        };
        if self.descriptor.is_none() {
            // A malformed first example is a batch problem, not a construction failure.
            let descriptor = FeedDescriptor::from_example(first)?;
            debug!(inputs = descriptor.len(), "discovered feed structure");
            self.descriptor = Some(descriptor);
        }
        self.construct()?;
        self.perform_metrics_update(examples)
    }

    fn perform_metrics_update(&mut self, examples: &[Example]) -> Result<(), EvalGraphError> {
        let Construction::Built(layer) = &self.state else {
            return Err(ConstructionError::Poisoned.into());
        };
        let descriptor = self
            .descriptor
            .as_ref()
            .ok_or(ConstructionError::NoDescriptor)?;

        let feed = build_feed_values(descriptor, examples)?;
        if let Err(source) = self.engine.run_update(&layer.slots, &feed) {
            if tracing::enabled!(Level::DEBUG) {
                debug!(
                    dump = %self.engine.describe_update(&layer.slots),
                    "metrics update failed"
                );
            }
            let diagnostics =
                FeedDiagnostics::new(examples, layer.keys.iter().cloned().zip(feed).collect());
            return Err(EvalGraphError::Execution {
                source,
                diagnostics: Box::new(diagnostics),
            });
        }
        Ok(())
    }

    pub fn metric_values(&self) -> Result<MetricValues, EvalGraphError> {
        self.engine.metric_values().map_err(EvalGraphError::Engine)
    }

    pub fn reset_metric_variables(&mut self) -> Result<(), EvalGraphError> {
        self.engine
            .reset_metric_variables()
            .map_err(EvalGraphError::Engine)
    }

    /// Resets the metric variables, runs one update and reads the result.
    pub fn metrics_reset_update_get_list(
        &mut self,
        examples: &[Example],
    ) -> Result<MetricValues, EvalGraphError> {
        self.reset_metric_variables()?;
        self.update_metrics(examples)?;
        self.metric_values()
    }
}
