use std::time::Instant;

use evalport_core::{FeedDescriptor, MetricsEngine};

use crate::{EvalGraphError, ModelAgnosticGraph};

/// Builds evaluation graphs and reports how long each build took.
pub struct ConstructFn<E: MetricsEngine, F> {
    engine_factory: F,
    callbacks: Vec<E::Callback>,
    descriptor: Option<FeedDescriptor>,
}

/// Without a descriptor the returned graphs discover their feed structure from
/// the first batch, so construction proper happens on that first update.
pub fn make_construct_fn<E, F>(
    engine_factory: F,
    callbacks: Vec<E::Callback>,
    descriptor: Option<FeedDescriptor>,
) -> ConstructFn<E, F>
where
    E: MetricsEngine,
    F: Fn() -> E,
{
    ConstructFn {
        engine_factory,
        callbacks,
        descriptor,
    }
}

impl<E, F> ConstructFn<E, F>
where
    E: MetricsEngine,
    F: Fn() -> E,
{
    /// `on_load_seconds` receives the elapsed whole seconds, and only on success.
    pub fn construct(
        &self,
        on_load_seconds: impl FnOnce(u64),
    ) -> Result<ModelAgnosticGraph<E>, EvalGraphError> {
        let start = Instant::now();
        let engine = (self.engine_factory)();
        let graph = match &self.descriptor {
            Some(descriptor) => {
                let mut graph =
                    ModelAgnosticGraph::new(engine, self.callbacks.clone(), descriptor.clone());
                graph.construct()?;
                graph
            }
            None => ModelAgnosticGraph::discovering(engine, self.callbacks.clone()),
        };
        on_load_seconds(start.elapsed().as_secs());
        Ok(graph)
    }
}
