//! Ready-made metric callbacks. Each resolves its slots from the graph's
//! per-bucket storage when registered.

use std::sync::Arc;

use evalport_core::{Bucket, EngineError, FeedKey, FplNodes, SlotId};

use crate::{Callback, ExampleCount, Mean, MeanSquaredError, MetricOp, SparseValueCount};

type BuiltOps = Result<Vec<Box<dyn MetricOp>>, EngineError>;

fn resolve(nodes: &FplNodes, bucket: Bucket, key: &FeedKey) -> Result<SlotId, EngineError> {
    nodes
        .node(bucket, key)
        .copied()
        .ok_or_else(|| EngineError::Runtime(format!("no input slot for {bucket}/{key}")))
}

pub fn example_count(name: &str, bucket: Bucket, key: FeedKey) -> Callback {
    let name = name.to_string();
    Arc::new(move |nodes: &FplNodes| -> BuiltOps {
        let slot = resolve(nodes, bucket, &key)?;
        Ok(vec![
            Box::new(ExampleCount::new(name.clone(), slot)) as Box<dyn MetricOp>
        ])
    })
}

pub fn mean(name: &str, bucket: Bucket, key: FeedKey) -> Callback {
    let name = name.to_string();
    Arc::new(move |nodes: &FplNodes| -> BuiltOps {
        let slot = resolve(nodes, bucket, &key)?;
        Ok(vec![Box::new(Mean::new(name.clone(), slot)) as Box<dyn MetricOp>])
    })
}

/// Squared error between a prediction and a label entry.
pub fn mean_squared_error(name: &str, prediction: FeedKey, label: FeedKey) -> Callback {
    let name = name.to_string();
    Arc::new(move |nodes: &FplNodes| -> BuiltOps {
        let predictions = resolve(nodes, Bucket::Predictions, &prediction)?;
        let labels = resolve(nodes, Bucket::Labels, &label)?;
        Ok(vec![Box::new(MeanSquaredError::new(
            name.clone(),
            predictions,
            labels,
        )) as Box<dyn MetricOp>])
    })
}

pub fn sparse_value_count(name: &str, bucket: Bucket, key: FeedKey) -> Callback {
    let name = name.to_string();
    Arc::new(move |nodes: &FplNodes| -> BuiltOps {
        let slot = resolve(nodes, bucket, &key)?;
        Ok(vec![
            Box::new(SparseValueCount::new(name.clone(), slot)) as Box<dyn MetricOp>
        ])
    })
}
