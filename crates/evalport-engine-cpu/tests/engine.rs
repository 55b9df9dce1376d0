use anyhow::{ensure, Context, Result};
use evalport_core::{
    wrap_node, Bucket, DType, EngineError, ErrorKind, FeedKey, FplNodes, InputSpec,
    MetricsEngine, SparseTensor, Tensor, TensorValue,
};
use evalport_engine_cpu::{callbacks, CpuEngine};

/// Two slots: a dense f32 prediction and a dense f32 label, wired as single buckets.
fn prediction_label_engine() -> Result<(CpuEngine, FplNodes)> {
    let mut engine = CpuEngine::new();
    let prediction = engine.create_placeholder(InputSpec::dense(DType::F32))?;
    let label = engine.create_placeholder(InputSpec::dense(DType::F32))?;

    let mut nodes = FplNodes::default();
    nodes
        .predictions
        .insert(FeedKey::Unnamed, wrap_node(prediction));
    nodes.labels.insert(FeedKey::Unnamed, wrap_node(label));

    engine.register_add_metrics_callbacks(
        &[
            callbacks::example_count("example_count", Bucket::Labels, FeedKey::Unnamed),
            callbacks::mean("label_mean", Bucket::Labels, FeedKey::Unnamed),
            callbacks::mean_squared_error("mse", FeedKey::Unnamed, FeedKey::Unnamed),
        ],
        &nodes,
    )?;
    Ok((engine, nodes))
}

fn slots(nodes: &FplNodes) -> Result<Vec<evalport_core::SlotId>> {
    nodes
        .canonical()
        .map(|(bucket, key, node)| {
            evalport_core::node_value(node)
                .copied()
                .with_context(|| format!("missing node for {bucket}/{key}"))
        })
        .collect()
}

#[test]
fn accumulates_across_updates() -> Result<()> {
    let (mut engine, nodes) = prediction_label_engine()?;
    let slots = slots(&nodes)?;

    engine.run_update(
        &slots,
        &[
            TensorValue::from(Tensor::vector(&[1.0f32, 2.0])),
            TensorValue::from(Tensor::vector(&[1.0f32, 4.0])),
        ],
    )?;
    engine.run_update(
        &slots,
        &[
            TensorValue::from(Tensor::vector(&[3.0f32])),
            TensorValue::from(Tensor::vector(&[1.0f32])),
        ],
    )?;

    let values = engine.metric_values()?;
    ensure!(values["example_count"] == 3.0, "count: {values:?}");
    ensure!(values["label_mean"] == 2.0, "mean: {values:?}");
    ensure!(values["mse"] == 8.0 / 3.0, "mse: {values:?}");
    ensure!(engine.update_count() == 2, "expected two updates");

    engine.reset_metric_variables()?;
    let values = engine.metric_values()?;
    ensure!(values.values().all(|v| *v == 0.0), "reset: {values:?}");
    Ok(())
}

#[test]
fn rejects_wrong_dtype_before_touching_metrics() -> Result<()> {
    let (mut engine, nodes) = prediction_label_engine()?;
    let slots = slots(&nodes)?;

    let err = engine
        .run_update(
            &slots,
            &[
                TensorValue::from(Tensor::vector(&[1i32])),
                TensorValue::from(Tensor::vector(&[1.0f32])),
            ],
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Type);
    assert_eq!(engine.metric_values()?["example_count"], 0.0);
    assert_eq!(engine.update_count(), 0);
    Ok(())
}

#[test]
fn rejects_sparse_value_for_dense_slot() -> Result<()> {
    let (mut engine, nodes) = prediction_label_engine()?;
    let slots = slots(&nodes)?;

    let sparse = TensorValue::from(SparseTensor::new(&[[0]], &[1.0f32], &[1])?);
    let err = engine
        .run_update(&slots, &[sparse, TensorValue::from(Tensor::vector(&[1.0f32]))])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Type);
    Ok(())
}

#[test]
fn feed_arity_must_match() -> Result<()> {
    let (mut engine, nodes) = prediction_label_engine()?;
    let slots = slots(&nodes)?;

    let err = engine
        .run_update(&slots, &[TensorValue::from(Tensor::vector(&[1.0f32]))])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    Ok(())
}

#[test]
fn mismatched_prediction_and_label_lengths_are_value_errors() -> Result<()> {
    let (mut engine, nodes) = prediction_label_engine()?;
    let slots = slots(&nodes)?;

    let err = engine
        .run_update(
            &slots,
            &[
                TensorValue::from(Tensor::vector(&[1.0f32, 2.0])),
                TensorValue::from(Tensor::new(&[1, 1], &[1.0f32])?),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Value(_)), "{err}");

    let values = engine.metric_values()?;
    assert_eq!(values["example_count"], 0.0);
    assert_eq!(values["label_mean"], 0.0);
    assert_eq!(engine.update_count(), 0);
    Ok(())
}

#[test]
fn a_failing_metric_leaves_earlier_metrics_untouched() -> Result<()> {
    let mut engine = CpuEngine::new();
    let x = engine.create_placeholder(InputSpec::dense(DType::F32))?;
    let mut nodes = FplNodes::default();
    nodes.features.insert(FeedKey::named("x"), wrap_node(x));
    engine.register_add_metrics_callbacks(
        &[
            callbacks::example_count("count", Bucket::Features, FeedKey::named("x")),
            callbacks::mean("mean", Bucket::Features, FeedKey::named("x")),
        ],
        &nodes,
    )?;

    engine.run_update(&[x], &[TensorValue::from(Tensor::vector(&[2.0f32]))])?;
    let err = engine
        .run_update(&[x], &[TensorValue::from(Tensor::vector(&[f32::NAN]))])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);

    let values = engine.metric_values()?;
    assert_eq!(values["count"], 1.0);
    assert_eq!(values["mean"], 2.0);
    assert_eq!(engine.update_count(), 1);
    Ok(())
}

#[test]
fn counts_sparse_values() -> Result<()> {
    let mut engine = CpuEngine::new();
    let tags = engine.create_placeholder(InputSpec::sparse(DType::I64))?;
    let mut nodes = FplNodes::default();
    nodes.features.insert(FeedKey::named("tags"), wrap_node(tags));
    engine.register_add_metrics_callbacks(
        &[callbacks::sparse_value_count(
            "tag_count",
            Bucket::Features,
            FeedKey::named("tags"),
        )],
        &nodes,
    )?;

    let batch = SparseTensor::new(&[[0, 1], [0, 3], [1, 0]], &[4i64, 5, 6], &[2, 4])?;
    engine.run_update(&[tags], &[TensorValue::from(batch)])?;
    assert_eq!(engine.metric_values()?["tag_count"], 3.0);
    Ok(())
}

#[test]
fn registration_fails_for_unknown_keys() -> Result<()> {
    let mut engine = CpuEngine::new();
    let err = engine
        .register_add_metrics_callbacks(
            &[callbacks::mean("m", Bucket::Features, FeedKey::named("absent"))],
            &FplNodes::default(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
    Ok(())
}

#[test]
fn duplicate_metric_names_are_rejected() -> Result<()> {
    let (mut engine, nodes) = prediction_label_engine()?;
    let err = engine
        .register_add_metrics_callbacks(
            &[callbacks::mean("mse", Bucket::Labels, FeedKey::Unnamed)],
            &nodes,
        )
        .unwrap_err();
    assert!(err.to_string().contains("registered twice"), "{err}");
    Ok(())
}

#[test]
fn describe_update_lists_ops_and_slots() -> Result<()> {
    let (engine, nodes) = prediction_label_engine()?;
    let dump = engine.describe_update(&slots(&nodes)?);
    ensure!(dump.contains("update ops"), "{dump}");
    ensure!(dump.contains("metric variable mse = 0"), "{dump}");
    ensure!(dump.contains("slot 1: Dense f32"), "{dump}");
    Ok(())
}
