use std::time::Duration;

use anyhow::Result;
use evalport_core::{Bucket, DType, Example, FeedDescriptor, FeedKey, InputSpec, Tensor};
use evalport_engine_cpu::{callbacks, CpuEngine};
use evalport_runtime::{
    BatchPolicy, Batcher, EvalGraphError, EvalRequest, ModelAgnosticGraph, UpdateWorker,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn example(x: f32) -> Example {
    Example::builder()
        .feature("x", Tensor::vector(&[x]))
        .single_prediction(Tensor::vector(&[x]))
        .single_label(Tensor::vector(&[0.0f32]))
        .build()
}

struct Pipeline {
    requests: mpsc::Sender<EvalRequest>,
    batcher: JoinHandle<Result<()>>,
    worker: JoinHandle<Result<evalport_core::MetricValues>>,
}

fn spawn_pipeline(policy: BatchPolicy) -> Pipeline {
    let descriptor = FeedDescriptor::builder()
        .feature("x", InputSpec::dense(DType::F32))
        .single_prediction(InputSpec::dense(DType::F32))
        .single_label(InputSpec::dense(DType::F32))
        .build();
    let graph = ModelAgnosticGraph::new(
        CpuEngine::new(),
        vec![
            callbacks::example_count("example_count", Bucket::Features, FeedKey::named("x")),
            callbacks::mean("mean_x", Bucket::Features, FeedKey::named("x")),
        ],
        descriptor,
    );

    let (requests, batcher_rx) = mpsc::channel(16);
    let (worker_tx, inbox) = mpsc::channel(4);
    let batcher = Batcher::new(policy, batcher_rx, worker_tx);
    let worker = UpdateWorker {
        id: 0,
        inbox,
        model: Box::new(graph),
    };

    Pipeline {
        requests,
        batcher: tokio::spawn(batcher.run()),
        worker: tokio::spawn(worker.run()),
    }
}

#[tokio::test]
async fn requests_are_merged_up_to_the_batch_size() -> Result<()> {
    let pipeline = spawn_pipeline(BatchPolicy {
        max_batch: 4,
        max_delay: Duration::from_secs(60),
    });

    let (first, first_ack) = EvalRequest::with_ack(vec![example(1.0), example(2.0)]);
    let (second, second_ack) = EvalRequest::with_ack(vec![example(3.0), example(6.0)]);
    pipeline.requests.send(first).await?;
    pipeline.requests.send(second).await?;

    assert_eq!(first_ack.await?.batch_size, 4);
    assert_eq!(second_ack.await?.batch_size, 4);

    drop(pipeline.requests);
    pipeline.batcher.await??;
    let values = pipeline.worker.await??;
    assert_eq!(values["example_count"], 4.0);
    assert_eq!(values["mean_x"], 3.0);
    Ok(())
}

#[tokio::test]
async fn pending_examples_flush_after_the_delay() -> Result<()> {
    let pipeline = spawn_pipeline(BatchPolicy {
        max_batch: 100,
        max_delay: Duration::from_millis(5),
    });

    let (req, ack) = EvalRequest::with_ack(vec![example(2.0)]);
    pipeline.requests.send(req).await?;
    let ack = tokio::time::timeout(Duration::from_secs(5), ack).await??;
    assert_eq!(ack.batch_size, 1);

    drop(pipeline.requests);
    pipeline.batcher.await??;
    assert_eq!(pipeline.worker.await??["example_count"], 1.0);
    Ok(())
}

#[tokio::test]
async fn remaining_examples_flush_when_requests_stop() -> Result<()> {
    let pipeline = spawn_pipeline(BatchPolicy {
        max_batch: 100,
        max_delay: Duration::from_secs(60),
    });

    pipeline
        .requests
        .send(EvalRequest::new(vec![example(1.0), example(2.0), example(3.0)]))
        .await?;
    drop(pipeline.requests);

    pipeline.batcher.await??;
    let values = pipeline.worker.await??;
    assert_eq!(values["example_count"], 3.0);
    assert_eq!(values["mean_x"], 2.0);
    Ok(())
}

#[tokio::test]
async fn worker_stops_on_a_failed_batch() -> Result<()> {
    let pipeline = spawn_pipeline(BatchPolicy {
        max_batch: 1,
        max_delay: Duration::from_secs(60),
    });

    let bad = Example::builder()
        .single_prediction(Tensor::vector(&[1.0f32]))
        .single_label(Tensor::vector(&[0.0f32]))
        .build();
    let (req, ack) = EvalRequest::with_ack(vec![bad]);
    pipeline.requests.send(req).await?;

    assert!(ack.await.is_err(), "failed batches are not acknowledged");

    let err = match pipeline.worker.await? {
        Ok(values) => anyhow::bail!("worker should have failed, got {values:?}"),
        Err(err) => err,
    };
    let graph_err = err
        .downcast_ref::<EvalGraphError>()
        .ok_or_else(|| anyhow::anyhow!("unexpected error: {err:#}"))?;
    assert!(graph_err.is_structural());
    assert!(format!("{err:#}").contains("worker 0 failed to apply a batch of 1 examples"));

    drop(pipeline.requests);
    let _ = pipeline.batcher.await?;
    Ok(())
}
