mod cli;

use std::time::Duration;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use evalport_core::{
    Bucket, DType, Example, FeedDescriptor, FeedKey, InputSpec, SparseTensor, Tensor,
};
use evalport_engine_cpu::{callbacks, Callback, CpuEngine};
use evalport_runtime::{make_construct_fn, BatchPolicy, Batcher, EvalRequest, UpdateWorker};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const TAG_VOCAB: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            examples,
            batch_size,
            max_delay_ms,
            log,
            discover,
            fail_dtype,
        } => {
            let filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&log))
                .with_context(|| format!("invalid log filter: {log}"))?;
            tracing_subscriber::fmt().with_env_filter(filter).init();

            ensure!(batch_size > 0, "--batch-size must be at least 1");
            let policy = BatchPolicy {
                max_batch: batch_size,
                max_delay: Duration::from_millis(max_delay_ms),
            };
            run(examples, policy, discover, fail_dtype).await
        }
    }
}

async fn run(count: usize, policy: BatchPolicy, discover: bool, fail_dtype: bool) -> Result<()> {
    let descriptor = (!discover).then(synthetic_descriptor);
    let construct_fn = make_construct_fn(CpuEngine::new, metric_callbacks(), descriptor);
    let graph = construct_fn
        .construct(|secs| info!(load_seconds = secs, "evaluation graph ready"))
        .context("failed to construct evaluation graph")?;

    // ---- Channels: requests -> batcher -> update worker
    let (batcher_tx, batcher_rx) = mpsc::channel(1024);
    let (w_tx, w_rx) = mpsc::channel(16);

    let batcher = Batcher::new(policy, batcher_rx, w_tx);
    let worker = UpdateWorker {
        id: 0,
        inbox: w_rx,
        model: Box::new(graph),
    };

    let batcher = tokio::spawn(async move {
        if let Err(e) = batcher.run().await {
            tracing::error!(error = ?e, "batcher exited");
        }
    });
    let worker = tokio::spawn(worker.run());

    let mut acks = Vec::with_capacity(count);
    for i in 0..count {
        let (req, ack) = EvalRequest::with_ack(vec![synthetic_example(i, fail_dtype)?]);
        if batcher_tx.send(req).await.is_err() {
            break;
        }
        acks.push(ack);
    }
    drop(batcher_tx);

    let values = worker.await.context("update worker panicked")??;
    batcher.await.context("batcher panicked")?;

    let mut queued_us = 0u64;
    let mut acked = 0u64;
    for ack in acks {
        if let Ok(ack) = ack.await {
            queued_us += ack.timings.queued_us;
            acked += 1;
        }
    }
    debug!(acked, mean_queued_us = queued_us / acked.max(1), "requests acknowledged");

    for (name, value) in &values {
        println!("{name}: {value:.6}");
    }
    Ok(())
}

fn synthetic_descriptor() -> FeedDescriptor {
    FeedDescriptor::builder()
        .feature("age", InputSpec::dense(DType::F32))
        .feature("tags", InputSpec::sparse(DType::I64))
        .single_prediction(InputSpec::dense(DType::F32))
        .single_label(InputSpec::dense(DType::F32))
        .build()
}

fn metric_callbacks() -> Vec<Callback> {
    vec![
        callbacks::example_count("example_count", Bucket::Labels, FeedKey::Unnamed),
        callbacks::mean("mean_age", Bucket::Features, FeedKey::named("age")),
        callbacks::mean("mean_label", Bucket::Labels, FeedKey::Unnamed),
        callbacks::mean_squared_error("mse", FeedKey::Unnamed, FeedKey::Unnamed),
        callbacks::sparse_value_count("tag_count", Bucket::Features, FeedKey::named("tags")),
    ]
}

/// One row per example. Every third example is labelled 1; predictions sit
/// up to 0.4 above half the label.
fn synthetic_example(i: usize, fail_dtype: bool) -> Result<Example> {
    let age = 18.0 + (i % 60) as f32;
    let label = if i % 3 == 0 { 1.0f32 } else { 0.0 };
    let prediction = 0.5 * label + (i % 5) as f32 * 0.1;

    let tag_count = 1 + i % 3;
    let indices: Vec<[usize; 2]> = (0..tag_count).map(|t| [0, (i + t) % TAG_VOCAB]).collect();
    let tag_ids: Vec<i64> = (0..tag_count).map(|t| ((i + t) % TAG_VOCAB) as i64).collect();
    let tags = SparseTensor::new(&indices, &tag_ids, &[1, TAG_VOCAB])?;

    let builder = Example::builder()
        .feature("age", Tensor::vector(&[age]))
        .feature("tags", tags)
        .single_label(Tensor::vector(&[label]));
    let builder = if fail_dtype {
        builder.single_prediction(Tensor::vector(&[i as i32]))
    } else {
        builder.single_prediction(Tensor::vector(&[prediction]))
    };
    Ok(builder.build())
}
