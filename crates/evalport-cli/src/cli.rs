use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "evalport", version, about = "Model agnostic metrics evaluation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a synthetic evaluation through the batching pipeline
    Run {
        /// Number of synthetic examples to submit
        #[arg(long, default_value_t = 1000)]
        examples: usize,

        /// Flush a batch once this many examples are pending
        #[arg(long, default_value_t = 100)]
        batch_size: usize,

        /// Flush a partial batch after this many milliseconds
        #[arg(long, default_value_t = 5)]
        max_delay_ms: u64,

        /// Log level, used when RUST_LOG is unset
        #[arg(long, default_value = "info")]
        log: String,

        /// Discover the feed structure from the first example
        #[arg(long)]
        discover: bool,

        /// Feed integer predictions to show how a failed update is reported
        #[arg(long)]
        fail_dtype: bool,
    },
}
