use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use hivestream::{
    spawn_metrics_reporter, Block, BlockStream, BlockStreamer, HiveRpcClient, StreamConfig,
    StreamConfigBuilder,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio_util::sync::CancellationToken;

const DEFAULT_RPC_URL: &str = "https://api.hive.blog";
const DEFAULT_BATCH_SIZE: usize = 4;
const DEFAULT_MAX_CONNECTIONS: usize = 10;
const DEFAULT_BACKOFF_MS: u64 = 2_500;
const DEFAULT_PACE_MS: u64 = 1_000;
const DEFAULT_LOG_DIRECTIVE: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_example_tracing();

    let args = ExampleArgs::from_env()?;
    let config = args.to_stream_config()?;
    let shutdown = CancellationToken::new();
    let streamer = BlockStreamer::with_cancellation_token(
        config.clone(),
        Arc::new(HiveRpcClient::from_config(&config)?),
        shutdown.clone(),
    );
    let reporter = spawn_metrics_reporter(
        streamer.telemetry(),
        shutdown.clone(),
        config.metrics_interval(),
    );

    let spinner = build_spinner();
    let mut stream = match (args.start_block, args.count) {
        (Some(start), Some(count)) => {
            spinner.println(format!("Back-filling {count} blocks from {start}"));
            streamer.get_block_range(start, count)?
        }
        (Some(start), None) => {
            spinner.println(format!("Tailing blocks from {start}"));
            streamer.stream_blocks_from(start)
        }
        (None, _) => {
            spinner.println("Tailing blocks from the current head");
            streamer.stream_blocks().await?
        }
    };

    let started_at = Instant::now();
    let mut received = 0u64;
    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => "stopped by Ctrl-C",
        _ = consume(&mut stream, &spinner, &mut received) => "range complete",
    };

    spinner.finish_with_message(outcome);
    let resume_hint = stream.resume_from();
    shutdown.cancel();
    stream.shutdown().await?;
    let _ = reporter.await;

    let seconds = started_at.elapsed().as_secs_f64();
    let rate = if seconds > 0.0 {
        received as f64 / seconds
    } else {
        0.0
    };
    println!("Received {received} blocks in {seconds:.2}s [{rate:.2} blocks/s]");
    if let Some(next) = resume_hint {
        println!("Resume with HIVESTREAM_START_BLOCK={next}");
    }

    Ok(())
}

async fn consume(stream: &mut BlockStream, spinner: &ProgressBar, received: &mut u64) {
    while let Some(block) = stream.recv().await {
        *received += 1;
        spinner.set_position(*received);
        spinner.set_message(describe(&block));
    }
}

fn describe(block: &Block) -> String {
    format!(
        "#{} by {} ({} txs, {} ops)",
        block.block_number,
        block.witness,
        block.transactions.len(),
        block.operation_count()
    )
}

fn init_example_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    hivestream::init_tracing();
}

fn build_spinner() -> ProgressBar {
    let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout_with_hz(12));
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {pos} blocks ({per_sec:.2} blk/s) {msg}",
    )
    .expect("valid spinner template");
    spinner.set_style(style);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

struct ExampleArgs {
    rpc_url: String,
    start_block: Option<u64>,
    count: Option<u64>,
    batch_size: usize,
    max_connections: usize,
    backoff: Duration,
    pace: Duration,
}

impl ExampleArgs {
    fn from_env() -> Result<Self> {
        Ok(Self {
            rpc_url: read_env_or_default("HIVESTREAM_RPC_URL", DEFAULT_RPC_URL),
            start_block: parse_env_optional::<u64>("HIVESTREAM_START_BLOCK")?,
            count: parse_env_optional::<u64>("HIVESTREAM_COUNT")?,
            batch_size: parse_env_with_default("HIVESTREAM_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            max_connections: parse_env_with_default(
                "HIVESTREAM_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            backoff: Duration::from_millis(parse_env_with_default(
                "HIVESTREAM_BACKOFF_MS",
                DEFAULT_BACKOFF_MS,
            )?),
            pace: Duration::from_millis(parse_env_with_default(
                "HIVESTREAM_PACE_MS",
                DEFAULT_PACE_MS,
            )?),
        })
    }

    fn to_stream_config(&self) -> Result<StreamConfig> {
        StreamConfigBuilder::default()
            .rpc_url(self.rpc_url.clone())
            .max_batch_size(self.batch_size)
            .max_concurrent_requests(self.max_connections)
            .failure_backoff(self.backoff)
            .request_pace(self.pace)
            .build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env_optional<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_env_optional(key)?.unwrap_or(default))
}
