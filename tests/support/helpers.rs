use std::time::Duration;

use anyhow::{bail, Result};
use hivestream::{Block, BlockStream, StreamConfig};
use once_cell::sync::Lazy;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Config pointing at `url` with timings short enough for real-clock tests.
pub fn fast_config(url: &str) -> StreamConfig {
    StreamConfig::builder()
        .rpc_url(url)
        .request_timeout(Duration::from_secs(5))
        .failure_backoff(Duration::from_millis(50))
        .request_pace(Duration::from_millis(5))
        .build()
        .expect("fast config should build")
}

/// Receives exactly `count` blocks, failing if the stream stalls or closes early.
pub async fn recv_blocks(stream: &mut BlockStream, count: usize, wait: Duration) -> Result<Vec<Block>> {
    let mut blocks = Vec::with_capacity(count);
    while blocks.len() < count {
        match timeout(wait, stream.recv()).await {
            Ok(Some(block)) => blocks.push(block),
            Ok(None) => bail!("stream closed after {} of {count} blocks", blocks.len()),
            Err(_) => bail!(
                "stream stalled after {} of {count} blocks (waited {:?})",
                blocks.len(),
                wait
            ),
        }
    }
    Ok(blocks)
}

/// Drains a bounded stream until it closes.
pub async fn drain(stream: &mut BlockStream, wait: Duration) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();
    loop {
        match timeout(wait, stream.recv()).await {
            Ok(Some(block)) => blocks.push(block),
            Ok(None) => return Ok(blocks),
            Err(_) => bail!("stream did not close within {:?}", wait),
        }
    }
}

pub fn block_numbers(blocks: &[Block]) -> Vec<u64> {
    blocks.iter().map(|block| block.block_number).collect()
}

pub fn assert_is_contiguous(numbers: &[u64]) {
    for window in numbers.windows(2) {
        if let [lhs, rhs] = window {
            assert_eq!(rhs, &(lhs + 1), "block numbers must increase by one");
        }
    }
}
