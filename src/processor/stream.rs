//! Stream orchestration.
//!
//! `BlockStreamer` turns the single-shot `BlockFetcher` into ordered block streams.
//! Every stream is one spawned producer task feeding a single-slot channel, so the
//! producer runs at most one block ahead of its consumer. Producers own their cursor
//! and only advance it after a block has been handed to the channel; failed or empty
//! fetches are retried at the same cursor until they succeed or the stream is
//! cancelled. Each stream carries a child of the streamer's root cancellation token,
//! checked at every sleep and every send.

use super::backoff::{retry_with_backoff, sleep_with_cancellation, RetryBackoff};
use super::fetcher::BlockFetcher;
use crate::chain::{Account, Block};
use crate::rpc::client::{HiveRpcClient, RpcTransport};
use crate::rpc::error::RpcError;
use crate::rpc::retry::{RetryContext, GET_BLOCK_RANGE_RETRY, STREAM_BLOCK_RETRY};
use crate::runtime::config::StreamConfig;
use crate::runtime::progress::ProgressTracker;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct BlockStreamer {
    fetcher: BlockFetcher,
    config: StreamConfig,
    telemetry: Arc<Telemetry>,
    shutdown_root: CancellationToken,
}

impl BlockStreamer {
    /// Creates a streamer talking to `config.rpc_url()` over HTTP.
    pub fn new(config: StreamConfig) -> Result<Self> {
        let client = HiveRpcClient::from_config(&config)?;
        Ok(Self::with_transport(config, Arc::new(client)))
    }

    pub fn with_transport(config: StreamConfig, transport: Arc<dyn RpcTransport>) -> Self {
        Self::with_cancellation_token(config, transport, CancellationToken::new())
    }

    /// Creates a streamer whose streams all stop once `shutdown_token` is cancelled.
    pub fn with_cancellation_token(
        config: StreamConfig,
        transport: Arc<dyn RpcTransport>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            fetcher: BlockFetcher::new(transport),
            config,
            telemetry: Arc::new(Telemetry::default()),
            shutdown_root: shutdown_token,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &BlockFetcher {
        &self.fetcher
    }

    /// Returns a clone of the telemetry handle shared by all streams of this streamer.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Fetches one block without retrying. `Ok(None)` means the block does not exist yet.
    pub async fn get_block(&self, block_num: u64) -> Result<Option<Block>> {
        self.fetcher.fetch_block(block_num).await
    }

    /// Fetches several blocks in one batched round trip, in `block_nums` order.
    pub async fn get_blocks(&self, block_nums: &[u64]) -> Result<Vec<Option<Block>>> {
        self.fetcher.fetch_blocks(block_nums).await
    }

    pub async fn get_accounts<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Account>> {
        self.fetcher.get_accounts(names).await
    }

    /// Streams blocks `start .. start + count` in order, then closes the stream.
    ///
    /// Returns immediately; retrieval happens on a spawned task.
    pub fn get_block_range(&self, start: u64, count: u64) -> Result<BlockStream> {
        let end = start
            .checked_add(count)
            .with_context(|| format!("block range {start} + {count} overflows"))?;

        tracing::info!(start_block = start, end_block = end, "starting block range stream");
        Ok(self.launch(move |producer| producer.run_range(start, end)))
    }

    /// Streams blocks forever, starting at the node's current head block.
    ///
    /// The head lookup happens before the stream exists; its failure is returned here
    /// and no task is spawned.
    pub async fn stream_blocks(&self) -> Result<BlockStream> {
        let head = self
            .fetcher
            .head_block_number()
            .await
            .context("failed to initialize block stream")?;
        Ok(self.stream_blocks_from(head))
    }

    /// Streams blocks forever, starting at `start`.
    pub fn stream_blocks_from(&self, start: u64) -> BlockStream {
        tracing::info!(start_block = start, "starting live block stream");
        self.launch(move |producer| producer.run_tail(start))
    }

    fn launch<F, Fut>(&self, run: F) -> BlockStream
    where
        F: FnOnce(Producer) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let token = self.shutdown_root.child_token();
        let producer = Producer {
            fetcher: self.fetcher.clone(),
            config: self.config.clone(),
            telemetry: self.telemetry.clone(),
            tx,
            token: token.clone(),
        };
        let handle = tokio::spawn(run(producer));

        BlockStream {
            rx,
            token,
            handle: Some(handle),
            progress: ProgressTracker::new(),
        }
    }
}

/// Receiving side of one block stream.
///
/// Dropping the handle cancels the producer. Blocks arrive strictly in order, without
/// gaps or duplicates; `None` from [`BlockStream::recv`] means the stream finished
/// (range exhausted) or was cancelled.
pub struct BlockStream {
    rx: mpsc::Receiver<Block>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    progress: ProgressTracker,
}

impl BlockStream {
    pub async fn recv(&mut self) -> Option<Block> {
        let block = self.rx.recv().await?;
        self.progress.mark_delivered(block.block_number);
        Some(block)
    }

    /// Stops the producer. Blocks already buffered can still be received.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Number of the last block taken out of this stream by the consumer.
    pub fn last_delivered(&self) -> Option<u64> {
        self.progress.last_delivered()
    }

    /// Where a replacement stream should start to continue this one without gaps.
    pub fn resume_from(&self) -> Option<u64> {
        self.progress.resume_from()
    }

    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Cancels the producer and waits for its task to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.context("block stream task panicked")?;
        }
        Ok(())
    }
}

impl Stream for BlockStream {
    type Item = Block;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Block>> {
        let this = self.get_mut();
        let polled = this.rx.poll_recv(cx);
        if let Poll::Ready(Some(block)) = &polled {
            this.progress.mark_delivered(block.block_number);
        }
        polled
    }
}

impl Drop for BlockStream {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct Producer {
    fetcher: BlockFetcher,
    config: StreamConfig,
    telemetry: Arc<Telemetry>,
    tx: mpsc::Sender<Block>,
    token: CancellationToken,
}

impl Producer {
    /// Fetches `start .. end` in windows of at most `max_range_window` blocks.
    ///
    /// A round trip that returns no blocks is treated as a failure: it is retried after
    /// the failure backoff and counted as a retry, rather than being paced like a
    /// successful round trip.
    async fn run_range(self, start: u64, end: u64) {
        let window = u64::from(self.config.max_range_window());
        let mut cursor = start;

        while cursor < end {
            let remaining = end - cursor;
            let count = remaining.min(window) as u32;
            let ctx = RetryContext::with_blocks(&GET_BLOCK_RANGE_RETRY, cursor, u64::from(count));
            let fetcher = &self.fetcher;

            let fetched = retry_with_backoff(
                self.backoff(),
                move |_| async move {
                    let blocks = fetcher.fetch_range(cursor, count).await?;
                    if blocks.is_empty() {
                        return Err(RpcError::EmptyResult { block_num: cursor }.into());
                    }
                    Ok::<_, anyhow::Error>(blocks)
                },
                |attempt, backoff, err| self.on_retry(&ctx, attempt, backoff, err),
            )
            .await;

            let blocks = match fetched {
                Ok(blocks) => blocks,
                Err(_) => {
                    ctx.log_cancelled();
                    return;
                }
            };

            let deliverable = usize::try_from(remaining).unwrap_or(usize::MAX);
            for block in blocks.into_iter().take(deliverable) {
                if !self.deliver(block).await {
                    return;
                }
                cursor += 1;
            }

            if cursor < end && !self.pace().await {
                return;
            }
        }

        tracing::info!(end_block = end, "block range stream complete");
    }

    async fn run_tail(self, start: u64) {
        let mut cursor = start;

        loop {
            let ctx = RetryContext::with_blocks(&STREAM_BLOCK_RETRY, cursor, 1);
            let fetcher = &self.fetcher;

            let fetched = retry_with_backoff(
                self.backoff(),
                move |_| async move {
                    let block = fetcher.fetch_block(cursor).await?;
                    block.ok_or_else(|| anyhow::Error::from(RpcError::EmptyResult { block_num: cursor }))
                },
                |attempt, backoff, err| self.on_retry(&ctx, attempt, backoff, err),
            )
            .await;

            let block = match fetched {
                Ok(block) => block,
                Err(_) => {
                    ctx.log_cancelled();
                    return;
                }
            };

            if !self.deliver(block).await {
                return;
            }
            cursor = cursor.saturating_add(1);

            if !self.pace().await {
                return;
            }
        }
    }

    fn backoff(&self) -> RetryBackoff<'_> {
        RetryBackoff::new(self.config.failure_backoff(), self.config.max_backoff())
            .with_strategy(self.config.backoff_strategy())
            .with_cancellation(&self.token)
    }

    fn on_retry(
        &self,
        ctx: &RetryContext<'_>,
        attempt: usize,
        backoff: std::time::Duration,
        err: &anyhow::Error,
    ) {
        self.telemetry.record_retry();
        match err.downcast_ref::<RpcError>() {
            Some(RpcError::EmptyResult { .. }) => {
                self.telemetry.record_empty_result();
                ctx.log_empty(attempt, backoff);
                return;
            }
            Some(RpcError::Timeout { .. }) => self.telemetry.record_rpc_timeout(),
            _ => self.telemetry.record_rpc_error(),
        }
        ctx.log_retry(attempt, backoff, err);
    }

    /// Hands `block` to the consumer. Returns `false` once the stream is cancelled or
    /// its receiver is gone; the producer must stop in both cases.
    async fn deliver(&self, block: Block) -> bool {
        let block_num = block.block_number;
        let sent = tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            result = self.tx.send(block) => result.is_ok(),
        };

        if sent {
            self.telemetry.record_delivered_block();
            tracing::trace!(block_num, "block delivered");
        } else {
            tracing::debug!(block_num, "block stream closed by consumer");
        }
        sent
    }

    async fn pace(&self) -> bool {
        sleep_with_cancellation(self.config.request_pace(), Some(&self.token))
            .await
            .is_ok()
    }
}
