use crate::rpc::options::{
    RpcClientOptions, DEFAULT_HTTP_BODY_LIMIT_BYTES, DEFAULT_REQUEST_TIMEOUT_SECS,
    MIN_MAX_BATCH_SIZE, MIN_MAX_CONCURRENT_REQUESTS,
};
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_MAX_RANGE_WINDOW: u32 = 1000;
const DEFAULT_FAILURE_BACKOFF_MS: u64 = 2500;
const DEFAULT_REQUEST_PACE_MS: u64 = 1000;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 30;

/// How the sleep between failed attempts evolves while a fetch keeps failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Always sleep `failure_backoff`.
    #[default]
    Fixed,
    /// Start at `failure_backoff` and double after each failure, capped at `max_backoff`.
    Exponential,
}

/// Runtime configuration shared by every stream a `BlockStreamer` spawns.
///
/// All instances must be constructed via [`StreamConfig::builder`] or [`StreamConfig::new`]
/// so invariants are validated before any consumer observes the values. Connection and
/// batch limits below the node-friendly minimums (10 connections, batches of 4) are raised
/// to those minimums rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    rpc_url: String,
    request_timeout: Duration,
    max_concurrent_requests: usize,
    max_batch_size: usize,
    max_range_window: u32,
    failure_backoff: Duration,
    request_pace: Duration,
    backoff_strategy: BackoffStrategy,
    max_backoff: Duration,
    metrics_interval: Duration,
    rpc_max_request_body_bytes: usize,
    rpc_max_response_body_bytes: usize,
}

pub struct StreamConfigParams {
    pub rpc_url: String,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub max_batch_size: usize,
    pub max_range_window: u32,
    pub failure_backoff: Duration,
    pub request_pace: Duration,
    pub backoff_strategy: BackoffStrategy,
    pub max_backoff: Duration,
    pub metrics_interval: Duration,
    pub rpc_max_request_body_bytes: usize,
    pub rpc_max_response_body_bytes: usize,
}

impl StreamConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`StreamConfig::builder`] when most values use defaults.
    pub fn new(params: StreamConfigParams) -> Result<Self> {
        let StreamConfigParams {
            rpc_url,
            request_timeout,
            max_concurrent_requests,
            max_batch_size,
            max_range_window,
            failure_backoff,
            request_pace,
            backoff_strategy,
            max_backoff,
            metrics_interval,
            rpc_max_request_body_bytes,
            rpc_max_response_body_bytes,
        } = params;

        let config = Self {
            rpc_url: rpc_url.trim().to_owned(),
            request_timeout,
            max_concurrent_requests: max_concurrent_requests.max(MIN_MAX_CONCURRENT_REQUESTS),
            max_batch_size: max_batch_size.max(MIN_MAX_BATCH_SIZE),
            max_range_window,
            failure_backoff,
            request_pace,
            backoff_strategy,
            max_backoff,
            metrics_interval,
            rpc_max_request_body_bytes,
            rpc_max_response_body_bytes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Full RPC URL (including scheme) of the node.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Maximum HTTP connections in flight at once.
    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }

    /// Maximum queries per JSON-RPC batch.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Largest `count` sent in a single `get_block_range` call.
    pub fn max_range_window(&self) -> u32 {
        self.max_range_window
    }

    /// Sleep after a failed or empty fetch before retrying the same block.
    pub fn failure_backoff(&self) -> Duration {
        self.failure_backoff
    }

    /// Sleep between successful round trips.
    pub fn request_pace(&self) -> Duration {
        self.request_pace
    }

    pub fn backoff_strategy(&self) -> BackoffStrategy {
        self.backoff_strategy
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn rpc_max_request_body_bytes(&self) -> usize {
        self.rpc_max_request_body_bytes
    }

    pub fn rpc_max_response_body_bytes(&self) -> usize {
        self.rpc_max_response_body_bytes
    }

    /// Options for the HTTP client derived from this configuration.
    pub fn rpc_client_options(&self) -> RpcClientOptions {
        RpcClientOptions {
            request_timeout: self.request_timeout,
            max_concurrent_requests: self.max_concurrent_requests,
            max_batch_size: self.max_batch_size,
            max_request_body_bytes: self.rpc_max_request_body_bytes,
            max_response_body_bytes: self.rpc_max_response_body_bytes,
        }
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.rpc_url)?;

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.max_range_window == 0 {
            bail!("max_range_window must be greater than 0");
        }

        if self.failure_backoff.is_zero() {
            bail!("failure_backoff must be greater than 0");
        }

        if self.max_backoff < self.failure_backoff {
            bail!(
                "max_backoff ({:?}) must not be shorter than failure_backoff ({:?})",
                self.max_backoff,
                self.failure_backoff
            );
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.rpc_max_request_body_bytes == 0 {
            bail!("rpc_max_request_body_bytes must be greater than 0");
        }

        if self.rpc_max_response_body_bytes == 0 {
            bail!("rpc_max_response_body_bytes must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct StreamConfigBuilder {
    rpc_url: Option<String>,
    request_timeout: Option<Duration>,
    max_concurrent_requests: Option<usize>,
    max_batch_size: Option<usize>,
    max_range_window: Option<u32>,
    failure_backoff: Option<Duration>,
    request_pace: Option<Duration>,
    backoff_strategy: Option<BackoffStrategy>,
    max_backoff: Option<Duration>,
    metrics_interval: Option<Duration>,
    rpc_max_request_body_bytes: Option<usize>,
    rpc_max_response_body_bytes: Option<usize>,
}

impl StreamConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn max_concurrent_requests(mut self, count: usize) -> Self {
        self.max_concurrent_requests = Some(count);
        self
    }

    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    pub fn max_range_window(mut self, window: u32) -> Self {
        self.max_range_window = Some(window);
        self
    }

    pub fn failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = Some(backoff);
        self
    }

    pub fn request_pace(mut self, pace: Duration) -> Self {
        self.request_pace = Some(pace);
        self
    }

    pub fn backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = Some(strategy);
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn rpc_max_request_body_bytes(mut self, bytes: usize) -> Self {
        self.rpc_max_request_body_bytes = Some(bytes);
        self
    }

    pub fn rpc_max_response_body_bytes(mut self, bytes: usize) -> Self {
        self.rpc_max_response_body_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<StreamConfig> {
        let params = StreamConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            max_concurrent_requests: self
                .max_concurrent_requests
                .unwrap_or(MIN_MAX_CONCURRENT_REQUESTS),
            max_batch_size: self.max_batch_size.unwrap_or(MIN_MAX_BATCH_SIZE),
            max_range_window: self.max_range_window.unwrap_or(DEFAULT_MAX_RANGE_WINDOW),
            failure_backoff: self
                .failure_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_FAILURE_BACKOFF_MS)),
            request_pace: self
                .request_pace
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_REQUEST_PACE_MS)),
            backoff_strategy: self.backoff_strategy.unwrap_or_default(),
            max_backoff: self
                .max_backoff
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            rpc_max_request_body_bytes: self
                .rpc_max_request_body_bytes
                .unwrap_or(DEFAULT_HTTP_BODY_LIMIT_BYTES),
            rpc_max_response_body_bytes: self
                .rpc_max_response_body_bytes
                .unwrap_or(DEFAULT_HTTP_BODY_LIMIT_BYTES),
        };

        StreamConfig::new(params)
    }
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("rpc_url must start with http:// or https://");
    }
    Ok(())
}
