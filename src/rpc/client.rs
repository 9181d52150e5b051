//! RPC client implementation and the transport abstraction consumed by the
//! block fetchers. Houses `HiveRpcClient` (JSON-RPC over HTTP via `jsonrpsee`)
//! and the `RpcTransport` trait the rest of the crate is written against.

use crate::rpc::error::RpcError;
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::query::Query;
use crate::runtime::config::StreamConfig;
use anyhow::{anyhow, Context, Result};
use futures::future::{try_join_all, BoxFuture};
use jsonrpsee::core::{
    client::{ClientT, Error as JsonRpcError},
    http_helpers::HttpError,
    params::BatchRequestBuilder,
    traits::ToRpcParams,
};
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::types::ErrorObject;
use serde_json::value::RawValue;
use serde_json::Value;
use std::{future::Future, sync::Arc};
use tokio::time::{timeout, Instant};

/// Executes queries against a node.
///
/// `execute_batch` must return one result per query, in query order. Decoders rely on
/// that ordering as the only way to match results to requests.
pub trait RpcTransport: Send + Sync {
    fn execute<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, Result<Value>>;

    fn execute_batch<'a>(&'a self, queries: &'a [Query]) -> BoxFuture<'a, Result<Vec<Value>>>;
}

#[derive(Debug, Clone)]
pub struct HiveRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
}

impl RpcTransport for HiveRpcClient {
    fn execute<'a>(&'a self, query: &'a Query) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.call(query))
    }

    fn execute_batch<'a>(&'a self, queries: &'a [Query]) -> BoxFuture<'a, Result<Vec<Value>>> {
        Box::pin(self.call_batch(queries))
    }
}

impl HiveRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, RpcClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: RpcClientOptions) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
        })
    }

    pub fn from_config(config: &StreamConfig) -> Result<Self> {
        config.validate()?;
        Self::with_options(config.rpc_url().to_owned(), config.rpc_client_options())
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn options(&self) -> &RpcClientOptions {
        &self.options
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Sends one query as a plain (non-batched) JSON-RPC request.
    pub async fn call(&self, query: &Query) -> Result<Value> {
        let method = query.method;
        self.instrumented(method, 1, async {
            timeout(
                self.options.request_timeout,
                self.client
                    .request::<Value, _>(method, QueryParams(&query.params)),
            )
            .await
            .map_err(|_| RpcError::Timeout { method })?
            .map_err(|err| map_rpc_error(method, err))
        })
        .await
    }

    /// Sends queries as JSON-RPC batches of at most `max_batch_size` entries. Chunks run
    /// concurrently (bounded by the HTTP client's connection limit) and their results are
    /// concatenated in query order.
    pub async fn call_batch(&self, queries: &[Query]) -> Result<Vec<Value>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = self.options.max_batch_size.max(1);
        let chunks = queries
            .chunks(chunk_size)
            .map(|chunk| self.execute_chunk(chunk));
        let results = try_join_all(chunks).await?;

        Ok(results.into_iter().flatten().collect())
    }

    async fn execute_chunk(&self, queries: &[Query]) -> Result<Vec<Value>> {
        let label = queries.first().map(|query| query.method).unwrap_or("batch");
        let mut batch = BatchRequestBuilder::new();

        for query in queries {
            batch
                .insert(query.method, QueryParams(&query.params))
                .with_context(|| format!("failed to serialize {} params", query.method))?;
        }

        self.instrumented(label, queries.len(), async {
            let response = timeout(
                self.options.request_timeout,
                self.client.batch_request::<Value>(batch),
            )
            .await
            .map_err(|_| RpcError::Timeout { method: label })?
            .map_err(|err| map_rpc_error(label, err))?;

            let mut values = Vec::with_capacity(response.len());
            for entry in response.into_iter() {
                match entry {
                    Ok(value) => values.push(value),
                    Err(err) => return Err(map_rpc_batch_error(label, &err)),
                }
            }

            if values.len() != queries.len() {
                return Err(RpcError::decode(
                    label,
                    format!(
                        "batch returned {} results for {} queries",
                        values.len(),
                        queries.len()
                    ),
                )
                .into());
            }

            Ok(values)
        })
        .await
    }

    async fn instrumented<T, Fut>(&self, method: &'static str, queries: usize, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = call.await;
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => {
                self.metrics.record_success(queries, elapsed);
                tracing::debug!(
                    method,
                    queries,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "rpc call completed"
                );
            }
            Err(err) => {
                if matches!(err.downcast_ref::<RpcError>(), Some(RpcError::Timeout { .. })) {
                    self.metrics.record_timeout(queries, elapsed);
                } else {
                    self.metrics.record_failure(queries, elapsed);
                }
                tracing::debug!(method, queries, error = %err, "rpc call failed");
            }
        }

        result
    }
}

/// Adapts a query's JSON params to `jsonrpsee`'s parameter encoding. Object params
/// become named params, array params positional ones.
struct QueryParams<'a>(&'a Value);

impl ToRpcParams for QueryParams<'_> {
    fn to_rpc_params(self) -> Result<Option<Box<RawValue>>, serde_json::Error> {
        serde_json::value::to_raw_value(self.0).map(Some)
    }
}

fn map_rpc_error(label: &'static str, err: JsonRpcError) -> anyhow::Error {
    if response_too_large(&err) {
        return RpcError::ResponseTooLarge { method: label }.into();
    }
    match err {
        JsonRpcError::RequestTimeout => RpcError::Timeout { method: label }.into(),
        JsonRpcError::Call(object) => RpcError::Server {
            method: label,
            code: object.code(),
            message: object.message().to_owned(),
        }
        .into(),
        other => RpcError::Transport {
            method: label,
            reason: other.to_string(),
        }
        .into(),
    }
}

fn map_rpc_batch_error(label: &'static str, err: &ErrorObject<'_>) -> anyhow::Error {
    let message = match err.data() {
        Some(data) => format!("{}, data={}", err.message(), data.get()),
        None => err.message().to_owned(),
    };
    RpcError::Server {
        method: label,
        code: err.code(),
        message,
    }
    .into()
}

fn response_too_large(err: &JsonRpcError) -> bool {
    match err {
        JsonRpcError::Transport(inner) => {
            if let Some(transport_err) = inner.downcast_ref::<HttpTransportError>() {
                match transport_err {
                    HttpTransportError::Http(http_err) => matches!(http_err, HttpError::TooLarge),
                    HttpTransportError::RequestTooLarge => true,
                    _ => false,
                }
            } else {
                false
            }
        }
        _ => false,
    }
}
