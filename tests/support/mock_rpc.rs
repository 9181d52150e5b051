use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long graceful shutdown may wait on idle keep-alive connections.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Deterministic chain served by [`MockRpcServer`]: blocks `0..=head` exist and
/// every block carries one transaction with a vote and a custom_json operation.
#[derive(Clone, Default)]
pub struct MockChain {
    head: Arc<AtomicU64>,
    fail_next: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.head.store(head, Ordering::SeqCst);
        chain
    }

    pub fn head(&self) -> u64 {
        self.head.load(Ordering::SeqCst)
    }

    pub fn advance_head_by(&self, delta: u64) -> u64 {
        self.head.fetch_add(delta, Ordering::SeqCst) + delta
    }

    /// The next `count` HTTP requests are answered with `503 Service Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Every JSON-RPC call received, in arrival order (batches are flattened).
    pub fn calls(&self) -> Vec<Value> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .iter()
            .flat_map(|payload| match payload {
                Value::Array(calls) => calls.clone(),
                single => vec![single.clone()],
            })
            .collect()
    }

    /// Number of calls carried by each HTTP request, in arrival order.
    pub fn request_sizes(&self) -> Vec<usize> {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .iter()
            .map(|payload| payload.as_array().map(Vec::len).unwrap_or(1))
            .collect()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|call| call.get("method").and_then(Value::as_str) == Some(method))
            .collect()
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    fn record(&self, payload: &Value) {
        self.requests
            .lock()
            .expect("mock request log poisoned")
            .push(payload.clone());
    }
}

pub fn block_id(block_num: u64) -> String {
    format!("{block_num:08x}{}", "ab".repeat(16))
}

pub fn wire_block(block_num: u64) -> Value {
    json!({
        "block_id": block_id(block_num),
        "previous": block_id(block_num.saturating_sub(1)),
        "timestamp": "2016-03-24T16:05:00",
        "witness": format!("witness-{}", block_num % 21),
        "transaction_merkle_root": "0000000000000000000000000000000000000000",
        "transactions": [{
            "expiration": "2016-03-24T16:15:00",
            "extensions": [],
            "operations": [
                {
                    "type": "vote_operation",
                    "value": {
                        "voter": "alice",
                        "author": "bob",
                        "permlink": format!("post-{block_num}"),
                        "weight": 10000
                    }
                },
                {
                    "type": "custom_json_operation",
                    "value": {
                        "required_auths": [],
                        "required_posting_auths": ["alice"],
                        "id": "follow",
                        "json": "[\"follow\",{\"follower\":\"alice\",\"following\":\"bob\",\"what\":[\"blog\"]}]"
                    }
                }
            ],
            "ref_block_num": (block_num & 0xffff),
            "ref_block_prefix": 3_735_928_559u32,
            "signatures": ["1f00"]
        }],
        "extensions": [],
        "signing_key": "STM8GC13uCZbP44HzMLV6zPZGwVQ8Nt4Kji8PapsPiNq1BK153XTX",
        "transaction_ids": [format!("{block_num:040x}")],
        "witness_signature": "20"
    })
}

pub struct MockRpcServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRpcServer {
    pub async fn start(chain: MockChain) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock RPC listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let chain = chain.clone();
            async move { Ok::<_, Infallible>(service_fn(move |req| serve_request(chain.clone(), req))) }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock RPC server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stops the server. Connections still held open by a live client are cut off
    /// once [`SHUTDOWN_GRACE`] elapses.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.handle.take() {
            if timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

async fn serve_request(chain: MockChain, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("failed to read body: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("invalid JSON payload: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    chain.record(&payload);

    if chain.take_failure() {
        let mut response = Response::new(Body::from("node overloaded"));
        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
        return Ok(response);
    }

    let response_value = match payload {
        Value::Array(calls) => Value::Array(
            calls
                .into_iter()
                .map(|call| handle_call(&chain, call))
                .collect(),
        ),
        single => handle_call(&chain, single),
    };

    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(chain: &MockChain, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call.get("params").cloned().unwrap_or(Value::Null);
    let head = chain.head();

    match method.as_str() {
        "block_api.get_block" => match params.get("block_num").and_then(Value::as_u64) {
            Some(block_num) if block_num <= head => {
                success(id, json!({ "block": wire_block(block_num) }))
            }
            Some(_) => success(id, json!({})),
            None => error(id, -32602, "missing block_num"),
        },
        "block_api.get_block_range" => {
            let start = params.get("starting_block_num").and_then(Value::as_u64);
            let count = params.get("count").and_then(Value::as_u64);
            match (start, count) {
                (Some(start), Some(count)) => {
                    let blocks: Vec<Value> = (start..start.saturating_add(count))
                        .take_while(|block_num| *block_num <= head)
                        .map(wire_block)
                        .collect();
                    success(id, json!({ "blocks": blocks }))
                }
                _ => error(id, -32602, "missing starting_block_num or count"),
            }
        }
        "condenser_api.get_dynamic_global_properties" => success(
            id,
            json!({
                "head_block_number": head,
                "head_block_id": block_id(head),
                "time": "2016-03-24T16:05:00",
                "current_witness": "initminer",
                "last_irreversible_block_num": head.saturating_sub(20),
                "virtual_supply": "1000.000 HIVE"
            }),
        ),
        "condenser_api.get_accounts" => {
            let names = params
                .get(0)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let accounts: Vec<Value> = names
                .into_iter()
                .map(|name| json!({ "name": name, "balance": "1.000 HIVE", "post_count": 7 }))
                .collect();
            success(id, Value::Array(accounts))
        }
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
