//! JSON-RPC plumbing: transport trait and HTTP client, query builders, response
//! decoding, error classification, metrics, and retry logging.

pub mod client;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod options;
pub mod query;
pub mod retry;

pub use client::{HiveRpcClient, RpcTransport};
pub use error::RpcError;
pub use metrics::RpcMetricsSnapshot;
pub use options::RpcClientOptions;
pub use query::Query;
