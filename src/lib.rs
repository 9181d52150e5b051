pub mod chain;
pub mod processor;
pub mod rpc;
pub mod runtime;

pub use chain::{
    block_num_from_id, Account, Block, DynamicGlobalProperties, Operation, OperationKind,
    Transaction, TypedOperation,
};
pub use processor::backoff::RetryCancelled;
pub use processor::fetcher::BlockFetcher;
pub use processor::stream::{BlockStream, BlockStreamer};
pub use rpc::{HiveRpcClient, Query, RpcClientOptions, RpcError, RpcMetricsSnapshot, RpcTransport};
pub use runtime::config::{BackoffStrategy, StreamConfig, StreamConfigBuilder, StreamConfigParams};
pub use runtime::telemetry::{init_tracing, spawn_metrics_reporter, Telemetry, TelemetrySnapshot};
