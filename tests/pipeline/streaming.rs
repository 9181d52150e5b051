use std::time::Duration;

use crate::support::{
    helpers::{assert_is_contiguous, block_numbers, drain, fast_config, init_tracing, recv_blocks},
    mock_rpc::{block_id, MockChain, MockRpcServer},
};
use anyhow::Result;
use hivestream::{
    block_num_from_id, BlockStreamer, HiveRpcClient, OperationKind, Query, RpcError,
    TypedOperation,
};
use serde_json::{json, Value};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn range_stream_delivers_requested_blocks_over_http() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(3_000);
    let server = MockRpcServer::start(chain.clone()).await?;
    let streamer = BlockStreamer::new(fast_config(server.url()))?;

    let mut stream = streamer.get_block_range(1_000, 3)?;
    let blocks = drain(&mut stream, WAIT).await?;

    assert_eq!(block_numbers(&blocks), vec![1_000, 1_001, 1_002]);
    for block in &blocks {
        assert_eq!(block.block_id, block_id(block.block_number));
        assert_eq!(block_num_from_id(&block.block_id), Some(block.block_number));
    }

    let calls = chain.calls_to("block_api.get_block_range");
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0]["params"],
        json!({"starting_block_num": 1_000, "count": 3})
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocks_decode_operations_from_the_wire() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(100);
    let server = MockRpcServer::start(chain).await?;
    let streamer = BlockStreamer::new(fast_config(server.url()))?;

    let block = streamer.get_block(42).await?.expect("block 42 exists");
    assert_eq!(block.block_number, 42);
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(block.operation_count(), 2);

    let operations = &block.transactions[0].operations;
    assert_eq!(operations[0].kind, OperationKind::Vote);
    match operations[0].typed()? {
        Some(TypedOperation::Vote(vote)) => {
            assert_eq!(vote.voter, "alice");
            assert_eq!(vote.permlink, "post-42");
        }
        other => panic!("expected vote, got {other:?}"),
    }
    match operations[1].typed()? {
        Some(TypedOperation::CustomJson(custom)) => {
            assert_eq!(custom.id, "follow");
            assert_eq!(custom.payload()?[0], json!("follow"));
        }
        other => panic!("expected custom_json, got {other:?}"),
    }

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn http_failures_are_retried_without_gaps() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(500);
    chain.fail_next(2);
    let server = MockRpcServer::start(chain.clone()).await?;
    let streamer = BlockStreamer::new(fast_config(server.url()))?;

    let mut stream = streamer.get_block_range(10, 5)?;
    let blocks = drain(&mut stream, WAIT).await?;

    assert_eq!(block_numbers(&blocks), vec![10, 11, 12, 13, 14]);
    assert_eq!(chain.calls_to("block_api.get_block_range").len(), 3);

    let snapshot = streamer.telemetry().snapshot();
    assert_eq!(snapshot.retries, 2);
    assert_eq!(snapshot.rpc_errors, 2);
    assert_eq!(snapshot.delivered_blocks, 5);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn live_stream_follows_the_head() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(500);
    let server = MockRpcServer::start(chain.clone()).await?;
    let streamer = BlockStreamer::new(fast_config(server.url()))?;

    let mut stream = streamer.stream_blocks().await?;
    let first = recv_blocks(&mut stream, 1, WAIT).await?;
    assert_eq!(block_numbers(&first), vec![500]);

    chain.advance_head_by(3);
    let next = recv_blocks(&mut stream, 3, WAIT).await?;
    let mut all = block_numbers(&first);
    all.extend(block_numbers(&next));
    assert_eq!(all, vec![500, 501, 502, 503]);
    assert_is_contiguous(&all);
    assert_eq!(stream.last_delivered(), Some(503));

    stream.shutdown().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn live_stream_survives_node_outage() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(200);
    let server = MockRpcServer::start(chain.clone()).await?;
    let streamer = BlockStreamer::new(fast_config(server.url()))?;

    let mut stream = streamer.stream_blocks_from(190);
    let before = recv_blocks(&mut stream, 3, WAIT).await?;
    chain.fail_next(4);
    let after = recv_blocks(&mut stream, 5, WAIT).await?;

    let mut all = block_numbers(&before);
    all.extend(block_numbers(&after));
    assert_eq!(all, (190..198).collect::<Vec<_>>());
    assert!(streamer.telemetry().retries() >= 4);

    stream.shutdown().await?;
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stream_init_failure_is_returned_to_the_caller() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(10);
    chain.fail_next(1);
    let server = MockRpcServer::start(chain.clone()).await?;
    let streamer = BlockStreamer::new(fast_config(server.url()))?;

    let err = streamer.stream_blocks().await.err().expect("head lookup fails");
    assert!(format!("{err:#}").contains("failed to initialize block stream"));
    assert!(chain.calls_to("block_api.get_block").is_empty());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_fetches_report_missing_blocks() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(10);
    let server = MockRpcServer::start(chain.clone()).await?;
    let streamer = BlockStreamer::new(fast_config(server.url()))?;

    assert!(streamer.get_block(11).await?.is_none());
    let blocks = streamer.get_blocks(&[9, 11, 2]).await?;
    let numbers: Vec<Option<u64>> = blocks
        .iter()
        .map(|block| block.as_ref().map(|block| block.block_number))
        .collect();
    assert_eq!(numbers, vec![Some(9), None, Some(2)]);

    let accounts = streamer.get_accounts(&["alice"]).await?;
    assert_eq!(accounts[0].name, "alice");
    assert_eq!(accounts[0].field("post_count"), Some(&json!(7)));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn large_batches_are_split_and_rejoined_in_order() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    let server = MockRpcServer::start(chain.clone()).await?;
    let streamer = BlockStreamer::new(fast_config(server.url()))?;

    let requested: Vec<u64> = (0..10).map(|offset| 900 - offset * 7).collect();
    let blocks = streamer.get_blocks(&requested).await?;
    let numbers: Vec<u64> = blocks
        .iter()
        .map(|block| block.as_ref().expect("block exists").block_number)
        .collect();
    assert_eq!(numbers, requested);

    let mut sizes = chain.request_sizes();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 4, 4]);

    drop(streamer);
    timeout(WAIT, server.shutdown())
        .await
        .expect("mock server stops once the client is gone");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn client_classifies_node_errors() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(10);
    let server = MockRpcServer::start(chain.clone()).await?;
    let client = HiveRpcClient::from_config(&fast_config(server.url()))?;

    let err = client
        .call(&Query::new("condenser_api.get_witness_schedule", json!([])))
        .await
        .unwrap_err();
    match err.downcast_ref::<RpcError>() {
        Some(RpcError::Server { code, .. }) => assert_eq!(*code, -32601),
        other => panic!("expected server error, got {other:?}"),
    }

    chain.fail_next(1);
    let err = client
        .call(&hivestream::rpc::query::get_dynamic_global_properties())
        .await
        .unwrap_err();
    assert!(err
        .downcast_ref::<RpcError>()
        .is_some_and(RpcError::is_transport));

    let props: Value = client
        .call(&hivestream::rpc::query::get_dynamic_global_properties())
        .await?;
    assert_eq!(props["head_block_number"], json!(10));

    let metrics = client.metrics();
    assert_eq!(metrics.total_requests, 3);
    assert_eq!(metrics.total_errors, 2);

    server.shutdown().await;
    Ok(())
}
