//! Client and server interceptor pipelines, end to end.
//!
//! A scheduler handler runs behind a server pipeline (tracing, rate limit,
//! domain→wire translation). The client pipeline (tracing, wire→domain
//! translation, refresh) calls it through an in-memory transport, so every
//! failure crosses the wire as a status and comes back as a domain error.
//!
//! Run with: cargo run --bin pipeline-demo
//! Set RUST_LOG=rpc_interceptor=debug to see rejections and translations.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::{StreamExt, stream};
use rpc_interceptor::{
    BoxError, CallError, PipelineBuilder, PipelineConfig, Refresher, StreamDescriptor,
    StreamRequest, StreamResponse, UnaryFunc, UnaryRequest, UnaryResponse, stream_fn, unary_fn,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rpc_interceptor_core::{DomainError, ErrorKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVER_CONFIG: &str = r#"{
    "rate_limit": { "rate_per_second": 2.0, "burst": 3 }
}"#;

const CLIENT_CONFIG: &str = r#"{
    "refresh": { "trigger_codes": ["resource_exhausted", "unavailable"], "timeout_ms": 500 }
}"#;

// ============================================================================
// Server Handlers
// ============================================================================

/// Unary handler: knows about task 1, nothing else.
fn stat_task() -> UnaryFunc {
    unary_fn(|req: UnaryRequest| async move {
        match req.body.as_ref() {
            b"1" => Ok(UnaryResponse::new("task 1: running")),
            b"" => Err(CallError::from(DomainError::new(
                ErrorKind::InvalidArgument,
                "task id is required",
            ))),
            id => Err(CallError::from(
                DomainError::new(ErrorKind::NotFound, "task not found")
                    .with_payload(serde_json::json!({ "task_id": String::from_utf8_lossy(id) })),
            )),
        }
    })
}

// ============================================================================
// Demo Runner
// ============================================================================

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Sum a counter across all of its label sets.
fn counter_total(snapshotter: &Snapshotter, name: &str) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, ..)| key.key().name() == name)
        .map(|(.., value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .sum()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .map_err(|_| anyhow::anyhow!("a metrics recorder is already installed"))?;

    println!("=== RPC Interceptor Pipeline Demo ===");
    println!();

    let refreshes = Arc::new(AtomicUsize::new(0));
    let refresher: Arc<dyn Refresher> = {
        let refreshes = refreshes.clone();
        Arc::new(move || {
            refreshes.fetch_add(1, Ordering::SeqCst);
            async {
                tracing::info!("reloading scheduler endpoints");
                Ok::<(), BoxError>(())
            }
        })
    };

    let server = PipelineBuilder::server(&PipelineConfig::from_json(SERVER_CONFIG)?)?.build();
    let client =
        PipelineBuilder::client(&PipelineConfig::from_json(CLIENT_CONFIG)?, Some(refresher))?
            .build();
    println!(
        "Server pipeline: {} interceptors, client pipeline: {} interceptors",
        server.len(),
        client.len()
    );
    println!();

    let call = client.unary(server.unary(stat_task()));

    let mut passed = 0;
    let mut failed = 0;

    // ========================================================================
    // Test 1: Successful unary call
    // ========================================================================
    println!("Test 1: Successful unary call...");
    match call(UnaryRequest::new("scheduler.v1.Scheduler/StatTask", "1")).await {
        Ok(response) => {
            println!("  PASS: {}", String::from_utf8_lossy(&response.body));
            passed += 1;
        }
        Err(e) => {
            println!("  FAIL: {}", e);
            failed += 1;
        }
    }

    // ========================================================================
    // Test 2: Domain error survives the round trip
    // ========================================================================
    println!("Test 2: Domain error survives the round trip...");
    match call(UnaryRequest::new("scheduler.v1.Scheduler/StatTask", "42")).await {
        Err(CallError::Domain(err)) if err.kind() == ErrorKind::NotFound => {
            println!("  PASS: {} (payload: {:?})", err, err.payload());
            passed += 1;
        }
        other => {
            println!("  FAIL: unexpected result {:?}", other);
            failed += 1;
        }
    }

    // ========================================================================
    // Test 3: Rate limit rejects, client refreshes
    // ========================================================================
    println!("Test 3: Rate limit rejects, client refreshes...");
    let before = refreshes.load(Ordering::SeqCst);
    let mut result = Ok(UnaryResponse::new(""));
    // Burst is 3 and two tokens are spent, so this is rejected by the second try
    for _ in 0..3 {
        result = call(UnaryRequest::new("scheduler.v1.Scheduler/StatTask", "1")).await;
        if result.is_err() {
            break;
        }
    }
    match result {
        Err(CallError::Domain(err)) if err.kind() == ErrorKind::ResourceExhausted => {
            println!(
                "  PASS: {} (refreshes triggered: {})",
                err,
                refreshes.load(Ordering::SeqCst) - before
            );
            passed += 1;
        }
        other => {
            println!("  FAIL: expected resource_exhausted, got {:?}", other);
            failed += 1;
        }
    }

    // ========================================================================
    // Test 4: Bidi stream after the bucket refills
    // ========================================================================
    println!("Test 4: Bidi stream after the bucket refills...");
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;

    let echo = stream_fn(|req: StreamRequest| async move {
        Ok(StreamResponse::new(req.messages.map(Ok).boxed()))
    });
    let open = client.streaming(server.streaming(echo));
    let messages = stream::iter(vec![Bytes::from("hello"), Bytes::from("world")]).boxed();
    match open(StreamRequest::new(
        "scheduler.v1.Scheduler/SyncPeers",
        StreamDescriptor::bidi(),
        messages,
    ))
    .await
    {
        Ok(response) => {
            let echoed: Vec<_> = response.messages.collect().await;
            println!("  PASS: received {} messages", echoed.len());
            passed += 1;
        }
        Err(e) => {
            println!("  FAIL: {}", e);
            failed += 1;
        }
    }

    println!();
    println!(
        "Traced {} calls ({} failed) across both pipelines",
        counter_total(&snapshotter, "rpc_calls_started_total"),
        counter_total(&snapshotter, "rpc_calls_failed_total")
    );
    println!("=== Results: {} passed, {} failed ===", passed, failed);

    if failed > 0 {
        Err(anyhow::anyhow!("{} tests failed", failed))
    } else {
        Ok(())
    }
}
