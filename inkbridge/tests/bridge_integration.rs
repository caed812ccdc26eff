//! Integration tests for the full bridge stack.
//!
//! These tests verify the complete host → worker flows:
//! - Startup handshake and readiness
//! - Compile → render end-to-end, built-in and external layout paths
//! - Encode/decode roundtrips, including empty and non-ASCII input
//! - Failure isolation (a failed call leaves the worker usable)
//! - Exactly-one-response under a burst of concurrent callers
//! - Both deployment environments (shared runtime and dedicated thread)
//!
//! Run with: `cargo test --test bridge_integration`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use inkbridge::compute::{pack_artifact, EdgeListCompute, RegistryLoader};
use inkbridge::config::{BridgeConfig, LayoutPolicy};
use inkbridge::error::CallError;
use inkbridge::host::WorkerHandle;
use inkbridge::layout::{GridLayoutEngine, LayoutEngine, LayoutError, LayoutFuture};
use inkbridge::platform::Platform;
use inkbridge::protocol::{LayoutChoice, RenderOptions};

// ============================================================================
// Test Helpers
// ============================================================================

fn reference_platform() -> Platform {
    Platform::in_runtime(Arc::new(RegistryLoader::with_reference_module()))
}

fn reference_artifact() -> Vec<u8> {
    pack_artifact(EdgeListCompute::MODULE_NAME, b"")
}

/// Spawn a ready worker with the reference module and no external engine.
async fn spawn_builtin() -> WorkerHandle {
    let handle = WorkerHandle::spawn(
        BridgeConfig::default(),
        &reference_platform(),
        reference_artifact(),
        None,
    )
    .expect("spawn failed");
    handle.ready().await.expect("worker not ready");
    handle
}

/// Spawn a ready worker with the reference module and a grid engine.
async fn spawn_with_engine(engine: Arc<dyn LayoutEngine>) -> WorkerHandle {
    let handle = WorkerHandle::spawn(
        BridgeConfig::default(),
        &reference_platform(),
        reference_artifact(),
        Some(engine),
    )
    .expect("spawn failed");
    handle.ready().await.expect("worker not ready");
    handle
}

/// Engine wrapper that counts layout invocations.
struct CountingEngine {
    inner: GridLayoutEngine,
    layouts: AtomicUsize,
}

impl CountingEngine {
    fn new() -> Self {
        Self {
            inner: GridLayoutEngine::new(),
            layouts: AtomicUsize::new(0),
        }
    }
}

impl LayoutEngine for CountingEngine {
    fn name(&self) -> &str {
        "counting-grid"
    }

    fn layout(&self, graph: Value) -> LayoutFuture<'_> {
        self.layouts.fetch_add(1, Ordering::SeqCst);
        self.inner.layout(graph)
    }
}

/// Engine whose initialization always fails.
struct BrokenEngine;

impl LayoutEngine for BrokenEngine {
    fn name(&self) -> &str {
        "broken"
    }

    fn initialize(&self) -> Result<(), LayoutError> {
        Err(LayoutError::new("engine refused to start"))
    }

    fn layout(&self, graph: Value) -> LayoutFuture<'_> {
        Box::pin(async move { Ok(graph) })
    }
}

// ============================================================================
// Compile and Render
// ============================================================================

#[tokio::test]
async fn test_compile_and_render_end_to_end() {
    let handle = spawn_builtin().await;

    let diagram = handle
        .compile_source("x -> y\ny -> z", RenderOptions::default())
        .await
        .unwrap();
    assert_eq!(diagram["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(diagram["edges"].as_array().unwrap().len(), 2);

    let svg = handle
        .render(diagram, RenderOptions::default())
        .await
        .unwrap();
    assert!(svg.starts_with("<svg"));
    assert!(svg.ends_with("</svg>"));
    assert!(svg.contains(">x</text>"));
}

#[tokio::test]
async fn test_render_applies_sketch_option() {
    let handle = spawn_builtin().await;

    let diagram = handle
        .compile_source("solo", RenderOptions::default())
        .await
        .unwrap();
    let options = RenderOptions {
        sketch: true,
        ..RenderOptions::default()
    };
    let svg = handle.render(diagram, options).await.unwrap();

    assert!(svg.contains(r#"class="sketch""#));
}

#[tokio::test]
async fn test_compile_without_engine_uses_builtin_positions() {
    let handle = spawn_builtin().await;

    let diagram = handle
        .compile_source("a -> b", RenderOptions::default())
        .await
        .unwrap();
    let nodes = diagram["nodes"].as_array().unwrap();

    // Built-in layout is a single row with a fixed horizontal spacing.
    assert_eq!(nodes[0]["x"].as_f64(), Some(0.0));
    assert_eq!(nodes[1]["x"].as_f64(), Some(160.0));
    assert_eq!(nodes[1]["y"].as_f64(), Some(0.0));
}

// ============================================================================
// External Layout Hand-off
// ============================================================================

#[tokio::test]
async fn test_compile_with_engine_uses_external_positions() {
    let handle = spawn_with_engine(Arc::new(GridLayoutEngine::with_grid(2, 500.0))).await;

    let diagram = handle
        .compile_source("a -> b\nb -> c", RenderOptions::default())
        .await
        .unwrap();
    let nodes = diagram["nodes"].as_array().unwrap();

    // Grid positions, not the built-in row.
    assert_eq!(nodes[1]["x"].as_f64(), Some(500.0));
    assert_eq!(nodes[2]["x"].as_f64(), Some(0.0));
    assert_eq!(nodes[2]["y"].as_f64(), Some(500.0));
}

#[tokio::test]
async fn test_handoff_runs_exactly_once_per_compile() {
    let engine = Arc::new(CountingEngine::new());
    let handle = spawn_with_engine(Arc::clone(&engine) as Arc<dyn LayoutEngine>).await;

    handle
        .compile_source("a -> b", RenderOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.layouts.load(Ordering::SeqCst), 1);

    // The hand-off cell is empty again; the next compile goes through a
    // fresh layout pass rather than stale positions.
    handle
        .compile_source("c -> d", RenderOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.layouts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_builtin_only_policy_skips_the_engine() {
    let engine = Arc::new(CountingEngine::new());
    let config = BridgeConfig {
        layout_policy: LayoutPolicy::BuiltinOnly,
        ..BridgeConfig::default()
    };
    let handle = WorkerHandle::spawn(
        config,
        &reference_platform(),
        reference_artifact(),
        Some(Arc::clone(&engine) as Arc<dyn LayoutEngine>),
    )
    .unwrap();

    handle
        .compile_source("a -> b", RenderOptions::default())
        .await
        .unwrap();
    assert_eq!(engine.layouts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_explicit_external_request_without_engine_fails() {
    let handle = spawn_builtin().await;

    let options = RenderOptions {
        layout: Some(LayoutChoice::External),
        ..RenderOptions::default()
    };
    let error = handle.compile_source("a -> b", options).await.unwrap_err();

    assert!(matches!(error, CallError::Failed(_)));
    // The worker is still usable afterwards.
    handle
        .compile_source("a -> b", RenderOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failing_engine_initialization_fails_startup() {
    let handle = WorkerHandle::spawn(
        BridgeConfig::default(),
        &reference_platform(),
        reference_artifact(),
        Some(Arc::new(BrokenEngine)),
    )
    .unwrap();

    let error = handle.ready().await.unwrap_err();
    assert!(error.to_string().contains("engine refused to start"));
}

// ============================================================================
// Codec
// ============================================================================

#[tokio::test]
async fn test_codec_roundtrip() {
    let handle = spawn_builtin().await;

    for source in ["x -> y", "", "caffè -> 東京\n#note"] {
        let encoded = handle.encode(source).await.unwrap();
        let decoded = handle.decode(&encoded).await.unwrap();
        assert_eq!(decoded, source);
    }
}

#[tokio::test]
async fn test_invalid_decode_fails_without_killing_the_worker() {
    let handle = spawn_builtin().await;

    let error = handle.decode("not-valid-base64!!!").await.unwrap_err();
    assert!(matches!(error, CallError::Failed(_)));

    // The next call still succeeds.
    let encoded = handle.encode("still alive").await.unwrap();
    assert_eq!(handle.decode(&encoded).await.unwrap(), "still alive");
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[tokio::test]
async fn test_compile_error_is_reported_and_worker_survives() {
    let handle = spawn_builtin().await;

    let error = handle
        .compile_source("bad -> -> syntax", RenderOptions::default())
        .await
        .unwrap_err();
    match error {
        CallError::Failed(message) => assert!(message.contains("empty node name")),
        other => panic!("expected a reported failure, got {other:?}"),
    }

    handle
        .compile_source("a -> b", RenderOptions::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_version_reports_the_loaded_module() {
    let handle = spawn_builtin().await;

    let descriptor = handle.version().await.unwrap();
    assert_eq!(descriptor["module"], EdgeListCompute::MODULE_NAME);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_callers_each_get_exactly_one_answer() {
    let handle = spawn_builtin().await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let clone = handle.clone();
        tasks.push(tokio::spawn(async move {
            let source = format!("n{i} -> m{i}");
            let encoded = clone.encode(&source).await.unwrap();
            let decoded = clone.decode(&encoded).await.unwrap();
            assert_eq!(decoded, source);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_call_before_ready_waits_for_the_handshake() {
    let handle = WorkerHandle::spawn(
        BridgeConfig::default(),
        &reference_platform(),
        reference_artifact(),
        None,
    )
    .unwrap();

    // No explicit ready() call; the first operation waits internally.
    let descriptor = handle.version().await.unwrap();
    assert_eq!(descriptor["module"], "edgelist");
}

// ============================================================================
// Deployment Environments
// ============================================================================

#[tokio::test]
async fn test_dedicated_thread_worker_end_to_end() {
    let platform = Platform::dedicated_thread(Arc::new(RegistryLoader::with_reference_module()));
    let handle = WorkerHandle::spawn(
        BridgeConfig::default(),
        &platform,
        reference_artifact(),
        Some(Arc::new(GridLayoutEngine::new())),
    )
    .unwrap();

    let diagram = handle
        .compile_source("a -> b", RenderOptions::default())
        .await
        .unwrap();
    let svg = handle
        .render(diagram, RenderOptions::default())
        .await
        .unwrap();
    assert!(svg.starts_with("<svg"));

    handle.close();
}
