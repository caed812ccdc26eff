//! Worker runtime: owns the compute module and dispatches requests.
//!
//! The [`WorkerRuntime`] is the long-lived loop on the worker side of the
//! bridge. It receives [`Request`]s from its channel, dispatches each by
//! kind to the matching handler, and sends back exactly one [`Response`]
//! per request.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                        WorkerRuntime                           │
//! │                                                                │
//! │  Request ──► dispatch by kind                                  │
//! │                │                                               │
//! │                ├─ init ────► ModuleLoader ─► ComputeUnit       │
//! │                │             LayoutEngine::initialize()       │
//! │                │                                               │
//! │                ├─ compile ─► layout_graph ─► LayoutEngine ──┐  │
//! │                │                 (external path only)        │  │
//! │                │             HandoffCell ◄──────────────────┘  │
//! │                │                 │                             │
//! │                │             compile(json + layout) ─► doc    │
//! │                │                                               │
//! │                ├─ render/encode/decode/version ─► ComputeUnit │
//! │                │                                               │
//! │                └──► Response {id, outcome}                     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Error boundary
//!
//! Every failure while handling a request — a module-reported envelope
//! error, a layout engine failure, even a panic inside the compute module —
//! is caught at the handler boundary and converted into a
//! [`Outcome::Failure`]. The transport path (channel closed) is the only
//! thing that terminates the loop.

mod handoff;

pub use handoff::{HandoffCell, HandoffError};

use crate::compute::{
    decode_render_payload, unwrap_envelope, unwrap_nested_result, ComputeUnit, ModuleLoader,
    LAYOUT_KEY,
};
use crate::config::LayoutPolicy;
use crate::error::InitError;
use crate::layout::LayoutEngine;
use crate::protocol::{CompileRequest, LayoutChoice, Operation, Outcome, Request, Response};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Worker State
// =============================================================================

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, no compute module loaded yet. Only `init` is accepted.
    Uninitialized,
    /// Compute module loaded; accepting requests.
    Ready,
    /// Handling a request.
    Busy,
    /// Terminated; the loop has exited.
    Closed,
}

// =============================================================================
// Worker Runtime
// =============================================================================

/// The dispatch loop running inside the worker.
///
/// Exclusively owns the compute module instance and the layout hand-off
/// cell; nothing outside the worker ever touches either.
pub struct WorkerRuntime {
    loader: Arc<dyn ModuleLoader>,
    engine: Option<Arc<dyn LayoutEngine>>,
    layout_policy: LayoutPolicy,
    compute: Option<Box<dyn ComputeUnit>>,
    handoff: HandoffCell,
    request_rx: mpsc::Receiver<Request>,
    pub(crate) response_tx: mpsc::Sender<Response>,
    shutdown: CancellationToken,
    state: WorkerState,
}

impl WorkerRuntime {
    /// Creates a runtime wired to the given channels.
    ///
    /// The runtime starts [`WorkerState::Uninitialized`]; the first request
    /// must be `init`.
    pub fn new(
        loader: Arc<dyn ModuleLoader>,
        engine: Option<Arc<dyn LayoutEngine>>,
        layout_policy: LayoutPolicy,
        request_rx: mpsc::Receiver<Request>,
        response_tx: mpsc::Sender<Response>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            loader,
            engine,
            layout_policy,
            compute: None,
            handoff: HandoffCell::new(),
            request_rx,
            response_tx,
            shutdown,
            state: WorkerState::Uninitialized,
        }
    }

    /// Runs the dispatch loop until shutdown or transport loss.
    pub async fn run(mut self) {
        info!("worker starting");
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("worker shutting down");
                    break;
                }

                request = self.request_rx.recv() => match request {
                    Some(request) => {
                        if !self.handle_request(request).await {
                            break;
                        }
                    }
                    None => {
                        debug!("request channel closed");
                        break;
                    }
                }
            }
        }
        self.state = WorkerState::Closed;
        info!(state = ?self.state, "worker stopped");
    }

    /// Handles one request, sending exactly one response.
    ///
    /// Returns `false` when the response channel is gone and the loop
    /// should exit.
    async fn handle_request(&mut self, request: Request) -> bool {
        let Request { id, op } = request;
        let kind = op.kind();
        debug!(id = %id, kind, "request received");

        let outcome = self.dispatch(op).await;
        match &outcome {
            Outcome::Failure { message } => warn!(id = %id, kind, message, "request failed"),
            _ => debug!(id = %id, kind, "request completed"),
        }

        if self.response_tx.send(Response { id, outcome }).await.is_err() {
            warn!(id = %id, "response channel closed, worker exiting");
            return false;
        }
        true
    }

    async fn dispatch(&mut self, op: Operation) -> Outcome {
        let op = match op {
            Operation::Init { artifact } => return self.handle_init(&artifact),
            op => op,
        };
        if self.state == WorkerState::Uninitialized {
            return Outcome::failure("worker is not initialized");
        }

        self.state = WorkerState::Busy;
        let result = match op {
            // Handled above; kept so the match stays total.
            Operation::Init { .. } => Err("worker is already initialized".to_string()),
            Operation::Compile(request) => self.handle_compile(request).await,
            Operation::Render(request) => {
                serde_json::to_string(&request)
                    .map_err(|e| format!("failed to serialize render request: {e}"))
                    .and_then(|json| self.handle_render(&json))
            }
            Operation::Encode(source) => self.handle_codec("encode", &source),
            Operation::Decode(encoded) => self.handle_codec("decode", &encoded),
            Operation::Version => self.handle_version(),
        };
        self.state = WorkerState::Ready;

        match result {
            Ok(value) => Outcome::Success(value),
            Err(message) => Outcome::Failure { message },
        }
    }

    // -------------------------------------------------------------------------
    // Handlers
    // -------------------------------------------------------------------------

    /// Startup: load the module, initialize the layout engine, become ready.
    fn handle_init(&mut self, artifact: &[u8]) -> Outcome {
        if self.state != WorkerState::Uninitialized {
            return Outcome::failure("worker is already initialized");
        }

        let unit = match self.loader.load(artifact) {
            Ok(unit) => unit,
            Err(error) => {
                error!(%error, "startup failed");
                return Outcome::failure(error);
            }
        };

        if let Some(engine) = &self.engine {
            if let Err(layout_error) = engine.initialize() {
                let error = InitError::EngineInit {
                    engine: engine.name().to_string(),
                    message: layout_error.message,
                };
                error!(%error, "startup failed");
                return Outcome::failure(error);
            }
            debug!(engine = engine.name(), "layout engine initialized");
        }

        self.compute = Some(unit);
        self.state = WorkerState::Ready;
        info!("worker ready");
        Outcome::Ready
    }

    /// Compile, taking the two-phase external layout path when selected.
    async fn handle_compile(&mut self, request: CompileRequest) -> Result<Value, String> {
        let engine = self.select_engine(&request)?;

        let mut compile_value = serde_json::to_value(&request)
            .map_err(|e| format!("failed to serialize compile request: {e}"))?;

        if let Some(engine) = engine {
            debug!(engine = engine.name(), "taking external layout path");
            let request_json = compile_value.to_string();

            // Phase one: a cheap compute call derives the intermediate
            // graph, which the async engine lays out.
            let raw = self.call_compute("layout_graph", |unit| unit.layout_graph(&request_json))?;
            let graph = unwrap_envelope(&raw).map_err(|e| e.to_string())?;
            let laid = engine.layout(graph).await.map_err(|e| e.to_string())?;

            // Phase two: thread the result through the hand-off cell into
            // the real compile call. The cell is empty again afterward, so
            // a stale layout can never reach a later compile.
            self.handoff.put(laid).map_err(|e| e.to_string())?;
            let laid = self.handoff.take().map_err(|e| e.to_string())?;
            match compile_value.as_object_mut() {
                Some(map) => {
                    map.insert(LAYOUT_KEY.to_string(), laid);
                }
                None => return Err("compile request is not a JSON object".to_string()),
            }
        }

        let compile_json = compile_value.to_string();
        let raw = self.call_compute("compile", |unit| unit.compile(&compile_json))?;
        unwrap_envelope(&raw).map_err(|e| e.to_string())
    }

    /// Picks the layout engine for a compile, or `None` for the built-in
    /// path. Unset layout falls back to the configured policy.
    fn select_engine(
        &self,
        request: &CompileRequest,
    ) -> Result<Option<Arc<dyn LayoutEngine>>, String> {
        match request.options.layout {
            Some(LayoutChoice::External) => match &self.engine {
                Some(engine) => Ok(Some(Arc::clone(engine))),
                None => Err("no external layout engine is registered".to_string()),
            },
            Some(LayoutChoice::Builtin) => Ok(None),
            None => match self.layout_policy {
                LayoutPolicy::PreferExternal => Ok(self.engine.as_ref().map(Arc::clone)),
                LayoutPolicy::BuiltinOnly => Ok(None),
            },
        }
    }

    fn handle_render(&mut self, request_json: &str) -> Result<Value, String> {
        let raw = self.call_compute("render", |unit| unit.render(request_json))?;
        let data = unwrap_envelope(&raw).map_err(|e| e.to_string())?;
        let markup = decode_render_payload(&data).map_err(|e| e.to_string())?;
        Ok(Value::String(markup))
    }

    /// Encode and decode share a shape: raw string in, `data.result` out.
    fn handle_codec(&mut self, entry: &'static str, payload: &str) -> Result<Value, String> {
        let raw = self.call_compute(entry, |unit| match entry {
            "encode" => unit.encode(payload),
            _ => unit.decode(payload),
        })?;
        unwrap_nested_result(&raw).map_err(|e| e.to_string())
    }

    fn handle_version(&mut self) -> Result<Value, String> {
        let raw = self.call_compute("version", |unit| unit.version())?;
        unwrap_envelope(&raw).map_err(|e| e.to_string())
    }

    /// Calls into the compute module, converting a panic into a failure
    /// message instead of letting it tear down the worker.
    fn call_compute<F>(&mut self, entry: &'static str, f: F) -> Result<String, String>
    where
        F: FnOnce(&mut dyn ComputeUnit) -> String,
    {
        let unit = self
            .compute
            .as_mut()
            .ok_or_else(|| "worker is not initialized".to_string())?;
        std::panic::catch_unwind(AssertUnwindSafe(|| f(unit.as_mut()))).map_err(|panic| {
            format!(
                "compute module panicked in {entry}: {}",
                panic_text(panic.as_ref())
            )
        })
    }
}

fn panic_text(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
