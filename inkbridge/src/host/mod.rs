//! Host proxy: the caller-facing side of the bridge.
//!
//! A [`WorkerHandle`] owns the worker it spawned: it performs the startup
//! handshake (`init` → `Ready`), serializes calls so the worker only ever
//! sees one outstanding request, and routes each response back to its
//! caller by correlation id.
//!
//! # Architecture
//!
//! ```text
//! caller ──► call(op) ──► [flight permit] ──► pending map ──► request_tx
//!                                                                  │
//!                                                                  ▼
//!                                                             WorkerRuntime
//!                                                                  │
//! caller ◄── outcome ◄── pending map ◄── response pump ◄── response_rx
//! ```
//!
//! The pending map is keyed by [`CallId`]; the single-permit semaphore
//! keeps calls strictly single-flight, so responses arrive in request
//! order while ids make routing unambiguous even if that ever changed.
//!
//! # Out-of-band events
//!
//! Transport loss and protocol violations do not belong to any one call;
//! they are published on a broadcast channel exposed by
//! [`events`](WorkerHandle::events). A response that matches no pending
//! call is surfaced there, never silently dropped.

use crate::config::BridgeConfig;
use crate::error::{CallError, InitError, SpawnError, TransportError};
use crate::layout::LayoutEngine;
use crate::platform::Platform;
use crate::protocol::{
    CallId, CompileRequest, Operation, Outcome, RenderOptions, RenderRequest, Request, Response,
};
use crate::worker::WorkerRuntime;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of the out-of-band event channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Events and Ready State
// =============================================================================

/// Out-of-band bridge event, distinct from per-call results.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A message that could not be routed to any pending call.
    ProtocolViolation(String),

    /// The worker's channel closed; no further calls can succeed.
    Closed(String),
}

#[derive(Debug, Clone, PartialEq)]
enum ReadyState {
    Pending,
    Ready,
    Failed(String),
}

// =============================================================================
// Worker Handle
// =============================================================================

/// Handle to a spawned worker.
///
/// Cloneable; all clones share the same worker, pending-call table, and
/// single-flight permit.
#[derive(Clone)]
pub struct WorkerHandle {
    config: BridgeConfig,
    request_tx: mpsc::Sender<Request>,
    pending: Arc<DashMap<CallId, oneshot::Sender<Outcome>>>,
    next_id: Arc<AtomicU64>,
    flight: Arc<Semaphore>,
    ready_rx: watch::Receiver<ReadyState>,
    events_tx: broadcast::Sender<BridgeEvent>,
    shutdown: CancellationToken,
}

impl WorkerHandle {
    /// Spawns a worker on the platform and begins the startup handshake.
    ///
    /// The `init` request is sent immediately; await [`ready`](Self::ready)
    /// (or just issue a call, which waits for readiness itself) to learn
    /// the startup outcome.
    ///
    /// # Arguments
    ///
    /// * `config` - Bridge configuration
    /// * `platform` - Spawner and module loader for this deployment
    /// * `artifact` - Precompiled module artifact for the worker to load
    /// * `engine` - Optional external layout engine
    pub fn spawn(
        config: BridgeConfig,
        platform: &Platform,
        artifact: Vec<u8>,
        engine: Option<Arc<dyn LayoutEngine>>,
    ) -> Result<Self, SpawnError> {
        // The response pump runs on the host's runtime regardless of where
        // the worker itself is placed.
        let host = tokio::runtime::Handle::try_current().map_err(|_| SpawnError::NoRuntime)?;

        let (request_tx, request_rx) = mpsc::channel(config.channel_capacity);
        let (response_tx, response_rx) = mpsc::channel(config.channel_capacity);
        let shutdown = CancellationToken::new();

        let worker = WorkerRuntime::new(
            Arc::clone(&platform.loader),
            engine,
            config.layout_policy,
            request_rx,
            response_tx,
            shutdown.clone(),
        );
        platform.spawner.spawn_worker(worker)?;

        let next_id = Arc::new(AtomicU64::new(1));
        let init_id = CallId(next_id.fetch_add(1, Ordering::Relaxed));
        request_tx
            .try_send(Request {
                id: init_id,
                op: Operation::Init { artifact },
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => SpawnError::Transport(TransportError::ChannelFull),
                TrySendError::Closed(_) => SpawnError::Transport(TransportError::ChannelClosed),
            })?;
        debug!(id = %init_id, "startup handshake sent");

        let (ready_tx, ready_rx) = watch::channel(ReadyState::Pending);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pending: Arc<DashMap<CallId, oneshot::Sender<Outcome>>> = Arc::new(DashMap::new());
        host.spawn(pump(
            response_rx,
            init_id,
            Arc::clone(&pending),
            ready_tx,
            events_tx.clone(),
        ));

        Ok(Self {
            config,
            request_tx,
            pending,
            next_id,
            flight: Arc::new(Semaphore::new(1)),
            ready_rx,
            events_tx,
            shutdown,
        })
    }

    /// Resolves once the worker signalled readiness, or fails permanently
    /// with the startup failure. Any number of tasks may wait.
    pub async fn ready(&self) -> Result<(), InitError> {
        let mut ready_rx = self.ready_rx.clone();
        let wait = async move {
            loop {
                let state = ready_rx.borrow_and_update().clone();
                match state {
                    ReadyState::Ready => return Ok(()),
                    ReadyState::Failed(message) => return Err(InitError::Startup(message)),
                    ReadyState::Pending => {}
                }
                if ready_rx.changed().await.is_err() {
                    return Err(InitError::Startup(
                        "worker terminated during startup".to_string(),
                    ));
                }
            }
        };
        match tokio::time::timeout(self.config.ready_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(InitError::ReadyTimeout(self.config.ready_timeout)),
        }
    }

    /// Issues one call and awaits its outcome.
    ///
    /// Calls are strictly single-flight: a second call issued while one is
    /// outstanding queues on the flight permit instead of racing for the
    /// response. Each call settles exactly once — success, failure,
    /// timeout, or transport loss — and always frees its pending slot.
    pub async fn call(&self, op: Operation) -> Result<Value, CallError> {
        self.ready().await?;

        let _permit = self
            .flight
            .acquire()
            .await
            .map_err(|_| CallError::Transport(TransportError::ChannelClosed))?;

        let id = CallId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        self.pending.insert(id, outcome_tx);

        if self.request_tx.send(Request { id, op }).await.is_err() {
            self.pending.remove(&id);
            return Err(CallError::Transport(TransportError::ChannelClosed));
        }

        let outcome = match tokio::time::timeout(self.config.call_timeout, outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => return Err(CallError::Transport(TransportError::ChannelClosed)),
            Err(_) => {
                // The slot must not stay occupied; a response arriving
                // after this point is surfaced as a protocol violation.
                self.pending.remove(&id);
                return Err(CallError::Timeout(self.config.call_timeout));
            }
        };

        match outcome {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure { message } => Err(CallError::Failed(message)),
            Outcome::Ready => {
                let message = format!("call {id} answered with a readiness signal");
                let _ = self
                    .events_tx
                    .send(BridgeEvent::ProtocolViolation(message.clone()));
                Err(CallError::Protocol(message))
            }
        }
    }

    // -------------------------------------------------------------------------
    // Convenience operations
    // -------------------------------------------------------------------------

    /// Compiles a prebuilt request into a diagram document.
    pub async fn compile(&self, request: CompileRequest) -> Result<Value, CallError> {
        self.call(Operation::Compile(request)).await
    }

    /// Compiles a raw source string, wrapped into a one-file virtual
    /// filesystem, with the caller's options taking precedence.
    pub async fn compile_source(
        &self,
        source: &str,
        options: RenderOptions,
    ) -> Result<Value, CallError> {
        self.compile(CompileRequest::from_source(source).with_options(options))
            .await
    }

    /// Renders a compiled diagram document to markup text.
    pub async fn render(
        &self,
        diagram: Value,
        options: RenderOptions,
    ) -> Result<String, CallError> {
        let value = self
            .call(Operation::Render(RenderRequest { diagram, options }))
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CallError::Protocol("render result is not text".to_string()))
    }

    /// Encodes source text into an opaque shareable string.
    pub async fn encode(&self, source: &str) -> Result<String, CallError> {
        let value = self.call(Operation::Encode(source.to_string())).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CallError::Protocol("encode result is not text".to_string()))
    }

    /// Decodes an opaque string back into source text.
    pub async fn decode(&self, encoded: &str) -> Result<String, CallError> {
        let value = self.call(Operation::Decode(encoded.to_string())).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CallError::Protocol("decode result is not text".to_string()))
    }

    /// Returns the compute module's version descriptor.
    pub async fn version(&self) -> Result<Value, CallError> {
        self.call(Operation::Version).await
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Subscribes to out-of-band bridge events.
    ///
    /// Only events published after subscribing are observed.
    pub fn events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events_tx.subscribe()
    }

    /// Signals the worker to shut down. Calls issued afterwards fail with
    /// a transport error.
    pub fn close(&self) {
        debug!("closing worker handle");
        self.shutdown.cancel();
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

// =============================================================================
// Response Pump
// =============================================================================

/// Routes worker responses to their pending calls until the transport
/// closes.
async fn pump(
    mut response_rx: mpsc::Receiver<Response>,
    init_id: CallId,
    pending: Arc<DashMap<CallId, oneshot::Sender<Outcome>>>,
    ready_tx: watch::Sender<ReadyState>,
    events_tx: broadcast::Sender<BridgeEvent>,
) {
    while let Some(Response { id, outcome }) = response_rx.recv().await {
        if id == init_id {
            let state = match outcome {
                Outcome::Ready => ReadyState::Ready,
                Outcome::Failure { message } => ReadyState::Failed(message),
                Outcome::Success(_) => {
                    let message = "startup answered with a result value".to_string();
                    surface(&events_tx, message.clone());
                    ReadyState::Failed(message)
                }
            };
            let _ = ready_tx.send(state);
            continue;
        }
        match pending.remove(&id) {
            // The caller may have timed out meanwhile; a dead receiver is
            // not a violation.
            Some((_, outcome_tx)) => {
                let _ = outcome_tx.send(outcome);
            }
            None => surface(&events_tx, format!("response for unknown call {id}")),
        }
    }

    debug!("response channel closed");
    if *ready_tx.borrow() == ReadyState::Pending {
        let _ = ready_tx.send(ReadyState::Failed(
            "worker terminated during startup".to_string(),
        ));
    }
    // Dropping the pending senders fails any still-waiting callers with a
    // transport error.
    pending.clear();
    let _ = events_tx.send(BridgeEvent::Closed("worker channel closed".to_string()));
}

fn surface(events_tx: &broadcast::Sender<BridgeEvent>, message: String) {
    warn!(%message, "protocol violation");
    let _ = events_tx.send(BridgeEvent::ProtocolViolation(message));
}

// =============================================================================
// Tests
// =============================================================================
