//! Error taxonomy for the bridge.
//!
//! Errors are split along the propagation boundaries the bridge guarantees:
//!
//! - [`InitError`] — worker startup failed; the handle's `ready()` future
//!   fails permanently and the worker is unusable.
//! - [`CallError`] — an individual call failed; the worker stays usable and
//!   the next call proceeds normally.
//! - [`TransportError`] — the channel itself is gone; reported out-of-band
//!   via [`BridgeEvent`](crate::host::BridgeEvent) in addition to failing the
//!   call that observed it.
//!
//! Business-level failures reported by the compute module (compile, render,
//! codec errors) are carried as [`CallError::Failed`] with the module's own
//! message; they are recovered at the worker's handler boundary and never
//! reach the transport path.

use std::time::Duration;
use thiserror::Error;

/// Worker startup failure. Fatal to that worker instance.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    /// The module artifact was malformed or named an unknown module.
    #[error("module artifact rejected: {0}")]
    ArtifactRejected(String),

    /// The compute module could not be instantiated from the artifact.
    #[error("compute module failed to load: {0}")]
    ModuleLoad(String),

    /// A layout engine failed its explicit initialization call.
    #[error("layout engine '{engine}' failed to initialize: {message}")]
    EngineInit {
        /// Engine name, as reported by the engine itself.
        engine: String,
        /// Failure message.
        message: String,
    },

    /// The worker reported a startup failure, or terminated before
    /// signalling readiness.
    #[error("worker startup failed: {0}")]
    Startup(String),

    /// The worker did not signal readiness within the configured deadline.
    #[error("worker did not become ready within {0:?}")]
    ReadyTimeout(Duration),
}

/// Failure of a single call on an otherwise healthy handle.
#[derive(Debug, Error)]
pub enum CallError {
    /// Startup failed, so no call can ever succeed on this handle.
    #[error(transparent)]
    Init(#[from] InitError),

    /// The compute module or layout engine reported a business-level error.
    #[error("{0}")]
    Failed(String),

    /// A malformed or unroutable message was observed on this call's path.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The channel to the worker failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The call did not settle within the configured deadline.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

/// Transport-level channel failure, distinct from call failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request channel is at capacity.
    #[error("request channel is full")]
    ChannelFull,

    /// The worker's channel is closed (worker terminated or shut down).
    #[error("worker channel is closed")]
    ChannelClosed,
}

/// Failure to place the worker onto its execution environment.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The in-runtime spawner requires an ambient tokio runtime.
    #[error("no tokio runtime available to host the worker")]
    NoRuntime,

    /// The dedicated worker thread could not be created.
    #[error("failed to spawn worker thread: {0}")]
    Thread(String),

    /// The startup message could not be delivered to the worker.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
