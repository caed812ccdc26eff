//! External layout engine capability.
//!
//! The compute module's compile path can delegate graph layout to an
//! asynchronous engine running outside the module. The engine cannot be
//! driven from inside a synchronous compute call, which is why the worker
//! splits compilation in two and bridges the engine's result through its
//! [`HandoffCell`](crate::worker::HandoffCell).
//!
//! Engines expose an explicit [`LayoutEngine::initialize`] capability that
//! the worker calls once during startup; an engine that fails to initialize
//! fails the whole worker's init.

mod grid;

pub use grid::GridLayoutEngine;

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`LayoutEngine::layout`], keeping the trait
/// object-safe.
pub type LayoutFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, LayoutError>> + Send + 'a>>;

/// Error from the external layout engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("layout failed: {message}")]
pub struct LayoutError {
    /// Human-readable failure message.
    pub message: String,
}

impl LayoutError {
    /// Creates a new layout error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Asynchronous graph-layout capability.
///
/// Implementations must be shareable across tasks; the worker holds the
/// engine behind an `Arc` and awaits [`layout`](Self::layout) between the
/// two compute calls of a compile.
pub trait LayoutEngine: Send + Sync + 'static {
    /// Engine name, for logging.
    fn name(&self) -> &str;

    /// One-time initialization, called while the worker handles `init`.
    ///
    /// This replaces ambient installation tricks: whatever the engine needs
    /// to make itself callable happens here, explicitly.
    fn initialize(&self) -> Result<(), LayoutError> {
        Ok(())
    }

    /// Lays out an intermediate graph, returning the graph with positions.
    fn layout(&self, graph: Value) -> LayoutFuture<'_>;
}
