//! Platform capability: where the worker runs and how modules load.
//!
//! The two deployment environments this bridge supports differ in their
//! spawning primitives: an embedded host runs the worker as a task on its
//! own tokio runtime, while an isolated host gives the worker a dedicated
//! OS thread with a private current-thread runtime. Both are hidden behind
//! the [`WorkerSpawner`] capability; the host picks one at startup and
//! injects it, together with a [`ModuleLoader`], as a [`Platform`].

use crate::compute::ModuleLoader;
use crate::error::SpawnError;
use crate::worker::WorkerRuntime;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Spawner Capability
// =============================================================================

/// Places a prepared worker runtime onto its execution environment.
pub trait WorkerSpawner: Send + Sync + 'static {
    /// Starts the worker's dispatch loop. Returns once the worker is
    /// running (not once it is ready — readiness is signalled through the
    /// protocol).
    fn spawn_worker(&self, worker: WorkerRuntime) -> Result<(), SpawnError>;
}

/// Runs the worker as a task on the ambient tokio runtime.
///
/// Requires being called from within a runtime context; the worker shares
/// the host's executor, which is the in-process deployment shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeSpawner;

impl WorkerSpawner for RuntimeSpawner {
    fn spawn_worker(&self, worker: WorkerRuntime) -> Result<(), SpawnError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| SpawnError::NoRuntime)?;
        handle.spawn(worker.run());
        debug!("worker spawned on ambient runtime");
        Ok(())
    }
}

/// Runs the worker on a dedicated OS thread with its own single-threaded
/// runtime.
///
/// The worker's blocking behavior can never stall the host's executor;
/// this is the isolated deployment shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl WorkerSpawner for ThreadSpawner {
    fn spawn_worker(&self, worker: WorkerRuntime) -> Result<(), SpawnError> {
        std::thread::Builder::new()
            .name("inkbridge-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::error!(error = %e, "worker thread could not build a runtime");
                        return;
                    }
                };
                runtime.block_on(worker.run());
            })
            .map_err(|e| SpawnError::Thread(e.to_string()))?;
        debug!("worker spawned on dedicated thread");
        Ok(())
    }
}

// =============================================================================
// Platform Bundle
// =============================================================================

/// The capabilities a worker needs from its environment, selected once at
/// startup and injected into the runtime.
#[derive(Clone)]
pub struct Platform {
    /// Where the worker's dispatch loop runs.
    pub spawner: Arc<dyn WorkerSpawner>,

    /// How init artifacts become live compute modules.
    pub loader: Arc<dyn ModuleLoader>,
}

impl Platform {
    /// Platform for embedded hosts: worker task on the ambient runtime.
    pub fn in_runtime(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            spawner: Arc::new(RuntimeSpawner),
            loader,
        }
    }

    /// Platform for isolated hosts: worker on a dedicated thread.
    pub fn dedicated_thread(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            spawner: Arc::new(ThreadSpawner),
            loader,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
