//! Bridge configuration.
//!
//! Plain data with explicit defaults; hosts construct a [`BridgeConfig`]
//! (usually via `Default`) and hand it to
//! [`WorkerHandle::spawn`](crate::host::WorkerHandle::spawn).

use std::time::Duration;

/// Default request/response channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Default deadline for a single call to settle.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for the worker to signal readiness after spawn.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Which layout strategy a compile takes when the request leaves
/// `options.layout` unset.
///
/// The historical behavior was implicit: external when an engine was
/// available. That is now the documented default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutPolicy {
    /// Use the external engine when one is registered, otherwise the
    /// compute module's built-in layout.
    PreferExternal,

    /// Always use the built-in layout unless a request asks for the
    /// external engine explicitly.
    BuiltinOnly,
}

/// Configuration for one worker bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Capacity of the request and response channels.
    pub channel_capacity: usize,

    /// Deadline for a single call; a call that does not settle in time
    /// fails with a timeout and frees its pending slot.
    pub call_timeout: Duration,

    /// Deadline for startup; `ready()` fails if the worker has not
    /// signalled readiness by then.
    pub ready_timeout: Duration,

    /// Layout strategy for requests that leave `options.layout` unset.
    pub layout_policy: LayoutPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            layout_policy: LayoutPolicy::PreferExternal,
        }
    }
}
