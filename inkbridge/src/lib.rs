//! InkBridge - Request/response bridge to a sandboxed diagram compiler
//!
//! This library lets a host application drive a single long-lived worker
//! that executes an opaque diagram compute module: compile source text into
//! a diagram document, render a document to markup, and encode/decode
//! shareable diagram strings.
//!
//! # High-Level API
//!
//! Spawn a worker through a [`platform::Platform`], then drive it through
//! the returned [`host::WorkerHandle`]:
//!
//! ```ignore
//! use inkbridge::compute::{pack_artifact, EdgeListCompute, RegistryLoader};
//! use inkbridge::config::BridgeConfig;
//! use inkbridge::host::WorkerHandle;
//! use inkbridge::platform::Platform;
//! use inkbridge::protocol::RenderOptions;
//! use std::sync::Arc;
//!
//! let platform = Platform::in_runtime(Arc::new(RegistryLoader::with_reference_module()));
//! let artifact = pack_artifact(EdgeListCompute::MODULE_NAME, b"");
//! let handle = WorkerHandle::spawn(BridgeConfig::default(), &platform, artifact, None)?;
//!
//! let diagram = handle.compile_source("a -> b", RenderOptions::default()).await?;
//! let svg = handle.render(diagram, RenderOptions::default()).await?;
//! ```

pub mod compute;
pub mod config;
pub mod error;
pub mod host;
pub mod layout;
pub mod logging;
pub mod platform;
pub mod protocol;
pub mod worker;

/// Version of the InkBridge library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_protocol_module_exists() {
        use crate::protocol::RenderOptions;
        let options = RenderOptions::default();
        assert_eq!(options.pad, 100);
    }
}
