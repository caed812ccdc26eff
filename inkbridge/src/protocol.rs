//! Request and response types for host/worker communication.
//!
//! This module defines the message types exchanged between the host proxy
//! ([`WorkerHandle`](crate::host::WorkerHandle)) and the worker runtime
//! ([`WorkerRuntime`](crate::worker::WorkerRuntime)) via channels.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐                          ┌────────────────┐
//! │ WorkerHandle │──► Request {id, op} ────►│ WorkerRuntime  │
//! │  (host side) │                          │ (worker side)  │
//! │              │◄── Response {id, out} ◄──│                │
//! └──────────────┘                          └────────────────┘
//! ```
//!
//! Every [`Request`] carries a [`CallId`] correlation id which the worker
//! echoes on the matching [`Response`]. Exactly one response is produced per
//! request: `Init` answers with [`Outcome::Ready`] or [`Outcome::Failure`],
//! every other operation answers with [`Outcome::Success`] or
//! [`Outcome::Failure`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Virtual filesystem key used when compiling a single raw source string.
pub const INDEX_FILE: &str = "index";

// =============================================================================
// Correlation Id
// =============================================================================

/// Correlation id attached to every request and echoed on its response.
///
/// Ids are allocated by the host proxy from a monotonically increasing
/// counter; the worker never invents ids of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Layout Selection
// =============================================================================

/// Layout strategy requested for a compile.
///
/// `Builtin` is implemented inside the compute module itself; `External`
/// requires a registered [`LayoutEngine`](crate::layout::LayoutEngine) and
/// takes the two-phase hand-off path in the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutChoice {
    /// The compute module's own synchronous layout.
    Builtin,
    /// The asynchronous layout engine running outside the compute module.
    External,
}

// =============================================================================
// Render Options
// =============================================================================

/// Options shared by compile and render requests.
///
/// Field names are camelCase on the wire to match the compute module's
/// expected JSON shape. All fields have explicit defaults so callers can use
/// `RenderOptions::default()` and override selectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    /// Theme id. 0 is the default theme.
    pub theme: i64,

    /// Dark-mode theme id. -1 means unset (no separate dark theme).
    pub dark_theme: i64,

    /// Layout strategy. `None` defers to the bridge's configured
    /// [`LayoutPolicy`](crate::config::LayoutPolicy), which defaults to the
    /// external engine when one is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutChoice>,

    /// Padding around the rendered output, in pixels.
    pub pad: u32,

    /// Output scale. -1 fits vector output to the viewport; 1 disables
    /// fitting and renders at native size.
    pub scale: f64,

    /// Hand-drawn rendering style.
    pub sketch: bool,

    /// Inline all referenced assets into the output.
    pub bundle: bool,

    /// Center the output in the viewport.
    pub center: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            theme: 0,
            dark_theme: -1,
            layout: None,
            pad: 100,
            scale: -1.0,
            sketch: false,
            bundle: true,
            center: false,
        }
    }
}

// =============================================================================
// Compile / Render Requests
// =============================================================================

/// A compile request: a virtual filesystem of sources plus options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Map of virtual path to source text. Single-source compiles use the
    /// [`INDEX_FILE`] key.
    pub fs: BTreeMap<String, String>,

    /// Compile/render options.
    #[serde(default)]
    pub options: RenderOptions,
}

impl CompileRequest {
    /// Wraps a raw source string into a one-file virtual filesystem.
    pub fn from_source(source: impl Into<String>) -> Self {
        let mut fs = BTreeMap::new();
        fs.insert(INDEX_FILE.to_string(), source.into());
        Self {
            fs,
            options: RenderOptions::default(),
        }
    }

    /// Replaces the request's options with caller-supplied ones.
    ///
    /// Caller options take precedence over whatever the request was built
    /// with, matching the convenience-operation contract.
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }
}

/// A render request: a compiled diagram document plus options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    /// The compiled diagram document, as returned by a compile call.
    pub diagram: Value,

    /// Render options.
    #[serde(default)]
    pub options: RenderOptions,
}

// =============================================================================
// Request
// =============================================================================

/// Operation carried by a request, dispatched by kind in the worker.
pub enum Operation {
    /// Load the compute module from a precompiled binary artifact and make
    /// the worker ready. Must be the first operation a worker receives.
    Init {
        /// Opaque module artifact, resolved by the injected
        /// [`ModuleLoader`](crate::compute::ModuleLoader).
        artifact: Vec<u8>,
    },

    /// Compile a virtual filesystem into a diagram document.
    Compile(CompileRequest),

    /// Render a compiled diagram document to markup text.
    Render(RenderRequest),

    /// Encode raw source text into an opaque shareable string.
    Encode(String),

    /// Decode an opaque string back into source text.
    Decode(String),

    /// Report the compute module's version descriptor.
    Version,
}

impl Operation {
    /// Returns the operation kind as a static string, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Init { .. } => "init",
            Operation::Compile(_) => "compile",
            Operation::Render(_) => "render",
            Operation::Encode(_) => "encode",
            Operation::Decode(_) => "decode",
            Operation::Version => "version",
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Artifacts can be large; log the length, not the bytes.
            Operation::Init { artifact } => f
                .debug_struct("Init")
                .field("artifact_len", &artifact.len())
                .finish(),
            Operation::Compile(req) => f.debug_tuple("Compile").field(req).finish(),
            Operation::Render(req) => f.debug_tuple("Render").field(req).finish(),
            Operation::Encode(s) => f.debug_struct("Encode").field("len", &s.len()).finish(),
            Operation::Decode(s) => f.debug_struct("Decode").field("len", &s.len()).finish(),
            Operation::Version => f.write_str("Version"),
        }
    }
}

/// A request sent from the host proxy to the worker runtime.
#[derive(Debug)]
pub struct Request {
    /// Correlation id, echoed on the response.
    pub id: CallId,

    /// The operation to perform.
    pub op: Operation,
}

// =============================================================================
// Response
// =============================================================================

/// Result of handling one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The worker finished startup and can accept calls. Only ever produced
    /// for `Init`.
    Ready,

    /// The operation succeeded with a value.
    Success(Value),

    /// The operation failed. Business-level failures from the compute module
    /// and layout engine land here; they never tear down the worker.
    Failure {
        /// Human-readable failure message.
        message: String,
    },
}

impl Outcome {
    /// Builds a failure outcome from any displayable error.
    pub fn failure(message: impl fmt::Display) -> Self {
        Outcome::Failure {
            message: message.to_string(),
        }
    }
}

/// A response sent from the worker runtime back to the host proxy.
#[derive(Debug)]
pub struct Response {
    /// Correlation id of the request this answers.
    pub id: CallId,

    /// The outcome of the request.
    pub outcome: Outcome,
}

// =============================================================================
// Tests
// =============================================================================
