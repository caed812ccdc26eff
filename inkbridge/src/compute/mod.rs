//! Compute module capability surface and envelope handling.
//!
//! The worker drives an opaque diagram compiler/renderer through the
//! [`ComputeUnit`] trait: six synchronous entry points, all JSON-string in
//! and JSON-string out. Every reply is an envelope of the form
//! `{"data": ...}` on success or `{"error": {"message": ...}}` on failure;
//! [`unwrap_envelope`] converts that into a `Result` at the worker's handler
//! boundary.
//!
//! # Implementations
//!
//! - [`EdgeListCompute`] — the reference module shipped with this crate,
//!   used by the CLI and the test suite.
//! - Production modules are resolved from an init artifact by a
//!   [`ModuleLoader`], so hosts can plug in whatever compiled module their
//!   deployment provides.

mod edgelist;
mod loader;

pub use edgelist::EdgeListCompute;
pub use loader::{pack_artifact, parse_artifact, ModuleFactory, ModuleLoader, RegistryLoader};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Fixed key under which a pre-computed layout is threaded into the compile
/// request JSON when the external layout path is taken.
pub const LAYOUT_KEY: &str = "layout";

// =============================================================================
// Compute Unit Trait
// =============================================================================

/// The opaque compute module's entry points.
///
/// All methods are synchronous and infallible at the signature level: any
/// failure is reported inside the returned JSON envelope, mirroring how a
/// precompiled module blob behaves. The worker owns the instance exclusively
/// and calls it from a single task, hence `&mut self` and no `Sync` bound.
pub trait ComputeUnit: Send + 'static {
    /// Compiles a request (`{fs, options}`, optionally a `layout` key) into
    /// a diagram document envelope.
    fn compile(&mut self, request_json: &str) -> String;

    /// Renders a `{diagram, options}` request. The envelope's `data` is a
    /// base64-encoded byte string.
    fn render(&mut self, request_json: &str) -> String;

    /// Encodes raw source text. The useful value is at `data.result`.
    fn encode(&mut self, source: &str) -> String;

    /// Decodes an opaque encoded string. The useful value is at
    /// `data.result`.
    fn decode(&mut self, encoded: &str) -> String;

    /// Returns the module's version descriptor envelope.
    fn version(&mut self) -> String;

    /// Derives the intermediate layout graph for a compile request, for
    /// hand-off to the external layout engine.
    fn layout_graph(&mut self, request_json: &str) -> String;
}

impl std::fmt::Debug for dyn ComputeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ComputeUnit")
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Error produced while unwrapping a compute module envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The module reported an error through the envelope.
    #[error("{0}")]
    Reported(String),

    /// The reply was not a valid envelope at all.
    #[error("malformed compute envelope: {0}")]
    Malformed(String),

    /// The envelope had neither `data` nor `error`.
    #[error("compute envelope carries no data")]
    MissingData,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<EnvelopeFailure>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeFailure {
    message: String,
}

/// Parses a raw compute module reply and unwraps its envelope.
///
/// An `error` field wins over `data` if a malformed module ever reports
/// both.
pub fn unwrap_envelope(raw: &str) -> Result<Value, EnvelopeError> {
    let envelope: Envelope =
        serde_json::from_str(raw).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    if let Some(failure) = envelope.error {
        return Err(EnvelopeError::Reported(failure.message));
    }
    envelope.data.ok_or(EnvelopeError::MissingData)
}

/// Unwraps an envelope whose useful value sits one level deeper, at
/// `data.result`. Used for the encode/decode entry points.
pub fn unwrap_nested_result(raw: &str) -> Result<Value, EnvelopeError> {
    let data = unwrap_envelope(raw)?;
    match data.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(EnvelopeError::MissingData),
    }
}

/// Decodes a render envelope's `data`: a base64-encoded byte string that
/// must hold UTF-8 markup text.
pub fn decode_render_payload(data: &Value) -> Result<String, EnvelopeError> {
    let encoded = data
        .as_str()
        .ok_or_else(|| EnvelopeError::Malformed("render data is not a string".to_string()))?;
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| EnvelopeError::Malformed(format!("render data is not base64: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| EnvelopeError::Malformed(format!("render data is not UTF-8: {e}")))
}

/// Builds a success envelope around a value. For module implementors.
pub fn ok_envelope(data: Value) -> String {
    serde_json::to_string(&Envelope {
        data: Some(data),
        error: None,
    })
    .unwrap_or_else(|_| r#"{"error":{"message":"envelope serialization failed"}}"#.to_string())
}

/// Builds an error envelope around a message. For module implementors.
pub fn err_envelope(message: impl Into<String>) -> String {
    serde_json::to_string(&Envelope {
        data: None,
        error: Some(EnvelopeFailure {
            message: message.into(),
        }),
    })
    .unwrap_or_else(|_| r#"{"error":{"message":"envelope serialization failed"}}"#.to_string())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_envelope_data() {
        let value = unwrap_envelope(r#"{"data": {"nodes": []}}"#).unwrap();
        assert_eq!(value, json!({"nodes": []}));
    }

    #[test]
    fn test_unwrap_envelope_error_wins() {
        let error =
            unwrap_envelope(r#"{"data": 1, "error": {"message": "broken"}}"#).unwrap_err();
        assert_eq!(error, EnvelopeError::Reported("broken".to_string()));
    }

    #[test]
    fn test_unwrap_envelope_rejects_non_json() {
        assert!(matches!(
            unwrap_envelope("not json"),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_unwrap_envelope_empty_is_missing_data() {
        assert_eq!(unwrap_envelope("{}").unwrap_err(), EnvelopeError::MissingData);
    }

    #[test]
    fn test_unwrap_nested_result() {
        let value = unwrap_nested_result(r#"{"data": {"result": "eA=="}}"#).unwrap();
        assert_eq!(value, json!("eA=="));
    }

    #[test]
    fn test_unwrap_nested_result_missing() {
        assert_eq!(
            unwrap_nested_result(r#"{"data": {"other": 1}}"#).unwrap_err(),
            EnvelopeError::MissingData
        );
    }

    #[test]
    fn test_decode_render_payload_roundtrip() {
        let svg = "<svg>ünïcode</svg>";
        let data = json!(BASE64.encode(svg.as_bytes()));
        assert_eq!(decode_render_payload(&data).unwrap(), svg);
    }

    #[test]
    fn test_decode_render_payload_rejects_bad_base64() {
        let error = decode_render_payload(&json!("@@@@")).unwrap_err();
        assert!(matches!(error, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn test_envelope_builders_roundtrip() {
        assert_eq!(unwrap_envelope(&ok_envelope(json!(42))).unwrap(), json!(42));
        assert_eq!(
            unwrap_envelope(&err_envelope("nope")).unwrap_err(),
            EnvelopeError::Reported("nope".to_string())
        );
    }
}
