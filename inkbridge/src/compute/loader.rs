//! Module loading from precompiled binary artifacts.
//!
//! An init request carries an opaque artifact blob. The worker never
//! interprets the blob itself; it hands it to the injected [`ModuleLoader`]
//! capability, which resolves it into a live [`ComputeUnit`]. The production
//! implementation, [`RegistryLoader`], reads a small header (magic, format
//! version, module name) and dispatches to a registered factory with the
//! remaining payload bytes.
//!
//! Artifact layout:
//!
//! ```text
//! ┌───────┬─────────┬──────────┬──────────────┬─────────────────┐
//! │ magic │ version │ name len │ module name  │ module payload  │
//! │ 4 B   │ 1 B     │ 1 B      │ name-len B   │ remaining bytes │
//! └───────┴─────────┴──────────┴──────────────┴─────────────────┘
//! ```

use super::ComputeUnit;
use crate::error::InitError;
use std::collections::HashMap;
use std::sync::Arc;

/// Magic bytes at the start of every module artifact.
pub const ARTIFACT_MAGIC: [u8; 4] = *b"IBRM";

/// Artifact format version this loader understands.
pub const ARTIFACT_VERSION: u8 = 1;

/// Factory building a compute unit from an artifact's payload bytes.
pub type ModuleFactory =
    Arc<dyn Fn(&[u8]) -> Result<Box<dyn ComputeUnit>, InitError> + Send + Sync>;

// =============================================================================
// Loader Trait
// =============================================================================

/// Capability for turning an init artifact into a live compute module.
///
/// Injected into the worker at spawn time; the two deployment environments
/// differ only in which loader (and spawner) they select at startup.
pub trait ModuleLoader: Send + Sync + 'static {
    /// Loads a compute module from the artifact bytes.
    fn load(&self, artifact: &[u8]) -> Result<Box<dyn ComputeUnit>, InitError>;
}

// =============================================================================
// Artifact Packing
// =============================================================================

/// Packs a module name and payload into the artifact wire format.
pub fn pack_artifact(name: &str, payload: &[u8]) -> Vec<u8> {
    debug_assert!(name.len() <= u8::MAX as usize, "module name too long");
    let mut artifact = Vec::with_capacity(6 + name.len() + payload.len());
    artifact.extend_from_slice(&ARTIFACT_MAGIC);
    artifact.push(ARTIFACT_VERSION);
    artifact.push(name.len() as u8);
    artifact.extend_from_slice(name.as_bytes());
    artifact.extend_from_slice(payload);
    artifact
}

/// Splits an artifact into its module name and payload bytes.
pub fn parse_artifact(artifact: &[u8]) -> Result<(&str, &[u8]), InitError> {
    if artifact.len() < 6 {
        return Err(InitError::ArtifactRejected(format!(
            "artifact too short ({} bytes)",
            artifact.len()
        )));
    }
    if artifact[..4] != ARTIFACT_MAGIC {
        return Err(InitError::ArtifactRejected(
            "bad magic bytes".to_string(),
        ));
    }
    if artifact[4] != ARTIFACT_VERSION {
        return Err(InitError::ArtifactRejected(format!(
            "unsupported artifact version {}",
            artifact[4]
        )));
    }
    let name_len = artifact[5] as usize;
    if artifact.len() < 6 + name_len {
        return Err(InitError::ArtifactRejected(
            "truncated module name".to_string(),
        ));
    }
    let name = std::str::from_utf8(&artifact[6..6 + name_len])
        .map_err(|_| InitError::ArtifactRejected("module name is not UTF-8".to_string()))?;
    Ok((name, &artifact[6 + name_len..]))
}

// =============================================================================
// Registry Loader
// =============================================================================

/// Loader resolving artifacts against a registry of module factories.
///
/// # Example
///
/// ```ignore
/// let loader = RegistryLoader::new()
///     .register("edgelist", |_payload| Ok(Box::new(EdgeListCompute::new())));
/// let unit = loader.load(&pack_artifact("edgelist", b""))?;
/// ```
#[derive(Default)]
pub struct RegistryLoader {
    factories: HashMap<String, ModuleFactory>,
}

impl RegistryLoader {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module factory under a name, replacing any previous one.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Box<dyn ComputeUnit>, InitError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Creates a registry with the reference edge-list module installed.
    pub fn with_reference_module() -> Self {
        Self::new().register(super::EdgeListCompute::MODULE_NAME, |_payload| {
            Ok(Box::new(super::EdgeListCompute::new()))
        })
    }
}

impl ModuleLoader for RegistryLoader {
    fn load(&self, artifact: &[u8]) -> Result<Box<dyn ComputeUnit>, InitError> {
        let (name, payload) = parse_artifact(artifact)?;
        let factory = self.factories.get(name).ok_or_else(|| {
            InitError::ArtifactRejected(format!("unknown module '{name}'"))
        })?;
        factory(payload)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_parse_roundtrip() {
        let artifact = pack_artifact("edgelist", b"payload-bytes");
        let (name, payload) = parse_artifact(&artifact).unwrap();

        assert_eq!(name, "edgelist");
        assert_eq!(payload, b"payload-bytes");
    }

    #[test]
    fn test_parse_rejects_short_artifact() {
        assert!(matches!(
            parse_artifact(b"IB"),
            Err(InitError::ArtifactRejected(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let mut artifact = pack_artifact("m", b"");
        artifact[0] = b'X';
        assert!(matches!(
            parse_artifact(&artifact),
            Err(InitError::ArtifactRejected(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_version() {
        let mut artifact = pack_artifact("m", b"");
        artifact[4] = 9;
        let error = parse_artifact(&artifact).unwrap_err();
        assert!(error.to_string().contains("version 9"));
    }

    #[test]
    fn test_registry_rejects_unknown_module() {
        let loader = RegistryLoader::new();
        let error = loader.load(&pack_artifact("ghost", b"")).unwrap_err();
        assert!(error.to_string().contains("unknown module 'ghost'"));
    }

    #[test]
    fn test_reference_registry_loads_edgelist() {
        let loader = RegistryLoader::with_reference_module();
        let artifact = pack_artifact(crate::compute::EdgeListCompute::MODULE_NAME, b"");
        assert!(loader.load(&artifact).is_ok());
    }

    #[test]
    fn test_factory_receives_payload() {
        let loader = RegistryLoader::new().register("probe", |payload| {
            if payload == b"ok" {
                Ok(Box::new(crate::compute::EdgeListCompute::new()) as Box<dyn ComputeUnit>)
            } else {
                Err(InitError::ModuleLoad("bad payload".to_string()))
            }
        });

        assert!(loader.load(&pack_artifact("probe", b"ok")).is_ok());
        assert!(matches!(
            loader.load(&pack_artifact("probe", b"nope")),
            Err(InitError::ModuleLoad(_))
        ));
    }
}
