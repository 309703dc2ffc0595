//! Runtime capability introspection and negotiation.
//!
//! A [`CapabilityRegistry`] is a one-time snapshot of the extensions and
//! validation layers the Vulkan runtime exposes. A [`CapabilitySet`] is the
//! caller's side of the contract: an ordered list of capability names, each
//! flagged required or optional, that is matched against a snapshot when an
//! instance or device is constructed.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::ffi::CStr;

/// A supported extension as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInfo {
    /// Extension name, e.g. `VK_KHR_surface`.
    pub name: String,
    /// Extension specification version.
    pub spec_version: u32,
}

/// A supported validation layer as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    /// Layer name, e.g. `VK_LAYER_KHRONOS_validation`.
    pub name: String,
    /// Vulkan version the layer was written against.
    pub spec_version: u32,
    /// Version of the layer implementation itself.
    pub implementation_version: u32,
    /// Free-form description supplied by the layer.
    pub description: String,
}

/// Snapshot of the capabilities the runtime supports.
///
/// Taken once at instance construction; pure query logic afterwards.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    extensions: Vec<ExtensionInfo>,
    layers: Vec<LayerInfo>,
}

impl CapabilityRegistry {
    /// Query the runtime for supported instance extensions and layers.
    ///
    /// # Safety
    /// The entry must be a valid Vulkan entry point.
    pub unsafe fn query(entry: &ash::Entry) -> Result<Self> {
        let extensions = entry
            .enumerate_instance_extension_properties(None)?
            .iter()
            .filter_map(|ext| {
                let name = CStr::from_ptr(ext.extension_name.as_ptr()).to_str().ok()?;
                Some(ExtensionInfo {
                    name: name.to_owned(),
                    spec_version: ext.spec_version,
                })
            })
            .collect();

        let layers = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .filter_map(|layer| {
                let name = CStr::from_ptr(layer.layer_name.as_ptr()).to_str().ok()?;
                let description = CStr::from_ptr(layer.description.as_ptr())
                    .to_string_lossy()
                    .into_owned();
                Some(LayerInfo {
                    name: name.to_owned(),
                    spec_version: layer.spec_version,
                    implementation_version: layer.implementation_version,
                    description,
                })
            })
            .collect();

        Ok(Self { extensions, layers })
    }

    pub(crate) fn from_parts(extensions: Vec<ExtensionInfo>, layers: Vec<LayerInfo>) -> Self {
        Self { extensions, layers }
    }

    /// Supported instance extensions, in enumeration order.
    pub fn extensions(&self) -> &[ExtensionInfo] {
        &self.extensions
    }

    /// Supported validation layers, in enumeration order.
    pub fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    /// Whether the exact extension name appears in the snapshot.
    pub fn is_extension_supported(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext.name == name)
    }

    /// Whether the exact layer name appears in the snapshot.
    pub fn is_layer_supported(&self, name: &str) -> bool {
        self.layers.iter().any(|layer| layer.name == name)
    }
}

/// One requested capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    /// Extension or layer name.
    pub name: String,
    /// Required entries fail construction when unsupported; optional entries
    /// are enabled only when available.
    pub required: bool,
}

/// An ordered set of requested capabilities.
///
/// Order is preserved through negotiation, so constructing against the same
/// runtime snapshot twice yields the same enabled list both times.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    entries: Vec<CapabilityEntry>,
}

impl CapabilitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required capability.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.push(name, true);
        self
    }

    /// Add an optional capability.
    #[must_use]
    pub fn optional(mut self, name: impl Into<String>) -> Self {
        self.push(name, false);
        self
    }

    /// Append a capability with an explicit required flag.
    pub fn push(&mut self, name: impl Into<String>, required: bool) {
        self.entries.push(CapabilityEntry {
            name: name.into(),
            required,
        });
    }

    /// Requested entries, in request order.
    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    /// Whether no capabilities were requested.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Match a requested set against a support predicate.
///
/// Returns the enabled names in request order, deduplicated. A required entry
/// the predicate rejects aborts negotiation with that entry's name; an
/// optional one is silently skipped.
pub(crate) fn resolve(
    requested: &CapabilitySet,
    is_supported: impl Fn(&str) -> bool,
) -> std::result::Result<Vec<String>, String> {
    let mut enabled = Vec::with_capacity(requested.entries().len());
    for entry in requested.entries() {
        if is_supported(&entry.name) {
            if !enabled.contains(&entry.name) {
                enabled.push(entry.name.clone());
            }
        } else if entry.required {
            return Err(entry.name.clone());
        }
    }
    Ok(enabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::from_parts(
            vec![
                ExtensionInfo {
                    name: "VK_KHR_surface".into(),
                    spec_version: 25,
                },
                ExtensionInfo {
                    name: "VK_KHR_xlib_surface".into(),
                    spec_version: 6,
                },
            ],
            vec![LayerInfo {
                name: "VK_LAYER_KHRONOS_validation".into(),
                spec_version: 1,
                implementation_version: 1,
                description: "Khronos validation layer".into(),
            }],
        )
    }

    #[test]
    fn extension_lookup_is_exact() {
        let registry = registry();
        assert!(registry.is_extension_supported("VK_KHR_surface"));
        // A strict substring of a supported name must not match.
        assert!(!registry.is_extension_supported("VK_KHR_surf"));
        assert!(!registry.is_extension_supported("VK_KHR_surface_protected"));
    }

    #[test]
    fn layer_lookup_is_exact() {
        let registry = registry();
        assert!(registry.is_layer_supported("VK_LAYER_KHRONOS_validation"));
        assert!(!registry.is_layer_supported("VK_LAYER_KHRONOS"));
    }

    #[test]
    fn required_missing_capability_fails_with_name() {
        let registry = registry();
        let requested = CapabilitySet::new()
            .required("VK_KHR_surface")
            .required("VK_EXT_debug_utils");

        let missing = resolve(&requested, |name| registry.is_extension_supported(name))
            .expect_err("unsupported required extension must fail");
        assert_eq!(missing, "VK_EXT_debug_utils");
    }

    #[test]
    fn optional_missing_capability_is_skipped() {
        let registry = registry();
        let requested = CapabilitySet::new()
            .optional("VK_EXT_debug_utils")
            .required("VK_KHR_surface");

        let enabled = resolve(&requested, |name| registry.is_extension_supported(name)).unwrap();
        assert_eq!(enabled, vec!["VK_KHR_surface".to_string()]);
    }

    #[test]
    fn optional_supported_capability_is_enabled() {
        let registry = registry();
        let requested = CapabilitySet::new().optional("VK_KHR_xlib_surface");

        let enabled = resolve(&requested, |name| registry.is_extension_supported(name)).unwrap();
        assert_eq!(enabled, vec!["VK_KHR_xlib_surface".to_string()]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let registry = registry();
        let requested = CapabilitySet::new()
            .required("VK_KHR_surface")
            .optional("VK_EXT_debug_utils")
            .optional("VK_KHR_xlib_surface");

        let first = resolve(&requested, |name| registry.is_extension_supported(name)).unwrap();
        let second = resolve(&requested, |name| registry.is_extension_supported(name)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_requests_are_enabled_once() {
        let registry = registry();
        let requested = CapabilitySet::new()
            .required("VK_KHR_surface")
            .optional("VK_KHR_surface");

        let enabled = resolve(&requested, |name| registry.is_extension_supported(name)).unwrap();
        assert_eq!(enabled, vec!["VK_KHR_surface".to_string()]);
    }
}
