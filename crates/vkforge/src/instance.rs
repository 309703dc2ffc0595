//! Vulkan instance creation and adapter enumeration.

use crate::adapter::Adapter;
use crate::capability::{self, CapabilityRegistry, CapabilitySet};
use crate::error::{InitError, Result};
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

/// Name of the standard Khronos validation layer.
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// The process-level connection to the Vulkan runtime.
///
/// Extensions and layers are negotiated once at construction and are
/// immutable afterwards. The native instance is destroyed exactly once when
/// the `Instance` is dropped; adapters hold an `Arc` back-reference, so the
/// handle outlives every [`Adapter`] derived from it.
pub struct Instance {
    // Entry must be kept alive for the lifetime of the instance
    entry: ash::Entry,
    handle: ash::Instance,
    registry: CapabilityRegistry,
    enabled_extensions: Vec<String>,
    enabled_layers: Vec<String>,
    api_version: u32,
    physical_devices: Vec<vk::PhysicalDevice>,
}

impl Instance {
    /// Adopt an externally created instance handle.
    ///
    /// The returned `Instance` takes ownership: the handle is destroyed on
    /// drop. Extension and layer lists report empty since the original
    /// negotiation is unknown.
    ///
    /// # Safety
    /// The entry must be the entry point the instance was created from, and
    /// the handle must not be destroyed elsewhere.
    pub unsafe fn from_handle(entry: ash::Entry, handle: ash::Instance) -> Result<Self> {
        let registry = CapabilityRegistry::query(&entry)?;
        let api_version = entry
            .try_enumerate_instance_version()?
            .unwrap_or(vk::API_VERSION_1_0);
        let physical_devices = handle.enumerate_physical_devices()?;

        Ok(Self {
            entry,
            handle,
            registry,
            enabled_extensions: Vec::new(),
            enabled_layers: Vec::new(),
            api_version,
            physical_devices,
        })
    }

    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the raw instance handle.
    pub fn handle(&self) -> &ash::Instance {
        &self.handle
    }

    /// The capability snapshot taken at construction.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Extensions enabled on this instance, in negotiation order.
    pub fn enabled_extensions(&self) -> &[String] {
        &self.enabled_extensions
    }

    /// Layers enabled on this instance, in negotiation order.
    pub fn enabled_layers(&self) -> &[String] {
        &self.enabled_layers
    }

    /// The runtime API version the instance was created with.
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Whether the exact extension name was supported at construction.
    pub fn is_extension_supported(&self, name: &str) -> bool {
        self.registry.is_extension_supported(name)
    }

    /// Whether the exact layer name was supported at construction.
    pub fn is_layer_supported(&self, name: &str) -> bool {
        self.registry.is_layer_supported(name)
    }

    /// Opaque handles of the enumerated physical adapters.
    pub fn physical_devices(&self) -> &[vk::PhysicalDevice] {
        &self.physical_devices
    }

    /// Number of enumerated physical adapters.
    pub fn physical_device_count(&self) -> usize {
        self.physical_devices.len()
    }

    /// Enumerate the physical-device groups the runtime exposes.
    pub fn device_group_properties(&self) -> Result<Vec<vk::PhysicalDeviceGroupProperties<'_>>> {
        unsafe {
            let count = self.handle.enumerate_physical_device_groups_len()?;
            let mut groups = vec![vk::PhysicalDeviceGroupProperties::default(); count];
            self.handle.enumerate_physical_device_groups(&mut groups)?;
            Ok(groups)
        }
    }

    /// Construct an [`Adapter`] for the physical device at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of range of [`Self::physical_devices`].
    pub fn adapter(self: &Arc<Self>, index: usize) -> Result<Arc<Adapter>> {
        let handle = self.physical_devices[index];
        Ok(Arc::new(Adapter::new(Arc::clone(self), handle)?))
    }

    /// Construct an [`Adapter`] for every enumerated physical device.
    pub fn adapters(self: &Arc<Self>) -> Result<Vec<Arc<Adapter>>> {
        (0..self.physical_devices.len())
            .map(|index| self.adapter(index))
            .collect()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            self.handle.destroy_instance(None);
        }
    }
}

/// Builder negotiating a new [`Instance`].
pub struct InstanceBuilder {
    app_name: String,
    app_version: u32,
    extensions: CapabilitySet,
    layers: CapabilitySet,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self {
            app_name: "VkForge".to_string(),
            app_version: vk::make_api_version(0, 0, 1, 0),
            extensions: CapabilitySet::new(),
            layers: CapabilitySet::new(),
        }
    }
}

impl InstanceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the application version (`vk::make_api_version` encoding).
    #[must_use]
    pub fn app_version(mut self, version: u32) -> Self {
        self.app_version = version;
        self
    }

    /// Request an instance extension.
    #[must_use]
    pub fn extension(mut self, name: impl Into<String>, required: bool) -> Self {
        self.extensions.push(name, required);
        self
    }

    /// Request a validation layer.
    #[must_use]
    pub fn layer(mut self, name: impl Into<String>, required: bool) -> Self {
        self.layers.push(name, required);
        self
    }

    /// Replace the requested extension set, e.g. one loaded from configuration.
    #[must_use]
    pub fn extensions(mut self, extensions: CapabilitySet) -> Self {
        self.extensions = extensions;
        self
    }

    /// Replace the requested layer set.
    #[must_use]
    pub fn layers(mut self, layers: CapabilitySet) -> Self {
        self.layers = layers;
        self
    }

    /// Opportunistically enable the Khronos validation layer.
    #[must_use]
    pub fn validation(mut self, enable: bool) -> Self {
        if enable {
            self.layers.push(VALIDATION_LAYER, false);
        }
        self
    }

    /// Negotiate and create the instance.
    pub fn build(self) -> Result<Instance> {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| InitError::EntryLoad(e.to_string()))?;
        unsafe { create_instance(entry, &self) }
    }

    /// Negotiate and create the instance from an already loaded entry point.
    ///
    /// # Safety
    /// The entry must be a valid Vulkan entry point.
    pub unsafe fn build_with_entry(self, entry: ash::Entry) -> Result<Instance> {
        create_instance(entry, &self)
    }
}

/// Negotiate extensions/layers and create the native instance.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
unsafe fn create_instance(entry: ash::Entry, builder: &InstanceBuilder) -> Result<Instance> {
    let registry = CapabilityRegistry::query(&entry)?;

    let enabled_extensions =
        capability::resolve(&builder.extensions, |name| {
            registry.is_extension_supported(name)
        })
        .map_err(InitError::MissingInstanceExtension)?;

    let enabled_layers = capability::resolve(&builder.layers, |name| {
        registry.is_layer_supported(name)
    })
    .map_err(InitError::MissingInstanceLayer)?;

    // Latest version the runtime supports; loaders predating 1.1 report none.
    let api_version = entry
        .try_enumerate_instance_version()?
        .unwrap_or(vk::API_VERSION_1_0);

    let app_name = CString::new(builder.app_name.as_str()).unwrap();
    let engine_name = CString::new("VkForge").unwrap();

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(builder.app_version)
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(api_version);

    let extension_cstrings: Vec<CString> = enabled_extensions
        .iter()
        .map(|name| CString::new(name.as_str()).unwrap())
        .collect();
    let extension_names: Vec<*const i8> =
        extension_cstrings.iter().map(|name| name.as_ptr()).collect();

    let layer_cstrings: Vec<CString> = enabled_layers
        .iter()
        .map(|name| CString::new(name.as_str()).unwrap())
        .collect();
    let layer_names: Vec<*const i8> = layer_cstrings.iter().map(|name| name.as_ptr()).collect();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names);

    let handle = entry.create_instance(&create_info, None)?;

    let physical_devices = match handle.enumerate_physical_devices() {
        Ok(devices) => devices,
        Err(err) => {
            handle.destroy_instance(None);
            return Err(err.into());
        }
    };

    tracing::info!(
        "Created Vulkan instance {}.{}.{} with {} adapter(s)",
        vk::api_version_major(api_version),
        vk::api_version_minor(api_version),
        vk::api_version_patch(api_version),
        physical_devices.len(),
    );
    tracing::debug!(extensions = ?enabled_extensions, layers = ?enabled_layers, "Instance capabilities");

    Ok(Instance {
        entry,
        handle,
        registry,
        enabled_extensions,
        enabled_layers,
        api_version,
        physical_devices,
    })
}
