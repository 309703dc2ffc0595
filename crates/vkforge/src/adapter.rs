//! Physical adapter introspection.
//!
//! An [`Adapter`] snapshots one physical device's static capabilities at
//! construction (features, memory layout, limits, queue families, extensions)
//! and answers capability questions against that cache. Nothing is re-queried
//! after construction.

use crate::capability::ExtensionInfo;
use crate::error::{InitError, Result};
use crate::instance::Instance;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

/// One physical GPU/compute adapter enumerated under an [`Instance`].
pub struct Adapter {
    instance: Arc<Instance>,
    handle: vk::PhysicalDevice,
    features: vk::PhysicalDeviceFeatures,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    properties: vk::PhysicalDeviceProperties,
    queue_families: Vec<vk::QueueFamilyProperties>,
    extensions: Vec<ExtensionInfo>,
    name: String,
}

impl Adapter {
    /// Snapshot the adapter's capabilities.
    ///
    /// Any query failure is a construction failure; no partially initialized
    /// adapter is returned.
    pub fn new(instance: Arc<Instance>, handle: vk::PhysicalDevice) -> Result<Self> {
        unsafe {
            let raw = instance.handle();

            let features = raw.get_physical_device_features(handle);
            let memory_properties = raw.get_physical_device_memory_properties(handle);
            let properties = raw.get_physical_device_properties(handle);
            let queue_families = raw.get_physical_device_queue_family_properties(handle);

            let extensions = raw
                .enumerate_device_extension_properties(handle)?
                .iter()
                .filter_map(|ext| {
                    let name = CStr::from_ptr(ext.extension_name.as_ptr()).to_str().ok()?;
                    Some(ExtensionInfo {
                        name: name.to_owned(),
                        spec_version: ext.spec_version,
                    })
                })
                .collect();

            let name = CStr::from_ptr(properties.device_name.as_ptr())
                .to_string_lossy()
                .into_owned();

            Ok(Self {
                instance,
                handle,
                features,
                memory_properties,
                properties,
                queue_families,
                extensions,
                name,
            })
        }
    }

    /// The instance this adapter was enumerated under.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Get the raw physical device handle.
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Human-readable device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached feature flags.
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    /// Cached memory heap/type table.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Cached device properties.
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Cached device limits.
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    /// Ordered queue family descriptors.
    pub fn queue_family_properties(&self) -> &[vk::QueueFamilyProperties] {
        &self.queue_families
    }

    /// Number of queue families.
    pub fn queue_family_count(&self) -> usize {
        self.queue_families.len()
    }

    /// Supported device extensions.
    pub fn extensions(&self) -> &[ExtensionInfo] {
        &self.extensions
    }

    /// Whether any queue family supports any of the operation classes in
    /// `class_mask`.
    pub fn is_queue_class_supported(&self, class_mask: vk::QueueFlags) -> bool {
        any_family_supports(&self.queue_families, class_mask)
    }

    /// Whether the exact extension name appears in the cached list.
    pub fn is_extension_supported(&self, name: &str) -> bool {
        self.extensions.iter().any(|ext| ext.name == name)
    }

    /// Whether the given queue family can present to `surface`.
    ///
    /// A null surface yields `false`; any runtime failure of the underlying
    /// query is an error.
    pub fn is_presentable(
        &self,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        queue_family_index: u32,
    ) -> Result<bool> {
        if surface == vk::SurfaceKHR::null() {
            return Ok(false);
        }
        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(
                self.handle,
                queue_family_index,
                surface,
            )?
        };
        Ok(supported)
    }

    /// Whether images of the given format/kind/tiling/usage can be created.
    ///
    /// A negative answer from the runtime is a normal `Ok(false)`; any other
    /// non-success status is an error.
    pub fn is_format_supported(
        &self,
        format: vk::Format,
        image_type: vk::ImageType,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
    ) -> Result<bool> {
        let result = unsafe {
            self.instance.handle().get_physical_device_image_format_properties(
                self.handle,
                format,
                image_type,
                tiling,
                usage,
                vk::ImageCreateFlags::empty(),
            )
        };
        match result {
            Ok(_) => Ok(true),
            Err(vk::Result::ERROR_FORMAT_NOT_SUPPORTED) => Ok(false),
            Err(err) => Err(InitError::Vulkan(err)),
        }
    }

    /// Query format properties for `format`.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .handle()
                .get_physical_device_format_properties(self.handle, format)
        }
    }

    /// First candidate format whose tiling features contain `features`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|&format| {
            let props = self.format_properties(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
    }

    /// Fill a typed property block through the `properties2` chain protocol.
    ///
    /// The requested block is linked into the query chain and filled by the
    /// runtime; requires an instance with API version 1.1 or newer.
    pub fn extended_properties<T>(&self) -> T
    where
        T: vk::ExtendsPhysicalDeviceProperties2 + Default,
    {
        let mut request = T::default();
        let mut query = vk::PhysicalDeviceProperties2::default().push_next(&mut request);
        unsafe {
            self.instance
                .handle()
                .get_physical_device_properties2(self.handle, &mut query);
        }
        request
    }

    /// Fill a typed feature block through the `features2` chain protocol.
    pub fn extended_features<T>(&self) -> T
    where
        T: vk::ExtendsPhysicalDeviceFeatures2 + Default,
    {
        let mut request = T::default();
        let mut query = vk::PhysicalDeviceFeatures2::default().push_next(&mut request);
        unsafe {
            self.instance
                .handle()
                .get_physical_device_features2(self.handle, &mut query);
        }
        request
    }

    /// Driver identification properties.
    pub fn driver_properties(&self) -> vk::PhysicalDeviceDriverProperties<'static> {
        self.extended_properties()
    }

    /// Subgroup size and supported-operation properties.
    pub fn subgroup_properties(&self) -> vk::PhysicalDeviceSubgroupProperties<'static> {
        self.extended_properties()
    }
}

pub(crate) fn any_family_supports(
    families: &[vk::QueueFamilyProperties],
    class_mask: vk::QueueFlags,
) -> bool {
    families
        .iter()
        .any(|family| family.queue_flags.intersects(class_mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn queue_class_scan_intersects_bitmasks() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];

        assert!(any_family_supports(&families, vk::QueueFlags::GRAPHICS));
        assert!(any_family_supports(
            &families,
            vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        ));
        assert!(!any_family_supports(&families, vk::QueueFlags::COMPUTE));
        assert!(!any_family_supports(&families, vk::QueueFlags::SPARSE_BINDING));
    }

    #[test]
    fn no_families_supports_nothing() {
        assert!(!any_family_supports(&[], vk::QueueFlags::GRAPHICS));
    }
}
