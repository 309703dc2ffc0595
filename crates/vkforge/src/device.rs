//! Logical device negotiation, queue-family selection, and device groups.

use crate::adapter::Adapter;
use crate::capability::{self, CapabilitySet};
use crate::error::{InitError, Result};
use ash::vk;
use std::ffi::CString;
use std::sync::Arc;

/// Name of the swapchain device extension.
pub const SWAPCHAIN_EXTENSION: &str = "VK_KHR_swapchain";

/// Requested device capabilities and queue classes.
#[derive(Debug, Clone)]
pub struct DeviceRequest {
    /// Requested device extensions.
    pub extensions: CapabilitySet,
    /// Queue operation classes the device should expose.
    pub queues: vk::QueueFlags,
}

impl Default for DeviceRequest {
    fn default() -> Self {
        Self {
            extensions: CapabilitySet::new().required(SWAPCHAIN_EXTENSION),
            queues: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
        }
    }
}

impl DeviceRequest {
    /// The default request: swapchain support plus graphics and transfer queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// A request for offscreen compute work: no extensions, compute and
    /// transfer queues only.
    pub fn headless() -> Self {
        Self {
            extensions: CapabilitySet::new(),
            queues: vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        }
    }
}

/// Queue-family indices resolved per workload class.
///
/// `None` is the "unavailable" sentinel: the class was either not requested
/// or no family on any supplied adapter matched it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSelection {
    /// Graphics family index.
    pub graphics: Option<u32>,
    /// Compute family index.
    pub compute: Option<u32>,
    /// Transfer family index (reuses the graphics family).
    pub transfer: Option<u32>,
    /// Present family index (reuses the graphics family).
    pub present: Option<u32>,
    /// Sparse-binding family index.
    pub sparse: Option<u32>,
}

impl QueueSelection {
    /// Whether no class resolved to a family.
    pub fn is_empty(&self) -> bool {
        self.graphics.is_none()
            && self.compute.is_none()
            && self.transfer.is_none()
            && self.present.is_none()
            && self.sparse.is_none()
    }

    /// Resolved family indices, deduplicated, in class order.
    pub(crate) fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::new();
        for family in [
            self.graphics,
            self.compute,
            self.transfer,
            self.present,
            self.sparse,
        ]
        .into_iter()
        .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Scan the supplied adapters' queue families for each requested class.
///
/// Families are scanned in adapter order, then index order; the first match
/// wins. Present and transfer reuse the graphics family rather than getting
/// an independent search; a platform requiring a disjoint present family must
/// special-case this upstream.
pub(crate) fn select_queue_families(
    family_lists: &[&[vk::QueueFamilyProperties]],
    requested: vk::QueueFlags,
) -> QueueSelection {
    let mut selection = QueueSelection::default();

    for families in family_lists {
        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if requested.contains(vk::QueueFlags::GRAPHICS)
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                && selection.graphics.is_none()
            {
                selection.graphics = Some(index);
            }
            if requested.contains(vk::QueueFlags::COMPUTE)
                && family.queue_flags.contains(vk::QueueFlags::COMPUTE)
                && selection.compute.is_none()
            {
                selection.compute = Some(index);
            }
            if requested.contains(vk::QueueFlags::SPARSE_BINDING)
                && family.queue_flags.contains(vk::QueueFlags::SPARSE_BINDING)
                && selection.sparse.is_none()
            {
                selection.sparse = Some(index);
            }
        }
    }

    selection.present = selection.graphics;
    selection.transfer = selection.graphics;

    selection
}

/// Extensions enabled on the device: requested entries, in request order,
/// that every supplied adapter resolved.
pub(crate) fn merge_enabled_extensions(
    requested: &CapabilitySet,
    per_adapter: &[Vec<String>],
) -> Vec<String> {
    let mut enabled = Vec::new();
    for entry in requested.entries() {
        if per_adapter.iter().all(|list| list.contains(&entry.name))
            && !enabled.contains(&entry.name)
        {
            enabled.push(entry.name.clone());
        }
    }
    enabled
}

/// The adapter handles listed in a device-group descriptor, or `None` when a
/// single adapter needs no group.
pub(crate) fn device_group_handles(
    handles: &[vk::PhysicalDevice],
) -> Option<Vec<vk::PhysicalDevice>> {
    (handles.len() > 1).then(|| handles.to_vec())
}

/// First memory type index matching `type_filter` with all of `properties`.
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory.memory_type_count).find(|&index| {
        (type_filter & (1u32 << index)) != 0
            && memory.memory_types[index as usize]
                .property_flags
                .contains(properties)
    })
}

/// A logical device negotiated over one or more adapters.
///
/// Owns the native device handle and the queue handles derived from it; both
/// are released exactly once on drop. The adapters the device was built from
/// are retained for its lifetime.
pub struct LogicalDevice {
    handle: ash::Device,
    adapters: Vec<Arc<Adapter>>,
    selection: QueueSelection,
    enabled_extensions: Vec<String>,
    group: bool,
    graphics_queue: Option<vk::Queue>,
    compute_queue: Option<vk::Queue>,
    transfer_queue: Option<vk::Queue>,
    present_queue: Option<vk::Queue>,
    sparse_queue: Option<vk::Queue>,
}

impl LogicalDevice {
    /// Negotiate and create a device spanning the supplied adapters.
    ///
    /// With more than one adapter the device is created as a device group
    /// listing every adapter's handle, in the order supplied; the device
    /// itself is created against the first adapter.
    pub fn new(adapters: Vec<Arc<Adapter>>, request: &DeviceRequest) -> Result<Self> {
        let first = adapters.first().ok_or(InitError::NoAdapters)?;

        let family_lists: Vec<&[vk::QueueFamilyProperties]> = adapters
            .iter()
            .map(|adapter| adapter.queue_family_properties())
            .collect();
        let selection = select_queue_families(&family_lists, request.queues);
        if selection.is_empty() {
            return Err(InitError::NoSuitableQueue);
        }

        let mut per_adapter = Vec::with_capacity(adapters.len());
        for adapter in &adapters {
            let resolved = capability::resolve(&request.extensions, |name| {
                adapter.is_extension_supported(name)
            })
            .map_err(|extension| InitError::MissingDeviceExtension {
                adapter: adapter.name().to_owned(),
                extension,
            })?;
            per_adapter.push(resolved);
        }
        let enabled_extensions = merge_enabled_extensions(&request.extensions, &per_adapter);

        let handle = unsafe { create_device(&adapters, &selection, &enabled_extensions)? };

        let graphics_queue = selection
            .graphics
            .map(|family| unsafe { handle.get_device_queue(family, 0) });
        let compute_queue = selection
            .compute
            .map(|family| unsafe { handle.get_device_queue(family, 0) });
        let transfer_queue = selection
            .transfer
            .map(|family| unsafe { handle.get_device_queue(family, 0) });
        let present_queue = selection
            .present
            .map(|family| unsafe { handle.get_device_queue(family, 0) });
        let sparse_queue = selection
            .sparse
            .map(|family| unsafe { handle.get_device_queue(family, 0) });

        let group = adapters.len() > 1;
        tracing::info!(
            adapter = first.name(),
            group,
            "Created logical device"
        );
        tracing::debug!(extensions = ?enabled_extensions, selection = ?selection, "Device configuration");

        Ok(Self {
            handle,
            adapters,
            selection,
            enabled_extensions,
            group,
            graphics_queue,
            compute_queue,
            transfer_queue,
            present_queue,
            sparse_queue,
        })
    }

    /// Get the raw device handle.
    pub fn handle(&self) -> &ash::Device {
        &self.handle
    }

    /// Adapters the device was built from, in the order supplied.
    pub fn adapters(&self) -> &[Arc<Adapter>] {
        &self.adapters
    }

    /// Get one of the device's adapters.
    pub fn adapter(&self, index: usize) -> &Arc<Adapter> {
        &self.adapters[index]
    }

    /// Number of adapters participating in the device.
    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    /// Whether the device spans multiple adapters as a device group.
    pub fn is_group(&self) -> bool {
        self.group
    }

    /// Resolved queue-family indices per workload class.
    pub fn queue_selection(&self) -> QueueSelection {
        self.selection
    }

    /// Extensions enabled on the device, in negotiation order.
    pub fn enabled_extensions(&self) -> &[String] {
        &self.enabled_extensions
    }

    /// Get the graphics queue, if a graphics family was resolved.
    pub fn graphics_queue(&self) -> Option<vk::Queue> {
        self.graphics_queue
    }

    /// Get the compute queue, if a compute family was resolved.
    pub fn compute_queue(&self) -> Option<vk::Queue> {
        self.compute_queue
    }

    /// Get the transfer queue.
    pub fn transfer_queue(&self) -> Option<vk::Queue> {
        self.transfer_queue
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> Option<vk::Queue> {
        self.present_queue
    }

    /// Get the sparse-binding queue.
    pub fn sparse_queue(&self) -> Option<vk::Queue> {
        self.sparse_queue
    }

    /// Format support, answered by the first adapter.
    pub fn is_format_supported(
        &self,
        format: vk::Format,
        image_type: vk::ImageType,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
    ) -> Result<bool> {
        self.adapters[0].is_format_supported(format, image_type, tiling, usage)
    }

    /// First matching memory type on the first adapter.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        find_memory_type(self.adapters[0].memory_properties(), type_filter, properties)
    }

    /// Wait for the device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.handle.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.handle.device_wait_idle();
            self.handle.destroy_device(None);
        }
    }
}

/// Build the queue-create and group descriptors and create the native device.
///
/// # Safety
/// Every adapter handle and the owning instance must be valid.
unsafe fn create_device(
    adapters: &[Arc<Adapter>],
    selection: &QueueSelection,
    extensions: &[String],
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let families = selection.unique_families();
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_cstrings: Vec<CString> = extensions
        .iter()
        .map(|name| CString::new(name.as_str()).unwrap())
        .collect();
    let extension_names: Vec<*const i8> =
        extension_cstrings.iter().map(|name| name.as_ptr()).collect();

    let all_handles: Vec<vk::PhysicalDevice> =
        adapters.iter().map(|adapter| adapter.handle()).collect();
    let group_handles = device_group_handles(&all_handles);

    let mut group_info = vk::DeviceGroupDeviceCreateInfo::default();
    let mut create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names);

    if let Some(handles) = group_handles.as_deref() {
        group_info = group_info.physical_devices(handles);
        create_info = create_info.push_next(&mut group_info);
    }

    let device = adapters[0].instance().handle().create_device(
        adapters[0].handle(),
        &create_info,
        None,
    )?;

    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn shared_family_selected_for_graphics_and_compute() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];
        let selection = select_queue_families(
            &[&families],
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        );

        assert_eq!(selection.graphics, Some(0));
        assert_eq!(selection.compute, Some(0));
    }

    #[test]
    fn missing_compute_family_yields_sentinel() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER)];
        let selection = select_queue_families(
            &[&families],
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        );

        assert_eq!(selection.graphics, Some(0));
        assert_eq!(selection.compute, None);
    }

    #[test]
    fn lowest_matching_family_index_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let selection = select_queue_families(
            &[&families],
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        );

        assert_eq!(selection.graphics, Some(1));
        assert_eq!(selection.compute, Some(2));
    }

    #[test]
    fn present_and_transfer_reuse_graphics_family() {
        // Family 1 is a dedicated transfer family; the selection still
        // aliases transfer onto the graphics family.
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let selection = select_queue_families(
            &[&families],
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
        );

        assert_eq!(selection.graphics, Some(0));
        assert_eq!(selection.transfer, Some(0));
        assert_eq!(selection.present, Some(0));
    }

    #[test]
    fn unrequested_classes_stay_unresolved() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let selection = select_queue_families(&[&families], vk::QueueFlags::COMPUTE);

        assert_eq!(selection.compute, Some(1));
        assert_eq!(selection.graphics, None);
        assert_eq!(selection.transfer, None);
        assert_eq!(selection.present, None);
    }

    #[test]
    fn no_matching_family_is_empty_selection() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let selection = select_queue_families(&[&families], vk::QueueFlags::SPARSE_BINDING);

        assert!(selection.is_empty());
    }

    #[test]
    fn sparse_binding_family_is_scanned() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::SPARSE_BINDING),
        ];
        let selection = select_queue_families(
            &[&families],
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::SPARSE_BINDING,
        );

        assert_eq!(selection.sparse, Some(1));
    }

    #[test]
    fn unique_families_deduplicate_in_class_order() {
        let selection = QueueSelection {
            graphics: Some(0),
            compute: Some(1),
            transfer: Some(0),
            present: Some(0),
            sparse: None,
        };

        assert_eq!(selection.unique_families(), vec![0, 1]);
    }

    #[test]
    fn group_descriptor_lists_adapters_in_supplied_order() {
        let first = vk::PhysicalDevice::from_raw(1);
        let second = vk::PhysicalDevice::from_raw(2);

        let handles = device_group_handles(&[first, second]).unwrap();
        assert_eq!(handles, vec![first, second]);
    }

    #[test]
    fn single_adapter_uses_no_group_descriptor() {
        let only = vk::PhysicalDevice::from_raw(1);
        assert!(device_group_handles(&[only]).is_none());
    }

    #[test]
    fn optional_extension_needs_every_adapter() {
        let requested = CapabilitySet::new()
            .required("VK_KHR_swapchain")
            .optional("VK_EXT_memory_budget");
        let per_adapter = vec![
            vec![
                "VK_KHR_swapchain".to_string(),
                "VK_EXT_memory_budget".to_string(),
            ],
            vec!["VK_KHR_swapchain".to_string()],
        ];

        let enabled = merge_enabled_extensions(&requested, &per_adapter);
        assert_eq!(enabled, vec!["VK_KHR_swapchain".to_string()]);
    }

    #[test]
    fn memory_type_lookup_honors_filter_and_flags() {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 2,
            ..Default::default()
        };
        memory.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 0,
        };
        memory.memory_types[1] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 1,
        };

        assert_eq!(
            find_memory_type(&memory, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(1)
        );
        assert_eq!(
            find_memory_type(&memory, 0b01, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
        // Filtered out by the type mask even though the flags match.
        assert_eq!(
            find_memory_type(&memory, 0b01, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }
}
