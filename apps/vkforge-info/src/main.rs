//! Adapter and device negotiation diagnostic tool.
//!
//! Enumerates every adapter the runtime exposes, dumps its queue families and
//! extensions, then constructs a logical device on each adapter and prints
//! the negotiated queue selection.
//!
//! ```bash
//! cargo run -p vkforge-info
//! ```
//!
//! `RUST_LOG` controls verbosity (e.g. info, debug).

use ash::vk;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vkforge::{CapabilitySet, DeviceRequest, InstanceBuilder, LogicalDevice, SWAPCHAIN_EXTENSION};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let instance = Arc::new(
        InstanceBuilder::new()
            .app_name("vkforge-info")
            .extension("VK_KHR_surface", false)
            .extension("VK_KHR_xlib_surface", false)
            .validation(true)
            .build()?,
    );

    tracing::info!(
        "Runtime {}.{}.{}: {} instance extension(s), {} layer(s)",
        vk::api_version_major(instance.api_version()),
        vk::api_version_minor(instance.api_version()),
        vk::api_version_patch(instance.api_version()),
        instance.registry().extensions().len(),
        instance.registry().layers().len(),
    );

    let adapters = instance.adapters()?;
    for adapter in &adapters {
        let props = adapter.properties();
        tracing::info!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} device extension(s)",
            adapter.name(),
            props.device_type,
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            vk::api_version_patch(props.api_version),
            adapter.extensions().len(),
        );
        for (index, family) in adapter.queue_family_properties().iter().enumerate() {
            tracing::info!(
                "  family {}: {:?} ({} queues)",
                index,
                family.queue_flags,
                family.queue_count,
            );
        }
    }

    // One device per adapter; swapchain stays opportunistic so headless
    // adapters still negotiate.
    let request = DeviceRequest {
        extensions: CapabilitySet::new().optional(SWAPCHAIN_EXTENSION),
        queues: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
    };

    for adapter in adapters {
        let name = adapter.name().to_owned();
        match LogicalDevice::new(vec![adapter], &request) {
            Ok(device) => {
                let selection = device.queue_selection();
                tracing::info!(
                    "{}: graphics={:?} compute={:?} transfer={:?} extensions={:?}",
                    name,
                    selection.graphics,
                    selection.compute,
                    selection.transfer,
                    device.enabled_extensions(),
                );
            }
            Err(err) => tracing::warn!("{}: device creation failed: {}", name, err),
        }
    }

    Ok(())
}
