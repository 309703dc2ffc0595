//! Vulkan initialization and capability negotiation.
//!
//! This crate provides:
//! - Instance creation with extension/layer negotiation
//! - Physical adapter introspection and capability queries
//! - Logical device and device-group construction with queue-family selection
//! - Command pool and submission pass-throughs
//!
//! Construction flows one way: a capability snapshot is taken, adapters are
//! enumerated and cached, then a device is negotiated over them. Nothing is
//! re-queried or mutated after construction; failures during negotiation name
//! the capability (and adapter) that could not be satisfied.

pub mod adapter;
pub mod capability;
pub mod command;
pub mod device;
pub mod error;
pub mod instance;

pub use adapter::Adapter;
pub use capability::{CapabilityEntry, CapabilityRegistry, CapabilitySet, ExtensionInfo, LayerInfo};
pub use command::CommandPool;
pub use device::{find_memory_type, DeviceRequest, LogicalDevice, QueueSelection, SWAPCHAIN_EXTENSION};
pub use error::{InitError, Result};
pub use instance::{Instance, InstanceBuilder, VALIDATION_LAYER};
