//! Initialization error types.

use ash::vk;
use thiserror::Error;

/// Errors raised during instance, adapter, or device construction.
#[derive(Error, Debug)]
pub enum InitError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Failed to load the Vulkan library.
    #[error("Failed to load Vulkan: {0}")]
    EntryLoad(String),

    /// Required instance extension not supported by the runtime.
    #[error("Instance does not support extension: {0}")]
    MissingInstanceExtension(String),

    /// Required validation layer not supported by the runtime.
    #[error("Instance does not support layer: {0}")]
    MissingInstanceLayer(String),

    /// Required device extension not supported by an adapter.
    #[error("Device '{adapter}' does not support extension: {extension}")]
    MissingDeviceExtension {
        /// Name of the adapter that lacked the extension.
        adapter: String,
        /// Name of the missing extension.
        extension: String,
    },

    /// Device creation was attempted with an empty adapter list.
    #[error("No adapters supplied for device creation")]
    NoAdapters,

    /// None of the requested queue classes matched a queue family.
    #[error("No queue family matched the requested queue classes")]
    NoSuitableQueue,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, InitError>;
