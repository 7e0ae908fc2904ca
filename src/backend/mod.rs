// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash, one file per Vulkan object family.
// Creation order: instance -> surface -> device -> swapchain -> pipeline.

pub mod command;
pub mod device;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use surface::Surface;
pub use swapchain::Swapchain;
