// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (must present to our surface, prefer discrete GPU)
// - Logical device + graphics/present queue creation

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::sync::Arc;

use super::instance::{layer_pointers, VulkanInstance};
use super::surface::Surface;

/// Required Vulkan device features for our renderer
const REQUIRED_DEVICE_FEATURES: vk::PhysicalDeviceFeatures = vk::PhysicalDeviceFeatures {
    sampler_anisotropy: vk::TRUE,
    ..unsafe { std::mem::zeroed() }
};

const QUEUE_PRIORITY: f32 = 0.5;

/// Queue families used for drawing and presenting (may be the same family)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, one queue is created per entry
    pub fn unique(&self) -> BTreeSet<u32> {
        self.graphics.into_iter().chain(self.present).collect()
    }
}

/// Walk the families in order and stop at the first point both roles are filled.
///
/// A later family overwrites an earlier pick for the same role until then.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut present_support: impl FnMut(u32) -> Result<bool>,
) -> Result<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if present_support(i)? {
            indices.present = Some(i);
        }
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(i);
        }
        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

/// Score a device; higher is better. Devices without geometry shaders score 0.
pub fn rate_device(
    properties: &vk::PhysicalDeviceProperties,
    features: &vk::PhysicalDeviceFeatures,
) -> u32 {
    if features.geometry_shader != vk::TRUE {
        return 0;
    }

    let mut score = 0;
    if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }
    score + properties.limits.max_image_dimension2_d
}

/// Highest score wins; on a tie the later candidate is taken.
pub fn pick_best<T>(candidates: impl IntoIterator<Item = (u32, T)>) -> Option<T> {
    candidates
        .into_iter()
        .max_by_key(|(score, _)| *score)
        .map(|(_, candidate)| candidate)
}

/// True when every name in `required` is in `available`
pub fn supports_extensions(available: &[&CStr], required: &[&CStr]) -> bool {
    required.iter().all(|ext| available.contains(ext))
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: Arc<VulkanInstance>,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilyIndices,
}

impl VulkanDevice {
    /// Pick the best GPU able to present to `surface` and open a logical device on it
    pub fn new(instance: Arc<VulkanInstance>, surface: &Surface) -> Result<Arc<Self>> {
        let (physical_device, queue_families) = Self::pick_physical_device(&instance, surface)?;

        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical_device)
        };
        let memory_properties = unsafe {
            instance.instance.get_physical_device_memory_properties(physical_device)
        };

        log::info!("Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
                .to_string_lossy());
        log::info!("API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version));
        log_queue_families(&instance.instance, physical_device);
        log_memory_heaps(&memory_properties);

        let device = Self::create_logical_device(&instance, physical_device, &queue_families)?;

        let (graphics_family, present_family) = match (queue_families.graphics, queue_families.present) {
            (Some(graphics), Some(present)) => (graphics, present),
            _ => anyhow::bail!("Selected GPU lost its queue families"),
        };
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    fn pick_physical_device(
        instance: &VulkanInstance,
        surface: &Surface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut candidates = Vec::new();
        for device in devices {
            if let Some(families) = Self::check_device(instance, surface, device)? {
                let props = unsafe { instance.instance.get_physical_device_properties(device) };
                let features = unsafe { instance.instance.get_physical_device_features(device) };
                candidates.push((rate_device(&props, &features), (device, families)));
            }
        }

        pick_best(candidates).ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))
    }

    /// Queue families of `device` if it can run the renderer, `None` otherwise
    fn check_device(
        instance: &VulkanInstance,
        surface: &Surface,
        device: vk::PhysicalDevice,
    ) -> Result<Option<QueueFamilyIndices>> {
        let families = unsafe {
            instance.instance.get_physical_device_queue_family_properties(device)
        };
        let indices = find_queue_families(&families, |i| surface.supports_present(device, i))?;
        if !indices.is_complete() {
            return Ok(None);
        }

        let extensions = unsafe { instance.instance.enumerate_device_extension_properties(device) }
            .context("Failed to enumerate device extensions")?;
        let available = extensions
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
            .collect::<Vec<_>>();
        if !supports_extensions(&available, &[khr::Swapchain::name()]) {
            return Ok(None);
        }

        if !surface.query_support(device)?.is_adequate() {
            return Ok(None);
        }

        let features = unsafe { instance.instance.get_physical_device_features(device) };
        if features.sampler_anisotropy != vk::TRUE {
            return Ok(None);
        }

        Ok(Some(indices))
    }

    fn create_logical_device(
        instance: &VulkanInstance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
    ) -> Result<ash::Device> {
        let queue_priorities = [QUEUE_PRIORITY];
        let queue_create_infos = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect::<Vec<_>>();

        let extensions = [khr::Swapchain::name().as_ptr()];

        // Device layers are deprecated, but older loaders still read them
        let layer_names = layer_pointers(instance.validation);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .enabled_features(&REQUIRED_DEVICE_FEATURES);

        let device = unsafe {
            instance.instance.create_device(physical_device, &create_info, None)
        }
        .context("Failed to create logical device")?;

        Ok(device)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

fn log_queue_families(instance: &ash::Instance, physical_device: vk::PhysicalDevice) {
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    for (i, family) in families.iter().enumerate() {
        log::info!("Queue family {}: {} queues, {:?}", i, family.queue_count, family.queue_flags);
    }
}

fn log_memory_heaps(memory: &vk::PhysicalDeviceMemoryProperties) {
    for (i, heap) in memory.memory_heaps[..memory.memory_heap_count as usize]
        .iter()
        .enumerate()
    {
        log::info!("Memory heap {}: {} MiB, {:?}", i, heap.size / (1024 * 1024), heap.flags);
    }
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

    fn device(kind: vk::PhysicalDeviceType, max_dim: u32) -> vk::PhysicalDeviceProperties {
        let mut props = vk::PhysicalDeviceProperties {
            device_type: kind,
            ..Default::default()
        };
        props.limits.max_image_dimension2_d = max_dim;
        props
    }

    fn features(geometry_shader: bool) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures {
            geometry_shader: geometry_shader as vk::Bool32,
            ..Default::default()
        }
    }

    #[test]
    fn single_family_does_everything() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = find_queue_families(&families, |_| Ok(true)).unwrap();
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.unique().into_iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn split_graphics_and_present_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = find_queue_families(&families, |i| Ok(i == 1)).unwrap();
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique().into_iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn later_family_overrides_until_complete() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        // Family 0 presents, family 1 completes the pair, family 2 is never looked at
        let mut asked = Vec::new();
        let indices = find_queue_families(&families, |i| {
            asked.push(i);
            Ok(i != 2)
        })
        .unwrap();
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
        assert_eq!(asked, vec![0, 1]);
    }

    #[test]
    fn no_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = find_queue_families(&families, |_| Ok(false)).unwrap();
        assert!(!indices.is_complete());
        assert_eq!(indices.graphics, Some(0));
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = find_queue_families(&families, |_| anyhow::bail!("surface lost"));
        assert!(result.is_err());
    }

    #[test]
    fn discrete_gpu_outranks_integrated() {
        let discrete = rate_device(&device(vk::PhysicalDeviceType::DISCRETE_GPU, 16384), &features(true));
        let integrated = rate_device(&device(vk::PhysicalDeviceType::INTEGRATED_GPU, 16384), &features(true));
        assert_eq!(discrete, 1000 + 16384);
        assert_eq!(integrated, 16384);
    }

    #[test]
    fn missing_geometry_shader_scores_zero() {
        let score = rate_device(&device(vk::PhysicalDeviceType::DISCRETE_GPU, 32768), &features(false));
        assert_eq!(score, 0);
    }

    #[test]
    fn best_candidate_wins_and_ties_take_the_last() {
        assert_eq!(pick_best([(10, "a"), (30, "b"), (20, "c")]), Some("b"));
        assert_eq!(pick_best([(5, "first"), (5, "second")]), Some("second"));
        assert_eq!(pick_best([(0, "only")]), Some("only"));
        assert_eq!(pick_best(Vec::<(u32, &str)>::new()), None);
    }

    #[test]
    fn swapchain_extension_must_be_listed() {
        let swapchain = khr::Swapchain::name();
        let other = c"VK_KHR_maintenance1";
        assert!(supports_extensions(&[other, swapchain], &[swapchain]));
        assert!(!supports_extensions(&[other], &[swapchain]));
        assert!(supports_extensions(&[], &[]));
    }
}
