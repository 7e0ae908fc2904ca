// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;

use super::device::QueueFamilyIndices;
use super::surface::{Surface, SurfaceSupport};
use super::VulkanDevice;

/// Prefer SRGB BGRA, otherwise take whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .context("No suitable surface format")
}

/// Use the preferred mode when available; FIFO is always supported
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == preferred)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface dictates the extent unless it reports u32::MAX
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum)
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

/// Images are shared between both families only when they differ
pub fn sharing_mode(families: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    match (families.graphics, families.present) {
        (Some(graphics), Some(present)) if graphics != present => {
            (vk::SharingMode::CONCURRENT, vec![graphics, present])
        }
        _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
    }
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        surface: &Surface,
        preferred_present_mode: vk::PresentModeKHR,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let support: SurfaceSupport = surface.query_support(device.physical_device)?;

        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = choose_image_count(&support.capabilities);
        let (sharing, family_indices) = sharing_mode(&device.queue_families);

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width, extent.height, image_count, surface_format.format, present_mode
        );

        let swapchain_loader = khr::Swapchain::new(&device.instance.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(&family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e).context("Failed to get swapchain images");
            }
        };

        // Build the struct early so Drop cleans up views created before a failure
        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::with_capacity(images.len()),
            format: surface_format.format,
            extent,
            present_mode,
            device,
        };

        for &image in &images {
            let view = create_image_view(&this.device, image, this.format)?;
            this.image_views.push(view);
        }
        this.images = images;

        log::info!("Created swapchain with {} images", this.images.len());

        Ok(this)
    }

    /// Acquire next image for rendering.
    ///
    /// Returns `None` when the swapchain is out of date and must be recreated.
    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> Result<Option<(u32, bool)>> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(Some((index, suboptimal))),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(e).context("Failed to acquire swapchain image"),
        }
    }

    /// Present rendered image to screen.
    ///
    /// Returns true when the swapchain should be recreated.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e).context("Failed to present swapchain image"),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn create_image_view(device: &VulkanDevice, image: vk::Image, format: vk::Format) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.device.create_image_view(&create_info, None) }
        .context("Failed to create image view")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            ..Default::default()
        }
    }

    #[test]
    fn surface_format_prefers_bgra_srgb() {
        let fallback = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let preferred = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);

        let chosen = choose_surface_format(&[fallback, preferred]).unwrap();
        assert_eq!(chosen.format, preferred.format);
        assert_eq!(chosen.color_space, preferred.color_space);
    }

    #[test]
    fn surface_format_needs_matching_color_space() {
        let first = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let wrong_space = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT);

        let chosen = choose_surface_format(&[first, wrong_space]).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn surface_format_rejects_empty_list() {
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn present_mode_uses_preference_when_listed() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_current_when_fixed() {
        let caps = caps((1280, 720), (1, 1), (4096, 4096));
        let chosen = choose_extent(&caps, 1920, 1080);
        assert_eq!((chosen.width, chosen.height), (1280, 720));
    }

    #[test]
    fn extent_clamps_when_variable() {
        let caps = caps((u32::MAX, u32::MAX), (100, 200), (800, 600));
        let chosen = choose_extent(&caps, 1920, 50);
        assert_eq!((chosen.width, chosen.height), (800, 200));

        let chosen = choose_extent(&caps, 480, 480);
        assert_eq!((chosen.width, chosen.height), (480, 480));
    }

    #[test]
    fn image_count_is_min_plus_one() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_is_capped_by_max() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn zero_max_image_count_means_unbounded() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 4,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 5);
    }

    #[test]
    fn same_family_is_exclusive() {
        let families = QueueFamilyIndices { graphics: Some(0), present: Some(0) };
        let (mode, indices) = sharing_mode(&families);
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());
    }

    #[test]
    fn split_families_are_concurrent() {
        let families = QueueFamilyIndices { graphics: Some(0), present: Some(2) };
        let (mode, indices) = sharing_mode(&families);
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }
}
