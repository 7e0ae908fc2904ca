// Window surface - platform-specific connection between Vulkan and the window
//
// winit hands out raw-window-handle 0.6 handles, which we translate into the
// matching VK_KHR_*_surface create info ourselves.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::c_char;
use std::sync::Arc;
use winit::window::Window;

use super::VulkanInstance;

/// Presentation surface with automatic cleanup
pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: khr::Surface,
    // Keeps the instance alive until the surface is gone
    _instance: Arc<VulkanInstance>,
}

impl Surface {
    pub fn new(instance: Arc<VulkanInstance>, window: &Window) -> Result<Self> {
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();
        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        let surface = unsafe { create_surface(&instance, display_handle, window_handle) }?;
        let loader = khr::Surface::new(&instance.entry, &instance.instance);

        Ok(Self {
            surface,
            loader,
            _instance: instance,
        })
    }

    /// Whether queue family `family` of `physical_device` can present here
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.surface)
        }
        .context("Failed to query surface support")
    }

    pub fn query_support(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        SurfaceSupport::query(&self.loader, physical_device, self.surface)
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}

/// Everything a swapchain needs to know about a (device, surface) pair
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(
        loader: &khr::Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .context("Failed to query surface capabilities")?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .context("Failed to query surface formats")?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .context("Failed to query surface present modes")?,
            })
        }
    }

    /// A swapchain can only be built with at least one format and present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Instance extensions needed to create a surface for this display
pub fn required_extensions(display_handle: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let platform = match display_handle {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        _ => anyhow::bail!("Unsupported window handle type"),
    };
    Ok(vec![khr::Surface::name().as_ptr(), platform.as_ptr()])
}

unsafe fn create_surface(
    instance: &VulkanInstance,
    display_handle: RawDisplayHandle,
    window_handle: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    let entry = &instance.entry;
    let instance = &instance.instance;

    let surface = match (display_handle, window_handle) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as vk::HINSTANCE;
            let hwnd = handle.hwnd.get() as vk::HWND;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            khr::Win32Surface::new(entry, instance).create_win32_surface(&create_info, None)
        }
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
            let dpy = display
                .display
                .context("Xlib display handle is null")?
                .as_ptr();
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.cast())
                .window(window.window);
            khr::XlibSurface::new(entry, instance).create_xlib_surface(&create_info, None)
        }
        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
            let connection = display
                .connection
                .context("XCB connection handle is null")?
                .as_ptr();
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection)
                .window(window.window.get());
            khr::XcbSurface::new(entry, instance).create_xcb_surface(&create_info, None)
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(window.surface.as_ptr());
            khr::WaylandSurface::new(entry, instance).create_wayland_surface(&create_info, None)
        }
        _ => anyhow::bail!("Unsupported window handle type"),
    };

    surface.context("Failed to create window surface")
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{WaylandDisplayHandle, WebDisplayHandle};
    use std::ffi::CStr;
    use std::ptr::NonNull;

    #[test]
    fn adequate_needs_formats_and_present_modes() {
        let mut support = SurfaceSupport::default();
        assert!(!support.is_adequate());

        support.formats.push(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        });
        assert!(!support.is_adequate());

        support.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(support.is_adequate());

        support.formats.clear();
        assert!(!support.is_adequate());
    }

    #[test]
    fn wayland_needs_surface_and_wayland_extension() {
        let mut dummy = 0u8;
        let display = WaylandDisplayHandle::new(NonNull::from(&mut dummy).cast());
        let extensions = required_extensions(RawDisplayHandle::Wayland(display)).unwrap();

        let names: Vec<&CStr> = extensions
            .iter()
            .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
            .collect();
        assert_eq!(names, vec![khr::Surface::name(), khr::WaylandSurface::name()]);
    }

    #[test]
    fn web_display_is_unsupported() {
        let result = required_extensions(RawDisplayHandle::Web(WebDisplayHandle::new()));
        assert!(result.is_err());
    }
}
