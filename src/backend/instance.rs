// Vulkan Instance - Loader entry point
//
// Responsibilities:
// - Instance creation with validation layers
// - Debug messenger routing validation output into `log`

use anyhow::{Context, Result};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::surface;

/// Layers enabled when validation is requested
pub const VALIDATION_LAYERS: &[&CStr] = &[c"VK_LAYER_KHRONOS_validation"];

/// Vulkan instance wrapper with automatic cleanup
pub struct VulkanInstance {
    pub instance: ash::Instance,
    pub entry: Entry,
    pub validation: bool,

    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create Vulkan instance
    ///
    /// # Arguments
    /// * `app_name` - Application name reported to the driver
    /// * `enable_validation` - Enable Vulkan validation layers
    /// * `display_handle` - Decides which platform surface extension is enabled
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display_handle: RawDisplayHandle,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        if enable_validation {
            check_layers(&entry, VALIDATION_LAYERS)?;
        }

        let instance = Self::create_instance(&entry, app_name, enable_validation, display_handle)?;

        let debug_utils = if enable_validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Arc::new(Self {
            instance,
            entry,
            validation: enable_validation,
            debug_utils,
        }))
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        enable_validation: bool,
        display_handle: RawDisplayHandle,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = c"v3rse";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions = surface::required_extensions(display_handle)?;
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = layer_pointers(enable_validation);

        // Chained so instance creation and destruction are covered by validation too
        let mut debug_info = debug_messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        if enable_validation {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);
        let create_info = debug_messenger_create_info();

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");

        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Raw pointers for the enabled layer list (empty when validation is off)
pub fn layer_pointers(enable_validation: bool) -> Vec<*const c_char> {
    if enable_validation {
        VALIDATION_LAYERS.iter().map(|layer| layer.as_ptr()).collect()
    } else {
        Vec::new()
    }
}

fn check_layers(entry: &Entry, requested: &[&CStr]) -> Result<()> {
    let available = entry
        .enumerate_instance_layer_properties()
        .context("Failed to enumerate instance layers")?
        .iter()
        .map(|props| {
            unsafe { CStr::from_ptr(props.layer_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        })
        .collect::<Vec<_>>();

    let missing = missing_layers(&available, requested);
    if !missing.is_empty() {
        anyhow::bail!("requested layers not available: {}", missing.join(", "));
    }
    Ok(())
}

/// Names from `requested` that do not appear in `available`
pub fn missing_layers(available: &[String], requested: &[&CStr]) -> Vec<String> {
    requested
        .iter()
        .map(|layer| layer.to_string_lossy())
        .filter(|name| !available.iter().any(|a| a == name))
        .map(|name| name.into_owned())
        .collect()
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    log::log!(level_for(message_severity), "[Vulkan] {}", message.to_string_lossy());

    vk::FALSE
}

/// Log level a validation message is reported at
fn level_for(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        _ => log::Level::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_severities_map_to_log_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;

        assert_eq!(level_for(Severity::ERROR), log::Level::Error);
        assert_eq!(level_for(Severity::WARNING), log::Level::Warn);
        assert_eq!(level_for(Severity::INFO), log::Level::Info);
        assert_eq!(level_for(Severity::VERBOSE), log::Level::Trace);
    }

    #[test]
    fn all_layers_present() {
        let available = vec![
            "VK_LAYER_MESA_device_select".to_string(),
            "VK_LAYER_KHRONOS_validation".to_string(),
        ];
        assert!(missing_layers(&available, VALIDATION_LAYERS).is_empty());
    }

    #[test]
    fn reports_each_missing_layer() {
        let available = vec!["VK_LAYER_MESA_device_select".to_string()];
        let requested = [c"VK_LAYER_KHRONOS_validation", c"VK_LAYER_LUNARG_monitor"];
        assert_eq!(
            missing_layers(&available, &requested),
            vec!["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_monitor"]
        );
    }

    #[test]
    fn layer_pointers_follow_validation_flag() {
        assert!(layer_pointers(false).is_empty());
        assert_eq!(layer_pointers(true).len(), VALIDATION_LAYERS.len());
    }
}
