//! Vulkan context management
//!
//! Owns the instance, the selected physical device, the logical device with
//! its single graphics queue, the command pool and the frame-slot ring. The
//! context is created once, before any surface exists, and destroyed last.

use ash::{Device, Entry, Instance};
#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;
use std::ffi::{CStr, CString};
use thiserror::Error;

use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::frame::MAX_FRAMES_IN_FLIGHT;
use crate::render::vulkan::sync::FrameSlot;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device exposes a queue family with graphics support
    #[error("No graphics-capable queue family found")]
    NoGraphicsQueue,

    /// Graphics-capable devices exist but none offers `VK_KHR_swapchain`
    #[error("No graphics-capable device supports VK_KHR_swapchain")]
    NoSwapchainSupport,

    /// The surface reports a different color format than the render pass was built for
    #[error("Surface format changed from {from:?} to {to:?}")]
    SurfaceFormatChanged {
        /// Format the render pass and pipelines were built for
        from: vk::Format,
        /// Format the surface reports now
        to: vk::Format,
    },

    /// The chosen queue family cannot present to the surface being bound
    #[error("Queue family {queue_family} cannot present to this surface")]
    SurfaceNotSupported {
        /// Queue family that was checked
        queue_family: u32,
    },

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// An operation needs a bound surface and none is bound
    #[error("No surface is bound")]
    NoSurfaceBound,

    /// A pipeline asked for more push-constant space than the device offers
    #[error("Push constant range of {requested} bytes exceeds device limit of {limit} bytes")]
    PushConstantTooLarge {
        /// Bytes requested by the pipeline description
        requested: u32,
        /// `maxPushConstantsSize` of the device
        limit: u32,
    },

    /// A draw tried to upload more push-constant bytes than its pipeline declares
    #[error("Push constant payload of {payload} bytes exceeds declared size of {declared} bytes")]
    PushConstantOverflow {
        /// Size of the payload handed to the draw
        payload: usize,
        /// Size declared when the pipeline was built
        declared: u32,
    },

    /// Shader bytes are not a whole number of SPIR-V words
    #[error("Invalid shader code: {0}")]
    InvalidShaderCode(String),

    /// Reading a shader binary from disk failed
    #[error("Failed to read shader {path}: {source}")]
    ShaderIo {
        /// File that could not be read
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Vulkan instance together with the entry it was loaded from
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension and messenger (debug builds with validation)
    #[cfg(debug_assertions)]
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance declaring the extensions the windowing layer requires
    pub fn new(required_extensions: &[String], app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e:?}")))?;

        let app_name_cstr = CString::new(app_name)
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let engine_name_cstr = CString::new("terrain_engine")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let cstr_extensions = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid extension name: {e}")))?;

        #[allow(unused_mut)]
        let mut extensions: Vec<*const std::os::raw::c_char> = cstr_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let validation = cfg!(debug_assertions) && enable_validation && Self::validation_available(&entry);
        if enable_validation && cfg!(debug_assertions) && !validation {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }

        #[cfg(debug_assertions)]
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names: Vec<*const std::os::raw::c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe {
            entry.create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        #[cfg(debug_assertions)]
        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug,
        })
    }

    fn validation_available(entry: &Entry) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|layer| {
                    let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                    name == VALIDATION_LAYER
                })
            })
            .unwrap_or(false)
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils.create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Destroy the debug messenger and the instance
    ///
    /// # Safety
    /// Every object created from this instance must already be destroyed.
    unsafe fn destroy(&mut self) {
        #[cfg(debug_assertions)]
        if let Some((debug_utils, messenger)) = self.debug.take() {
            debug_utils.destroy_debug_utils_messenger(messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}

/// Debug callback for validation layers
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Pick the first queue family that supports graphics operations
pub fn pick_queue_family(queue_families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .and_then(|index| u32::try_from(index).ok())
}

/// Why no device was selected
fn selection_error(graphics_seen: bool) -> VulkanError {
    if graphics_seen {
        VulkanError::NoSwapchainSupport
    } else {
        VulkanError::NoGraphicsQueue
    }
}

/// Run `create` for each item, keeping every result, or release what was
/// built so far and return the first error
fn create_all<I, T, F, R>(items: I, mut create: F, mut release: R) -> VulkanResult<Vec<T>>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> VulkanResult<T>,
    R: FnMut(&T),
{
    let mut built = Vec::new();
    for item in items {
        match create(item) {
            Ok(value) => built.push(value),
            Err(e) => {
                built.iter().for_each(&mut release);
                return Err(e);
            }
        }
    }
    Ok(built)
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub queue_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first device with a graphics queue family and swapchain support
    pub fn select(instance: &Instance) -> VulkanResult<Self> {
        let devices = unsafe {
            instance.enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        let mut graphics_seen = false;
        for device in devices {
            let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
            let Some(queue_family) = pick_queue_family(&queue_families) else {
                continue;
            };
            graphics_seen = true;
            if !Self::supports_swapchain(instance, device)? {
                log::debug!("Skipping device without VK_KHR_swapchain");
                continue;
            }

            let properties = unsafe { instance.get_physical_device_properties(device) };
            let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
            log::info!("Selected GPU: {} (queue family {})", unsafe {
                CStr::from_ptr(properties.device_name.as_ptr()).to_string_lossy()
            }, queue_family);

            return Ok(Self {
                device,
                properties,
                memory_properties,
                queue_family,
            });
        }

        Err(selection_error(graphics_seen))
    }

    fn supports_swapchain(instance: &Instance, device: vk::PhysicalDevice) -> VulkanResult<bool> {
        let extensions = unsafe {
            instance.enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };

        Ok(extensions.iter().any(|available| {
            let extension_name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
            extension_name == SwapchainLoader::name()
        }))
    }

    /// Largest push-constant range the device accepts
    pub fn max_push_constants_size(&self) -> u32 {
        self.properties.limits.max_push_constants_size
    }
}

/// Logical device with its single graphics queue
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics and presentation queue
    pub queue: vk::Queue,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the logical device with `largePoints` and `VK_KHR_swapchain` enabled
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let queue_priorities = [0.5];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device.queue_family)
            .queue_priorities(&queue_priorities)
            .build()];

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        // Particles are drawn as large point sprites
        let device_features = vk::PhysicalDeviceFeatures::builder()
            .large_points(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance.create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let queue = unsafe { device.get_device_queue(physical_device.queue_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            queue,
            swapchain_loader,
        })
    }
}

/// Device context: everything that exists independently of a surface
///
/// Teardown happens in [`Drop`] in an explicit order: wait idle, frame slots,
/// command pool, device, instance. Anything built on top of the context
/// (surface sessions, pipelines, buffers) must be gone by then.
pub struct DeviceContext {
    instance: VulkanInstance,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    command_pool: CommandPool,
    frames: Vec<FrameSlot>,
}

impl DeviceContext {
    /// Create instance, pick a device, create the logical device and the frame-slot ring
    pub fn new(required_extensions: &[String], app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        log::debug!("Creating DeviceContext...");
        let mut instance = VulkanInstance::new(required_extensions, app_name, enable_validation)?;

        let setup = PhysicalDeviceInfo::select(&instance.instance).and_then(|physical_device| {
            let device = LogicalDevice::new(&instance.instance, &physical_device)?;
            Ok((physical_device, device))
        });
        let (physical_device, device) = match setup {
            Ok(parts) => parts,
            Err(e) => {
                unsafe { instance.destroy() };
                return Err(e);
            }
        };

        let (command_pool, frames) = match Self::create_frames(&device.device, physical_device.queue_family) {
            Ok(parts) => parts,
            Err(e) => {
                unsafe {
                    device.device.destroy_device(None);
                    instance.destroy();
                }
                return Err(e);
            }
        };

        log::debug!("DeviceContext created with {} frame slots", frames.len());
        Ok(Self {
            instance,
            physical_device,
            device,
            command_pool,
            frames,
        })
    }

    /// Command pool plus one frame slot per frame in flight; nothing survives a failure
    fn create_frames(device: &Device, queue_family: u32) -> VulkanResult<(CommandPool, Vec<FrameSlot>)> {
        let command_pool = CommandPool::new(device, queue_family)?;
        let frames = command_pool
            .allocate_command_buffers(device, MAX_FRAMES_IN_FLIGHT as u32)
            .and_then(|command_buffers| {
                create_all(
                    command_buffers,
                    |command_buffer| FrameSlot::new(device, command_buffer),
                    |frame: &FrameSlot| unsafe { frame.destroy(device) },
                )
            });

        match frames {
            Ok(frames) => Ok((command_pool, frames)),
            Err(e) => {
                // Command buffers go with the pool
                unsafe { command_pool.destroy(device) };
                Err(e)
            }
        }
    }

    /// Get a reference to the Vulkan entry
    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the logical device handle
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get the swapchain loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Get the graphics queue
    pub fn queue(&self) -> vk::Queue {
        self.device.queue
    }

    /// Get the queue family index shared by graphics and presentation
    pub fn queue_family(&self) -> u32 {
        self.physical_device.queue_family
    }

    /// Get the frame slot at `index`
    pub fn frame_slot(&self, index: usize) -> &FrameSlot {
        &self.frames[index]
    }

    /// Get all frame slots
    pub fn frame_slots(&self) -> &[FrameSlot] {
        &self.frames
    }

    /// Wait for the device to finish all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device.device.device_wait_idle()
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        log::debug!("Destroying DeviceContext");
        unsafe {
            let _ = self.device.device.device_wait_idle();

            for frame in &self.frames {
                frame.destroy(&self.device.device);
            }
            // Command buffers go with the pool
            self.command_pool.destroy(&self.device.device);
            self.device.device.destroy_device(None);
            self.instance.destroy();
        }
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

    #[test]
    fn test_pick_first_graphics_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        assert_eq!(pick_queue_family(&families), Some(2));
    }

    #[test]
    fn test_no_graphics_family() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];
        assert_eq!(pick_queue_family(&families), None);
        assert_eq!(pick_queue_family(&[]), None);
    }

    #[test]
    fn test_selection_error_names_missing_swapchain() {
        assert!(matches!(selection_error(true), VulkanError::NoSwapchainSupport));
        assert!(matches!(selection_error(false), VulkanError::NoGraphicsQueue));
        assert_eq!(
            VulkanError::NoSwapchainSupport.to_string(),
            "No graphics-capable device supports VK_KHR_swapchain"
        );
    }

    #[test]
    fn test_create_all_keeps_every_result() {
        let mut released = Vec::new();
        let built = create_all(1..=3, |n| Ok(n * 10), |n: &i32| released.push(*n)).unwrap();
        assert_eq!(built, vec![10, 20, 30]);
        assert!(released.is_empty());
    }

    #[test]
    fn test_create_all_releases_partial_results_on_failure() {
        let mut released = Vec::new();
        let result = create_all(
            [1, 2, 3, 4],
            |n| if n == 3 { Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)) } else { Ok(n) },
            |n: &i32| released.push(*n),
        );

        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))));
        assert_eq!(released, vec![1, 2]);
    }

    #[test]
    fn test_error_messages() {
        let err = VulkanError::PushConstantOverflow { payload: 72, declared: 68 };
        assert_eq!(err.to_string(), "Push constant payload of 72 bytes exceeds declared size of 68 bytes");
        assert_eq!(
            VulkanError::SurfaceNotSupported { queue_family: 1 }.to_string(),
            "Queue family 1 cannot present to this surface"
        );
    }
}
