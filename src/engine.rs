// =============================================================================
// RENDER ENGINE - owns every Vulkan object and drives a frame
// =============================================================================
//
// INIT ORDER:
//   instance -> surface -> device -> swapchain -> render pass -> pipeline
//   -> framebuffers -> command pool/buffers -> sync objects
//
// FRAME FLOW:
//   wait fence -> acquire image -> reset fence -> record -> submit -> present
//
// Teardown runs in exactly the reverse order (see Drop).

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::HasDisplayHandle;
use std::path::PathBuf;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::command::{self, TriangleDraw};
use crate::backend::pipeline::{self, GraphicsPipeline};
use crate::backend::sync::FrameSync;
use crate::backend::{Surface, Swapchain, VulkanDevice, VulkanInstance};
use crate::config::Config;

/// Per-frame-in-flight resources
struct Frame {
    sync: FrameSync,
    command_buffer: vk::CommandBuffer,
}

/// Result of one `draw_frame` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Nothing was drawn (minimized, or the swapchain had to be rebuilt first)
    Skipped,
}

/// Window size as seen by the swapchain, and whether a rebuild is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeState {
    width: u32,
    height: u32,
    needs_recreate: bool,
}

impl ResizeState {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            needs_recreate: false,
        }
    }

    /// Zero area; rendering pauses until the window grows again
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        if !self.is_minimized() {
            self.needs_recreate = true;
        }
    }

    /// Presentation reported suboptimal or out of date
    pub fn request_recreate(&mut self) {
        self.needs_recreate = true;
    }

    /// A rebuild is due and there is an area to rebuild at
    pub fn needs_recreate(&self) -> bool {
        self.needs_recreate && !self.is_minimized()
    }

    pub fn recreated(&mut self) {
        self.needs_recreate = false;
    }
}

pub struct RenderEngine {
    // ─────────────────────────────────────────────────────────────────────────
    // SETTINGS
    // ─────────────────────────────────────────────────────────────────────────
    present_mode: vk::PresentModeKHR,
    clear_color: [f32; 4],
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,

    // ─────────────────────────────────────────────────────────────────────────
    // VULKAN CORE
    // ─────────────────────────────────────────────────────────────────────────
    device: Arc<VulkanDevice>,
    surface: Surface,
    swapchain: Option<Swapchain>,

    // ─────────────────────────────────────────────────────────────────────────
    // PIPELINE
    // ─────────────────────────────────────────────────────────────────────────
    render_pass: vk::RenderPass,
    pipeline: GraphicsPipeline,
    framebuffers: Vec<vk::Framebuffer>,

    // ─────────────────────────────────────────────────────────────────────────
    // COMMANDS & SYNCHRONIZATION
    // ─────────────────────────────────────────────────────────────────────────
    command_pool: vk::CommandPool,
    frames: Vec<Frame>,
    current_frame: usize,

    // ─────────────────────────────────────────────────────────────────────────
    // STATE
    // ─────────────────────────────────────────────────────────────────────────
    resize_state: ResizeState,
}

impl RenderEngine {
    pub fn new(config: &Config, window: &Window) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        let instance = VulkanInstance::new(
            &config.window.title,
            config.validation_enabled(),
            display_handle,
        )?;
        let surface = Surface::new(instance.clone(), window)?;
        let device = VulkanDevice::new(instance, &surface)?;

        let size = window.inner_size();
        let present_mode = config.get_present_mode();

        let swapchain = Swapchain::new(device.clone(), &surface, present_mode, size.width, size.height)?;
        let format = swapchain.format;
        let extent = swapchain.extent;
        let image_views = swapchain.image_views.clone();

        // From here on, partially built objects are owned by `engine`, so an
        // error below is cleaned up by Drop
        let mut engine = Self {
            present_mode,
            clear_color: config.graphics.clear_color,
            vertex_shader: config.graphics.vertex_shader.clone(),
            fragment_shader: config.graphics.fragment_shader.clone(),
            device: device.clone(),
            surface,
            swapchain: Some(swapchain),
            render_pass: vk::RenderPass::null(),
            pipeline: GraphicsPipeline {
                pipeline: vk::Pipeline::null(),
                layout: vk::PipelineLayout::null(),
            },
            framebuffers: Vec::new(),
            command_pool: vk::CommandPool::null(),
            frames: Vec::new(),
            current_frame: 0,
            resize_state: ResizeState::new(size.width, size.height),
        };

        engine.render_pass = pipeline::create_render_pass(&device, format)?;
        engine.pipeline = GraphicsPipeline::new(
            &device,
            engine.render_pass,
            &engine.vertex_shader,
            &engine.fragment_shader,
        )?;
        engine.framebuffers =
            pipeline::create_framebuffers(&device, &image_views, engine.render_pass, extent)?;

        let graphics_family = device
            .queue_families
            .graphics
            .context("Device has no graphics queue family")?;
        engine.command_pool = command::create_command_pool(&device.device, graphics_family)?;

        let frame_count = config.graphics.max_frames_in_flight.max(1);
        let command_buffers = command::allocate_command_buffers(
            &device.device,
            engine.command_pool,
            frame_count as u32,
        )?;
        for command_buffer in command_buffers {
            let sync = FrameSync::new(&device.device)?;
            engine.frames.push(Frame { sync, command_buffer });
        }

        log::info!("Vulkan initialized successfully ({} frame(s) in flight)", frame_count);
        Ok(engine)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    pub fn is_minimized(&self) -> bool {
        self.resize_state.is_minimized()
    }

    /// Record a new framebuffer size; the swapchain is rebuilt before the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        self.resize_state.resize(width, height);
    }

    /// Rebuild swapchain, image views and framebuffers at the current window size
    fn recreate_swapchain(&mut self) -> Result<()> {
        if self.resize_state.is_minimized() {
            return Ok(());
        }
        let (width, height) = self.resize_state.size();

        self.device.wait_idle()?;

        pipeline::destroy_framebuffers(&self.device, &self.framebuffers);
        self.framebuffers.clear();

        // The surface can only have one swapchain at a time
        self.swapchain = None;

        let swapchain = Swapchain::new(
            self.device.clone(),
            &self.surface,
            self.present_mode,
            width,
            height,
        )?;

        self.framebuffers = pipeline::create_framebuffers(
            &self.device,
            &swapchain.image_views,
            self.render_pass,
            swapchain.extent,
        )?;
        log::info!(
            "Swapchain recreated: {}x{}, {:?}",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.present_mode
        );
        self.swapchain = Some(swapchain);
        self.resize_state.recreated();

        Ok(())
    }

    /// Rebuild the graphics pipeline from the shader files on disk.
    ///
    /// On failure the previous pipeline stays in place.
    pub fn reload_shaders(&mut self) -> Result<()> {
        self.device.wait_idle()?;

        let pipeline = GraphicsPipeline::new(
            &self.device,
            self.render_pass,
            &self.vertex_shader,
            &self.fragment_shader,
        )?;

        let old = std::mem::replace(&mut self.pipeline, pipeline);
        old.destroy(&self.device.device);

        log::info!("Shaders reloaded");
        Ok(())
    }

    /// Render a single frame.
    pub fn draw_frame(&mut self) -> Result<FrameOutcome> {
        if self.resize_state.is_minimized() {
            return Ok(FrameOutcome::Skipped);
        }

        if self.resize_state.needs_recreate() || self.swapchain.is_none() {
            self.recreate_swapchain()?;
        }

        let device = self.device.clone();
        let frame = &self.frames[self.current_frame];
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 1: Wait until the GPU is done with this frame's resources
        // ─────────────────────────────────────────────────────────────────────
        frame.sync.wait(&device.device)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 2: Acquire next swapchain image
        // ─────────────────────────────────────────────────────────────────────
        let image_index = match swapchain.acquire_next_image(u64::MAX, frame.sync.image_available)? {
            Some((index, suboptimal)) => {
                if suboptimal {
                    self.resize_state.request_recreate();
                }
                index
            }
            None => {
                // Fence is still signaled, so the next wait will not block
                self.recreate_swapchain()?;
                return Ok(FrameOutcome::Skipped);
            }
        };

        // Only reset once we know work will be submitted
        frame.sync.reset(&device.device)?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 3: Record
        // ─────────────────────────────────────────────────────────────────────
        let cmd = frame.command_buffer;
        unsafe {
            device.device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .context("Failed to reset command buffer")?;
        }

        let framebuffer = *self
            .framebuffers
            .get(image_index as usize)
            .context("Acquired image has no framebuffer")?;

        command::record_triangle(
            &device.device,
            cmd,
            &TriangleDraw {
                render_pass: self.render_pass,
                framebuffer,
                extent: swapchain.extent,
                pipeline: self.pipeline.pipeline,
                clear_color: self.clear_color,
            },
        )?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 4: Submit
        // ─────────────────────────────────────────────────────────────────────
        let wait_semaphores = [frame.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device.device.queue_submit(
                device.graphics_queue,
                &[submit_info.build()],
                frame.sync.in_flight_fence,
            )
        }
        .context("failed to submit draw command buffer")?;

        // ─────────────────────────────────────────────────────────────────────
        // STEP 5: Present
        // ─────────────────────────────────────────────────────────────────────
        if swapchain.present(device.present_queue, image_index, &signal_semaphores)? {
            self.resize_state.request_recreate();
        }

        self.current_frame = (self.current_frame + 1) % self.frames.len();

        Ok(FrameOutcome::Presented)
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        let _ = self.device.wait_idle();
        let device = &self.device.device;

        // Destroy in reverse order of creation; null handles are ignored by Vulkan
        for frame in &self.frames {
            frame.sync.destroy(device);
        }

        unsafe {
            // Also frees the command buffers
            device.destroy_command_pool(self.command_pool, None);
        }

        pipeline::destroy_framebuffers(&self.device, &self.framebuffers);
        self.pipeline.destroy(device);

        unsafe {
            device.destroy_render_pass(self.render_pass, None);
        }

        // Swapchain goes before the surface; device and instance follow once
        // the last Arc is released
        self.swapchain = None;

        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_without_pending_rebuild() {
        let state = ResizeState::new(480, 480);
        assert!(!state.is_minimized());
        assert!(!state.needs_recreate());
    }

    #[test]
    fn zero_area_pauses_rendering() {
        let mut state = ResizeState::new(480, 480);
        state.resize(0, 480);
        assert!(state.is_minimized());
        assert!(!state.needs_recreate());

        state.resize(640, 0);
        assert!(state.is_minimized());
    }

    #[test]
    fn restoring_resumes_with_rebuild_pending() {
        let mut state = ResizeState::new(480, 480);
        state.resize(0, 0);
        state.resize(800, 600);

        assert!(!state.is_minimized());
        assert!(state.needs_recreate());
        assert_eq!(state.size(), (800, 600));
    }

    #[test]
    fn rebuild_clears_pending_flag() {
        let mut state = ResizeState::new(480, 480);
        state.resize(1024, 768);
        state.recreated();
        assert!(!state.needs_recreate());
    }

    #[test]
    fn suboptimal_present_waits_while_minimized() {
        let mut state = ResizeState::new(480, 480);
        state.resize(0, 0);
        state.request_recreate();
        assert!(!state.needs_recreate());

        // Still due once the window has area again
        state.resize(320, 240);
        assert!(state.needs_recreate());
    }
}
