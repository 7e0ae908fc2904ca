// Command pool, buffers and triangle recording

use anyhow::{Context, Result};
use ash::vk;

/// Create a command pool on `queue_family` whose buffers can be reset one by one
pub fn create_command_pool(device: &ash::Device, queue_family: u32) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(queue_family)
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.create_command_pool(&pool_info, None) }
        .context("Failed to create command pool")
}

pub fn allocate_command_buffers(
    device: &ash::Device,
    command_pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    unsafe { device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffers")
}

/// What one triangle draw needs from the rest of the engine
pub struct TriangleDraw {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub clear_color: [f32; 4],
}

/// Record: clear, bind the pipeline, draw three vertices
pub fn record_triangle(device: &ash::Device, cmd: vk::CommandBuffer, draw: &TriangleDraw) -> Result<()> {
    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: draw.extent,
    };

    let clear_values = [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: draw.clear_color,
        },
    }];

    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: draw.extent.width as f32,
        height: draw.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };

    unsafe {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        device.begin_command_buffer(cmd, &begin_info)
            .context("Failed to begin command buffer")?;

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(draw.render_pass)
            .framebuffer(draw.framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);

        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, draw.pipeline);
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[render_area]);
        device.cmd_draw(cmd, 3, 1, 0, 0);

        device.cmd_end_render_pass(cmd);

        device.end_command_buffer(cmd)
            .context("failed to record command buffer")?;
    }

    Ok(())
}
