// =============================================================================
// V3RSE - minimal Vulkan triangle renderer
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, window, input, frame stats)             │
// │    └── RenderEngine                                             │
// │          └── Vulkan Instance + Surface + Device + Swapchain     │
// │                └── Render pass, pipeline, framebuffers          │
// │                      └── Command buffers + sync objects         │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Poll shader watcher, rebuild pipeline on change
// 2. Wait for this frame's fence
// 3. Acquire swapchain image
// 4. Record and submit the triangle
// 5. Present rendered image to screen
//
// =============================================================================

mod backend;
mod config;
mod engine;
mod hot_reload;
mod stats;

use anyhow::{Context, Result};
use config::Config;
use engine::{FrameOutcome, RenderEngine};
use hot_reload::ShaderWatcher;
use stats::FrameStats;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::PhysicalKey,
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Nothing is logged yet, so a bad config.toml surfaces as main's error
    let config = Config::load()?;

    init_logging(&config)?;
    log::info!("Starting v3rse");
    log::info!("Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    app.shutdown();

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging, optionally sending every record to the configured file
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Env, Target};

    let mut builder = Builder::from_env(Env::default().default_filter_or(&config.debug.log_level));

    if config.debug.log_to_file {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
            .with_context(|| format!("Failed to open log file {}", config.debug.log_file))?;

        writeln!(file, "=== v3rse log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;

        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the engine must go before the window it
/// renders into.
struct App {
    config: Config,

    engine: Option<RenderEngine>,
    shader_watcher: Option<ShaderWatcher>,
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    stats: FrameStats,
    /// First fatal error; returned from `main` once the loop exits
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        Self {
            config,
            engine: None,
            shader_watcher: None,
            window: None,
            is_fullscreen,
            stats: FrameStats::new(Instant::now()),
            error: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("Failed to create window")?,
        );

        let engine = RenderEngine::new(&self.config, &window)?;

        if self.config.debug.hot_reload_shaders {
            let shaders = [
                self.config.graphics.vertex_shader.as_path(),
                self.config.graphics.fragment_shader.as_path(),
            ];
            // Rendering works without the watcher
            match ShaderWatcher::new(&shaders) {
                Ok(watcher) => self.shader_watcher = Some(watcher),
                Err(e) => log::warn!("Shader hot reload disabled: {:#}", e),
            }
        }

        self.engine = Some(engine);
        self.window = Some(window);
        self.stats = FrameStats::new(Instant::now());
        Ok(())
    }

    /// Log the error, remember it for `main` and stop the loop
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };

        if let Some(watcher) = &self.shader_watcher {
            let changed = watcher.take_changed();
            if !changed.is_empty() {
                for path in &changed {
                    log::info!("Shader changed: {}", path.display());
                }
                if let Err(e) = engine.reload_shaders() {
                    log::error!("Shader reload failed, keeping previous pipeline: {:#}", e);
                }
            }
        }

        if engine.draw_frame()? == FrameOutcome::Presented {
            self.update_fps();
        }
        Ok(())
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }
            // The resulting Resized event schedules swapchain recreation
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        let Some(sample) = self.stats.record(Instant::now()) else {
            return;
        };
        if !self.config.debug.show_fps {
            return;
        }
        if let Some(ref window) = self.window {
            let mode = if self.is_fullscreen { "fullscreen" } else { "windowed" };
            window.set_title(&sample.title(&self.config.window.title, mode));
        }
    }

    /// Let in-flight frames finish before the loop exits
    fn wait_for_gpu(&self) {
        if let Some(ref engine) = self.engine {
            if let Err(e) = engine.wait_idle() {
                log::warn!("wait_idle failed while exiting: {:#}", e);
            }
        }
    }

    /// Wait for the GPU, release Vulkan objects and report frame timing
    fn shutdown(&mut self) {
        if let Some(engine) = self.engine.take() {
            if let Err(e) = engine.wait_idle() {
                log::warn!("wait_idle failed during shutdown: {:#}", e);
            }
            drop(engine);
        }
        self.shader_watcher = None;

        match self.stats.average_frame_time() {
            Some(avg) => log::info!(
                "Rendered {} frames, average frame time {} ns",
                self.stats.total_frames(),
                avg.as_nanos()
            ),
            None => log::info!("No frames rendered"),
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e.context("Failed to initialize renderer"));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.wait_for_gpu();
                event_loop.exit();
            }

            // ─────────────────────────────────────────────────────────────────
            // WINDOW RESIZED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut engine) = self.engine {
                    engine.resize(size.width, size.height);
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e.context("Render error"));
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                if !event.state.is_pressed() || event.repeat {
                    return;
                }
                let PhysicalKey::Code(key) = event.physical_key else {
                    return;
                };

                if Some(key) == self.config.controls.quit() {
                    log::info!("{:?} pressed, exiting...", key);
                    self.wait_for_gpu();
                    event_loop.exit();
                } else if Some(key) == self.config.controls.fullscreen() {
                    self.toggle_fullscreen();
                }
            }

            _ => {}
        }
    }

    /// Keep redrawing continuously unless the window has no area
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let minimized = self.engine.as_ref().map_or(true, RenderEngine::is_minimized);
        if minimized {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
