use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wgpu::{self, SurfaceError};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes},
};

use crate::compositor::Compositor;
use crate::config::Configuration;
use crate::events::{CommandQueue, CommandReceiver, RenderCommand};
use crate::geometry::SurfaceSize;
use crate::landmarks::LandmarkStore;

use super::gpu::GpuTextures;
use super::overlay::OverlayRenderer;
use super::sprites::SpriteRenderer;

#[derive(Debug)]
enum ViewerEvent {
    Cancelled,
}

/// Shared state the render thread needs from the rest of the pipeline.
pub struct ViewerInputs {
    pub commands: CommandReceiver,
    /// Local input is submitted through the same queue as remote commands.
    pub queue: CommandQueue,
    pub landmarks: Arc<LandmarkStore>,
    pub surface_size: Arc<SurfaceSize>,
    /// Game started once the regions it needs have arrived.
    pub initial_game: Option<RenderCommand>,
}

#[derive(Debug, Clone)]
pub enum KeyAction {
    Command(RenderCommand),
    Quit,
}

/// Keyboard bindings for the windowed viewer.
pub fn command_for_key(key: &Key) -> Option<KeyAction> {
    let cmd = match key {
        Key::Named(NamedKey::Escape) => return Some(KeyAction::Quit),
        Key::Named(NamedKey::Space) => RenderCommand::Advance,
        Key::Character(c) => match c.as_str() {
            "1" => RenderCommand::StartFalling,
            "2" => RenderCommand::StartSequence,
            "3" => RenderCommand::StartZoom,
            "r" | "R" => RenderCommand::ResetSequence,
            "s" | "S" => RenderCommand::StopGame,
            "d" | "D" => RenderCommand::ToggleDebug,
            _ => return None,
        },
        _ => return None,
    };
    Some(KeyAction::Command(cmd))
}

struct ViewerApp {
    cfg: Configuration,
    cancel: CancellationToken,
    inputs: ViewerInputs,
    window: Option<Arc<Window>>,
    surface: Option<wgpu::Surface<'static>>,
    surface_config: Option<wgpu::SurfaceConfiguration>,
    device: Option<wgpu::Device>,
    queue: Option<wgpu::Queue>,
    compositor: Option<Compositor<GpuTextures>>,
    sprites: Option<SpriteRenderer>,
    overlay: Option<OverlayRenderer>,
    next_frame_at: Instant,
}

impl ViewerApp {
    fn new(cfg: Configuration, cancel: CancellationToken, inputs: ViewerInputs) -> Self {
        Self {
            cfg,
            cancel,
            inputs,
            window: None,
            surface: None,
            surface_config: None,
            device: None,
            queue: None,
            compositor: None,
            sprites: None,
            overlay: None,
            next_frame_at: Instant::now(),
        }
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Option<Arc<Window>> {
        if let Some(window) = self.window.as_ref() {
            return Some(window.clone());
        }

        let [width, height] = self.cfg.render.window_size;
        let attrs = WindowAttributes::default()
            .with_title(self.cfg.render.window_title.clone())
            .with_inner_size(LogicalSize::new(width, height));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                self.window = Some(window.clone());
                Some(window)
            }
            Err(err) => {
                error!(error = %err, "failed to create viewer window");
                None
            }
        }
    }

    fn init_gpu(&mut self, window: Arc<Window>) -> Result<()> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to acquire GPU adapter")?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|fmt| fmt.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("viewer-device"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
        }))
        .context("failed to acquire GPU device")?;

        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        self.inputs.surface_size.set(config.width, config.height);
        info!(
            width = config.width,
            height = config.height,
            format = ?config.format,
            "viewer surface configured",
        );

        let textures = GpuTextures::new(&device, &queue);
        let sprites = SpriteRenderer::new(&device, format, &textures);
        let overlay = OverlayRenderer::new(&device, format);
        let mut compositor = Compositor::new(textures, &self.cfg, self.inputs.landmarks.clone());
        if let Some(game) = self.inputs.initial_game.take() {
            compositor.queue_game(game);
        }

        self.surface = Some(surface);
        self.surface_config = Some(config);
        self.device = Some(device);
        self.queue = Some(queue);
        self.compositor = Some(compositor);
        self.sprites = Some(sprites);
        self.overlay = Some(overlay);
        Ok(())
    }

    fn handle_resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        let (Some(surface), Some(device), Some(config)) = (
            self.surface.as_ref(),
            self.device.as_ref(),
            self.surface_config.as_mut(),
        ) else {
            return;
        };

        config.width = new_size.width.max(1);
        config.height = new_size.height.max(1);
        surface.configure(device, config);
        self.inputs.surface_size.set(config.width, config.height);
        debug!(
            width = config.width,
            height = config.height,
            "viewer surface resized",
        );
        self.request_redraw();
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = self.window.clone() else {
            return;
        };
        let Some(surface) = self.surface.as_ref() else {
            return;
        };

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Outdated) | Err(SurfaceError::Lost) => {
                info!("viewer surface lost; reconfiguring");
                self.handle_resize(window.inner_size());
                return;
            }
            Err(SurfaceError::OutOfMemory) => {
                error!("viewer surface out of memory; exiting event loop");
                event_loop.exit();
                return;
            }
            Err(SurfaceError::Timeout) => {
                warn!("viewer surface acquisition timed out");
                return;
            }
            Err(SurfaceError::Other) => {
                warn!("viewer surface reported an unknown error; retrying");
                self.handle_resize(window.inner_size());
                return;
            }
        };

        let (Some(device), Some(queue), Some(compositor), Some(sprites), Some(overlay)) = (
            self.device.as_ref(),
            self.queue.as_ref(),
            self.compositor.as_mut(),
            self.sprites.as_mut(),
            self.overlay.as_mut(),
        ) else {
            return;
        };

        let now = Instant::now();
        compositor.drain_commands(&self.inputs.commands, now);
        let plan = compositor.plan_frame(now);

        let draws: Vec<_> = plan.textured().collect();
        let camera_draws = usize::from(plan.camera.is_some());
        sprites.prepare(device, &draws);
        overlay.prepare(device, &plan.debug_points, plan.debug_mouth.as_deref());

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("viewer-encoder"),
        });
        let [r, g, b] = self.cfg.render.clear_color;
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("viewer-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(r) / 255.0,
                            g: f64::from(g) / 255.0,
                            b: f64::from(b) / 255.0,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let textures = compositor.backend();
            sprites.draw(&mut pass, textures, 0..camera_draws);
            overlay.draw(&mut pass);
            sprites.draw(&mut pass, textures, camera_draws..draws.len());
        }

        queue.submit(std::iter::once(encoder.finish()));
        window.pre_present_notify();
        frame.present();
    }

    fn request_redraw(&mut self) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn submit(&self, cmd: RenderCommand) {
        let name = cmd.name();
        if let Err(err) = self.inputs.queue.submit(cmd) {
            warn!(command = name, error = %err, "input_command_dropped");
        }
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match command_for_key(&event.logical_key) {
            Some(KeyAction::Quit) => {
                info!("viewer quit requested");
                self.cancel.cancel();
                event_loop.exit();
            }
            Some(KeyAction::Command(cmd)) => self.submit(cmd),
            None => {}
        }
    }
}

impl ApplicationHandler<ViewerEvent> for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.cancel.is_cancelled() {
            event_loop.exit();
            return;
        }

        let Some(window) = self.ensure_window(event_loop) else {
            event_loop.exit();
            return;
        };

        if self.device.is_none() {
            if let Err(err) = self.init_gpu(window) {
                error!(error = ?err, "failed to initialize GPU state");
                event_loop.exit();
                return;
            }
        }

        self.request_redraw();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        if window.id() != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("viewer window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size);
            }
            WindowEvent::ScaleFactorChanged {
                mut inner_size_writer,
                ..
            } => {
                let size = window.inner_size();
                let _ = inner_size_writer.request_inner_size(size);
                self.handle_resize(size);
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.submit(RenderCommand::Advance),
            WindowEvent::RedrawRequested => {
                self.draw(event_loop);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if now >= self.next_frame_at {
            self.next_frame_at = now + self.cfg.render.frame_interval();
            self.request_redraw();
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame_at));
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::Cancelled => {
                info!("viewer received cancellation event");
                event_loop.exit();
            }
        }
    }
}

/// Runs the compositor in a window on the calling thread until the window
/// closes or `cancel` fires.
pub fn run_windowed(
    cfg: Configuration,
    inputs: ViewerInputs,
    cancel: CancellationToken,
) -> Result<()> {
    let event_loop = EventLoop::<ViewerEvent>::with_user_event()
        .build()
        .context("failed to build viewer event loop")?;
    let proxy = event_loop.create_proxy();

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = proxy.send_event(ViewerEvent::Cancelled);
        })
    };

    let mut app = ViewerApp::new(cfg, cancel, inputs);
    let run_result = event_loop.run_app(&mut app);
    cancel_task.abort();

    run_result.context("viewer event loop failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_keys_start_games() {
        assert!(matches!(
            command_for_key(&Key::Character("1".into())),
            Some(KeyAction::Command(RenderCommand::StartFalling))
        ));
        assert!(matches!(
            command_for_key(&Key::Character("3".into())),
            Some(KeyAction::Command(RenderCommand::StartZoom))
        ));
    }

    #[test]
    fn space_advances_and_escape_quits() {
        assert!(matches!(
            command_for_key(&Key::Named(NamedKey::Space)),
            Some(KeyAction::Command(RenderCommand::Advance))
        ));
        assert!(matches!(
            command_for_key(&Key::Named(NamedKey::Escape)),
            Some(KeyAction::Quit)
        ));
        assert!(command_for_key(&Key::Character("x".into())).is_none());
    }
}
