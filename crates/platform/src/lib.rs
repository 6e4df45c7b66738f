//! Platform layer: window, event loop, input and the render loop.
//!
//! The window stays hidden until startup succeeds, so a broken scene never
//! presents a frame. After that the loop redraws continuously until the
//! `running` flag is cleared by Escape or a close request.

use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result, anyhow};
use corelib::{
    camera::Camera,
    transform::{ModelPlacement, Transform},
    vec3,
};
use renderer::{FrameParams, FrameRenderer, GpuState, ScenePaths, TextureConfig, prepare_scene};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

pub mod input;

use input::{CameraController, KeyState};

pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Everything the binary decides before the loop starts.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backends: wgpu::Backends,
    pub width: u32,
    pub height: u32,
    pub show_fps: bool,
    pub scene: ScenePaths,
    pub placement: ModelPlacement,
    pub threshold: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            width: 1280,
            height: 720,
            show_fps: false,
            scene: ScenePaths::default(),
            placement: ModelPlacement::default(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Live state once startup has succeeded.
struct Scene {
    window: Arc<Window>,
    gpu: GpuState,
    renderer: FrameRenderer,
    camera: Camera,
    model: Transform,
}

/// Frames counted over one-second windows.
struct FpsCounter {
    since: Instant,
    frames: u32,
}

impl FpsCounter {
    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.since.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            log::info!("FPS: {:.1}", self.frames as f32 / elapsed);
            self.frames = 0;
            self.since = Instant::now();
        }
    }
}

struct App {
    config: AppConfig,
    scene: Option<Scene>,
    running: bool,
    keys: KeyState,
    controller: CameraController,
    threshold: f32,
    last_frame: Instant,
    fps: FpsCounter,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        let threshold = config.threshold.clamp(0.0, 1.0);
        Self {
            config,
            scene: None,
            running: true,
            keys: KeyState::default(),
            controller: CameraController::default(),
            threshold,
            last_frame: Instant::now(),
            fps: FpsCounter {
                since: Instant::now(),
                frames: 0,
            },
            fatal: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Scene> {
        let attributes = Window::default_attributes()
            .with_title("PhongView")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_visible(false);
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create window")?,
        );

        let mut gpu = pollster::block_on(GpuState::new(
            window.clone(),
            self.config.backends,
            TextureConfig::default(),
        ))?;
        let ctx = prepare_scene(&mut gpu, &self.config.scene)?;
        let model = self.config.placement.transform(ctx.bounds);
        log::info!(
            "Model placed: scale {:.3}, translation {:?}",
            model.scale,
            model.translation
        );

        let camera = Camera::new_perspective(
            vec3(0.0, 0.0, 4.0),
            60f32.to_radians(),
            0.1,
            100.0,
            gpu.aspect(),
        );

        window.set_visible(true);
        let size = window.inner_size();
        log::info!("Window shown: {}x{}", size.width, size.height);

        Ok(Scene {
            window,
            gpu,
            renderer: FrameRenderer::new(ctx),
            camera,
            model,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.fatal = Some(err);
        self.running = false;
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;

        let Some(scene) = self.scene.as_mut() else { return };
        self.controller
            .update(&self.keys, dt, &mut scene.camera, &mut self.threshold);

        let params = FrameParams {
            camera: scene.camera,
            model: scene.model,
            threshold: self.threshold,
        };
        match scene.renderer.render_frame(&mut scene.gpu, &params) {
            Ok(()) => {
                if self.config.show_fps {
                    self.fps.tick();
                }
            }
            Err(e) if e.is_surface_lost() => {
                log::warn!("Surface lost/outdated: {e}; recreating");
                scene.gpu.recreate_surface();
            }
            Err(e) => self.fail(event_loop, anyhow!(e).context("render loop failed")),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.scene.is_some() || self.fatal.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(scene) => {
                scene.window.request_redraw();
                self.last_frame = Instant::now();
                self.scene = Some(scene);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested. Exiting event loop.");
                self.running = false;
            }
            WindowEvent::Resized(size) => {
                if let Some(scene) = self.scene.as_mut() {
                    scene.gpu.resize(size.width, size.height);
                    scene.camera = scene.camera.with_aspect(scene.gpu.aspect());
                    log::debug!("Resized: {}x{}", size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => self.keys.clear(),
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else { return };
                let pressed = event.state == ElementState::Pressed;
                if code == KeyCode::Escape && pressed {
                    self.running = false;
                }
                self.keys.set(code, pressed);
            }
            WindowEvent::RedrawRequested => {
                if self.running {
                    self.redraw(event_loop);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if !self.running {
            event_loop.exit();
            return;
        }
        if let Some(scene) = &self.scene {
            scene.window.request_redraw();
        }
    }
}

/// Run the viewer until the window closes. Startup and loop failures are returned.
pub fn run_with_renderer(config: AppConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    log::info!(
        "Loading {} with {} / {}",
        config.scene.model.display(),
        config.scene.vertex_shader.display(),
        config.scene.fragment_shader.display()
    );

    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow!("Event loop error: {e:?}"))?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
